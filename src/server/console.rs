//! Management console: operator commands routed over the admin socket

use super::admin::{CommandArgs, CommandResponse};
use super::stats::{pretty_bytes, pretty_logs};
use super::ServerShared;
use crate::client::RemoteClient;
use crate::server::tokens::clean_key;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

/// Handles commands received over the admin socket.
///
/// The console is constructed stateless and attached to a server during
/// `LogServer::new`; commands arriving before attachment fail cleanly.
pub struct ManagementConsole {
    server: OnceLock<Arc<ServerShared>>,
}

impl Default for ManagementConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagementConsole {
    /// Create an unattached console
    pub fn new() -> Self {
        ManagementConsole {
            server: OnceLock::new(),
        }
    }

    pub(crate) fn attach(&self, server: Arc<ServerShared>) {
        let _ = self.server.set(server);
    }

    /// Dispatch one named command. Unknown commands and missing or
    /// mistyped arguments produce failure responses; server state is
    /// only touched by fully validated commands.
    pub async fn execute(&self, command: &str, args: &CommandArgs) -> CommandResponse {
        let command = command.to_lowercase();
        tracing::info!(command = %command, "admin command");

        let Some(server) = self.server.get() else {
            return CommandResponse::failure("console is not attached to a server");
        };

        match command.as_str() {
            "statistics" => self.cmd_statistics(server).await,
            "tokens.add" => self.cmd_tokens_add(server, args).await,
            "tokens.revoke.instance" => self.cmd_tokens_revoke_instance(server, args).await,
            "tokens.revoke.service" => self.cmd_tokens_revoke_service(server, args).await,
            "tokens.list.instances" => self.cmd_tokens_list_instances(server, args).await,
            "tokens.list.services" => self.cmd_tokens_list_services(server).await,
            "logs.list" => self.cmd_logs_list(server, args).await,
            "remote.add" => self.cmd_remote_add(server, args).await,
            "remote.remove" => self.cmd_remote_remove(server, args).await,
            "remote.list" => self.cmd_remote_list(server).await,
            "shutdown" => self.cmd_shutdown(server),
            other => CommandResponse::failure(format!("unknown command '{}'", other)),
        }
    }

    async fn cmd_statistics(&self, server: &Arc<ServerShared>) -> CommandResponse {
        let (total, services, hourly) = server.aggregate_statistics().await;

        let mut payload = String::new();
        let _ = writeln!(payload, "log volume per service:");
        let _ = writeln!(
            payload,
            "{:<24} {:>10} {:>16} {:>12} {:>8}",
            "Service", "Instances", "Logs", "Volume", "Share"
        );
        for service in &services {
            let _ = writeln!(
                payload,
                "{:<24} {:>10} {:>16} {:>12} {:>7.2}%",
                service.service,
                service.instances,
                pretty_logs(service.logs),
                pretty_bytes(service.volume),
                service.share * 100.0
            );
        }
        let _ = writeln!(payload, "{:<24} {:>10} {:>16} {:>12}", "total", "", "", pretty_bytes(total));

        let _ = writeln!(payload, "\nhourly activity:");
        let max_logs = hourly.iter().map(|hour| hour.0).max().unwrap_or(0);
        for (hour, (logs, bytes)) in hourly.iter().enumerate() {
            let bar = if max_logs > 0 {
                "#".repeat(((logs * 40) / max_logs) as usize)
            } else {
                String::new()
            };
            let _ = writeln!(
                payload,
                "{:02}:00 {:>16} {:>12} {}",
                hour,
                pretty_logs(*logs),
                pretty_bytes(*bytes),
                bar
            );
        }

        CommandResponse::success(payload)
    }

    async fn cmd_tokens_add(
        &self,
        server: &Arc<ServerShared>,
        args: &CommandArgs,
    ) -> CommandResponse {
        let Some(args) = ServiceInstanceArgs::decode(args) else {
            return missing_args();
        };
        match server.add_token(&args.service, &args.instance).await {
            Ok(token) => CommandResponse::success(format!(
                "added token for '{}': {}",
                clean_key(&args.service, &args.instance),
                token
            )),
            Err(e) => CommandResponse::failure(format!("could not add token: {}", e)),
        }
    }

    async fn cmd_tokens_revoke_instance(
        &self,
        server: &Arc<ServerShared>,
        args: &CommandArgs,
    ) -> CommandResponse {
        let Some(args) = ServiceInstanceArgs::decode(args) else {
            return missing_args();
        };
        match server.remove_token(&args.service, &args.instance).await {
            Ok(()) => CommandResponse::success(format!(
                "revoked token for '{}'",
                clean_key(&args.service, &args.instance)
            )),
            Err(e) => CommandResponse::failure(format!("could not revoke token: {}", e)),
        }
    }

    async fn cmd_tokens_revoke_service(
        &self,
        server: &Arc<ServerShared>,
        args: &CommandArgs,
    ) -> CommandResponse {
        let Some(args) = ServiceArgs::decode(args) else {
            return missing_args();
        };
        match server.remove_service_tokens(&args.service).await {
            Ok(removed) => CommandResponse::success(format!(
                "revoked {} token(s): {}",
                removed.len(),
                removed.join(", ")
            )),
            Err(e) => CommandResponse::failure(format!("could not revoke tokens: {}", e)),
        }
    }

    async fn cmd_tokens_list_instances(
        &self,
        server: &Arc<ServerShared>,
        args: &CommandArgs,
    ) -> CommandResponse {
        let Some(args) = ServiceArgs::decode(args) else {
            return missing_args();
        };
        let service = args.service.trim().to_lowercase();
        let rows = server.instances_of(&service).await;

        let mut payload = String::new();
        let _ = writeln!(payload, "instances of service '{}':", service);
        let _ = writeln!(
            payload,
            "{:<24} {:>13} {:>16} {:>24}",
            "Instance", "Token", "Last known IP", "Logs sent"
        );
        for row in rows {
            let _ = writeln!(
                payload,
                "{:<24} {:>13} {:>16} {:>24}",
                row.instance,
                row.token_preview,
                row.last_ip,
                format!("{} ({})", pretty_logs(row.logs), pretty_bytes(row.volume))
            );
        }

        CommandResponse::success(payload)
    }

    async fn cmd_tokens_list_services(&self, server: &Arc<ServerShared>) -> CommandResponse {
        let rows = server.service_rows().await;

        let mut payload = String::new();
        let _ = writeln!(
            payload,
            "{:<24} {:>10} {:>20} {:>16}",
            "Service", "Instances", "Last log entry", "Logs parsed"
        );
        for row in rows {
            let last = row
                .last_active
                .map(|when| when.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "N/A".to_string());
            let _ = writeln!(
                payload,
                "{:<24} {:>10} {:>20} {:>16}",
                row.service,
                row.instances,
                last,
                pretty_logs(row.logs)
            );
        }

        CommandResponse::success(payload)
    }

    async fn cmd_logs_list(
        &self,
        server: &Arc<ServerShared>,
        args: &CommandArgs,
    ) -> CommandResponse {
        let Some(args) = LogsListArgs::decode(args) else {
            return missing_args();
        };
        let mut files = match server.logfiles().await {
            Ok(files) => files,
            Err(e) => return CommandResponse::failure(format!("could not list logfiles: {}", e)),
        };

        if let Some(show) = args.show {
            if show > 0 && files.len() > show {
                files.drain(..files.len() - show);
            }
        }

        let mut payload = String::new();
        for (name, size) in files {
            let _ = writeln!(payload, "{:<40} {:>12}", name, size);
        }
        CommandResponse::success(payload)
    }

    async fn cmd_remote_add(
        &self,
        server: &Arc<ServerShared>,
        args: &CommandArgs,
    ) -> CommandResponse {
        let Some(remote) = RemoteArgs::decode(args) else {
            return missing_args();
        };
        let name = remote.destination_name();

        let writer: Arc<dyn crate::logger::RemoteWriter> = match remote.backend.as_str() {
            "journald" => {
                let Some(creds) = RemoteCredentialArgs::decode(args) else {
                    return missing_args();
                };
                Arc::new(RemoteClient::connect(
                    &remote.host,
                    remote.port,
                    &creds.service,
                    &creds.instance,
                    &creds.token,
                    None,
                ))
            }
            other => {
                return CommandResponse::failure(format!("unknown backend '{}'", other));
            }
        };

        match server.logger.add_destination(name.clone(), writer).await {
            Ok(()) => CommandResponse::success(format!("added remote backend '{}'", name)),
            Err(e) => CommandResponse::failure(format!("could not add remote backend: {}", e)),
        }
    }

    async fn cmd_remote_remove(
        &self,
        server: &Arc<ServerShared>,
        args: &CommandArgs,
    ) -> CommandResponse {
        let Some(remote) = RemoteArgs::decode(args) else {
            return missing_args();
        };
        let name = remote.destination_name();

        match server.logger.remove_destination(&name).await {
            Ok(()) => CommandResponse::success(format!("removed remote backend '{}'", name)),
            Err(e) => CommandResponse::failure(format!("could not remove remote backend: {}", e)),
        }
    }

    async fn cmd_remote_list(&self, server: &Arc<ServerShared>) -> CommandResponse {
        CommandResponse::success(server.logger.list_destinations().await.join("\n"))
    }

    fn cmd_shutdown(&self, server: &Arc<ServerShared>) -> CommandResponse {
        server.kill();
        CommandResponse::success("shutting down")
    }
}

fn missing_args() -> CommandResponse {
    CommandResponse::failure("missing or invalid parameters")
}

// Typed views of the dynamic argument bag. Each command decodes into its
// own record; a failed decode is the shared missing-parameters failure.

struct ServiceInstanceArgs {
    service: String,
    instance: String,
}

impl ServiceInstanceArgs {
    fn decode(args: &CommandArgs) -> Option<Self> {
        Some(ServiceInstanceArgs {
            service: string_arg(args, "service")?,
            instance: string_arg(args, "instance")?,
        })
    }
}

struct ServiceArgs {
    service: String,
}

impl ServiceArgs {
    fn decode(args: &CommandArgs) -> Option<Self> {
        Some(ServiceArgs {
            service: string_arg(args, "service")?,
        })
    }
}

struct RemoteArgs {
    backend: String,
    host: String,
    port: u16,
}

impl RemoteArgs {
    fn decode(args: &CommandArgs) -> Option<Self> {
        let port = number_arg(args, "port")?;
        if !(0.0..=65535.0).contains(&port) {
            return None;
        }
        Some(RemoteArgs {
            backend: string_arg(args, "backend")?,
            host: string_arg(args, "host")?,
            port: port as u16,
        })
    }

    fn destination_name(&self) -> String {
        format!("{}://{}:{}", self.backend, self.host, self.port)
    }
}

struct RemoteCredentialArgs {
    service: String,
    instance: String,
    token: String,
}

impl RemoteCredentialArgs {
    fn decode(args: &CommandArgs) -> Option<Self> {
        Some(RemoteCredentialArgs {
            service: string_arg(args, "service")?,
            instance: string_arg(args, "instance")?,
            token: string_arg(args, "token")?,
        })
    }
}

struct LogsListArgs {
    show: Option<usize>,
}

impl LogsListArgs {
    fn decode(args: &CommandArgs) -> Option<Self> {
        let show = match args.get("show") {
            None => None,
            Some(_) => {
                let value = number_arg(args, "show")?;
                if value < 0.0 {
                    return None;
                }
                Some(value as usize)
            }
        };
        Some(LogsListArgs { show })
    }
}

fn string_arg(args: &CommandArgs, name: &str) -> Option<String> {
    args.get(name)?.as_str().map(str::to_string)
}

fn number_arg(args: &CommandArgs, name: &str) -> Option<f64> {
    args.get(name)?.as_f64()
}
