//! Integration tests for the aggregation server

use chrono::Timelike;
use logledger::client::RemoteClient;
use logledger::config::{LoggerConfig, Output, Rotation, ServerConfig};
use logledger::logger::RemoteWriter;
use logledger::server::{CommandResponse, LogServer, ManagementConsole};
use logledger::types::entry::column;
use logledger::types::Entry;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::UnixStream;
use tokio::time::sleep;

fn server_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        unix_socket: dir.join("admin.sock"),
        token_file: dir.join("tokens.db"),
        stats_file: dir.join("stats.db"),
        logger: LoggerConfig {
            service: String::new(),
            instance: String::new(),
            folder: dir.join("logs"),
            filestem: "aggregate".to_string(),
            rotation: Rotation::Daily,
            output: Output::File,
            headers: true,
            json: true,
            compress: false,
            columns: Vec::new(),
        },
    }
}

async fn start_server(dir: &Path) -> (LogServer, ServerConfig) {
    fs::create_dir_all(dir.join("logs")).await.unwrap();
    let config = server_config(dir);
    let server = LogServer::new(config.clone(), ManagementConsole::new())
        .await
        .unwrap();
    (server, config)
}

async fn admin_command(
    socket: &Path,
    command: &str,
    args: serde_json::Value,
) -> CommandResponse {
    let stream = UnixStream::connect(socket).await.unwrap();
    let mut stream = BufStream::new(stream);

    let request = json!({ "command": command, "args": args });
    stream
        .write_all(format!("{}\n", request).as_bytes())
        .await
        .unwrap();
    stream.flush().await.unwrap();

    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    serde_json::from_str(&line).unwrap()
}

fn full_entry(msg: &str) -> Entry {
    let mut entry = Entry::new();
    entry.insert(
        column::DATE_YMD_HMS_NANO,
        chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S.%f")
            .to_string(),
    );
    entry.insert(column::SERVICE, "s");
    entry.insert(column::INSTANCE, "i");
    entry.insert(column::CALLER, "remote");
    entry.insert(column::MSG_TYPE_SHORT, "MSG");
    entry.insert(column::MSG_TYPE_INT, "0");
    entry.insert(column::MSG_TYPE_STR, "Notification");
    entry.insert(column::MSG, msg);
    entry.insert(column::FILE, "remote.rs");
    entry.insert(column::LINE, "1");
    entry
}

fn payload(msg: &str) -> Vec<u8> {
    serde_json::to_vec(&full_entry(msg)).unwrap()
}

#[tokio::test]
async fn test_remote_log_auth_lifecycle() {
    let temp_dir = tempdir().unwrap();
    let (server, config) = start_server(temp_dir.path()).await;
    let port = server.local_addr().port();

    // no token yet: refused with a distinguishable error
    let stranger = RemoteClient::connect("127.0.0.1", port, "s", "i", "anything", None);
    let err = stranger.write_entry(&payload("nope")).await.unwrap_err();
    assert!(err.to_string().contains("unknown service/instance"));

    // mint a token over the admin socket
    let response = admin_command(
        &config.unix_socket,
        "tokens.add",
        json!({"service": "s", "instance": "i"}),
    )
    .await;
    assert!(response.is_success(), "error: {}", response.error);
    let token = response
        .payload
        .rsplit(' ')
        .next()
        .unwrap()
        .trim()
        .to_string();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

    // wrong token is a different failure than an unknown key
    let imposter = RemoteClient::connect("127.0.0.1", port, "s", "i", "wrong", None);
    let err = imposter.write_entry(&payload("nope")).await.unwrap_err();
    assert!(err.to_string().contains("bad token"));

    // the minted token authorizes
    let client = RemoteClient::connect("127.0.0.1", port, "s", "i", &token, None);
    client.write_entry(&payload("made it")).await.unwrap();
    client.close().await.unwrap();

    // the statistics update is asynchronous
    sleep(Duration::from_millis(200)).await;

    let stats = server.statistics().await;
    let stat = stats.get("s/i").expect("statistics for s/i");
    assert_eq!(stat.logs_parsed.len(), 24);
    assert_eq!(stat.logs_parsed.iter().sum::<i64>(), 1);
    let hour = chrono::Local::now().hour() as usize;
    assert_eq!(stat.logs_parsed[hour], 1);
    assert!(stat.logs_parsed_bytes[hour] > 0);
    assert_eq!(stat.service, "s");
    assert_eq!(stat.instance, "i");

    server.quit().await;

    // only the accepted entry reached the aggregate logfile
    let logfile = temp_dir.path().join("logs").join(format!(
        "aggregate_{}.log",
        chrono::Local::now().format("%Y-%m-%d")
    ));
    let content = fs::read_to_string(logfile).await.unwrap();
    assert!(content.contains("made it"));
    assert!(!content.contains("nope"));
}

#[tokio::test]
async fn test_restart_reloads_tokens_and_statistics() {
    let temp_dir = tempdir().unwrap();

    let (token, sums_before) = {
        let (server, _config) = start_server(temp_dir.path()).await;
        let port = server.local_addr().port();
        let token = server.add_token("s", "i").await.unwrap();

        let client = RemoteClient::connect("127.0.0.1", port, "s", "i", &token, None);
        for i in 0..5 {
            client.write_entry(&payload(&format!("entry {}", i))).await.unwrap();
        }
        sleep(Duration::from_millis(200)).await;

        let stats = server.statistics().await;
        let sums: i64 = stats["s/i"].logs_parsed.iter().sum();
        assert_eq!(sums, 5);

        server.quit().await;
        (token, sums)
    };

    // a fresh server on the same files picks up where we left off
    let (server, _config) = start_server(temp_dir.path()).await;
    let port = server.local_addr().port();

    let stats = server.statistics().await;
    let sums_after: i64 = stats["s/i"].logs_parsed.iter().sum();
    assert_eq!(sums_after, sums_before);

    let client = RemoteClient::connect("127.0.0.1", port, "s", "i", &token, None);
    client.write_entry(&payload("after restart")).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let stats = server.statistics().await;
    assert_eq!(stats["s/i"].logs_parsed.iter().sum::<i64>(), sums_before + 1);

    server.quit().await;
}

#[tokio::test]
async fn test_remote_backend_lifecycle_over_admin_socket() {
    let temp_dir = tempdir().unwrap();
    let (server, config) = start_server(temp_dir.path()).await;

    let triple = json!({
        "backend": "journald",
        "host": "h",
        "port": 9.0,
        "service": "s",
        "instance": "i",
        "token": "t"
    });

    let response = admin_command(&config.unix_socket, "remote.add", triple.clone()).await;
    assert!(response.is_success(), "error: {}", response.error);

    let listing = admin_command(&config.unix_socket, "remote.list", json!({})).await;
    assert!(listing.is_success());
    assert!(listing.payload.contains("journald://h:9"));

    // duplicate registration is refused
    let duplicate = admin_command(&config.unix_socket, "remote.add", triple.clone()).await;
    assert!(!duplicate.is_success());
    assert!(duplicate.error.contains("already exists"));

    let removal = admin_command(&config.unix_socket, "remote.remove", triple.clone()).await;
    assert!(removal.is_success());

    let listing = admin_command(&config.unix_socket, "remote.list", json!({})).await;
    assert!(!listing.payload.contains("journald://h:9"));

    let repeat = admin_command(&config.unix_socket, "remote.remove", triple).await;
    assert!(!repeat.is_success());

    // unsupported backends are named in the failure
    let unknown = admin_command(
        &config.unix_socket,
        "remote.add",
        json!({"backend": "carrier-pigeon", "host": "h", "port": 9.0}),
    )
    .await;
    assert!(!unknown.is_success());
    assert!(unknown.error.contains("carrier-pigeon"));

    server.quit().await;
}

#[tokio::test]
async fn test_token_commands_over_admin_socket() {
    let temp_dir = tempdir().unwrap();
    let (server, config) = start_server(temp_dir.path()).await;

    for instance in ["one", "two"] {
        let response = admin_command(
            &config.unix_socket,
            "tokens.add",
            json!({"service": "alpha", "instance": instance}),
        )
        .await;
        assert!(response.is_success());
    }

    // double add fails
    let response = admin_command(
        &config.unix_socket,
        "tokens.add",
        json!({"service": "alpha", "instance": "one"}),
    )
    .await;
    assert!(!response.is_success());
    assert!(response.error.contains("already exists"));

    let listing = admin_command(
        &config.unix_socket,
        "tokens.list.instances",
        json!({"service": "alpha"}),
    )
    .await;
    assert!(listing.is_success());
    assert!(listing.payload.contains("one"));
    assert!(listing.payload.contains("two"));
    assert!(listing.payload.contains("..."));

    let services = admin_command(&config.unix_socket, "tokens.list.services", json!({})).await;
    assert!(services.is_success());
    assert!(services.payload.contains("alpha"));

    let revoked = admin_command(
        &config.unix_socket,
        "tokens.revoke.instance",
        json!({"service": "alpha", "instance": "one"}),
    )
    .await;
    assert!(revoked.is_success());

    let sweep = admin_command(
        &config.unix_socket,
        "tokens.revoke.service",
        json!({"service": "alpha"}),
    )
    .await;
    assert!(sweep.is_success());
    assert!(sweep.payload.contains("alpha/two"));

    // everything is gone now
    let token_db = fs::read_to_string(&config.token_file).await.unwrap();
    assert!(token_db.is_empty());

    server.quit().await;
}

#[tokio::test]
async fn test_protocol_failures_leave_state_unchanged() {
    let temp_dir = tempdir().unwrap();
    let (server, config) = start_server(temp_dir.path()).await;

    let unknown = admin_command(&config.unix_socket, "bogus.command", json!({})).await;
    assert!(!unknown.is_success());
    assert!(unknown.error.contains("bogus.command"));

    let missing = admin_command(
        &config.unix_socket,
        "tokens.add",
        json!({"service": "alpha"}),
    )
    .await;
    assert!(!missing.is_success());
    assert!(missing.error.contains("missing or invalid parameters"));

    let mistyped = admin_command(
        &config.unix_socket,
        "tokens.add",
        json!({"service": "alpha", "instance": 7.0}),
    )
    .await;
    assert!(!mistyped.is_success());

    let token_db = fs::read_to_string(&config.token_file).await.unwrap();
    assert!(token_db.is_empty());

    server.quit().await;
}

#[tokio::test]
async fn test_statistics_and_logs_list_commands() {
    let temp_dir = tempdir().unwrap();
    let (server, config) = start_server(temp_dir.path()).await;
    let port = server.local_addr().port();

    let token = server.add_token("s", "i").await.unwrap();
    let client = RemoteClient::connect("127.0.0.1", port, "s", "i", &token, None);
    for i in 0..3 {
        client.write_entry(&payload(&format!("entry {}", i))).await.unwrap();
    }
    sleep(Duration::from_millis(200)).await;

    let statistics = admin_command(&config.unix_socket, "statistics", json!({})).await;
    assert!(statistics.is_success());
    assert!(statistics.payload.contains("log volume per service"));
    assert!(statistics.payload.contains('s'));
    assert!(statistics.payload.contains("hourly activity"));

    let logs = admin_command(&config.unix_socket, "logs.list", json!({})).await;
    assert!(logs.is_success());
    assert!(logs.payload.contains("aggregate_"));

    // show narrows the listing to the last N by name
    let limited =
        admin_command(&config.unix_socket, "logs.list", json!({"show": 1.0})).await;
    assert!(limited.is_success());
    assert_eq!(limited.payload.lines().count(), 1);

    server.quit().await;
}

#[tokio::test]
async fn test_malformed_remote_entry_is_an_rpc_error() {
    let temp_dir = tempdir().unwrap();
    let (server, _config) = start_server(temp_dir.path()).await;
    let port = server.local_addr().port();

    let token = server.add_token("s", "i").await.unwrap();
    let client = RemoteClient::connect("127.0.0.1", port, "s", "i", &token, None);

    let mut incomplete = Entry::new();
    incomplete.insert(column::MSG, "just a message");
    let bytes = serde_json::to_vec(&incomplete).unwrap();

    let err = client.write_entry(&bytes).await.unwrap_err();
    assert!(err.to_string().contains("missing column"));

    server.quit().await;
}

#[tokio::test]
async fn test_shutdown_command_fires_killswitch() {
    let temp_dir = tempdir().unwrap();
    fs::create_dir_all(temp_dir.path().join("logs")).await.unwrap();
    let config = server_config(temp_dir.path());
    let mut server = LogServer::new(config.clone(), ManagementConsole::new())
        .await
        .unwrap();
    let mut kill = server.kill_switch().unwrap();

    let response = admin_command(&config.unix_socket, "shutdown", json!({})).await;
    assert!(response.is_success());

    tokio::time::timeout(Duration::from_secs(1), kill.recv())
        .await
        .expect("killswitch did not fire");

    server.quit().await;
}

#[tokio::test]
async fn test_registered_remote_receives_forwarded_entries() {
    // two servers: the downstream aggregates what the upstream forwards
    let downstream_dir = tempdir().unwrap();
    let (downstream, _config) = start_server(downstream_dir.path()).await;
    let downstream_port = downstream.local_addr().port();
    let token = downstream.add_token("upstream", "main").await.unwrap();

    let upstream_dir = tempdir().unwrap();
    let (upstream, _upstream_config) = start_server(upstream_dir.path()).await;

    let relay: std::sync::Arc<dyn RemoteWriter> = std::sync::Arc::new(RemoteClient::connect(
        "127.0.0.1",
        downstream_port,
        "upstream",
        "main",
        &token,
        Some(Duration::from_secs(2)),
    ));
    upstream
        .logger()
        .add_destination("journald://127.0.0.1:downstream", relay)
        .await
        .unwrap();

    upstream
        .logger()
        .log("relay-test", 0, "forwarded entry")
        .unwrap();

    // quit drains the upstream ledger, which includes the remote delivery
    upstream.quit().await;
    sleep(Duration::from_millis(300)).await;

    let stats = downstream.statistics().await;
    let stat = stats.get("upstream/main").expect("forwarded statistics");
    assert_eq!(stat.logs_parsed.iter().sum::<i64>(), 1);

    downstream.quit().await;

    let logfile = downstream_dir.path().join("logs").join(format!(
        "aggregate_{}.log",
        chrono::Local::now().format("%Y-%m-%d")
    ));
    let content = fs::read_to_string(logfile).await.unwrap();
    assert!(content.contains("forwarded entry"));
}
