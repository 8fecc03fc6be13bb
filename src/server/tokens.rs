//! Durable token store for service/instance authentication

use crate::{LogLedgerError, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Builds the canonical `service/instance` key: trimmed and lowercased
pub(crate) fn clean_key(service: &str, instance: &str) -> String {
    format!("{}/{}", service.trim(), instance.trim()).to_lowercase()
}

/// Persistent mapping of `service/instance` keys to access tokens.
/// Backed by a tab-delimited text file, one record per line.
pub(crate) struct TokenStore {
    path: PathBuf,
    tokens: HashMap<String, String>,
}

impl TokenStore {
    /// Load the store from disk, creating the backing file if missing.
    /// Lines that are not exactly `key<TAB>token` with a two-part,
    /// non-empty key are skipped.
    pub(crate) async fn load(path: &Path) -> Result<Self> {
        super::ensure_file(path).await?;

        let content = tokio::fs::read_to_string(path).await?;
        let mut tokens = HashMap::new();
        for line in content.lines() {
            let Some((key, token)) = line.split_once('\t') else {
                continue;
            };
            if token.contains('\t') {
                continue;
            }
            let Some((service, instance)) = key.split_once('/') else {
                continue;
            };
            if service.is_empty() || instance.is_empty() || instance.contains('/') {
                continue;
            }
            tokens.insert(key.to_string(), token.to_string());
        }

        Ok(TokenStore {
            path: path.to_path_buf(),
            tokens,
        })
    }

    /// The stored token for a key
    pub(crate) fn token(&self, key: &str) -> Option<&str> {
        self.tokens.get(key).map(String::as_str)
    }

    /// All stored keys
    pub(crate) fn keys(&self) -> impl Iterator<Item = &String> {
        self.tokens.keys()
    }

    /// Number of stored keys
    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Create a token for the service/instance. Fails if the key already
    /// exists. The record is appended to the backing file before the
    /// in-memory map is updated.
    pub(crate) async fn add(&mut self, service: &str, instance: &str) -> Result<String> {
        let key = clean_key(service, instance);

        if self.tokens.contains_key(&key) {
            return Err(LogLedgerError::Token(format!(
                "token for '{}' already exists",
                key
            )));
        }

        let token = generate_token();

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\t{}\n", key, token).as_bytes())
            .await?;
        file.flush().await?;

        self.tokens.insert(key, token.clone());
        Ok(token)
    }

    /// Remove the token of a service/instance. Fails if the key is
    /// absent. The backing file is rewritten without the record.
    pub(crate) async fn remove(&mut self, service: &str, instance: &str) -> Result<()> {
        let key = clean_key(service, instance);

        if self.tokens.remove(&key).is_none() {
            return Err(LogLedgerError::Token(
                "no such service/instance".to_string(),
            ));
        }

        self.rewrite().await
    }

    /// Remove the tokens of every instance of a service. Returns the
    /// removed keys; fails if the service has none.
    pub(crate) async fn remove_service(&mut self, service: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", service.trim().to_lowercase());
        let mut removed: Vec<String> = self
            .tokens
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();
        removed.sort();

        if removed.is_empty() {
            return Err(LogLedgerError::Token(format!(
                "no tokens for service '{}'",
                service.trim().to_lowercase()
            )));
        }

        for key in &removed {
            self.tokens.remove(key);
        }
        self.rewrite().await?;

        Ok(removed)
    }

    async fn rewrite(&self) -> Result<()> {
        let mut keys: Vec<&String> = self.tokens.keys().collect();
        keys.sort();

        let mut content = String::new();
        for key in keys {
            content.push_str(key);
            content.push('\t');
            content.push_str(&self.tokens[key]);
            content.push('\n');
        }

        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

// 64 hex characters: SHA-256 over 32 random bytes.
fn generate_token() -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    hex::encode(Sha256::digest(seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_add_and_authenticate_token() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tokens.db");
        let mut store = TokenStore::load(&path).await.unwrap();

        let token = store.add("MyService", "Main").await.unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(store.token("myservice/main"), Some(token.as_str()));

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, format!("myservice/main\t{}\n", token));
    }

    #[tokio::test]
    async fn test_double_add_fails() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tokens.db");
        let mut store = TokenStore::load(&path).await.unwrap();

        store.add("svc", "a").await.unwrap();
        assert!(store.add("svc", "a").await.is_err());
        assert!(store.add(" SVC ", "A").await.is_err());
    }

    #[tokio::test]
    async fn test_add_remove_restores_prior_state() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tokens.db");
        let mut store = TokenStore::load(&path).await.unwrap();

        store.add("svc", "keep").await.unwrap();
        let before = tokio::fs::read_to_string(&path).await.unwrap();

        store.add("svc", "gone").await.unwrap();
        store.remove("svc", "gone").await.unwrap();

        let after = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(store.len(), 1);
        assert!(store.token("svc/gone").is_none());
    }

    #[tokio::test]
    async fn test_remove_absent_fails() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tokens.db");
        let mut store = TokenStore::load(&path).await.unwrap();
        assert!(store.remove("svc", "ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_service_sweeps_instances() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tokens.db");
        let mut store = TokenStore::load(&path).await.unwrap();

        store.add("alpha", "one").await.unwrap();
        store.add("alpha", "two").await.unwrap();
        store.add("beta", "one").await.unwrap();

        let removed = store.remove_service("Alpha").await.unwrap();
        assert_eq!(removed, vec!["alpha/one", "alpha/two"]);
        assert_eq!(store.len(), 1);
        assert!(store.token("beta/one").is_some());

        assert!(store.remove_service("alpha").await.is_err());
    }

    #[tokio::test]
    async fn test_load_skips_malformed_lines() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tokens.db");
        tokio::fs::write(
            &path,
            "svc/a\ttok1\n\
             no-tab-here\n\
             missing/parts\ttok\textra\n\
             notakey\ttok2\n\
             /empty\ttok3\n\
             svc/b\ttok4\n",
        )
        .await
        .unwrap();

        let store = TokenStore::load(&path).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.token("svc/a"), Some("tok1"));
        assert_eq!(store.token("svc/b"), Some("tok4"));
    }

    #[tokio::test]
    async fn test_load_survives_restart() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tokens.db");

        let token = {
            let mut store = TokenStore::load(&path).await.unwrap();
            store.add("svc", "a").await.unwrap()
        };

        let reloaded = TokenStore::load(&path).await.unwrap();
        assert_eq!(reloaded.token("svc/a"), Some(token.as_str()));
    }

    #[test]
    fn test_clean_key() {
        assert_eq!(clean_key(" MyService ", "Main"), "myservice/main");
        assert_eq!(clean_key("a", "b"), "a/b");
    }
}
