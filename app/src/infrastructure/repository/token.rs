use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use domain::{error::StorageError, model::entity::TokenRecord, repository::TokenRepository};
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value};
use uuid::Uuid;

const TOKENS_KEY: &str = "tokens";

/// Token records kept under the `tokens` key of a YAML file, one entry per
/// system. Other top-level keys of the file are left alone, so it can share
/// the file with the client configuration. Writers replace the file with a
/// rename and are not serialized: concurrent saves never leave a torn file,
/// but the last rename wins.
pub struct YamlTokenStore {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: String,
    expiry: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_expiry: Option<DateTime<Utc>>,
}

impl YamlTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn format_error(&self, message: impl ToString) -> StorageError {
        StorageError::Format {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }

    /// The whole file as a mapping; empty when the file doesn't exist yet.
    async fn read_document(&self) -> Result<Mapping, StorageError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Mapping::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        match serde_yaml_ng::from_str(&text).map_err(|e| self.format_error(e))? {
            Value::Mapping(document) => Ok(document),
            Value::Null => Ok(Mapping::new()),
            _ => Err(self.format_error("top level is not a mapping")),
        }
    }

    fn tokens(&self, document: &Mapping) -> Mapping {
        match document.get(TOKENS_KEY) {
            Some(Value::Mapping(tokens)) => tokens.clone(),
            Some(Value::Null) | None => Mapping::new(),
            Some(_) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Ignoring `{TOKENS_KEY}` entry in an unrecognized format"
                );
                Mapping::new()
            }
        }
    }

    /// Writes next to the target then renames over it, so readers see
    /// either the old file or the new one.
    async fn write_document(&self, document: &Mapping) -> Result<(), StorageError> {
        let text = serde_yaml_ng::to_string(document).map_err(|e| self.format_error(e))?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_owned(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| self.io_error(e))?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let result = async {
            tokio::fs::write(&temp, text).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600)).await?;
            }
            tokio::fs::rename(&temp, &self.path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(self.io_error(e));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenRepository for YamlTokenStore {
    async fn load(&self, system_id: &str) -> Result<Option<TokenRecord>, StorageError> {
        let document = self.read_document().await?;
        let Some(entry) = self.tokens(&document).remove(system_id) else {
            return Ok(None);
        };

        let stored: StoredToken = serde_yaml_ng::from_value(entry)
            .map_err(|e| self.format_error(format!("token for `{system_id}`: {e}")))?;
        Ok(Some(TokenRecord {
            system_id: system_id.to_owned(),
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            expiry: stored.expiry,
            refresh_expiry: stored.refresh_expiry,
        }))
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), StorageError> {
        let mut document = self.read_document().await?;
        let mut tokens = self.tokens(&document);
        let stored = StoredToken {
            access_token: record.access_token.clone(),
            refresh_token: record.refresh_token.clone(),
            expiry: record.expiry,
            refresh_expiry: record.refresh_expiry,
        };
        let stored = serde_yaml_ng::to_value(stored).map_err(|e| self.format_error(e))?;
        tokens.insert(Value::from(record.system_id.as_str()), stored);
        document.insert(Value::from(TOKENS_KEY), Value::Mapping(tokens));

        self.write_document(&document).await?;
        tracing::debug!(system = %record.system_id, path = %self.path.display(), "Saved tokens");
        Ok(())
    }

    async fn clear(&self, system_id: Option<&str>) -> Result<(), StorageError> {
        let mut document = self.read_document().await?;
        let mut tokens = self.tokens(&document);
        let changed = match system_id {
            Some(id) => tokens.remove(id).is_some(),
            None => {
                let had_any = !tokens.is_empty();
                tokens.clear();
                had_any
            }
        };
        if !changed {
            return Ok(());
        }

        document.insert(Value::from(TOKENS_KEY), Value::Mapping(tokens));
        self.write_document(&document).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use domain::{model::entity::TokenRecord, repository::TokenRepository};
    use indoc::indoc;

    use super::YamlTokenStore;

    fn record(system: &str, access: &str) -> TokenRecord {
        TokenRecord {
            system_id: system.to_owned(),
            access_token: access.to_owned(),
            refresh_token: format!("{access}-refresh"),
            expiry: Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap(),
            refresh_expiry: Some(Utc.with_ymd_and_hms(2030, 1, 8, 12, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlTokenStore::new(dir.path().join("tokens.yaml"));

        assert_eq!(None, store.load("narwhal").await.unwrap());
        let saved = record("narwhal", "a1");
        store.save(&saved).await.unwrap();
        assert_eq!(Some(saved), store.load("narwhal").await.unwrap());
    }

    #[tokio::test]
    async fn latest_save_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.yaml");
        let store = YamlTokenStore::new(&path);

        store.save(&record("narwhal", "a1")).await.unwrap();
        store.save(&record("onyx", "b1")).await.unwrap();
        store.save(&record("narwhal", "a2")).await.unwrap();

        let loaded = store.load("narwhal").await.unwrap().unwrap();
        assert_eq!("a2", loaded.access_token);
        assert_eq!("b1", store.load("onyx").await.unwrap().unwrap().access_token);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(1, text.matches("narwhal:").count());
        // only the target file is left behind
        assert_eq!(1, std::fs::read_dir(dir.path()).unwrap().count());
    }

    #[tokio::test]
    async fn concurrent_saves_leave_a_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.yaml");
        let first = YamlTokenStore::new(&path);
        let second = YamlTokenStore::new(&path);

        let record_a = record("narwhal", "a1");
        let record_b = record("onyx", "b1");
        let (a, b) = tokio::join!(first.save(&record_a), second.save(&record_b));
        a.unwrap();
        b.unwrap();

        let narwhal = first.load("narwhal").await.unwrap();
        let onyx = first.load("onyx").await.unwrap();
        assert!(narwhal.is_some() || onyx.is_some());
        assert_eq!(1, std::fs::read_dir(dir.path()).unwrap().count());
    }

    #[tokio::test]
    async fn keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uit");
        std::fs::write(
            &path,
            indoc! {"
                client_id: my-id
                client_secret: my-secret
            "},
        )
        .unwrap();

        let store = YamlTokenStore::new(&path);
        store.save(&record("narwhal", "a1")).await.unwrap();

        let document: serde_yaml_ng::Value =
            serde_yaml_ng::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(Some("my-id"), document["client_id"].as_str());
        assert_eq!(Some("a1"), document["tokens"]["narwhal"]["access_token"].as_str());
        assert_eq!(
            Some("2030-01-01T12:00:00Z"),
            document["tokens"]["narwhal"]["expiry"].as_str()
        );
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.yaml");
        let store = YamlTokenStore::new(&path);

        store.clear(Some("narwhal")).await.unwrap();
        store.clear(None).await.unwrap();
        assert!(!path.exists());

        store.save(&record("narwhal", "a1")).await.unwrap();
        store.save(&record("onyx", "b1")).await.unwrap();
        store.clear(Some("narwhal")).await.unwrap();
        store.clear(Some("narwhal")).await.unwrap();
        assert_eq!(None, store.load("narwhal").await.unwrap());
        assert!(store.load("onyx").await.unwrap().is_some());

        store.clear(None).await.unwrap();
        assert_eq!(None, store.load("onyx").await.unwrap());
    }

    #[tokio::test]
    async fn unrecognized_tokens_entry_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uit");
        std::fs::write(&path, "tokens:\n  - stale\n").unwrap();

        let store = YamlTokenStore::new(&path);
        assert_eq!(None, store.load("narwhal").await.unwrap());
        store.save(&record("narwhal", "a1")).await.unwrap();
        assert!(store.load("narwhal").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uit");
        std::fs::write(&path, "- just\n- a list\n").unwrap();

        let err = YamlTokenStore::new(&path).load("narwhal").await.unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.yaml");
        YamlTokenStore::new(&path)
            .save(&record("narwhal", "a1"))
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(0o600, mode & 0o777);
    }
}
