// File: src/repositories/credential_file.rs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::Error;
use miraibot_common::models::SessionCredential;
use miraibot_common::traits::repository_traits::CredentialStore;

/// Keeps the session credential in one JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so readers only ever see a complete document.
#[derive(Debug, Clone)]
pub struct JsonFileCredentialStore {
    path: PathBuf,
}

impl JsonFileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "appstate.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialStore for JsonFileCredentialStore {
    async fn load(&self) -> Result<Option<SessionCredential>, Error> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        let credential: SessionCredential = serde_json::from_slice(&raw)?;
        if credential.is_empty() {
            return Ok(None);
        }
        debug!("Loaded cached session {:?} from {}", credential, self.path.display());
        Ok(Some(credential))
    }

    async fn save(&self, credential: &SessionCredential) -> Result<(), Error> {
        let mut bytes = serde_json::to_vec_pretty(credential)?;
        bytes.push(b'\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Session credential written to {}", self.path.display());
        Ok(())
    }

    async fn delete(&self) -> Result<bool, Error> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Removed stale session credential at {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
