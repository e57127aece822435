use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;

use xrbroker_core::{BrokerError, PreferenceStore};

use crate::error::HostError;

/// Preference store persisted as a flat JSON object on disk.
///
/// A missing file reads as an empty store. Every write rewrites the whole
/// file; concurrent writers in other processes are last-writer-wins.
pub struct FilePreferenceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, HostError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, values: &BTreeMap<String, String>) -> Result<(), HostError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(values)?;
        tokio::fs::write(&self.path, json).await?;
        tracing::debug!(path = %self.path.display(), keys = values.len(), "Preferences saved");
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> Result<(), HostError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        if apply(&mut values) {
            self.save(&values).await?;
        }
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            let mut values = self.load().await?;
            Ok(values.remove(key))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            self.update(|values| {
                values.insert(key.to_string(), value.to_string());
                true
            })
            .await?;
            Ok(())
        })
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            self.update(|values| values.remove(key).is_some()).await?;
            Ok(())
        })
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}
