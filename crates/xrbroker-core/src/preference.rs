use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use crate::error::BrokerError;

/// Preference key holding the package name of the user-selected runtime.
pub const SELECTED_RUNTIME_KEY: &str = "selected_runtime";

/// Opaque string key-value store for persisted broker preferences.
///
/// Writes are last-writer-wins; nothing spans a read and a following write.
pub trait PreferenceStore: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, BrokerError>> + Send + 'a>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>>;

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>>;

    /// Backend name for logging.
    fn backend_name(&self) -> &str;
}

/// In-memory preference store, for tests and single-process setups.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selected_runtime(package_name: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(SELECTED_RUNTIME_KEY.to_string(), package_name.to_string());
        Self {
            values: RwLock::new(values),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, BrokerError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.values.read().await.get(key).cloned()) })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            self.values
                .write()
                .await
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            self.values.write().await.remove(key);
            Ok(())
        })
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
