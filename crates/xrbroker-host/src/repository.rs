use std::sync::Arc;

use xrbroker_core::preference::SELECTED_RUNTIME_KEY;
use xrbroker_core::{BrokerError, PreferenceStore, RuntimeData, ServiceRegistry, find_runtimes};

/// Installed runtimes plus the persisted user selection among them.
///
/// This is the management side of the user-selected chooser: it lists what
/// can be selected and writes the preference the chooser reads back.
pub struct RuntimeRepository {
    registry: Arc<dyn ServiceRegistry>,
    preferences: Arc<dyn PreferenceStore>,
}

impl RuntimeRepository {
    pub fn new(registry: Arc<dyn ServiceRegistry>, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self {
            registry,
            preferences,
        }
    }

    /// Every installed runtime for an ABI, newest major version first.
    pub async fn installed_runtimes(&self, abi: &str) -> Result<Vec<RuntimeData>, BrokerError> {
        let mut runtimes = find_runtimes(self.registry.as_ref(), abi, None).await?;
        runtimes.sort_by(|a, b| {
            b.major_version
                .cmp(&a.major_version)
                .then_with(|| a.package_name.cmp(&b.package_name))
        });
        Ok(runtimes)
    }

    pub async fn selected_runtime(&self) -> Result<Option<String>, BrokerError> {
        Ok(self
            .preferences
            .get(SELECTED_RUNTIME_KEY)
            .await?
            .filter(|package| !package.is_empty()))
    }

    pub async fn is_selected(&self, package_name: &str) -> Result<bool, BrokerError> {
        Ok(self.selected_runtime().await?.as_deref() == Some(package_name))
    }

    /// Select `package_name`, or clear the selection when `selected` is false.
    pub async fn update_runtime_selection(
        &self,
        package_name: &str,
        selected: bool,
    ) -> Result<(), BrokerError> {
        if selected {
            self.preferences
                .set(SELECTED_RUNTIME_KEY, package_name)
                .await?;
        } else {
            self.preferences.remove(SELECTED_RUNTIME_KEY).await?;
        }
        tracing::info!(
            package = %package_name,
            selected,
            backend = self.preferences.backend_name(),
            "Runtime selection updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use xrbroker_core::discovery::MetadataValue;
    use xrbroker_core::runtime::{MAJOR_VERSION_METADATA, SO_FILENAME_METADATA};
    use xrbroker_core::{MemoryPreferenceStore, ServiceEntry, StaticServiceRegistry};

    use super::*;

    fn entry(package: &str, major: i64) -> ServiceEntry {
        ServiceEntry {
            package_name: package.into(),
            service_name: package.into(),
            native_library_dir: "/opt/lib".into(),
            abi_library_dirs: BTreeMap::new(),
            metadata: [
                (
                    SO_FILENAME_METADATA.to_string(),
                    MetadataValue::String("libopenxr.so".into()),
                ),
                (MAJOR_VERSION_METADATA.to_string(), MetadataValue::Integer(major)),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn repository() -> RuntimeRepository {
        let registry = StaticServiceRegistry::new()
            .with_runtime_service(entry("com.example.b", 1))
            .with_runtime_service(entry("com.example.old", 0))
            .with_runtime_service(entry("com.example.a", 1))
            .with_runtime_service(entry("com.example.next", 2));
        RuntimeRepository::new(Arc::new(registry), Arc::new(MemoryPreferenceStore::new()))
    }

    #[tokio::test]
    async fn installed_runtimes_sorted_by_major_then_package() {
        let packages: Vec<String> = repository()
            .installed_runtimes("arm64")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.package_name)
            .collect();
        assert_eq!(
            packages,
            [
                "com.example.next",
                "com.example.a",
                "com.example.b",
                "com.example.old"
            ]
        );
    }

    #[tokio::test]
    async fn selection_round_trip() {
        let repo = repository();
        assert_eq!(repo.selected_runtime().await.unwrap(), None);

        repo.update_runtime_selection("com.example.a", true)
            .await
            .unwrap();
        assert!(repo.is_selected("com.example.a").await.unwrap());
        assert!(!repo.is_selected("com.example.b").await.unwrap());

        repo.update_runtime_selection("com.example.a", false)
            .await
            .unwrap();
        assert_eq!(repo.selected_runtime().await.unwrap(), None);
    }
}
