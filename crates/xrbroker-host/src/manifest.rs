use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::Deserialize;

use xrbroker_core::contract::RUNTIME_SERVICE_ACTION;
use xrbroker_core::discovery::MetadataValue;
use xrbroker_core::{BrokerError, ServiceEntry, ServiceRegistry};

use crate::error::HostError;

/// One installed service, as described by a `*.toml` manifest file.
///
/// ```toml
/// package_name = "com.example.runtime"
/// service_name = "com.example.runtime.RuntimeService"
/// native_library_dir = "/opt/example/lib"
///
/// [metadata]
/// "org.khronos.openxr.OpenXRRuntime.SoFilename" = "libexample_openxr.so"
/// "org.khronos.openxr.OpenXRRuntime.MajorVersion" = 1
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceManifest {
    #[serde(default = "default_action")]
    pub action: String,
    pub package_name: String,
    #[serde(default)]
    pub service_name: String,
    pub native_library_dir: String,
    #[serde(default)]
    pub abi_library_dirs: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

fn default_action() -> String {
    RUNTIME_SERVICE_ACTION.into()
}

impl ServiceManifest {
    pub fn from_toml(content: &str) -> Result<Self, HostError> {
        Ok(toml::from_str(content)?)
    }

    pub fn into_entry(self) -> ServiceEntry {
        let service_name = if self.service_name.is_empty() {
            self.package_name.clone()
        } else {
            self.service_name
        };
        ServiceEntry {
            package_name: self.package_name,
            service_name,
            native_library_dir: self.native_library_dir,
            abi_library_dirs: self.abi_library_dirs,
            metadata: self.metadata,
        }
    }
}

/// Service registry backed by directories of manifest files.
///
/// Directories are rescanned on every query, so installing or removing a
/// manifest takes effect on the next lookup. Unreadable or malformed
/// manifests are skipped with a warning; a missing directory is empty.
#[derive(Debug, Clone, Default)]
pub struct ManifestDirRegistry {
    dirs: Vec<PathBuf>,
}

impl ManifestDirRegistry {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    async fn scan_dir(dir: &Path) -> Result<Vec<ServiceManifest>, HostError> {
        let mut reader = match tokio::fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = %dir.display(), "Manifest directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut manifests = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(content) => ServiceManifest::from_toml(&content),
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable manifest");
                }
            }
        }
        Ok(manifests)
    }
}

impl ServiceRegistry for ManifestDirRegistry {
    fn query_services<'a>(
        &'a self,
        action: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ServiceEntry>, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            let mut services = Vec::new();
            for dir in &self.dirs {
                let manifests = Self::scan_dir(dir).await.map_err(|e| HostError::ManifestError {
                    path: dir.display().to_string(),
                    message: e.to_string(),
                })?;
                services.extend(
                    manifests
                        .into_iter()
                        .filter(|m| m.action == action)
                        .map(ServiceManifest::into_entry),
                );
            }
            tracing::debug!(action = %action, count = services.len(), "Scanned service manifests");
            Ok(services)
        })
    }
}
