use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::{BrokerResolver, query_other_broker};
use crate::contract::{BrokerType, RUNTIME_SERVICE_ACTION};
use crate::error::BrokerError;
use crate::runtime::RuntimeData;

/// A single metadata value attached to an advertised service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

/// One service advertised by an installed component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub package_name: String,
    pub service_name: String,
    /// Default native library directory of the owning component.
    pub native_library_dir: String,
    /// Per-ABI overrides of `native_library_dir`.
    #[serde(default)]
    pub abi_library_dirs: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl ServiceEntry {
    pub fn native_library_dir_for(&self, abi: &str) -> String {
        self.abi_library_dirs
            .get(abi)
            .cloned()
            .unwrap_or_else(|| self.native_library_dir.clone())
    }
}

/// Lookup of installed components advertising a service action.
///
/// This is the host's package registry; it is abstracted so brokers can run
/// against a manifest directory or a fixed in-memory list.
pub trait ServiceRegistry: Send + Sync {
    fn query_services<'a>(
        &'a self,
        action: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ServiceEntry>, BrokerError>> + Send + 'a>>;
}

/// Fixed set of services, keyed by the action they advertise.
#[derive(Debug, Default)]
pub struct StaticServiceRegistry {
    services: Vec<(String, ServiceEntry)>,
}

impl StaticServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service for the OpenXR runtime action.
    pub fn with_runtime_service(mut self, entry: ServiceEntry) -> Self {
        self.services.push((RUNTIME_SERVICE_ACTION.to_string(), entry));
        self
    }

    pub fn with_service(mut self, action: impl Into<String>, entry: ServiceEntry) -> Self {
        self.services.push((action.into(), entry));
        self
    }
}

impl ServiceRegistry for StaticServiceRegistry {
    fn query_services<'a>(
        &'a self,
        action: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ServiceEntry>, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .services
                .iter()
                .filter(|(a, _)| a == action)
                .map(|(_, entry)| entry.clone())
                .collect())
        })
    }
}

/// Find every installed OpenXR runtime for an ABI, including inactive ones.
///
/// When `major_version` is given, runtimes implementing any other major
/// version are dropped after the full list is built. No runtimes is an empty
/// list, not an error.
pub async fn find_runtimes(
    registry: &dyn ServiceRegistry,
    abi: &str,
    major_version: Option<u32>,
) -> Result<Vec<RuntimeData>, BrokerError> {
    let services = registry.query_services(RUNTIME_SERVICE_ACTION).await?;
    if services.is_empty() {
        tracing::warn!(action = RUNTIME_SERVICE_ACTION, "Got no services for runtime action");
        return Ok(Vec::new());
    }

    let mut runtimes = Vec::with_capacity(services.len());
    for service in &services {
        tracing::debug!(package = %service.package_name, "Considering runtime service");
        match RuntimeData::from_service_entry(service, abi) {
            Some(runtime) => {
                tracing::info!(
                    package = %runtime.package_name,
                    so_filename = %runtime.so_filename,
                    major_version = runtime.major_version,
                    "Found OpenXR runtime"
                );
                runtimes.push(runtime);
            }
            None => {
                tracing::warn!(
                    package = %service.package_name,
                    service = %service.service_name,
                    "Skipping service without usable runtime metadata"
                );
            }
        }
    }

    if let Some(major) = major_version {
        runtimes.retain(|r| r.major_version == major);
        if runtimes.is_empty() {
            tracing::warn!(major_version = major, "No OpenXR runtimes of major version found");
        }
    }

    Ok(runtimes)
}

/// Where a chooser gets its candidate runtimes from.
pub trait RuntimeSource: Send + Sync {
    fn candidates<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RuntimeData>, BrokerError>> + Send + 'a>>;

    /// The other broker consulted while producing candidates, if any.
    fn delegates_to(&self) -> Option<BrokerType> {
        None
    }
}

/// Candidates from the local service registry only.
pub struct LocalRuntimes {
    registry: Arc<dyn ServiceRegistry>,
}

impl LocalRuntimes {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }
}

impl RuntimeSource for LocalRuntimes {
    fn candidates<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RuntimeData>, BrokerError>> + Send + 'a>> {
        Box::pin(find_runtimes(self.registry.as_ref(), abi, Some(major_version)))
    }
}

/// Lists every runtime an application-facing broker can offer.
///
/// Folds the runtime reported by the system broker (if any) into the local
/// discovery results, so a consumer only has to talk to one broker.
pub struct RuntimeEnumerator {
    registry: Arc<dyn ServiceRegistry>,
    resolver: BrokerResolver,
    delegate: BrokerType,
}

impl RuntimeEnumerator {
    pub fn new(registry: Arc<dyn ServiceRegistry>, resolver: BrokerResolver) -> Self {
        Self {
            registry,
            resolver,
            delegate: BrokerType::SystemRuntimeBroker,
        }
    }

    pub async fn available_runtimes(
        &self,
        major_version: u32,
        abi: &str,
    ) -> Result<Vec<RuntimeData>, BrokerError> {
        let mut runtimes = find_runtimes(self.registry.as_ref(), abi, Some(major_version)).await?;

        if let Some(delegated) =
            query_other_broker(&self.resolver, self.delegate, major_version, abi).await?
        {
            tracing::debug!(
                package = %delegated.package_name,
                broker = %self.delegate,
                "Delegated broker reported a runtime"
            );
            runtimes.retain(|r| r.package_name != delegated.package_name);
            runtimes.push(delegated);
        }

        Ok(runtimes)
    }
}

impl RuntimeSource for RuntimeEnumerator {
    fn candidates<'a>(
        &'a self,
        major_version: u32,
        abi: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RuntimeData>, BrokerError>> + Send + 'a>> {
        Box::pin(self.available_runtimes(major_version, abi))
    }

    fn delegates_to(&self) -> Option<BrokerType> {
        Some(self.delegate)
    }
}
