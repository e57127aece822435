use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::contract::BrokerType;
use crate::discovery::{MetadataValue, ServiceEntry};
use crate::error::BrokerError;

pub const SO_FILENAME_METADATA: &str = "org.khronos.openxr.OpenXRRuntime.SoFilename";
pub const MAJOR_VERSION_METADATA: &str = "org.khronos.openxr.OpenXRRuntime.MajorVersion";
pub const FUNCTIONS_METADATA_PREFIX: &str = "org.khronos.openxr.OpenXRRuntime.Functions.";

static FUNCTION_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^xr[A-Z]([a-z0-9]*)([0-9A-Z]([a-z0-9]*))*$").expect("static regex is valid")
});

/// Data describing a single installed OpenXR runtime.
///
/// The rough equivalent of the JSON manifest used by the OpenXR loader on
/// desktop platforms, populated from the metadata attached to a runtime's
/// advertised service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeData {
    /// Package name of the component that owns the runtime. Never empty.
    pub package_name: String,
    /// Directory containing the runtime library.
    pub native_library_dir: String,
    /// Filename of the library exposing the runtime entry points.
    pub so_filename: String,
    /// OpenXR major version implemented.
    pub major_version: u32,
    /// Function name to exported symbol remapping. May be empty.
    pub functions: BTreeMap<String, String>,
    /// The broker that reported this runtime.
    pub broker_type: BrokerType,
}

impl RuntimeData {
    pub fn new(
        package_name: impl Into<String>,
        native_library_dir: impl Into<String>,
        so_filename: impl Into<String>,
        major_version: u32,
        functions: impl IntoIterator<Item = (String, String)>,
        broker_type: Option<BrokerType>,
    ) -> Result<Self, BrokerError> {
        let package_name = package_name.into();
        if package_name.is_empty() {
            return Err(BrokerError::InvalidRuntime(
                "package name must not be empty".into(),
            ));
        }

        let functions = functions
            .into_iter()
            .filter(|(name, symbol)| !name.is_empty() && !symbol.is_empty())
            .collect();

        Ok(Self {
            package_name,
            native_library_dir: native_library_dir.into(),
            so_filename: so_filename.into(),
            major_version,
            functions,
            broker_type: broker_type.unwrap_or_default(),
        })
    }

    pub fn has_functions(&self) -> bool {
        !self.functions.is_empty()
    }

    /// Extract runtime data from the metadata of an advertised runtime service.
    ///
    /// Returns `None` when the service is not a usable OpenXR runtime: missing
    /// package name, missing library filename or missing major version.
    pub fn from_service_entry(entry: &ServiceEntry, abi: &str) -> Option<Self> {
        if entry.package_name.is_empty() {
            return None;
        }

        let so_filename = match entry.metadata.get(SO_FILENAME_METADATA) {
            Some(MetadataValue::String(s)) if !s.is_empty() => s.clone(),
            _ => {
                tracing::debug!(
                    package = %entry.package_name,
                    service = %entry.service_name,
                    "Service metadata lacks a runtime library filename"
                );
                return None;
            }
        };

        let major_version = match entry.metadata.get(MAJOR_VERSION_METADATA) {
            Some(MetadataValue::Integer(v)) => u32::try_from(*v).ok()?,
            Some(MetadataValue::String(s)) => s.trim().parse().ok()?,
            _ => {
                tracing::debug!(
                    package = %entry.package_name,
                    service = %entry.service_name,
                    "Service metadata lacks an OpenXR major version"
                );
                return None;
            }
        };

        RuntimeData::new(
            entry.package_name.clone(),
            entry.native_library_dir_for(abi),
            so_filename,
            major_version,
            functions_from_metadata(&entry.metadata),
            None,
        )
        .ok()
    }
}

/// Collect the function remapping entries of a service's metadata.
///
/// Keys must carry the functions prefix followed by a well-formed OpenXR
/// function name; values must be non-empty strings.
fn functions_from_metadata(metadata: &BTreeMap<String, MetadataValue>) -> Vec<(String, String)> {
    let mut functions: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in metadata {
        let Some(function) = key.strip_prefix(FUNCTIONS_METADATA_PREFIX) else {
            continue;
        };
        if !FUNCTION_NAME_RE.is_match(function) {
            tracing::debug!(key = %key, "Ignoring malformed function metadata key");
            continue;
        }
        if let MetadataValue::String(symbol) = value
            && !symbol.is_empty()
        {
            functions
                .entry(function.to_string())
                .or_insert_with(|| symbol.clone());
        }
    }
    functions.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(metadata: Vec<(&str, MetadataValue)>) -> ServiceEntry {
        ServiceEntry {
            package_name: "com.example.rt".into(),
            service_name: "com.example.rt.RuntimeService".into(),
            native_library_dir: "/data/app/com.example.rt/lib".into(),
            abi_library_dirs: BTreeMap::new(),
            metadata: metadata
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    #[test]
    fn rejects_empty_package_name() {
        let result = RuntimeData::new("", "/lib", "libr.so", 1, Vec::new(), None);
        assert!(matches!(result, Err(BrokerError::InvalidRuntime(_))));
    }

    #[test]
    fn drops_empty_function_entries() {
        let runtime = RuntimeData::new(
            "com.example.rt",
            "/lib",
            "librt.so",
            1,
            vec![
                ("xrCreateInstance".to_string(), "rt_xrCreateInstance".to_string()),
                ("".to_string(), "orphan".to_string()),
                ("xrDestroyInstance".to_string(), "".to_string()),
            ],
            None,
        )
        .unwrap();

        assert_eq!(runtime.functions.len(), 1);
        assert_eq!(runtime.broker_type, BrokerType::RuntimeBroker);
        assert!(runtime.has_functions());
    }

    #[test]
    fn extracts_runtime_from_metadata() {
        let e = entry(vec![
            (SO_FILENAME_METADATA, MetadataValue::String("libopenxr_rt.so".into())),
            (MAJOR_VERSION_METADATA, MetadataValue::Integer(1)),
            (
                "org.khronos.openxr.OpenXRRuntime.Functions.xrGetInstanceProcAddr",
                MetadataValue::String("rt_xrGetInstanceProcAddr".into()),
            ),
            (
                "org.khronos.openxr.OpenXRRuntime.Functions.notAFunction",
                MetadataValue::String("ignored".into()),
            ),
            (
                "org.khronos.openxr.OpenXRRuntime.Functions.xrCreateInstance",
                MetadataValue::Integer(3),
            ),
        ]);

        let runtime = RuntimeData::from_service_entry(&e, "arm64-v8a").unwrap();
        assert_eq!(runtime.package_name, "com.example.rt");
        assert_eq!(runtime.so_filename, "libopenxr_rt.so");
        assert_eq!(runtime.major_version, 1);
        assert_eq!(runtime.native_library_dir, "/data/app/com.example.rt/lib");
        assert_eq!(runtime.functions.len(), 1);
        assert_eq!(
            runtime.functions.get("xrGetInstanceProcAddr").map(String::as_str),
            Some("rt_xrGetInstanceProcAddr")
        );
    }

    #[test]
    fn missing_metadata_is_not_a_runtime() {
        let no_version = entry(vec![(
            SO_FILENAME_METADATA,
            MetadataValue::String("librt.so".into()),
        )]);
        assert!(RuntimeData::from_service_entry(&no_version, "arm64-v8a").is_none());

        let no_so = entry(vec![(MAJOR_VERSION_METADATA, MetadataValue::Integer(1))]);
        assert!(RuntimeData::from_service_entry(&no_so, "arm64-v8a").is_none());
    }

    #[test]
    fn version_may_be_a_string() {
        let e = entry(vec![
            (SO_FILENAME_METADATA, MetadataValue::String("librt.so".into())),
            (MAJOR_VERSION_METADATA, MetadataValue::String("1".into())),
        ]);
        let runtime = RuntimeData::from_service_entry(&e, "x86_64").unwrap();
        assert_eq!(runtime.major_version, 1);
        assert!(!runtime.has_functions());
    }
}
