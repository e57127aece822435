//! Names shared by every party of the broker protocol: authorities, path
//! components, column names and URI builders.

use serde::{Deserialize, Serialize};
use url::Url;

/// URI authority of the user-preference-controlled installable broker.
pub const AUTHORITY: &str = "org.khronos.openxr.runtime_broker";
/// URI authority of the system/vendor-provided broker.
pub const SYSTEM_AUTHORITY: &str = "org.khronos.openxr.system_runtime_broker";

pub const CONTENT_SCHEME: &str = "content";
pub const BASE_PATH: &str = "openxr";
pub const ABI_PATH: &str = "abi";
pub const RUNTIMES_PATH: &str = "runtimes";

/// Service action advertised by every installed OpenXR runtime.
pub const RUNTIME_SERVICE_ACTION: &str = "org.khronos.openxr.OpenXRRuntimeService";

/// Which broker answers a query.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum BrokerType {
    /// Application-facing, installable broker.
    #[default]
    RuntimeBroker,
    /// Privileged, system-facing broker.
    SystemRuntimeBroker,
}

impl BrokerType {
    pub fn authority(&self) -> &'static str {
        match self {
            BrokerType::RuntimeBroker => AUTHORITY,
            BrokerType::SystemRuntimeBroker => SYSTEM_AUTHORITY,
        }
    }

    pub fn from_authority(authority: &str) -> Option<Self> {
        match authority {
            AUTHORITY => Some(BrokerType::RuntimeBroker),
            SYSTEM_AUTHORITY => Some(BrokerType::SystemRuntimeBroker),
            _ => None,
        }
    }
}

impl std::fmt::Display for BrokerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerType::RuntimeBroker => write!(f, "runtime_broker"),
            BrokerType::SystemRuntimeBroker => write!(f, "system_runtime_broker"),
        }
    }
}

/// The `/openxr/[major_ver]/abi/[abi]/runtimes/active` table.
///
/// Holds at most one row: the currently active runtime. Which runtime is
/// active is decided by the broker's chooser.
pub mod active_runtime {
    use super::*;

    pub const TABLE_PATH: &str = "active";

    /// Column names of the active runtime table.
    pub mod columns {
        pub const ID: &str = "_id";
        pub const PACKAGE_NAME: &str = "package_name";
        /// Absolute path of the directory holding the runtime library.
        pub const NATIVE_LIB_DIR: &str = "native_lib_dir";
        pub const SO_FILENAME: &str = "so_filename";
        /// Nonzero when the functions table for this runtime is worth querying.
        pub const HAS_FUNCTIONS: &str = "has_functions";

        pub const ALL: [&str; 5] = [ID, PACKAGE_NAME, NATIVE_LIB_DIR, SO_FILENAME, HAS_FUNCTIONS];
    }

    /// URI for the single active-runtime item (row 0).
    pub fn content_uri(broker_type: BrokerType, major_version: u32, abi: &str) -> Url {
        let mut url = base_uri(broker_type, major_version, abi);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(TABLE_PATH).push("0");
        }
        url
    }
}

/// The `/openxr/[major_ver]/abi/[abi]/runtimes/[package]/functions` table.
///
/// Optional function-name to symbol-name remapping of a runtime, akin to the
/// `functions` object of the desktop JSON manifest.
pub mod functions {
    use super::*;

    pub const TABLE_PATH: &str = "functions";

    pub mod columns {
        pub const ID: &str = "_id";
        /// Function name as written in the OpenXR specification.
        pub const FUNCTION_NAME: &str = "function_name";
        /// Symbol to load from the runtime library.
        pub const SYMBOL_NAME: &str = "symbol_name";

        pub const ALL: [&str; 3] = [ID, FUNCTION_NAME, SYMBOL_NAME];
    }

    /// URI for every row of a runtime's function remapping table.
    pub fn content_uri(
        broker_type: BrokerType,
        major_version: u32,
        package_name: &str,
        abi: &str,
    ) -> Url {
        let mut url = base_uri(broker_type, major_version, abi);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(package_name).push(TABLE_PATH);
        }
        url
    }
}

fn base_uri(broker_type: BrokerType, major_version: u32, abi: &str) -> Url {
    let mut url = Url::parse(&format!(
        "{CONTENT_SCHEME}://{}/",
        broker_type.authority()
    ))
    .expect("broker authorities are valid URI hosts");
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .push(BASE_PATH)
            .push(&major_version.to_string())
            .push(ABI_PATH)
            .push(abi)
            .push(RUNTIMES_PATH);
    }
    url
}
