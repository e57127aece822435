//! Client side of the broker process boundary.
//!
//! A broker never holds another broker directly. It resolves the other
//! broker's authority through a [`BrokerResolver`] and talks to it through the
//! same [`BrokerProvider`] contract any application would use.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use url::Url;

use crate::contract::{BrokerType, active_runtime, functions};
use crate::error::BrokerError;
use crate::runtime::RuntimeData;
use crate::table::{CellValue, RowSet};

/// The query contract every broker exposes across the process boundary.
///
/// The directory is read-only: the mutating operations exist so callers get
/// a definite "nothing changed" answer, and never modify anything.
pub trait BrokerProvider: Send + Sync {
    fn authority(&self) -> &str;

    /// Media type of the table a URI addresses.
    fn get_type(&self, uri: &str) -> Result<String, BrokerError>;

    /// Query a virtual table. `selection` and `sort_order` must be `None`.
    fn query<'a>(
        &'a self,
        uri: &'a str,
        projection: &'a [&'a str],
        selection: Option<&'a str>,
        sort_order: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<RowSet, BrokerError>> + Send + 'a>>;

    fn insert(&self, _uri: &str, _values: &BTreeMap<String, CellValue>) -> Option<String> {
        None
    }

    fn update(
        &self,
        _uri: &str,
        _values: &BTreeMap<String, CellValue>,
        _selection: Option<&str>,
    ) -> usize {
        0
    }

    fn delete(&self, _uri: &str, _selection: Option<&str>) -> usize {
        0
    }
}

/// Routes content URIs to the broker registered for their authority.
#[derive(Clone, Default)]
pub struct BrokerResolver {
    providers: HashMap<String, Arc<dyn BrokerProvider>>,
}

impl BrokerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn BrokerProvider>) -> Self {
        self.providers
            .insert(provider.authority().to_string(), provider);
        self
    }

    pub fn provider(&self, authority: &str) -> Option<&Arc<dyn BrokerProvider>> {
        self.providers.get(authority)
    }

    fn provider_for(&self, uri: &str) -> Result<Option<&Arc<dyn BrokerProvider>>, BrokerError> {
        let url = Url::parse(uri)
            .map_err(|e| BrokerError::InvalidArgument(format!("could not parse URI {uri}: {e}")))?;
        let authority = url.host_str().unwrap_or_default();
        let provider = self.provider(authority);
        if provider.is_none() {
            tracing::warn!(authority = %authority, "No broker registered for authority");
        }
        Ok(provider)
    }

    /// Query whichever broker owns the URI's authority.
    ///
    /// `Ok(None)` means no such broker is reachable, which callers treat as
    /// "that broker has no answer".
    pub async fn query(
        &self,
        uri: &str,
        projection: &[&str],
    ) -> Result<Option<RowSet>, BrokerError> {
        match self.provider_for(uri)? {
            Some(provider) => Ok(Some(provider.query(uri, projection, None, None).await?)),
            None => Ok(None),
        }
    }

    pub fn get_type(&self, uri: &str) -> Result<Option<String>, BrokerError> {
        match self.provider_for(uri)? {
            Some(provider) => Ok(Some(provider.get_type(uri)?)),
            None => Ok(None),
        }
    }
}

const ACTIVE_RUNTIME_PROJECTION: [&str; 4] = [
    active_runtime::columns::PACKAGE_NAME,
    active_runtime::columns::NATIVE_LIB_DIR,
    active_runtime::columns::SO_FILENAME,
    active_runtime::columns::HAS_FUNCTIONS,
];

const FUNCTIONS_PROJECTION: [&str; 2] = [
    functions::columns::FUNCTION_NAME,
    functions::columns::SYMBOL_NAME,
];

fn required_str<'r>(rows: &'r RowSet, row: usize, column: &str) -> Result<&'r str, BrokerError> {
    rows.get_str(row, column)
        .ok_or_else(|| BrokerError::Decode(format!("missing text column {column}")))
}

/// Ask another broker for its active runtime.
///
/// The returned record carries `broker_type`. Its function map is filled from
/// a second query against that broker's functions table when the active
/// runtime row says it has functions.
pub async fn query_other_broker(
    resolver: &BrokerResolver,
    broker_type: BrokerType,
    major_version: u32,
    abi: &str,
) -> Result<Option<RuntimeData>, BrokerError> {
    let uri = active_runtime::content_uri(broker_type, major_version, abi);
    tracing::debug!(uri = %uri, "Querying other broker for its active runtime");

    let Some(rows) = resolver.query(uri.as_str(), &ACTIVE_RUNTIME_PROJECTION).await? else {
        return Ok(None);
    };
    if rows.is_empty() {
        return Ok(None);
    }

    let package_name = required_str(&rows, 0, active_runtime::columns::PACKAGE_NAME)?;
    let native_library_dir = required_str(&rows, 0, active_runtime::columns::NATIVE_LIB_DIR)?;
    let so_filename = required_str(&rows, 0, active_runtime::columns::SO_FILENAME)?;
    let has_functions = rows
        .get_i64(0, active_runtime::columns::HAS_FUNCTIONS)
        .unwrap_or(0)
        != 0;

    let functions = if has_functions {
        query_functions(resolver, broker_type, major_version, abi, package_name).await?
    } else {
        BTreeMap::new()
    };

    RuntimeData::new(
        package_name,
        native_library_dir,
        so_filename,
        major_version,
        functions,
        Some(broker_type),
    )
    .map(Some)
}

/// Read a runtime's whole function remapping table from another broker.
pub async fn query_functions(
    resolver: &BrokerResolver,
    broker_type: BrokerType,
    major_version: u32,
    abi: &str,
    package_name: &str,
) -> Result<BTreeMap<String, String>, BrokerError> {
    let uri = functions::content_uri(broker_type, major_version, package_name, abi);
    let Some(rows) = resolver.query(uri.as_str(), &FUNCTIONS_PROJECTION).await? else {
        return Ok(BTreeMap::new());
    };

    let mut map = BTreeMap::new();
    for row in 0..rows.len() {
        let function = required_str(&rows, row, functions::columns::FUNCTION_NAME)?;
        let symbol = required_str(&rows, row, functions::columns::SYMBOL_NAME)?;
        map.insert(function.to_string(), symbol.to_string());
    }
    Ok(map)
}
