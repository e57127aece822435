//! Query protocol of the OpenXR runtime broker.
//!
//! Applications find the active OpenXR runtime by querying a broker with
//! `content://` URIs. The broker parses the URI, asks its chooser which
//! runtime is active, and answers with a small virtual table.

pub mod chooser;
pub mod client;
pub mod contract;
pub mod deployment;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod preference;
pub mod runtime;
pub mod table;
pub mod uri;

pub use chooser::{NoChoiceChooser, RuntimeChooser, SystemDelegateChooser, UserSelectedChooser};
pub use client::{BrokerProvider, BrokerResolver, query_functions, query_other_broker};
pub use contract::BrokerType;
pub use deployment::{BrokerDeployment, DelegationGraph};
pub use discovery::{
    LocalRuntimes, RuntimeEnumerator, RuntimeSource, ServiceEntry, ServiceRegistry,
    StaticServiceRegistry, find_runtimes,
};
pub use engine::RuntimeBroker;
pub use error::{BrokerError, UriError};
pub use preference::{MemoryPreferenceStore, PreferenceStore};
pub use runtime::RuntimeData;
pub use table::{CellValue, RowSet};
pub use uri::{BrokerUriParser, ParsedBrokerUri, TableType};
