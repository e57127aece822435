use thiserror::Error;

use crate::contract::BrokerType;

/// Failure to decode a broker content URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("could not parse URI: {0}")]
    Malformed(String),

    #[error("URI scheme was not the expected 'content': {0}")]
    WrongScheme(String),

    #[error("URI authority was not the expected value {expected}, but instead: {actual}")]
    WrongAuthority { expected: String, actual: String },

    #[error("URI path matched no broker table: {0}")]
    NoMatch(String),

    #[error("could not parse this as a major version number: {0}")]
    InvalidMajorVersion(String),

    #[error("could not parse this as a row number: {0}")]
    InvalidRow(String),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid column name passed: {column}")]
    InvalidColumn { column: String },

    #[error("invalid runtime data: {0}")]
    InvalidRuntime(String),

    #[error("runtime broker delegation cycle: {}", format_cycle(.0))]
    DelegationCycle(Vec<BrokerType>),

    #[error("service registry error: {0}")]
    Registry(String),

    #[error("preference store error: {0}")]
    Preference(String),

    #[error("row decode error: {0}")]
    Decode(String),
}

impl From<UriError> for BrokerError {
    fn from(e: UriError) -> Self {
        BrokerError::InvalidArgument(e.to_string())
    }
}

fn format_cycle(path: &[BrokerType]) -> String {
    path.iter()
        .map(|b| b.authority())
        .collect::<Vec<_>>()
        .join(" -> ")
}
