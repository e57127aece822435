use percent_encoding::percent_decode_str;
use url::Url;

use crate::contract::{
    ABI_PATH, BASE_PATH, BrokerType, CONTENT_SCHEME, RUNTIMES_PATH, active_runtime, functions,
};
use crate::error::UriError;

/// Which virtual table a URI addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    ActiveRuntime,
    Functions,
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableType::ActiveRuntime => write!(f, "activeRuntime"),
            TableType::Functions => write!(f, "{}", functions::TABLE_PATH),
        }
    }
}

/// Everything carried by a broker content URI, parsed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBrokerUri {
    pub broker_type: BrokerType,
    pub table_type: TableType,
    pub major_version: u32,
    pub abi: String,
    /// Only set for [`TableType::Functions`].
    pub package_name: Option<String>,
    /// Row ordinal; `None` means the URI addresses the whole table.
    pub row: Option<u32>,
}

impl ParsedBrokerUri {
    pub fn is_dir(&self) -> bool {
        self.row.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Literal(&'static str),
    /// `#` in a content URI pattern: a decimal number.
    Number,
    /// `*` in a content URI pattern: any single segment.
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteCode {
    ActiveRuntimeDir,
    ActiveRuntimeItem,
    FunctionsDir,
    FunctionsItem,
}

#[derive(Debug)]
struct Route {
    pattern: Vec<Segment>,
    code: RouteCode,
}

impl Route {
    fn matches(&self, segments: &[&str]) -> bool {
        self.pattern.len() == segments.len()
            && self
                .pattern
                .iter()
                .zip(segments)
                .all(|(pattern, segment)| match pattern {
                    Segment::Literal(lit) => lit == segment,
                    Segment::Number => {
                        !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
                    }
                    Segment::Any => !segment.is_empty(),
                })
    }
}

// Positions of the captured segments, shared by every route.
const MAJOR_VERSION_SEGMENT: usize = 1;
const ABI_SEGMENT: usize = 3;
const PACKAGE_SEGMENT: usize = 5;

/// Parser for one broker's content URIs.
///
/// The routing table is built once for the broker's authority and never
/// mutated afterwards. URIs addressed to another authority never match.
#[derive(Debug)]
pub struct BrokerUriParser {
    broker_type: BrokerType,
    routes: Vec<Route>,
}

impl BrokerUriParser {
    pub fn new(broker_type: BrokerType) -> Self {
        use Segment::*;

        // openxr/#/abi/*/runtimes
        let base = vec![
            Literal(BASE_PATH),
            Number,
            Literal(ABI_PATH),
            Any,
            Literal(RUNTIMES_PATH),
        ];

        let mut active_dir = base.clone();
        active_dir.push(Literal(active_runtime::TABLE_PATH));
        let mut active_item = active_dir.clone();
        active_item.push(Number);

        let mut functions_dir = base;
        functions_dir.push(Any);
        functions_dir.push(Literal(functions::TABLE_PATH));
        let mut functions_item = functions_dir.clone();
        functions_item.push(Number);

        tracing::trace!(authority = broker_type.authority(), "Built broker URI routes");

        Self {
            broker_type,
            routes: vec![
                Route {
                    pattern: active_dir,
                    code: RouteCode::ActiveRuntimeDir,
                },
                Route {
                    pattern: active_item,
                    code: RouteCode::ActiveRuntimeItem,
                },
                Route {
                    pattern: functions_dir,
                    code: RouteCode::FunctionsDir,
                },
                Route {
                    pattern: functions_item,
                    code: RouteCode::FunctionsItem,
                },
            ],
        }
    }

    pub fn broker_type(&self) -> BrokerType {
        self.broker_type
    }

    pub fn authority(&self) -> &'static str {
        self.broker_type.authority()
    }

    /// Parse a content URI addressed to this parser's broker.
    pub fn parse(&self, uri: &str) -> Result<ParsedBrokerUri, UriError> {
        let url = Url::parse(uri).map_err(|e| {
            tracing::warn!(uri = %uri, error = %e, "Could not parse URI");
            UriError::Malformed(uri.to_string())
        })?;
        self.parse_url(&url)
    }

    fn parse_url(&self, url: &Url) -> Result<ParsedBrokerUri, UriError> {
        if url.scheme() != CONTENT_SCHEME {
            tracing::warn!(scheme = %url.scheme(), "URI scheme was not the expected 'content'");
            return Err(UriError::WrongScheme(url.scheme().to_string()));
        }

        let authority = url.host_str().unwrap_or_default();
        if authority != self.authority() || url.port().is_some() {
            tracing::warn!(
                expected = self.authority(),
                actual = %authority,
                "URI authority was not the expected value"
            );
            return Err(UriError::WrongAuthority {
                expected: self.authority().to_string(),
                actual: authority.to_string(),
            });
        }

        let mut decoded = Vec::new();
        for segment in url.path_segments().into_iter().flatten() {
            let segment = percent_decode_str(segment).decode_utf8().map_err(|_| {
                tracing::warn!(path = %url.path(), "URI path segment is not valid UTF-8");
                UriError::Malformed(url.to_string())
            })?;
            decoded.push(segment);
        }
        let segments: Vec<&str> = decoded.iter().map(AsRef::as_ref).collect();

        let code = self
            .routes
            .iter()
            .find(|route| route.matches(&segments))
            .map(|route| route.code)
            .ok_or_else(|| {
                tracing::warn!(path = %url.path(), "URI match failed");
                UriError::NoMatch(url.path().to_string())
            })?;

        let major_version = segments[MAJOR_VERSION_SEGMENT]
            .parse::<u32>()
            .map_err(|_| UriError::InvalidMajorVersion(segments[MAJOR_VERSION_SEGMENT].into()))?;

        let (table_type, is_dir) = match code {
            RouteCode::ActiveRuntimeDir => (TableType::ActiveRuntime, true),
            RouteCode::ActiveRuntimeItem => (TableType::ActiveRuntime, false),
            RouteCode::FunctionsDir => (TableType::Functions, true),
            RouteCode::FunctionsItem => (TableType::Functions, false),
        };

        let row = if is_dir {
            None
        } else {
            let last = segments[segments.len() - 1];
            Some(
                last.parse::<u32>()
                    .map_err(|_| UriError::InvalidRow(last.into()))?,
            )
        };

        let package_name = match table_type {
            TableType::Functions => Some(segments[PACKAGE_SEGMENT].to_string()),
            TableType::ActiveRuntime => None,
        };

        Ok(ParsedBrokerUri {
            broker_type: self.broker_type,
            table_type,
            major_version,
            abi: segments[ABI_SEGMENT].to_string(),
            package_name,
            row,
        })
    }
}
