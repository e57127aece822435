use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::chooser::RuntimeChooser;
use crate::client::BrokerProvider;
use crate::contract::{AUTHORITY, BrokerType};
use crate::error::BrokerError;
use crate::table::{ActiveRuntimeTableBuilder, FunctionsTableBuilder, RowSet};
use crate::uri::{BrokerUriParser, ParsedBrokerUri, TableType};

/// An OpenXR runtime broker: answers which runtime is active and what
/// symbols it exports.
///
/// Both the application-facing and the system-facing broker are instances of
/// this type, differing only in broker type and chooser.
pub struct RuntimeBroker {
    parser: BrokerUriParser,
    chooser: Arc<dyn RuntimeChooser>,
}

impl RuntimeBroker {
    pub fn new(broker_type: BrokerType, chooser: Arc<dyn RuntimeChooser>) -> Self {
        tracing::info!(
            broker = %broker_type,
            chooser = chooser.name(),
            "Runtime broker created"
        );
        Self {
            parser: BrokerUriParser::new(broker_type),
            chooser,
        }
    }

    pub fn broker_type(&self) -> BrokerType {
        self.parser.broker_type()
    }

    pub fn chooser(&self) -> &dyn RuntimeChooser {
        self.chooser.as_ref()
    }

    fn parse(&self, uri: &str) -> Result<ParsedBrokerUri, BrokerError> {
        self.parser
            .parse(uri)
            .map_err(|e| BrokerError::InvalidArgument(format!("could not parse URI {uri}: {e}")))
    }

    async fn query_active_runtime(
        &self,
        parsed: &ParsedBrokerUri,
        projection: &[&str],
    ) -> Result<RowSet, BrokerError> {
        let mut builder = ActiveRuntimeTableBuilder::new(projection)?;

        // This table has at most one row, so asking for row 0 and asking for
        // the whole table are equivalent.
        if parsed.row.unwrap_or(0) != 0 {
            return Ok(builder.build());
        }

        let runtime = self
            .chooser
            .active_runtime(parsed.major_version, &parsed.abi)
            .await?;
        if let Some(runtime) = runtime {
            tracing::info!(
                broker = %self.broker_type(),
                package = %runtime.package_name,
                native_lib_dir = %runtime.native_library_dir,
                so_filename = %runtime.so_filename,
                "Returning runtime"
            );
            builder.add_row(0, &runtime);
        }
        Ok(builder.build())
    }

    async fn query_functions(
        &self,
        parsed: &ParsedBrokerUri,
        projection: &[&str],
    ) -> Result<RowSet, BrokerError> {
        let runtime = self
            .chooser
            .active_runtime(parsed.major_version, &parsed.abi)
            .await?;

        // Only the runtime actually in effect exposes its function table.
        let runtime = runtime.filter(|r| Some(&r.package_name) == parsed.package_name.as_ref());
        if runtime.is_none() {
            tracing::debug!(
                broker = %self.broker_type(),
                package = ?parsed.package_name,
                "Requested package is not the active runtime"
            );
        }

        let mut builder = FunctionsTableBuilder::new(runtime.as_ref(), projection)?;
        match parsed.row {
            Some(row) => builder.add_row(row),
            None => builder.add_all_rows(),
        }
        Ok(builder.build())
    }
}

fn make_mime(is_dir: bool, table: TableType) -> String {
    format!(
        "vnd.android.cursor.{}/vnd.{AUTHORITY}.{table}",
        if is_dir { "dir" } else { "item" }
    )
}

impl BrokerProvider for RuntimeBroker {
    fn authority(&self) -> &str {
        self.parser.authority()
    }

    fn get_type(&self, uri: &str) -> Result<String, BrokerError> {
        let parsed = self.parse(uri)?;
        Ok(make_mime(parsed.is_dir(), parsed.table_type))
    }

    fn query<'a>(
        &'a self,
        uri: &'a str,
        projection: &'a [&'a str],
        selection: Option<&'a str>,
        sort_order: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<RowSet, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            if selection.is_some() {
                return Err(BrokerError::InvalidArgument("selection not supported".into()));
            }
            if sort_order.is_some() {
                return Err(BrokerError::InvalidArgument("sortOrder not supported".into()));
            }

            let parsed = self.parse(uri)?;
            tracing::debug!(
                broker = %self.broker_type(),
                table = %parsed.table_type,
                major_version = parsed.major_version,
                abi = %parsed.abi,
                row = ?parsed.row,
                "Handling query"
            );

            match parsed.table_type {
                TableType::ActiveRuntime => self.query_active_runtime(&parsed, projection).await,
                TableType::Functions => self.query_functions(&parsed, projection).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chooser::SystemDelegateChooser;
    use crate::contract::{active_runtime, functions};
    use crate::runtime::RuntimeData;

    /// Chooser returning a fixed answer.
    struct FixedChooser(Option<RuntimeData>);

    impl RuntimeChooser for FixedChooser {
        fn name(&self) -> &str {
            "fixed"
        }

        fn active_runtime<'a>(
            &'a self,
            _major_version: u32,
            _abi: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<RuntimeData>, BrokerError>> + Send + 'a>>
        {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    fn broker_with(runtime: Option<RuntimeData>) -> RuntimeBroker {
        RuntimeBroker::new(BrokerType::RuntimeBroker, Arc::new(FixedChooser(runtime)))
    }

    fn example_runtime() -> RuntimeData {
        RuntimeData::new(
            "com.example.rt",
            "/data/app/com.example.rt/lib",
            "librt.so",
            1,
            vec![
                ("xrPollEvent".to_string(), "rt_xrPollEvent".to_string()),
                ("xrCreateInstance".to_string(), "rt_xrCreateInstance".to_string()),
            ],
            None,
        )
        .unwrap()
    }

    const ACTIVE_DIR: &str =
        "content://org.khronos.openxr.runtime_broker/openxr/1/abi/arm64-v8a/runtimes/active";

    #[test]
    fn get_type_classifies_tables() {
        let broker = broker_with(None);
        assert_eq!(
            broker.get_type(ACTIVE_DIR).unwrap(),
            "vnd.android.cursor.dir/vnd.org.khronos.openxr.runtime_broker.activeRuntime"
        );
        assert_eq!(
            broker.get_type(&format!("{ACTIVE_DIR}/0")).unwrap(),
            "vnd.android.cursor.item/vnd.org.khronos.openxr.runtime_broker.activeRuntime"
        );

        let functions_uri = functions::content_uri(BrokerType::RuntimeBroker, 1, "pkg", "x86_64");
        assert_eq!(
            broker.get_type(functions_uri.as_str()).unwrap(),
            "vnd.android.cursor.dir/vnd.org.khronos.openxr.runtime_broker.functions"
        );
        assert_eq!(
            broker
                .get_type(&format!("{}/1", functions_uri.as_str()))
                .unwrap(),
            "vnd.android.cursor.item/vnd.org.khronos.openxr.runtime_broker.functions"
        );
    }

    #[test]
    fn get_type_rejects_bad_uri() {
        let broker = broker_with(None);
        assert!(matches!(
            broker.get_type("content://elsewhere/openxr/1/abi/x86_64/runtimes/active"),
            Err(BrokerError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn rejects_selection_and_sort_order() {
        let broker = broker_with(Some(example_runtime()));
        let projection = [active_runtime::columns::PACKAGE_NAME];

        let result = broker
            .query(ACTIVE_DIR, &projection, Some("package_name = ?"), None)
            .await;
        assert!(matches!(result, Err(BrokerError::InvalidArgument(_))));

        let result = broker
            .query(ACTIVE_DIR, &projection, None, Some("package_name ASC"))
            .await;
        assert!(matches!(result, Err(BrokerError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn dir_and_row_zero_are_equivalent() {
        let broker = broker_with(Some(example_runtime()));
        let projection = active_runtime::columns::ALL;

        let dir = broker.query(ACTIVE_DIR, &projection, None, None).await.unwrap();
        let item = broker
            .query(&format!("{ACTIVE_DIR}/0"), &projection, None, None)
            .await
            .unwrap();
        assert_eq!(dir, item);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get_i64(0, active_runtime::columns::ID), Some(0));
    }

    #[tokio::test]
    async fn nonzero_row_is_always_empty() {
        let broker = broker_with(Some(example_runtime()));
        for row in [1, 2, 17] {
            let rows = broker
                .query(
                    &format!("{ACTIVE_DIR}/{row}"),
                    &active_runtime::columns::ALL,
                    None,
                    None,
                )
                .await
                .unwrap();
            assert!(rows.is_empty());
        }
    }

    #[tokio::test]
    async fn unknown_column_is_rejected_even_without_runtime() {
        let broker = broker_with(None);
        let result = broker.query(ACTIVE_DIR, &["bogus"], None, None).await;
        assert!(matches!(result, Err(BrokerError::InvalidColumn { .. })));
    }

    #[tokio::test]
    async fn functions_only_for_active_package() {
        let broker = broker_with(Some(example_runtime()));
        let projection = functions::columns::ALL;

        let uri = functions::content_uri(BrokerType::RuntimeBroker, 1, "com.example.rt", "arm64-v8a");
        let rows = broker.query(uri.as_str(), &projection, None, None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows.get_str(0, functions::columns::FUNCTION_NAME),
            Some("xrCreateInstance")
        );

        let item = broker
            .query(&format!("{}/1", uri.as_str()), &projection, None, None)
            .await
            .unwrap();
        assert_eq!(item.len(), 1);
        assert_eq!(item.get_str(0, functions::columns::SYMBOL_NAME), Some("rt_xrPollEvent"));
        assert_eq!(item.get_i64(0, functions::columns::ID), Some(1));

        let other =
            functions::content_uri(BrokerType::RuntimeBroker, 1, "com.example.other", "arm64-v8a");
        let rows = broker.query(other.as_str(), &projection, None, None).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(rows.columns.len(), 3);
    }

    #[tokio::test]
    async fn system_broker_with_undefined_policy_is_empty() {
        let broker = RuntimeBroker::new(
            BrokerType::SystemRuntimeBroker,
            Arc::new(SystemDelegateChooser::undefined()),
        );
        let uri = active_runtime::content_uri(BrokerType::SystemRuntimeBroker, 1, "arm64-v8a");
        let rows = broker
            .query(uri.as_str(), &active_runtime::columns::ALL, None, None)
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(broker.authority(), crate::contract::SYSTEM_AUTHORITY);
    }

    #[test]
    fn mutations_are_no_ops() {
        let broker = broker_with(Some(example_runtime()));
        let values = Default::default();
        assert!(broker.insert(ACTIVE_DIR, &values).is_none());
        assert_eq!(broker.update(ACTIVE_DIR, &values, None), 0);
        assert_eq!(broker.delete(ACTIVE_DIR, None), 0);
    }
}
