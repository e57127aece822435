use serde::{Deserialize, Serialize};

use crate::contract::{active_runtime, functions};
use crate::error::BrokerError;
use crate::runtime::RuntimeData;

/// A single cell of a virtual table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Text(String),
}

impl CellValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            CellValue::Integer(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(v) => Some(*v),
            CellValue::Text(s) => s.parse().ok(),
        }
    }
}

/// Result of a broker query: the requested columns, in order, and zero or
/// more rows of values for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    pub fn get_str(&self, row: usize, column: &str) -> Option<&str> {
        self.get(row, column)?.as_str()
    }

    pub fn get_i64(&self, row: usize, column: &str) -> Option<i64> {
        self.get(row, column)?.as_i64()
    }
}

type ActiveRuntimeColumn = fn(u32, &RuntimeData) -> CellValue;

fn active_runtime_column(name: &str) -> Option<ActiveRuntimeColumn> {
    use active_runtime::columns::*;

    let filler: ActiveRuntimeColumn = match name {
        ID => |item: u32, _: &RuntimeData| CellValue::Integer(i64::from(item)),
        PACKAGE_NAME => |_: u32, data: &RuntimeData| CellValue::Text(data.package_name.clone()),
        NATIVE_LIB_DIR => {
            |_: u32, data: &RuntimeData| CellValue::Text(data.native_library_dir.clone())
        }
        SO_FILENAME => |_: u32, data: &RuntimeData| CellValue::Text(data.so_filename.clone()),
        HAS_FUNCTIONS => {
            |_: u32, data: &RuntimeData| CellValue::Integer(i64::from(data.has_functions()))
        }
        _ => return None,
    };
    Some(filler)
}

fn resolve_columns<F>(
    projection: &[&str],
    lookup: impl Fn(&str) -> Option<F>,
) -> Result<Vec<F>, BrokerError> {
    projection
        .iter()
        .map(|column| {
            lookup(column).ok_or_else(|| BrokerError::InvalidColumn {
                column: column.to_string(),
            })
        })
        .collect()
}

/// Builds the single-row active runtime table.
pub struct ActiveRuntimeTableBuilder {
    fillers: Vec<ActiveRuntimeColumn>,
    rows: RowSet,
}

impl ActiveRuntimeTableBuilder {
    /// Fails on the first column name not in the active runtime table.
    pub fn new(projection: &[&str]) -> Result<Self, BrokerError> {
        let fillers = resolve_columns(projection, active_runtime_column)?;
        Ok(Self {
            fillers,
            rows: RowSet::new(projection.iter().map(|c| c.to_string()).collect()),
        })
    }

    pub fn add_row(&mut self, item: u32, data: &RuntimeData) {
        let row = self.fillers.iter().map(|fill| fill(item, data)).collect();
        self.rows.rows.push(row);
    }

    pub fn build(self) -> RowSet {
        self.rows
    }
}

struct FunctionEntry {
    function_name: String,
    symbol_name: String,
}

type FunctionColumn = fn(u32, &FunctionEntry) -> CellValue;

fn function_column(name: &str) -> Option<FunctionColumn> {
    use functions::columns::*;

    let filler: FunctionColumn = match name {
        ID => |item: u32, _: &FunctionEntry| CellValue::Integer(i64::from(item)),
        FUNCTION_NAME => {
            |_: u32, entry: &FunctionEntry| CellValue::Text(entry.function_name.clone())
        }
        SYMBOL_NAME => |_: u32, entry: &FunctionEntry| CellValue::Text(entry.symbol_name.clone()),
        _ => return None,
    };
    Some(filler)
}

/// Builds the function remapping table of one runtime.
///
/// Rows are ordered by function name; `_id` is the position in that order.
pub struct FunctionsTableBuilder {
    fillers: Vec<FunctionColumn>,
    functions: Vec<FunctionEntry>,
    rows: RowSet,
}

impl FunctionsTableBuilder {
    pub fn new(runtime: Option<&RuntimeData>, projection: &[&str]) -> Result<Self, BrokerError> {
        let fillers = resolve_columns(projection, function_column)?;

        let mut functions: Vec<FunctionEntry> = runtime
            .map(|r| {
                r.functions
                    .iter()
                    .filter(|(name, symbol)| !name.is_empty() && !symbol.is_empty())
                    .map(|(name, symbol)| FunctionEntry {
                        function_name: name.clone(),
                        symbol_name: symbol.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        functions.sort_by(|a, b| a.function_name.cmp(&b.function_name));

        Ok(Self {
            fillers,
            functions,
            rows: RowSet::new(projection.iter().map(|c| c.to_string()).collect()),
        })
    }

    /// Add the row at `item`, if it exists.
    pub fn add_row(&mut self, item: u32) {
        let Some(entry) = self.functions.get(item as usize) else {
            return;
        };
        let row = self.fillers.iter().map(|fill| fill(item, entry)).collect();
        self.rows.rows.push(row);
    }

    pub fn add_all_rows(&mut self) {
        for item in 0..self.functions.len() as u32 {
            self.add_row(item);
        }
    }

    pub fn build(self) -> RowSet {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::active_runtime::columns as ar;
    use crate::contract::functions::columns as fc;

    fn runtime(functions: &[(&str, &str)]) -> RuntimeData {
        RuntimeData::new(
            "com.example.rt",
            "/data/app/com.example.rt/lib",
            "librt.so",
            1,
            functions
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
            None,
        )
        .unwrap()
    }

    #[test]
    fn active_runtime_row_follows_projection_order() {
        let mut builder =
            ActiveRuntimeTableBuilder::new(&[ar::SO_FILENAME, ar::ID, ar::HAS_FUNCTIONS]).unwrap();
        builder.add_row(0, &runtime(&[("xrCreateInstance", "rt_create")]));
        let rows = builder.build();

        assert_eq!(rows.columns, vec!["so_filename", "_id", "has_functions"]);
        assert_eq!(
            rows.rows[0],
            vec![
                CellValue::Text("librt.so".into()),
                CellValue::Integer(0),
                CellValue::Integer(1),
            ]
        );
    }

    #[test]
    fn has_functions_is_zero_without_functions() {
        let mut builder = ActiveRuntimeTableBuilder::new(&[ar::HAS_FUNCTIONS]).unwrap();
        builder.add_row(0, &runtime(&[]));
        assert_eq!(builder.build().get_i64(0, ar::HAS_FUNCTIONS), Some(0));
    }

    #[test]
    fn unknown_column_fails_fast() {
        let result = ActiveRuntimeTableBuilder::new(&[ar::PACKAGE_NAME, "icon"]);
        assert!(matches!(
            result,
            Err(BrokerError::InvalidColumn { ref column }) if column == "icon"
        ));

        let result = FunctionsTableBuilder::new(None, &[fc::FUNCTION_NAME, ar::SO_FILENAME]);
        assert!(matches!(result, Err(BrokerError::InvalidColumn { .. })));
    }

    #[test]
    fn functions_sorted_by_name() {
        let rt = runtime(&[
            ("xrPollEvent", "rt_poll"),
            ("xrCreateInstance", "rt_create"),
            ("xrEndFrame", "rt_end"),
        ]);
        let mut builder =
            FunctionsTableBuilder::new(Some(&rt), &[fc::ID, fc::FUNCTION_NAME, fc::SYMBOL_NAME])
                .unwrap();
        builder.add_all_rows();
        let rows = builder.build();

        let names: Vec<_> = (0..rows.len())
            .map(|i| rows.get_str(i, fc::FUNCTION_NAME).unwrap())
            .collect();
        assert_eq!(names, vec!["xrCreateInstance", "xrEndFrame", "xrPollEvent"]);
        assert_eq!(rows.get_i64(2, fc::ID), Some(2));
        assert_eq!(rows.get_str(1, fc::SYMBOL_NAME), Some("rt_end"));
    }

    #[test]
    fn single_function_row_out_of_range_is_empty() {
        let rt = runtime(&[("xrCreateInstance", "rt_create")]);
        let mut builder = FunctionsTableBuilder::new(Some(&rt), &[fc::FUNCTION_NAME]).unwrap();
        builder.add_row(5);
        assert!(builder.build().is_empty());
    }

    #[test]
    fn functions_without_runtime_is_empty() {
        let mut builder = FunctionsTableBuilder::new(None, &[fc::FUNCTION_NAME]).unwrap();
        builder.add_all_rows();
        let rows = builder.build();
        assert!(rows.is_empty());
        assert_eq!(rows.columns, vec!["function_name"]);
    }
}
