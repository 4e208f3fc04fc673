//! Query loading against the precomputed warehouse.
//!
//! The warehouse is a directory of Parquet tables, one per precomputed
//! dataset. Queries are fixed and named; callers only supply scalar
//! parameters, which are validated before any file is touched.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;

use polars::prelude::*;

use crate::error::DashboardError;

/// Declared type of a query parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    /// Integer restricted to an inclusive range (e.g. crime rank 1-5).
    IntRange(i64, i64),
    /// Free-form string matched by equality.
    Text,
}

/// A parameter declaration on a [`QuerySpec`]. The name doubles as the
/// warehouse column the bound value is filtered on.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl ParamValue {
    fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "integer",
            ParamValue::Text(_) => "text",
        }
    }
}

/// A fixed, named query: target table, projected fields in schema order,
/// and the parameters it accepts. No free-form SQL ever reaches the
/// warehouse.
#[derive(Debug, Clone, Copy)]
pub struct QuerySpec {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [&'static str],
    pub params: &'static [ParamSpec],
}

impl QuerySpec {
    /// Validate bound parameters against the declaration. Runs before any
    /// I/O so a bad call never touches the warehouse.
    pub fn validate(&self, params: &[ParamValue]) -> Result<(), DashboardError> {
        if params.len() != self.params.len() {
            return Err(DashboardError::InvalidParameter {
                name: self.name,
                reason: format!("expected {} parameters, got {}", self.params.len(), params.len()),
            });
        }
        for (spec, value) in self.params.iter().zip(params) {
            match (spec.kind, value) {
                (ParamKind::IntRange(min, max), ParamValue::Int(v)) => {
                    if *v < min || *v > max {
                        return Err(DashboardError::InvalidParameter {
                            name: spec.name,
                            reason: format!("{} is outside {}..={}", v, min, max),
                        });
                    }
                }
                (ParamKind::Text, ParamValue::Text(_)) => {}
                (_, other) => {
                    return Err(DashboardError::InvalidParameter {
                        name: spec.name,
                        reason: format!("unexpected {} value", other.kind_name()),
                    });
                }
            }
        }
        Ok(())
    }
}

/// An immutable, ordered query result: a DataFrame plus the declared field
/// order. Replaced wholesale on reload, never mutated in place.
#[derive(Debug, Clone)]
pub struct ResultSet {
    df: DataFrame,
    fields: Vec<String>,
}

impl ResultSet {
    pub fn from_frame(df: DataFrame) -> Self {
        let fields = df.get_column_names_str().iter().map(|s| s.to_string()).collect();
        Self { df, fields }
    }

    pub fn empty() -> Self {
        Self { df: DataFrame::empty(), fields: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    /// Value rendered for display; NULL renders as an empty cell.
    pub fn display_value(&self, row: usize, field: &str) -> String {
        match self.any_value(row, field) {
            Some(v) => match v {
                AnyValue::String(s) => s.to_string(),
                other => other.str_value().to_string(),
            },
            None => String::new(),
        }
    }

    /// Numeric value, `None` when the cell is NULL or non-numeric. NULLs
    /// are never coerced to 0.
    pub fn f64_value(&self, row: usize, field: &str) -> Option<f64> {
        self.any_value(row, field)?.try_extract::<f64>().ok()
    }

    /// String value, `None` when the cell is NULL.
    pub fn str_value(&self, row: usize, field: &str) -> Option<String> {
        self.any_value(row, field).map(|v| match v {
            AnyValue::String(s) => s.to_string(),
            other => other.str_value().to_string(),
        })
    }

    fn any_value(&self, row: usize, field: &str) -> Option<AnyValue<'_>> {
        let column = self.df.column(field).ok()?;
        let value = column.get(row).ok()?;
        if matches!(value, AnyValue::Null) {
            None
        } else {
            Some(value)
        }
    }
}

/// Handle to the warehouse directory. Constructed once at startup and
/// passed to whatever needs to load data; there is no ambient client.
#[derive(Debug, Clone)]
pub struct Warehouse {
    root: PathBuf,
}

impl Warehouse {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Execute a named query. Each call re-reads the warehouse; results are
    /// never cached here.
    pub fn query(
        &self,
        spec: &QuerySpec,
        params: &[ParamValue],
    ) -> Result<ResultSet, DashboardError> {
        spec.validate(params)?;
        self.run(spec, params)
            .map_err(|source| DashboardError::QueryFailed { query: spec.name, source })
    }

    fn run(&self, spec: &QuerySpec, params: &[ParamValue]) -> PolarsResult<ResultSet> {
        let path = self.root.join(format!("{}.parquet", spec.table));
        let pl_path = PlPath::Local(Arc::from(path.as_path()));
        let mut lf = LazyFrame::scan_parquet(pl_path, Default::default())?;

        for (param, value) in spec.params.iter().zip(params) {
            let filter = match value {
                ParamValue::Int(v) => col(param.name).eq(lit(*v)),
                ParamValue::Text(s) => col(param.name).eq(lit(s.as_str())),
            };
            lf = lf.filter(filter);
        }

        // Projection in declared order so the grid's field order is stable
        // regardless of the table's physical layout.
        let projection: Vec<Expr> = spec.fields.iter().map(|f| col(*f)).collect();
        let df = lf.select(projection).collect()?;
        Ok(ResultSet::from_frame(df))
    }
}

/// Pad a location code to the 4-digit form used by the boundary file
/// (e.g. "111" -> "0111").
pub fn normalize_location_key(raw: &str) -> Cow<'_, str> {
    let trimmed = raw.trim();
    if trimmed.len() >= 4 {
        if trimmed.len() == raw.len() {
            Cow::Borrowed(raw)
        } else {
            Cow::Owned(trimmed.to_string())
        }
    } else {
        Cow::Owned(format!("{:0>4}", trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    const RANKED: QuerySpec = QuerySpec {
        name: "ranked",
        table: "ranked",
        fields: &["name", "score"],
        params: &[ParamSpec { name: "rank", kind: ParamKind::IntRange(1, 5) }],
    };

    fn write_table(dir: &std::path::Path, table: &str, df: &mut DataFrame) {
        let file = File::create(dir.join(format!("{}.parquet", table))).unwrap();
        ParquetWriter::new(file).finish(df).unwrap();
    }

    #[test]
    fn test_validate_rejects_arity_mismatch() {
        let err = RANKED.validate(&[]).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidParameter { .. }));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let err = RANKED.validate(&[ParamValue::Int(9)]).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidParameter { name: "rank", .. }));
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let err = RANKED.validate(&[ParamValue::Text("one".to_string())]).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidParameter { .. }));
    }

    #[test]
    fn test_invalid_parameter_fails_before_io() {
        // Warehouse directory does not exist; validation must fire first.
        let warehouse = Warehouse::new("/nonexistent/warehouse");
        let err = warehouse.query(&RANKED, &[ParamValue::Int(0)]).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidParameter { .. }));
    }

    #[test]
    fn test_missing_table_is_query_failed() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = Warehouse::new(dir.path());
        let err = warehouse.query(&RANKED, &[ParamValue::Int(1)]).unwrap_err();
        assert!(matches!(err, DashboardError::QueryFailed { query: "ranked", .. }));
    }

    #[test]
    fn test_query_filters_and_projects_in_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut df = df!(
            "score" => [0.25f64, 0.5, 0.75],
            "name" => ["a", "b", "c"],
            "rank" => [1i64, 1, 2],
        )
        .unwrap();
        write_table(dir.path(), "ranked", &mut df);

        let warehouse = Warehouse::new(dir.path());
        let rs = warehouse.query(&RANKED, &[ParamValue::Int(1)]).unwrap();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.fields(), &["name".to_string(), "score".to_string()]);
        assert_eq!(rs.str_value(1, "name").as_deref(), Some("b"));
        assert_eq!(rs.f64_value(0, "score"), Some(0.25));
    }

    #[test]
    fn test_null_values_surface_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut df = df!(
            "name" => ["a", "b"],
            "score" => [Some(0.5f64), None],
            "rank" => [1i64, 1],
        )
        .unwrap();
        write_table(dir.path(), "ranked", &mut df);

        let warehouse = Warehouse::new(dir.path());
        let rs = warehouse.query(&RANKED, &[ParamValue::Int(1)]).unwrap();
        assert_eq!(rs.f64_value(0, "score"), Some(0.5));
        assert_eq!(rs.f64_value(1, "score"), None);
        assert_eq!(rs.display_value(1, "score"), "");
    }

    #[test]
    fn test_normalize_location_key_pads_to_four_digits() {
        assert_eq!(normalize_location_key("111"), "0111");
        assert_eq!(normalize_location_key("0101"), "0101");
        assert_eq!(normalize_location_key(" 12 "), "0012");
    }
}
