use polars::prelude::PolarsError;
use thiserror::Error;

/// Failures surfaced by the dashboard's own state machinery.
///
/// Every variant maps to a renderable UI state: a rejected parameter or
/// selection leaves the previous state intact and a failed query renders
/// an empty grid.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// A query parameter was rejected before any warehouse I/O happened.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The warehouse call itself failed (missing table, bad schema, I/O).
    #[error("query `{query}` failed: {source}")]
    QueryFailed {
        query: &'static str,
        #[source]
        source: PolarsError,
    },

    /// A selection referenced a row that does not exist in the loaded set.
    #[error("row index {index} out of range for {rows} rows")]
    IndexOutOfRange { index: usize, rows: usize },
}

impl DashboardError {
    /// Short message suitable for the status line.
    pub fn user_message(&self) -> String {
        let text = self.to_string();
        text.lines().next().unwrap_or("unknown error").to_string()
    }
}
