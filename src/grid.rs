//! Grid state: a loaded result set, a sort/filter view over it, a single
//! row selection, and a one-shot CSV export trigger.
//!
//! Selection is stored as an index into the *loaded* row order. The view is
//! an index vector mapping display rows back to loaded rows, so re-sorting
//! or filtering never changes which record is selected.

use std::cmp::Ordering;
use std::fs::File;
use std::path::Path;

use color_eyre::Result;
use polars::prelude::*;
use ratatui::widgets::TableState;

use crate::error::DashboardError;
use crate::warehouse::ResultSet;

/// Display-only formatting for a column. Export always writes the raw
/// value at full precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFormat {
    Text,
    Count,
    Percent,
}

/// Static per-page column configuration.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub field: &'static str,
    pub title: &'static str,
    pub format: CellFormat,
    pub filterable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: usize,
    pub ascending: bool,
}

pub struct GridState {
    data: ResultSet,
    columns: Vec<ColumnSpec>,
    selection: Option<usize>,
    export_clicks: u64,
    sort: Option<SortKey>,
    filter: Option<String>,
    /// Display order: `view[display_row] == loaded_row`.
    view: Vec<usize>,
    pub table_state: TableState,
    /// Set when the query backing this grid failed; renders an empty state.
    pub error: Option<String>,
}

impl GridState {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            data: ResultSet::empty(),
            columns,
            selection: None,
            export_clicks: 0,
            sort: None,
            filter: None,
            view: Vec::new(),
            table_state: TableState::default(),
            error: None,
        }
    }

    /// Replace the loaded data wholesale. Clears the selection and any
    /// previous error; sort and filter settings are reapplied to the new
    /// rows.
    pub fn load(&mut self, data: ResultSet) {
        self.data = data;
        self.selection = None;
        self.error = None;
        self.rebuild_view();
    }

    /// Record a failed load: an empty grid with an error banner.
    pub fn load_failed(&mut self, message: String) {
        self.data = ResultSet::empty();
        self.selection = None;
        self.error = Some(message);
        self.rebuild_view();
    }

    pub fn data(&self) -> &ResultSet {
        &self.data
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    pub fn sort(&self) -> Option<SortKey> {
        self.sort
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Set or clear the selected row (loaded-order index). An out-of-range
    /// index is rejected and the previous selection stays in place.
    pub fn set_selection(&mut self, row: Option<usize>) -> Result<(), DashboardError> {
        if let Some(index) = row {
            if index >= self.data.len() {
                return Err(DashboardError::IndexOutOfRange { index, rows: self.data.len() });
            }
        }
        self.selection = row;
        self.sync_table_state();
        Ok(())
    }

    /// Move the selection by `delta` display rows, clamped to the view.
    /// With nothing selected, the first step selects the top visible row.
    pub fn step_selection(&mut self, delta: i64) {
        if self.view.is_empty() {
            return;
        }
        let pos = match self.selection.and_then(|row| self.display_row_of(row)) {
            Some(pos) => {
                let next = pos as i64 + delta;
                next.clamp(0, self.view.len() as i64 - 1) as usize
            }
            None => {
                if delta >= 0 {
                    0
                } else {
                    self.view.len() - 1
                }
            }
        };
        self.selection = Some(self.view[pos]);
        self.sync_table_state();
    }

    /// Bump the export counter. The coordinator observes counter *edges*,
    /// so each call produces exactly one export event and unrelated state
    /// changes never re-fire an old one.
    pub fn request_export(&mut self) {
        self.export_clicks += 1;
    }

    pub fn export_clicks(&self) -> u64 {
        self.export_clicks
    }

    /// Cycle the sort column: none -> first column -> ... -> last -> none.
    /// Direction is preserved while cycling.
    pub fn cycle_sort(&mut self) {
        let ascending = self.sort.map(|s| s.ascending).unwrap_or(true);
        self.sort = match self.sort {
            None if !self.columns.is_empty() => Some(SortKey { column: 0, ascending }),
            Some(key) if key.column + 1 < self.columns.len() => {
                Some(SortKey { column: key.column + 1, ascending })
            }
            _ => None,
        };
        self.rebuild_view();
    }

    pub fn reverse_sort(&mut self) {
        if let Some(key) = &mut self.sort {
            key.ascending = !key.ascending;
        }
        self.rebuild_view();
    }

    pub fn set_sort(&mut self, sort: Option<SortKey>) {
        self.sort = sort;
        self.rebuild_view();
    }

    /// Substring filter over the filterable columns (case-insensitive).
    pub fn set_filter(&mut self, needle: Option<String>) {
        self.filter = needle.filter(|s| !s.is_empty());
        self.rebuild_view();
    }

    /// Display-order view: indices into the loaded row order.
    pub fn visible(&self) -> &[usize] {
        &self.view
    }

    pub fn display_row_of(&self, loaded_row: usize) -> Option<usize> {
        self.view.iter().position(|&row| row == loaded_row)
    }

    pub fn row_at_display(&self, display_row: usize) -> Option<usize> {
        self.view.get(display_row).copied()
    }

    /// Cell text for display, honoring the column's format.
    pub fn formatted_cell(&self, loaded_row: usize, column: usize) -> String {
        let Some(spec) = self.columns.get(column) else {
            return String::new();
        };
        match spec.format {
            CellFormat::Text => self.data.display_value(loaded_row, spec.field),
            CellFormat::Count => match self.data.f64_value(loaded_row, spec.field) {
                Some(v) => group_thousands(v as i64),
                None => self.data.display_value(loaded_row, spec.field),
            },
            CellFormat::Percent => match self.data.f64_value(loaded_row, spec.field) {
                Some(v) => format!("{:.2}%", v * 100.0),
                None => String::new(),
            },
        }
    }

    /// Write the visible (post-filter, post-sort) rows to CSV in declared
    /// column order. Floats are written at full precision regardless of the
    /// on-screen format.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let fields: Vec<&str> = self.columns.iter().map(|c| c.field).collect();
        let indices: Vec<IdxSize> = self.view.iter().map(|&row| row as IdxSize).collect();
        let rows = IdxCa::from_vec("rows".into(), indices);
        let mut df = self.data.frame().select(fields)?.take(&rows)?;
        let file = File::create(path)?;
        CsvWriter::new(file).include_header(true).finish(&mut df)?;
        Ok(())
    }

    fn rebuild_view(&mut self) {
        let mut rows: Vec<usize> = (0..self.data.len()).collect();

        if let Some(needle) = &self.filter {
            let needle = needle.to_lowercase();
            rows.retain(|&row| {
                self.columns.iter().filter(|c| c.filterable).any(|c| {
                    self.data
                        .display_value(row, c.field)
                        .to_lowercase()
                        .contains(&needle)
                })
            });
        }

        if let Some(key) = self.sort {
            if let Some(spec) = self.columns.get(key.column) {
                if let Ok(column) = self.data.frame().column(spec.field) {
                    rows.sort_by(|&a, &b| {
                        let va = column.get(a).unwrap_or(AnyValue::Null);
                        let vb = column.get(b).unwrap_or(AnyValue::Null);
                        let ord = compare_values(&va, &vb);
                        if key.ascending {
                            ord
                        } else {
                            ord.reverse()
                        }
                    });
                }
            }
        }

        self.view = rows;
        self.sync_table_state();
    }

    fn sync_table_state(&mut self) {
        let display = self.selection.and_then(|row| self.display_row_of(row));
        self.table_state.select(display);
    }
}

fn compare_values(a: &AnyValue, b: &AnyValue) -> Ordering {
    match (a, b) {
        (AnyValue::Null, AnyValue::Null) => Ordering::Equal,
        // NULLs sort last in either direction's base ordering
        (AnyValue::Null, _) => Ordering::Greater,
        (_, AnyValue::Null) => Ordering::Less,
        _ => a
            .partial_cmp(b)
            .unwrap_or_else(|| a.str_value().cmp(&b.str_value())),
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::ResultSet;

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec { field: "district", title: "District", format: CellFormat::Text, filterable: true },
            ColumnSpec { field: "beat", title: "Beat", format: CellFormat::Text, filterable: false },
            ColumnSpec { field: "rate", title: "Arrest Rate", format: CellFormat::Percent, filterable: false },
        ]
    }

    fn sample() -> ResultSet {
        let df = df!(
            "district" => [1i64, 1, 2],
            "beat" => ["0101", "0102", "0201"],
            "rate" => [0.12f64, 0.30, 0.05],
        )
        .unwrap();
        ResultSet::from_frame(df)
    }

    fn grid() -> GridState {
        let mut grid = GridState::new(columns());
        grid.load(sample());
        grid
    }

    #[test]
    fn test_selection_bounds_checked() {
        let mut grid = grid();
        grid.set_selection(Some(1)).unwrap();
        let err = grid.set_selection(Some(3)).unwrap_err();
        assert!(matches!(err, DashboardError::IndexOutOfRange { index: 3, rows: 3 }));
        // Prior selection retained after the rejected request.
        assert_eq!(grid.selection(), Some(1));
    }

    #[test]
    fn test_reload_clears_selection() {
        let mut grid = grid();
        grid.set_selection(Some(2)).unwrap();
        let df = df!(
            "district" => [9i64],
            "beat" => ["0901"],
            "rate" => [0.5f64],
        )
        .unwrap();
        grid.load(ResultSet::from_frame(df));
        assert_eq!(grid.selection(), None);
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_export_counter_counts_every_click() {
        let mut grid = grid();
        for _ in 0..5 {
            grid.request_export();
        }
        assert_eq!(grid.export_clicks(), 5);
        // A reload never touches the counter.
        grid.load(sample());
        assert_eq!(grid.export_clicks(), 5);
    }

    #[test]
    fn test_sort_preserves_selected_record() {
        let mut grid = grid();
        // Select the row for beat 0102 (loaded index 1).
        grid.set_selection(Some(1)).unwrap();
        grid.set_sort(Some(SortKey { column: 2, ascending: false }));
        // Display order by rate desc: 0102, 0101, 0201.
        assert_eq!(grid.visible(), &[1, 0, 2]);
        // Selection still points at the same record.
        assert_eq!(grid.selection(), Some(1));
        assert_eq!(grid.data().str_value(grid.selection().unwrap(), "beat").as_deref(), Some("0102"));
        assert_eq!(grid.display_row_of(1), Some(0));
    }

    #[test]
    fn test_filter_narrows_view_without_touching_data() {
        let mut grid = grid();
        grid.set_filter(Some("2".to_string()));
        // Only district 2 matches (district is the sole filterable column).
        assert_eq!(grid.visible(), &[2]);
        assert_eq!(grid.len(), 3);
        grid.set_filter(None);
        assert_eq!(grid.visible().len(), 3);
    }

    #[test]
    fn test_step_selection_moves_in_display_order() {
        let mut grid = grid();
        grid.set_sort(Some(SortKey { column: 2, ascending: false }));
        grid.step_selection(1);
        // Top display row is beat 0102 (loaded index 1).
        assert_eq!(grid.selection(), Some(1));
        grid.step_selection(1);
        assert_eq!(grid.selection(), Some(0));
        grid.step_selection(10);
        assert_eq!(grid.selection(), Some(2));
    }

    #[test]
    fn test_percent_format_is_display_only() {
        let grid = grid();
        assert_eq!(grid.formatted_cell(1, 2), "30.00%");
        assert_eq!(grid.formatted_cell(1, 1), "0102");
    }

    #[test]
    fn test_write_csv_matches_visible_view() {
        let mut grid = grid();
        grid.set_sort(Some(SortKey { column: 2, ascending: true }));
        grid.set_filter(Some("1".to_string()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.csv");
        grid.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "district,beat,rate");
        // Two district-1 rows, ascending by rate, full precision.
        assert_eq!(lines[1], "1,0101,0.12");
        assert_eq!(lines[2], "1,0102,0.3");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_load_failed_renders_empty_state() {
        let mut grid = grid();
        grid.set_selection(Some(0)).unwrap();
        grid.load_failed("query `rates` failed".to_string());
        assert!(grid.is_empty());
        assert_eq!(grid.selection(), None);
        assert!(grid.error.is_some());
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(1234), "1,234");
        assert_eq!(group_thousands(-1234567), "-1,234,567");
    }
}
