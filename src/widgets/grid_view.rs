use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, StatefulWidget, Table, Widget},
};

use crate::grid::GridState;

/// Renders a [`GridState`] as a bordered table. Selection highlighting is
/// driven by the grid's own `table_state`, which the coordinator keeps in
/// sync with the logical selection.
pub struct GridView<'a> {
    title: &'a str,
    focused: bool,
}

impl<'a> GridView<'a> {
    pub fn new(title: &'a str) -> Self {
        Self { title, focused: false }
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }
}

impl StatefulWidget for GridView<'_> {
    type State = GridState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let border_style = if self.focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let mut title = self.title.to_string();
        if let Some(needle) = state.filter() {
            title.push_str(&format!(" [filter: {}]", needle));
        }
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title);

        if let Some(message) = &state.error {
            // Failed load: empty-state grid with the error, never a crash.
            let text = format!("No data\n\n{}", message);
            Paragraph::new(text)
                .style(Style::default().fg(Color::Red))
                .block(block)
                .render(area, buf);
            return;
        }

        let header = Row::new(
            state
                .columns()
                .iter()
                .map(|c| Cell::from(c.title))
                .collect::<Vec<_>>(),
        )
        .style(Style::default().add_modifier(Modifier::BOLD));

        let rows: Vec<Row> = state
            .visible()
            .iter()
            .map(|&loaded_row| {
                let cells: Vec<Cell> = (0..state.columns().len())
                    .map(|column| Cell::from(state.formatted_cell(loaded_row, column)))
                    .collect();
                Row::new(cells)
            })
            .collect();

        let widths = vec![Constraint::Fill(1); state.columns().len()];
        let table = Table::new(rows, widths)
            .block(block)
            .header(header)
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

        StatefulWidget::render(table, area, buf, &mut state.table_state);
    }
}
