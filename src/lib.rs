//! beatscope: a terminal dashboard over a precomputed crime warehouse.
//!
//! The interesting machinery is the interaction engine: named queries load
//! into grid state, a single row selection drives the choropleth map's
//! per-beat visual weights, and a one-shot export counter turns button
//! mashing into exactly-once CSV writes. Everything is driven through
//! [`AppEvent`]s processed one at a time, so no two recomputations of map
//! state can ever interleave.

use std::path::PathBuf;
use std::sync::mpsc::Sender;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, StatefulWidget, Widget};
use ratatui::buffer::Buffer;

pub mod config;
pub mod error;
pub mod grid;
pub mod map;
pub mod pages;
pub mod warehouse;
pub mod widgets;

pub use config::{AppConfig, ConfigManager};
pub use error::DashboardError;
pub use grid::GridState;
pub use map::{BoundaryLayer, MapState};
pub use pages::{GridBinding, Registry, Resolution};
pub use warehouse::{ParamValue, ResultSet, Warehouse};

use widgets::controls::Controls;
use widgets::grid_view::GridView;
use widgets::map_view::MapView;

/// Application name used for the config directory and other app paths
pub const APP_NAME: &str = "beatscope";

/// Boundary-file property holding the beat code.
pub const BEAT_KEY_PROPERTY: &str = "beat_num";

#[derive(Debug, Clone)]
pub enum AppEvent {
    Key(KeyEvent),
    /// Route change requested (key binding or startup path).
    Navigate(String),
    /// Internal: perform the queries for a navigation after the UI has had
    /// a chance to show the loading state. Carries the load generation so
    /// a superseded load is discarded instead of racing the newer one.
    DoLoad { path: String, generation: u64 },
    Resize(u16, u16),
    Exit,
    Crash(String),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    Filtering,
}

#[derive(Clone, Debug, Default)]
pub enum LoadingState {
    #[default]
    Idle,
    Loading {
        path: String,
    },
}

impl LoadingState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadingState::Loading { .. })
    }
}

/// One grid on the active page together with its derived map state and the
/// export counter value the coordinator last acted on.
pub struct GridPane {
    pub binding: GridBinding,
    pub grid: GridState,
    pub map: Option<MapState>,
    last_export_seen: u64,
}

/// Runtime state of the page currently shown. Discarded on navigation;
/// navigating back re-runs the page's queries (no session caching).
pub enum ActivePage {
    Page {
        id: &'static str,
        title: &'static str,
        intro: &'static str,
        panes: Vec<GridPane>,
        focus: usize,
    },
    NotFound {
        path: String,
    },
}

pub struct App {
    registry: Registry,
    warehouse: Warehouse,
    boundaries: BoundaryLayer,
    events: Sender<AppEvent>,
    current_path: String,
    page: Option<ActivePage>,
    loading: LoadingState,
    generation: u64,
    export_dir: PathBuf,
    status: Option<String>,
    pub input_mode: InputMode,
    filter_input: String,
    exports_written: u64,
    loads_issued: u64,
}

impl App {
    pub fn new(
        events: Sender<AppEvent>,
        warehouse: Warehouse,
        boundaries: BoundaryLayer,
        config: &AppConfig,
    ) -> App {
        let export_dir = config
            .export
            .export_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        App {
            registry: Registry::new(config.map.weights()),
            warehouse,
            boundaries,
            events,
            current_path: String::new(),
            page: None,
            loading: LoadingState::Idle,
            generation: 0,
            export_dir,
            status: None,
            input_mode: InputMode::Normal,
            filter_input: String::new(),
            exports_written: 0,
            loads_issued: 0,
        }
    }

    pub fn send_event(&mut self, event: AppEvent) -> color_eyre::Result<()> {
        self.events.send(event)?;
        Ok(())
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn page(&self) -> Option<&ActivePage> {
        self.page.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Total CSV files written so far; one per observed export edge.
    pub fn exports_written(&self) -> u64 {
        self.exports_written
    }

    /// Total warehouse queries issued; navigation always reloads.
    pub fn loads_issued(&self) -> u64 {
        self.loads_issued
    }

    pub fn focused_pane(&self) -> Option<&GridPane> {
        match self.page.as_ref()? {
            ActivePage::Page { panes, focus, .. } => panes.get(*focus),
            ActivePage::NotFound { .. } => None,
        }
    }

    /// Process a single event to completion. May return a follow-up event
    /// for the caller to enqueue; the main loop owns the channel.
    pub fn event(&mut self, event: &AppEvent) -> Option<AppEvent> {
        match event {
            AppEvent::Key(key) => {
                let follow_up = self.handle_key(key);
                // Edge detection runs after every key so each export click
                // fires exactly once, no matter what else the key changed.
                self.observe_exports();
                follow_up
            }
            AppEvent::Navigate(path) => {
                // Re-activating the page already shown is a no-op; only
                // navigating away and back re-runs its queries.
                if *path == self.current_path
                    && self.page.is_some()
                    && !self.loading.is_loading()
                {
                    return None;
                }
                self.generation += 1;
                self.loading = LoadingState::Loading { path: path.clone() };
                Some(AppEvent::DoLoad { path: path.clone(), generation: self.generation })
            }
            AppEvent::DoLoad { path, generation } => {
                if *generation != self.generation {
                    // Superseded by a later navigation; discard, do not race.
                    return None;
                }
                self.activate(path);
                self.loading = LoadingState::Idle;
                None
            }
            AppEvent::Resize(_, _) => None,
            AppEvent::Exit | AppEvent::Crash(_) => None,
        }
    }

    /// Resolve `path` and build the page's runtime state. Query failures
    /// stay local to the grid that issued them: the pane renders an empty
    /// state and every other pane (and page) is unaffected.
    fn activate(&mut self, path: &str) {
        self.current_path = path.to_string();
        self.status = None;
        self.input_mode = InputMode::Normal;
        self.filter_input.clear();

        let definition = match self.registry.resolve(path) {
            Resolution::Page(definition) => definition.clone(),
            Resolution::NotFound => {
                self.page = Some(ActivePage::NotFound { path: path.to_string() });
                return;
            }
        };

        let mut panes = Vec::with_capacity(definition.grids.len());
        for binding in definition.grids {
            let mut grid = GridState::new(binding.columns.clone());
            self.loads_issued += 1;
            match self.warehouse.query(binding.query, &binding.params) {
                Ok(result) => grid.load(result),
                Err(e) => grid.load_failed(e.user_message()),
            }
            let map = binding
                .map
                .as_ref()
                .map(|spec| MapState::recompute(grid.data(), None, spec, &self.boundaries));
            panes.push(GridPane { binding, grid, map, last_export_seen: 0 });
        }

        self.page = Some(ActivePage::Page {
            id: definition.id,
            title: definition.title,
            intro: definition.intro,
            panes,
            focus: 0,
        });
    }

    fn handle_key(&mut self, key: &KeyEvent) -> Option<AppEvent> {
        if self.input_mode == InputMode::Filtering {
            self.handle_filter_key(key);
            return None;
        }

        match key.code {
            KeyCode::Char('q') => return Some(AppEvent::Exit),
            KeyCode::Char('h') | KeyCode::Char('0') => {
                return Some(AppEvent::Navigate("/home".to_string()))
            }
            KeyCode::Char(c @ '1'..='4') => {
                return Some(AppEvent::Navigate(format!("/q{}", c)))
            }
            KeyCode::Tab => self.focus_next_pane(),
            KeyCode::Down => self.step_selection(1),
            KeyCode::Up => self.step_selection(-1),
            KeyCode::Esc => self.clear_selection(),
            KeyCode::Char('e') => {
                if let Some(pane) = self.focused_pane_mut() {
                    pane.grid.request_export();
                }
            }
            KeyCode::Char('s') => {
                if let Some(pane) = self.focused_pane_mut() {
                    pane.grid.cycle_sort();
                }
            }
            KeyCode::Char('r') => {
                if let Some(pane) = self.focused_pane_mut() {
                    pane.grid.reverse_sort();
                }
            }
            KeyCode::Char('/') => {
                if self.focused_pane().is_some() {
                    self.input_mode = InputMode::Filtering;
                    self.filter_input = self
                        .focused_pane()
                        .and_then(|p| p.grid.filter().map(str::to_string))
                        .unwrap_or_default();
                }
            }
            _ => {}
        }
        None
    }

    fn handle_filter_key(&mut self, key: &KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.filter_input.clear();
                if let Some(pane) = self.focused_pane_mut() {
                    pane.grid.set_filter(None);
                }
            }
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Backspace => {
                self.filter_input.pop();
                self.apply_filter_input();
            }
            KeyCode::Char(c) => {
                self.filter_input.push(c);
                self.apply_filter_input();
            }
            _ => {}
        }
    }

    fn apply_filter_input(&mut self) {
        let needle = self.filter_input.clone();
        if let Some(pane) = self.focused_pane_mut() {
            pane.grid.set_filter(if needle.is_empty() { None } else { Some(needle) });
        }
    }

    fn focus_next_pane(&mut self) {
        if let Some(ActivePage::Page { panes, focus, .. }) = &mut self.page {
            if !panes.is_empty() {
                *focus = (*focus + 1) % panes.len();
            }
        }
        self.input_mode = InputMode::Normal;
        self.filter_input.clear();
    }

    fn step_selection(&mut self, delta: i64) {
        if let Some(ActivePage::Page { panes, focus, .. }) = &mut self.page {
            if let Some(pane) = panes.get_mut(*focus) {
                pane.grid.step_selection(delta);
                if let Some(spec) = &pane.binding.map {
                    pane.map = Some(MapState::recompute(
                        pane.grid.data(),
                        pane.grid.selection(),
                        spec,
                        &self.boundaries,
                    ));
                }
            }
        }
    }

    fn clear_selection(&mut self) {
        if let Some(ActivePage::Page { panes, focus, .. }) = &mut self.page {
            if let Some(pane) = panes.get_mut(*focus) {
                // None is always in range.
                let _ = pane.grid.set_selection(None);
                if let Some(spec) = &pane.binding.map {
                    pane.map = Some(MapState::recompute(
                        pane.grid.data(),
                        None,
                        spec,
                        &self.boundaries,
                    ));
                }
            }
        }
    }

    fn focused_pane_mut(&mut self) -> Option<&mut GridPane> {
        match self.page.as_mut()? {
            ActivePage::Page { panes, focus, .. } => panes.get_mut(*focus),
            ActivePage::NotFound { .. } => None,
        }
    }

    /// Compare each grid's export counter with the value last seen and
    /// write one CSV per missed increment. Counter *edges*, not levels:
    /// a reload that leaves the counter untouched exports nothing.
    fn observe_exports(&mut self) {
        let mut status = None;
        if let Some(ActivePage::Page { panes, .. }) = &mut self.page {
            for pane in panes.iter_mut() {
                let clicks = pane.grid.export_clicks();
                if clicks == pane.last_export_seen {
                    continue;
                }
                let pending = clicks - pane.last_export_seen;
                pane.last_export_seen = clicks;
                let Some(file) = pane.binding.export_file else {
                    continue;
                };
                let path = self.export_dir.join(file);
                for _ in 0..pending {
                    match pane.grid.write_csv(&path) {
                        Ok(()) => {
                            self.exports_written += 1;
                            status = Some(format!("Exported {}", path.display()));
                        }
                        Err(e) => {
                            status = Some(format!("Export failed: {}", e));
                        }
                    }
                }
            }
        }
        if status.is_some() {
            self.status = status;
        }
    }
}

impl Widget for &mut App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut constraints = vec![Constraint::Length(2), Constraint::Fill(1)];
        if self.input_mode == InputMode::Filtering {
            constraints.push(Constraint::Length(3));
        }
        constraints.push(Constraint::Length(1));
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        self.render_header(layout[0], buf);

        let content = layout[1];
        if self.loading.is_loading() {
            let text = match &self.loading {
                LoadingState::Loading { path } => format!("Loading {} ...", path),
                LoadingState::Idle => String::new(),
            };
            Paragraph::new(text).centered().render(content, buf);
        } else {
            self.render_page(content, buf);
        }

        if self.input_mode == InputMode::Filtering {
            let input = Paragraph::new(self.filter_input.as_str()).block(
                Block::default().borders(Borders::ALL).title("Filter"),
            );
            input.render(layout[2], buf);
        }

        let (row_count, filter_active) = match self.focused_pane() {
            Some(pane) => (Some(pane.grid.visible().len()), pane.grid.filter().is_some()),
            None => (None, false),
        };
        let controls = Controls::new()
            .with_row_count(row_count)
            .with_filter_active(filter_active || self.input_mode == InputMode::Filtering);
        (&controls).render(*layout.last().expect("layout has rows"), buf);
    }
}

impl App {
    fn render_header(&self, area: Rect, buf: &mut Buffer) {
        let title = match &self.page {
            Some(ActivePage::Page { title, .. }) => *title,
            Some(ActivePage::NotFound { .. }) => "Page Not Found",
            None => "beatscope",
        };
        let mut second = self.current_path.clone();
        if let Some(status) = &self.status {
            second.push_str("  |  ");
            second.push_str(status);
        }
        let lines = vec![
            Line::from(Span::styled(title, Style::default().add_modifier(Modifier::BOLD))),
            Line::from(Span::styled(second, Style::default().fg(Color::DarkGray))),
        ];
        Paragraph::new(lines).render(area, buf);
    }

    fn render_page(&mut self, area: Rect, buf: &mut Buffer) {
        match &mut self.page {
            None => {
                Paragraph::new("Starting ...").centered().render(area, buf);
            }
            Some(ActivePage::NotFound { path }) => {
                let text = format!("404\n\nNo page is registered for {}.\nPress 0-4 to pick a page.", path);
                Paragraph::new(text)
                    .style(Style::default().fg(Color::Red))
                    .centered()
                    .render(area, buf);
            }
            Some(ActivePage::Page { intro, panes, focus, .. }) => {
                if panes.is_empty() {
                    // Home: intro plus the page directory.
                    let mut lines = vec![Line::from(*intro), Line::default()];
                    for page in self.registry.pages() {
                        if page.grids.is_empty() {
                            continue;
                        }
                        lines.push(Line::from(format!(
                            "  {}  {}",
                            page.paths.first().copied().unwrap_or(""),
                            page.title
                        )));
                    }
                    Paragraph::new(lines)
                        .block(Block::default().borders(Borders::ALL))
                        .render(area, buf);
                    return;
                }

                let mut constraints = vec![Constraint::Fill(1)];
                let show_tabs = panes.len() > 1;
                if show_tabs {
                    constraints.insert(0, Constraint::Length(1));
                }
                let rows = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints(constraints)
                    .split(area);

                if show_tabs {
                    let mut spans = Vec::new();
                    for (i, pane) in panes.iter().enumerate() {
                        let style = if i == *focus {
                            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                        } else {
                            Style::default().fg(Color::DarkGray)
                        };
                        spans.push(Span::styled(pane.binding.title, style));
                        if i + 1 < panes.len() {
                            spans.push(Span::raw("  |  "));
                        }
                    }
                    Paragraph::new(Line::from(spans)).render(rows[0], buf);
                }

                let pane_area = *rows.last().expect("layout has rows");
                let pane = &mut panes[*focus];
                if let (Some(spec), Some(map_state)) = (&pane.binding.map, &pane.map) {
                    let halves = Layout::default()
                        .direction(Direction::Horizontal)
                        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                        .split(pane_area);
                    GridView::new(pane.binding.title).focused(true).render(
                        halves[0],
                        buf,
                        &mut pane.grid,
                    );
                    MapView::new(&self.boundaries, map_state, spec, "Beat Map")
                        .render(halves[1], buf);
                } else {
                    GridView::new(pane.binding.title).focused(true).render(
                        pane_area,
                        buf,
                        &mut pane.grid,
                    );
                }
            }
        }
    }
}
