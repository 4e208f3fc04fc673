use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Color,
    symbols,
    widgets::{
        canvas::{Canvas, Line as CanvasLine},
        Block, Borders, Widget,
    },
};

use crate::map::{BoundaryLayer, MapSpec, MapState};

/// Viridis anchor colors, low to high.
const VIRIDIS: [(f64, f64, f64); 9] = [
    (0.267, 0.005, 0.329),
    (0.281, 0.155, 0.469),
    (0.244, 0.290, 0.538),
    (0.191, 0.407, 0.556),
    (0.147, 0.511, 0.557),
    (0.128, 0.615, 0.538),
    (0.208, 0.719, 0.473),
    (0.430, 0.808, 0.346),
    (0.993, 0.906, 0.144),
];

/// Color for a position in [0, 1] on the fixed scale, darkened by the
/// feature's visual weight relative to the normal weight.
fn scale_color(position: f64, brightness: f64) -> Color {
    let scaled = position.clamp(0.0, 1.0) * (VIRIDIS.len() - 1) as f64;
    let low = scaled.floor() as usize;
    let high = (low + 1).min(VIRIDIS.len() - 1);
    let t = scaled - low as f64;
    let lerp = |a: f64, b: f64| a + (b - a) * t;
    let (r, g, b) = (
        lerp(VIRIDIS[low].0, VIRIDIS[high].0),
        lerp(VIRIDIS[low].1, VIRIDIS[high].1),
        lerp(VIRIDIS[low].2, VIRIDIS[high].2),
    );
    let brightness = brightness.clamp(0.0, 1.0);
    Color::Rgb(
        (r * brightness * 255.0) as u8,
        (g * brightness * 255.0) as u8,
        (b * brightness * 255.0) as u8,
    )
}

/// Choropleth canvas: boundary rings stroked in the value's scale color,
/// dimmed or emphasized according to the current [`MapState`] weights.
pub struct MapView<'a> {
    layer: &'a BoundaryLayer,
    state: &'a MapState,
    spec: &'a MapSpec,
    title: &'a str,
}

impl<'a> MapView<'a> {
    pub fn new(
        layer: &'a BoundaryLayer,
        state: &'a MapState,
        spec: &'a MapSpec,
        title: &'a str,
    ) -> Self {
        Self { layer, state, spec, title }
    }
}

impl Widget for MapView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (min_x, min_y, max_x, max_y) = self.layer.bounds();
        let canvas = Canvas::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(self.title.to_string()),
            )
            .marker(symbols::Marker::Braille)
            .x_bounds([min_x, max_x])
            .y_bounds([min_y, max_y])
            .paint(|ctx| {
                for boundary in self.layer.features() {
                    let color = match self.state.weight_of(&boundary.key) {
                        Some(weight) => {
                            let position = self
                                .state
                                .value_of(&boundary.key)
                                .map(|v| self.spec.scale_position(v))
                                .unwrap_or(0.0);
                            // Weight modulates brightness; normal maps to full.
                            let brightness = if self.spec.weights.normal > 0.0 {
                                (weight / self.spec.weights.normal).clamp(0.2, 1.0)
                            } else {
                                1.0
                            };
                            scale_color(position, brightness)
                        }
                        // Feature with no data row: faint outline only.
                        None => Color::DarkGray,
                    };
                    for ring in &boundary.rings {
                        for pair in ring.windows(2) {
                            ctx.draw(&CanvasLine {
                                x1: pair[0].0,
                                y1: pair[0].1,
                                x2: pair[1].0,
                                y2: pair[1].1,
                                color,
                            });
                        }
                    }
                }
            });
        canvas.render(area, buf);
    }
}
