//! Choropleth map state: a static boundary layer plus per-feature values
//! and visual weights derived from the grid's current selection.
//!
//! `MapState::recompute` is total and synchronous; every call fully
//! replaces both maps, so a rejected selection or failed load can never
//! leave the map half-updated.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Deserialize;

use crate::warehouse::{normalize_location_key, ResultSet};

/// One geographic boundary, keyed by its location code. Rings are closed
/// (lon, lat) loops.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub key: String,
    pub rings: Vec<Vec<(f64, f64)>>,
}

/// The boundary file, loaded once at startup and shared read-only across
/// pages for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct BoundaryLayer {
    features: Vec<Boundary>,
    index: HashMap<String, usize>,
    /// (min_x, min_y, max_x, max_y) over every ring; canvas bounds.
    bounds: (f64, f64, f64, f64),
}

#[derive(Deserialize)]
struct GeoFeatureCollection {
    features: Vec<GeoFeature>,
}

#[derive(Deserialize)]
struct GeoFeature {
    properties: serde_json::Map<String, serde_json::Value>,
    geometry: GeoGeometry,
}

#[derive(Deserialize)]
struct GeoGeometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: serde_json::Value,
}

impl BoundaryLayer {
    /// Parse a GeoJSON feature collection, keying each feature by the given
    /// string property (e.g. `beat_num`).
    pub fn from_geojson_file(path: &Path, key_property: &str) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let collection: GeoFeatureCollection = serde_json::from_str(&text)?;

        let mut features = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let key = feature
                .properties
                .get(key_property)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    eyre!("boundary feature missing string property `{}`", key_property)
                })?;
            let rings = parse_rings(&feature.geometry)?;
            features.push(Boundary {
                key: normalize_location_key(key).into_owned(),
                rings,
            });
        }
        Ok(Self::new(features))
    }

    pub fn new(features: Vec<Boundary>) -> Self {
        let index = features
            .iter()
            .enumerate()
            .map(|(i, b)| (b.key.clone(), i))
            .collect();
        let mut bounds = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        let mut any = false;
        for boundary in &features {
            for ring in &boundary.rings {
                for &(x, y) in ring {
                    any = true;
                    bounds.0 = bounds.0.min(x);
                    bounds.1 = bounds.1.min(y);
                    bounds.2 = bounds.2.max(x);
                    bounds.3 = bounds.3.max(y);
                }
            }
        }
        if !any {
            // No coordinates at all; keep the canvas bounds degenerate
            // instead of inverted.
            bounds = (0.0, 0.0, 0.0, 0.0);
        }
        Self { features, index, bounds }
    }

    pub fn get(&self, key: &str) -> Option<&Boundary> {
        self.index.get(key).map(|&i| &self.features[i])
    }

    pub fn features(&self) -> &[Boundary] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.bounds
    }
}

fn parse_rings(geometry: &GeoGeometry) -> Result<Vec<Vec<(f64, f64)>>> {
    type Ring = Vec<[f64; 2]>;
    let rings: Vec<Ring> = match geometry.kind.as_str() {
        "Polygon" => serde_json::from_value(geometry.coordinates.clone())?,
        "MultiPolygon" => {
            let polygons: Vec<Vec<Ring>> = serde_json::from_value(geometry.coordinates.clone())?;
            polygons.into_iter().flatten().collect()
        }
        other => return Err(eyre!("unsupported geometry type `{}`", other)),
    };
    Ok(rings
        .into_iter()
        .map(|ring| ring.into_iter().map(|[x, y]| (x, y)).collect())
        .collect())
}

/// The two-level visual prominence scheme. Values are configuration, not
/// derived from data; `dimmed` must stay below `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightScheme {
    pub normal: f64,
    pub emphasized: f64,
    pub dimmed: f64,
}

impl Default for WeightScheme {
    fn default() -> Self {
        // Marker opacities used by the original dashboard.
        Self { normal: 0.5, emphasized: 0.5, dimmed: 0.1 }
    }
}

/// Per-grid map wiring: which fields join the grid to the boundary layer,
/// plus the fixed color-scale domain so color meaning is stable across
/// reloads and pages.
#[derive(Debug, Clone, Copy)]
pub struct MapSpec {
    pub location_field: &'static str,
    pub value_field: &'static str,
    pub scale_min: f64,
    pub scale_max: f64,
    pub weights: WeightScheme,
}

impl MapSpec {
    /// Position of `value` within the fixed color domain, clamped to [0, 1].
    pub fn scale_position(&self, value: f64) -> f64 {
        let span = self.scale_max - self.scale_min;
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.scale_min) / span).clamp(0.0, 1.0)
    }
}

/// Derived map encoding for one grid: feature key -> color value and
/// feature key -> visual weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapState {
    values: HashMap<String, f64>,
    weights: HashMap<String, f64>,
}

impl MapState {
    /// Derive the full encoding from the loaded rows and current selection.
    ///
    /// Rows whose location has no matching boundary contribute nothing to
    /// the map but remain in the grid; that asymmetry is deliberate.
    pub fn recompute(
        data: &ResultSet,
        selection: Option<usize>,
        spec: &MapSpec,
        layer: &BoundaryLayer,
    ) -> MapState {
        let selected_key = selection
            .and_then(|row| data.str_value(row, spec.location_field))
            .map(|raw| normalize_location_key(&raw).into_owned())
            .filter(|key| layer.get(key).is_some());

        let mut values = HashMap::new();
        let mut weights = HashMap::new();
        for row in 0..data.len() {
            let Some(raw) = data.str_value(row, spec.location_field) else {
                continue;
            };
            let key = normalize_location_key(&raw).into_owned();
            if layer.get(&key).is_none() {
                continue;
            }
            if let Some(value) = data.f64_value(row, spec.value_field) {
                values.insert(key.clone(), value);
            }
            let weight = match &selected_key {
                None => spec.weights.normal,
                Some(selected) if *selected == key => spec.weights.emphasized,
                Some(_) => spec.weights.dimmed,
            };
            weights.insert(key, weight);
        }
        MapState { values, weights }
    }

    pub fn value_of(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn weight_of(&self, key: &str) -> Option<f64> {
        self.weights.get(key).copied()
    }

    pub fn mapped_len(&self) -> usize {
        self.weights.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::df;

    fn layer() -> BoundaryLayer {
        let square = |x0: f64, y0: f64| {
            vec![vec![(x0, y0), (x0 + 1.0, y0), (x0 + 1.0, y0 + 1.0), (x0, y0 + 1.0), (x0, y0)]]
        };
        BoundaryLayer::new(vec![
            Boundary { key: "0101".to_string(), rings: square(0.0, 0.0) },
            Boundary { key: "0102".to_string(), rings: square(1.0, 0.0) },
        ])
    }

    fn spec() -> MapSpec {
        MapSpec {
            location_field: "beat",
            value_field: "rate",
            scale_min: 0.0,
            scale_max: 0.4,
            weights: WeightScheme::default(),
        }
    }

    fn data() -> ResultSet {
        let df = df!(
            "district" => [1i64, 1],
            "beat" => ["0101", "0102"],
            "rate" => [0.12f64, 0.30],
        )
        .unwrap();
        ResultSet::from_frame(df)
    }

    #[test]
    fn test_no_selection_gives_all_normal_weights() {
        let state = MapState::recompute(&data(), None, &spec(), &layer());
        assert_eq!(state.weight_of("0101"), Some(0.5));
        assert_eq!(state.weight_of("0102"), Some(0.5));
        assert_eq!(state.value_of("0101"), Some(0.12));
        assert_eq!(state.value_of("0102"), Some(0.30));
    }

    #[test]
    fn test_selection_emphasizes_exactly_one_feature() {
        let scheme = WeightScheme::default();
        let state = MapState::recompute(&data(), Some(1), &spec(), &layer());
        assert_eq!(state.weight_of("0102"), Some(scheme.emphasized));
        assert_eq!(state.weight_of("0101"), Some(scheme.dimmed));
        let emphasized = ["0101", "0102"]
            .iter()
            .filter(|k| state.weight_of(k) == Some(scheme.emphasized))
            .count();
        assert_eq!(emphasized, 1);
    }

    #[test]
    fn test_unmatched_locations_are_dropped_silently() {
        let df = df!(
            "district" => [1i64, 2],
            "beat" => ["0101", "9999"],
            "rate" => [0.12f64, 0.44],
        )
        .unwrap();
        let data = ResultSet::from_frame(df);
        let state = MapState::recompute(&data, None, &spec(), &layer());
        assert_eq!(state.mapped_len(), 1);
        assert_eq!(state.weight_of("9999"), None);
        // The row stays in the grid; only the map drops it.
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_location_keys_are_zero_padded_before_join() {
        let df = df!(
            "beat" => ["101"],
            "rate" => [0.2f64],
        )
        .unwrap();
        let state = MapState::recompute(&ResultSet::from_frame(df), None, &spec(), &layer());
        assert_eq!(state.weight_of("0101"), Some(0.5));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let data = data();
        let first = MapState::recompute(&data, Some(0), &spec(), &layer());
        let second = MapState::recompute(&data, Some(0), &spec(), &layer());
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_value_still_gets_a_weight() {
        let df = df!(
            "beat" => ["0101"],
            "rate" => [Option::<f64>::None],
        )
        .unwrap();
        let state = MapState::recompute(&ResultSet::from_frame(df), None, &spec(), &layer());
        assert_eq!(state.value_of("0101"), None);
        assert_eq!(state.weight_of("0101"), Some(0.5));
    }

    #[test]
    fn test_scale_position_is_clamped_to_fixed_domain() {
        let spec = spec();
        assert_eq!(spec.scale_position(0.0), 0.0);
        assert_eq!(spec.scale_position(0.2), 0.5);
        assert_eq!(spec.scale_position(1.5), 1.0);
    }

    #[test]
    fn test_empty_layer_has_degenerate_bounds() {
        let layer = BoundaryLayer::new(Vec::new());
        assert!(layer.is_empty());
        let (min_x, min_y, max_x, max_y) = layer.bounds();
        assert_eq!((min_x, min_y, max_x, max_y), (0.0, 0.0, 0.0, 0.0));
        assert!(min_x <= max_x && min_y <= max_y);
    }

    #[test]
    fn test_geojson_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beats.geojson");
        std::fs::write(
            &path,
            r#"{
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": {"beat_num": "111"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[-87.6, 41.8], [-87.5, 41.8], [-87.5, 41.9], [-87.6, 41.8]]]
                    }
                }]
            }"#,
        )
        .unwrap();
        let layer = BoundaryLayer::from_geojson_file(&path, "beat_num").unwrap();
        assert_eq!(layer.len(), 1);
        // Keys are normalized at load time.
        assert!(layer.get("0111").is_some());
        let (min_x, min_y, max_x, max_y) = layer.bounds();
        assert_eq!((min_x, min_y, max_x, max_y), (-87.6, 41.8, -87.5, 41.9));
    }
}
