//! Static page registry and path routing.
//!
//! Each page is a fixed definition: the named queries it runs, the column
//! layout of each grid, and the optional map wiring between a grid and the
//! boundary layer. Definitions are built once at startup and never change;
//! runtime page state lives in the `App`.

use crate::grid::{CellFormat, ColumnSpec};
use crate::map::{MapSpec, WeightScheme};
use crate::warehouse::{ParamKind, ParamSpec, ParamValue, QuerySpec};

pub const TOP_ARREST_RATES: QuerySpec = QuerySpec {
    name: "top_arrest_rates",
    table: "top_arrest_rates",
    fields: &["district", "beat", "arrest_rate"],
    params: &[],
};

pub const BOTTOM_ARREST_RATES: QuerySpec = QuerySpec {
    name: "bottom_arrest_rates",
    table: "bottom_arrest_rates",
    fields: &["district", "beat", "arrest_rate"],
    params: &[],
};

pub const TOP_CRIME_TYPES: QuerySpec = QuerySpec {
    name: "top_crime_types",
    table: "top_crime_types",
    fields: &["rank_of_crime_type", "primary_type", "cnt_2020"],
    params: &[],
};

pub const CRIME_TYPE_COMMUNITIES: QuerySpec = QuerySpec {
    name: "crime_type_communities",
    table: "crime_type_communities",
    fields: &["primary_type", "community_area", "cnt_2020", "cnt_jan_2021"],
    params: &[ParamSpec { name: "rank_of_crime_type", kind: ParamKind::IntRange(1, 5) }],
};

pub const TOP_STREETS_BY_WARD: QuerySpec = QuerySpec {
    name: "top_streets_by_ward",
    table: "top_streets_by_ward",
    fields: &["ward", "street", "domestic_crimes"],
    params: &[],
};

pub const CRIME_BY_TIME_PERIOD: QuerySpec = QuerySpec {
    name: "crime_by_time_period",
    table: "crime_by_time_period",
    fields: &["time_period", "most_common_crime_type", "overall_arrest_rate"],
    params: &[],
};

/// One grid on a page: its query, how to lay the result out, where exports
/// go, and the optional choropleth wiring.
#[derive(Debug, Clone)]
pub struct GridBinding {
    pub title: &'static str,
    pub query: &'static QuerySpec,
    pub params: Vec<ParamValue>,
    pub columns: Vec<ColumnSpec>,
    /// File name for one-shot CSV export; `None` disables export for this grid.
    pub export_file: Option<&'static str>,
    pub map: Option<MapSpec>,
}

#[derive(Debug, Clone)]
pub struct PageDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub paths: &'static [&'static str],
    pub intro: &'static str,
    pub grids: Vec<GridBinding>,
}

/// Outcome of a route lookup. Unknown paths resolve to a terminal
/// not-found page rather than an error.
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Page(&'a PageDefinition),
    NotFound,
}

pub struct Registry {
    pages: Vec<PageDefinition>,
}

impl Registry {
    /// Build the fixed page table. The weight scheme comes from
    /// configuration and applies to every map on every page.
    pub fn new(weights: WeightScheme) -> Self {
        let beat_map = MapSpec {
            location_field: "beat",
            value_field: "arrest_rate",
            scale_min: 0.0,
            scale_max: 0.4,
            weights,
        };

        let rate_columns = vec![
            ColumnSpec { field: "district", title: "District", format: CellFormat::Text, filterable: true },
            ColumnSpec { field: "beat", title: "Beat", format: CellFormat::Text, filterable: false },
            ColumnSpec { field: "arrest_rate", title: "Arrest Rate", format: CellFormat::Percent, filterable: false },
        ];

        let community_columns = vec![
            ColumnSpec { field: "primary_type", title: "Primary Type", format: CellFormat::Text, filterable: true },
            ColumnSpec { field: "community_area", title: "Community Area", format: CellFormat::Text, filterable: true },
            ColumnSpec { field: "cnt_2020", title: "Count 2020", format: CellFormat::Count, filterable: false },
            ColumnSpec { field: "cnt_jan_2021", title: "Count Jan 2021", format: CellFormat::Count, filterable: false },
        ];

        let mut q2_grids = vec![GridBinding {
            title: "Top 5 Primary Crime Types in 2020",
            query: &TOP_CRIME_TYPES,
            params: Vec::new(),
            columns: vec![
                ColumnSpec { field: "rank_of_crime_type", title: "Rank", format: CellFormat::Count, filterable: false },
                ColumnSpec { field: "primary_type", title: "Primary Type", format: CellFormat::Text, filterable: true },
                ColumnSpec { field: "cnt_2020", title: "Count 2020", format: CellFormat::Count, filterable: false },
            ],
            export_file: Some("top_primary_crime_type.csv"),
            map: None,
        }];
        const RANK_TITLES: [&str; 5] = [
            "Number 1 Crime Type by Community Area",
            "Number 2 Crime Type by Community Area",
            "Number 3 Crime Type by Community Area",
            "Number 4 Crime Type by Community Area",
            "Number 5 Crime Type by Community Area",
        ];
        for (rank, title) in (1..=5).zip(RANK_TITLES) {
            q2_grids.push(GridBinding {
                title,
                query: &CRIME_TYPE_COMMUNITIES,
                params: vec![ParamValue::Int(rank)],
                columns: community_columns.clone(),
                export_file: None,
                map: None,
            });
        }

        let pages = vec![
            PageDefinition {
                id: "home",
                title: "Explore Chicago Crime Statistics",
                paths: &["/", "/home"],
                intro: "A dashboard over the public Chicago crime statistics, \
                        precomputed into one warehouse table per question. \
                        Pick a page with the number keys.",
                grids: Vec::new(),
            },
            PageDefinition {
                id: "q1",
                title: "Arrest Rates for Residence Crime",
                paths: &["/q1"],
                intro: "Which beats are in the top and bottom 2% for arrest rate \
                        for residence crime in each district in 2020?",
                grids: vec![
                    GridBinding {
                        title: "Top 2% Arrest Rate by District",
                        query: &TOP_ARREST_RATES,
                        params: Vec::new(),
                        columns: rate_columns.clone(),
                        export_file: Some("top02_arrest_rate.csv"),
                        map: Some(beat_map),
                    },
                    GridBinding {
                        title: "Bottom 2% Arrest Rate by District",
                        query: &BOTTOM_ARREST_RATES,
                        params: Vec::new(),
                        columns: rate_columns,
                        export_file: Some("bottom02_arrest_rate.csv"),
                        map: Some(beat_map),
                    },
                ],
            },
            PageDefinition {
                id: "q2",
                title: "Primary Types of Crime",
                paths: &["/q2"],
                intro: "The top 5 primary crime types in 2020, the top 3 community \
                        areas for each, and how many of each type those areas saw \
                        in January 2021.",
                grids: q2_grids,
            },
            PageDefinition {
                id: "q3",
                title: "Top Streets for Domestic Crimes by Ward",
                paths: &["/q3"],
                intro: "What street in each ward had the most domestic crimes in 2020?",
                grids: vec![GridBinding {
                    title: "Top Streets for Domestic Crimes by Ward",
                    query: &TOP_STREETS_BY_WARD,
                    params: Vec::new(),
                    columns: vec![
                        ColumnSpec { field: "ward", title: "Ward", format: CellFormat::Count, filterable: true },
                        ColumnSpec { field: "street", title: "Street", format: CellFormat::Text, filterable: true },
                        ColumnSpec { field: "domestic_crimes", title: "Domestic Crimes", format: CellFormat::Count, filterable: false },
                    ],
                    export_file: Some("top_streets_by_ward.csv"),
                    map: None,
                }],
            },
            PageDefinition {
                id: "q4",
                title: "Common Crimes by Time Period",
                paths: &["/q4"],
                intro: "Which crime is the most common in each six-hour period of \
                        the day, and what is the arrest rate for each period?",
                grids: vec![GridBinding {
                    title: "Crime by Time Period",
                    query: &CRIME_BY_TIME_PERIOD,
                    params: Vec::new(),
                    columns: vec![
                        ColumnSpec { field: "time_period", title: "Time Period", format: CellFormat::Text, filterable: true },
                        ColumnSpec { field: "most_common_crime_type", title: "Most Common Crime", format: CellFormat::Text, filterable: true },
                        ColumnSpec { field: "overall_arrest_rate", title: "Arrest Rate", format: CellFormat::Percent, filterable: false },
                    ],
                    export_file: Some("crime_by_time_period.csv"),
                    map: None,
                }],
            },
        ];

        Self { pages }
    }

    /// Exact-match path lookup.
    pub fn resolve(&self, path: &str) -> Resolution<'_> {
        for page in &self.pages {
            if page.paths.contains(&path) {
                return Resolution::Page(page);
            }
        }
        Resolution::NotFound
    }

    pub fn pages(&self) -> &[PageDefinition] {
        &self.pages
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(WeightScheme::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_home_resolve_to_same_page() {
        let registry = Registry::default();
        let root = match registry.resolve("/") {
            Resolution::Page(page) => page.id,
            Resolution::NotFound => panic!("/ should resolve"),
        };
        let home = match registry.resolve("/home") {
            Resolution::Page(page) => page.id,
            Resolution::NotFound => panic!("/home should resolve"),
        };
        assert_eq!(root, "home");
        assert_eq!(home, "home");
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let registry = Registry::default();
        assert!(matches!(registry.resolve("/unknown-path"), Resolution::NotFound));
        assert!(matches!(registry.resolve("/q1/extra"), Resolution::NotFound));
    }

    #[test]
    fn test_registry_covers_all_question_pages() {
        let registry = Registry::default();
        for path in ["/q1", "/q2", "/q3", "/q4"] {
            assert!(matches!(registry.resolve(path), Resolution::Page(_)), "{} missing", path);
        }
    }

    #[test]
    fn test_q2_community_grids_cover_ranks_one_through_five() {
        let registry = Registry::default();
        let Resolution::Page(page) = registry.resolve("/q2") else {
            panic!("/q2 should resolve");
        };
        let ranks: Vec<ParamValue> =
            page.grids.iter().flat_map(|g| g.params.clone()).collect();
        assert_eq!(ranks, (1..=5).map(ParamValue::Int).collect::<Vec<_>>());
    }

    #[test]
    fn test_map_bindings_use_fixed_color_domain() {
        let registry = Registry::default();
        let Resolution::Page(page) = registry.resolve("/q1") else {
            panic!("/q1 should resolve");
        };
        for grid in &page.grids {
            let map = grid.map.expect("q1 grids are mapped");
            assert_eq!(map.scale_min, 0.0);
            assert_eq!(map.scale_max, 0.4);
        }
    }
}
