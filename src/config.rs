//! Configuration for the batch indexer and the query service.

use std::path::PathBuf;

use ahash::AHashSet;
use tracing::{info, warn};

/// Row-level exclusion filter applied by the batch driver before enrichment.
///
/// A row is dropped when its feature class is excluded (unless its feature
/// code is explicitly included), when its feature code is excluded, or when
/// its geoname id is excluded. All four sets are externally supplied
/// configuration; empty sets keep every row.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    feature_class_exclude: AHashSet<String>,
    feature_code_include: AHashSet<String>,
    feature_code_exclude: AHashSet<String>,
    geoname_id_exclude: AHashSet<String>,
}

impl RowFilter {
    /// A filter that keeps every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter from comma-separated code lists, the format used in
    /// the service's properties file.
    pub fn from_lists(
        feature_class_exclude: &str,
        feature_code_include: &str,
        feature_code_exclude: &str,
        geoname_id_exclude: &str,
    ) -> Self {
        Self {
            feature_class_exclude: csv_set(feature_class_exclude),
            feature_code_include: csv_set(feature_code_include),
            feature_code_exclude: csv_set(feature_code_exclude),
            geoname_id_exclude: csv_set(geoname_id_exclude),
        }
    }

    /// Whether a raw gazetteer row should be skipped before enrichment.
    pub fn excludes(&self, geoname_id: &str, feature_class: &str, feature_code: &str) -> bool {
        (self.feature_class_exclude.contains(feature_class)
            && !self.feature_code_include.contains(feature_code))
            || self.feature_code_exclude.contains(feature_code)
            || self.geoname_id_exclude.contains(geoname_id)
    }
}

fn csv_set(raw: &str) -> AHashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Configuration for one batch indexing run.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Directory holding the GeoNames reference tables.
    pub resources_dir: PathBuf,
    /// Directory the index is (re)built in. Any previous index there is
    /// fully replaced.
    pub index_dir: PathBuf,
    /// Row exclusions applied before enrichment.
    pub filter: RowFilter,
}

impl IndexerConfig {
    pub fn new(resources_dir: impl Into<PathBuf>, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            resources_dir: resources_dir.into(),
            index_dir: index_dir.into(),
            filter: RowFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Record-count limits for the query service surface.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    /// Page size used when the caller does not request a count.
    pub default_records: usize,
    /// Hard cap on any requested count.
    pub max_records: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_records: 10,
            max_records: 10_000,
        }
    }
}

impl ServiceConfig {
    /// Interpret a raw `count` request parameter.
    ///
    /// Returns the record limit to fetch and whether an exact total-hit
    /// count was requested. Numeric counts are clamped to `max_records`
    /// (negatives are treated as positive); the literal `all` requests the
    /// exact count with the default page size; anything else falls back to
    /// the default with a warning.
    pub fn resolve_count(&self, raw: Option<&str>) -> (usize, bool) {
        let Some(raw) = raw else {
            info!(default = self.default_records, "no record count requested");
            return (self.default_records, false);
        };
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(count) => ((count.unsigned_abs() as usize).min(self.max_records), false),
            Err(_) if raw.eq_ignore_ascii_case("all") => {
                info!("requested all available records");
                (self.default_records, true)
            }
            Err(_) => {
                warn!(
                    count = raw,
                    default = self.default_records,
                    "unrecognized record count, using default"
                );
                (self.default_records, false)
            }
        }
    }
}
