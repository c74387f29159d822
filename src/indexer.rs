//! Batch driver that builds the full-text index from the raw gazetteer dump.

use std::fs::File;
use std::io::{BufRead, BufReader};

use tracing::{info, instrument, warn};

use crate::config::IndexerConfig;
use crate::error::Result;
use crate::geotree::{GAZETTEER_FIELD_COUNT, GazetteerEntry, LookupError, Lookups};
use crate::index::{DocumentBuilder, GazetteerIndex, NameOverrides};

/// The main GeoNames dump, one record per line.
pub(crate) const GAZETTEER_FILE: &str = "allCountries.txt";

const PROGRESS_EVERY: usize = 500_000;
const WRITER_MEMORY_BUDGET: usize = 500_000_000;

/// Outcome of one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Rows turned into documents.
    pub indexed: usize,
    /// Rows dropped by the configured [`RowFilter`](crate::RowFilter).
    pub filtered: usize,
    /// Malformed rows skipped with a warning.
    pub skipped: usize,
}

/// Rebuild the index at `config.index_dir` from the reference tables and
/// gazetteer dump in `config.resources_dir`.
///
/// Any existing index in the target directory is replaced. Malformed rows
/// are logged and skipped rather than aborting a multi-hour run.
#[instrument(name = "Build Index", skip_all, fields(index_dir = %config.index_dir.display()))]
pub fn build_index(config: &IndexerConfig) -> Result<IndexStats> {
    let lookups = Lookups::build(&config.resources_dir)?;
    let index = GazetteerIndex::create(&config.index_dir)?;
    let builder = DocumentBuilder::new(&index, NameOverrides::default())?;
    let mut writer = index.writer(WRITER_MEMORY_BUDGET)?;

    let path = config.resources_dir.join(GAZETTEER_FILE);
    let file = File::open(&path).map_err(|source| LookupError::OpenFile {
        path: path.clone(),
        source,
    })?;

    let mut stats = IndexStats::default();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(LookupError::Io)?;
        let row = line.trim_end_matches(['\r', '\n']);
        if row.is_empty() {
            continue;
        }

        let mut columns = row.split('\t');
        let (Some(id), Some(class), Some(code)) =
            (columns.next(), columns.nth(5), columns.next())
        else {
            warn!(row = %row, "row has too few fields, skipping");
            stats.skipped += 1;
            continue;
        };
        if config.filter.excludes(id, class, code) {
            stats.filtered += 1;
            continue;
        }

        match GazetteerEntry::from_row(row, &lookups) {
            Ok(entry) => {
                writer.add_document(builder.build(&entry))?;
                stats.indexed += 1;
                if stats.indexed % PROGRESS_EVERY == 0 {
                    info!(indexed = stats.indexed, "indexing progress");
                }
            }
            Err(err) => {
                warn!(row = %row, error = %err, "skipping malformed row");
                stats.skipped += 1;
            }
        }
    }

    writer.commit()?;
    info!(
        indexed = stats.indexed,
        filtered = stats.filtered,
        skipped = stats.skipped,
        expected_fields = GAZETTEER_FIELD_COUNT,
        "index build complete"
    );
    Ok(stats)
}
