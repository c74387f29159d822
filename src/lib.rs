//! Gazetteer - GeoNames indexing and location resolution
//!
//! This crate turns the flat GeoNames reference tables into a full-text
//! gazetteer index and resolves free-text place names against it. Indexing
//! builds a hierarchical document model (entry → county → state → country →
//! continent) from the raw tables; resolution runs a cascade of increasingly
//! relaxed queries over the index and ranks hits by population.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gazetteer::{IndexerConfig, GazetteerSearcher, SearchMode, build_index};
//!
//! // One-shot batch build: reference tables in, fresh index out.
//! let config = IndexerConfig::new("geonames/", "index/");
//! let stats = build_index(&config)?;
//! println!("indexed {} entries", stats.indexed);
//!
//! // Serve queries against the built index.
//! let searcher = GazetteerSearcher::open("index/")?;
//! let results = searcher.search_location("Cook County, Illinois, USA", 10, SearchMode::Default)?;
//! for record in &results.records {
//!     println!("{:?}", record.get("Name"));
//! }
//! # Ok::<(), gazetteer::error::GazetteerError>(())
//! ```
//!
//! # Components
//!
//! - [`Lookups`]: reference lookup builder (alternate names, countries,
//!   admin1/admin2 codes, fixed continent table)
//! - [`GazetteerEntry`]: one enriched gazetteer record with resolved
//!   ancestor links
//! - [`DocumentBuilder`]: converts an enriched entry into the index
//!   document field set
//! - [`GazetteerSearcher`]: free-form queries plus the location resolution
//!   cascade
//!
//! Indexing is a single-threaded batch job that fully replaces any previous
//! index. Query serving is read-only over the committed snapshot and safe to
//! share across threads.

use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod config;
pub mod error;
mod geotree;
mod index;
mod indexer;
mod search;

pub use config::{IndexerConfig, RowFilter, ServiceConfig};
pub use geotree::{
    AdminUnit, Country, GAZETTEER_FIELD_COUNT, GazetteerEntry, LookupError, Lookups, RowError,
};
pub use index::{DocumentBuilder, GazetteerIndex, IndexError, NameOverrides};
pub use indexer::{IndexStats, build_index};
pub use search::{
    AVAILABLE_UNKNOWN, GazetteerSearcher, SearchError, SearchMode, SearchResults,
    load_override_map,
};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the gazetteer library.
///
/// Sets up structured logging with configurable levels and filtering. Call
/// once at the start of your application; later calls are no-ops.
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static (), error::GazetteerError> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("tantivy=warn".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
        Ok(())
    })
}
