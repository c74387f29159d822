//! Query service over a built gazetteer index.
//!
//! Two entry points: [`GazetteerSearcher::search`] runs a free-form query
//! through the standard query parser, and
//! [`GazetteerSearcher::search_location`] resolves a structured location
//! string through the candidate cascade in [`cascade`]. Results are always
//! ordered by population, largest first.

mod cascade;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use serde::Serialize;
use tantivy::{
    Index, IndexReader, Order, TantivyDocument,
    collector::{Count, TopDocs},
    query::{Query, QueryParser, QueryParserError},
    schema::{Schema, Value},
    tokenizer::TextAnalyzer,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::index::{DocFields, GazetteerIndex, field, register_tokenizer, text_analyzer};
use cascade::build_candidates;

/// Sentinel for "more records exist but the total was not counted".
pub const AVAILABLE_UNKNOWN: i64 = -1;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryParserError),
    #[error("empty query")]
    EmptyQuery,
    #[error("record limit must be at least 1")]
    ZeroLimit,
    #[error("failed to open index at {path}: {source}")]
    OpenIndex {
        path: PathBuf,
        source: tantivy::TantivyError,
    },
    #[error("search backend error: {0}")]
    Backend(#[from] tantivy::TantivyError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, SearchError>;

/// How aggressively a location string is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Phrase matching against the full hierarchy only kicks in for
    /// multi-fragment locations.
    #[default]
    Default,
    /// Always include the full-hierarchy candidate.
    Full,
}

impl SearchMode {
    /// Interpret a raw `mode` request parameter; anything but `full` is the
    /// default mode.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(mode) if mode.trim().eq_ignore_ascii_case("full") => Self::Full,
            _ => Self::Default,
        }
    }
}

/// One page of search results, ready for serialization.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SearchResults {
    /// Stored fields of each hit, keyed by field name.
    pub records: Vec<BTreeMap<String, String>>,
    /// Number of records in this page.
    pub retrieved: usize,
    /// Total matching records, or [`AVAILABLE_UNKNOWN`] when the total was
    /// not established.
    pub available: i64,
}

impl SearchResults {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Load a location-override map: one `location<TAB>geoname_id` entry per
/// line.
pub fn load_override_map(path: impl AsRef<Path>) -> Result<AHashMap<String, String>> {
    let mut map = AHashMap::new();
    for line in BufReader::new(File::open(path.as_ref())?).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some((location, id)) = line.split_once('\t') else {
            warn!(line = %line, "override entry is not tab-separated, skipping");
            continue;
        };
        debug!(location = location.trim(), id = id.trim(), "override loaded");
        map.insert(location.trim().to_string(), id.trim().to_string());
    }
    info!(overrides = map.len(), "override map loaded");
    Ok(map)
}

/// A reusable handle on one gazetteer index.
pub struct GazetteerSearcher {
    index: Index,
    reader: IndexReader,
    schema: Schema,
    fields: DocFields,
    analyzer: TextAnalyzer,
    override_map: AHashMap<String, String>,
}

impl GazetteerSearcher {
    /// Open the index directory built by
    /// [`build_index`](crate::build_index).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let index = Index::open_in_dir(path).map_err(|source| SearchError::OpenIndex {
            path: path.to_path_buf(),
            source,
        })?;
        register_tokenizer(&index);
        Self::for_index(index)
    }

    /// Attach to an already-open index. Mainly for tests and embedders that
    /// build and query in one process.
    pub fn from_index(index: &GazetteerIndex) -> Result<Self> {
        Self::for_index(index.index.clone())
    }

    fn for_index(index: Index) -> Result<Self> {
        let schema = index.schema();
        let fields = DocFields::resolve(&schema)?;
        let reader = index.reader()?;
        let num_docs = reader.searcher().num_docs();
        info!(num_docs, "gazetteer searcher ready");
        if num_docs == 0 {
            warn!("index contains no documents");
        }
        Ok(Self {
            index,
            reader,
            schema,
            fields,
            analyzer: text_analyzer(),
            override_map: AHashMap::new(),
        })
    }

    /// Use this override map for [`search_location`](Self::search_location).
    #[must_use]
    pub fn with_override_map(mut self, override_map: AHashMap<String, String>) -> Self {
        self.override_map = override_map;
        self
    }

    /// Run a free-form query, with the name field as the default field.
    ///
    /// When `count_available` is set the exact total is established with a
    /// separate count pass; otherwise `available` is the page size when the
    /// page was short (proving there is nothing more) and
    /// [`AVAILABLE_UNKNOWN`] when the page filled up.
    #[instrument(name = "Search", skip(self))]
    pub fn search(&self, query: &str, count: usize, count_available: bool) -> Result<SearchResults> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if count == 0 {
            return Err(SearchError::ZeroLimit);
        }
        let parser = QueryParser::for_index(&self.index, vec![self.fields.name]);
        let query = parser.parse_query(query)?;

        let searcher = self.reader.searcher();
        let total = if count_available {
            searcher.search(&query, &Count)?
        } else {
            0
        };
        let records = self.fetch_sorted(&searcher, &query, count)?;
        let retrieved = records.len();
        let available = if count_available {
            total as i64
        } else if retrieved < count {
            retrieved as i64
        } else {
            AVAILABLE_UNKNOWN
        };
        debug!(retrieved, available, "free-form search complete");
        Ok(SearchResults {
            records,
            retrieved,
            available,
        })
    }

    /// Resolve a comma-separated location string through the candidate
    /// cascade, returning up to `max_records` hits from the first candidate
    /// that matches anything.
    #[instrument(name = "Search Location", skip(self))]
    pub fn search_location(
        &self,
        location: &str,
        max_records: usize,
        mode: SearchMode,
    ) -> Result<SearchResults> {
        if location.trim().is_empty() {
            return Ok(SearchResults::empty());
        }
        if max_records == 0 {
            return Err(SearchError::ZeroLimit);
        }

        let mut analyzer = self.analyzer.clone();
        let candidates = build_candidates(
            location,
            mode,
            &self.override_map,
            &self.fields,
            &mut analyzer,
        );

        let searcher = self.reader.searcher();
        for candidate in candidates {
            let total = searcher.search(&candidate.query, &Count)?;
            if total == 0 {
                continue;
            }
            let limit = total.min(max_records);
            let records = self.fetch_sorted(&searcher, &candidate.query, limit)?;
            debug!(
                kind = ?candidate.kind,
                total,
                retrieved = records.len(),
                "location resolved"
            );
            return Ok(SearchResults {
                retrieved: records.len(),
                records,
                available: total as i64,
            });
        }

        debug!(location, "no candidate matched");
        Ok(SearchResults::empty())
    }

    fn fetch_sorted(
        &self,
        searcher: &tantivy::Searcher,
        query: &dyn Query,
        limit: usize,
    ) -> Result<Vec<BTreeMap<String, String>>> {
        let collector =
            TopDocs::with_limit(limit).order_by_fast_field::<u64>(field::POPULATION, Order::Desc);
        let hits = searcher.search(query, &collector)?;
        hits.into_iter()
            .map(|(_population, address)| {
                let doc: TantivyDocument = searcher.doc(address)?;
                Ok(self.document_to_map(&doc))
            })
            .collect()
    }

    fn document_to_map(&self, doc: &TantivyDocument) -> BTreeMap<String, String> {
        let mut record = BTreeMap::new();
        for (field, entry) in self.schema.fields() {
            let Some(value) = doc.get_first(field) else {
                continue;
            };
            let rendered = value
                .as_str()
                .map(ToString::to_string)
                .or_else(|| value.as_u64().map(|population| population.to_string()));
            if let Some(rendered) = rendered {
                record.insert(entry.name().to_string(), rendered);
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use ahash::AHashSet;

    use super::*;
    use crate::geotree::{AdminUnit, Country, GazetteerEntry};
    use crate::index::{DocumentBuilder, NameOverrides};

    fn fixture_index() -> GazetteerIndex {
        let index = GazetteerIndex::create_in_ram();
        let builder = DocumentBuilder::new(&index, NameOverrides::default()).unwrap();
        let mut writer = index.writer(15_000_000).unwrap();

        let us = Country {
            iso: "US".to_string(),
            iso3: "USA".to_string(),
            name: "United States".to_string(),
            area: 9629091.0,
            population: 310232863,
            id: 6252001,
            continent_name: "North America".to_string(),
            continent_id: 6255149,
            alternate_names: AHashSet::new(),
        };
        let illinois = AdminUnit {
            code: "US.IL".to_string(),
            name: "Illinois".to_string(),
            ascii_name: "Illinois".to_string(),
            id: 4896861,
            alternate_names: AHashSet::new(),
        };

        let add = |id: u32,
                       name: &str,
                       population: u64,
                       state: Option<&AdminUnit>,
                       country: Option<&Country>| {
            let entry = GazetteerEntry {
                id,
                name: name.to_string(),
                ascii_name: name.to_string(),
                alternate_names: AHashSet::new(),
                latitude: 41.85003,
                longitude: -87.65005,
                feature_class: "P".to_string(),
                feature_code: "PPL".to_string(),
                country_code: "US".to_string(),
                population,
                country,
                state,
                county: None,
            };
            writer.add_document(builder.build(&entry)).unwrap();
        };

        // Three Illinois cities and a decoy one edit away from "Illinois".
        add(4887398, "Chicago", 2695598, Some(&illinois), Some(&us));
        add(4250542, "Springfield", 116250, Some(&illinois), Some(&us));
        add(4903279, "Naperville", 141853, Some(&illinois), Some(&us));
        add(424242, "Illinoid", 50, None, Some(&us));

        for i in 0..10u64 {
            add(1000 + i as u32, "Mudville", 1000 + i, None, Some(&us));
        }
        for i in 0..5u64 {
            add(2000 + i as u32, "Fiveton", 2000 + i, None, Some(&us));
        }
        for i in 0..3u64 {
            add(3000 + i as u32, "Tripleton", 3000 + i, None, Some(&us));
        }

        writer.commit().unwrap();
        index
    }

    fn searcher() -> GazetteerSearcher {
        GazetteerSearcher::from_index(&fixture_index()).unwrap()
    }

    #[test]
    fn test_search_full_page_leaves_available_unknown() {
        let searcher = searcher();
        let results = searcher.search("Mudville", 10, false).unwrap();
        assert_eq!(results.retrieved, 10);
        assert_eq!(results.available, AVAILABLE_UNKNOWN);

        // Exactly filling the page proves nothing about further matches.
        let results = searcher.search("Fiveton", 5, false).unwrap();
        assert_eq!(results.retrieved, 5);
        assert_eq!(results.available, AVAILABLE_UNKNOWN);
    }

    #[test]
    fn test_search_short_page_is_exact() {
        let searcher = searcher();
        let results = searcher.search("Tripleton", 5, false).unwrap();
        assert_eq!(results.retrieved, 3);
        assert_eq!(results.available, 3);
    }

    #[test]
    fn test_search_count_available_is_exact() {
        let searcher = searcher();
        let results = searcher.search("Mudville", 3, true).unwrap();
        assert_eq!(results.retrieved, 3);
        assert_eq!(results.available, 10);
    }

    #[test]
    fn test_search_orders_by_population_descending() {
        let searcher = searcher();
        let results = searcher.search("Mudville", 3, false).unwrap();
        let populations: Vec<&str> = results
            .records
            .iter()
            .map(|record| record["Population"].as_str())
            .collect();
        assert_eq!(populations, vec!["1009", "1008", "1007"]);
    }

    #[test]
    fn test_search_rejects_bad_input() {
        let searcher = searcher();
        assert!(matches!(
            searcher.search("   ", 5, false),
            Err(SearchError::EmptyQuery)
        ));
        assert!(matches!(
            searcher.search("Chicago", 0, false),
            Err(SearchError::ZeroLimit)
        ));
        assert!(matches!(
            searcher.search("Name:(((", 5, false),
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_search_location_short_circuits_before_fuzzy() {
        let searcher = searcher();
        // No document is named "Illinois", so the exact-phrase candidate
        // misses; the full-hierarchy candidate matches the three cities and
        // the fuzzy fallback never runs, keeping "Illinoid" out.
        let results = searcher
            .search_location("Illinois, United States", 10, SearchMode::Default)
            .unwrap();
        assert_eq!(results.available, 3);
        assert_eq!(results.retrieved, 3);
        assert!(
            results
                .records
                .iter()
                .all(|record| record["Name"] != "Illinoid")
        );
        // Largest city first.
        assert_eq!(results.records[0]["Name"], "Chicago");
        assert_eq!(results.records[0]["GeonameId"], "4887398");
    }

    #[test]
    fn test_search_location_fuzzy_fallback_catches_typos() {
        let searcher = searcher();
        let results = searcher
            .search_location("Chicaga", 5, SearchMode::Default)
            .unwrap();
        assert_eq!(results.retrieved, 1);
        assert_eq!(results.records[0]["Name"], "Chicago");
    }

    #[test]
    fn test_search_location_override_map() {
        let overrides =
            AHashMap::from_iter([("Windy City".to_string(), "4887398".to_string())]);
        let searcher = GazetteerSearcher::from_index(&fixture_index())
            .unwrap()
            .with_override_map(overrides);
        let results = searcher
            .search_location("Windy City", 5, SearchMode::Default)
            .unwrap();
        assert_eq!(results.retrieved, 1);
        assert_eq!(results.available, 1);
        assert_eq!(results.records[0]["GeonameId"], "4887398");
    }

    #[test]
    fn test_search_location_limits_page_but_reports_total() {
        let searcher = searcher();
        let results = searcher
            .search_location("Mudville", 4, SearchMode::Default)
            .unwrap();
        assert_eq!(results.retrieved, 4);
        assert_eq!(results.available, 10);
    }

    #[test]
    fn test_search_location_blank_and_unmatched() {
        let searcher = searcher();
        let results = searcher.search_location("  ", 5, SearchMode::Default).unwrap();
        assert_eq!(results.retrieved, 0);
        assert_eq!(results.available, 0);

        let results = searcher
            .search_location("Zzyzx, Qwertyland", 5, SearchMode::Default)
            .unwrap();
        assert_eq!(results.retrieved, 0);

        assert!(matches!(
            searcher.search_location("Chicago", 0, SearchMode::Default),
            Err(SearchError::ZeroLimit)
        ));
    }

    #[test]
    fn test_load_override_map() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("overrides.txt");
        std::fs::write(&path, "Windy City\t4887398\n\nnot tab separated\n").unwrap();
        let map = load_override_map(&path).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["Windy City"], "4887398");
    }

    #[test]
    fn test_search_mode_parse() {
        assert_eq!(SearchMode::parse(Some("full")), SearchMode::Full);
        assert_eq!(SearchMode::parse(Some(" FULL ")), SearchMode::Full);
        assert_eq!(SearchMode::parse(Some("default")), SearchMode::Default);
        assert_eq!(SearchMode::parse(None), SearchMode::Default);
    }

    #[test]
    fn test_results_serialize() {
        let results = SearchResults::empty();
        let json = serde_json::to_string(&results).unwrap();
        assert!(json.contains("\"retrieved\":0"));
    }
}
