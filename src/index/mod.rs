//! Index document model for gazetteer entries.
//!
//! Defines the on-disk field set (names and casing are part of the index
//! contract), the text analyzer shared by indexing and querying, and the
//! [`DocumentBuilder`] that converts an enriched [`GazetteerEntry`] into an
//! index document: normalized name-with-alternates strings, the ancestor
//! chain, and the full-hierarchy field.

use std::path::Path;

use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tantivy::{
    Index, IndexWriter, TantivyDocument,
    schema::{
        FAST, Field, INDEXED, IndexRecordOption, STORED, STRING, Schema, SchemaBuilder,
        TextFieldIndexing, TextOptions,
    },
    tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer},
};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::geotree::GazetteerEntry;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, IndexError>;

pub(crate) const TOKENIZER_NAME: &str = "geo_text";

/// Stop words stripped from location text, matching the analyzer the index
/// was historically built with.
pub(crate) const STOP_WORDS: [&str; 9] = [
    "and",
    "of",
    "the",
    "state",
    "province",
    "county",
    "area",
    "region",
    "prefecture",
];

/// Field names of the document model. Exact casing matters for
/// compatibility with existing indexes.
pub(crate) mod field {
    pub const GEONAME_ID: &str = "GeonameId";
    pub const CLASS: &str = "Class";
    pub const CODE: &str = "Code";
    pub const POPULATION: &str = "Population";
    pub const LATITUDE: &str = "Latitude";
    pub const LONGITUDE: &str = "Longitude";
    pub const COUNTY: &str = "County";
    pub const ADM2: &str = "ADM2";
    pub const STATE: &str = "State";
    pub const ADM1: &str = "ADM1";
    pub const COUNTRY: &str = "Country";
    pub const PCL: &str = "PCL";
    pub const CONTINENT: &str = "Continent";
    pub const ANCESTORS_NAMES: &str = "AncestorsNames";
    pub const ANCESTORS_IDS: &str = "AncestorsIds";
    pub const NAME: &str = "Name";
    pub const FULL_HIERARCHY: &str = "FullHierarchy";
}

/// Bare admin1 codes like `IL` or `NSW` double as state alternate names.
static STATE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new("^[A-Z]{2,5}$").expect("valid regex"));

pub(crate) fn schema() -> Schema {
    let mut builder = SchemaBuilder::new();

    let text_indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text = TextOptions::default()
        .set_indexing_options(text_indexing)
        .set_stored();

    builder.add_text_field(field::GEONAME_ID, STRING | STORED);
    builder.add_text_field(field::CLASS, STRING | STORED);
    builder.add_text_field(field::CODE, STRING | STORED);
    builder.add_u64_field(field::POPULATION, FAST | INDEXED | STORED);
    builder.add_text_field(field::LATITUDE, STRING | STORED);
    builder.add_text_field(field::LONGITUDE, STRING | STORED);
    builder.add_text_field(field::COUNTY, text.clone());
    builder.add_text_field(field::ADM2, STRING | STORED);
    builder.add_text_field(field::STATE, text.clone());
    builder.add_text_field(field::ADM1, STRING | STORED);
    builder.add_text_field(field::COUNTRY, text.clone());
    builder.add_text_field(field::PCL, STRING | STORED);
    builder.add_text_field(field::CONTINENT, text.clone());
    builder.add_text_field(field::ANCESTORS_NAMES, text.clone());
    builder.add_text_field(field::ANCESTORS_IDS, text.clone());
    builder.add_text_field(field::NAME, text.clone());
    builder.add_text_field(field::FULL_HIERARCHY, text);
    builder.build()
}

pub(crate) fn text_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(
            STOP_WORDS.iter().map(ToString::to_string).collect::<Vec<_>>(),
        ))
        .build()
}

pub(crate) fn register_tokenizer(index: &Index) {
    index.tokenizers().register(TOKENIZER_NAME, text_analyzer());
}

/// Resolved handles for every document field.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DocFields {
    pub geoname_id: Field,
    pub class: Field,
    pub code: Field,
    pub population: Field,
    pub latitude: Field,
    pub longitude: Field,
    pub county: Field,
    pub adm2: Field,
    pub state: Field,
    pub adm1: Field,
    pub country: Field,
    pub pcl: Field,
    pub continent: Field,
    pub ancestors_names: Field,
    pub ancestors_ids: Field,
    pub name: Field,
    pub full_hierarchy: Field,
}

impl DocFields {
    pub(crate) fn resolve(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            geoname_id: schema.get_field(field::GEONAME_ID)?,
            class: schema.get_field(field::CLASS)?,
            code: schema.get_field(field::CODE)?,
            population: schema.get_field(field::POPULATION)?,
            latitude: schema.get_field(field::LATITUDE)?,
            longitude: schema.get_field(field::LONGITUDE)?,
            county: schema.get_field(field::COUNTY)?,
            adm2: schema.get_field(field::ADM2)?,
            state: schema.get_field(field::STATE)?,
            adm1: schema.get_field(field::ADM1)?,
            country: schema.get_field(field::COUNTRY)?,
            pcl: schema.get_field(field::PCL)?,
            continent: schema.get_field(field::CONTINENT)?,
            ancestors_names: schema.get_field(field::ANCESTORS_NAMES)?,
            ancestors_ids: schema.get_field(field::ANCESTORS_IDS)?,
            name: schema.get_field(field::NAME)?,
            full_hierarchy: schema.get_field(field::FULL_HIERARCHY)?,
        })
    }
}

/// Data-driven name cleanup, keyed by geoname id.
///
/// The defaults carry the shipped overrides: the United Kingdom's long
/// union name is replaced with the common short form (conjunctions in
/// union names hurt phrase search), and Vietnam gains its two-word English
/// variant.
#[derive(Debug, Clone)]
pub struct NameOverrides {
    rename: AHashMap<u32, String>,
    extra_alternates: AHashMap<u32, Vec<String>>,
}

impl Default for NameOverrides {
    fn default() -> Self {
        Self::empty()
            .rename(2635167, "United Kingdom")
            .add_alternate(1562822, "Viet Nam")
    }
}

impl NameOverrides {
    /// No overrides at all.
    pub fn empty() -> Self {
        Self {
            rename: AHashMap::new(),
            extra_alternates: AHashMap::new(),
        }
    }

    /// Replace the primary name of the entry with this id.
    #[must_use]
    pub fn rename(mut self, id: u32, name: impl Into<String>) -> Self {
        self.rename.insert(id, name.into());
        self
    }

    /// Inject an extra alternate name for the entry with this id.
    #[must_use]
    pub fn add_alternate(mut self, id: u32, name: impl Into<String>) -> Self {
        self.extra_alternates.entry(id).or_default().push(name.into());
        self
    }

    fn primary<'a>(&'a self, id: u32, name: &'a str) -> &'a str {
        self.rename.get(&id).map_or(name, String::as_str)
    }

    fn extras(&self, id: u32) -> &[String] {
        self.extra_alternates.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Format a name as `Primary` or `Primary (alt1, alt2, …)`.
    ///
    /// Alternates equal to the primary name (case-insensitive) are dropped
    /// and the parentheses are omitted when nothing remains. The list is
    /// sorted so documents are deterministic.
    pub(crate) fn format_name(&self, id: u32, name: &str, alternates: &AHashSet<String>) -> String {
        let name = self.primary(id, name);
        let mut listed: Vec<&str> = alternates
            .iter()
            .map(String::as_str)
            .chain(self.extras(id).iter().map(String::as_str))
            .filter(|alternate| !alternate.eq_ignore_ascii_case(name))
            .collect();
        if listed.is_empty() {
            return name.to_string();
        }
        listed.sort_unstable();
        listed.dedup();
        format!("{name} ({})", listed.iter().join(", "))
    }
}

/// A gazetteer index on disk (or in RAM for tests), with its schema and
/// analyzer registered.
#[derive(Clone)]
pub struct GazetteerIndex {
    pub(crate) index: Index,
    schema: Schema,
}

impl GazetteerIndex {
    /// Create a fresh index directory, replacing any previous index there.
    #[instrument(name = "Create Index", skip_all, fields(path = %path.as_ref().display()))]
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!("replacing existing index directory");
            std::fs::remove_dir_all(path)?;
        }
        std::fs::create_dir_all(path)?;
        let schema = schema();
        let index = Index::create_in_dir(path, schema.clone())?;
        register_tokenizer(&index);
        Ok(Self { index, schema })
    }

    /// Open an existing index directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let index = Index::open_in_dir(path.as_ref())?;
        register_tokenizer(&index);
        let schema = index.schema();
        Ok(Self { index, schema })
    }

    /// An ephemeral in-memory index, mainly for tests.
    pub fn create_in_ram() -> Self {
        let schema = schema();
        let index = Index::create_in_ram(schema.clone());
        register_tokenizer(&index);
        Self { index, schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }
}

/// Converts enriched entries into index documents.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    fields: DocFields,
    overrides: NameOverrides,
}

impl DocumentBuilder {
    pub fn new(index: &GazetteerIndex, overrides: NameOverrides) -> Result<Self> {
        let fields = DocFields::resolve(index.schema())?;
        Ok(Self { fields, overrides })
    }

    /// Build the document for one enriched entry.
    ///
    /// The ancestor chain accumulates county → state → country → continent.
    /// When the entry itself is the state (`ADM1`) or the country (`PCLI`),
    /// that ancestor's alternate names fold into the entry's own set and
    /// the ancestor is left out of the chain.
    pub fn build(&self, entry: &GazetteerEntry<'_>) -> TantivyDocument {
        let f = &self.fields;
        let mut doc = TantivyDocument::default();

        let mut alternates = entry.alternate_names.clone();
        alternates.insert(entry.ascii_name.clone());
        alternates.remove(&entry.name);

        doc.add_text(f.geoname_id, entry.id.to_string());
        doc.add_text(f.class, &entry.feature_class);
        doc.add_text(f.code, &entry.feature_code);
        doc.add_u64(f.population, entry.population);
        doc.add_text(f.latitude, entry.latitude.to_string());
        doc.add_text(f.longitude, entry.longitude.to_string());

        let mut ancestor_names: Vec<String> = Vec::new();
        let mut ancestor_ids: Vec<String> = Vec::new();

        if let Some(county) = entry.county {
            let formatted =
                self.overrides
                    .format_name(county.id, &county.name, &county.alternate_names);
            doc.add_text(f.county, &formatted);
            doc.add_text(f.adm2, county.id.to_string());
            ancestor_names.push(formatted);
            ancestor_ids.push(county.id.to_string());
        }

        if let Some(state) = entry.state {
            let mut state_alternates = state.alternate_names.clone();
            state_alternates.insert(state.name.clone());
            if let Some(code) = state.code.split('.').nth(1) {
                if STATE_CODE.is_match(code) {
                    state_alternates.insert(code.to_string());
                }
            }
            let entry_is_state = entry.feature_code.eq_ignore_ascii_case("ADM1");
            if entry_is_state {
                alternates.extend(state_alternates.iter().cloned());
            }
            let formatted = self
                .overrides
                .format_name(state.id, &state.name, &state_alternates);
            doc.add_text(f.state, &formatted);
            doc.add_text(f.adm1, state.id.to_string());
            if !entry_is_state {
                ancestor_names.push(formatted);
                ancestor_ids.push(state.id.to_string());
            }
        }

        if let Some(country) = entry.country {
            let mut country_alternates = country.alternate_names.clone();
            country_alternates.insert(country.name.clone());
            country_alternates.insert(country.iso.clone());
            country_alternates.insert(country.iso3.clone());
            let entry_is_country = entry.feature_code.eq_ignore_ascii_case("PCLI");
            if entry_is_country {
                alternates.extend(country_alternates.iter().cloned());
            }
            // The Country field stores the plain name; the formatted
            // variant goes into the ancestor chain.
            doc.add_text(f.country, &country.name);
            doc.add_text(f.pcl, country.id.to_string());
            let formatted =
                self.overrides
                    .format_name(country.id, &country.name, &country_alternates);
            if !entry_is_country {
                ancestor_names.push(formatted);
                ancestor_ids.push(country.id.to_string());
            }
            doc.add_text(f.continent, &country.continent_name);
            ancestor_names.push(country.continent_name.clone());
            ancestor_ids.push(country.continent_id.to_string());
            doc.add_text(f.ancestors_names, ancestor_names.iter().join(", "));
            doc.add_text(f.ancestors_ids, ancestor_ids.iter().join(", "));
        } else {
            // Worth flagging: only continents and a handful of oddities
            // legitimately have no country.
            debug!(
                id = entry.id,
                name = %entry.name,
                code = %entry.feature_code,
                "entry has no resolvable country"
            );
        }

        let name = self.overrides.format_name(entry.id, &entry.name, &alternates);
        if ancestor_names.is_empty() {
            doc.add_text(f.full_hierarchy, &name);
        } else {
            doc.add_text(
                f.full_hierarchy,
                format!("{name}, {}", ancestor_names.iter().join(", ")),
            );
        }
        doc.add_text(f.name, name);
        doc
    }
}
