//! Per-row enrichment of raw gazetteer records.

use std::str::FromStr;

use ahash::AHashSet;
use thiserror::Error;

use super::{AdminUnit, Country, Lookups};

/// Raw gazetteer rows carry exactly this many tab-separated columns.
pub const GAZETTEER_FIELD_COUNT: usize = 19;

#[derive(Error, Debug)]
pub enum RowError {
    #[error("expected {GAZETTEER_FIELD_COUNT} tab-separated fields, found {0}")]
    FieldCount(usize),
    #[error("unparseable {field} value {value:?}")]
    Parse { field: &'static str, value: String },
}

/// One gazetteer record enriched with its resolved ancestors.
///
/// The county/state/country links borrow from the [`Lookups`] the entry was
/// enriched against; an entry never outlives the lookups of its indexing
/// run.
#[derive(Debug, Clone)]
pub struct GazetteerEntry<'a> {
    pub id: u32,
    pub name: String,
    pub ascii_name: String,
    pub alternate_names: AHashSet<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub feature_class: String,
    pub feature_code: String,
    pub country_code: String,
    pub population: u64,
    pub country: Option<&'a Country>,
    pub state: Option<&'a AdminUnit>,
    pub county: Option<&'a AdminUnit>,
}

fn parse<T: FromStr>(value: &str, field: &'static str) -> Result<T, RowError> {
    value.trim().parse().map_err(|_| RowError::Parse {
        field,
        value: value.to_string(),
    })
}

impl<'a> GazetteerEntry<'a> {
    /// Enrich one raw `allCountries.txt` row.
    ///
    /// Lookup misses are not errors; the entry just carries fewer ancestor
    /// links. Parse failures are errors so the batch driver can skip the
    /// row with a warning.
    pub fn from_row(row: &str, lookups: &'a Lookups) -> Result<Self, RowError> {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() != GAZETTEER_FIELD_COUNT {
            return Err(RowError::FieldCount(fields.len()));
        }

        let id: u32 = parse(fields[0], "geoname id")?;
        let latitude: f64 = parse(fields[4], "latitude")?;
        let longitude: f64 = parse(fields[5], "longitude")?;
        let mut population: u64 = parse(fields[14], "population")?;
        let feature_code = fields[7].to_string();
        let country_code = fields[8].to_string();
        let adm1 = fields[10].trim();
        let adm2 = fields[11].trim();

        let alternate_names = lookups.alt_names.get(&id).cloned().unwrap_or_default();

        // Continents are reported with zero population; synthesize it from
        // the member countries listed in the country-list column.
        if feature_code == "CONT" && population == 0 {
            population = fields[9]
                .split(',')
                .filter_map(|code| lookups.countries.get(code.trim()))
                .map(|country| country.population)
                .sum();
        }

        let country = lookups.countries.get(&country_code);
        let state = if adm1.is_empty() {
            None
        } else {
            lookups.adm1.get(&format!("{country_code}.{adm1}"))
        };
        let county = if adm1.is_empty() || adm2.is_empty() {
            None
        } else {
            lookups.adm2.get(&format!("{country_code}.{adm1}.{adm2}"))
        };

        Ok(Self {
            id,
            name: fields[1].to_string(),
            ascii_name: fields[2].to_string(),
            alternate_names,
            latitude,
            longitude,
            feature_class: fields[6].to_string(),
            feature_code,
            country_code,
            population,
            country,
            state,
            county,
        })
    }
}
