//! Reference lookup builder for the GeoNames tables.
//!
//! Parses the flat reference tables (alternate names, country info, admin1
//! and admin2 codes) into in-memory lookups that the enricher and document
//! builder resolve against. The lookups are built once per indexing run and
//! never mutated afterwards; callers pass them by reference.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use ahash::{AHashMap, AHashSet};
use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::{info, instrument, warn};

mod entry;

pub use entry::{GAZETTEER_FIELD_COUNT, GazetteerEntry, RowError};

pub(crate) const ALT_NAMES_FILE: &str = "alternateNamesV2.txt";
pub(crate) const COUNTRY_FILE: &str = "countryInfo.txt";
pub(crate) const ADM1_FILE: &str = "admin1CodesASCII.txt";
pub(crate) const ADM2_FILE: &str = "admin2Codes.txt";

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("could not open reference file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, LookupError>;

/// One continent from the fixed reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continent {
    pub id: u32,
    pub name: &'static str,
}

/// Continent codes are invariant reference data, not derived from input.
static CONTINENTS: Lazy<AHashMap<&'static str, Continent>> = Lazy::new(|| {
    AHashMap::from_iter([
        ("EU", Continent { id: 6255148, name: "Europe" }),
        ("AS", Continent { id: 6255147, name: "Asia" }),
        ("NA", Continent { id: 6255149, name: "North America" }),
        ("SA", Continent { id: 6255150, name: "South America" }),
        ("AF", Continent { id: 6255146, name: "Africa" }),
        ("OC", Continent { id: 6255151, name: "Oceania" }),
        ("AN", Continent { id: 6255152, name: "Antarctica" }),
    ])
});

pub(crate) fn continent(code: &str) -> Option<&'static Continent> {
    CONTINENTS.get(code)
}

/// One country from `countryInfo.txt`, keyed by ISO-2 code.
#[derive(Debug, Clone)]
pub struct Country {
    pub iso: String,
    pub iso3: String,
    pub name: String,
    pub area: f64,
    pub population: u64,
    pub id: u32,
    /// Empty when the continent code did not resolve.
    pub continent_name: String,
    /// -1 when the continent code did not resolve.
    pub continent_id: i64,
    pub alternate_names: AHashSet<String>,
}

/// One admin1 or admin2 unit, keyed by its composite code
/// (`ISO.adm1` or `ISO.adm1.adm2`).
#[derive(Debug, Clone)]
pub struct AdminUnit {
    pub code: String,
    pub name: String,
    pub ascii_name: String,
    pub id: u32,
    pub alternate_names: AHashSet<String>,
}

/// Immutable reference lookups built once per indexing run.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub alt_names: AHashMap<u32, AHashSet<String>>,
    pub countries: AHashMap<String, Country>,
    pub adm1: AHashMap<String, AdminUnit>,
    pub adm2: AHashMap<String, AdminUnit>,
}

impl Lookups {
    /// Build all lookups from a directory of GeoNames reference tables.
    ///
    /// Single synchronous pass, idempotent for identical inputs. A file
    /// that cannot be opened is fatal; a malformed row is skipped with a
    /// warning.
    #[instrument(name = "Build Lookups", skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn build(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        info!("loading gazetteer reference tables");
        let alt_names = build_alt_names(&dir.join(ALT_NAMES_FILE))?;
        let countries = build_countries(&dir.join(COUNTRY_FILE), &alt_names)?;
        let adm1 = build_admin(&dir.join(ADM1_FILE), &alt_names)?;
        let adm2 = build_admin(&dir.join(ADM2_FILE), &alt_names)?;
        info!(
            alt_name_ids = alt_names.len(),
            countries = countries.len(),
            adm1 = adm1.len(),
            adm2 = adm2.len(),
            "reference lookups ready"
        );
        Ok(Self {
            alt_names,
            countries,
            adm1,
            adm2,
        })
    }
}

fn open_reference(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|source| LookupError::OpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn preview(line: &str) -> String {
    line.chars().take(40).collect()
}

/// A name qualifies when its language is `en`/`abbr` or any of the
/// preferred/short/colloquial/historic flags is set.
///
/// The reference implementation compared the flag columns with `==` on
/// boxed strings, which never fires; value equality is used here on
/// purpose (see `flag_semantics_diverge_from_reference_identity`).
fn retain_alternate(language: &str, fields: &[&str]) -> bool {
    let flag = |idx: usize| fields.get(idx).copied() == Some("1");
    language.eq_ignore_ascii_case("abbr")
        || language.eq_ignore_ascii_case("en")
        || flag(4)
        || flag(5)
        || flag(6)
        || flag(7)
}

fn build_alt_names(path: &Path) -> Result<AHashMap<u32, AHashSet<String>>> {
    let reader = open_reference(path)?;
    let mut lookup: AHashMap<u32, AHashSet<String>> = AHashMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            warn!(row = %preview(&line), "skipping malformed alternate-name row");
            continue;
        }
        let Ok(id) = fields[1].parse::<u32>() else {
            warn!(value = fields[1], "skipping alternate-name row with non-numeric id");
            continue;
        };
        if retain_alternate(fields[2], &fields) {
            lookup.entry(id).or_default().insert(fields[3].to_string());
        }
    }
    info!(ids = lookup.len(), "alternate names loaded");
    Ok(lookup)
}

fn build_countries(
    path: &Path,
    alt_names: &AHashMap<u32, AHashSet<String>>,
) -> Result<AHashMap<String, Country>> {
    let reader = open_reference(path)?;
    let mut lookup = AHashMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 17 {
            warn!(row = %preview(line), "skipping malformed country row");
            continue;
        }
        let (Ok(area), Ok(population), Ok(id)) = (
            fields[6].parse::<f64>(),
            fields[7].parse::<u64>(),
            fields[16].parse::<u32>(),
        ) else {
            warn!(row = %preview(line), "skipping country row with unparseable numbers");
            continue;
        };
        let name = fields[4];
        let (continent_name, continent_id) = match continent(fields[8]) {
            Some(continent) => (continent.name.to_string(), i64::from(continent.id)),
            None => (String::new(), -1),
        };
        let mut alternate_names = AHashSet::new();
        if let Some(known) = alt_names.get(&id) {
            alternate_names = known.clone();
            alternate_names.insert(name.to_string());
        }
        lookup.insert(
            fields[0].to_string(),
            Country {
                iso: fields[0].to_string(),
                iso3: fields[1].to_string(),
                name: name.to_string(),
                area,
                population,
                id,
                continent_name,
                continent_id,
                alternate_names,
            },
        );
    }
    info!(countries = lookup.len(), "countries loaded");
    Ok(lookup)
}

fn build_admin(
    path: &Path,
    alt_names: &AHashMap<u32, AHashSet<String>>,
) -> Result<AHashMap<String, AdminUnit>> {
    let reader = open_reference(path)?;
    let mut lookup = AHashMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            warn!(row = %preview(line), "skipping short admin row");
            continue;
        }
        let Ok(id) = fields[3].parse::<u32>() else {
            warn!(value = fields[3], "skipping admin row with non-numeric id");
            continue;
        };
        let name = fields[1];
        let ascii_name = fields[2];
        let mut alternate_names = AHashSet::new();
        if let Some(known) = alt_names.get(&id) {
            alternate_names = known.clone();
            alternate_names.insert(name.to_string());
            alternate_names.insert(ascii_name.to_string());
        }
        lookup.insert(
            fields[0].to_string(),
            AdminUnit {
                code: fields[0].to_string(),
                name: name.to_string(),
                ascii_name: ascii_name.to_string(),
                id,
                alternate_names,
            },
        );
    }
    info!(units = lookup.len(), path = %path.display(), "admin units loaded");
    Ok(lookup)
}
