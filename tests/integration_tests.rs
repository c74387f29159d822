//! Integration tests for the gazetteer crate.
//!
//! These run the full pipeline against a miniature set of GeoNames
//! reference tables: lookup building, enrichment, document building, batch
//! indexing into a real on-disk index, and the location-resolution cascade
//! over it.

use std::fs;
use std::path::Path;

use gazetteer::{
    GazetteerSearcher, IndexerConfig, RowFilter, SearchMode, build_index, load_override_map,
};
use tempfile::TempDir;

fn setup_test_env() {
    let _ = gazetteer::init_logging(tracing::Level::WARN);
}

/// Miniature GeoNames resources: the United States with Illinois, Cook
/// County and a few populated places.
fn write_reference_tables(dir: &Path) {
    fs::write(
        dir.join("alternateNamesV2.txt"),
        concat!(
            "1\t4887398\ten\tWindy City\t\t\t\t\n",
            "2\t4887398\tfr\tVille des Vents\t\t\t\t\n",
            "3\t6252001\ten\tUSA\t\t\t\t\n",
        ),
    )
    .expect("Should write alternate names");

    fs::write(
        dir.join("countryInfo.txt"),
        concat!(
            "#ISO\tISO3\tISO-Numeric\tfips\tCountry\tCapital\tArea\tPopulation\tContinent\n",
            "US\tUSA\t840\tUS\tUnited States\tWashington\t9629091.0\t310232863\tNA\t.us\tUSD\tDollar\t1\t\t\ten-US\t6252001\tCA,MX\t\n",
        ),
    )
    .expect("Should write country info");

    fs::write(
        dir.join("admin1CodesASCII.txt"),
        "US.IL\tIllinois\tIllinois\t4896861\n",
    )
    .expect("Should write admin1 codes");

    fs::write(
        dir.join("admin2Codes.txt"),
        "US.IL.031\tCook County\tCook County\t4888671\n",
    )
    .expect("Should write admin2 codes");

    fs::write(
        dir.join("allCountries.txt"),
        concat!(
            "6252001\tUnited States\tUnited States\t\t39.76\t-98.5\tA\tPCLI\tUS\t\t\t\t\t\t310232863\t\t500\tAmerica/Chicago\t2024-01-01\n",
            "4896861\tIllinois\tIllinois\t\t40.00032\t-89.25037\tA\tADM1\tUS\t\tIL\t\t\t\t12830632\t\t180\tAmerica/Chicago\t2024-01-01\n",
            // The county's own row leaves its admin2 column empty, so it
            // carries no county self-link.
            "4888671\tCook County\tCook County\t\t41.89447\t-87.64612\tA\tADM2\tUS\t\tIL\t\t\t\t5194675\t\t180\tAmerica/Chicago\t2024-01-01\n",
            "4887398\tChicago\tChicago\t\t41.85003\t-87.65005\tP\tPPL\tUS\t\tIL\t031\t\t\t2695598\t\t180\tAmerica/Chicago\t2024-01-01\n",
            "4887463\tChicago Ridge\tChicago Ridge\t\t41.70142\t-87.77922\tP\tPPL\tUS\t\tIL\t031\t\t\t14305\t\t189\tAmerica/Chicago\t2024-01-01\n",
            "4904381\tSkokie\tSkokie\t\t42.03336\t-87.73339\tP\tPPL\tUS\t\tIL\t031\t\t\t64784\t\t190\tAmerica/Chicago\t2024-01-01\n",
            "9999991\tChicago Heliport\tChicago Heliport\t\t41.85\t-87.6\tS\tAIRH\tUS\t\tIL\t031\t\t\t0\t\t180\tAmerica/Chicago\t2024-01-01\n",
        ),
    )
    .expect("Should write gazetteer dump");
}

fn build_test_index() -> (TempDir, TempDir) {
    let resources = TempDir::new().expect("Should create resources dir");
    let index_dir = TempDir::new().expect("Should create index dir");
    write_reference_tables(resources.path());

    let config = IndexerConfig::new(resources.path(), index_dir.path().join("index"))
        .with_filter(RowFilter::from_lists("S", "", "", ""));
    let stats = build_index(&config).expect("Index build should succeed");
    assert_eq!(stats.indexed, 6, "Should index everything but the heliport");
    assert_eq!(stats.filtered, 1, "Should filter the spot-class row");
    assert_eq!(stats.skipped, 0, "Fixture rows should all be well-formed");

    (resources, index_dir)
}

#[test]
fn test_build_then_resolve_county() {
    setup_test_env();
    let (_resources, index_dir) = build_test_index();

    let searcher =
        GazetteerSearcher::open(index_dir.path().join("index")).expect("Should open index");

    let results = searcher
        .search_location("Cook County, Illinois, USA", 10, SearchMode::Default)
        .expect("Resolution should work");
    assert_eq!(results.retrieved, 1, "Should resolve to the county itself");

    let record = &results.records[0];
    assert_eq!(record["GeonameId"], "4888671");
    assert_eq!(record["Code"], "ADM2");
    assert_eq!(
        record["AncestorsIds"], "4896861, 6252001, 6255149",
        "Ancestors should run state, country, continent"
    );
    let ancestors = &record["AncestorsNames"];
    let state = ancestors.find("Illinois").expect("state in ancestors");
    let country = ancestors.find("United States").expect("country in ancestors");
    let continent = ancestors.find("North America").expect("continent in ancestors");
    assert!(
        state < country && country < continent,
        "Ancestor names should run outward: {ancestors}"
    );
    assert_eq!(record["Country"], "United States");
    assert_eq!(record["Continent"], "North America");
}

#[test]
fn test_resolution_ranks_by_population() {
    setup_test_env();
    let (_resources, index_dir) = build_test_index();
    let searcher =
        GazetteerSearcher::open(index_dir.path().join("index")).expect("Should open index");

    // Both Chicago and Chicago Ridge match the name phrase; the bigger
    // city comes first.
    let results = searcher
        .search_location("Chicago, Illinois, USA", 10, SearchMode::Default)
        .expect("Resolution should work");
    assert_eq!(results.retrieved, 2, "Both Chicagos should match");
    assert_eq!(results.available, 2);
    assert_eq!(results.records[0]["Name"], "Chicago (Windy City)");
    assert_eq!(results.records[0]["Population"], "2695598");
    assert_eq!(results.records[1]["Name"], "Chicago Ridge");
}

#[test]
fn test_alternate_names_survive_the_pipeline() {
    setup_test_env();
    let (_resources, index_dir) = build_test_index();
    let searcher =
        GazetteerSearcher::open(index_dir.path().join("index")).expect("Should open index");

    // "Windy City" was retained (en), "Ville des Vents" was not (fr).
    let results = searcher
        .search_location("Windy City", 10, SearchMode::Default)
        .expect("Resolution should work");
    assert_eq!(results.retrieved, 1);
    assert_eq!(results.records[0]["GeonameId"], "4887398");
    assert!(!results.records[0]["Name"].contains("Ville des Vents"));
}

#[test]
fn test_country_entry_absorbs_country_alternates() {
    setup_test_env();
    let (_resources, index_dir) = build_test_index();
    let searcher =
        GazetteerSearcher::open(index_dir.path().join("index")).expect("Should open index");

    let results = searcher
        .search_location("USA", 10, SearchMode::Default)
        .expect("Resolution should work");
    assert_eq!(results.retrieved, 1, "ISO3 should resolve the country");
    let record = &results.records[0];
    assert_eq!(record["GeonameId"], "6252001");
    assert_eq!(
        record["AncestorsIds"], "6255149",
        "A country's only ancestor is its continent"
    );
}

#[test]
fn test_free_form_search_over_built_index() {
    setup_test_env();
    let (_resources, index_dir) = build_test_index();
    let searcher =
        GazetteerSearcher::open(index_dir.path().join("index")).expect("Should open index");

    let results = searcher
        .search("Class:P", 10, true)
        .expect("Free-form search should work");
    assert_eq!(results.available, 3, "Three populated places were indexed");
    assert_eq!(results.retrieved, 3);

    let results = searcher
        .search("Class:P", 2, false)
        .expect("Free-form search should work");
    assert_eq!(results.retrieved, 2);
    assert_eq!(results.available, gazetteer::AVAILABLE_UNKNOWN);
}

#[test]
fn test_override_map_end_to_end() {
    setup_test_env();
    let (resources, index_dir) = build_test_index();

    let override_path = resources.path().join("overrides.txt");
    fs::write(&override_path, "Chi-Town\t4887398\n").expect("Should write override file");
    let overrides = load_override_map(&override_path).expect("Should load override map");

    let searcher = GazetteerSearcher::open(index_dir.path().join("index"))
        .expect("Should open index")
        .with_override_map(overrides);

    let results = searcher
        .search_location("Chi-Town", 10, SearchMode::Default)
        .expect("Resolution should work");
    assert_eq!(results.retrieved, 1);
    assert_eq!(results.records[0]["GeonameId"], "4887398");
}
