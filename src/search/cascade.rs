//! Query construction for the location-resolution cascade.
//!
//! A location string like `"Cook County, Illinois, USA"` is resolved by
//! trying a sequence of increasingly permissive query candidates and taking
//! the first one that matches anything:
//!
//! 1. exact phrases (first fragment against the name, the rest against the
//!    ancestor chain),
//! 2. the whole string as phrases against the full hierarchy,
//! 3. fuzzy per-token matching as a typo fallback.
//!
//! An override map short-circuits all of that with a direct id lookup.

use ahash::AHashMap;
use tantivy::{
    Term,
    query::{BooleanQuery, EmptyQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, TermQuery},
    schema::{Field, IndexRecordOption},
    tokenizer::TextAnalyzer,
};
use tracing::debug;

use super::SearchMode;
use crate::index::DocFields;

/// Which rung of the cascade a candidate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CandidateKind {
    /// Direct geoname-id lookup from the override map.
    OverrideId,
    /// Exact phrase match on name plus ancestors.
    ExactPhrase,
    /// Phrase match against the full hierarchy string.
    FullHierarchy,
    /// Per-token fuzzy match, the typo fallback.
    FuzzyTokens,
    /// Sentinel for inputs with no usable fragments.
    MatchNothing,
}

pub(crate) struct QueryCandidate {
    pub kind: CandidateKind,
    pub query: Box<dyn Query>,
}

/// Build the cascade for one location string, in execution order.
pub(crate) fn build_candidates(
    location: &str,
    mode: SearchMode,
    override_map: &AHashMap<String, String>,
    fields: &DocFields,
    analyzer: &mut TextAnalyzer,
) -> Vec<QueryCandidate> {
    let location = location.trim();
    if let Some(id) = override_map.get(location) {
        debug!(location, id, "location resolved through the override map");
        let term = Term::from_field_text(fields.geoname_id, id);
        return vec![QueryCandidate {
            kind: CandidateKind::OverrideId,
            query: Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
        }];
    }

    let fragments: Vec<&str> = location
        .split(',')
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect();
    if fragments.is_empty() {
        return vec![QueryCandidate {
            kind: CandidateKind::MatchNothing,
            query: Box::new(EmptyQuery),
        }];
    }

    let mut candidates = vec![exact_phrase(&fragments, fields, analyzer)];
    if mode == SearchMode::Full || fragments.len() > 1 {
        candidates.push(full_hierarchy(&fragments, fields, analyzer));
    }
    candidates.push(fuzzy_tokens(&fragments, fields, analyzer));
    candidates
}

/// First fragment as a phrase on the name, remaining fragments as phrases
/// on the ancestor chain, all required.
fn exact_phrase(
    fragments: &[&str],
    fields: &DocFields,
    analyzer: &mut TextAnalyzer,
) -> QueryCandidate {
    let mut clauses = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        let field = if i == 0 { fields.name } else { fields.ancestors_names };
        if let Some(query) = phrase_or_term(field, fragment, analyzer) {
            clauses.push((Occur::Must, query));
        }
    }
    and_candidate(CandidateKind::ExactPhrase, clauses)
}

/// Every fragment as a phrase against the full hierarchy string.
fn full_hierarchy(
    fragments: &[&str],
    fields: &DocFields,
    analyzer: &mut TextAnalyzer,
) -> QueryCandidate {
    let clauses = fragments
        .iter()
        .filter_map(|fragment| phrase_or_term(fields.full_hierarchy, fragment, analyzer))
        .map(|query| (Occur::Must, query))
        .collect();
    and_candidate(CandidateKind::FullHierarchy, clauses)
}

/// Every token of every fragment as a fuzzy term, all required.
///
/// The last fragment is matched exactly (distance 0); earlier fragments
/// tolerate one edit, with transpositions counted as a single edit.
fn fuzzy_tokens(
    fragments: &[&str],
    fields: &DocFields,
    analyzer: &mut TextAnalyzer,
) -> QueryCandidate {
    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        let field = if i == 0 { fields.name } else { fields.ancestors_names };
        let distance = if i == 0 {
            1
        } else if i + 1 == fragments.len() {
            0
        } else {
            1
        };
        for token in tokens(field, fragment, analyzer) {
            let query = FuzzyTermQuery::new(token.1, distance, true);
            clauses.push((Occur::Must, Box::new(query)));
        }
    }
    and_candidate(CandidateKind::FuzzyTokens, clauses)
}

fn and_candidate(kind: CandidateKind, clauses: Vec<(Occur, Box<dyn Query>)>) -> QueryCandidate {
    let query: Box<dyn Query> = if clauses.is_empty() {
        // Everything tokenized away (e.g. all stop words).
        Box::new(EmptyQuery)
    } else {
        Box::new(BooleanQuery::new(clauses))
    };
    QueryCandidate { kind, query }
}

/// Analyze a fragment into a phrase query, collapsing single-token
/// fragments to a plain term query. `None` when nothing survives analysis.
fn phrase_or_term(
    field: Field,
    fragment: &str,
    analyzer: &mut TextAnalyzer,
) -> Option<Box<dyn Query>> {
    let mut terms = tokens(field, fragment, analyzer);
    match terms.len() {
        0 => None,
        1 => {
            let (_, term) = terms.pop()?;
            Some(Box::new(TermQuery::new(
                term,
                IndexRecordOption::WithFreqsAndPositions,
            )))
        }
        _ => Some(Box::new(PhraseQuery::new_with_offset(terms))),
    }
}

fn tokens(field: Field, fragment: &str, analyzer: &mut TextAnalyzer) -> Vec<(usize, Term)> {
    let mut terms = Vec::new();
    let mut stream = analyzer.token_stream(fragment);
    while stream.advance() {
        let token = stream.token();
        terms.push((token.position, Term::from_field_text(field, &token.text)));
    }
    terms
}
