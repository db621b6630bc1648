//! Attribute-filter matching for incoming queries.
//!
//! A query is an ordered sequence of filter elements; its semantics are the
//! logical AND of all filters. The matcher compiles the criteria once per
//! query and evaluates them record by record, short-circuiting on the first
//! miss. Every accepted match carries exactly one element per filter:
//! the record's own attribute where present, or a synthesized empty
//! placeholder for a universal filter the record cannot answer.

use std::path::PathBuf;

use dicom_core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom_core::header::{DataElement, Header};
use dicom_core::value::PrimitiveValue;
use dicom_core::{Tag, VR};
use dicom_dictionary_std::{tags, StandardDataDictionary};
use dicom_object::mem::InMemElement;
use dicom_object::DefaultDicomObject;
use regex::Regex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog::{Catalog, Record};

/// Errors raised by the matcher itself, as opposed to a record simply not
/// matching. These abort the current query; the catalog stays intact.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid filter for tag {tag}: {message}")]
    InvalidFilter { tag: Tag, message: String },

    #[error("cannot read value of tag {tag}: {message}")]
    Value { tag: Tag, message: String },

    #[error("match for '{}' produced no elements", .path.display())]
    EmptyMatch { path: PathBuf },
}

/// One record accepted by a query: its path and the matched elements,
/// parallel in length and order to the query's filter sequence
#[derive(Debug)]
pub struct MatchResult {
    pub path: PathBuf,
    pub elements: Vec<InMemElement>,
}

/// How a single filter's value is interpreted
enum Criterion {
    /// Key is not a matching key (QueryRetrieveLevel); echoed back verbatim
    PassThrough,
    /// Empty value: return the attribute, whatever its value
    Universal,
    /// Literal value equality
    Exact(String),
    /// Backslash-separated alternatives, any-of equality
    List(Vec<String>),
    /// `*`/`?` pattern, compiled to an anchored regex
    Wildcard(Regex),
    /// Inclusive `lo-hi` range over date/time values; either bound optional
    Range {
        lo: Option<String>,
        hi: Option<String>,
    },
}

impl Criterion {
    fn accepts(&self, value: &str) -> bool {
        match self {
            Criterion::PassThrough | Criterion::Universal => true,
            Criterion::Exact(term) => value == term,
            Criterion::List(terms) => terms.iter().any(|t| t == value),
            Criterion::Wildcard(pattern) => pattern.is_match(value),
            Criterion::Range { lo, hi } => {
                lo.as_deref().map_or(true, |lo| value >= lo)
                    && hi.as_deref().map_or(true, |hi| value <= hi)
            }
        }
    }
}

/// Outcome of applying one filter to one record
enum FilterOutcome {
    /// The filter failed; the record is out
    Miss,
    /// The filter matched; `None` means it matched without a concrete
    /// element (universal filter, attribute absent)
    Hit(Option<InMemElement>),
}

/// One filter with its criterion compiled
struct CompiledFilter {
    element: InMemElement,
    term: String,
    criterion: Criterion,
}

impl CompiledFilter {
    fn compile(element: &InMemElement) -> Result<Self, MatchError> {
        let tag = element.tag();
        let raw = element.to_str().map_err(|e| MatchError::InvalidFilter {
            tag,
            message: e.to_string(),
        })?;
        let term = clean(&raw).to_string();

        let criterion = if tag == tags::QUERY_RETRIEVE_LEVEL {
            Criterion::PassThrough
        } else if term.is_empty() {
            Criterion::Universal
        } else if term.contains('\\') {
            Criterion::List(term.split('\\').map(|t| clean(t).to_string()).collect())
        } else if ranged_vr(element.vr()) && term.contains('-') {
            parse_range(tag, &term)?
        } else if term.contains('*') || term.contains('?') {
            Criterion::Wildcard(wildcard_pattern(tag, &term)?)
        } else {
            Criterion::Exact(term.clone())
        };

        Ok(Self {
            element: element.clone(),
            term,
            criterion,
        })
    }

    fn tag(&self) -> Tag {
        self.element.tag()
    }

    /// Empty element standing in for an attribute the record lacks
    fn placeholder(&self) -> InMemElement {
        DataElement::new(self.element.tag(), self.element.vr(), PrimitiveValue::Empty)
    }

    fn apply(&self, object: &DefaultDicomObject) -> Result<FilterOutcome, MatchError> {
        if let Criterion::PassThrough = self.criterion {
            return Ok(FilterOutcome::Hit(Some(self.element.clone())));
        }

        let element = match object.element(self.tag()) {
            Ok(element) => element,
            Err(_) => {
                // Absent attributes satisfy only a universal filter
                return Ok(match self.criterion {
                    Criterion::Universal => FilterOutcome::Hit(None),
                    _ => FilterOutcome::Miss,
                });
            }
        };

        if let Criterion::Universal = self.criterion {
            return Ok(FilterOutcome::Hit(Some(element.clone())));
        }

        let text = element.to_str().map_err(|e| MatchError::Value {
            tag: self.tag(),
            message: e.to_string(),
        })?;
        // Multi-valued attributes match when any single value does
        let hit = text.split('\\').any(|value| self.criterion.accepts(clean(value)));
        Ok(if hit {
            FilterOutcome::Hit(Some(element.clone()))
        } else {
            FilterOutcome::Miss
        })
    }
}

/// Per-query matcher: compiled filters plus the first-miss log state
pub struct Matcher {
    filters: Vec<CompiledFilter>,
    miss_logged: bool,
}

impl Matcher {
    /// Compile a query's filters. A malformed filter fails the whole query
    /// here, before any record is touched.
    pub fn new(filters: &[InMemElement]) -> Result<Self, MatchError> {
        let filters = filters
            .iter()
            .map(CompiledFilter::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            filters,
            miss_logged: false,
        })
    }

    /// Evaluate one record against the query.
    ///
    /// Returns `Ok(None)` when the record does not match, and the matched
    /// element sequence (one element per filter) when it does.
    pub fn matches(&mut self, record: &Record) -> Result<Option<Vec<InMemElement>>, MatchError> {
        let mut elements = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            match filter.apply(record.object())? {
                FilterOutcome::Miss => {
                    // The first unmatched term of a query is worth recording:
                    // it is what the remote peer was looking for.
                    if !self.miss_logged {
                        self.miss_logged = true;
                        debug!(
                            tag = %tag_name(filter.tag()),
                            term = %filter.term,
                            "unmatched query term"
                        );
                    }
                    return Ok(None);
                }
                FilterOutcome::Hit(Some(element)) => elements.push(element),
                FilterOutcome::Hit(None) => elements.push(filter.placeholder()),
            }
        }

        if elements.is_empty() {
            // Accepting a record with nothing to return breaks the
            // one-element-per-filter contract (an empty query does this)
            return Err(MatchError::EmptyMatch {
                path: record.path().to_path_buf(),
            });
        }
        Ok(Some(elements))
    }
}

/// Run one query's match pass over the whole catalog, in iteration order
pub fn find_matches(
    catalog: &Catalog,
    filters: &[InMemElement],
    cancel: &CancellationToken,
) -> Result<Vec<MatchResult>, MatchError> {
    let mut matcher = Matcher::new(filters)?;
    let mut matches = Vec::new();
    for record in catalog.records() {
        if cancel.is_cancelled() {
            debug!("match pass cancelled");
            break;
        }
        if let Some(elements) = matcher.matches(record)? {
            matches.push(MatchResult {
                path: record.path().to_path_buf(),
                elements,
            });
        }
    }
    Ok(matches)
}

/// Strip trailing padding from an attribute or filter value
fn clean(value: &str) -> &str {
    value.trim_end_matches(|c| c == ' ' || c == '\0')
}

/// VRs whose values support range matching
fn ranged_vr(vr: VR) -> bool {
    matches!(vr, VR::DA | VR::TM | VR::DT)
}

fn parse_range(tag: Tag, term: &str) -> Result<Criterion, MatchError> {
    let (lo, hi) = match term.split_once('-') {
        Some(bounds) => bounds,
        None => {
            return Err(MatchError::InvalidFilter {
                tag,
                message: format!("'{}' is not a range", term),
            })
        }
    };
    if lo.is_empty() && hi.is_empty() {
        return Err(MatchError::InvalidFilter {
            tag,
            message: "range has no bounds".to_string(),
        });
    }
    Ok(Criterion::Range {
        lo: (!lo.is_empty()).then(|| lo.to_string()),
        hi: (!hi.is_empty()).then(|| hi.to_string()),
    })
}

fn wildcard_pattern(tag: Tag, term: &str) -> Result<Regex, MatchError> {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('^');
    for c in term.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| MatchError::InvalidFilter {
        tag,
        message: e.to_string(),
    })
}

/// Dictionary name for a tag, falling back to its numeric form
fn tag_name(tag: Tag) -> String {
    StandardDataDictionary
        .by_tag(tag)
        .map(|entry| entry.alias().to_string())
        .unwrap_or_else(|| tag.to_string())
}
