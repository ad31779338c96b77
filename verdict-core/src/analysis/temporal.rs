//! Temporal validity: are the cited years recent enough?

use super::{AnalysisInput, PostAnalysis};
use crate::error::CollaboratorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Years older than `current_year - STALE_AFTER_YEARS` are stale.
pub const STALE_AFTER_YEARS: i32 = 3;

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalReport {
    pub years_cited: Vec<i32>,
    pub stale_years: Vec<i32>,
    pub latest: Option<i32>,
    pub fresh: bool,
}

/// Four-digit years between 1990 and 2100 mentioned in `text`.
pub fn cited_years(text: &str) -> BTreeSet<i32> {
    DIGITS
        .find_iter(text)
        .filter(|m| m.as_str().len() == 4)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .filter(|y| (1990..=2100).contains(y))
        .collect()
}

pub struct TemporalAnalysis;

impl PostAnalysis for TemporalAnalysis {
    type Output = TemporalReport;
    const NAME: &'static str = "temporal validity";

    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<TemporalReport, CollaboratorError> {
        if input.aggregated.trim().is_empty() {
            return Err(CollaboratorError::Unavailable {
                what: "aggregated content".to_string(),
            });
        }
        let years = cited_years(input.aggregated);
        let cutoff = input.current_year - STALE_AFTER_YEARS;
        let stale_years: Vec<i32> = years.iter().copied().filter(|y| *y < cutoff).collect();
        Ok(TemporalReport {
            latest: years.iter().next_back().copied(),
            fresh: stale_years.is_empty(),
            stale_years,
            years_cited: years.into_iter().collect(),
        })
    }
}
