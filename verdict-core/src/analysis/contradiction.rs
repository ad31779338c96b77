//! Stance contradictions between role sections.

use super::{AnalysisInput, PostAnalysis, sections};
use crate::error::CollaboratorError;
use serde::{Deserialize, Serialize};

/// Checked before the positive markers, which they contain.
const NEGATIVE_MARKERS: [&str; 7] = [
    "不可行",
    "不建议",
    "不值得",
    "不推荐",
    "不看好",
    "难以盈利",
    "亏损",
];
const POSITIVE_MARKERS: [&str; 6] = ["可行", "建议", "值得", "推荐", "看好", "盈利"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
    Mixed,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stance {
    pub section: String,
    pub polarity: Polarity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contradiction {
    pub positive: String,
    pub negative: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContradictionReport {
    pub stances: Vec<Stance>,
    pub contradictions: Vec<Contradiction>,
    pub consistent: bool,
}

pub fn polarity(text: &str) -> Polarity {
    let negative = NEGATIVE_MARKERS.iter().any(|m| text.contains(m));
    let stripped = NEGATIVE_MARKERS
        .iter()
        .fold(text.to_string(), |acc, m| acc.replace(m, ""));
    let positive = POSITIVE_MARKERS.iter().any(|m| stripped.contains(m));
    match (positive, negative) {
        (true, true) => Polarity::Mixed,
        (true, false) => Polarity::Positive,
        (false, true) => Polarity::Negative,
        (false, false) => Polarity::Neutral,
    }
}

pub struct ContradictionAnalysis;

impl PostAnalysis for ContradictionAnalysis {
    type Output = ContradictionReport;
    const NAME: &'static str = "contradiction detection";

    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<ContradictionReport, CollaboratorError> {
        let parts = sections(input.aggregated);
        if parts.is_empty() {
            return Err(CollaboratorError::Unavailable {
                what: "aggregated content".to_string(),
            });
        }

        let stances: Vec<Stance> = parts
            .iter()
            .map(|(section, body)| Stance {
                section: section.clone(),
                polarity: polarity(body),
            })
            .collect();

        let mut contradictions = Vec::new();
        for pos in stances.iter().filter(|s| s.polarity == Polarity::Positive) {
            for neg in stances.iter().filter(|s| s.polarity == Polarity::Negative) {
                contradictions.push(Contradiction {
                    positive: pos.section.clone(),
                    negative: neg.section.clone(),
                });
            }
        }

        Ok(ContradictionReport {
            consistent: contradictions.is_empty(),
            stances,
            contradictions,
        })
    }
}
