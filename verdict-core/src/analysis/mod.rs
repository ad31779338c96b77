//! Post-aggregation analyses.
//!
//! Each analysis reads the aggregated text (plus evidence and the resource
//! profile) and either produces a report or fails; a failure becomes `None`
//! for that analysis only.

pub mod constraints;
pub mod contradiction;
pub mod risk;
pub mod sources;
pub mod temporal;

pub use constraints::{ConstraintAnalysis, ConstraintReport};
pub use contradiction::{ContradictionAnalysis, ContradictionReport};
pub use risk::{RiskAnalysis, RiskReport};
pub use sources::{SourceAnalysis, SourceReport};
pub use temporal::{TemporalAnalysis, TemporalReport};

use crate::collaborators::SearchResults;
use crate::config::ResourceProfile;
use crate::degrade::degrade_opt;
use crate::error::CollaboratorError;
use serde::{Deserialize, Serialize};

/// Everything an analysis may look at.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub raw_input: &'a str,
    pub aggregated: &'a str,
    pub evidence: &'a SearchResults,
    pub profile: &'a ResourceProfile,
    pub current_year: i32,
}

pub trait PostAnalysis {
    type Output;

    /// Stage name used when the analysis degrades.
    const NAME: &'static str;

    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Self::Output, CollaboratorError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAnalyses {
    pub contradictions: Option<ContradictionReport>,
    pub temporal: Option<TemporalReport>,
    pub sources: Option<SourceReport>,
    pub risk: Option<RiskReport>,
    pub constraints: Option<ConstraintReport>,
}

fn run<A: PostAnalysis>(analysis: A, input: &AnalysisInput<'_>) -> Option<A::Output> {
    degrade_opt(A::NAME, analysis.analyze(input))
}

/// Run every analysis; each one fails independently.
pub fn run_all(input: &AnalysisInput<'_>) -> PostAnalyses {
    PostAnalyses {
        contradictions: run(ContradictionAnalysis, input),
        temporal: run(TemporalAnalysis, input),
        sources: run(SourceAnalysis, input),
        risk: run(RiskAnalysis, input),
        constraints: run(ConstraintAnalysis, input),
    }
}

/// Split aggregated text into `(heading, body)` sections on `## ` headings.
///
/// Text without headings is one section named `analysis`.
pub(crate) fn sections(aggregated: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for line in aggregated.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            out.push((heading.trim().to_string(), String::new()));
        } else {
            if out.is_empty() {
                out.push(("analysis".to_string(), String::new()));
            }
            if let Some((_, body)) = out.last_mut() {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    out.retain(|(_, body)| !body.trim().is_empty());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_split_on_headings() {
        let text = "## 市场分析师\n\n市场可行\n\n## 风险评估师\n\n风险较高";
        let parts = sections(text);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, "市场分析师");
        assert!(parts[1].1.contains("风险较高"));
    }

    #[test]
    fn test_sections_without_headings() {
        let parts = sections("整体可行");
        assert_eq!(parts, vec![("analysis".to_string(), "整体可行\n".to_string())]);
    }

    #[test]
    fn test_run_all_isolates_failures() {
        let evidence = SearchResults::default();
        let profile = ResourceProfile::default();
        let input = AnalysisInput {
            raw_input: "想开店",
            aggregated: "",
            evidence: &evidence,
            profile: &profile,
            current_year: 2026,
        };
        let analyses = run_all(&input);
        // Nothing to analyse and no limits to check.
        assert!(analyses.risk.is_none());
        assert!(analyses.constraints.is_none());
        assert!(analyses.sources.is_none());
    }
}
