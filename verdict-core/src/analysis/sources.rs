//! Source independence and credibility scoring.

use super::{AnalysisInput, PostAnalysis};
use crate::error::CollaboratorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)）\]】，。]+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceScore {
    pub host: String,
    pub citations: usize,
    pub credibility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub sources: Vec<SourceScore>,
    pub total_citations: usize,
    pub independent_hosts: usize,
    /// Distinct hosts over total citations; 1.0 means no host is repeated.
    pub independence_ratio: f64,
    pub mean_credibility: f64,
}

/// Credibility of a host: government 0.9, academic 0.8, anything else 0.5.
pub fn credibility(host: &str) -> f64 {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.contains(&"gov") {
        0.9
    } else if labels.contains(&"edu") || labels.contains(&"ac") {
        0.8
    } else {
        0.5
    }
}

fn host_of(raw: &str) -> Option<String> {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
}

pub struct SourceAnalysis;

impl PostAnalysis for SourceAnalysis {
    type Output = SourceReport;
    const NAME: &'static str = "source credibility";

    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<SourceReport, CollaboratorError> {
        let urls = input
            .evidence
            .combined
            .iter()
            .map(|hit| hit.url.as_str())
            .chain(URL_PATTERN.find_iter(input.aggregated).map(|m| m.as_str()));

        let mut by_host: BTreeMap<String, usize> = BTreeMap::new();
        for host in urls.filter_map(host_of) {
            *by_host.entry(host).or_default() += 1;
        }
        if by_host.is_empty() {
            return Err(CollaboratorError::Unavailable {
                what: "cited sources".to_string(),
            });
        }

        let sources: Vec<SourceScore> = by_host
            .into_iter()
            .map(|(host, citations)| SourceScore {
                credibility: credibility(&host),
                host,
                citations,
            })
            .collect();
        let total_citations: usize = sources.iter().map(|s| s.citations).sum();
        let independent_hosts = sources.len();
        let mean_credibility =
            sources.iter().map(|s| s.credibility).sum::<f64>() / independent_hosts as f64;

        Ok(SourceReport {
            independence_ratio: independent_hosts as f64 / total_citations as f64,
            mean_credibility,
            sources,
            total_citations,
            independent_hosts,
        })
    }
}
