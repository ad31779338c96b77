//! Constraint satisfaction against stated capital and ROI limits.
//!
//! The capital ceiling comes from `[profile].capital_limit_wan`, or else the
//! first `N万` amount in the user's own words. Required capital is the largest
//! amount the analysis mentions on an investment line.

use super::{AnalysisInput, PostAnalysis};
use crate::error::CollaboratorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static AMOUNT_WAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*万").expect("valid regex"));

static ROI_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:ROI|投资回报率|回报率|收益率)[^0-9\n]{0,12}(\d+(?:\.\d+)?)\s*%")
        .expect("valid regex")
});

const INVESTMENT_WORDS: [&str; 5] = ["投资", "投入", "启动", "总成本", "资金需求"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintReport {
    pub capital_limit_wan: Option<f64>,
    pub required_capital_wan: Option<f64>,
    pub capital_ok: Option<bool>,
    pub min_roi_percent: Option<f64>,
    pub estimated_roi_percent: Option<f64>,
    pub roi_ok: Option<bool>,
    /// Share of evaluable constraints that hold, 0-100. `None` when neither
    /// constraint could be checked against the analysis.
    pub score: Option<u8>,
}

fn first_amount(text: &str) -> Option<f64> {
    AMOUNT_WAN
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn required_capital(text: &str) -> Option<f64> {
    text.lines()
        .filter(|line| INVESTMENT_WORDS.iter().any(|w| line.contains(w)))
        .flat_map(|line| AMOUNT_WAN.captures_iter(line))
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<f64>().ok()))
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))))
}

fn estimated_roi(text: &str) -> Option<f64> {
    ROI_PERCENT
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub struct ConstraintAnalysis;

impl PostAnalysis for ConstraintAnalysis {
    type Output = ConstraintReport;
    const NAME: &'static str = "constraint satisfaction";

    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<ConstraintReport, CollaboratorError> {
        let capital_limit = input
            .profile
            .capital_limit_wan
            .or_else(|| first_amount(input.raw_input));
        let min_roi = input.profile.min_roi_percent;
        if capital_limit.is_none() && min_roi.is_none() {
            return Err(CollaboratorError::Unavailable {
                what: "capital or ROI limits".to_string(),
            });
        }

        let required = required_capital(input.aggregated);
        let roi = estimated_roi(input.aggregated);
        let capital_ok = capital_limit.zip(required).map(|(limit, need)| need <= limit);
        let roi_ok = min_roi.zip(roi).map(|(min, est)| est >= min);

        let checks: Vec<bool> = [capital_ok, roi_ok].into_iter().flatten().collect();
        let score = (!checks.is_empty()).then(|| {
            let held = checks.iter().filter(|ok| **ok).count();
            (held * 100 / checks.len()) as u8
        });

        Ok(ConstraintReport {
            capital_limit_wan: capital_limit,
            required_capital_wan: required,
            capital_ok,
            min_roi_percent: min_roi,
            estimated_roi_percent: roi,
            roi_ok,
            score,
        })
    }
}
