//! Risk visualisation over five categories.

use super::{AnalysisInput, PostAnalysis};
use crate::error::CollaboratorError;
use serde::{Deserialize, Serialize};

const BAR_WIDTH: usize = 10;

const CATEGORIES: [(&str, &[&str]); 5] = [
    ("市场", &["市场", "需求", "竞争", "价格"]),
    ("政策", &["政策", "补贴", "监管", "审批"]),
    ("资金", &["资金", "现金流", "融资", "成本", "负债"]),
    ("技术", &["技术", "设备", "故障", "迭代"]),
    ("运营", &["运营", "人员", "管理", "供应链", "渠道"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn from_mentions(mentions: usize) -> Self {
        match mentions {
            0..=2 => RiskLevel::Low,
            3..=5 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCategory {
    pub name: String,
    pub mentions: usize,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskReport {
    pub categories: Vec<RiskCategory>,
    /// One ASCII bar per category, e.g. `资金 |######....| 6`.
    pub chart: String,
}

pub struct RiskAnalysis;

impl PostAnalysis for RiskAnalysis {
    type Output = RiskReport;
    const NAME: &'static str = "risk visualization";

    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<RiskReport, CollaboratorError> {
        let text = input.aggregated;
        if text.trim().is_empty() {
            return Err(CollaboratorError::Unavailable {
                what: "aggregated content".to_string(),
            });
        }

        let categories: Vec<RiskCategory> = CATEGORIES
            .iter()
            .map(|(name, keywords)| {
                let mentions = keywords.iter().map(|k| text.matches(k).count()).sum();
                RiskCategory {
                    name: name.to_string(),
                    mentions,
                    level: RiskLevel::from_mentions(mentions),
                }
            })
            .collect();

        let chart = categories
            .iter()
            .map(|c| {
                let filled = c.mentions.min(BAR_WIDTH);
                format!(
                    "{} |{}{}| {}",
                    c.name,
                    "#".repeat(filled),
                    ".".repeat(BAR_WIDTH - filled),
                    c.mentions
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(RiskReport { categories, chart })
    }
}
