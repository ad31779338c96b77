//! Fundamental types shared across the Verdict pipeline.

use crate::analysis::PostAnalyses;
use crate::dispatch::Contribution;
use crate::firewall::VerificationResult;
use crate::intent::Intent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Number of characters kept in a completed role's status preview.
pub const STATUS_PREVIEW_CHARS: usize = 100;

/// The analysis strategy chosen for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Derive feasible options from the user's fixed resources.
    Forward,
    /// Assess the feasibility of a stated project.
    #[default]
    Reverse,
    /// Run both and synthesize.
    Mixed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Forward => write!(f, "forward"),
            Mode::Reverse => write!(f, "reverse"),
            Mode::Mixed => write!(f, "mixed"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" | "正向" => Ok(Mode::Forward),
            "reverse" | "逆向" | "反向" => Ok(Mode::Reverse),
            "mixed" | "混合" => Ok(Mode::Mixed),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Named preset trading completeness for latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Quick => write!(f, "quick"),
            Depth::Standard => write!(f, "standard"),
            Depth::Deep => write!(f, "deep"),
        }
    }
}

impl FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(Depth::Quick),
            "standard" => Ok(Depth::Standard),
            "deep" => Ok(Depth::Deep),
            other => Err(format!("unknown depth '{other}'")),
        }
    }
}

/// Writing style applied to every role's system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    #[default]
    Professional,
    Plain,
    Investor,
}

impl Style {
    /// The directive appended to a role's system prompt.
    pub fn directive(&self) -> &'static str {
        match self {
            Style::Professional => {
                "【表达风格】使用专业、严谨的商业分析语言，结论先行，给出可量化的依据。"
            }
            Style::Plain => {
                "【表达风格】用通俗易懂的大白话解释，避免堆砌术语，多举身边的例子。"
            }
            Style::Investor => {
                "【表达风格】以投资人视角表达，聚焦回报、风险敞口与退出路径，语言简洁。"
            }
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Style::Professional => write!(f, "professional"),
            Style::Plain => write!(f, "plain"),
            Style::Investor => write!(f, "investor"),
        }
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "professional" => Ok(Style::Professional),
            "plain" => Ok(Style::Plain),
            "investor" => Ok(Style::Investor),
            other => Err(format!("unknown style '{other}'")),
        }
    }
}

/// Confidence grade used by triangulation, cross-validation, and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    #[default]
    C,
}

impl Grade {
    /// Parse a grade from free text, looking at the first letter only.
    pub fn parse_lenient(text: &str) -> Option<Grade> {
        match text.trim().chars().next()?.to_ascii_uppercase() {
            'A' => Some(Grade::A),
            'B' => Some(Grade::B),
            'C' | 'D' | 'E' | 'F' => Some(Grade::C),
            _ => None,
        }
    }

    /// Map a 0-100 score onto a grade.
    pub fn from_score(score: u8) -> Grade {
        match score {
            80..=u8::MAX => Grade::A,
            60..=79 => Grade::B,
            _ => Grade::C,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::A => write!(f, "A"),
            Grade::B => write!(f, "B"),
            Grade::C => write!(f, "C"),
        }
    }
}

/// Lifecycle state of one role within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Status of one role: its state plus a preview or error message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleStatus {
    pub state: RoleState,
    #[serde(default)]
    pub content: String,
}

impl RoleStatus {
    pub fn running() -> Self {
        Self {
            state: RoleState::Running,
            content: String::new(),
        }
    }

    /// A completed status holding the first `STATUS_PREVIEW_CHARS` characters.
    pub fn completed(content: &str) -> Self {
        Self {
            state: RoleState::Completed,
            content: content.chars().take(STATUS_PREVIEW_CHARS).collect(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: RoleState::Failed,
            content: message.into(),
        }
    }

    pub fn skipped() -> Self {
        Self {
            state: RoleState::Skipped,
            content: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Incoming analysis request.
///
/// `user_input` is optional at the serde level so that a missing field can be
/// answered with a structured error instead of a framework rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub depth: Option<Depth>,
    #[serde(default)]
    pub style: Option<Style>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_true")]
    pub explain_terms: bool,
}

impl AnalysisRequest {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: Some(user_input.into()),
            depth: None,
            style: None,
            use_cache: true,
            explain_terms: true,
        }
    }

    /// The trimmed user input, or `None` when it is missing or blank.
    pub fn input(&self) -> Option<&str> {
        self.user_input
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// The full structured result carried by `complete` and `cached` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub session_id: Uuid,
    pub mode: Mode,
    pub intent: Intent,
    pub report: String,
    pub aggregated_content: String,
    pub contributions: Vec<Contribution>,
    pub role_statuses: BTreeMap<String, RoleStatus>,
    pub verification: Vec<VerificationResult>,
    pub analyses: PostAnalyses,
    pub depth: Depth,
    pub style: Style,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Whether at least one role contributed content.
    pub fn has_content(&self) -> bool {
        !self.aggregated_content.trim().is_empty()
    }
}
