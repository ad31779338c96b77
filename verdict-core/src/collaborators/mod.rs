//! External collaborators consulted by the verification firewalls.
//!
//! Each collaborator is a trait with one default implementation. Callers
//! never let a collaborator error escape: every call site wraps it in a
//! [`crate::degrade`] helper.

pub mod audit;
pub mod correct;
pub mod cross_validate;
pub mod search;
pub mod triangulate;
pub mod tuning;

pub use audit::ModelAuditor;
pub use correct::ModelCorrector;
pub use cross_validate::ModelCrossValidator;
pub use search::{HttpSearchProvider, NoopSearchProvider, SearchConfig};
pub use triangulate::EvidenceTriangulator;
pub use tuning::StaticPromptTuning;

use crate::error::CollaboratorError;
use crate::types::Grade;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Cross-validation
// ---------------------------------------------------------------------------

/// Consensus of two independent model chains on one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossValidation {
    pub final_conclusion: String,
    pub consistent: bool,
    pub confidence: Grade,
}

#[async_trait]
pub trait CrossValidator: Send + Sync {
    async fn cross_validate(
        &self,
        role_id: &str,
        user_message: &str,
        system_prompt: &str,
        primary_models: &[String],
        secondary_models: &[String],
    ) -> Result<CrossValidation, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// Grounding results: a merged list plus the raw per-provider lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub combined: Vec<SearchHit>,
    pub by_provider: BTreeMap<String, Vec<SearchHit>>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<SearchResults, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Triangulation
// ---------------------------------------------------------------------------

/// Verdict on one claim against the collected evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangulation {
    pub verified: bool,
    pub confidence: Grade,
    pub sources: Vec<String>,
}

#[async_trait]
pub trait Triangulator: Send + Sync {
    async fn triangulate(
        &self,
        claims: &[String],
        evidence: &SearchResults,
    ) -> Result<Vec<Triangulation>, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Real-time correction
// ---------------------------------------------------------------------------

/// What the corrector knows about the content it reviews.
#[derive(Debug, Clone)]
pub struct CorrectionContext {
    pub role_id: String,
    pub user_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub corrections: Vec<String>,
    pub corrected_content: String,
}

#[async_trait]
pub trait Corrector: Send + Sync {
    async fn correct(
        &self,
        content: &str,
        context: &CorrectionContext,
    ) -> Result<Correction, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDimension {
    pub name: String,
    pub score: u8,
    pub finding: String,
}

/// Holistic review of the aggregated analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub overall_score: u8,
    pub overall_grade: Grade,
    pub summary: String,
    pub dimensions: Vec<AuditDimension>,
}

#[async_trait]
pub trait Auditor: Send + Sync {
    async fn audit(
        &self,
        aggregated_content: &str,
        original_input: &str,
    ) -> Result<AuditReport, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Prompt tuning
// ---------------------------------------------------------------------------

/// Per-role prompt adjustments appended to the effective system prompt.
pub trait PromptTuning: Send + Sync {
    fn adjustment(&self, role_id: &str) -> Result<Option<String>, CollaboratorError>;
}
