//! The five default firewall stages.

use super::{AuditStatus, Firewall, FirewallContext, FirewallId, VerificationPayload, VerificationResult};
use crate::collaborators::{Auditor, SearchProvider, Triangulator};
use crate::error::CollaboratorError;
use crate::types::Grade;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

// ---------------------------------------------------------------------------
// 1. Pre-fill search
// ---------------------------------------------------------------------------

pub struct SearchStage {
    search: Arc<dyn SearchProvider>,
}

impl SearchStage {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Firewall for SearchStage {
    fn id(&self) -> FirewallId {
        FirewallId::Search
    }

    async fn run(&self, ctx: &FirewallContext) -> Result<VerificationResult, CollaboratorError> {
        let results = self.search.search(&ctx.raw_input, ctx.search_limit).await?;
        debug!(hits = results.combined.len(), "Grounding search finished");
        Ok(VerificationResult::new(
            FirewallId::Search,
            !results.combined.is_empty(),
            VerificationPayload::Search {
                result_count: results.combined.len(),
                providers: results.by_provider.keys().cloned().collect(),
                hits: results.combined,
            },
        ))
    }

    fn fallback(&self, _ctx: &FirewallContext) -> VerificationResult {
        VerificationResult::new(
            FirewallId::Search,
            false,
            VerificationPayload::Search {
                result_count: 0,
                hits: Vec::new(),
                providers: Vec::new(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// 2. Triangulation
// ---------------------------------------------------------------------------

pub struct TriangulationStage {
    triangulator: Arc<dyn Triangulator>,
}

impl TriangulationStage {
    pub fn new(triangulator: Arc<dyn Triangulator>) -> Self {
        Self { triangulator }
    }
}

#[async_trait]
impl Firewall for TriangulationStage {
    fn id(&self) -> FirewallId {
        FirewallId::Triangulation
    }

    async fn run(&self, ctx: &FirewallContext) -> Result<VerificationResult, CollaboratorError> {
        let claims = vec![ctx.raw_input.clone()];
        let verdict = self
            .triangulator
            .triangulate(&claims, &ctx.evidence)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CollaboratorError::Malformed {
                what: "triangulation".to_string(),
                message: "no verdict for the claim".to_string(),
            })?;
        Ok(VerificationResult::new(
            FirewallId::Triangulation,
            verdict.verified,
            VerificationPayload::Triangulation {
                verified: verdict.verified,
                confidence: verdict.confidence,
                sources: verdict.sources,
            },
        ))
    }

    fn fallback(&self, _ctx: &FirewallContext) -> VerificationResult {
        VerificationResult::new(
            FirewallId::Triangulation,
            false,
            VerificationPayload::Triangulation {
                verified: false,
                confidence: Grade::C,
                sources: Vec::new(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// 3. Dual-model view
// ---------------------------------------------------------------------------

/// Summarises the per-role reviews the executor recorded during dispatch.
pub struct DualModelStage;

#[async_trait]
impl Firewall for DualModelStage {
    fn id(&self) -> FirewallId {
        FirewallId::DualModel
    }

    async fn run(&self, ctx: &FirewallContext) -> Result<VerificationResult, CollaboratorError> {
        let reviews = ctx.cross_validations.clone();
        let consistent_count = reviews.iter().filter(|r| r.consistent).count();
        let total = reviews.len();
        Ok(VerificationResult::new(
            FirewallId::DualModel,
            consistent_count == total,
            VerificationPayload::DualModel {
                reviews,
                consistent_count,
                total,
            },
        ))
    }

    fn fallback(&self, _ctx: &FirewallContext) -> VerificationResult {
        VerificationResult::new(
            FirewallId::DualModel,
            true,
            VerificationPayload::DualModel {
                reviews: Vec::new(),
                consistent_count: 0,
                total: 0,
            },
        )
    }
}

// ---------------------------------------------------------------------------
// 4. Correction view
// ---------------------------------------------------------------------------

/// Summarises the corrections the executor applied. Passes when no role
/// needed correcting.
pub struct CorrectionStage;

#[async_trait]
impl Firewall for CorrectionStage {
    fn id(&self) -> FirewallId {
        FirewallId::Correction
    }

    async fn run(&self, ctx: &FirewallContext) -> Result<VerificationResult, CollaboratorError> {
        Ok(VerificationResult::new(
            FirewallId::Correction,
            ctx.corrections.is_empty(),
            VerificationPayload::Correction {
                records: ctx.corrections.clone(),
            },
        ))
    }

    fn fallback(&self, _ctx: &FirewallContext) -> VerificationResult {
        VerificationResult::new(
            FirewallId::Correction,
            true,
            VerificationPayload::Correction {
                records: Vec::new(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// 5. Post-hoc audit
// ---------------------------------------------------------------------------

pub struct AuditStage {
    auditor: Arc<dyn Auditor>,
}

impl AuditStage {
    pub fn new(auditor: Arc<dyn Auditor>) -> Self {
        Self { auditor }
    }
}

#[async_trait]
impl Firewall for AuditStage {
    fn id(&self) -> FirewallId {
        FirewallId::Audit
    }

    async fn run(&self, ctx: &FirewallContext) -> Result<VerificationResult, CollaboratorError> {
        if ctx.aggregated.trim().is_empty() {
            return Err(CollaboratorError::Unavailable {
                what: "aggregated content for audit".to_string(),
            });
        }
        let report = self.auditor.audit(&ctx.aggregated, &ctx.raw_input).await?;
        Ok(VerificationResult::new(
            FirewallId::Audit,
            report.overall_grade != Grade::C,
            VerificationPayload::Audit {
                audit: Some(report),
                status: AuditStatus::Completed,
            },
        ))
    }

    fn fallback(&self, _ctx: &FirewallContext) -> VerificationResult {
        VerificationResult::new(
            FirewallId::Audit,
            true,
            VerificationPayload::Audit {
                audit: None,
                status: AuditStatus::Unavailable,
            },
        )
    }
}
