//! Verification firewalls.
//!
//! Five checkpoints sit at fixed points of a session:
//!
//! | # | Stage            | Progress step |
//! |---|------------------|---------------|
//! | 1 | pre-fill search  | 1             |
//! | 2 | triangulation    | 2             |
//! | 3 | dual-model view  | 6             |
//! | 4 | correction view  | 7             |
//! | 5 | post-hoc audit   | 8             |
//!
//! Every stage implements [`Firewall`] and runs through [`run_stage`], which
//! replaces a failure with the stage's named fallback. A stage can never
//! abort the session.

pub mod stages;

pub use stages::{AuditStage, CorrectionStage, DualModelStage, SearchStage, TriangulationStage};

use crate::collaborators::{AuditReport, SearchHit, SearchResults, Triangulation};
use crate::degrade::degrade_with;
use crate::error::CollaboratorError;
use crate::services::Services;
use crate::session::{CorrectionRecord, CrossValidationRecord};
use crate::types::Grade;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snippets quoted in the pre-validation clause.
const CLAUSE_SNIPPETS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirewallId {
    Search,
    Triangulation,
    DualModel,
    Correction,
    Audit,
}

impl FirewallId {
    pub const ALL: [FirewallId; 5] = [
        FirewallId::Search,
        FirewallId::Triangulation,
        FirewallId::DualModel,
        FirewallId::Correction,
        FirewallId::Audit,
    ];

    /// Firewall number, 1..=5.
    pub fn number(self) -> u8 {
        match self {
            FirewallId::Search => 1,
            FirewallId::Triangulation => 2,
            FirewallId::DualModel => 3,
            FirewallId::Correction => 4,
            FirewallId::Audit => 5,
        }
    }

    /// Progress step announced when this stage starts.
    pub fn progress_step(self) -> u8 {
        match self {
            FirewallId::Search => 1,
            FirewallId::Triangulation => 2,
            FirewallId::DualModel => 6,
            FirewallId::Correction => 7,
            FirewallId::Audit => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FirewallId::Search => "pre-fill search",
            FirewallId::Triangulation => "triangulation",
            FirewallId::DualModel => "dual-model review",
            FirewallId::Correction => "correction review",
            FirewallId::Audit => "post-hoc audit",
        }
    }
}

impl fmt::Display for FirewallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "firewall {} ({})", self.number(), self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Completed,
    /// The audit could not run; reported as a neutral pass.
    Unavailable,
}

/// Firewall-specific payload, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum VerificationPayload {
    Search {
        result_count: usize,
        hits: Vec<SearchHit>,
        providers: Vec<String>,
    },
    Triangulation {
        verified: bool,
        confidence: Grade,
        sources: Vec<String>,
    },
    DualModel {
        reviews: Vec<CrossValidationRecord>,
        consistent_count: usize,
        total: usize,
    },
    Correction {
        records: Vec<CorrectionRecord>,
    },
    Audit {
        audit: Option<AuditReport>,
        status: AuditStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Firewall number, 1..=5.
    pub firewall: u8,
    pub passed: bool,
    pub payload: VerificationPayload,
}

impl VerificationResult {
    pub fn new(id: FirewallId, passed: bool, payload: VerificationPayload) -> Self {
        Self {
            firewall: id.number(),
            passed,
            payload,
        }
    }
}

/// What the stages read. Later stages see what earlier ones produced.
#[derive(Debug, Clone, Default)]
pub struct FirewallContext {
    pub raw_input: String,
    pub search_limit: usize,
    pub evidence: SearchResults,
    pub triangulation: Option<Triangulation>,
    pub aggregated: String,
    pub cross_validations: Vec<CrossValidationRecord>,
    pub corrections: Vec<CorrectionRecord>,
}

impl FirewallContext {
    pub fn new(raw_input: impl Into<String>, search_limit: usize) -> Self {
        Self {
            raw_input: raw_input.into(),
            search_limit,
            ..Self::default()
        }
    }

    /// Fold a stage result back into the context for the stages after it.
    pub fn absorb(&mut self, result: &VerificationResult) {
        match &result.payload {
            VerificationPayload::Search { hits, .. } => {
                self.evidence = SearchResults {
                    combined: hits.clone(),
                    ..SearchResults::default()
                };
            }
            VerificationPayload::Triangulation {
                verified,
                confidence,
                sources,
            } => {
                self.triangulation = Some(Triangulation {
                    verified: *verified,
                    confidence: *confidence,
                    sources: sources.clone(),
                });
            }
            _ => {}
        }
    }
}

#[async_trait]
pub trait Firewall: Send + Sync {
    fn id(&self) -> FirewallId;

    async fn run(&self, ctx: &FirewallContext) -> Result<VerificationResult, CollaboratorError>;

    /// The neutral result reported when [`Firewall::run`] fails.
    fn fallback(&self, ctx: &FirewallContext) -> VerificationResult;
}

/// Run one stage, degrading to its fallback on error.
pub async fn run_stage(stage: &dyn Firewall, ctx: &FirewallContext) -> VerificationResult {
    degrade_with(stage.id().name(), stage.run(ctx), || stage.fallback(ctx)).await
}

/// The ordered set of firewall stages.
pub struct VerificationPipeline {
    stages: Vec<Box<dyn Firewall>>,
}

impl VerificationPipeline {
    pub fn new(stages: Vec<Box<dyn Firewall>>) -> Self {
        Self { stages }
    }

    /// All five default stages over the shared collaborators.
    pub fn from_services(services: &Services) -> Self {
        Self::new(vec![
            Box::new(SearchStage::new(services.search.clone())),
            Box::new(TriangulationStage::new(services.triangulator.clone())),
            Box::new(DualModelStage),
            Box::new(CorrectionStage),
            Box::new(AuditStage::new(services.auditor.clone())),
        ])
    }

    fn stage(&self, id: FirewallId) -> Option<&dyn Firewall> {
        self.stages.iter().find(|s| s.id() == id).map(|s| s.as_ref())
    }

    /// Run `ids` in order, calling `before_stage` as each one starts.
    ///
    /// Each result is absorbed into `ctx` before the next stage runs. Ids with
    /// no registered stage are skipped.
    pub async fn run_sequence<F>(
        &self,
        ids: &[FirewallId],
        ctx: &mut FirewallContext,
        mut before_stage: F,
    ) -> Vec<VerificationResult>
    where
        F: FnMut(FirewallId) + Send,
    {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(stage) = self.stage(id) else {
                continue;
            };
            before_stage(id);
            let result = run_stage(stage, ctx).await;
            ctx.absorb(&result);
            results.push(result);
        }
        results
    }
}

/// Pre-validation clause handed to every role prompt.
///
/// Quotes verified evidence when triangulation succeeded, otherwise asks the
/// roles to flag unverified figures as assumptions.
pub fn constraint_clause(ctx: &FirewallContext) -> String {
    let verified = ctx.triangulation.as_ref().is_some_and(|t| t.verified);
    let quotes: Vec<String> = ctx
        .evidence
        .combined
        .iter()
        .take(CLAUSE_SNIPPETS)
        .map(|hit| format!("- {}：{}（{}）", hit.title, hit.snippet, hit.url))
        .collect();

    if verified {
        format!(
            "【预验证】以下信息已由多个独立来源交叉印证，可作为分析依据：\n{}",
            quotes.join("\n")
        )
    } else if !quotes.is_empty() {
        format!(
            "【预验证】检索到相关资料，但未能多源印证，引用时请注明不确定性：\n{}",
            quotes.join("\n")
        )
    } else {
        "【预验证】未检索到可印证的公开资料，涉及数据与政策的判断请明确标注为假设。".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Exploding {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Firewall for Exploding {
        fn id(&self) -> FirewallId {
            FirewallId::Triangulation
        }

        async fn run(&self, _ctx: &FirewallContext) -> Result<VerificationResult, CollaboratorError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Err(CollaboratorError::Unavailable {
                what: "triangulation service".into(),
            })
        }

        fn fallback(&self, _ctx: &FirewallContext) -> VerificationResult {
            VerificationResult::new(
                FirewallId::Triangulation,
                false,
                VerificationPayload::Triangulation {
                    verified: false,
                    confidence: Grade::C,
                    sources: vec![],
                },
            )
        }
    }

    #[test]
    fn test_firewall_numbers_and_steps() {
        let numbers: Vec<u8> = FirewallId::ALL.iter().map(|f| f.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        let steps: Vec<u8> = FirewallId::ALL.iter().map(|f| f.progress_step()).collect();
        assert_eq!(steps, vec![1, 2, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_failing_stage_degrades_to_fallback() {
        let runs = Arc::new(AtomicUsize::new(0));
        let pipeline = VerificationPipeline::new(vec![Box::new(Exploding { runs: runs.clone() })]);
        let mut ctx = FirewallContext::new("q", 5);
        let mut started = Vec::new();
        let results = pipeline
            .run_sequence(
                &[FirewallId::Search, FirewallId::Triangulation],
                &mut ctx,
                |id| started.push(id),
            )
            .await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(started, vec![FirewallId::Triangulation]);
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
        assert_eq!(ctx.triangulation, Some(Triangulation::default()));
    }

    #[test]
    fn test_payload_serialization_is_tagged() {
        let result = VerificationResult::new(
            FirewallId::Audit,
            true,
            VerificationPayload::Audit {
                audit: None,
                status: AuditStatus::Unavailable,
            },
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["firewall"], 5);
        assert_eq!(json["payload"]["kind"], "audit");
        assert_eq!(json["payload"]["status"], "unavailable");
        assert!(json["payload"]["audit"].is_null());
    }

    #[test]
    fn test_constraint_clause_variants() {
        let mut ctx = FirewallContext::new("q", 5);
        assert!(constraint_clause(&ctx).contains("未检索到"));

        ctx.evidence.combined.push(SearchHit {
            url: "https://www.nea.gov.cn/1".into(),
            title: "政策".into(),
            snippet: "分布式光伏补贴延续".into(),
        });
        assert!(constraint_clause(&ctx).contains("未能多源印证"));

        ctx.triangulation = Some(Triangulation {
            verified: true,
            confidence: Grade::B,
            sources: vec![],
        });
        let clause = constraint_clause(&ctx);
        assert!(clause.contains("交叉印证"));
        assert!(clause.contains("分布式光伏补贴延续"));
    }
}
