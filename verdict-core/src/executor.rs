//! Role execution: prompt augmentation, dual-model review, and correction.
//!
//! [`RoleExecutor::execute`] never fails. Every sub-step degrades: a failed
//! cross-validation falls back to the single-model path, a failed correction
//! keeps the original text, and an exhausted model chain marks the role
//! `failed` and yields an empty string.

use crate::collaborators::CorrectionContext;
use crate::degrade::degrade_opt;
use crate::dispatch::RoleRunner;
use crate::services::Services;
use crate::session::{CorrectionRecord, CrossValidationRecord, ExecutionSession};
use crate::types::RoleStatus;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct RoleExecutor {
    session: Arc<ExecutionSession>,
    services: Arc<Services>,
}

impl RoleExecutor {
    pub fn new(session: Arc<ExecutionSession>, services: Arc<Services>) -> Self {
        Self { session, services }
    }

    pub fn session(&self) -> &Arc<ExecutionSession> {
        &self.session
    }

    /// Base prompt plus style directive, constraint clause, and tuning.
    ///
    /// A failing tuning lookup returns `base` unmodified.
    pub fn effective_prompt(&self, role_id: &str, base: &str) -> String {
        let adjustment = match self.services.tuning.adjustment(role_id) {
            Ok(adjustment) => adjustment,
            Err(e) => {
                warn!(role = role_id, error = %e, "Prompt tuning failed; using base prompt");
                return base.to_string();
            }
        };

        let mut prompt = String::with_capacity(base.len() + 256);
        prompt.push_str(base);
        prompt.push_str("\n\n");
        prompt.push_str(self.session.style.directive());
        if let Some(clause) = &self.session.constraint_clause {
            prompt.push_str("\n\n");
            prompt.push_str(clause);
        }
        if let Some(adjustment) = adjustment {
            prompt.push_str("\n\n");
            prompt.push_str(&adjustment);
        }
        prompt
    }

    /// Run one role against one task.
    ///
    /// `system_prompt` overrides the role's own prompt when given.
    pub async fn execute(
        &self,
        role_id: &str,
        system_prompt: Option<&str>,
        user_message: &str,
        use_dual_model: bool,
    ) -> String {
        self.session.set_status(role_id, RoleStatus::running());

        let Some(role) = self.services.roles.get(role_id) else {
            debug!(role = role_id, "Role not configured; skipping");
            self.session.set_status(role_id, RoleStatus::skipped());
            return String::new();
        };

        let prompt = self.effective_prompt(role_id, system_prompt.unwrap_or(&role.system_prompt));
        let chain = &role.model_chain;

        let mut content = None;
        if use_dual_model && chain.len() >= 2 {
            let review = self
                .services
                .cross_validator
                .cross_validate(role_id, user_message, &prompt, &chain[..1], &chain[1..2])
                .await;
            if let Some(review) = degrade_opt("dual-model review", review)
                && !review.final_conclusion.trim().is_empty()
            {
                self.session.record_cross_validation(CrossValidationRecord {
                    role_id: role_id.to_string(),
                    consistent: review.consistent,
                    confidence: review.confidence,
                    primary_model: chain[0].clone(),
                    secondary_model: chain[1].clone(),
                });
                content = Some(review.final_conclusion);
            }
        }

        let mut content = match content {
            Some(content) => content,
            None => match self
                .services
                .invoker
                .invoke(role_id, &prompt, user_message, chain)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(role = role_id, error = %e, "Role failed");
                    self.session
                        .set_status(role_id, RoleStatus::failed(e.to_string()));
                    return String::new();
                }
            },
        };

        if let Some(corrector) = &self.services.corrector {
            let context = CorrectionContext {
                role_id: role_id.to_string(),
                user_message: user_message.to_string(),
            };
            let correction = corrector.correct(&content, &context).await;
            if let Some(correction) = degrade_opt("correction review", correction)
                && !correction.corrections.is_empty()
                && !correction.corrected_content.trim().is_empty()
            {
                debug!(
                    role = role_id,
                    count = correction.corrections.len(),
                    "Applied corrections"
                );
                self.session.record_correction(CorrectionRecord {
                    role_id: role_id.to_string(),
                    corrections: correction.corrections,
                });
                content = correction.corrected_content;
            }
        }

        info!(role = role_id, chars = content.chars().count(), "Role completed");
        self.session
            .set_status(role_id, RoleStatus::completed(&content));
        content
    }
}

#[async_trait]
impl RoleRunner for RoleExecutor {
    async fn run_role(&self, role_id: &str, user_message: &str, use_dual_model: bool) -> String {
        self.execute(role_id, None, user_message, use_dual_model).await
    }

    fn discard_reviews(&self) {
        debug!("Discarding reviews from abandoned attempt");
        self.session.clear_reviews();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CrossValidation, CrossValidator, PromptTuning};
    use crate::config::VerdictConfig;
    use crate::error::CollaboratorError;
    use crate::providers::MockModelBackend;
    use crate::roles::Role;
    use crate::types::{Depth, RoleState, Style};

    fn services_with(backend: MockModelBackend, config: &VerdictConfig) -> Arc<Services> {
        Arc::new(Services::with_backend(config, Arc::new(backend)).unwrap())
    }

    fn no_correction() -> VerdictConfig {
        let mut config = VerdictConfig::default();
        config.orchestration.correction_enabled = false;
        config
    }

    fn executor(services: Arc<Services>) -> RoleExecutor {
        let session = Arc::new(ExecutionSession::new(
            "我有13万资金想做光伏项目",
            Depth::Standard,
            Style::Professional,
        ));
        RoleExecutor::new(session, services)
    }

    struct FailingValidator;

    #[async_trait]
    impl CrossValidator for FailingValidator {
        async fn cross_validate(
            &self,
            _role_id: &str,
            _user_message: &str,
            _system_prompt: &str,
            _primary: &[String],
            _secondary: &[String],
        ) -> Result<CrossValidation, CollaboratorError> {
            Err(CollaboratorError::Unavailable {
                what: "judge".into(),
            })
        }
    }

    struct BrokenTuning;

    impl PromptTuning for BrokenTuning {
        fn adjustment(&self, _role_id: &str) -> Result<Option<String>, CollaboratorError> {
            Err(CollaboratorError::Unavailable {
                what: "tuning store".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_single_model_success() {
        let exec = executor(services_with(
            MockModelBackend::with_response("市场空间充足"),
            &no_correction(),
        ));
        let out = exec
            .execute("market_analyst", None, "问题", false)
            .await;
        assert_eq!(out, "市场空间充足");
        let status = exec.session().status("market_analyst").unwrap();
        assert_eq!(status.state, RoleState::Completed);
        assert_eq!(status.content, "市场空间充足");
    }

    #[tokio::test]
    async fn test_unknown_role_is_skipped_silently() {
        let exec = executor(services_with(MockModelBackend::with_response("x"), &no_correction()));
        let out = exec.execute("ghost", None, "问题", true).await;
        assert_eq!(out, "");
        assert_eq!(
            exec.session().status("ghost").unwrap().state,
            RoleState::Skipped
        );
    }

    #[tokio::test]
    async fn test_exhaustion_marks_failed() {
        let backend = MockModelBackend::new()
            .fail_model("deepseek-chat")
            .fail_model("qwen-plus")
            .fail_model("glm-4-flash");
        let exec = executor(services_with(backend, &no_correction()));
        let out = exec.execute("risk_assessor", None, "问题", false).await;
        assert_eq!(out, "");
        let status = exec.session().status("risk_assessor").unwrap();
        assert_eq!(status.state, RoleState::Failed);
        assert!(status.content.contains("All 3 model(s) failed"));
    }

    #[tokio::test]
    async fn test_dual_model_records_review() {
        let backend = MockModelBackend::with_response("单模型分析")
            .respond_when("交叉验证裁判", "CONSISTENT: yes\nCONFIDENCE: A\nCONCLUSION: 双模型结论");
        let exec = executor(services_with(backend, &no_correction()));
        let out = exec
            .execute("financial_analyst", None, "问题", true)
            .await;
        assert_eq!(out, "双模型结论");
        let reviews = exec.session().cross_validations();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].primary_model, "deepseek-chat");
        assert_eq!(reviews[0].secondary_model, "qwen-plus");
    }

    #[tokio::test]
    async fn test_dual_model_degrades_to_single() {
        let mut services =
            Services::with_backend(&no_correction(), Arc::new(MockModelBackend::with_response("单模型分析")))
                .unwrap();
        services.cross_validator = Arc::new(FailingValidator);
        let exec = executor(Arc::new(services));
        let out = exec
            .execute("financial_analyst", None, "问题", true)
            .await;
        assert_eq!(out, "单模型分析");
        assert!(exec.session().cross_validations().is_empty());
    }

    #[tokio::test]
    async fn test_single_model_chain_skips_dual_branch() {
        let mut config = no_correction();
        config.roles.push(Role::new(
            "solo_analyst",
            "单模型分析师",
            "你只用一个模型",
            vec!["deepseek-chat".to_string()],
        ));
        let backend = Arc::new(MockModelBackend::with_response("单模型"));
        let services = Arc::new(Services::with_backend(&config, backend.clone()).unwrap());
        let exec = executor(services);
        let out = exec.execute("solo_analyst", None, "问题", true).await;
        assert_eq!(out, "单模型");
        assert!(exec.session().cross_validations().is_empty());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_discard_reviews_clears_session_records() {
        let backend = MockModelBackend::with_response("原始分析")
            .respond_when("交叉验证裁判", "CONSISTENT: yes\nCONFIDENCE: A\nCONCLUSION: 双模型结论")
            .respond_when("实时纠错审核员", "CORRECTIONS:\n- 数字有误\nCORRECTED:\n修正后分析");
        let exec = executor(services_with(backend, &VerdictConfig::default()));
        exec.execute("financial_analyst", None, "问题", true).await;
        assert_eq!(exec.session().cross_validations().len(), 1);
        assert_eq!(exec.session().corrections().len(), 1);

        exec.discard_reviews();
        assert!(exec.session().cross_validations().is_empty());
        assert!(exec.session().corrections().is_empty());
        assert_eq!(
            exec.session().status("financial_analyst").unwrap().state,
            RoleState::Completed
        );
    }

    #[tokio::test]
    async fn test_correction_replaces_content() {
        let backend = MockModelBackend::with_response("原始分析")
            .respond_when("实时纠错审核员", "CORRECTIONS:\n- 数字有误\nCORRECTED:\n修正后分析");
        let exec = executor(services_with(backend, &VerdictConfig::default()));
        let out = exec.execute("market_analyst", None, "问题", false).await;
        assert_eq!(out, "修正后分析");
        assert_eq!(exec.session().corrections()[0].corrections, vec!["数字有误"]);
    }

    #[tokio::test]
    async fn test_malformed_correction_keeps_content() {
        let backend = MockModelBackend::with_response("原始分析")
            .respond_when("实时纠错审核员", "看起来不错");
        let exec = executor(services_with(backend, &VerdictConfig::default()));
        let out = exec.execute("market_analyst", None, "问题", false).await;
        assert_eq!(out, "原始分析");
        assert!(exec.session().corrections().is_empty());
    }

    #[test]
    fn test_effective_prompt_layers() {
        let mut config = no_correction();
        config
            .tuning
            .insert("market_analyst".to_string(), "关注县域市场".to_string());
        let services = services_with(MockModelBackend::with_response("x"), &config);
        let session = Arc::new(
            ExecutionSession::new("q", Depth::Quick, Style::Plain)
                .with_constraint_clause(Some("已核实：补贴存在".to_string())),
        );
        let exec = RoleExecutor::new(session, services);
        let prompt = exec.effective_prompt("market_analyst", "基础提示");
        assert!(prompt.starts_with("基础提示"));
        assert!(prompt.contains(Style::Plain.directive()));
        assert!(prompt.contains("已核实：补贴存在"));
        assert!(prompt.ends_with("关注县域市场"));
    }

    #[test]
    fn test_effective_prompt_falls_back_on_tuning_error() {
        let mut services =
            Services::with_backend(&no_correction(), Arc::new(MockModelBackend::with_response("x")))
                .unwrap();
        services.tuning = Arc::new(BrokenTuning);
        let exec = executor(Arc::new(services));
        assert_eq!(exec.effective_prompt("market_analyst", "基础提示"), "基础提示");
    }
}
