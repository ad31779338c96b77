//! Mode strategies: forward, reverse, and mixed.
//!
//! - **Forward** runs the configured forward roles one after another; each
//!   role sees the user's resource profile and all prior contributions.
//! - **Reverse** fans the analyst roster out concurrently and aggregates in
//!   settle order.
//! - **Mixed** runs a forward subset and a reverse subset side by side and asks
//!   the synthesis role to merge them. Any failure there falls back to reverse.

use crate::config::{OrchestrationConfig, ResourceProfile};
use crate::error::DispatchError;
use crate::roles::{Role, RoleRegistry};
use crate::types::Mode;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs one role and returns its content, or `""` when it produced nothing.
#[async_trait]
pub trait RoleRunner: Send + Sync {
    async fn run_role(&self, role_id: &str, user_message: &str, use_dual_model: bool) -> String;

    /// Drop review records gathered so far. Called before mixed falls back.
    fn discard_reviews(&self) {}
}

/// One role's non-empty output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub role_id: String,
    pub role_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// The mode that actually produced the content.
    pub mode: Mode,
    pub contributions: Vec<Contribution>,
    pub aggregated: String,
}

/// Join contributions under per-role headings, in the order given.
pub fn aggregate(contributions: &[Contribution]) -> String {
    contributions
        .iter()
        .filter(|c| !c.content.trim().is_empty())
        .map(|c| format!("## {}\n\n{}", c.role_name, c.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct ModeDispatcher {
    roles: Arc<RoleRegistry>,
    plan: OrchestrationConfig,
    profile: ResourceProfile,
}

impl ModeDispatcher {
    pub fn new(roles: Arc<RoleRegistry>, plan: OrchestrationConfig, profile: ResourceProfile) -> Self {
        Self {
            roles,
            plan,
            profile,
        }
    }

    /// Run `mode` to completion. Never fails; mixed falls back to reverse.
    pub async fn dispatch<R: RoleRunner + ?Sized>(
        &self,
        mode: Mode,
        runner: &R,
        input: &str,
        project: &str,
        max_roles: usize,
    ) -> DispatchOutcome {
        info!(mode = %mode, max_roles, "Dispatching analysis");
        match mode {
            Mode::Forward => {
                let contributions = self
                    .run_sequential(runner, input, &self.plan.forward_roles)
                    .await;
                DispatchOutcome {
                    mode,
                    aggregated: aggregate(&contributions),
                    contributions,
                }
            }
            Mode::Reverse => self.reverse_outcome(runner, input, project, max_roles).await,
            Mode::Mixed => match self.run_mixed(runner, input, project, max_roles).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Mixed mode failed; falling back to reverse");
                    runner.discard_reviews();
                    self.reverse_outcome(runner, input, project, max_roles).await
                }
            },
        }
    }

    async fn reverse_outcome<R: RoleRunner + ?Sized>(
        &self,
        runner: &R,
        input: &str,
        project: &str,
        max_roles: usize,
    ) -> DispatchOutcome {
        let roles = self.roles.analysts(max_roles);
        let contributions = self
            .run_concurrent(runner, &self.reverse_message(input, project), roles)
            .await;
        DispatchOutcome {
            mode: Mode::Reverse,
            aggregated: aggregate(&contributions),
            contributions,
        }
    }

    /// Forward-mode prompt: resource profile, question, then prior analysis.
    pub fn forward_message(&self, input: &str, prior: &str) -> String {
        let p = &self.profile;
        let mut message = format!(
            "【我的固定资源】\n资金：{}\n场地：{}\n团队：{}\n经验：{}\n人脉：{}\n\n【我的问题】\n{}",
            p.capital, p.facility, p.team, p.experience, p.network, input
        );
        if !prior.is_empty() {
            message.push_str("\n\n【前序分析】\n");
            message.push_str(prior);
        }
        message
    }

    pub fn reverse_message(&self, input: &str, project: &str) -> String {
        if project.trim().is_empty() {
            input.to_string()
        } else {
            format!("【待评估项目】{}\n\n【用户原话】{}", project.trim(), input)
        }
    }

    fn contribution(&self, role_id: &str, content: String) -> Contribution {
        let role_name = self
            .roles
            .get(role_id)
            .map(|r| r.display_name.clone())
            .unwrap_or_else(|| role_id.to_string());
        Contribution {
            role_id: role_id.to_string(),
            role_name,
            content,
        }
    }

    /// Run `role_ids` in order, feeding each the contributions so far.
    async fn run_sequential<R: RoleRunner + ?Sized>(
        &self,
        runner: &R,
        input: &str,
        role_ids: &[String],
    ) -> Vec<Contribution> {
        let mut contributions = Vec::with_capacity(role_ids.len());
        for role_id in role_ids {
            let message = self.forward_message(input, &aggregate(&contributions));
            let use_dual = *role_id == self.plan.forward_dual_model_role;
            let content = runner.run_role(role_id, &message, use_dual).await;
            if !content.trim().is_empty() {
                contributions.push(self.contribution(role_id, content));
            }
        }
        contributions
    }

    /// Run `roles` concurrently; contributions come back in settle order.
    async fn run_concurrent<R: RoleRunner + ?Sized>(
        &self,
        runner: &R,
        message: &str,
        roles: Vec<&Role>,
    ) -> Vec<Contribution> {
        let mut pending: FuturesUnordered<_> = roles
            .into_iter()
            .map(|role| {
                let use_dual = self.plan.reverse_dual_model_roles.contains(&role.id);
                async move {
                    let content = runner.run_role(&role.id, message, use_dual).await;
                    (role.id.as_str(), content)
                }
            })
            .collect();

        let mut contributions = Vec::new();
        while let Some((role_id, content)) = pending.next().await {
            if !content.trim().is_empty() {
                contributions.push(self.contribution(role_id, content));
            }
        }
        contributions
    }

    /// Forward and reverse subsets side by side, merged by the synthesis role.
    pub async fn run_mixed<R: RoleRunner + ?Sized>(
        &self,
        runner: &R,
        input: &str,
        project: &str,
        max_roles: usize,
    ) -> Result<DispatchOutcome, DispatchError> {
        let synthesis = &self.plan.synthesis_role;
        let forward_ids: Vec<String> = self
            .plan
            .forward_roles
            .iter()
            .filter(|id| *id != synthesis)
            .cloned()
            .collect();
        let reverse_roles: Vec<&Role> = self
            .roles
            .analysts(max_roles)
            .into_iter()
            .filter(|r| r.id != *synthesis && !self.plan.forward_roles.contains(&r.id))
            .collect();
        let reverse_message = self.reverse_message(input, project);

        let (forward, reverse) = tokio::join!(
            self.run_sequential(runner, input, &forward_ids),
            self.run_concurrent(runner, &reverse_message, reverse_roles),
        );
        if forward.is_empty() && reverse.is_empty() {
            return Err(DispatchError::NoContributions);
        }

        let message = format!(
            "【用户问题】\n{}\n\n【正向分析：从现有资源出发】\n{}\n\n【逆向分析：评估目标项目】\n{}\n\n请综合两方面，给出最终结论。",
            input,
            aggregate(&forward),
            aggregate(&reverse)
        );
        let conclusion = runner.run_role(synthesis, &message, false).await;
        if conclusion.trim().is_empty() {
            return Err(DispatchError::SynthesisFailed {
                role: synthesis.clone(),
            });
        }

        let mut contributions = forward;
        contributions.extend(reverse);
        contributions.push(self.contribution(synthesis, conclusion.clone()));
        Ok(DispatchOutcome {
            mode: Mode::Mixed,
            contributions,
            aggregated: conclusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedRunner {
        responses: HashMap<String, String>,
        silent: HashSet<String>,
        calls: Mutex<Vec<(String, String, bool)>>,
        discards: Mutex<usize>,
    }

    impl ScriptedRunner {
        fn answering_all() -> Self {
            Self::default()
        }

        fn silence(mut self, role: &str) -> Self {
            self.silent.insert(role.to_string());
            self
        }

        fn respond(mut self, role: &str, text: &str) -> Self {
            self.responses.insert(role.to_string(), text.to_string());
            self
        }

        fn calls(&self) -> Vec<(String, String, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RoleRunner for ScriptedRunner {
        async fn run_role(&self, role_id: &str, user_message: &str, use_dual_model: bool) -> String {
            self.calls.lock().unwrap().push((
                role_id.to_string(),
                user_message.to_string(),
                use_dual_model,
            ));
            if self.silent.contains(role_id) {
                return String::new();
            }
            self.responses
                .get(role_id)
                .cloned()
                .unwrap_or_else(|| format!("{role_id} 的分析"))
        }

        fn discard_reviews(&self) {
            let calls = self.calls.lock().unwrap().len();
            // Record how many roles had run when the discard happened.
            *self.discards.lock().unwrap() = calls;
        }
    }

    fn dispatcher() -> ModeDispatcher {
        ModeDispatcher::new(
            Arc::new(RoleRegistry::builtin()),
            OrchestrationConfig::default(),
            ResourceProfile {
                capital: "13万元".to_string(),
                ..ResourceProfile::default()
            },
        )
    }

    #[tokio::test]
    async fn test_forward_runs_in_order_with_prior_context() {
        let runner = ScriptedRunner::answering_all().silence("opportunity_scout");
        let outcome = dispatcher()
            .dispatch(Mode::Forward, &runner, "我有13万资金想做光伏项目", "", 9)
            .await;

        assert_eq!(outcome.mode, Mode::Forward);
        let calls = runner.calls();
        let order: Vec<_> = calls.iter().map(|c| c.0.as_str()).collect();
        assert_eq!(order, OrchestrationConfig::default().forward_roles);

        assert!(calls[0].1.contains("资金：13万元"));
        assert!(!calls[0].1.contains("【前序分析】"));
        assert!(calls[2].1.contains("resource_analyst 的分析"));

        let dual: Vec<_> = calls.iter().filter(|c| c.2).map(|c| c.0.as_str()).collect();
        assert_eq!(dual, vec!["financial_analyst"]);

        // Silent role is skipped in the aggregation.
        assert_eq!(outcome.contributions.len(), 6);
        assert!(!outcome.aggregated.contains("机会挖掘师"));
        assert!(outcome.aggregated.starts_with("## 资源盘点师"));
    }

    #[tokio::test]
    async fn test_reverse_fans_out_analysts_up_to_max() {
        let runner = ScriptedRunner::answering_all();
        let outcome = dispatcher()
            .dispatch(Mode::Reverse, &runner, "评估奶茶店", "奶茶店", 9)
            .await;

        assert_eq!(outcome.mode, Mode::Reverse);
        let calls = runner.calls();
        assert_eq!(calls.len(), 9);
        assert!(calls.iter().all(|c| c.1.contains("【待评估项目】奶茶店")));
        let mut dual: Vec<_> = calls.iter().filter(|c| c.2).map(|c| c.0.clone()).collect();
        dual.sort();
        assert_eq!(dual, vec!["financial_analyst", "risk_assessor"]);
        assert_eq!(outcome.contributions.len(), 9);
    }

    #[tokio::test]
    async fn test_mixed_synthesizes() {
        let runner = ScriptedRunner::answering_all().respond("strategist", "综合结论：可以做");
        let outcome = dispatcher()
            .dispatch(Mode::Mixed, &runner, "我有13万想做光伏", "光伏", 14)
            .await;

        assert_eq!(outcome.mode, Mode::Mixed);
        assert_eq!(outcome.aggregated, "综合结论：可以做");
        let calls = runner.calls();
        let strategist_calls: Vec<_> = calls.iter().filter(|c| c.0 == "strategist").collect();
        assert_eq!(strategist_calls.len(), 1);
        assert!(strategist_calls[0].1.contains("【逆向分析：评估目标项目】"));
        assert_eq!(
            outcome.contributions.last().map(|c| c.role_id.as_str()),
            Some("strategist")
        );
    }

    #[tokio::test]
    async fn test_mixed_falls_back_to_reverse() {
        let runner = ScriptedRunner::answering_all().silence("strategist");
        let outcome = dispatcher()
            .dispatch(Mode::Mixed, &runner, "我有13万想做光伏", "", 5)
            .await;
        assert_eq!(outcome.mode, Mode::Reverse);
        assert!(!outcome.aggregated.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_fallback_discards_reviews_before_reverse() {
        let runner = ScriptedRunner::answering_all().silence("strategist");
        dispatcher()
            .dispatch(Mode::Mixed, &runner, "我有13万想做光伏", "", 5)
            .await;

        let calls = runner.calls();
        let discarded_at = *runner.discards.lock().unwrap();
        let strategist_at = calls.iter().position(|c| c.0 == "strategist").unwrap();
        // Discard follows the failed synthesis and precedes the reverse fan-out.
        assert_eq!(discarded_at, strategist_at + 1);
        assert_eq!(calls.len() - discarded_at, 5);
    }

    #[tokio::test]
    async fn test_successful_mixed_keeps_reviews() {
        let runner = ScriptedRunner::answering_all().respond("strategist", "综合结论");
        dispatcher()
            .dispatch(Mode::Mixed, &runner, "我有13万想做光伏", "光伏", 9)
            .await;
        assert_eq!(*runner.discards.lock().unwrap(), 0);
    }

    #[test]
    fn test_aggregate_skips_blank() {
        let contributions = vec![
            Contribution {
                role_id: "a".into(),
                role_name: "甲".into(),
                content: "内容一".into(),
            },
            Contribution {
                role_id: "b".into(),
                role_name: "乙".into(),
                content: "  ".into(),
            },
        ];
        assert_eq!(aggregate(&contributions), "## 甲\n\n内容一");
    }
}
