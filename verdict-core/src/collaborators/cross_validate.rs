//! Dual-model cross-validation.
//!
//! The task runs on two independent model chains concurrently; a judge call
//! then compares both answers and writes the consensus conclusion.

use super::{CrossValidation, CrossValidator};
use crate::error::CollaboratorError;
use crate::providers::ModelInvoker;
use crate::types::Grade;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub(crate) const JUDGE_PROMPT: &str = "你是交叉验证裁判。你会收到同一问题的两份独立分析（分析A与分析B）。\
请判断两者的核心结论是否一致，并给出综合后的最终结论。\n\
严格按以下格式输出：\n\
CONSISTENT: yes 或 no\n\
CONFIDENCE: A、B 或 C（A 最高）\n\
CONCLUSION: 综合后的最终结论（可多行）";

pub struct ModelCrossValidator {
    invoker: Arc<dyn ModelInvoker>,
}

impl ModelCrossValidator {
    pub fn new(invoker: Arc<dyn ModelInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl CrossValidator for ModelCrossValidator {
    async fn cross_validate(
        &self,
        role_id: &str,
        user_message: &str,
        system_prompt: &str,
        primary_models: &[String],
        secondary_models: &[String],
    ) -> Result<CrossValidation, CollaboratorError> {
        let (primary, secondary) = tokio::join!(
            self.invoker
                .invoke(role_id, system_prompt, user_message, primary_models),
            self.invoker
                .invoke(role_id, system_prompt, user_message, secondary_models),
        );
        let primary = primary?;
        let secondary = secondary?;

        let judge_input = format!(
            "问题：{user_message}\n\n分析A：\n{primary}\n\n分析B：\n{secondary}"
        );
        let judge_chain: Vec<String> = primary_models
            .iter()
            .chain(secondary_models.iter())
            .cloned()
            .collect();
        let verdict = self
            .invoker
            .invoke(role_id, JUDGE_PROMPT, &judge_input, &judge_chain)
            .await?;

        debug!(role = role_id, "Cross-validation judge responded");
        parse_judgement(&verdict)
    }
}

/// Parse the judge's `CONSISTENT:` / `CONFIDENCE:` / `CONCLUSION:` lines.
///
/// Everything after the `CONCLUSION:` marker, including following lines, is
/// the conclusion.
pub(crate) fn parse_judgement(text: &str) -> Result<CrossValidation, CollaboratorError> {
    let mut consistent = false;
    let mut confidence = Grade::C;
    let mut conclusion: Option<Vec<&str>> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(lines) = conclusion.as_mut() {
            lines.push(line);
        } else if let Some(v) = trimmed.strip_prefix("CONSISTENT:") {
            let v = v.trim().to_lowercase();
            consistent = v.starts_with("yes") || v.starts_with("true") || v.starts_with('是');
        } else if let Some(v) = trimmed.strip_prefix("CONFIDENCE:") {
            confidence = Grade::parse_lenient(v).unwrap_or(Grade::C);
        } else if let Some(v) = trimmed.strip_prefix("CONCLUSION:") {
            conclusion = Some(vec![v.trim()]);
        }
    }

    let final_conclusion = conclusion
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CollaboratorError::Malformed {
            what: "cross-validation verdict".to_string(),
            message: "missing CONCLUSION".to_string(),
        })?;

    Ok(CrossValidation {
        final_conclusion,
        consistent,
        confidence,
    })
}
