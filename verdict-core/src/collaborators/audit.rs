//! Post-hoc audit of the aggregated analysis.

use super::{AuditDimension, AuditReport, Auditor};
use crate::error::CollaboratorError;
use crate::providers::ModelInvoker;
use crate::roles::{QUALITY_AUDITOR, Role};
use crate::types::Grade;
use async_trait::async_trait;
use std::sync::Arc;

const AUDIT_FORMAT: &str = "\n\n请从准确性、完整性、一致性、可执行性四个维度打分（0-100），严格按以下格式输出：\n\
SCORE: 总分(0-100)\n\
GRADE: A、B 或 C\n\
SUMMARY: 一句话总结\n\
DIMENSIONS:\n\
- 维度名称 | 分数 | 发现";

/// Audits with the quality auditor role's prompt and model chain.
pub struct ModelAuditor {
    invoker: Arc<dyn ModelInvoker>,
    system_prompt: String,
    model_chain: Vec<String>,
}

impl ModelAuditor {
    pub fn new(invoker: Arc<dyn ModelInvoker>, role: &Role) -> Self {
        Self {
            invoker,
            system_prompt: format!("{}{}", role.system_prompt, AUDIT_FORMAT),
            model_chain: role.model_chain.clone(),
        }
    }
}

#[async_trait]
impl Auditor for ModelAuditor {
    async fn audit(
        &self,
        aggregated_content: &str,
        original_input: &str,
    ) -> Result<AuditReport, CollaboratorError> {
        let message = format!("用户原始问题：{original_input}\n\n待审计报告：\n{aggregated_content}");
        let reply = self
            .invoker
            .invoke(QUALITY_AUDITOR, &self.system_prompt, &message, &self.model_chain)
            .await?;
        parse_audit(&reply)
    }
}

fn parse_score(text: &str) -> Option<u8> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().ok().map(|n| n.min(100) as u8)
}

/// Parse the auditor's reply. A missing `SCORE:` line makes the reply unusable.
pub(crate) fn parse_audit(reply: &str) -> Result<AuditReport, CollaboratorError> {
    let mut score = None;
    let mut grade = None;
    let mut summary = String::new();
    let mut dimensions = Vec::new();
    let mut in_dimensions = false;

    for line in reply.lines() {
        let trimmed = line.trim();
        if let Some(v) = trimmed.strip_prefix("SCORE:") {
            score = parse_score(v);
            in_dimensions = false;
        } else if let Some(v) = trimmed.strip_prefix("GRADE:") {
            grade = Grade::parse_lenient(v);
            in_dimensions = false;
        } else if let Some(v) = trimmed.strip_prefix("SUMMARY:") {
            summary = v.trim().to_string();
            in_dimensions = false;
        } else if trimmed == "DIMENSIONS:" {
            in_dimensions = true;
        } else if in_dimensions && let Some(item) = trimmed.strip_prefix("- ") {
            let parts: Vec<&str> = item.splitn(3, '|').map(str::trim).collect();
            if let [name, score, finding] = parts.as_slice()
                && let Some(score) = parse_score(score)
            {
                dimensions.push(AuditDimension {
                    name: name.to_string(),
                    score,
                    finding: finding.to_string(),
                });
            }
        }
    }

    let overall_score = score.ok_or_else(|| CollaboratorError::Malformed {
        what: "audit reply".to_string(),
        message: "missing SCORE".to_string(),
    })?;

    Ok(AuditReport {
        overall_score,
        overall_grade: grade.unwrap_or_else(|| Grade::from_score(overall_score)),
        summary,
        dimensions,
    })
}
