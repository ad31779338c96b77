//! Real-time correction pass run after each successful role call.

use super::{Correction, CorrectionContext, Corrector};
use crate::error::CollaboratorError;
use crate::providers::ModelInvoker;
use async_trait::async_trait;
use std::sync::Arc;

pub(crate) const CORRECTOR_PROMPT: &str = "你是实时纠错审核员。检查下面的分析内容中是否存在事实错误、计算错误或前后矛盾。\n\
如果没有问题，只输出：NO_CORRECTIONS\n\
如果有问题，严格按以下格式输出：\n\
CORRECTIONS:\n\
- 每条修正一行\n\
CORRECTED:\n\
修正后的完整内容";

/// Role id under which correction calls are logged and failed over.
const CORRECTOR_ROLE: &str = "corrector";

pub struct ModelCorrector {
    invoker: Arc<dyn ModelInvoker>,
    model_chain: Vec<String>,
}

impl ModelCorrector {
    pub fn new(invoker: Arc<dyn ModelInvoker>, model_chain: Vec<String>) -> Self {
        Self {
            invoker,
            model_chain,
        }
    }
}

#[async_trait]
impl Corrector for ModelCorrector {
    async fn correct(
        &self,
        content: &str,
        context: &CorrectionContext,
    ) -> Result<Correction, CollaboratorError> {
        let message = format!(
            "角色：{}\n原始问题：{}\n\n待检查内容：\n{}",
            context.role_id, context.user_message, content
        );
        let reply = self
            .invoker
            .invoke(CORRECTOR_ROLE, CORRECTOR_PROMPT, &message, &self.model_chain)
            .await?;
        parse_correction(&reply, content)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Corrections,
    Corrected,
}

/// Parse a corrector reply. `original` is returned untouched when the reply
/// reports no corrections.
pub(crate) fn parse_correction(reply: &str, original: &str) -> Result<Correction, CollaboratorError> {
    if reply.trim().starts_with("NO_CORRECTIONS") {
        return Ok(Correction {
            corrections: Vec::new(),
            corrected_content: original.to_string(),
        });
    }

    let mut section = Section::None;
    let mut corrections = Vec::new();
    let mut corrected: Vec<&str> = Vec::new();

    for line in reply.lines() {
        let trimmed = line.trim();
        match section {
            Section::Corrected => corrected.push(line),
            _ if trimmed == "CORRECTIONS:" => section = Section::Corrections,
            _ if trimmed.starts_with("CORRECTED:") => {
                section = Section::Corrected;
                let rest = trimmed.trim_start_matches("CORRECTED:").trim();
                if !rest.is_empty() {
                    corrected.push(rest);
                }
            }
            Section::Corrections => {
                if let Some(item) = trimmed.strip_prefix("- ") {
                    corrections.push(item.trim().to_string());
                }
            }
            Section::None => {}
        }
    }

    if section == Section::None {
        return Err(CollaboratorError::Malformed {
            what: "correction reply".to_string(),
            message: "no CORRECTIONS or NO_CORRECTIONS marker".to_string(),
        });
    }

    let corrected_content = corrected.join("\n").trim().to_string();
    if !corrections.is_empty() && corrected_content.is_empty() {
        return Err(CollaboratorError::Malformed {
            what: "correction reply".to_string(),
            message: "corrections listed without CORRECTED content".to_string(),
        });
    }

    Ok(Correction {
        corrections,
        corrected_content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChainInvoker, MockModelBackend};
    use std::time::Duration;

    #[test]
    fn test_no_corrections_keeps_original() {
        let parsed = parse_correction("NO_CORRECTIONS", "原文").unwrap();
        assert!(parsed.corrections.is_empty());
        assert_eq!(parsed.corrected_content, "原文");
    }

    #[test]
    fn test_corrections_with_content() {
        let reply = "CORRECTIONS:\n- 回本周期应为6年而非3年\n- 单位应为万元\nCORRECTED:\n修正后的第一行\n第二行";
        let parsed = parse_correction(reply, "原文").unwrap();
        assert_eq!(parsed.corrections.len(), 2);
        assert_eq!(parsed.corrected_content, "修正后的第一行\n第二行");
    }

    #[test]
    fn test_corrections_without_content_is_malformed() {
        assert!(parse_correction("CORRECTIONS:\n- x\n", "原文").is_err());
        assert!(parse_correction("free text", "原文").is_err());
    }

    #[tokio::test]
    async fn test_model_corrector() {
        let backend = Arc::new(MockModelBackend::with_response(
            "CORRECTIONS:\n- 修正一\nCORRECTED: 新内容",
        ));
        let invoker = Arc::new(ChainInvoker::new(backend, 3, Duration::from_secs(60)));
        let corrector = ModelCorrector::new(invoker, vec!["m".to_string()]);
        let ctx = CorrectionContext {
            role_id: "market_analyst".to_string(),
            user_message: "问题".to_string(),
        };
        let out = corrector.correct("旧内容", &ctx).await.unwrap();
        assert_eq!(out.corrections, vec!["修正一"]);
        assert_eq!(out.corrected_content, "新内容");
    }
}
