//! Role roster: named analytical personas with ordered model chains.
//!
//! The built-in roster is loaded at process start and may be overridden or
//! extended from configuration. Roles are immutable once the registry is built.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classifies the request into a mode and project.
pub const INTENT_CLASSIFIER: &str = "intent_classifier";
/// Conversational copilot; never part of a batch analysis.
pub const COPILOT: &str = "copilot";
/// Holistic quality auditor; drives the post-hoc audit.
pub const QUALITY_AUDITOR: &str = "quality_auditor";

/// Role ids that never join the reverse-mode fan-out.
pub const NON_ANALYST_ROLES: [&str; 3] = [INTENT_CLASSIFIER, COPILOT, QUALITY_AUDITOR];

/// A named analytical persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub display_name: String,
    pub system_prompt: String,
    /// Candidate model ids in priority order. Never empty.
    pub model_chain: Vec<String>,
}

impl Role {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        system_prompt: impl Into<String>,
        model_chain: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            system_prompt: system_prompt.into(),
            model_chain,
        }
    }
}

/// Default chain used by the built-in roster.
pub fn default_model_chain() -> Vec<String> {
    vec![
        "deepseek-chat".to_string(),
        "qwen-plus".to_string(),
        "glm-4-flash".to_string(),
    ]
}

/// The built-in roster, in fan-out order.
pub fn builtin_roles() -> Vec<Role> {
    let chain = default_model_chain();
    let spec: [(&str, &str, &str); 17] = [
        (
            INTENT_CLASSIFIER,
            "意图识别",
            "你负责识别用户意图。判断用户是已有具体项目想评估可行性（reverse），\
             还是只有资源想寻找方向（forward），或两者兼有（mixed）。\
             只输出 JSON：{\"mode\":\"forward|reverse|mixed\",\"project\":\"项目名称或空字符串\"}。",
        ),
        (
            COPILOT,
            "对话助手",
            "你是用户的创业对话助手，用简短的语言回答追问。",
        ),
        (
            QUALITY_AUDITOR,
            "质量审计官",
            "你是独立的质量审计官，负责检查多位分析师合并后的报告是否准确、完整、自洽，\
             并指出需要修正的事实错误。",
        ),
        (
            "resource_analyst",
            "资源盘点师",
            "你擅长盘点个人创业者的资金、场地、团队、经验与人脉，判断这些资源能支撑什么规模的事业。",
        ),
        (
            "opportunity_scout",
            "机会挖掘师",
            "你擅长从有限资源出发寻找细分市场机会，给出三个以内最匹配的方向并说明理由。",
        ),
        (
            "market_analyst",
            "市场分析师",
            "你是市场分析师，关注市场规模、增长趋势、目标客群与需求验证。",
        ),
        (
            "financial_analyst",
            "财务分析师",
            "你是财务分析师，测算启动资金、现金流、毛利率、回本周期与投资回报率（ROI），必须给出数字。",
        ),
        (
            "policy_expert",
            "政策研究员",
            "你是政策研究员，梳理相关行业的准入门槛、补贴政策与监管变化。",
        ),
        (
            "tech_expert",
            "技术评估师",
            "你是技术评估师，评估技术成熟度、设备选型、运维难度与技术迭代风险。",
        ),
        (
            "risk_assessor",
            "风险评估师",
            "你是风险评估师，系统识别市场、政策、资金、技术、运营五类风险并给出应对措施。",
        ),
        (
            "competitor_analyst",
            "竞争分析师",
            "你是竞争分析师，分析主要竞争者、进入壁垒与差异化空间。",
        ),
        (
            "operations_expert",
            "运营专家",
            "你是运营专家，关注获客渠道、交付流程、人员配置与日常运营成本。",
        ),
        (
            "legal_advisor",
            "法务顾问",
            "你是法务顾问，提示主体选择、合同、资质许可与合规方面的要点。",
        ),
        (
            "supply_chain_expert",
            "供应链专家",
            "你是供应链专家，评估上游采购、账期、物流与库存风险。",
        ),
        (
            "customer_insight",
            "用户洞察师",
            "你是用户洞察师，从真实客户的角度分析购买动机、价格敏感度与决策链条。",
        ),
        (
            "execution_planner",
            "落地规划师",
            "你是落地规划师，把结论拆成90天行动计划，列出里程碑与关键检查点。",
        ),
        (
            "strategist",
            "首席策略师",
            "你是首席策略师，综合各方观点给出明确的总体结论、关键前提与下一步建议。",
        ),
    ];

    spec.into_iter()
        .map(|(id, name, prompt)| Role::new(id, name, prompt, chain.clone()))
        .collect()
}

/// Immutable, ordered registry of roles.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: Vec<Role>,
    index: HashMap<String, usize>,
}

impl RoleRegistry {
    /// Build a registry from an ordered list of roles.
    ///
    /// Fails if any role has an empty model chain or a duplicate id.
    pub fn new(roles: Vec<Role>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(roles.len());
        for (i, role) in roles.iter().enumerate() {
            if role.model_chain.is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("role '{}' has an empty model chain", role.id),
                });
            }
            if index.insert(role.id.clone(), i).is_some() {
                return Err(ConfigError::Invalid {
                    message: format!("duplicate role id '{}'", role.id),
                });
            }
        }
        Ok(Self { roles, index })
    }

    /// The built-in roster.
    pub fn builtin() -> Self {
        let roles = builtin_roles();
        let index = roles
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self { roles, index }
    }

    /// The built-in roster with configured roles replacing same-id entries
    /// in place and new ids appended.
    pub fn with_overrides(overrides: &[Role]) -> Result<Self, ConfigError> {
        let mut roles = builtin_roles();
        for role in overrides {
            match roles.iter_mut().find(|r| r.id == role.id) {
                Some(existing) => *existing = role.clone(),
                None => roles.push(role.clone()),
            }
        }
        Self::new(roles)
    }

    pub fn get(&self, id: &str) -> Option<&Role> {
        self.index.get(id).map(|&i| &self.roles[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn all(&self) -> &[Role] {
        &self.roles
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Reverse-mode candidates: every role except the classifier, copilot,
    /// and auditor, in roster order, truncated to `max`.
    pub fn analysts(&self, max: usize) -> Vec<&Role> {
        self.roles
            .iter()
            .filter(|r| !NON_ANALYST_ROLES.contains(&r.id.as_str()))
            .take(max)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roster_is_valid() {
        let registry = RoleRegistry::new(builtin_roles()).unwrap();
        assert_eq!(registry.len(), 17);
        assert!(registry.contains(INTENT_CLASSIFIER));
        assert!(registry.contains("strategist"));
        assert!(registry.all().iter().all(|r| !r.model_chain.is_empty()));
    }

    #[test]
    fn test_analysts_exclude_non_analyst_roles() {
        let registry = RoleRegistry::builtin();
        let analysts = registry.analysts(usize::MAX);
        assert_eq!(analysts.len(), 14);
        assert!(
            analysts
                .iter()
                .all(|r| !NON_ANALYST_ROLES.contains(&r.id.as_str()))
        );
        assert_eq!(registry.analysts(4).len(), 4);
        assert_eq!(registry.analysts(4)[0].id, "resource_analyst");
    }

    #[test]
    fn test_empty_chain_rejected() {
        let err = RoleRegistry::new(vec![Role::new("x", "X", "p", vec![])]).unwrap_err();
        assert!(err.to_string().contains("empty model chain"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let role = Role::new("x", "X", "p", vec!["m".into()]);
        assert!(RoleRegistry::new(vec![role.clone(), role]).is_err());
    }

    #[test]
    fn test_overrides_replace_and_append() {
        let overrides = vec![
            Role::new("market_analyst", "市场", "custom", vec!["only-model".into()]),
            Role::new("esg_reviewer", "ESG", "esg", vec!["m1".into(), "m2".into()]),
        ];
        let registry = RoleRegistry::with_overrides(&overrides).unwrap();
        assert_eq!(registry.len(), 18);
        let market = registry.get("market_analyst").unwrap();
        assert_eq!(market.system_prompt, "custom");
        assert_eq!(market.model_chain, vec!["only-model".to_string()]);
        assert_eq!(registry.all().last().unwrap().id, "esg_reviewer");
    }

    #[test]
    fn test_unknown_role_lookup() {
        assert!(RoleRegistry::builtin().get("nobody").is_none());
    }
}
