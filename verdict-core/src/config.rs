//! Configuration system for Verdict.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/verdict/config.toml` and/or `.verdict/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::collaborators::search::SearchConfig;
use crate::error::ConfigError;
use crate::gateway::ServerConfig;
use crate::providers::openai_compat::{ModelEndpoint, default_endpoints};
use crate::roles::{Role, RoleRegistry};
use crate::types::{Depth, Style};

/// Top-level configuration for Verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictConfig {
    pub server: ServerConfig,
    pub orchestration: OrchestrationConfig,
    pub depth: DepthPresets,
    pub profile: ResourceProfile,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub failover: FailoverConfig,
    /// Model endpoints addressable from role chains.
    #[serde(default)]
    pub models: Vec<ModelEndpoint>,
    /// Role overrides merged over the built-in roster.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Per-role prompt adjustments appended after the style directive.
    #[serde(default)]
    pub tuning: HashMap<String, String>,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            orchestration: OrchestrationConfig::default(),
            depth: DepthPresets::default(),
            profile: ResourceProfile::default(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            failover: FailoverConfig::default(),
            models: default_endpoints(),
            roles: Vec::new(),
            tuning: HashMap::new(),
        }
    }
}

impl VerdictConfig {
    /// Build the role registry described by this configuration.
    pub fn role_registry(&self) -> Result<RoleRegistry, ConfigError> {
        RoleRegistry::with_overrides(&self.roles)
    }

    /// Check cross-references between sections and the role registry.
    pub fn validate(&self, registry: &RoleRegistry) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }
        if self.orchestration.forward_roles.is_empty() {
            return Err(ConfigError::Invalid {
                message: "orchestration.forward_roles must not be empty".to_string(),
            });
        }

        let orch = &self.orchestration;
        let referenced = orch
            .forward_roles
            .iter()
            .chain(orch.reverse_dual_model_roles.iter())
            .chain(std::iter::once(&orch.forward_dual_model_role))
            .chain(std::iter::once(&orch.synthesis_role))
            .chain(self.tuning.keys());
        for role in referenced {
            if !registry.contains(role) {
                return Err(ConfigError::UnknownRole { role: role.clone() });
            }
        }

        for preset in [&self.depth.quick, &self.depth.standard, &self.depth.deep] {
            if preset.max_roles == 0 {
                return Err(ConfigError::Invalid {
                    message: "depth presets need max_roles >= 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

/// Which roles run in which mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    pub default_depth: Depth,
    pub default_style: Style,
    /// Forward-mode roles, executed sequentially in this order.
    pub forward_roles: Vec<String>,
    /// The one forward role verified by two models.
    pub forward_dual_model_role: String,
    /// Reverse-mode roles verified by two models.
    pub reverse_dual_model_roles: Vec<String>,
    /// Role that merges forward and reverse findings in mixed mode.
    pub synthesis_role: String,
    /// Whether the real-time correction pass runs after each role.
    pub correction_enabled: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            default_depth: Depth::Standard,
            default_style: Style::Professional,
            forward_roles: [
                "resource_analyst",
                "opportunity_scout",
                "market_analyst",
                "financial_analyst",
                "risk_assessor",
                "execution_planner",
                "strategist",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            forward_dual_model_role: "financial_analyst".to_string(),
            reverse_dual_model_roles: vec![
                "financial_analyst".to_string(),
                "risk_assessor".to_string(),
            ],
            synthesis_role: "strategist".to_string(),
            correction_enabled: true,
        }
    }
}

/// How many roles and search results participate at one depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthPreset {
    pub max_roles: usize,
    pub search_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthPresets {
    pub quick: DepthPreset,
    pub standard: DepthPreset,
    pub deep: DepthPreset,
}

impl DepthPresets {
    pub fn preset(&self, depth: Depth) -> DepthPreset {
        match depth {
            Depth::Quick => self.quick,
            Depth::Standard => self.standard,
            Depth::Deep => self.deep,
        }
    }
}

impl Default for DepthPresets {
    fn default() -> Self {
        Self {
            quick: DepthPreset {
                max_roles: 5,
                search_results: 3,
            },
            standard: DepthPreset {
                max_roles: 9,
                search_results: 5,
            },
            deep: DepthPreset {
                max_roles: 14,
                search_results: 10,
            },
        }
    }
}

/// The user's fixed resources, stated once and prefixed to forward-mode prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceProfile {
    pub capital: String,
    pub facility: String,
    pub team: String,
    pub experience: String,
    pub network: String,
    /// Hard capital ceiling in units of 10k CNY (万元).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capital_limit_wan: Option<f64>,
    /// Minimum acceptable annual ROI, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_roi_percent: Option<f64>,
}

impl Default for ResourceProfile {
    fn default() -> Self {
        let unstated = "未说明".to_string();
        Self {
            capital: unstated.clone(),
            facility: unstated.clone(),
            team: unstated.clone(),
            experience: unstated.clone(),
            network: unstated,
            capital_limit_wan: None,
            min_roi_percent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
        }
    }
}

/// Circuit breaker and transport settings for the model chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Consecutive failures before a model is skipped.
    pub failure_threshold: usize,
    /// Seconds before a deferred model is tried first again.
    pub recovery_secs: u64,
    /// Per-request timeout of the HTTP backend.
    pub request_timeout_secs: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_secs: 60,
            request_timeout_secs: 120,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `VERDICT_`)
/// 3. Workspace-local config (`.verdict/config.toml`)
/// 4. User config (`~/.config/verdict/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&VerdictConfig>,
) -> Result<VerdictConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(VerdictConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "verdict", "verdict") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".verdict").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // VERDICT_SERVER__PORT, VERDICT_CACHE__TTL_SECS, ...
    figment = figment.merge(Env::prefixed("VERDICT_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
