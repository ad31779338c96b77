//! Collaborators a session reaches outside its own state.
//!
//! Search, triangulation, tuning, and the cache are process-wide. The model
//! invoker and everything built on it are rebuilt per session by
//! [`Services::scoped`], so circuit breaker state never crosses sessions.

use crate::cache::{InMemoryCacheStore, SessionCache};
use crate::collaborators::{
    Auditor, Corrector, CrossValidator, EvidenceTriangulator, HttpSearchProvider, ModelAuditor,
    ModelCorrector, ModelCrossValidator, NoopSearchProvider, PromptTuning, SearchProvider,
    StaticPromptTuning, Triangulator,
};
use crate::config::VerdictConfig;
use crate::error::ConfigError;
use crate::providers::{ChainInvoker, ModelBackend, ModelInvoker, create_backend};
use crate::roles::{QUALITY_AUDITOR, Role, RoleRegistry, default_model_chain};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything a session reaches outside its own state.
///
/// Fields are public so tests and embedders can swap single collaborators.
#[derive(Clone)]
pub struct Services {
    pub roles: Arc<RoleRegistry>,
    pub invoker: Arc<dyn ModelInvoker>,
    pub cross_validator: Arc<dyn CrossValidator>,
    pub search: Arc<dyn SearchProvider>,
    pub triangulator: Arc<dyn Triangulator>,
    /// `None` when real-time correction is disabled.
    pub corrector: Option<Arc<dyn Corrector>>,
    pub auditor: Arc<dyn Auditor>,
    pub tuning: Arc<dyn PromptTuning>,
    pub cache: SessionCache,
    models: ModelWiring,
}

/// What it takes to rebuild the model-backed collaborators.
#[derive(Clone)]
struct ModelWiring {
    backend: Arc<dyn ModelBackend>,
    failure_threshold: usize,
    recovery_timeout: Duration,
    correction_chain: Option<Vec<String>>,
    auditor_role: Role,
}

struct ModelCollaborators {
    invoker: Arc<dyn ModelInvoker>,
    cross_validator: Arc<dyn CrossValidator>,
    corrector: Option<Arc<dyn Corrector>>,
    auditor: Arc<dyn Auditor>,
}

impl ModelWiring {
    fn build(&self) -> ModelCollaborators {
        let invoker: Arc<dyn ModelInvoker> = Arc::new(ChainInvoker::new(
            self.backend.clone(),
            self.failure_threshold,
            self.recovery_timeout,
        ));
        let corrector = self.correction_chain.as_ref().map(|chain| {
            Arc::new(ModelCorrector::new(invoker.clone(), chain.clone())) as Arc<dyn Corrector>
        });
        ModelCollaborators {
            cross_validator: Arc::new(ModelCrossValidator::new(invoker.clone())),
            auditor: Arc::new(ModelAuditor::new(invoker.clone(), &self.auditor_role)),
            corrector,
            invoker,
        }
    }
}

impl Services {
    /// Wire the default collaborators over the configured HTTP backend.
    pub fn from_config(config: &VerdictConfig) -> Result<Self, ConfigError> {
        let backend = create_backend(config)?;
        Self::with_backend(config, backend)
    }

    /// Wire the default collaborators over an explicit model backend.
    pub fn with_backend(
        config: &VerdictConfig,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<Self, ConfigError> {
        let roles = Arc::new(config.role_registry()?);

        let search: Arc<dyn SearchProvider> = if config.search.enabled {
            let provider =
                HttpSearchProvider::new(&config.search).map_err(|e| ConfigError::Invalid {
                    message: format!("search: {e}"),
                })?;
            Arc::new(provider)
        } else {
            info!("Grounding search disabled; firewall 1 will report no evidence");
            Arc::new(NoopSearchProvider)
        };

        let auditor_role = roles
            .get(QUALITY_AUDITOR)
            .ok_or_else(|| ConfigError::UnknownRole {
                role: QUALITY_AUDITOR.to_string(),
            })?
            .clone();

        let models = ModelWiring {
            backend,
            failure_threshold: config.failover.failure_threshold,
            recovery_timeout: Duration::from_secs(config.failover.recovery_secs),
            correction_chain: config
                .orchestration
                .correction_enabled
                .then(default_model_chain),
            auditor_role,
        };
        let built = models.build();

        Ok(Self {
            invoker: built.invoker,
            cross_validator: built.cross_validator,
            corrector: built.corrector,
            auditor: built.auditor,
            search,
            triangulator: Arc::new(EvidenceTriangulator),
            tuning: Arc::new(StaticPromptTuning::new(config.tuning.clone())),
            cache: SessionCache::new(Arc::new(InMemoryCacheStore::new()), config.cache.ttl_secs),
            roles,
            models,
        })
    }

    /// A copy for one session with a fresh model invoker.
    ///
    /// The invoker, cross-validator, corrector, and auditor are rebuilt over
    /// the same backend with empty circuit breakers. Other collaborators,
    /// including any swapped in by the caller, are shared.
    pub fn scoped(&self) -> Self {
        let built = self.models.build();
        Self {
            invoker: built.invoker,
            cross_validator: built.cross_validator,
            corrector: built.corrector,
            auditor: built.auditor,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockModelBackend;

    #[test]
    fn test_with_backend_defaults() {
        let config = VerdictConfig::default();
        let services =
            Services::with_backend(&config, Arc::new(MockModelBackend::with_response("x"))).unwrap();
        assert_eq!(services.roles.len(), 17);
        assert!(services.corrector.is_some());
    }

    #[test]
    fn test_correction_toggle() {
        let mut config = VerdictConfig::default();
        config.orchestration.correction_enabled = false;
        let services =
            Services::with_backend(&config, Arc::new(MockModelBackend::with_response("x"))).unwrap();
        assert!(services.corrector.is_none());
    }

    #[tokio::test]
    async fn test_scoped_invoker_starts_with_closed_circuits() {
        let mut config = VerdictConfig::default();
        config.failover.failure_threshold = 1;
        let backend = Arc::new(MockModelBackend::with_response("ok").fail_first(1));
        let services = Services::with_backend(&config, backend.clone()).unwrap();
        let chain = vec!["a".to_string(), "b".to_string()];

        // Opens the breaker for "a" on the shared invoker.
        services.invoker.invoke("r", "s", "m", &chain).await.unwrap();
        services.invoker.invoke("r", "s", "m", &chain).await.unwrap();
        assert_eq!(backend.calls(), vec!["a", "b", "b"]);

        let session = services.scoped();
        session.invoker.invoke("r", "s", "m", &chain).await.unwrap();
        assert_eq!(backend.calls(), vec!["a", "b", "b", "a"]);
    }

    #[test]
    fn test_scoped_keeps_shared_collaborators() {
        let mut config = VerdictConfig::default();
        config.orchestration.correction_enabled = false;
        let services =
            Services::with_backend(&config, Arc::new(MockModelBackend::with_response("x"))).unwrap();
        let session = services.scoped();
        assert!(Arc::ptr_eq(&services.roles, &session.roles));
        assert!(Arc::ptr_eq(&services.search, &session.search));
        assert!(!Arc::ptr_eq(&services.invoker, &session.invoker));
        assert!(session.corrector.is_none());
    }

    #[test]
    fn test_enabled_search_needs_valid_endpoint() {
        let mut config = VerdictConfig::default();
        config.search.enabled = true;
        config.search.endpoint = "nope".to_string();
        assert!(
            Services::with_backend(&config, Arc::new(MockModelBackend::with_response("x"))).is_err()
        );
    }
}
