//! The session handler.
//!
//! [`Orchestrator::start`] returns the receiving end of a session's event
//! stream and drives the session on a background task:
//!
//! ```text
//!  0 received ─ cache check ──hit──▶ cached (terminal)
//!  1 pre-fill search       (firewall 1)
//!  2 triangulation         (firewall 2) ─▶ constraint clause
//!  3 intent classification
//!  4 mode selected
//!  5 role execution        (ModeDispatcher)
//!  6 dual-model review     (firewall 3)
//!  7 correction review     (firewall 4)
//!  8 post-hoc audit        (firewall 5)
//!  9 extended analyses
//! 10 report assembly
//! 11 cache write
//! 12 done ─▶ complete (terminal)
//! ```
//!
//! Anything escaping the drive task, a panic included, becomes one
//! `error` event with code `ANALYSIS_FAILED`.

use crate::analysis::{self, AnalysisInput};
use crate::config::{DepthPresets, ResourceProfile, VerdictConfig};
use crate::degrade::degrade_opt;
use crate::dispatch::ModeDispatcher;
use crate::error::{ConfigError, StreamError, VerdictError};
use crate::executor::RoleExecutor;
use crate::firewall::{FirewallContext, FirewallId, VerificationPipeline, constraint_clause};
use crate::intent::{Intent, parse_intent};
use crate::progress::ProgressTracker;
use crate::report::{ReportInput, compose_report};
use crate::roles::{INTENT_CLASSIFIER, RoleRegistry};
use crate::services::Services;
use crate::session::ExecutionSession;
use crate::stream::{ANALYSIS_FAILED, StreamEmitter, StreamEvent};
use crate::types::{AnalysisRequest, AnalysisResult, Depth, RoleStatus, Style};
use chrono::{Datelike, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Error code sent when a request carries no usable input.
pub const MISSING_USER_INPUT: &str = "MISSING_USER_INPUT";

type SharedEmitter = Arc<Mutex<StreamEmitter>>;

pub struct Orchestrator {
    services: Arc<Services>,
    dispatcher: ModeDispatcher,
    depth: DepthPresets,
    profile: ResourceProfile,
    default_depth: Depth,
    default_style: Style,
    cache_enabled: bool,
}

impl Orchestrator {
    /// Build an orchestrator, validating `config` against the service roster.
    pub fn new(services: Arc<Services>, config: &VerdictConfig) -> Result<Self, ConfigError> {
        config.validate(&services.roles)?;
        Ok(Self {
            dispatcher: ModeDispatcher::new(
                services.roles.clone(),
                config.orchestration.clone(),
                config.profile.clone(),
            ),
            depth: config.depth.clone(),
            profile: config.profile.clone(),
            default_depth: config.orchestration.default_depth,
            default_style: config.orchestration.default_style,
            cache_enabled: config.cache.enabled,
            services,
        })
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.services.roles
    }

    /// Start a session and return its event stream.
    pub fn start(self: &Arc<Self>, request: AnalysisRequest) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (emitter, rx) = StreamEmitter::channel();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_session(request, emitter).await });
        rx
    }

    /// Start a session and wait for its terminal event.
    pub async fn run_to_completion(
        self: &Arc<Self>,
        request: AnalysisRequest,
    ) -> Result<AnalysisResult, VerdictError> {
        let mut rx = self.start(request);
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Progress { .. } => {}
                StreamEvent::Cached { result } | StreamEvent::Complete { result } => {
                    return Ok(*result);
                }
                StreamEvent::Error { code, message } => {
                    return Err(VerdictError::SessionTask {
                        message: format!("{code}: {message}"),
                    });
                }
            }
        }
        Err(VerdictError::Stream(StreamError::Closed))
    }

    async fn run_session(self: Arc<Self>, request: AnalysisRequest, mut emitter: StreamEmitter) {
        let Some(input) = request.input().map(str::to_string) else {
            let _ = emitter.error(MISSING_USER_INPUT, "userInput is required");
            return;
        };
        // The fingerprint is the input exactly as received.
        let fingerprint = request.user_input.clone().unwrap_or_default();

        if self.cache_enabled
            && request.use_cache
            && let Some(hit) = self.services.cache.get(&fingerprint).await
        {
            info!("Serving cached analysis");
            if let Err(e) = emitter.cached(hit) {
                debug!(error = %e, "Observer gone before cached result");
            }
            return;
        }

        let emitter: SharedEmitter = Arc::new(Mutex::new(emitter));
        let drive = {
            let this = Arc::clone(&self);
            let emitter = Arc::clone(&emitter);
            tokio::spawn(async move { this.drive(request, input, fingerprint, emitter).await })
        };

        let failure = match drive.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) if e.is_panic() => Some("session task panicked".to_string()),
            Err(_) => Some("session task was cancelled".to_string()),
        };

        if let Some(message) = failure {
            error!(error = %message, "Analysis failed");
            let mut emitter = emitter.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !emitter.is_closed() {
                let _ = emitter.error(ANALYSIS_FAILED, message);
            }
        }
    }

    fn announce(
        emitter: &SharedEmitter,
        tracker: &mut ProgressTracker,
        step: u8,
        roles: BTreeMap<String, RoleStatus>,
    ) {
        if let Err(e) = tracker.start_step(step) {
            debug!(error = %e, "Ignoring progress error");
        }
        let mut emitter = emitter.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = emitter.progress(step, tracker.elapsed_ms(), roles) {
            debug!(step, error = %e, "Progress event not delivered");
        }
    }

    async fn drive(
        self: Arc<Self>,
        request: AnalysisRequest,
        input: String,
        fingerprint: String,
        emitter: SharedEmitter,
    ) -> Result<(), VerdictError> {
        let depth = request.depth.unwrap_or(self.default_depth);
        let style = request.style.unwrap_or(self.default_style);
        let preset = self.depth.preset(depth);
        let mut tracker = ProgressTracker::new();
        info!(%depth, %style, "Analysis started");

        // Fresh circuit breakers for every session.
        let services = Arc::new(self.services.scoped());
        let pipeline = VerificationPipeline::from_services(&services);

        Self::announce(&emitter, &mut tracker, 0, BTreeMap::new());

        // Steps 1-2: grounding before any role runs.
        let mut ctx = FirewallContext::new(input.clone(), preset.search_results);
        let grounding = pipeline
            .run_sequence(
                &[FirewallId::Search, FirewallId::Triangulation],
                &mut ctx,
                |id| Self::announce(&emitter, &mut tracker, id.progress_step(), BTreeMap::new()),
            )
            .await;

        let session = Arc::new(
            ExecutionSession::new(input.clone(), depth, style)
                .with_constraint_clause(Some(constraint_clause(&ctx))),
        );
        for result in grounding {
            session.push_verification(result);
        }
        let executor = RoleExecutor::new(Arc::clone(&session), services);

        // Step 3: intent.
        Self::announce(&emitter, &mut tracker, 3, session.status_snapshot());
        let raw_intent = executor.execute(INTENT_CLASSIFIER, None, &input, false).await;
        let intent = parse_intent(&raw_intent).unwrap_or_else(|| {
            debug!("Intent output unparseable; defaulting to reverse");
            Intent::default()
        });

        // Step 4-5: mode dispatch.
        Self::announce(&emitter, &mut tracker, 4, session.status_snapshot());
        info!(mode = %intent.mode, project = %intent.project, "Mode selected");
        Self::announce(&emitter, &mut tracker, 5, session.status_snapshot());
        let outcome = self
            .dispatcher
            .dispatch(intent.mode, &executor, &input, &intent.project, preset.max_roles)
            .await;
        if outcome.mode != intent.mode {
            warn!(requested = %intent.mode, effective = %outcome.mode, "Mode fell back");
        }

        // Steps 6-8: post-aggregation firewalls.
        ctx.aggregated = outcome.aggregated.clone();
        ctx.cross_validations = session.cross_validations();
        ctx.corrections = session.corrections();
        let checks = pipeline
            .run_sequence(
                &[FirewallId::DualModel, FirewallId::Correction, FirewallId::Audit],
                &mut ctx,
                |id| {
                    Self::announce(
                        &emitter,
                        &mut tracker,
                        id.progress_step(),
                        session.status_snapshot(),
                    )
                },
            )
            .await;
        for result in checks {
            session.push_verification(result);
        }

        // Step 9: extended analyses.
        Self::announce(&emitter, &mut tracker, 9, session.status_snapshot());
        let analyses = analysis::run_all(&AnalysisInput {
            raw_input: &input,
            aggregated: &outcome.aggregated,
            evidence: &ctx.evidence,
            profile: &self.profile,
            current_year: Utc::now().year(),
        });

        // Step 10: report.
        Self::announce(&emitter, &mut tracker, 10, session.status_snapshot());
        let verification = session.verification();
        let report = degrade_opt(
            "report assembly",
            compose_report(&ReportInput {
                mode: outcome.mode,
                intent: &intent,
                raw_input: &input,
                aggregated: &outcome.aggregated,
                verification: &verification,
                analyses: &analyses,
                explain_terms: request.explain_terms,
            }),
        )
        .unwrap_or_default();

        let result = AnalysisResult {
            session_id: session.id,
            mode: outcome.mode,
            intent,
            report,
            aggregated_content: outcome.aggregated,
            contributions: outcome.contributions,
            role_statuses: session.status_snapshot(),
            verification,
            analyses,
            depth,
            style,
            elapsed_ms: tracker.elapsed_ms(),
            created_at: Utc::now(),
        };

        // Step 11: cache write, regardless of whether the read was bypassed.
        Self::announce(&emitter, &mut tracker, 11, session.status_snapshot());
        if self.cache_enabled && result.has_content() {
            self.services.cache.put(&fingerprint, &result).await;
        }

        Self::announce(&emitter, &mut tracker, 12, result.role_statuses.clone());
        info!(
            mode = %result.mode,
            elapsed_ms = tracker.elapsed_ms(),
            contributions = result.contributions.len(),
            "Analysis complete"
        );

        let mut emitter = emitter.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match emitter.complete(result) {
            Ok(()) | Err(StreamError::Disconnected) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{SearchProvider, SearchResults};
    use crate::error::CollaboratorError;
    use crate::providers::MockModelBackend;
    use crate::types::Mode;
    use async_trait::async_trait;

    struct PanickingSearch;

    #[async_trait]
    impl SearchProvider for PanickingSearch {
        async fn search(&self, _query: &str, _limit: usize) -> Result<SearchResults, CollaboratorError> {
            panic!("search backend crashed");
        }
    }

    fn orchestrator(backend: MockModelBackend, config: &VerdictConfig) -> Arc<Orchestrator> {
        let services = Arc::new(Services::with_backend(config, Arc::new(backend)).unwrap());
        Arc::new(Orchestrator::new(services, config).unwrap())
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = VerdictConfig::default();
        config.orchestration.synthesis_role = "ghost".into();
        let services = Arc::new(
            Services::with_backend(&VerdictConfig::default(), Arc::new(MockModelBackend::new()))
                .unwrap(),
        );
        assert!(Orchestrator::new(services, &config).is_err());
    }

    #[tokio::test]
    async fn test_missing_input_yields_single_error() {
        let orch = orchestrator(MockModelBackend::with_response("x"), &VerdictConfig::default());
        let events = collect(orch.start(AnalysisRequest::default())).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::Error { code, .. } if code == MISSING_USER_INPUT
        ));
    }

    #[tokio::test]
    async fn test_full_session_reaches_terminal_step() {
        let backend = MockModelBackend::with_response("分析：项目可行，ROI 约 12%")
            .respond_when("识别用户意图", r#"{"mode":"forward","project":""}"#);
        let orch = orchestrator(backend, &VerdictConfig::default());
        let events = collect(orch.start(AnalysisRequest::new("我有13万资金想做光伏项目"))).await;

        let steps: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(steps, (0..=12).collect::<Vec<u8>>());

        match events.last() {
            Some(StreamEvent::Complete { result }) => {
                assert_eq!(result.mode, Mode::Forward);
                assert!(!result.report.is_empty());
                assert_eq!(result.verification.len(), 5);
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let backend = MockModelBackend::with_response("分析内容");
        let orch = orchestrator(backend, &VerdictConfig::default());
        let first = orch
            .run_to_completion(AnalysisRequest::new("开一家社区咖啡店"))
            .await
            .unwrap();

        let events = collect(orch.start(AnalysisRequest::new("开一家社区咖啡店"))).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Cached { result } => assert_eq!(result.session_id, first.session_id),
            other => panic!("expected cached, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_use_cache_false_bypasses_read() {
        let orch = orchestrator(MockModelBackend::with_response("分析内容"), &VerdictConfig::default());
        orch.run_to_completion(AnalysisRequest::new("开店")).await.unwrap();
        let mut request = AnalysisRequest::new("开店");
        request.use_cache = false;
        let events = collect(orch.start(request)).await;
        assert!(matches!(events.last(), Some(StreamEvent::Complete { .. })));
        assert!(events.len() > 1);
    }

    #[tokio::test]
    async fn test_panicking_stage_ends_with_single_failure_event() {
        let config = VerdictConfig::default();
        let mut services =
            Services::with_backend(&config, Arc::new(MockModelBackend::with_response("x"))).unwrap();
        services.search = Arc::new(PanickingSearch);
        let orch = Arc::new(Orchestrator::new(Arc::new(services), &config).unwrap());

        let events = collect(orch.start(AnalysisRequest::new("开一家社区咖啡店"))).await;
        let steps: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![0, 1]);

        let terminals: Vec<_> = events
            .iter()
            .filter(|e| !matches!(e, StreamEvent::Progress { .. }))
            .collect();
        assert_eq!(terminals.len(), 1);
        match events.last() {
            Some(StreamEvent::Error { code, message }) => {
                assert_eq!(code, ANALYSIS_FAILED);
                assert_eq!(message, "session task panicked");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_model_outage_does_not_carry_into_next_session() {
        let mut config = VerdictConfig::default();
        config.orchestration.correction_enabled = false;
        config.cache.enabled = false;
        let backend = Arc::new(MockModelBackend::with_response("分析：项目可行").fail_first(9));
        let services = Arc::new(Services::with_backend(&config, backend.clone()).unwrap());
        let orch = Arc::new(Orchestrator::new(services, &config).unwrap());

        orch.run_to_completion(AnalysisRequest::new("开一家社区咖啡店"))
            .await
            .unwrap();
        let calls_after_first = backend.call_count();

        let second = orch
            .run_to_completion(AnalysisRequest::new("开一家社区咖啡店"))
            .await
            .unwrap();
        assert!(backend.call_count() > calls_after_first);
        assert!(!second.aggregated_content.is_empty());
        assert!(second
            .role_statuses
            .values()
            .any(|s| s.state == crate::types::RoleState::Completed));
    }
}
