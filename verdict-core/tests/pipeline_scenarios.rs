//! End-to-end session scenarios driven by a scripted model backend.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use verdict_core::firewall::FirewallId;
use verdict_core::{
    AnalysisRequest, AnalysisResult, MockModelBackend, ModelBackend, Mode, Orchestrator, RoleState,
    Services, StreamEvent, VerdictConfig,
};

const SOLAR: &str = "我有13万资金想做光伏项目";

fn orchestrator_with(backend: Arc<dyn ModelBackend>, config: VerdictConfig) -> Arc<Orchestrator> {
    let services = Services::with_backend(&config, backend).unwrap();
    Arc::new(Orchestrator::new(Arc::new(services), &config).unwrap())
}

fn orchestrator(backend: MockModelBackend) -> Arc<Orchestrator> {
    orchestrator_with(Arc::new(backend), VerdictConfig::default())
}

async fn events_for(orch: &Arc<Orchestrator>, request: AnalysisRequest) -> Vec<StreamEvent> {
    let mut rx = orch.start(request);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn uncached(input: &str) -> AnalysisRequest {
    AnalysisRequest {
        use_cache: false,
        ..AnalysisRequest::new(input)
    }
}

fn completed(events: &[StreamEvent]) -> &AnalysisResult {
    match events.last() {
        Some(StreamEvent::Complete { result }) => result,
        other => panic!("expected a complete event, got {other:?}"),
    }
}

fn progress_steps(events: &[StreamEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Progress { step, .. } => Some(*step),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_solar_question_runs_to_completion() {
    let backend = MockModelBackend::with_response(
        "## 可行性\n\n屋顶光伏总投资约 12 万元，2024 年补贴政策稳定，预计 ROI 约 11%。",
    );
    let orch = orchestrator(backend);
    let events = events_for(&orch, uncached(SOLAR)).await;

    let steps = progress_steps(&events);
    assert_eq!(steps.first(), Some(&0));
    assert_eq!(steps.last(), Some(&12));
    assert!(steps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let result = completed(&events);
    assert!(matches!(result.mode, Mode::Forward | Mode::Reverse | Mode::Mixed));
    assert!(!result.report.is_empty());
    assert!(result.report.contains("## 验证摘要"));
    let firewalls: Vec<u8> = result.verification.iter().map(|v| v.firewall).collect();
    assert_eq!(firewalls, vec![1, 2, 3, 4, 5]);
    assert!(result.analyses.constraints.is_some());
}

#[tokio::test]
async fn test_unparseable_intent_defaults_to_reverse() {
    let orch = orchestrator(MockModelBackend::with_response("我也说不清"));
    let events = events_for(&orch, uncached(SOLAR)).await;
    let result = completed(&events);
    assert_eq!(result.mode, Mode::Reverse);
    assert_eq!(result.intent.project, "");
}

#[tokio::test]
async fn test_every_model_down_still_completes() {
    // No responses configured: every call fails and every chain exhausts.
    let orch = orchestrator(MockModelBackend::new());
    let events = events_for(&orch, uncached(SOLAR)).await;

    let steps = progress_steps(&events);
    assert_eq!(steps.last(), Some(&12));
    let result = completed(&events);
    assert!(result.contributions.is_empty());
    assert!(result.report.is_empty());
    assert!(
        result
            .role_statuses
            .values()
            .all(|s| s.state == RoleState::Failed)
    );

    // Nothing was cached, so the next request runs the full pipeline again.
    let again = events_for(&orch, AnalysisRequest::new(SOLAR)).await;
    assert!(matches!(again.last(), Some(StreamEvent::Complete { .. })));
}

#[tokio::test]
async fn test_primary_model_outage_falls_back_down_the_chain() {
    let backend = MockModelBackend::with_response("## 结论\n\n可以做。").fail_model("deepseek-chat");
    let orch = orchestrator(backend);
    let result = completed(&events_for(&orch, uncached(SOLAR)).await).clone();
    assert!(result.has_content());
    assert!(
        result
            .role_statuses
            .values()
            .any(|s| s.state == RoleState::Completed)
    );
}

#[tokio::test]
async fn test_mixed_mode_uses_synthesis_conclusion() {
    let backend = MockModelBackend::with_response("分角色分析内容")
        .respond_when("识别用户意图", r#"{"mode":"mixed","project":"屋顶光伏"}"#)
        .respond_when("【逆向分析：评估目标项目】", "综合结论：先做屋顶光伏试点");
    let orch = orchestrator(backend);
    let result = completed(&events_for(&orch, uncached(SOLAR)).await).clone();

    assert_eq!(result.mode, Mode::Mixed);
    assert_eq!(result.intent.mode, Mode::Mixed);
    assert_eq!(result.aggregated_content, "综合结论：先做屋顶光伏试点");
    assert_eq!(
        result.contributions.last().map(|c| c.role_id.as_str()),
        Some("strategist")
    );
}

#[tokio::test]
async fn test_mixed_mode_falls_back_to_reverse_when_synthesis_fails() {
    let backend = MockModelBackend::with_response("分角色分析内容")
        .respond_when("识别用户意图", r#"{"mode":"mixed","project":"屋顶光伏"}"#)
        .respond_when("【逆向分析：评估目标项目】", "   ");
    let orch = orchestrator(backend);
    let result = completed(&events_for(&orch, uncached(SOLAR)).await).clone();

    assert_eq!(result.mode, Mode::Reverse);
    // The classification itself is reported unchanged.
    assert_eq!(result.intent.mode, Mode::Mixed);
    assert!(result.has_content());
}

#[tokio::test]
async fn test_cache_hit_short_circuits_second_request() {
    let backend = Arc::new(MockModelBackend::with_response("## 结论\n\n可以做。"));
    let orch = orchestrator_with(backend.clone(), VerdictConfig::default());

    let first = orch.run_to_completion(uncached(SOLAR)).await.unwrap();
    let calls_after_first = backend.call_count();

    let events = events_for(&orch, AnalysisRequest::new(SOLAR)).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Cached { result } => assert_eq!(**result, first),
        other => panic!("expected cached, got {other:?}"),
    }
    assert_eq!(backend.call_count(), calls_after_first);
}

#[tokio::test]
async fn test_disabled_cache_never_short_circuits() {
    let mut config = VerdictConfig::default();
    config.cache.enabled = false;
    let orch = orchestrator_with(Arc::new(MockModelBackend::with_response("内容")), config);

    orch.run_to_completion(AnalysisRequest::new(SOLAR)).await.unwrap();
    let events = events_for(&orch, AnalysisRequest::new(SOLAR)).await;
    assert!(events.len() > 1);
    assert!(matches!(events.last(), Some(StreamEvent::Complete { .. })));
}

#[tokio::test]
async fn test_search_disabled_fails_grounding_firewalls_without_aborting() {
    let orch = orchestrator(MockModelBackend::with_response("内容"));
    let result = orch.run_to_completion(uncached(SOLAR)).await.unwrap();

    let search = result
        .verification
        .iter()
        .find(|v| v.firewall == FirewallId::Search.number())
        .unwrap();
    let triangulation = result
        .verification
        .iter()
        .find(|v| v.firewall == FirewallId::Triangulation.number())
        .unwrap();
    assert!(!search.passed);
    assert!(!triangulation.passed);
    assert!(result.has_content());
}
