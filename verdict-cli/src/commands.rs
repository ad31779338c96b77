//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use verdict_core::gateway::run_gateway;
use verdict_core::{AnalysisRequest, Orchestrator, Services, StreamEvent, VerdictConfig, load_config};

pub async fn handle_command(command: Commands, workspace: &Path, quiet: bool) -> anyhow::Result<()> {
    let mut config = load_config(Some(workspace), None).map_err(|e| {
        error!(workspace = %workspace.display(), error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    match command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let orchestrator = build_orchestrator(&config)?;
            info!(
                addr = %config.server.bind_addr(),
                roles = orchestrator.roles().len(),
                "Starting gateway"
            );
            if !quiet {
                println!("Verdict gateway on http://{}", config.server.bind_addr());
            }
            if let Err(e) = run_gateway(&config.server, orchestrator).await {
                error!(error = %e, "Gateway stopped");
                return Err(e.into());
            }
            Ok(())
        }
        Commands::Analyze {
            question,
            depth,
            style,
            no_cache,
            no_explain,
            json,
        } => {
            let orchestrator = build_orchestrator(&config)?;
            let request = AnalysisRequest {
                user_input: Some(question),
                depth,
                style,
                use_cache: !no_cache,
                explain_terms: !no_explain,
            };
            run_analysis(&orchestrator, request, json, quiet).await
        }
        Commands::Roles => {
            let registry = config.role_registry()?;
            for role in registry.all() {
                println!(
                    "{:<22} {:<10} [{}]",
                    role.id,
                    role.display_name,
                    role.model_chain.join(" -> ")
                );
            }
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml_string()?);
                Ok(())
            }
        },
    }
}

fn build_orchestrator(config: &VerdictConfig) -> anyhow::Result<Arc<Orchestrator>> {
    let services = Services::from_config(config)?;
    Ok(Arc::new(Orchestrator::new(Arc::new(services), config)?))
}

async fn run_analysis(
    orchestrator: &Arc<Orchestrator>,
    request: AnalysisRequest,
    json: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let mut rx = orchestrator.start(request);
    while let Some(event) = rx.recv().await {
        if let StreamEvent::Error { code, message } = &event {
            error!(%code, %message, "Analysis failed");
        }
        if json {
            println!("{}", serde_json::to_string(&event)?);
            if let StreamEvent::Error { code, message } = &event {
                anyhow::bail!("{code}: {message}");
            }
            continue;
        }
        match event {
            StreamEvent::Progress { .. } => {
                if !quiet && let Some(line) = progress_line(&event) {
                    eprintln!("{line}");
                }
            }
            StreamEvent::Cached { result } | StreamEvent::Complete { result } => {
                if result.report.is_empty() {
                    anyhow::bail!("no role produced any analysis; check model credentials");
                }
                println!("{}", result.report);
            }
            StreamEvent::Error { code, message } => anyhow::bail!("{code}: {message}"),
        }
    }
    Ok(())
}

/// One terminal line per progress event.
fn progress_line(event: &StreamEvent) -> Option<String> {
    match event {
        StreamEvent::Progress {
            percent,
            label,
            elapsed_ms,
            ..
        } => Some(format!(
            "[{percent:>3}%] {label} ({:.1}s)",
            *elapsed_ms as f64 / 1000.0
        )),
        _ => None,
    }
}
