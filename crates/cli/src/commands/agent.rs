//! `stride agent`: Interactive or single-instruction runs.

use std::sync::Arc;
use stride_agent::{
    AGENT_INTERRUPTED_MESSAGE, AgentDriver, DriverSettings, JsonlPersistenceSubscriber, RunOutcome,
    RunStatus, TRUNCATION_MESSAGE, ToolDispatcher, TracingSubscriber,
};
use stride_config::AppConfig;
use stride_core::event::EventBus;
use stride_core::runtime::{LocalRuntime, SandboxRuntime};
use stride_core::tool::{AutoApprove, ConfirmationGate};
use stride_providers::{GenerationStrategy, build_from_config, build_strategy};
use tracing::{info, warn};

use crate::console::{ConsoleGate, ConsoleInput};

pub async fn run(
    config: AppConfig,
    message: Option<String>,
    auto_approve: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Check for an API key early and give a clear error
    if !config.moa.enabled && !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured for backend '{}'!", config.default_backend);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    STRIDE_API_KEY = 'sk-...'   (generic)");
        eprintln!("    OPENAI_API_KEY = 'sk-...'   (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let runtime = LocalRuntime::new(config.workspace_dir());
    runtime.create().await?;
    runtime.start().await?;

    let router = build_from_config(&config)?;
    let strategy = build_strategy(&config, &router)?;

    let input = ConsoleInput::new();
    let gate: Arc<dyn ConfirmationGate> = if auto_approve || config.agent.auto_approve {
        Arc::new(AutoApprove)
    } else {
        Arc::new(ConsoleGate::new(input.clone()))
    };

    let registry = Arc::new(stride_tools::default_registry(runtime.workspace_root())?);
    let tool_names = registry.names().join(", ");
    let dispatcher = ToolDispatcher::from_config(registry, &config.agent).with_confirmation_gate(gate);

    let bus = EventBus::new();
    bus.subscribe(Arc::new(TracingSubscriber));
    if let Some(path) = &config.persistence.events_path {
        bus.subscribe_async(Arc::new(JsonlPersistenceSubscriber::new(path)));
        info!(path = %path.display(), "Persisting events");
    }

    let mut driver = AgentDriver::new(strategy.provider(), dispatcher, bus.clone())
        .with_settings(DriverSettings::from_config(&config.agent));

    // Ctrl+C interrupts the current run; the next instruction resumes.
    let signal = driver.abort_signal();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            signal.abort();
        }
    });

    if let Some(msg) = message {
        // Single instruction mode
        let outcome = driver.run(msg).await;
        report_health(&strategy);
        bus.shutdown().await;
        runtime.stop().await?;
        print_outcome(&outcome?);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Stride Agent — Interactive Mode");
    println!();
    println!("  Strategy:  {}", strategy.describe());
    println!("  Workspace: {}", runtime.workspace_root().display());
    println!("  Tools:     {tool_names}");
    println!();
    println!("  Type an instruction and press Enter.");
    println!("  Ctrl+C interrupts the agent; type 'exit' to quit.");
    println!();

    while let Some(line) = input.read_line("  You > ").await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match driver.run(line).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    report_health(&strategy);
    bus.shutdown().await;
    runtime.stop().await?;

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    println!();
    match outcome.status {
        RunStatus::Completed => {
            let text = outcome.final_text.as_deref().unwrap_or("(no answer)");
            for line in text.lines() {
                println!("  Agent > {line}");
            }
        }
        RunStatus::Truncated => println!("  [Stopped] {TRUNCATION_MESSAGE} ({} turns)", outcome.turns),
        RunStatus::Interrupted => println!("  [Interrupted] {AGENT_INTERRUPTED_MESSAGE}"),
    }
    println!();
}

fn report_health(strategy: &GenerationStrategy) {
    for health in strategy.health_report() {
        if health.failures > 0 {
            warn!(
                backend = %health.backend,
                successes = health.successes,
                failures = health.failures,
                retries = health.retries,
                last_error = health.last_error.as_deref().unwrap_or("-"),
                "Backend health"
            );
        } else {
            info!(
                backend = %health.backend,
                successes = health.successes,
                retries = health.retries,
                "Backend health"
            );
        }
    }
}
