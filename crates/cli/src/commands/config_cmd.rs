//! `stride config`: Configuration management commands.

use stride_config::{AppConfig, ConfigError};

const REDACTED: &str = "***";

pub fn validate(loaded: Result<AppConfig, ConfigError>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed and validated");

    let mut warnings = Vec::new();
    if !config.moa.enabled && !config.has_api_key() {
        warnings.push(format!(
            "No API key for backend '{}' (set STRIDE_API_KEY or OPENAI_API_KEY)",
            config.default_backend
        ));
    }
    if config.agent.auto_approve {
        warnings.push("agent.auto_approve is on: file writes and shell commands run unconfirmed".to_string());
    }
    for w in &warnings {
        println!("   Warning: {w}");
    }

    println!();
    if config.moa.enabled {
        println!("   Strategy:   mixture of agents");
        println!("   References: {}", config.moa.references.join(", "));
        println!("   Aggregator: {}", config.moa.aggregator_key().unwrap_or("-"));
        println!("   Layers:     {}", config.moa.num_layers);
    } else {
        println!("   Strategy:   single backend '{}'", config.default_backend);
    }
    println!("   Max turns:  {}", config.agent.max_turns);
    println!("   Tool concurrency: {}", config.agent.tool_concurrency);
    println!("   Workspace:  {}", config.workspace_dir().display());

    Ok(())
}

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    for backend in config.backends.values_mut() {
        if backend.api_key.is_some() {
            backend.api_key = Some(REDACTED.into());
        }
    }
    config
}
