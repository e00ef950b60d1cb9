//! `stride init`: First-time setup.

use stride_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Stride — First-Time Setup");
    println!("=========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    // Where the agent's tools will operate unless `workspace.root` says otherwise.
    let workspace_dir = AppConfig::default().workspace_dir();
    if !workspace_dir.exists() {
        std::fs::create_dir_all(&workspace_dir)?;
        println!("  Created workspace directory: {}", workspace_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run `stride init`.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set STRIDE_API_KEY (or OPENAI_API_KEY), or add api_key to the config");
    println!("  2. Optionally add more [backends.*] and enable [moa]");
    println!("  3. Run: stride agent\n");

    Ok(())
}
