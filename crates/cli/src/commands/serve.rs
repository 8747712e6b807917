//! `aether serve`: start the HTTP gateway.

use super::load_config;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set AETHER_API_KEY or OPENAI_API_KEY, or add api_key to:");
        eprintln!("    {}", aether_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    println!("Aether Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Upstream:  {} ({})", config.provider.base_url, config.default_model);
    println!("   Store:     {:?}", config.store.backend);

    aether_gateway::start(config).await?;

    Ok(())
}
