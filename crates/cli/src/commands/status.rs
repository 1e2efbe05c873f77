//! `studykit status` — Show configuration summary.

use studykit_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("📚 StudyKit Status");
    println!("================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Chat model:   {}", config.model.chat_model);
    println!("  Embeddings:   {}", config.model.embedding_model);
    if config.store.backend == "sqlite" {
        println!("  Store:        sqlite ({})", config.store.path);
    } else {
        println!("  Store:        {}", config.store.backend);
    }
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Free TTL:     {} days", config.session.free_ttl_days);
    println!("  Token budget: {}", config.compose.token_budget);

    // Check config file existence
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `studykit onboard` first");
    }

    Ok(())
}
