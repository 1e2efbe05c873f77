//! `studykit onboard` — First-time setup.

use studykit_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("📚 StudyKit — First-Time Setup");
    println!("==============================\n");

    // Create the config directory
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    // Create the config file
    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        let default_toml = AppConfig::default_toml();
        std::fs::write(&config_path, &default_toml)?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Set STUDYKIT_API_KEY or add api_key under [model] in config.toml");
        println!("   2. Run: studykit serve");
        println!("   3. Point your client at http://127.0.0.1:8080/v1\n");
    }

    println!("🎉 Setup complete! Run `studykit serve` to start the service.\n");

    Ok(())
}
