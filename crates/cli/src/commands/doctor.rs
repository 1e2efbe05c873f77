//! `studykit doctor` — Diagnose setup problems.

use studykit_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 StudyKit Doctor — Setup Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    // Check config file
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found");
    } else {
        println!("  ⚠️  No config file — run `studykit onboard` (defaults in effect)");
        issues += 1;
    }

    // Check configuration
    match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");

            if config.has_api_key() {
                println!("  ✅ API key configured");
            } else {
                println!("  ❌ No API key — set STUDYKIT_API_KEY or add api_key to config.toml");
                issues += 1;
            }

            if config.store.backend == "sqlite" {
                println!("  ✅ Store: sqlite at {}", config.store.path);
            } else {
                println!("  ✅ Store: memory (state is lost on restart)");
            }
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
