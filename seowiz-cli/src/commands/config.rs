use anyhow::Result;
use colored::Colorize;
use seowiz_core::{get_config_dir, WizardConfig, WizardError};

pub fn cmd_config(format: &str) -> Result<()> {
    let mut config = WizardConfig::load().map_err(WizardError::from)?;
    if let Some(key) = config.api.api_key.as_mut() {
        *key = mask_secret(key);
    }

    match format.to_lowercase().as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        "yaml" => {
            print!("{}", serde_yaml::to_string(&config)?);
            return Ok(());
        }
        _ => {}
    }

    println!("{}", "Seowiz Configuration".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());

    println!("  {}", "API".yellow().bold());
    println!("    {:<22} {}", "Base URL:", config.api.base_url);
    println!("    {:<22} {}", "Functions path:", config.api.functions_path);
    println!("    {:<22} {}", "Job status endpoint:", config.api.job_status_endpoint);
    println!("    {:<22} {}", "Completion endpoint:", config.api.complete_endpoint);
    println!(
        "    {:<22} {}",
        "API key:",
        config.api.api_key.as_deref().unwrap_or("(not set)")
    );
    println!("    {:<22} {}s", "Request timeout:", config.api.timeout_secs);
    println!();

    println!("  {}", "Polling".yellow().bold());
    println!("    {:<22} {}ms", "Default interval:", config.polling.default_interval_ms);
    println!("    {:<22} {}", "Default attempts:", config.polling.default_max_attempts);
    println!();

    println!("  {}", "Progress".yellow().bold());
    println!(
        "    {:<22} {}% - {}%",
        "Parallel band:", config.progress.parallel_start, config.progress.parallel_end
    );
    println!("    {:<22} {}ms", "Sample interval:", config.progress.sample_interval_ms);
    println!();

    println!("  {}", "Logging".yellow().bold());
    println!("    {:<22} {}", "Level:", config.logging.level);
    println!("    {:<22} {}", "JSON output:", config.logging.json_format);
    println!();

    println!("  {}", "Storage".yellow().bold());
    println!(
        "    {:<22} {}",
        "Snapshots:",
        config
            .storage
            .snapshot_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(unavailable)".to_string())
    );
    if let Some(dir) = get_config_dir() {
        println!(
            "    {:<22} {}",
            "Config file:",
            dir.join("config.toml").display()
        );
    }

    Ok(())
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}
