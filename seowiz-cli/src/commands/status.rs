use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use seowiz_core::{RunState, SnapshotStore, StepCatalog, StepStatus, WizardConfig, WizardError};

use crate::output::{print_log, progress_bar};

pub async fn cmd_status(site: Option<&str>, format: &str, logs: usize) -> Result<()> {
    let config = WizardConfig::load().map_err(WizardError::from)?;
    let store = SnapshotStore::from_config(&config.storage)?;

    match site {
        Some(site) => {
            let state = store.load(site).await?;
            show_run(&state, format, logs)
        }
        None => list_runs(&store, format).await,
    }
}

fn show_run(state: &RunState, format: &str, logs: usize) -> Result<()> {
    match format.to_lowercase().as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(state)?);
            return Ok(());
        }
        "yaml" => {
            print!("{}", serde_yaml::to_string(state)?);
            return Ok(());
        }
        _ => {}
    }

    let catalog = StepCatalog::default();

    println!("{} {}", "Setup run for".cyan().bold(), state.site_id.yellow());
    println!("{}", "═".repeat(40).dimmed());
    println!("  {:<12} {}", "Run:".bold(), state.run_id);
    println!("  {:<12} {}", "Progress:".bold(), progress_bar(state.progress));
    println!(
        "  {:<12} {}",
        "State:".bold(),
        run_label(state)
    );
    if let Some(phase) = state.current_phase {
        println!("  {:<12} {}", "Phase:".bold(), phase.label());
    }
    if let Some(started) = state.started_at {
        println!(
            "  {:<12} {}",
            "Started:".bold(),
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(finished) = state.finished_at {
        println!(
            "  {:<12} {}",
            "Finished:".bold(),
            finished.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Phase").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
        ]);

    for (index, step) in catalog.iter().enumerate() {
        let status = state.status_of(step.id);
        table.add_row(vec![
            Cell::new(index),
            Cell::new(step.id),
            Cell::new(step.phase.label()),
            Cell::new(status.to_string()).fg(status_color(status)),
        ]);
    }
    println!("{table}");

    if let Some(failed) = &state.failed_step {
        println!();
        println!(
            "  {} {} ({}): {}",
            "Failed step:".red().bold(),
            failed.title,
            failed.id,
            failed.error
        );
    }

    if logs > 0 && !state.logs.is_empty() {
        println!();
        println!("  {}", "Recent log".yellow().bold());
        let skip = state.logs.len().saturating_sub(logs);
        for entry in state.logs.iter().skip(skip) {
            print_log(entry);
        }
    }

    Ok(())
}

async fn list_runs(store: &SnapshotStore, format: &str) -> Result<()> {
    let sites = store.list().await?;
    let mut states = Vec::with_capacity(sites.len());
    for site in &sites {
        states.push(store.load(site).await?);
    }

    if format.eq_ignore_ascii_case("json") {
        let summary: Vec<_> = states
            .iter()
            .map(|s| {
                serde_json::json!({
                    "site_id": s.site_id,
                    "progress": s.progress,
                    "is_running": s.is_running,
                    "setup_complete": s.setup_complete,
                    "failed_step": s.failed_step.as_ref().map(|f| &f.id),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if states.is_empty() {
        println!(
            "{} No saved runs in {}",
            "→".blue(),
            store.dir().display()
        );
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Site").fg(Color::Cyan),
            Cell::new("Progress").fg(Color::Cyan),
            Cell::new("State").fg(Color::Cyan),
            Cell::new("Finished").fg(Color::Cyan),
        ]);

    for state in &states {
        table.add_row(vec![
            Cell::new(&state.site_id),
            Cell::new(format!("{}%", state.progress)),
            Cell::new(run_label(state).to_string()),
            Cell::new(
                state
                    .finished_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn run_label(state: &RunState) -> colored::ColoredString {
    if state.is_running {
        "running".cyan()
    } else if let Some(failed) = &state.failed_step {
        format!("halted at {}", failed.id).red()
    } else if state.setup_complete {
        if state.count_with_status(StepStatus::Skipped) > 0 && state.progress < 100 {
            "skipped".yellow()
        } else {
            "complete".green()
        }
    } else if state.started_at.is_some() {
        "stopped".yellow()
    } else {
        "not started".dimmed()
    }
}

fn status_color(status: StepStatus) -> Color {
    match status {
        StepStatus::Pending => Color::DarkGrey,
        StepStatus::Running => Color::Cyan,
        StepStatus::Completed => Color::Green,
        StepStatus::Error => Color::Red,
        StepStatus::Skipped => Color::Yellow,
    }
}
