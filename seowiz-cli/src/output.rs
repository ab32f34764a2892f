use colored::Colorize;
use seowiz_core::{FailedStep, LogEntry, LogLevel, Orchestrator, RunOutcome, WizardEvent};

const BAR_WIDTH: usize = 30;

pub fn is_json(format: &str) -> bool {
    format.eq_ignore_ascii_case("json")
}

/// Stream run events to stdout, as text or as one JSON object per line.
pub async fn attach_reporter(orchestrator: &Orchestrator, format: &str) {
    if is_json(format) {
        orchestrator
            .on_event(|event| {
                if let Ok(line) = serde_json::to_string(event) {
                    println!("{}", line);
                }
            })
            .await;
    } else {
        orchestrator.on_event(print_event).await;
    }
}

fn print_event(event: &WizardEvent) {
    match event {
        WizardEvent::PhaseStarted { label, .. } => {
            println!();
            println!("{} {}", "▶".cyan().bold(), label.cyan().bold());
        }
        WizardEvent::ProgressChanged { progress } => {
            println!("  {}", progress_bar(*progress));
        }
        WizardEvent::Log(entry) => print_log(entry),
        WizardEvent::StepStatusChanged { .. } | WizardEvent::RunFinished { .. } => {}
    }
}

pub fn print_log(entry: &LogEntry) {
    let icon = match entry.level {
        LogLevel::Info => "→".blue(),
        LogLevel::Success => "✓".green().bold(),
        LogLevel::Warning => "!".yellow().bold(),
        LogLevel::Error => "✗".red().bold(),
    };
    println!(
        "  {} {} {}",
        entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
        icon,
        entry.message
    );
}

pub fn progress_bar(progress: u8) -> String {
    let filled = (progress as usize * BAR_WIDTH) / 100;
    format!(
        "[{}{}] {:>3}%",
        "█".repeat(filled).green(),
        "░".repeat(BAR_WIDTH - filled).dimmed(),
        progress
    )
}

pub fn print_failure_panel(site_id: &str, failed: &FailedStep) {
    println!();
    println!("{}", "Setup halted".red().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!("  {:<8} {} ({})", "Step:".bold(), failed.title, failed.id);
    println!("  {:<8} {}", "Index:".bold(), failed.step_index);
    println!("  {:<8} {}", "Error:".bold(), failed.error.red());
    println!();
    println!("  {}", "What next?".yellow().bold());
    println!(
        "    {}  retry from this step",
        format!("seowiz retry --site {}", site_id).cyan()
    );
    println!(
        "    {}  restart from the beginning",
        format!("seowiz restart --site {}", site_id).cyan()
    );
    println!(
        "    {}  skip setup",
        format!("seowiz skip --site {}", site_id).cyan()
    );
}

/// Print the closing summary of a run (text format only).
pub fn print_outcome(site_id: &str, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed => {
            println!();
            println!(
                "{} {}",
                "✓".green().bold(),
                format!("SEO setup complete for {}", site_id).green()
            );
        }
        RunOutcome::Failed(failed) => print_failure_panel(site_id, failed),
        RunOutcome::Superseded => {
            println!();
            println!("{} Run was superseded by a newer run", "!".yellow().bold());
        }
        RunOutcome::AlreadyRunning => {
            println!("{} A run is already active for {}", "!".yellow().bold(), site_id);
        }
    }
}
