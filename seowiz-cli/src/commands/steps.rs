use anyhow::{anyhow, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use seowiz_core::{Phase, StepCatalog, StepDefinition};

pub fn cmd_steps(phase: Option<&str>, format: &str) -> Result<()> {
    let catalog = StepCatalog::default();

    let filter = match phase {
        Some(name) => Some(Phase::parse(name).ok_or_else(|| {
            anyhow!(
                "unknown phase '{}'. Expected one of: {}",
                name,
                Phase::ALL
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?),
        None => None,
    };

    let steps: Vec<(usize, &StepDefinition)> = catalog
        .iter()
        .enumerate()
        .filter(|(_, step)| filter.map_or(true, |p| step.phase == p))
        .collect();

    if format.eq_ignore_ascii_case("json") {
        let rows: Vec<_> = steps
            .iter()
            .map(|(index, step)| {
                serde_json::json!({
                    "index": index,
                    "id": step.id,
                    "title": step.title,
                    "phase": step.phase,
                    "endpoint": step.endpoint,
                    "optional": step.optional,
                    "parallel": step.is_parallel(),
                    "job_budget_minutes": step.job.map(|j| j.budget_minutes()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Title").fg(Color::Cyan),
            Cell::new("Phase").fg(Color::Cyan),
            Cell::new("Optional").fg(Color::Cyan),
            Cell::new("Job budget").fg(Color::Cyan),
        ]);

    for (index, step) in &steps {
        let budget = step
            .job
            .map(|j| {
                format!(
                    "{}s × {} (~{}m)",
                    j.interval.as_secs(),
                    j.max_attempts,
                    j.budget_minutes()
                )
            })
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(index),
            Cell::new(step.id),
            Cell::new(step.title),
            Cell::new(step.phase.label()),
            Cell::new(if step.optional { "yes" } else { "" }),
            Cell::new(budget),
        ]);
    }

    println!("{table}");
    Ok(())
}
