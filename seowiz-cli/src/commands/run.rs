use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use seowiz_core::{
    HttpStepExecutor, Orchestrator, RunOutcome, SnapshotStore, WizardConfig, WizardError,
    WizardResult,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use crate::output::{attach_reporter, is_json, print_outcome};

#[derive(Args, Debug, Clone)]
pub struct RunTarget {
    #[arg(short, long, env = "SEOWIZ_SITE_ID", help = "Site (tenant) identifier")]
    pub site: String,

    #[arg(short, long, help = "Site domain passed to every step")]
    pub domain: Option<String>,

    #[arg(short, long, default_value = "text", help = "Output format: text or json")]
    pub format: String,
}

struct Session {
    config: WizardConfig,
    store: SnapshotStore,
    executor: Arc<HttpStepExecutor>,
}

impl Session {
    fn open() -> Result<Self> {
        let config = WizardConfig::load().map_err(WizardError::from)?;
        let store = SnapshotStore::from_config(&config.storage)?;
        let executor = Arc::new(HttpStepExecutor::new(config.api.clone(), &config.polling));
        Ok(Self {
            config,
            store,
            executor,
        })
    }

    fn fresh(&self, target: &RunTarget) -> Orchestrator {
        let orchestrator = Orchestrator::new(&target.site, self.executor.clone())
            .with_progress(self.config.progress.clone());
        match &target.domain {
            Some(domain) => orchestrator.with_domain(domain),
            None => orchestrator,
        }
    }

    async fn restore(&self, target: &RunTarget) -> Result<Orchestrator> {
        let state = self.store.load(&target.site).await?;
        let orchestrator = Orchestrator::from_state(state, self.executor.clone())
            .with_progress(self.config.progress.clone());
        Ok(match &target.domain {
            Some(domain) => orchestrator.with_domain(domain),
            None => orchestrator,
        })
    }

    /// Drive `run` to the end (or Ctrl-C), then persist the run state either way.
    async fn drive<F>(&self, orchestrator: &Orchestrator, target: &RunTarget, run: F) -> Result<()>
    where
        F: Future<Output = WizardResult<RunOutcome>>,
    {
        let result = tokio::select! {
            result = run => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        let path = self.store.save(&orchestrator.snapshot().await).await?;
        debug!(path = %path.display(), "Run snapshot written");

        let outcome = match result {
            Some(result) => result?,
            None => {
                println!();
                println!(
                    "{} Interrupted. Resume with {}",
                    "!".yellow().bold(),
                    format!("seowiz restart --current --site {}", target.site).cyan()
                );
                return Err(anyhow!("interrupted"));
            }
        };

        if !is_json(&target.format) {
            print_outcome(&target.site, &outcome);
        }

        match outcome {
            RunOutcome::Failed(failed) => Err(anyhow!(
                "setup halted at '{}': {}",
                failed.id,
                failed.error
            )),
            _ => Ok(()),
        }
    }
}

pub async fn cmd_run(target: RunTarget) -> Result<()> {
    let session = Session::open()?;
    let orchestrator = session.fresh(&target);
    attach_reporter(&orchestrator, &target.format).await;

    if !is_json(&target.format) {
        println!(
            "{} {}",
            "Starting SEO setup for".cyan().bold(),
            target.site.yellow()
        );
    }
    info!(site = %target.site, "Starting setup run");

    session
        .drive(&orchestrator, &target, orchestrator.start())
        .await
}

pub async fn cmd_retry(target: RunTarget, from: Option<String>) -> Result<()> {
    let session = Session::open()?;
    let orchestrator = session.restore(&target).await?;
    attach_reporter(&orchestrator, &target.format).await;

    match from {
        Some(step_id) => {
            session
                .drive(&orchestrator, &target, orchestrator.retry_from(&step_id))
                .await
        }
        None => {
            session
                .drive(&orchestrator, &target, orchestrator.retry_failed())
                .await
        }
    }
}

pub async fn cmd_restart(target: RunTarget, current: bool) -> Result<()> {
    let session = Session::open()?;

    if current {
        let orchestrator = session.restore(&target).await?;
        attach_reporter(&orchestrator, &target.format).await;
        return session
            .drive(&orchestrator, &target, orchestrator.restart_current_step())
            .await;
    }

    let orchestrator = match session.store.load_optional(&target.site).await? {
        Some(state) => Orchestrator::from_state(state, session.executor.clone())
            .with_progress(session.config.progress.clone()),
        None => Orchestrator::new(&target.site, session.executor.clone())
            .with_progress(session.config.progress.clone()),
    };
    let orchestrator = match &target.domain {
        Some(domain) => orchestrator.with_domain(domain),
        None => orchestrator,
    };
    attach_reporter(&orchestrator, &target.format).await;

    session
        .drive(&orchestrator, &target, orchestrator.restart_from_beginning())
        .await
}

pub async fn cmd_skip(site: &str) -> Result<()> {
    let session = Session::open()?;
    let orchestrator = match session.store.load_optional(site).await? {
        Some(state) => Orchestrator::from_state(state, session.executor.clone()),
        None => Orchestrator::new(site, session.executor.clone()),
    };

    let result = orchestrator.skip_setup().await;
    session.store.save(&orchestrator.snapshot().await).await?;
    result?;

    println!(
        "{} Setup skipped for {}",
        "✓".green().bold(),
        site.yellow()
    );
    Ok(())
}
