//! Static step catalog for the SEO setup wizard.
//!
//! The catalog is an ordered list of [`StepDefinition`]s grouped into five
//! [`Phase`]s. Index order is execution order: every step of a phase comes
//! after every step of the phases that run before it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::error::{WizardError, WizardResult};

/// The five ordered stages a setup run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discovery,
    DataIntegration,
    Analysis,
    Intelligence,
    Optimization,
}

/// How a phase reacts to a failing, non-optional step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failure halts the run and is surfaced as the failed step.
    StopOnFailure,
    /// Failures are logged and counted; the run continues.
    SoftFail,
}

impl Phase {
    /// Phases in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Discovery,
        Phase::DataIntegration,
        Phase::Analysis,
        Phase::Intelligence,
        Phase::Optimization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::DataIntegration => "data_integration",
            Phase::Analysis => "analysis",
            Phase::Intelligence => "intelligence",
            Phase::Optimization => "optimization",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Discovery => "Sequential Discovery",
            Phase::DataIntegration => "GSC Sync",
            Phase::Analysis => "Parallel Analysis",
            Phase::Intelligence => "AI Training",
            Phase::Optimization => "Final Steps",
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        match self {
            Phase::Analysis | Phase::Optimization => FailurePolicy::SoftFail,
            Phase::Discovery | Phase::DataIntegration | Phase::Intelligence => {
                FailurePolicy::StopOnFailure
            }
        }
    }

    /// Steps of a concurrent phase are launched together and awaited as a batch.
    pub fn is_concurrent(&self) -> bool {
        matches!(self, Phase::Analysis)
    }

    pub fn parse(s: &str) -> Option<Phase> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "discovery" => Some(Phase::Discovery),
            "data_integration" | "gsc" => Some(Phase::DataIntegration),
            "analysis" => Some(Phase::Analysis),
            "intelligence" | "ai" => Some(Phase::Intelligence),
            "optimization" | "final" => Some(Phase::Optimization),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Polling budget for steps whose endpoint hands back a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPolling {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl JobPolling {
    pub const fn new(interval_secs: u64, max_attempts: u32) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            max_attempts,
        }
    }

    /// Upper bound on time spent waiting, rounded up to whole minutes.
    pub fn budget_minutes(&self) -> u64 {
        crate::poll::PollOptions::from(*self).budget_minutes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    pub id: &'static str,
    pub phase: Phase,
    pub title: &'static str,
    pub endpoint: &'static str,
    pub optional: bool,
    pub job: Option<JobPolling>,
}

impl StepDefinition {
    pub const fn new(
        id: &'static str,
        phase: Phase,
        title: &'static str,
        endpoint: &'static str,
    ) -> Self {
        Self {
            id,
            phase,
            title,
            endpoint,
            optional: false,
            job: None,
        }
    }

    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub const fn with_job(mut self, interval_secs: u64, max_attempts: u32) -> Self {
        self.job = Some(JobPolling::new(interval_secs, max_attempts));
        self
    }

    /// Whether the step belongs to the concurrently executed batch.
    pub fn is_parallel(&self) -> bool {
        self.phase.is_concurrent()
    }
}

const DEFAULT_STEPS: [StepDefinition; 30] = [
    // Discovery
    StepDefinition::new(
        "business-profile",
        Phase::Discovery,
        "Analyze business profile",
        "seo-business-profile",
    ),
    StepDefinition::new(
        "crawl-sitemap",
        Phase::Discovery,
        "Crawl sitemap",
        "seo-crawl-sitemap",
    )
    .with_job(3, 100),
    StepDefinition::new(
        "crawl-pages",
        Phase::Discovery,
        "Crawl site pages",
        "seo-crawl-pages",
    )
    .with_job(3, 300),
    StepDefinition::new(
        "extract-brand",
        Phase::Discovery,
        "Extract brand identity",
        "seo-extract-brand",
    ),
    StepDefinition::new(
        "detect-tech-stack",
        Phase::Discovery,
        "Detect technology stack",
        "seo-detect-tech-stack",
    ),
    StepDefinition::new(
        "local-seo",
        Phase::Discovery,
        "Local SEO analysis",
        "seo-local-seo",
    )
    .optional(),
    // Data integration
    StepDefinition::new(
        "gsc-sync",
        Phase::DataIntegration,
        "Sync Google Search Console",
        "seo-gsc-sync",
    )
    .with_job(5, 120),
    // Analysis
    StepDefinition::new(
        "keyword-research",
        Phase::Analysis,
        "Keyword research",
        "seo-keyword-research",
    ),
    StepDefinition::new(
        "competitor-analysis",
        Phase::Analysis,
        "Competitor analysis",
        "seo-competitor-analysis",
    )
    .with_job(5, 120),
    StepDefinition::new(
        "backlink-profile",
        Phase::Analysis,
        "Backlink profile",
        "seo-backlink-profile",
    )
    .with_job(5, 120),
    StepDefinition::new(
        "content-gaps",
        Phase::Analysis,
        "Content gap analysis",
        "seo-content-gaps",
    ),
    StepDefinition::new(
        "technical-audit",
        Phase::Analysis,
        "Technical SEO audit",
        "seo-technical-audit",
    ),
    StepDefinition::new(
        "pagespeed-audit",
        Phase::Analysis,
        "PageSpeed Insights audit",
        "seo-pagespeed-audit",
    )
    .with_job(5, 60),
    StepDefinition::new(
        "core-web-vitals",
        Phase::Analysis,
        "Core Web Vitals",
        "seo-core-web-vitals",
    ),
    StepDefinition::new(
        "mobile-usability",
        Phase::Analysis,
        "Mobile usability",
        "seo-mobile-usability",
    ),
    StepDefinition::new(
        "internal-linking",
        Phase::Analysis,
        "Internal linking structure",
        "seo-internal-linking",
    ),
    StepDefinition::new(
        "schema-audit",
        Phase::Analysis,
        "Structured data audit",
        "seo-schema-audit",
    ),
    StepDefinition::new(
        "image-alt-audit",
        Phase::Analysis,
        "Image alt text audit",
        "seo-image-alt-audit",
    ),
    StepDefinition::new(
        "meta-tags-audit",
        Phase::Analysis,
        "Meta tags audit",
        "seo-meta-tags-audit",
    ),
    StepDefinition::new(
        "duplicate-content",
        Phase::Analysis,
        "Duplicate content check",
        "seo-duplicate-content",
    ),
    StepDefinition::new(
        "broken-links",
        Phase::Analysis,
        "Broken link scan",
        "seo-broken-links",
    ),
    StepDefinition::new(
        "search-intent",
        Phase::Analysis,
        "Search intent mapping",
        "seo-search-intent",
    ),
    StepDefinition::new(
        "serp-features",
        Phase::Analysis,
        "SERP feature opportunities",
        "seo-serp-features",
    ),
    // Intelligence
    StepDefinition::new(
        "train-brand-voice",
        Phase::Intelligence,
        "Train brand voice model",
        "seo-train-brand-voice",
    )
    .with_job(5, 180),
    StepDefinition::new(
        "build-knowledge-base",
        Phase::Intelligence,
        "Build knowledge base",
        "seo-build-knowledge-base",
    )
    .with_job(5, 120),
    StepDefinition::new(
        "generate-embeddings",
        Phase::Intelligence,
        "Generate content embeddings",
        "seo-generate-embeddings",
    ),
    // Optimization
    StepDefinition::new(
        "generate-recommendations",
        Phase::Optimization,
        "Generate recommendations",
        "seo-generate-recommendations",
    ),
    StepDefinition::new(
        "content-calendar",
        Phase::Optimization,
        "Draft content calendar",
        "seo-content-calendar",
    )
    .optional(),
    StepDefinition::new(
        "schedule-monitoring",
        Phase::Optimization,
        "Schedule rank monitoring",
        "seo-schedule-monitoring",
    ),
    StepDefinition::new(
        "generate-report",
        Phase::Optimization,
        "Generate setup report",
        "seo-generate-report",
    ),
];

/// Ordered, validated collection of step definitions.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    steps: Vec<StepDefinition>,
}

impl Default for StepCatalog {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS.to_vec(),
        }
    }
}

impl StepCatalog {
    /// Build a catalog from custom steps. Ids must be unique and phases must
    /// appear in execution order.
    pub fn new(steps: Vec<StepDefinition>) -> WizardResult<Self> {
        if steps.is_empty() {
            return Err(WizardError::InvalidCatalog("catalog has no steps".to_string()));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.id) {
                return Err(WizardError::InvalidCatalog(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        for pair in steps.windows(2) {
            if pair[1].phase < pair[0].phase {
                return Err(WizardError::InvalidCatalog(format!(
                    "step '{}' ({}) is listed after a step of a later phase ({})",
                    pair[1].id, pair[1].phase, pair[0].phase
                )));
            }
        }

        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter()
    }

    pub fn step_at(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    pub fn get(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn find_step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    pub fn steps_by_phase(&self, phase: Phase) -> Vec<&StepDefinition> {
        self.steps.iter().filter(|s| s.phase == phase).collect()
    }

    /// Steps of `phase` paired with their catalog index, restricted to
    /// indices at or after `from`.
    pub fn indexed_steps_from(&self, phase: Phase, from: usize) -> Vec<(usize, &StepDefinition)> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(i, s)| s.phase == phase && *i >= from)
            .collect()
    }

    pub fn parallel_steps(&self) -> Vec<&StepDefinition> {
        self.steps.iter().filter(|s| s.is_parallel()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_shape() {
        let catalog = StepCatalog::default();
        assert_eq!(catalog.len(), 30);
        assert_eq!(catalog.parallel_steps().len(), 16);
        assert_eq!(catalog.steps_by_phase(Phase::DataIntegration).len(), 1);
        assert_eq!(catalog.step_at(1).map(|s| s.id), Some("crawl-sitemap"));
    }

    #[test]
    fn test_default_catalog_is_valid() {
        let steps: Vec<StepDefinition> = StepCatalog::default().iter().cloned().collect();
        assert!(StepCatalog::new(steps).is_ok());
    }

    #[test]
    fn test_find_step_index() {
        let catalog = StepCatalog::default();
        assert_eq!(catalog.find_step_index("business-profile"), Some(0));
        assert_eq!(catalog.find_step_index("gsc-sync"), Some(6));
        assert_eq!(catalog.find_step_index("generate-report"), Some(29));
        assert_eq!(catalog.find_step_index("does-not-exist"), None);
    }

    #[test]
    fn test_steps_by_phase_preserves_order() {
        let catalog = StepCatalog::default();
        let ids: Vec<_> = catalog
            .steps_by_phase(Phase::Intelligence)
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(
            ids,
            vec!["train-brand-voice", "build-knowledge-base", "generate-embeddings"]
        );
    }

    #[test]
    fn test_optional_steps() {
        let catalog = StepCatalog::default();
        assert!(catalog.get("local-seo").unwrap().optional);
        assert!(!catalog.get("crawl-sitemap").unwrap().optional);
    }

    #[test]
    fn test_phase_policies() {
        assert_eq!(Phase::Discovery.failure_policy(), FailurePolicy::StopOnFailure);
        assert_eq!(Phase::DataIntegration.failure_policy(), FailurePolicy::StopOnFailure);
        assert_eq!(Phase::Analysis.failure_policy(), FailurePolicy::SoftFail);
        assert_eq!(Phase::Intelligence.failure_policy(), FailurePolicy::StopOnFailure);
        assert_eq!(Phase::Optimization.failure_policy(), FailurePolicy::SoftFail);
        assert!(Phase::Analysis.is_concurrent());
        assert!(!Phase::Optimization.is_concurrent());
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!(Phase::parse("data-integration"), Some(Phase::DataIntegration));
        assert_eq!(Phase::parse("AI"), Some(Phase::Intelligence));
        assert_eq!(Phase::parse("nope"), None);
    }

    #[test]
    fn test_job_budget_minutes() {
        assert_eq!(JobPolling::new(3, 300).budget_minutes(), 15);
        assert_eq!(JobPolling::new(5, 13).budget_minutes(), 2);
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let step = StepDefinition::new("a", Phase::Discovery, "A", "a");
        let result = StepCatalog::new(vec![step.clone(), step]);
        assert!(matches!(result, Err(WizardError::InvalidCatalog(_))));
    }

    #[test]
    fn test_rejects_out_of_order_phases() {
        let result = StepCatalog::new(vec![
            StepDefinition::new("late", Phase::Optimization, "Late", "late"),
            StepDefinition::new("early", Phase::Discovery, "Early", "early"),
        ]);
        assert!(matches!(result, Err(WizardError::InvalidCatalog(_))));
    }
}
