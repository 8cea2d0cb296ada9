use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;

use super::cache::ExecutionCache;
use super::context::ExecutionContext;
use super::retry::RetryPolicy;
use crate::checks::{CheckEnv, CheckRegistry, CheckUnit};
use crate::error::AuditError;
use crate::findings::{Finding, FindingNormalizer};
use crate::traits::{FindingSink, Output, ResourceProvider};

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    /// Upper bound on checks evaluating at the same time
    pub max_concurrent_checks: usize,
    pub retry: RetryPolicy,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            max_concurrent_checks: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of one check in one scope
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub scope: ExecutionContext,
    pub service: String,
    pub check_code: String,
    pub findings: Vec<Finding>,
    /// Set when the check or finding delivery failed
    pub error: Option<AuditError>,
}

impl CheckOutcome {
    fn new(scope: &ExecutionContext, unit: &CheckUnit) -> Self {
        Self {
            scope: scope.clone(),
            service: unit.service().to_string(),
            check_code: unit.code().to_string(),
            findings: Vec::new(),
            error: None,
        }
    }

    fn failed(mut self, error: AuditError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Counters over a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub scopes: usize,
    pub checks_run: usize,
    pub checks_failed: usize,
    pub passed_findings: usize,
    pub failed_findings: usize,
}

impl RunSummary {
    /// Share of passed findings, 100 when nothing was evaluated
    pub fn compliance_score(&self) -> f64 {
        let total = self.passed_findings + self.failed_findings;
        if total == 0 {
            return 100.0;
        }
        self.passed_findings as f64 * 100.0 / total as f64
    }
}

/// Everything produced by [`AuditEngine::run`], in scope then registration order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<CheckOutcome>,
    pub summary: RunSummary,
}

impl RunReport {
    fn from_outcomes(scopes: usize, outcomes: Vec<CheckOutcome>) -> Self {
        let mut summary = RunSummary {
            scopes,
            ..Default::default()
        };

        for outcome in &outcomes {
            summary.checks_run += 1;
            if !outcome.is_ok() {
                summary.checks_failed += 1;
            }
            for finding in &outcome.findings {
                if finding.is_failed() {
                    summary.failed_findings += 1;
                } else {
                    summary.passed_findings += 1;
                }
            }
        }

        Self { outcomes, summary }
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.outcomes.iter().flat_map(|o| o.findings.iter())
    }

    pub fn failed_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings().filter(|f| f.is_failed())
    }

    pub fn errors(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }
}

/// Shared collaborators handed to each check task
#[derive(Clone)]
struct Workers {
    provider: Arc<dyn ResourceProvider>,
    sink: Arc<dyn FindingSink>,
    output: Arc<dyn Output>,
    normalizer: Arc<FindingNormalizer>,
    retry: RetryPolicy,
}

/// Runs registered checks across account/region scopes.
///
/// Each scope gets its own execution cache shared by every check of every
/// selected service; a failure in one scope never affects another.
pub struct AuditEngine {
    registry: Arc<CheckRegistry>,
    settings: AuditSettings,
    workers: Workers,
}

impl AuditEngine {
    pub fn new(
        registry: Arc<CheckRegistry>,
        provider: Arc<dyn ResourceProvider>,
        sink: Arc<dyn FindingSink>,
        output: Arc<dyn Output>,
        settings: AuditSettings,
    ) -> Self {
        let workers = Workers {
            provider,
            sink,
            output,
            normalizer: Arc::new(FindingNormalizer::new()),
            retry: settings.retry.clone(),
        };

        Self {
            registry,
            settings,
            workers,
        }
    }

    /// Checks selected for `services` (all tags when empty), in tag then
    /// registration order
    pub fn selected_checks(&self, services: &[String]) -> Vec<CheckUnit> {
        let tags: Vec<String> = if services.is_empty() {
            self.registry.all_service_tags().into_iter().collect()
        } else {
            let mut tags = services.to_vec();
            tags.sort();
            tags.dedup();
            tags
        };

        tags.iter()
            .flat_map(|tag| self.registry.checks_for(tag))
            .collect()
    }

    /// Run one scope on the current thread
    pub fn run_scope(&self, scope: &ExecutionContext, services: &[String]) -> Vec<CheckOutcome> {
        let cache = ExecutionCache::new();

        self.selected_checks(services)
            .iter()
            .map(|unit| execute_check(&self.workers, unit, scope, &cache))
            .collect()
    }

    /// Run every selected check against every scope on a bounded pool of
    /// blocking tasks
    pub async fn run(&self, scopes: &[ExecutionContext], services: &[String]) -> RunReport {
        let units = self.selected_checks(services);
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_checks.max(1)));

        let mut caches: HashMap<(String, String), Arc<ExecutionCache>> = HashMap::new();
        let mut handles = Vec::new();

        for scope in scopes {
            let cache = caches
                .entry(scope.scope_key())
                .or_insert_with(|| Arc::new(ExecutionCache::new()))
                .clone();

            for unit in &units {
                let workers = self.workers.clone();
                let unit = unit.clone();
                let scope = scope.clone();
                let cache = cache.clone();
                let semaphore = semaphore.clone();

                let handle = tokio::spawn(async move {
                    let Ok(permit) = semaphore.acquire_owned().await else {
                        return CheckOutcome::new(&scope, &unit)
                            .failed(AuditError::Internal("worker pool closed".to_string()));
                    };

                    let task_unit = unit.clone();
                    let task_scope = scope.clone();
                    let outcome = tokio::task::spawn_blocking(move || {
                        execute_check(&workers, &task_unit, &task_scope, &cache)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        CheckOutcome::new(&scope, &unit)
                            .failed(AuditError::Internal(format!("check task panicked: {}", e)))
                    });

                    drop(permit);
                    outcome
                });

                handles.push(handle);
            }
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => self
                    .workers
                    .output
                    .error(&format!("Check task was cancelled: {}", e)),
            }
        }

        RunReport::from_outcomes(caches.len(), outcomes)
    }
}

/// Evaluate one check, normalize its verdicts against stored findings and
/// deliver them to the sink
fn execute_check(
    workers: &Workers,
    unit: &CheckUnit,
    scope: &ExecutionContext,
    cache: &ExecutionCache,
) -> CheckOutcome {
    let outcome = CheckOutcome::new(scope, unit);
    let env = CheckEnv::new(scope, cache, workers.provider.as_ref(), &workers.retry);

    let verdicts = match unit.evaluate(&env) {
        Ok(verdicts) => verdicts,
        Err(err) => {
            workers
                .output
                .error(&format!("{} [{}] in {}: {}", unit.code(), unit.service(), scope, err));
            return outcome.failed(err);
        }
    };

    let metadata = unit.metadata();
    let ids: Vec<String> = verdicts
        .iter()
        .map(|v| crate::findings::finding_id(&v.resource_id, &metadata.code_for(v)))
        .collect();

    let prior: HashMap<String, Finding> = match workers.sink.get_findings(&ids) {
        Ok(findings) => findings.into_iter().map(|f| (f.id.clone(), f)).collect(),
        Err(err) => {
            workers.output.warning(&format!(
                "Could not read prior findings for {} in {}: {}",
                unit.code(),
                scope,
                err
            ));
            HashMap::new()
        }
    };

    let findings: Vec<Finding> = verdicts
        .iter()
        .zip(&ids)
        .map(|(verdict, id)| {
            workers
                .normalizer
                .normalize(verdict, metadata, scope, prior.get(id))
        })
        .collect();

    let mut outcome = CheckOutcome { findings, ..outcome };

    if !outcome.findings.is_empty() {
        if let Err(err) = workers.sink.upsert_findings(&outcome.findings) {
            workers.output.error(&format!(
                "Failed to deliver {} finding(s) for {} in {}: {}",
                outcome.findings.len(),
                unit.code(),
                scope,
                err
            ));
            outcome.error = Some(AuditError::Provider(err));
        }
    }

    outcome
}
