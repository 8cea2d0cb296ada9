use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::pipeline::{PipelineRun, RemediationState, RunProgress, StepRecord};
use super::playbook::PlaybookRegistry;
use super::request::RemediationRequest;
use super::step::StepContext;
use crate::error::{AuditError, AuditResult};
use crate::findings::FindingUpdate;
use crate::identity::CredentialFederator;
use crate::traits::{FindingSink, Output, ProvisioningFactory};

/// Orchestrator tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationSettings {
    /// Recorded on the archive update
    pub updated_by: String,
    /// Run-level deadline for one request
    pub timeout: Duration,
    /// Accounts remediated at the same time by [`RemediationOrchestrator::remediate_batch`]
    pub max_concurrent_accounts: usize,
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self {
            updated_by: whoami::username(),
            timeout: Duration::from_secs(300),
            max_concurrent_accounts: 4,
        }
    }
}

/// Outcome of the finding update after a successful remediation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ReportingStatus {
    Reported,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RemediationOutcome {
    /// Every step ran; `reporting` says whether the finding was archived
    Remediated { reporting: ReportingStatus },
    /// Nothing was provisioned and the finding was not touched
    AlreadyRemediated { reason: String },
}

/// What one remediation run did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationReport {
    pub run_id: Uuid,
    pub finding_id: String,
    pub account_id: String,
    /// `local` or `assumed`
    pub identity: String,
    pub outcome: RemediationOutcome,
    pub steps: Vec<StepRecord>,
    pub resources: Vec<String>,
    pub history: Vec<RemediationState>,
}

impl RemediationReport {
    pub fn is_fully_reported(&self) -> bool {
        matches!(
            self.outcome,
            RemediationOutcome::Remediated {
                reporting: ReportingStatus::Reported
            }
        )
    }
}

/// Result of one request in [`RemediationOrchestrator::remediate_batch`]
#[derive(Debug)]
pub struct BatchEntry {
    pub account_id: String,
    pub finding_id: String,
    pub result: AuditResult<RemediationReport>,
}

/// Drives remediation playbooks for findings.
///
/// Identity resolution happens before any provisioning call; each request
/// resolves its own credentials and never shares them.
pub struct RemediationOrchestrator {
    federator: CredentialFederator,
    provisioning: Arc<dyn ProvisioningFactory>,
    sink: Arc<dyn FindingSink>,
    output: Arc<dyn Output>,
    playbooks: Arc<PlaybookRegistry>,
    settings: RemediationSettings,
}

impl RemediationOrchestrator {
    pub fn new(
        federator: CredentialFederator,
        provisioning: Arc<dyn ProvisioningFactory>,
        sink: Arc<dyn FindingSink>,
        output: Arc<dyn Output>,
        playbooks: Arc<PlaybookRegistry>,
        settings: RemediationSettings,
    ) -> Self {
        Self {
            federator,
            provisioning,
            sink,
            output,
            playbooks,
            settings,
        }
    }

    pub fn settings(&self) -> &RemediationSettings {
        &self.settings
    }

    /// Remediate one finding on the current thread
    pub fn remediate(&self, request: &RemediationRequest) -> AuditResult<RemediationReport> {
        let deadline = Instant::now() + self.settings.timeout;
        self.remediate_until(request, deadline, &RunProgress::new())
    }

    /// Remediate one finding against an absolute deadline, publishing step
    /// progress to `progress`.
    ///
    /// Once `progress` is abandoned the run stops at the next step boundary
    /// and never archives the finding.
    pub fn remediate_until(
        &self,
        request: &RemediationRequest,
        deadline: Instant,
        progress: &RunProgress,
    ) -> AuditResult<RemediationReport> {
        let run_id = Uuid::new_v4();

        let result = self.run(run_id, request, deadline, progress);
        if let Err(err) = &result {
            // The waiter already reported the timeout
            if !progress.is_abandoned() {
                self.output
                    .error(&format!("Remediation of {} failed: {}", request.finding_id, err));
            }
        }
        result
    }

    fn run(
        &self,
        run_id: Uuid,
        request: &RemediationRequest,
        deadline: Instant,
        progress: &RunProgress,
    ) -> AuditResult<RemediationReport> {
        let pipeline = self.playbooks.get(&request.check_code)?.pipeline(request)?;

        if progress.is_abandoned() || Instant::now() >= deadline {
            return Err(AuditError::RemediationTimedOut {
                finding_id: request.finding_id.clone(),
                completed: Vec::new(),
            });
        }

        let caller = self.federator.caller_account_id()?;
        let identity = self.federator.resolve(&request.account_id, &caller)?;
        let identity_kind = if identity.is_local() { "local" } else { "assumed" };

        let api = self
            .provisioning
            .connect(&identity, &request.region)
            .map_err(AuditError::Provider)?;

        let mut ctx = StepContext::new(request.clone(), identity, api);

        let mut run = match pipeline.execute_tracked(&mut ctx, Some(deadline), progress) {
            Ok(run) => run,
            Err(err) => {
                if let AuditError::StepExecution { completed, .. } = &err {
                    for hint in pipeline.compensations_for(completed) {
                        self.output
                            .warning(&format!("Left in place by {}: {}", request.finding_id, hint));
                    }
                }
                return Err(err);
            }
        };

        if let Some(reason) = run.already_remediated.clone() {
            self.output
                .info(&format!("{} already remediated: {}", request.finding_id, reason));
            run.transition(RemediationState::Done);
            return Ok(self.report(
                run_id,
                request,
                identity_kind,
                RemediationOutcome::AlreadyRemediated { reason },
                run,
                &ctx,
            ));
        }

        run.transition(RemediationState::Reporting);
        if Instant::now() >= deadline || !progress.begin_reporting() {
            return Err(AuditError::RemediationTimedOut {
                finding_id: request.finding_id.clone(),
                completed: run.completed_steps(),
            });
        }

        let reporting = self.archive(request, &ctx);
        run.transition(RemediationState::Done);

        Ok(self.report(
            run_id,
            request,
            identity_kind,
            RemediationOutcome::Remediated { reporting },
            run,
            &ctx,
        ))
    }

    /// Single archive update; failure is logged and returned, not raised
    fn archive(&self, request: &RemediationRequest, ctx: &StepContext) -> ReportingStatus {
        let note = format!(
            "Automated remediation of {} completed: {}. The finding was archived.",
            request.resource_id(),
            ctx.resources().join("; ")
        );
        let update = FindingUpdate::archive(&request.finding_id, note, &self.settings.updated_by);

        match self.sink.update_finding(&update) {
            Ok(()) => {
                self.output
                    .success(&format!("Remediated and archived {}", request.finding_id));
                ReportingStatus::Reported
            }
            Err(err) => {
                self.output.warning(&format!(
                    "Remediated {} but failed to archive the finding: {}",
                    request.finding_id, err
                ));
                ReportingStatus::Failed(err.to_string())
            }
        }
    }

    fn report(
        &self,
        run_id: Uuid,
        request: &RemediationRequest,
        identity_kind: &str,
        outcome: RemediationOutcome,
        run: PipelineRun,
        ctx: &StepContext,
    ) -> RemediationReport {
        RemediationReport {
            run_id,
            finding_id: request.finding_id.clone(),
            account_id: request.account_id.clone(),
            identity: identity_kind.to_string(),
            outcome,
            steps: run.steps,
            resources: ctx.resources().to_vec(),
            history: run.history,
        }
    }

    /// Remediate on a blocking task, giving up once the timeout passes.
    ///
    /// The timeout and the in-pipeline deadline are the same instant. A run
    /// given up on stops at its next step boundary and leaves the finding
    /// unresolved; one that already started reporting is waited for.
    pub async fn remediate_with_timeout(
        self: &Arc<Self>,
        request: RemediationRequest,
    ) -> AuditResult<RemediationReport> {
        self.remediate_tracked(request).await.0
    }

    /// Run one request; on timeout also hand back the abandoned task so a
    /// caller can wait for it to stop
    async fn remediate_tracked(
        self: &Arc<Self>,
        request: RemediationRequest,
    ) -> (
        AuditResult<RemediationReport>,
        Option<JoinHandle<AuditResult<RemediationReport>>>,
    ) {
        let deadline = Instant::now() + self.settings.timeout;
        let progress = Arc::new(RunProgress::new());
        let finding_id = request.finding_id.clone();

        let orchestrator = Arc::clone(self);
        let task_progress = Arc::clone(&progress);
        let mut task = tokio::task::spawn_blocking(move || {
            orchestrator.remediate_until(&request, deadline, &task_progress)
        });

        let timed = tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), &mut task).await;
        match timed {
            Ok(joined) => (flatten_join(joined), None),
            Err(_) => {
                if !progress.abandon() {
                    // Reporting already started; its single update decides the outcome
                    return (flatten_join(task.await), None);
                }

                let completed = progress.completed_steps();
                self.output.error(&format!(
                    "Remediation of {} timed out after {} step(s)",
                    finding_id,
                    completed.len()
                ));
                (
                    Err(AuditError::RemediationTimedOut {
                        finding_id,
                        completed,
                    }),
                    Some(task),
                )
            }
        }
    }

    /// Remediate a batch: accounts in parallel (bounded), requests of one
    /// account strictly one after another.
    ///
    /// Entries are ordered by account id, then input order within an
    /// account. A timed-out request is waited on until it stops before the
    /// next request of the same account starts.
    pub async fn remediate_batch(self: &Arc<Self>, requests: Vec<RemediationRequest>) -> Vec<BatchEntry> {
        let mut by_account: BTreeMap<String, Vec<RemediationRequest>> = BTreeMap::new();
        for request in requests {
            by_account
                .entry(request.account_id.clone())
                .or_default()
                .push(request);
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_accounts.max(1)));
        let mut handles = Vec::new();

        for (account_id, requests) in by_account {
            let orchestrator = Arc::clone(self);
            let semaphore = semaphore.clone();
            let task_account = account_id.clone();

            handles.push((
                account_id,
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let mut entries = Vec::with_capacity(requests.len());
                    for request in requests {
                        let finding_id = request.finding_id.clone();
                        let (result, abandoned) = orchestrator.remediate_tracked(request).await;
                        if let Some(handle) = abandoned {
                            // Its result was already reported as a timeout
                            let _ = handle.await;
                        }
                        entries.push(BatchEntry {
                            account_id: task_account.clone(),
                            finding_id,
                            result,
                        });
                    }
                    entries
                }),
            ));
        }

        let mut entries = Vec::new();
        for (account_id, handle) in handles {
            match handle.await {
                Ok(account_entries) => entries.extend(account_entries),
                Err(e) => self.output.error(&format!(
                    "Remediation worker for account {} stopped: {}",
                    account_id, e
                )),
            }
        }

        entries
    }
}

fn flatten_join(
    joined: Result<AuditResult<RemediationReport>, tokio::task::JoinError>,
) -> AuditResult<RemediationReport> {
    joined.unwrap_or_else(|e| Err(AuditError::Internal(format!("remediation task failed: {}", e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::vpc::FLOW_LOGGING_CHECK;
    use crate::error::ProviderError;
    use crate::findings::{InMemoryFindingStore, RecordState, WorkflowStatus};
    use crate::traits::{MockIdentityProvider, MockOutput, MockProvisioning, MockProvisioningFactory};
    use std::sync::Mutex;

    const CALLER: &str = "999999999999";
    const MEMBER: &str = "111111111111";
    const ROLE: &str = "XA-Compliance-Response";

    struct Harness {
        orchestrator: Arc<RemediationOrchestrator>,
        identity: Arc<MockIdentityProvider>,
        api: Arc<MockProvisioning>,
        factory: Arc<MockProvisioningFactory>,
        store: Arc<InMemoryFindingStore>,
        output: Arc<MockOutput>,
        journal: Arc<Mutex<Vec<String>>>,
    }

    fn harness_with(api: MockProvisioning, timeout: Duration) -> Harness {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let identity = Arc::new(
            MockIdentityProvider::new(CALLER)
                .trusting(MEMBER)
                .with_journal(journal.clone()),
        );
        let api = Arc::new(api.with_journal(journal.clone()));
        let factory = Arc::new(MockProvisioningFactory::new(api.clone()));
        let store = Arc::new(InMemoryFindingStore::new());
        let output = Arc::new(MockOutput::new());

        let orchestrator = Arc::new(RemediationOrchestrator::new(
            CredentialFederator::new(identity.clone(), ROLE),
            factory.clone(),
            store.clone(),
            output.clone(),
            Arc::new(PlaybookRegistry::with_defaults()),
            RemediationSettings {
                updated_by: "compliance-bot".to_string(),
                timeout,
                max_concurrent_accounts: 2,
            },
        ));

        Harness {
            orchestrator,
            identity,
            api,
            factory,
            store,
            output,
            journal,
        }
    }

    fn harness() -> Harness {
        harness_with(
            MockProvisioning::new(MEMBER, "us-east-1"),
            Duration::from_secs(30),
        )
    }

    fn request(account: &str, vpc: &str) -> RemediationRequest {
        RemediationRequest::new(
            &format!(
                "arn:aws:ec2:us-east-1:{}:vpc/{}/{}",
                account, vpc, FLOW_LOGGING_CHECK
            ),
            account,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_assume_role_precedes_provisioning() {
        let h = harness();

        h.orchestrator.remediate(&request(MEMBER, "vpc-1")).unwrap();

        let journal = h.journal.lock().unwrap().clone();
        let assume = journal
            .iter()
            .position(|e| e == &format!("sts:AssumeRole {}", MEMBER))
            .expect("assume role call");
        let first_provisioning = journal
            .iter()
            .position(|e| !e.starts_with("sts:"))
            .expect("provisioning call");
        assert!(assume < first_provisioning);
        assert!(!h.factory.connections()[0].is_local());
        assert_eq!(h.identity.assume_role_calls(), 1);
    }

    #[test]
    fn test_successful_run_archives_once_with_resource_names() {
        let h = harness();
        let request = request(MEMBER, "vpc-1");

        let report = h.orchestrator.remediate(&request).unwrap();

        assert!(report.is_fully_reported());
        assert_eq!(report.identity, "assumed");
        assert_eq!(
            report.history.last(),
            Some(&RemediationState::Done)
        );
        assert!(report.history.contains(&RemediationState::Reporting));

        let updates = h.store.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].finding_id, request.finding_id);
        assert_eq!(updates[0].updated_by, "compliance-bot");
        assert_eq!(updates[0].workflow_status, WorkflowStatus::Resolved);
        assert_eq!(updates[0].record_state, RecordState::Archived);
        assert!(updates[0].note.contains("VPCFlowLogs/vpc-1"));
        assert!(updates[0].note.contains("VPCFlowLogsRole-vpc-1"));
    }

    #[test]
    fn test_second_run_is_already_remediated() {
        let h = harness();
        let request = request(MEMBER, "vpc-1");

        h.orchestrator.remediate(&request).unwrap();
        let second = h.orchestrator.remediate(&request).unwrap();

        assert!(matches!(
            second.outcome,
            RemediationOutcome::AlreadyRemediated { .. }
        ));
        assert_eq!(h.api.role_count(), 1);
        assert_eq!(h.api.policy_count(), 1);
        assert_eq!(h.api.calls_to("iam:CreateRole"), 1);
        // No second archive call
        assert_eq!(h.store.updates().len(), 1);
    }

    #[test]
    fn test_same_account_runs_locally() {
        let h = harness();

        let report = h.orchestrator.remediate(&request(CALLER, "vpc-2")).unwrap();

        assert_eq!(report.identity, "local");
        assert_eq!(h.identity.assume_role_calls(), 0);
    }

    #[test]
    fn test_missing_trust_stops_before_provisioning() {
        let h = harness();

        let err = h
            .orchestrator
            .remediate(&request("222222222222", "vpc-3"))
            .unwrap_err();

        assert!(matches!(err, AuditError::TrustRelationshipMissing { .. }));
        assert!(h.api.journal().iter().all(|e| e.starts_with("sts:")));
        assert!(h.factory.connections().is_empty());
        assert!(h.output.has_error());
    }

    #[test]
    fn test_step_failure_is_reported_without_archiving() {
        let h = harness();
        h.api.fail_on("iam:CreateRole");

        let err = h.orchestrator.remediate(&request(MEMBER, "vpc-1")).unwrap_err();

        match err {
            AuditError::StepExecution { step, completed, .. } => {
                assert_eq!(step, "ensure-role");
                assert!(completed.contains(&"ensure-policy".to_string()));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(h.store.updates().is_empty());
        assert!(
            h.output
                .get_warnings()
                .iter()
                .any(|w| w.contains("delete log group VPCFlowLogs/vpc-1"))
        );
    }

    #[test]
    fn test_reporting_failure_is_distinguishable() {
        let h = harness();
        h.store
            .reject_updates_with(ProviderError::Unavailable("sink down".to_string()));

        let report = h.orchestrator.remediate(&request(MEMBER, "vpc-1")).unwrap();

        match report.outcome {
            RemediationOutcome::Remediated {
                reporting: ReportingStatus::Failed(message),
            } => assert!(message.contains("sink down")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!h.output.has_error());
        assert_eq!(h.output.get_warnings().len(), 1);
    }

    #[test]
    fn test_unknown_playbook_makes_no_calls() {
        let h = harness();
        let request = RemediationRequest::new(
            "arn:aws:dax:us-east-1:111111111111:cache/orders/dax-encryption-at-rest-check",
            MEMBER,
            None,
        )
        .unwrap();

        let err = h.orchestrator.remediate(&request).unwrap_err();

        assert!(matches!(err, AuditError::UnknownPlaybook(_)));
        assert!(h.journal.lock().unwrap().is_empty());
    }

    #[test]
    fn test_expired_deadline_leaves_finding_unresolved() {
        let h = harness_with(MockProvisioning::new(MEMBER, "us-east-1"), Duration::ZERO);

        let err = h.orchestrator.remediate(&request(MEMBER, "vpc-1")).unwrap_err();

        assert!(matches!(err, AuditError::RemediationTimedOut { .. }));
        assert_eq!(h.api.calls_to("logs:CreateLogGroup"), 0);
        assert!(h.store.updates().is_empty());
    }

    #[tokio::test]
    async fn test_remediate_with_timeout() {
        let h = harness();

        let report = h
            .orchestrator
            .remediate_with_timeout(request(MEMBER, "vpc-1"))
            .await
            .unwrap();

        assert!(report.is_fully_reported());
    }

    #[tokio::test]
    async fn test_batch_groups_by_account() {
        let h = harness();
        let requests = vec![
            request(MEMBER, "vpc-a"),
            request(CALLER, "vpc-b"),
            request(MEMBER, "vpc-c"),
        ];

        let results = h.orchestrator.remediate_batch(requests).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|e| e.result.is_ok()));
        // Grouped by account (sorted), input order kept within an account
        let accounts: Vec<&str> = results.iter().map(|e| e.account_id.as_str()).collect();
        assert_eq!(accounts, vec![MEMBER, MEMBER, CALLER]);
        let ids: Vec<&str> = results.iter().map(|e| e.finding_id.as_str()).collect();
        assert!(ids[0].contains("vpc-a"));
        assert!(ids[1].contains("vpc-c"));
        assert!(ids[2].contains("vpc-b"));
        // Each cross-account request assumed its own credentials
        assert_eq!(h.identity.assume_role_calls(), 2);
        assert_eq!(h.store.updates().len(), 3);
    }

    #[test]
    fn test_outer_timeout_never_archives_late() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let h = harness_with(
            MockProvisioning::new(MEMBER, "us-east-1")
                .with_delay_on("ec2:CreateFlowLogs", Duration::from_millis(200)),
            Duration::from_millis(300),
        );

        let result = runtime.block_on(async {
            // Occupy the only blocking thread so the remediation starts late
            let busy = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_millis(150)));
            let result = h
                .orchestrator
                .remediate_with_timeout(request(MEMBER, "vpc-1"))
                .await;
            let _ = busy.await;
            result
        });

        match result {
            Err(AuditError::RemediationTimedOut { completed, .. }) => {
                assert!(completed.contains(&"attach-policy".to_string()));
                assert!(!completed.contains(&"enable-flow-logs".to_string()));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // Let the abandoned run finish its slow call
        std::thread::sleep(Duration::from_millis(300));
        drop(runtime);

        assert_eq!(h.api.calls_to("ec2:CreateFlowLogs"), 1);
        assert!(h.store.updates().is_empty());
        assert_eq!(h.output.get_errors().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_waits_for_timed_out_request() {
        let h = harness_with(
            MockProvisioning::new(MEMBER, "us-east-1")
                .with_delay_on("ec2:CreateFlowLogs", Duration::from_millis(250)),
            Duration::from_millis(150),
        );

        let results = h
            .orchestrator
            .remediate_batch(vec![request(MEMBER, "vpc-a"), request(MEMBER, "vpc-b")])
            .await;

        assert!(results.iter().all(|e| matches!(
            e.result,
            Err(AuditError::RemediationTimedOut { .. })
        )));

        let journal = h.journal.lock().unwrap().clone();
        let first_finished = journal
            .iter()
            .position(|e| e == "ec2:CreateFlowLogs vpc-a")
            .expect("first request reached enable-flow-logs");
        let second_started = journal
            .iter()
            .position(|e| e == "ec2:DescribeFlowLogs vpc-b")
            .expect("second request started");
        assert!(first_finished < second_started);
        assert!(h.store.updates().is_empty());
    }
}
