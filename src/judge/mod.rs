//! Judge orchestration.
//!
//! One submission runs through a fixed sequence: register its completion
//! route, acquire a sandbox, prepare the work directory, compile, run every
//! test, release the sandbox, report. Stages run one after another and are
//! the only writers of their [`Submission`] while they run.

mod compile;
mod report;
mod testcase;
mod verdict;

pub use compile::CompileOutcome;
pub use report::{Diagnostics, JudgeReport, TestOutcome};
pub use testcase::read_manifest;
pub use verdict::{classify, outputs_match, Verdict};

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::correlator::{CompletionSlot, Correlator};
use crate::error::JudgeError;
use crate::intake::SubmissionRequest;
use crate::language::Language;
use crate::sandbox::{Sandbox, SandboxManager, SandboxRuntime};
use crate::transport::{CommandRequest, CompletionRecord, ControlClient, Mode};

/// One judged program and everything learned about it so far.
#[derive(Debug, Clone)]
pub struct Submission {
    pub session_id: String,
    pub source_path: PathBuf,
    pub language: Language,
    pub testcase_dir: PathBuf,
    pub score: i64,

    /// Work directory inside the sandbox.
    pub work_dir: String,
    pub artifact_path: String,

    pub tests: Vec<TestOutcome>,
    pub overall_elapsed_ms: i64,
    pub overall_verdict: Verdict,
    pub diagnostics: Diagnostics,
}

impl Submission {
    pub fn new(request: SubmissionRequest, config: &Config) -> Self {
        let work_dir = config.work_dir(&request.session_id);
        let artifact_path = request.language.profile().artifact_path(&work_dir);
        Self {
            session_id: request.session_id,
            source_path: request.source_path,
            language: request.language,
            testcase_dir: request.testcase_dir,
            score: request.score,
            work_dir,
            artifact_path,
            tests: Vec::new(),
            overall_elapsed_ms: 0,
            overall_verdict: Verdict::Accepted,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Record one test and fold it into the overall time and verdict.
    pub fn record(&mut self, outcome: TestOutcome) {
        self.overall_elapsed_ms = self.overall_elapsed_ms.max(outcome.elapsed_ms);
        self.overall_verdict = self.overall_verdict.max(outcome.verdict);
        self.tests.push(outcome);
    }

    /// Build the report for how the stages ended.
    pub fn report(&mut self, status: StageStatus) -> JudgeReport {
        match status {
            StageStatus::Judged => JudgeReport::judged(
                &self.session_id,
                self.overall_elapsed_ms,
                self.overall_verdict,
                self.score,
                &self.tests,
                &self.diagnostics,
            ),
            StageStatus::CompileFailed => self.fail(Verdict::CompileError),
            StageStatus::Failed => self.fail(Verdict::InternalError),
        }
    }

    fn fail(&mut self, verdict: Verdict) -> JudgeReport {
        self.overall_verdict = verdict;
        JudgeReport::failed(&self.session_id, verdict, &self.diagnostics)
    }

    fn fail_with(&mut self, error: &JudgeError) -> JudgeReport {
        self.diagnostics.note(format_args!("{error}"));
        self.fail(Verdict::InternalError)
    }
}

/// How a submission's stages ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Every test ran; the verdict comes from the tests.
    Judged,
    /// The compiler rejected the program.
    CompileFailed,
    /// Transport, sandbox, or test-set failure.
    Failed,
}

/// One submission's channel to its sandbox: commands out through the
/// control client, completions back through its private route.
pub struct Session<R> {
    config: Arc<Config>,
    control: ControlClient,
    runtime: Arc<R>,
    sandbox: Sandbox,
    slot: CompletionSlot,
}

impl<R: SandboxRuntime> Session<R> {
    /// Send one command and wait for this session's next completion.
    async fn round(&mut self, command: String, mode: Mode) -> Result<CompletionRecord, JudgeError> {
        let request = CommandRequest::new(&self.sandbox.name, command, mode);
        self.control.send(&self.sandbox.address, &request).await?;
        self.slot.wait(self.config.completion_timeout()).await
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), JudgeError> {
        self.runtime
            .write_file(&self.sandbox.name, path, contents)
            .await
            .map_err(|e| JudgeError::sandbox(&self.sandbox.name, e))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, JudgeError> {
        self.runtime
            .read_file(&self.sandbox.name, path)
            .await
            .map_err(|e| JudgeError::sandbox(&self.sandbox.name, e))
    }
}

/// The judging engine shared by every submission task.
pub struct Judge<R> {
    config: Arc<Config>,
    sandboxes: SandboxManager<R>,
    correlator: Arc<Correlator>,
    runtime: Arc<R>,
}

impl<R> Clone for Judge<R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            sandboxes: self.sandboxes.clone(),
            correlator: Arc::clone(&self.correlator),
            runtime: Arc::clone(&self.runtime),
        }
    }
}

impl<R: SandboxRuntime + 'static> Judge<R> {
    pub fn new(config: Arc<Config>, runtime: Arc<R>, correlator: Arc<Correlator>) -> Self {
        Self {
            sandboxes: SandboxManager::new(Arc::clone(&runtime), &config),
            config,
            correlator,
            runtime,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Judge one submission line and deliver the outcome to the backend.
    pub async fn handle(&self, line: &str) {
        let report = self.evaluate(line).await;
        if let Err(e) = report.deliver(&self.config.backend_addr).await {
            error!(session = %report.session_id, error = %e, "Failed to deliver result");
        }
    }

    /// Judge one submission line.
    ///
    /// Always yields a report. The sandbox, once created, is released on
    /// every path, including a panic inside the stages.
    pub async fn evaluate(&self, line: &str) -> JudgeReport {
        let request = match SubmissionRequest::parse(line) {
            Ok(request) => request,
            Err(rejection) => {
                warn!(session = %rejection.session_id, reason = %rejection.reason, "Rejected submission");
                let mut diagnostics = Diagnostics::default();
                diagnostics.note(format_args!("{}", rejection.reason));
                return JudgeReport::failed(
                    &rejection.session_id,
                    Verdict::InternalError,
                    &diagnostics,
                );
            }
        };

        let mut submission = Submission::new(request, &self.config);
        self.judge(&mut submission).await
    }

    #[instrument(skip_all, fields(session = %submission.session_id, language = %submission.language))]
    async fn judge(&self, submission: &mut Submission) -> JudgeReport {
        info!("Judging submission");

        let slot = match self.correlator.register(&submission.session_id) {
            Ok(slot) => slot,
            Err(e) => return submission.fail_with(&e),
        };
        let sandbox = match self
            .sandboxes
            .acquire(&submission.session_id, &mut submission.diagnostics)
            .await
        {
            Ok(sandbox) => sandbox,
            Err(e) => return submission.fail_with(&e),
        };

        let session = Session {
            config: Arc::clone(&self.config),
            control: ControlClient::new(self.config.control_port),
            runtime: Arc::clone(&self.runtime),
            sandbox: sandbox.clone(),
            slot,
        };

        let (trace_tx, trace_rx) = oneshot::channel();
        let mut owned = submission.clone();
        let task = tokio::spawn(async move {
            let mut trace = UnwindTrace {
                submission: &mut owned,
                tx: Some(trace_tx),
            };
            let status = run_stages(&mut *trace.submission, session).await;
            trace.tx = None;
            drop(trace);
            (owned, status)
        });
        let status = match task.await {
            Ok((finished, status)) => {
                *submission = finished;
                status
            }
            Err(e) => {
                error!(error = %e, "Judge task aborted");
                if let Ok(trace) = trace_rx.await {
                    submission.diagnostics = trace;
                }
                submission.diagnostics.note(format_args!("judge task aborted: {e}"));
                StageStatus::Failed
            }
        };

        self.sandboxes
            .release(sandbox, &mut submission.diagnostics)
            .await;

        let report = submission.report(status);
        info!(verdict = %submission.overall_verdict, "Submission judged");
        report
    }
}

/// Hands the stages' diagnostics back to the judge when the stage task
/// unwinds before returning its submission.
struct UnwindTrace<'a> {
    submission: &'a mut Submission,
    tx: Option<oneshot::Sender<Diagnostics>>,
}

impl Drop for UnwindTrace<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tx.send(self.submission.diagnostics.clone()).ok();
        }
    }
}

async fn run_stages<R: SandboxRuntime>(
    submission: &mut Submission,
    mut session: Session<R>,
) -> StageStatus {
    if let Err(e) = compile::prepare(submission, &mut session).await {
        submission.diagnostics.note(format_args!("{e}"));
        return StageStatus::Failed;
    }

    match compile::compile(submission, &mut session).await {
        Ok(CompileOutcome::Proceed) => {}
        Ok(CompileOutcome::CompileFailed) => return StageStatus::CompileFailed,
        Err(e) => {
            submission.diagnostics.note(format_args!("{e}"));
            return StageStatus::Failed;
        }
    }

    match testcase::run_testcases(submission, &mut session).await {
        Ok(()) => StageStatus::Judged,
        Err(e) => {
            submission.diagnostics.note(format_args!("{e}"));
            StageStatus::Failed
        }
    }
}
