//! Work-directory preparation and the compile stage.

use tracing::{debug, info, instrument};

use super::{Session, Submission};
use crate::error::JudgeError;
use crate::sandbox::SandboxRuntime;
use crate::transport::Mode;

/// Result of a compile stage that reached the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Artifact is ready to run.
    Proceed,
    /// The compiler (or syntax check) reported failure.
    CompileFailed,
}

/// Create the work directory inside the sandbox and stage the source as
/// `Main.<ext>`.
#[instrument(skip_all)]
pub(super) async fn prepare<R: SandboxRuntime>(
    submission: &mut Submission,
    session: &mut Session<R>,
) -> Result<(), JudgeError> {
    let record = session
        .round(format!("mkdir -p {}", submission.work_dir), Mode::Others)
        .await?;
    if !record.error_message.is_empty() {
        submission
            .diagnostics
            .note(format_args!("{}", record.error_message));
    }

    let source = tokio::fs::read(&submission.source_path)
        .await
        .map_err(|e| JudgeError::read(&submission.source_path, e))?;
    let staged = submission
        .language
        .profile()
        .source_path(&submission.work_dir);
    session.write_file(&staged, &source).await?;

    debug!(path = %staged, len = source.len(), "Source staged");
    Ok(())
}

/// Compile the staged source, then hand the artifact to the execution
/// user.
///
/// Interpreted languages skip the compile round unless syntax checks are
/// enabled. `Err` means the agent could not be reached or never answered.
#[instrument(skip_all)]
pub(super) async fn compile<R: SandboxRuntime>(
    submission: &mut Submission,
    session: &mut Session<R>,
) -> Result<CompileOutcome, JudgeError> {
    let profile = submission.language.profile();

    if !profile.check_only || session.config.syntax_check_interpreted {
        let record = session
            .round(profile.compile_command(&submission.work_dir), Mode::Others)
            .await?;
        if !record.error_message.is_empty() {
            submission
                .diagnostics
                .note(format_args!("{}", record.error_message));
        }
        if !record.success {
            info!(elapsed_ms = record.elapsed_ms, "Compilation failed");
            return Ok(CompileOutcome::CompileFailed);
        }
        debug!(elapsed_ms = record.elapsed_ms, "Compiled");
    }

    let chown = format!(
        "chown {} {}",
        session.config.exec_user, submission.artifact_path
    );
    let record = session.round(chown, Mode::Others).await?;
    if !record.success {
        submission
            .diagnostics
            .note(format_args!("chown failed: {}", record.error_message));
    }

    Ok(CompileOutcome::Proceed)
}
