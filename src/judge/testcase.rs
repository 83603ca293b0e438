//! Test execution stage.
//!
//! A test directory holds `testcase_list.txt` (one case name per line),
//! `in/<name>`, and `out/<name>`. Every listed case runs even after a
//! failing one; only unreadable test data aborts the stage.

use std::path::Path;

use tracing::{debug, instrument};

use super::verdict::{classify, Verdict};
use super::{Session, Submission, TestOutcome};
use crate::error::JudgeError;
use crate::sandbox::SandboxRuntime;
use crate::transport::Mode;

const MANIFEST: &str = "testcase_list.txt";
const STAGED_INPUT: &str = "testcase.txt";
const CAPTURED_STDOUT: &str = "userStdout.txt";
const CAPTURED_STDERR: &str = "userStderr.txt";

/// Read the ordered case names from a test directory's manifest.
///
/// Names are trimmed and blank lines skipped. More than `max` names is an
/// error rather than a silent truncation.
pub async fn read_manifest(dir: &Path, max: usize) -> Result<Vec<String>, JudgeError> {
    let path = dir.join(MANIFEST);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| JudgeError::read(&path, e))?;

    let names: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect();

    if names.len() > max {
        return Err(JudgeError::TooManyTestcases {
            found: names.len(),
            max,
        });
    }
    Ok(names)
}

async fn read_test_file(path: &Path) -> Result<Vec<u8>, JudgeError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| JudgeError::read(path, e))
}

#[instrument(skip_all)]
pub(super) async fn run_testcases<R: SandboxRuntime>(
    submission: &mut Submission,
    session: &mut Session<R>,
) -> Result<(), JudgeError> {
    let names = read_manifest(&submission.testcase_dir, session.config.max_testcases).await?;
    let profile = submission.language.profile();
    let work_dir = submission.work_dir.clone();
    let run = profile.run_command(&work_dir, session.config.run_timeout_seconds);

    for name in names {
        let expected = read_test_file(&submission.testcase_dir.join("out").join(&name)).await?;
        let input = read_test_file(&submission.testcase_dir.join("in").join(&name)).await?;

        session
            .write_file(&format!("{work_dir}/{STAGED_INPUT}"), &input)
            .await?;
        let record = session.round(run.clone(), Mode::Judge).await?;

        let stdout = session
            .read_file(&format!("{work_dir}/{CAPTURED_STDOUT}"))
            .await?;
        let stderr = session
            .read_file(&format!("{work_dir}/{CAPTURED_STDERR}"))
            .await?;
        let stdout = String::from_utf8_lossy(&stdout);
        let stderr = String::from_utf8_lossy(&stderr);

        let verdict = classify(
            record.elapsed_ms,
            session.config.tle_threshold_ms,
            &stdout,
            &stderr,
            &String::from_utf8_lossy(&expected),
        );
        if verdict == Verdict::RuntimeError {
            submission.diagnostics.append(&stderr);
        }

        debug!(test = %name, elapsed_ms = record.elapsed_ms, %verdict, "Test finished");
        submission.record(TestOutcome {
            name,
            elapsed_ms: record.elapsed_ms,
            verdict,
        });
    }

    Ok(())
}
