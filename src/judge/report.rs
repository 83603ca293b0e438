//! Result formatting and delivery to the backend.

use std::fmt;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

use super::verdict::Verdict;

/// Human-readable trace accumulated while judging one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(String);

impl Diagnostics {
    /// Append one line. Also emitted as a debug event.
    pub fn note(&mut self, args: fmt::Arguments<'_>) {
        debug!(note = %args, "Diagnostic");
        self.0.push_str(&args.to_string());
        self.0.push('\n');
    }

    /// Append raw text, such as captured stderr, line by line.
    pub fn append(&mut self, text: &str) {
        for line in text.trim_end_matches('\n').split('\n') {
            self.note(format_args!("{line}"));
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The per-test entry of a result line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub name: String,
    pub elapsed_ms: i64,
    pub verdict: Verdict,
}

/// Everything the backend receives for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeReport {
    pub session_id: String,
    pub result_line: String,
    pub diagnostics: String,
}

impl JudgeReport {
    /// Report for a submission that finished testing.
    pub fn judged(
        session_id: &str,
        overall_elapsed_ms: i64,
        overall: Verdict,
        score: i64,
        tests: &[TestOutcome],
        diagnostics: &Diagnostics,
    ) -> Self {
        let awarded = if overall == Verdict::Accepted { score } else { 0 };
        let per_test: String = tests
            .iter()
            .map(|test| format!("{},{},", test.verdict, test.elapsed_ms))
            .collect();
        let result_line =
            format!("{session_id},{overall_elapsed_ms},undef,{overall},{awarded},{per_test}");

        Self {
            session_id: session_id.to_string(),
            result_line,
            diagnostics: diagnostics.as_str().to_string(),
        }
    }

    /// Report for a submission that never reached or finished testing.
    pub fn failed(session_id: &str, verdict: Verdict, diagnostics: &Diagnostics) -> Self {
        Self {
            session_id: session_id.to_string(),
            result_line: format!("{session_id},-1,undef,{verdict},0,"),
            diagnostics: diagnostics.as_str().to_string(),
        }
    }

    /// The verdict label carried by the result line.
    pub fn verdict_label(&self) -> Option<&str> {
        self.result_line.split(',').nth(3)
    }

    /// The two newline-terminated lines sent to the backend.
    pub fn render(&self) -> String {
        let result = self.result_line.trim_matches('\n');
        let error = format!("error,{},{}", self.session_id, self.diagnostics);
        format!("{result}\n{}\n", error.trim_matches('\n'))
    }

    /// Send the report in a single write. Not retried; no acknowledgment is
    /// awaited.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn deliver(&self, backend_addr: &str) -> Result<()> {
        let payload = self.render();
        let mut stream = TcpStream::connect(backend_addr)
            .await
            .with_context(|| format!("Failed to connect to backend {backend_addr}"))?;
        stream
            .write_all(payload.as_bytes())
            .await
            .context("Failed to write result")?;
        stream.shutdown().await.context("Failed to close result stream")?;

        info!(result = %self.result_line, "Result delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn outcome(name: &str, elapsed_ms: i64, verdict: Verdict) -> TestOutcome {
        TestOutcome {
            name: name.into(),
            elapsed_ms,
            verdict,
        }
    }

    #[test]
    fn accepted_awards_full_score() {
        let tests = [
            outcome("01.txt", 12, Verdict::Accepted),
            outcome("02.txt", 30, Verdict::Accepted),
        ];
        let report = JudgeReport::judged("s1", 30, Verdict::Accepted, 100, &tests, &Diagnostics::default());
        assert_eq!(report.result_line, "s1,30,undef,AC,100,AC,12,AC,30,");
        assert_eq!(report.verdict_label(), Some("AC"));
    }

    #[test]
    fn anything_else_awards_zero() {
        let tests = [
            outcome("01.txt", 12, Verdict::Accepted),
            outcome("02.txt", 2100, Verdict::TimeLimitExceeded),
        ];
        let report = JudgeReport::judged(
            "s1",
            2100,
            Verdict::TimeLimitExceeded,
            100,
            &tests,
            &Diagnostics::default(),
        );
        assert_eq!(report.result_line, "s1,2100,undef,TLE,0,AC,12,TLE,2100,");
    }

    #[test]
    fn failed_report_shape() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.note(format_args!("Main.c:1: error"));
        let report = JudgeReport::failed("s2", Verdict::CompileError, &diagnostics);
        assert_eq!(
            report.render(),
            "s2,-1,undef,CE,0,\nerror,s2,Main.c:1: error\n"
        );
    }

    #[test]
    fn render_ends_each_line_with_one_newline() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.append("line one\nline two\n");
        let report = JudgeReport::failed("s3", Verdict::InternalError, &diagnostics);

        let rendered = report.render();
        assert!(rendered.ends_with("line two\n"));
        assert!(!rendered.ends_with("\n\n"));
        assert!(rendered.starts_with("s3,-1,undef,IE,0,\nerror,s3,line one\n"));
    }

    #[test]
    fn empty_diagnostics_still_produce_error_line() {
        let report = JudgeReport::failed("", Verdict::InternalError, &Diagnostics::default());
        assert_eq!(report.render(), ",-1,undef,IE,0,\nerror,,\n");
    }

    #[tokio::test]
    async fn deliver_writes_both_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let backend = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            conn.read_to_string(&mut received).await.unwrap();
            received
        });

        let report = JudgeReport::failed("s4", Verdict::InternalError, &Diagnostics::default());
        report.deliver(&addr).await.unwrap();

        assert_eq!(backend.await.unwrap(), "s4,-1,undef,IE,0,\nerror,s4,\n");
    }

    #[tokio::test]
    async fn deliver_to_closed_backend_fails() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let report = JudgeReport::failed("s5", Verdict::InternalError, &Diagnostics::default());
        assert!(report.deliver(&addr).await.is_err());
    }
}
