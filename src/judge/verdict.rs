//! Verdicts and per-test classification.

use std::fmt;

/// Judging outcome, ordered worst-wins.
///
/// The derived ordering is the aggregation rule: a submission's verdict is
/// the maximum over its tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    #[default]
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    RuntimeError,
    /// Reserved; no code path produces it.
    MemoryLimitExceeded,
    CompileError,
    InternalError,
}

impl Verdict {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Accepted => "AC",
            Self::WrongAnswer => "WA",
            Self::TimeLimitExceeded => "TLE",
            Self::RuntimeError => "RE",
            Self::MemoryLimitExceeded => "MLE",
            Self::CompileError => "CE",
            Self::InternalError => "IE",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify one finished test run.
///
/// Time is checked first (`elapsed_ms > tle_threshold_ms`), then stderr,
/// then output.
pub fn classify(
    elapsed_ms: i64,
    tle_threshold_ms: i64,
    stdout: &str,
    stderr: &str,
    expected: &str,
) -> Verdict {
    if elapsed_ms > tle_threshold_ms {
        Verdict::TimeLimitExceeded
    } else if !stderr.is_empty() {
        Verdict::RuntimeError
    } else if outputs_match(stdout, expected) {
        Verdict::Accepted
    } else {
        Verdict::WrongAnswer
    }
}

/// Line-by-line comparison with each line trimmed.
///
/// Only the first `min(actual, expected)` lines are compared, so surplus
/// lines on either side are never checked.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    actual
        .split('\n')
        .zip(expected.split('\n'))
        .all(|(a, e)| a.trim() == e.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_worst_wins() {
        let ranked = [
            Verdict::Accepted,
            Verdict::WrongAnswer,
            Verdict::TimeLimitExceeded,
            Verdict::RuntimeError,
            Verdict::MemoryLimitExceeded,
            Verdict::CompileError,
            Verdict::InternalError,
        ];
        assert!(ranked.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            [Verdict::WrongAnswer, Verdict::RuntimeError, Verdict::Accepted].into_iter().max(),
            Some(Verdict::RuntimeError)
        );
    }

    #[test]
    fn labels() {
        assert_eq!(Verdict::Accepted.to_string(), "AC");
        assert_eq!(Verdict::TimeLimitExceeded.to_string(), "TLE");
        assert_eq!(Verdict::InternalError.label(), "IE");
    }

    #[test]
    fn extra_actual_lines_are_ignored() {
        assert!(outputs_match("3\n5\nextra", "3\n5"));
        assert_eq!(classify(10, 2000, "3\n5\nextra", "", "3\n5"), Verdict::Accepted);
    }

    #[test]
    fn missing_actual_lines_are_ignored() {
        assert!(outputs_match("3", "3\n5\n"));
    }

    #[test]
    fn lines_are_trimmed() {
        assert!(outputs_match("Hello  \r\n", "Hello\n"));
        assert!(outputs_match("  42", "42"));
    }

    #[test]
    fn mismatch_is_wrong_answer() {
        assert_eq!(classify(10, 2000, "3\n6\n", "", "3\n5\n"), Verdict::WrongAnswer);
    }

    #[test]
    fn empty_output_against_nonempty_expected() {
        assert_eq!(classify(10, 2000, "", "", "Hello\n"), Verdict::WrongAnswer);
    }

    #[test]
    fn tle_boundary_is_inclusive_on_pass_side() {
        assert_eq!(classify(2000, 2000, "ok", "", "ok"), Verdict::Accepted);
        assert_eq!(classify(2001, 2000, "ok", "", "ok"), Verdict::TimeLimitExceeded);
    }

    #[test]
    fn tle_wins_over_stderr_and_mismatch() {
        assert_eq!(classify(2500, 2000, "x", "boom", "y"), Verdict::TimeLimitExceeded);
    }

    #[test]
    fn stderr_is_runtime_error_even_with_correct_output() {
        assert_eq!(classify(5, 2000, "ok", "warning", "ok"), Verdict::RuntimeError);
    }
}
