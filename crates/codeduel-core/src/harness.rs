//! Wraps a submission so the judge prints one JSON-encoded result per run.

use crate::battle::Verdict;
use crate::problem::{Language, TestCase};

/// Append a call to `function_name` with the case's literal arguments and
/// print the compact JSON result on its own line.
pub fn build_submission(
    language: Language,
    code: &str,
    function_name: &str,
    case: &TestCase,
) -> String {
    match language {
        Language::Javascript => format!(
            "{code}\n\nconsole.log(JSON.stringify({function_name}({input})));\n",
            input = case.input
        ),
        Language::Python => format!(
            "{code}\n\nimport json as __duel_json\nprint(__duel_json.dumps({function_name}({input}), separators=(\",\", \":\")))\n",
            input = case.input
        ),
    }
}

/// Compare judge stdout against the expected literal. Only the last non-empty
/// line counts, so stray debug prints in the submission do not fail a case.
pub fn output_matches(stdout: &str, expected: &str) -> bool {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .is_some_and(|line| line == expected.trim())
}

/// Verdict for one executed case.
pub fn verdict_for(exit_code: Option<i32>, stdout: &str, expected: &str) -> Verdict {
    if exit_code.is_some_and(|c| c != 0) {
        return Verdict::Failed;
    }
    if output_matches(stdout, expected) {
        Verdict::Passed
    } else {
        Verdict::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase {
            input: input.into(),
            expected: expected.into(),
        }
    }

    #[test]
    fn javascript_harness_calls_function() {
        let src = build_submission(
            Language::Javascript,
            "function twoSum(a, t) { return [0, 1]; }",
            "twoSum",
            &case("[2, 7, 11, 15], 9", "[0,1]"),
        );
        assert!(src.starts_with("function twoSum"));
        assert!(src.contains("console.log(JSON.stringify(twoSum([2, 7, 11, 15], 9)));"));
    }

    #[test]
    fn python_harness_uses_compact_json() {
        let src = build_submission(
            Language::Python,
            "def twoSum(a, t):\n    return [0, 1]",
            "twoSum",
            &case("[2, 7, 11, 15], 9", "[0,1]"),
        );
        assert!(src.contains("print(__duel_json.dumps(twoSum([2, 7, 11, 15], 9)"));
        assert!(src.contains("separators=(\",\", \":\")"));
    }

    #[test]
    fn last_line_is_compared() {
        assert!(output_matches("debug\n[0,1]\n", "[0,1]"));
        assert!(output_matches("[0,1]\n\n  \n", " [0,1] "));
        assert!(!output_matches("[0,1]\ndebug\n", "[0,1]"));
        assert!(!output_matches("", "[0,1]"));
    }

    #[test]
    fn nonzero_exit_fails_even_with_matching_output() {
        assert_eq!(verdict_for(Some(1), "true", "true"), Verdict::Failed);
        assert_eq!(verdict_for(Some(0), "true", "true"), Verdict::Passed);
        assert_eq!(verdict_for(None, "true", "true"), Verdict::Passed);
        assert_eq!(verdict_for(Some(0), "false", "true"), Verdict::Failed);
    }
}
