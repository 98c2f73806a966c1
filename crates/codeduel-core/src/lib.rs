pub mod battle;
pub mod harness;
pub mod net;
pub mod player;
pub mod problem;
pub mod room;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::collections::BTreeMap;

    use crate::problem::{Problem, TestCase};

    /// A problem whose function returns its argument. Case `i` has input and
    /// expected output `i + 1`, so a grader can tell cases apart by input.
    pub fn echo_problem(cases: usize) -> Problem {
        let mut starter_code = BTreeMap::new();
        starter_code.insert(
            "javascript".to_string(),
            "function echo(x) {\n  return x;\n}\n".to_string(),
        );
        Problem {
            id: "echo".to_string(),
            title: "Echo".to_string(),
            description: "Return the argument unchanged.".to_string(),
            function_name: "echo".to_string(),
            starter_code,
            test_cases: (1..=cases)
                .map(|i| TestCase {
                    input: i.to_string(),
                    expected: i.to_string(),
                })
                .collect(),
        }
    }
}
