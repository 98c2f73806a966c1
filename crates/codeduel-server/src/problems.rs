use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use serde::Deserialize;

use codeduel_core::problem::{Problem, TestCase};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read problems file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse problems file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("problems file defines no problems")]
    Empty,
    #[error("problem {0} has no test cases")]
    NoTestCases(String),
}

#[derive(Deserialize)]
struct CatalogFile {
    problems: Vec<Problem>,
}

/// Problems a battle can be assigned. Each battle gets a shared, immutable snapshot.
#[derive(Debug, Clone)]
pub struct ProblemCatalog {
    problems: Vec<Arc<Problem>>,
}

impl ProblemCatalog {
    /// Build from a list, rejecting empty sets and problems without cases.
    pub fn new(problems: Vec<Problem>) -> Result<Self, CatalogError> {
        if problems.is_empty() {
            return Err(CatalogError::Empty);
        }
        if let Some(p) = problems.iter().find(|p| p.test_cases.is_empty()) {
            return Err(CatalogError::NoTestCases(p.id.clone()));
        }
        Ok(Self {
            problems: problems.into_iter().map(Arc::new).collect(),
        })
    }

    /// Load `[[problems]]` entries from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::new(file.problems)
    }

    pub fn builtin() -> Self {
        Self {
            problems: vec![Arc::new(two_sum()), Arc::new(palindrome())],
        }
    }

    /// Pick a problem uniformly at random.
    pub fn pick(&self) -> Arc<Problem> {
        let mut rng = rand::rng();
        match self.problems.choose(&mut rng) {
            Some(p) => Arc::clone(p),
            // `new` rejects empty catalogs and `builtin` is non-empty.
            None => Arc::new(two_sum()),
        }
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

fn case(input: &str, expected: &str) -> TestCase {
    TestCase {
        input: input.to_string(),
        expected: expected.to_string(),
    }
}

fn starter(js: &str, py: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("javascript".to_string(), js.to_string()),
        ("python".to_string(), py.to_string()),
    ])
}

fn two_sum() -> Problem {
    Problem {
        id: "two-sum".to_string(),
        title: "Two Sum".to_string(),
        description: "Given an array of integers nums and an integer target, return the \
                      indices of the two numbers that add up to target, in ascending order."
            .to_string(),
        function_name: "twoSum".to_string(),
        starter_code: starter(
            "function twoSum(nums, target) {\n  // your code here\n}\n",
            "def twoSum(nums, target):\n    # your code here\n    pass\n",
        ),
        test_cases: vec![
            case("[2,7,11,15], 9", "[0,1]"),
            case("[3,2,4], 6", "[1,2]"),
            case("[3,3], 6", "[0,1]"),
            case("[1,5,9,13], 22", "[2,3]"),
        ],
    }
}

fn palindrome() -> Problem {
    Problem {
        id: "is-palindrome".to_string(),
        title: "Valid Palindrome".to_string(),
        description: "Return true if the string reads the same forwards and backwards \
                      after removing non-alphanumeric characters and ignoring case."
            .to_string(),
        function_name: "isPalindrome".to_string(),
        starter_code: starter(
            "function isPalindrome(s) {\n  // your code here\n}\n",
            "def isPalindrome(s):\n    # your code here\n    pass\n",
        ),
        test_cases: vec![
            case("\"racecar\"", "true"),
            case("\"A man, a plan, a canal: Panama\"", "true"),
            case("\"hello\"", "false"),
            case("\"\"", "true"),
        ],
    }
}
