use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Languages the judge harness knows how to wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Python,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Javascript, Language::Python];

    /// Runtime name understood by the judge service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Javascript => "javascript",
            Self::Python => "python",
        }
    }

    /// File name for the submitted source.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Javascript => "solution.js",
            Self::Python => "solution.py",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Some(Self::Javascript),
            "python" | "py" => Some(Self::Python),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One graded case. Both fields are source literals: `input` is spliced into
/// the call's argument list and `expected` is compared against the printed
/// JSON result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected: String,
}

/// Problem snapshot attached to a battle. Never mutated once a battle holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Name of the function the harness invokes.
    pub function_name: String,
    /// Starter code keyed by language name (`"javascript"`, `"python"`).
    #[serde(default)]
    pub starter_code: BTreeMap<String, String>,
    pub test_cases: Vec<TestCase>,
}

impl Problem {
    pub fn starter_code_for(&self, language: Language) -> Option<&str> {
        self.starter_code.get(language.as_str()).map(String::as_str)
    }

    pub fn test_case_count(&self) -> usize {
        self.test_cases.len()
    }
}
