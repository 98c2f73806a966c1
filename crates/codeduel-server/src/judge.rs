use std::time::Duration;

use futures::future::{BoxFuture, try_join_all};
use serde::{Deserialize, Serialize};

use codeduel_core::battle::Verdict;
use codeduel_core::harness::{build_submission, verdict_for};
use codeduel_core::problem::{Language, Problem};

use crate::config::JudgeConfig;
use crate::error::CollaboratorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

/// One execution request in the Piston `/execute` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JudgeRequest {
    pub language: String,
    pub version: String,
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JudgeResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Sandboxed code execution. The judge is trusted to report what the code printed.
pub trait Judge: Send + Sync {
    fn execute(&self, request: JudgeRequest) -> BoxFuture<'_, Result<JudgeResponse, CollaboratorError>>;
}

#[derive(Deserialize)]
struct PistonResponse {
    run: PistonRun,
}

#[derive(Deserialize)]
struct PistonRun {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    code: Option<i32>,
}

/// HTTP client for a Piston-compatible execution service.
pub struct PistonJudge {
    client: reqwest::Client,
    execute_url: String,
    timeout: Duration,
}

impl PistonJudge {
    pub fn new(config: &JudgeConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("codeduel-judge/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build judge HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            execute_url: format!("{}/execute", config.url.trim_end_matches('/')),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Judge for PistonJudge {
    fn execute(&self, request: JudgeRequest) -> BoxFuture<'_, Result<JudgeResponse, CollaboratorError>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(&self.execute_url)
                .timeout(self.timeout)
                .json(&request)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(CollaboratorError::Status(resp.status().as_u16()));
            }
            let body: PistonResponse = resp.json().await?;
            Ok(JudgeResponse {
                stdout: body.run.stdout,
                stderr: body.run.stderr,
                exit_code: body.run.code,
            })
        })
    }
}

/// Run a submission against every test case of `problem`, one judge request
/// per case, all in flight at once. Any request failing fails the whole run,
/// so the caller never sees a partial verdict vector.
pub async fn grade(
    judge: &dyn Judge,
    problem: &Problem,
    language: Language,
    version: &str,
    code: &str,
) -> Result<Vec<Verdict>, CollaboratorError> {
    let runs = problem.test_cases.iter().map(|case| {
        let request = JudgeRequest {
            language: language.as_str().to_string(),
            version: version.to_string(),
            files: vec![SourceFile {
                name: language.file_name().to_string(),
                content: build_submission(language, code, &problem.function_name, case),
            }],
        };
        async move {
            let response = judge.execute(request).await?;
            if !response.stderr.is_empty() {
                tracing::debug!(stderr = %response.stderr, "Judge reported stderr");
            }
            Ok::<_, CollaboratorError>(verdict_for(
                response.exit_code,
                &response.stdout,
                &case.expected,
            ))
        }
    });
    try_join_all(runs).await
}
