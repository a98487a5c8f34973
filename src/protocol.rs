//! Wire protocol: newline-delimited UTF-8 JSON frames.
//!
//! ## Requests
//!
//! ```text
//! {"request_type":"run_suite","body":{"base_dir":"/path","matcher":".*Test","dependencies":["/lib"],"is_blocking":true}}
//! {"request_type":"shutdown"}
//! ```
//!
//! `matcher` defaults to [`DEFAULT_MATCHER`] and is a full-match regex over file names. `dependencies` defaults to
//! `[base_dir]`; when given, `base_dir` is appended. `is_blocking` defaults to `true`.
//!
//! ## Responses
//!
//! ```text
//! {"is_success":true,"response":{"suite_id":0}}
//! {"is_success":true}
//! {"is_success":false,"error":"..."}
//! ```

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::BatchId;

/// Matches the executables cargo builds for test targets: `<name>-<16 hex digit hash>`.
pub const DEFAULT_MATCHER: &str = ".*-[0-9a-f]{16}";

/// Prefix of every error response caused by a malformed request.
pub const PARSE_ERROR_PREFIX: &str = "Failed to parse request: ";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("request is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid matcher `{pattern}`: {source}")]
    InvalidMatcher {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ProtocolError {
    /// The error text sent back to the client.
    pub fn client_message(&self) -> String {
        format!("{PARSE_ERROR_PREFIX}{self}")
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A request frame exactly as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request_type", rename_all = "snake_case")]
pub enum RequestFrame {
    RunSuite { body: RunSuiteBody },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSuiteBody {
    pub base_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blocking: Option<bool>,
}

impl RequestFrame {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A validated request.
#[derive(Debug)]
pub enum ClientRequest {
    RunSuite(Submission),
    Shutdown,
}

/// What to run: every file under `base_dir` whose name matches `matcher`.
#[derive(Debug)]
pub struct Submission {
    base_dir: PathBuf,
    matcher: Regex,
    dependencies: Vec<PathBuf>,
    blocking: bool,
}

impl Submission {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        matcher: &str,
        dependencies: Option<Vec<PathBuf>>,
        blocking: bool,
    ) -> Result<Self, ProtocolError> {
        let base_dir = base_dir.into();
        let matcher = compile_full_match(matcher)?;
        let dependencies = match dependencies {
            None => vec![base_dir.clone()],
            Some(mut deps) => {
                deps.push(base_dir.clone());
                deps
            }
        };
        Ok(Self {
            base_dir,
            matcher,
            dependencies,
            blocking,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn matcher(&self) -> &Regex {
        &self.matcher
    }

    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    /// Blocking submissions are answered once the batch completes; others as soon as they are admitted.
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }
}

fn compile_full_match(pattern: &str) -> Result<Regex, ProtocolError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| ProtocolError::InvalidMatcher {
        pattern: pattern.to_string(),
        source,
    })
}

/// Parses one frame (delimiter already stripped).
/// Parses one raw frame as it came off the socket. Bytes that are not UTF-8 are a malformed request.
pub fn parse_frame(frame: &[u8]) -> Result<ClientRequest, ProtocolError> {
    parse_request(std::str::from_utf8(frame)?)
}

pub fn parse_request(frame: &str) -> Result<ClientRequest, ProtocolError> {
    match serde_json::from_str::<RequestFrame>(frame)? {
        RequestFrame::Shutdown => Ok(ClientRequest::Shutdown),
        RequestFrame::RunSuite { body } => {
            let matcher = body.matcher.as_deref().unwrap_or(DEFAULT_MATCHER);
            let dependencies = body
                .dependencies
                .map(|deps| deps.into_iter().map(PathBuf::from).collect());
            let submission =
                Submission::new(body.base_dir, matcher, dependencies, body.is_blocking.unwrap_or(true))?;
            Ok(ClientRequest::RunSuite(submission))
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteRef {
    pub suite_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    pub is_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<SuiteRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    pub fn suite(batch: BatchId) -> Self {
        Self {
            is_success: true,
            response: Some(SuiteRef { suite_id: batch.0 }),
            error: None,
        }
    }

    pub fn ack() -> Self {
        Self {
            is_success: true,
            response: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            is_success: false,
            response: None,
            error: Some(error.into()),
        }
    }

    /// Serializes to one line of JSON, without the trailing delimiter.
    pub fn encode(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"is_success":false,"error":"response encoding failed: {e}"}}"#))
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

// ============================================================================
// Tests
// ============================================================================
