//! JSON result envelopes handed to callers that only see strings.
//!
//! Every C ABI call and every `--json` CLI invocation answers with one
//! object of the shape `{"Status":"ok","Message":"..."}`; seed list lookups
//! additionally carry a `Seedlist` array.

use crate::error::NodeError;
use serde::{Deserialize, Serialize};

/// Outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The operation succeeded.
    Ok,
    /// The operation failed; the message says why.
    Err,
}

/// A status/message pair, serialised with the field names C callers expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusReport {
    /// Outcome.
    pub status: Status,
    /// Result value on success, error text on failure.
    pub message: String,
    /// Seed list, present only for seed list lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seedlist: Option<Vec<String>>,
}

impl StatusReport {
    /// Successful report.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
            seedlist: None,
        }
    }

    /// Failed report.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            status: Status::Err,
            message: message.into(),
            seedlist: None,
        }
    }

    /// Successful seed list report.
    pub fn seedlist(seeds: Vec<String>) -> Self {
        Self {
            seedlist: Some(seeds),
            ..Self::ok("Seedlist retrieved from IPFS")
        }
    }

    /// Report for a seed list lookup. Malformed lists keep their own message;
    /// other failures are reported as fetch failures.
    pub fn from_seedlist(result: Result<Vec<String>, NodeError>) -> Self {
        match result {
            Ok(seeds) => Self::seedlist(seeds),
            Err(e @ NodeError::InvalidSeedlist(_)) => Self::err(e.to_string()),
            Err(e) => Self::err(format!("Unable to fetch seedlist: {e}")),
        }
    }

    /// Report for a result: the value's `Display` on success, the error on
    /// failure.
    pub fn from_result<T: std::fmt::Display>(result: Result<T, NodeError>) -> Self {
        match result {
            Ok(value) => Self::ok(value.to_string()),
            Err(e) => Self::err(e.to_string()),
        }
    }

    /// Like [`StatusReport::from_result`] but prefixes failures with `context`.
    pub fn from_result_with<T: std::fmt::Display>(
        result: Result<T, NodeError>,
        context: &str,
    ) -> Self {
        match result {
            Ok(value) => Self::ok(value.to_string()),
            Err(e) => Self::err(format!("{context}: {e}")),
        }
    }

    /// Whether the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Serialise to the JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a JSON envelope.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
