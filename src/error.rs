//! Error types for the verification harness

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Browser failed to launch: {0}")]
    Launch(String),

    #[error("Navigation to {url} did not stabilize within {waited:?}")]
    NavigationTimeout { url: String, waited: Duration },

    #[error("Element not actionable for {action} within {waited:?}: {target}")]
    InteractionTimeout {
        action: &'static str,
        target: String,
        waited: Duration,
    },

    #[error("Expected state did not appear within {waited:?}: {target}")]
    AssertionTimeout { target: String, waited: Duration },

    #[error("Dialog mismatch: expected {expected:?}, observed {observed:?}")]
    DialogMismatch {
        expected: Vec<String>,
        observed: Vec<String>,
    },

    #[error("Target application unreachable at {0}")]
    TargetUnreachable(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Invalid route pattern '{pattern}': {reason}")]
    RoutePattern { pattern: String, reason: String },

    #[error("CDP protocol error: {0}")]
    Protocol(String),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
