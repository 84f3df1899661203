use thiserror::Error;

/// Failure to obtain a bearer token from the instance's OAuth endpoint.
///
/// This is the only failure that reaches HTTP callers as a non-200 response:
/// without a token no record query can run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to obtain access token: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to obtain access token: {status} {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to obtain access token: invalid token response: {0}")]
    InvalidResponse(String),
}

/// Invalid service configuration detected at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("instance_url must start with http:// or https:// (got {0:?})")]
    InvalidInstanceUrl(String),

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Rejected inbound question.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuestionError {
    #[error("question cannot be empty")]
    Empty,
}

/// Model output that parsed as JSON but does not describe a usable plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("unknown query_type {0:?}")]
    UnknownQueryType(String),

    #[error("plan is missing {0}")]
    MissingSubPlan(&'static str),

    #[error("plan has no filter in {0}")]
    MissingFilter(&'static str),
}

/// Failure while executing a query plan.
#[derive(Debug, Error)]
pub(crate) enum ProcessError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Unexpected(String),
}
