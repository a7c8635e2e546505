use thiserror::Error;

/// Non-2xx answer from the Jira REST API.
#[derive(Debug, Error)]
#[error("Jira API error: {status} {body}")]
pub struct JiraError {
    pub status: u16,
    pub body: String,
}

/// Per-row outcomes that stop short of the desired state. None of them aborts a batch.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("parent issue '{parent}' is not defined in the CSV or in Jira")]
    ParentNotFound { parent: String },

    #[error("creating '{summary}' failed: {reason}")]
    CreateIssue { summary: String, reason: String },

    #[error("field {field} is not editable on {key}")]
    FieldNotEditable { key: String, field: String },

    #[error("no transition to '{target}' on {key} (available: {available:?})")]
    TransitionNotAvailable {
        key: String,
        target: String,
        available: Vec<String>,
    },

    #[error("resolution cannot be set on {key}")]
    ResolutionNotSettable { key: String },

    #[error("{0}")]
    Remote(String),
}

impl ImportError {
    pub fn remote(err: &anyhow::Error) -> Self {
        ImportError::Remote(format!("{err:#}"))
    }
}
