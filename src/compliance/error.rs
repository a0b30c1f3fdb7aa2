use crate::compliance::domain::StepStatus;

#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create compliance database parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("json encoding failed for {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("template validation failed: {0}")]
    InvalidTemplate(String),
    #[error("step payload validation failed: {0}")]
    InvalidPayload(String),
    #[error("step `{step_id}` transition `{from}` -> `{to}` is invalid")]
    InvalidTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
    },
    #[error("step `{step_id}` changed concurrently; expected status `{expected}`")]
    ConcurrentModification {
        step_id: String,
        expected: StepStatus,
    },
    #[error("deliverable `{deliverable_id}` already has an instantiated step chain")]
    ChainAlreadyInstantiated { deliverable_id: String },
    #[error("rejection reason must be non-empty")]
    MissingRejectionReason,
    #[error("actor `{actor_id}` is not an administrator")]
    NotAdministrator { actor_id: String },
    #[error("invalid {field} `{value}` in database")]
    InvalidStoredValue { field: &'static str, value: String },
}

impl From<rusqlite::Error> for ComplianceError {
    fn from(source: rusqlite::Error) -> Self {
        Self::Sql { source }
    }
}
