use chrono::Weekday;
use thiserror::Error;
use weatherdeck_cloud::CloudError;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("Failed to read stack file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stack '{stack}' is missing required setting '{setting}'")]
    MissingSetting { stack: String, setting: &'static str },

    #[error("Stack '{0}' declares no operator identities")]
    NoOperators(String),

    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Unknown variant '{0}' (expected package, vault, container or container-sql)")]
    UnknownVariant(String),

    #[error("Stack '{name}' not found (available: {available})")]
    StackNotFound { name: String, available: String },

    #[error("Stack '{0}' is declared more than once")]
    DuplicateStack(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Deployments are frozen on {day}")]
    DeploymentFrozen { day: Weekday },

    #[error(transparent)]
    Graph(#[from] CloudError),
}

impl StackError {
    /// Whether this is the deployment freeze rather than a failure
    pub fn is_frozen(&self) -> bool {
        matches!(self, StackError::DeploymentFrozen { .. })
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
