use crate::backend::BackendError;
use thiserror::Error;

/// Result type alias for stager operations
pub type Result<T, E = StagerError> = std::result::Result<T, E>;

/// Errors that can occur while staging, resolving or replicating.
#[derive(Error, Debug)]
pub enum StagerError {
    #[error("artifact name \"{name}\" does not satisfy \"{expression}\"")]
    ProjectName {
        name: String,
        expression: &'static str,
    },

    #[error("\"{version}\" is not a valid semantic version: {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("{}", no_configuration_message(.key.as_deref()))]
    NoConfiguration { key: Option<String> },

    #[error("{variable} is empty or not set.")]
    NoRegionsConfigured { variable: String },

    #[error("parameter \"{name}\" was not found")]
    ParameterNotFound { name: String },

    #[error("You do not have permission to get the Systems Manager parameter \"{arn}\".")]
    NotAllowedToGetParameter { arn: String },

    #[error("You do not have permission to put the Systems Manager parameter \"{arn}\".")]
    NotAllowedToPutParameter { arn: String },

    #[error(
        "You do not have permission to get the Systems Manager parameter \"{arn}\".\n\n{}",
        config_parameter_help("ssm:GetParameter")
    )]
    NotAllowedToGetConfigParameter { arn: String },

    #[error(
        "You do not have permission to put the Systems Manager parameter \"{arn}\".\n\n{}",
        config_parameter_help("ssm:PutParameter")
    )]
    NotAllowedToPutConfigParameter { arn: String },

    #[error("{project} {version} is already staged.")]
    ArtifactVersionExists { project: String, version: String },

    #[error("None of the configured regions are available: {regions:?}")]
    NoRegionsAvailable { regions: Vec<String> },

    #[error("Could not stage to any regions.")]
    CannotStage,

    #[error("Could not stage to every region. Failed in: {}", .failed.join(", "))]
    NotAllRegionsSucceeded { failed: Vec<String> },

    #[error("{region}: {source}")]
    Backend {
        region: String,
        #[source]
        source: BackendError,
    },

    #[error("Configuration is not valid: {0}")]
    InvalidConfiguration(#[source] serde_json::Error),

    #[error("Metadata is not valid: {0}")]
    InvalidMetadata(#[source] serde_json::Error),

    #[error("A regional task failed in {region}: {message}")]
    TaskFailed { region: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StagerError {
    /// True when a backend reported the requested object or parameter absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StagerError::ParameterNotFound { .. }
                | StagerError::Backend {
                    source: BackendError::NotFound,
                    ..
                }
        )
    }

    /// True for the write-once violation, which must reach callers as-is.
    pub fn is_already_staged(&self) -> bool {
        matches!(self, StagerError::ArtifactVersionExists { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            StagerError::NotAllowedToGetParameter { .. }
                | StagerError::NotAllowedToPutParameter { .. }
                | StagerError::NotAllowedToGetConfigParameter { .. }
                | StagerError::NotAllowedToPutConfigParameter { .. }
                | StagerError::Backend {
                    source: BackendError::PermissionDenied,
                    ..
                }
        )
    }
}

fn no_configuration_message(key: Option<&str>) -> String {
    let msg = match key {
        None => "The organisation configuration is empty.".to_string(),
        Some(key) => format!("The organisation configuration key \"{key}\" is empty."),
    };
    format!("{msg} Have you run \"startifact config set\"?")
}

fn config_parameter_help(action: &str) -> String {
    format!(
        "If your configuration is held in a different parameter then set the \
         environment variable STARTIFACT_PARAMETER to the name of that parameter.\n\n\
         If the parameter name is correct then ensure your IAM policy grants \
         \"{action}\" on the parameter.\n\n\
         Note that IAM policy changes can take several minutes to take effect."
    )
}
