use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GroupError {
    #[error("{0}")]
    #[diagnostic(
        code(autogroup::validation),
        help("Check the group name, the logical operator and every condition of the rule tree")
    )]
    Validation(String),

    #[error("{0}")]
    #[diagnostic(code(autogroup::not_found))]
    NotFound(String),

    #[error("Unsupported field '{0}' in condition")]
    #[diagnostic(
        code(autogroup::unsupported_field),
        help("Supported fields: name, asset, location, type, subtype, contact, host-name, ip-address, hosted-by, group")
    )]
    UnsupportedField(String),

    #[error("Group with name '{0}' already exists")]
    #[diagnostic(code(autogroup::duplicate_name))]
    DuplicateName(String),

    #[error("Cyclic group reference detected: {0}")]
    #[diagnostic(
        code(autogroup::cyclic_reference),
        help("A group condition must not reference a group that (directly or indirectly) references it back")
    )]
    CyclicReference(String),

    #[error("Failed to access group store `{path}`: {source}")]
    #[diagnostic(
        code(autogroup::storage),
        help("Check that the storage directory exists and is writable")
    )]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Asset inventory error: {0}")]
    #[diagnostic(code(autogroup::inventory))]
    Inventory(String),

    #[error("{0}")]
    #[diagnostic(code(autogroup::bad_request))]
    BadRequest(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(autogroup::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(autogroup::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(autogroup::serde))]
    Serde(#[from] serde_json::Error),
}

impl GroupError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GroupError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GroupError::NotFound(msg.into())
    }

    /// Short stable name of the error family, used in logs and by the transport.
    pub fn kind(&self) -> &'static str {
        match self {
            GroupError::Validation(_) => "validation",
            GroupError::NotFound(_) => "not_found",
            GroupError::UnsupportedField(_) => "unsupported_field",
            GroupError::DuplicateName(_) => "duplicate_name",
            GroupError::CyclicReference(_) => "cyclic_reference",
            GroupError::Storage { .. } | GroupError::Io(_) => "storage",
            GroupError::Inventory(_) => "inventory",
            GroupError::BadRequest(_) => "bad_request",
            GroupError::Config(_) => "config",
            GroupError::Serde(_) => "serde",
        }
    }
}

pub type GroupResult<T> = Result<T, GroupError>;
