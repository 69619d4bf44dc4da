//! Domain error types.

/// A rejected input, naming the offending field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Top-level error type for sportfund.
#[derive(Debug, thiserror::Error)]
pub enum SportfundError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("email already registered: {email}")]
    DuplicateAccount { email: String },

    #[error("password hashing failed: {reason}")]
    PasswordHash { reason: String },

    #[error("catalog file error: {reason}")]
    Catalog { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SportfundError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn query(err: impl std::fmt::Display) -> Self {
        Self::DatabaseQuery {
            reason: err.to_string(),
        }
    }
}

impl From<&SportfundError> for std::process::ExitCode {
    fn from(err: &SportfundError) -> Self {
        let code: u8 = match err {
            SportfundError::Io(_) | SportfundError::PasswordHash { .. } => 1,
            SportfundError::ConfigParse { .. }
            | SportfundError::ConfigMissing { .. }
            | SportfundError::ConfigInvalid { .. } => 2,
            SportfundError::Database { .. } | SportfundError::DatabaseQuery { .. } => 3,
            SportfundError::Validation(_)
            | SportfundError::DuplicateAccount { .. }
            | SportfundError::Catalog { .. } => 4,
            SportfundError::NotFound { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
