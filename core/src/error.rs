use thiserror::Error;

/// Failure kinds surfaced by the service layer.
///
/// Every variant is scoped to the single requested operation; none of them is
/// fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("Unsupported unit '{0}'")]
    UnsupportedUnit(String),
    #[error("Cannot convert between '{from}' and '{to}'")]
    IncompatibleUnits { from: String, to: String },
    /// The text-generation collaborator failed or replied with something unusable.
    #[error("{message}")]
    Generation {
        message: String,
        raw: Option<String>,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// The request field this error should be reported under, if any.
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            Self::UnsupportedUnit(_) | Self::IncompatibleUnits { .. } => Some("units"),
            Self::NotFound(_) | Self::Generation { .. } | Self::Store(_) => None,
        }
    }
}
