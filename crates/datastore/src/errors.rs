#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A declared type or a runtime value is outside the supported kinds, or a union other than optional-of-one-type
    /// was declared.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Schema error: {0}")]
    Schema(String),

    /// A stored timestamp couldn't be parsed back.  Never defaulted.
    #[error("Invalid date format in stored value {value:?}: {source}")]
    InvalidFormat {
        value: String,
        #[source]
        source: time::error::Parse,
    },

    #[error("No table named {0} has been registered")]
    UnknownSchema(String),

    #[error("The cursor is closed")]
    CursorClosed,

    #[error("{field}: got an absent value but the field isn't optional")]
    MissingValue { field: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shorthand for `Err(Error::UnsupportedType(..))` with `format!` arguments.
macro_rules! unsupported {
    ($($arg:tt)*) => {
        return Err($crate::errors::Error::UnsupportedType(format!($($arg)*)))
    };
}

/// Shorthand for `Err(Error::Schema(..))` with `format!` arguments.
macro_rules! schema_bail {
    ($($arg:tt)*) => {
        return Err($crate::errors::Error::Schema(format!($($arg)*)))
    };
}

pub(crate) use schema_bail;
pub(crate) use unsupported;
