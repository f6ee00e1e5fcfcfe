use crate::value::Value;
use thiserror::Error;

pub type OrmResult<T> = Result<T, OrmError>;

/// ORM error taxonomy.
///
/// Every failure in this crate is immediate and synchronous; nothing is
/// retried or suppressed. Backend errors are wrapped opaquely in `Driver`.
#[derive(Error, Debug)]
pub enum OrmError {
    #[error("validation error: {property} cannot accept {value:?}")]
    Validation { property: String, value: Value },

    #[error("compile error: {message}")]
    Compile { message: String },

    #[error("not found: no row matched the primary key of {table}")]
    NotFound { table: String },

    #[error("driver error: {message}")]
    Driver { message: String },

    #[error("schema error: {message}")]
    Schema { message: String },
}

impl OrmError {
    pub fn validation(property: impl Into<String>, value: Value) -> Self {
        OrmError::Validation {
            property: property.into(),
            value,
        }
    }

    pub fn compile(message: impl Into<String>) -> Self {
        OrmError::Compile {
            message: message.into(),
        }
    }

    pub fn not_found(table: impl Into<String>) -> Self {
        OrmError::NotFound {
            table: table.into(),
        }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        OrmError::Driver {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        OrmError::Schema {
            message: message.into(),
        }
    }
}
