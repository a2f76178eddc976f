//! Flat mapping from driver error codes to a semantic error taxonomy.

use std::fmt;

/// Semantic classification of a [`crate::DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    CheckViolation,
    Deadlock,
    SerializationFailure,
    Timeout,
    ConnectionFailure,
    UndefinedObject,
    DataTooLong,
    TooManyParameters,
    Syntax,
    PermissionDenied,
    /// Input rejected by the batch engine before reaching the database.
    Validation,
    /// Misuse of the transaction API.
    Transaction,
    Unknown,
}

impl DbErrorKind {
    /// Whether re-running the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbErrorKind::Deadlock
                | DbErrorKind::SerializationFailure
                | DbErrorKind::ConnectionFailure
        )
    }

    /// Constraint violations caused by the submitted data.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DbErrorKind::UniqueViolation
                | DbErrorKind::ForeignKeyViolation
                | DbErrorKind::NotNullViolation
                | DbErrorKind::CheckViolation
        )
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DbErrorKind::UniqueViolation => "unique_violation",
            DbErrorKind::ForeignKeyViolation => "foreign_key_violation",
            DbErrorKind::NotNullViolation => "not_null_violation",
            DbErrorKind::CheckViolation => "check_violation",
            DbErrorKind::Deadlock => "deadlock",
            DbErrorKind::SerializationFailure => "serialization_failure",
            DbErrorKind::Timeout => "timeout",
            DbErrorKind::ConnectionFailure => "connection_failure",
            DbErrorKind::UndefinedObject => "undefined_object",
            DbErrorKind::DataTooLong => "data_too_long",
            DbErrorKind::TooManyParameters => "too_many_parameters",
            DbErrorKind::Syntax => "syntax",
            DbErrorKind::PermissionDenied => "permission_denied",
            DbErrorKind::Validation => "validation",
            DbErrorKind::Transaction => "transaction",
            DbErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classify a Postgres SQLSTATE code.
pub fn classify_sqlstate(code: &str) -> DbErrorKind {
    match code {
        "23505" => DbErrorKind::UniqueViolation,
        "23503" => DbErrorKind::ForeignKeyViolation,
        "23502" => DbErrorKind::NotNullViolation,
        "23514" => DbErrorKind::CheckViolation,
        "40P01" => DbErrorKind::Deadlock,
        "40001" => DbErrorKind::SerializationFailure,
        "57014" | "55P03" | "25P03" => DbErrorKind::Timeout,
        "42P01" | "42703" | "42883" | "3F000" => DbErrorKind::UndefinedObject,
        "22001" => DbErrorKind::DataTooLong,
        "54000" | "54023" => DbErrorKind::TooManyParameters,
        "42601" => DbErrorKind::Syntax,
        "42501" | "28000" | "28P01" => DbErrorKind::PermissionDenied,
        "53300" | "57P01" | "57P02" | "57P03" => DbErrorKind::ConnectionFailure,
        c if c.starts_with("08") => DbErrorKind::ConnectionFailure,
        _ => DbErrorKind::Unknown,
    }
}
