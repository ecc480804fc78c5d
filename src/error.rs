/// Errors raised while reading analytics records or building a report.
///
/// The `Malformed*` variants are data-quality failures on stored values. They
/// propagate to the caller, which decides whether to degrade the report or
/// fail the request.
#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("malformed period '{0}', expected YYYY-MM")]
    MalformedPeriod(String),

    #[error("malformed browser key '{0}', expected 'Name (version)'")]
    MalformedBrowserKey(String),

    #[error("malformed {field} value '{value}'")]
    MalformedValue { field: &'static str, value: String },

    #[error("unknown statistic category '{0}'")]
    UnknownCategory(String),

    #[error("organization '{0}' not found")]
    OrganizationNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
}

impl ReportError {
    /// Whether this error comes from a badly-formed stored value rather than
    /// from the request or the store itself.
    pub const fn is_data_quality(&self) -> bool {
        matches!(
            self,
            Self::MalformedPeriod(_) | Self::MalformedBrowserKey(_) | Self::MalformedValue { .. }
        )
    }
}

/// Result type for report computations.
pub type ReportResult<T> = Result<T, ReportError>;
