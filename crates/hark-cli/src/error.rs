use std::fmt;

/// A user-facing failure, printed as `Error: ...` before exiting with status 1
#[derive(Debug)]
pub struct CliError(pub String);

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliError {}

/// Validation messages built with `format!`
impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError(s)
    }
}

impl From<hark::HarkError> for CliError {
    fn from(e: hark::HarkError) -> Self {
        CliError(e.to_string())
    }
}

impl From<hark::location::LocationError> for CliError {
    fn from(e: hark::location::LocationError) -> Self {
        CliError(format!("Location error: {e}"))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError(format!("JSON error: {e}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError(format!("IO error: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;
