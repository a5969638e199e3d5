// ABOUTME: Error types for the scraper including the ErrorCode enum and ScrapeError struct.
// ABOUTME: Classifies failures as retryable or fatal and maps them to boundary status codes.

use std::fmt;

/// Error codes representing the categories of scrape failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The identifier could not be parsed from the input URL.
    Validation,
    /// A 2xx response lacked the expected embedded payload.
    Extract,
    /// A non-2xx status that is not a block signal.
    Status,
    /// HTTP 403 or 429.
    Blocked,
    /// Transport or IO failure.
    Fetch,
    /// The per-call timeout elapsed.
    Timeout,
    /// Every attempt failed with a retryable error.
    Exhausted,
    /// The transport could not be constructed.
    Config,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Validation => "validation error",
            ErrorCode::Extract => "extraction error",
            ErrorCode::Status => "unexpected status",
            ErrorCode::Blocked => "blocked",
            ErrorCode::Fetch => "fetch error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Exhausted => "retries exhausted",
            ErrorCode::Config => "configuration error",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for scrape operations.
#[derive(Debug, thiserror::Error)]
pub struct ScrapeError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    /// HTTP status of the response that caused the error, when there was one.
    pub status: Option<u16>,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wtw-scrape: {} {}: {}", self.op, self.url, self.code)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        if let Some(ref src) = self.source {
            write!(f, ": {:#}", src)?;
        }
        Ok(())
    }
}

impl ScrapeError {
    fn new(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            status: None,
            source,
        }
    }

    /// Create a Validation error.
    pub fn validation(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Validation, url, op, source)
    }

    /// Create an Extract error.
    pub fn extract(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Extract, url, op, source)
    }

    /// Create a Status error for a non-2xx response that is not a block.
    pub fn status(url: impl Into<String>, op: impl Into<String>, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ErrorCode::Status, url, op, None)
        }
    }

    /// Create a Blocked error for a 403/429 response.
    pub fn blocked(url: impl Into<String>, op: impl Into<String>, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ErrorCode::Blocked, url, op, None)
        }
    }

    /// Create a Fetch error.
    pub fn fetch(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Fetch, url, op, source)
    }

    /// Create a Timeout error.
    pub fn timeout(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Timeout, url, op, source)
    }

    /// Create an Exhausted error wrapping the last retryable cause.
    pub fn exhausted(
        url: impl Into<String>,
        op: impl Into<String>,
        attempts: u32,
        last: Option<ScrapeError>,
    ) -> Self {
        let source = match last {
            Some(cause) => anyhow::Error::new(cause)
                .context(format!("failed after {} attempts", attempts)),
            None => anyhow::anyhow!("failed after {} attempts", attempts),
        };
        Self::new(ErrorCode::Exhausted, url, op, Some(source))
    }

    /// Create a Config error.
    pub fn config(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Config, url, op, source)
    }

    /// Classify a reqwest failure as a Timeout or Fetch error.
    pub fn from_transport(url: impl Into<String>, op: impl Into<String>, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(url, op, Some(err.into()))
        } else {
            Self::fetch(url, op, Some(err.into()))
        }
    }

    /// For an Exhausted error, the last retryable error it wraps.
    pub fn last_cause(&self) -> Option<&ScrapeError> {
        self.source.as_ref()?.downcast_ref::<ScrapeError>()
    }

    /// Returns true if the retry loop should try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Blocked | ErrorCode::Fetch | ErrorCode::Timeout
        )
    }

    /// Status code a request/response boundary should report for this error.
    pub fn suggested_http_status(&self) -> u16 {
        match self.code {
            ErrorCode::Validation => 400,
            ErrorCode::Extract | ErrorCode::Status => 422,
            ErrorCode::Config => 500,
            ErrorCode::Blocked | ErrorCode::Fetch | ErrorCode::Timeout | ErrorCode::Exhausted => {
                502
            }
        }
    }

    /// Returns true if this is a Validation error.
    pub fn is_validation(&self) -> bool {
        self.code == ErrorCode::Validation
    }

    /// Returns true if this is an Extract error.
    pub fn is_extract(&self) -> bool {
        self.code == ErrorCode::Extract
    }

    /// Returns true if this is a Status error.
    pub fn is_status(&self) -> bool {
        self.code == ErrorCode::Status
    }

    /// Returns true if this is a Blocked error.
    pub fn is_blocked(&self) -> bool {
        self.code == ErrorCode::Blocked
    }

    /// Returns true if this is a Fetch error.
    pub fn is_fetch(&self) -> bool {
        self.code == ErrorCode::Fetch
    }

    /// Returns true if this is a Timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    /// Returns true if this is an Exhausted error.
    pub fn is_exhausted(&self) -> bool {
        self.code == ErrorCode::Exhausted
    }
}
