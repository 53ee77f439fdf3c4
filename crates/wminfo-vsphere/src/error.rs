//! Error types for the inventory reporting crate.

use std::fmt;

use crate::types::ObjectKind;

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryErrorKind {
    /// Endpoint unreachable, TLS handshake refused or session lost
    ConnectionError,
    /// Login rejected or session not authenticated
    AuthenticationError,
    /// No datacenter matches the requested scope
    ScopeNotFound,
    /// Reference discovery could not complete
    DiscoveryFailed,
    /// Property retrieval failed for one kind group
    ProjectionFailed(ObjectKind),
    /// Session clone ticket could not be acquired
    CloneFailed,
    /// Server certificate fingerprint could not be derived
    FingerprintFailed,
    /// SOAP fault returned by the service
    SoapFault,
    /// HTTP error with status code
    ApiError(u16),
    /// Timeout
    Timeout,
    /// XML / response decoding error
    ParseError,
    /// Caller cancelled the operation
    Cancelled,
    /// Endpoint URL or options rejected
    InvalidConfig,
    /// Generic
    Other,
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryError {
    pub kind: InventoryErrorKind,
    pub message: String,
}

impl InventoryError {
    pub fn new(kind: InventoryErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::ConnectionError, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::AuthenticationError, msg)
    }

    pub fn scope_not_found(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::ScopeNotFound, msg)
    }

    /// Wrap `cause` as a discovery failure naming the remote call that failed.
    pub fn discovery(call: &str, cause: &InventoryError) -> Self {
        Self::new(
            InventoryErrorKind::DiscoveryFailed,
            format!("{call}: {cause}"),
        )
    }

    pub fn projection(kind: ObjectKind, cause: &InventoryError) -> Self {
        Self::new(
            InventoryErrorKind::ProjectionFailed(kind),
            format!("RetrieveProperties({kind}): {cause}"),
        )
    }

    pub fn clone_failed(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::CloneFailed, msg)
    }

    pub fn fingerprint(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::FingerprintFailed, msg)
    }

    pub fn soap_fault(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::SoapFault, msg)
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::ApiError(status), msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::ParseError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::Timeout, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::Cancelled, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::InvalidConfig, msg)
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::new(InventoryErrorKind::Other, msg)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == InventoryErrorKind::Cancelled
    }

    /// Errors that end the whole invocation rather than one report section.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            InventoryErrorKind::ConnectionError
                | InventoryErrorKind::AuthenticationError
                | InventoryErrorKind::Cancelled
                | InventoryErrorKind::InvalidConfig
        )
    }
}

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for InventoryError {}

impl From<InventoryError> for String {
    fn from(e: InventoryError) -> String {
        e.to_string()
    }
}

impl From<reqwest::Error> for InventoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::connection(format!("Connection failed: {e}"))
        } else if let Some(status) = e.status() {
            Self::api(status.as_u16(), format!("HTTP error: {e}"))
        } else {
            Self::other(format!("HTTP error: {e}"))
        }
    }
}

impl From<quick_xml::Error> for InventoryError {
    fn from(e: quick_xml::Error) -> Self {
        Self::parse(format!("XML error: {e}"))
    }
}

impl From<std::io::Error> for InventoryError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(format!("I/O timeout: {e}"))
        } else {
            Self::connection(format!("I/O error: {e}"))
        }
    }
}

impl From<rustls::Error> for InventoryError {
    fn from(e: rustls::Error) -> Self {
        Self::connection(format!("TLS error: {e}"))
    }
}

impl From<url::ParseError> for InventoryError {
    fn from(e: url::ParseError) -> Self {
        Self::config(format!("invalid URL: {e}"))
    }
}

/// Alias used throughout the crate.
pub type InventoryResult<T> = Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_kind() {
        let err = InventoryError::scope_not_found("datacenter 'lab' not found");
        assert_eq!(err.to_string(), "[ScopeNotFound] datacenter 'lab' not found");
    }

    #[test]
    fn discovery_names_failing_call() {
        let cause = InventoryError::soap_fault("NotAuthenticated");
        let err = InventoryError::discovery("CreateContainerView", &cause);
        assert_eq!(err.kind, InventoryErrorKind::DiscoveryFailed);
        assert!(err.message.starts_with("CreateContainerView: "));
        assert!(err.message.contains("NotAuthenticated"));
    }

    #[test]
    fn projection_carries_kind() {
        let err = InventoryError::projection(ObjectKind::Network, &InventoryError::other("boom"));
        assert_eq!(
            err.kind,
            InventoryErrorKind::ProjectionFailed(ObjectKind::Network)
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn fatal_classification() {
        assert!(InventoryError::auth("denied").is_fatal());
        assert!(InventoryError::cancelled("ctrl-c").is_fatal());
        assert!(!InventoryError::clone_failed("x").is_fatal());
        assert!(!InventoryError::fingerprint("x").is_fatal());
    }

    #[test]
    fn io_timeout_maps_to_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        let err: InventoryError = io.into();
        assert_eq!(err.kind, InventoryErrorKind::Timeout);
    }

    #[test]
    fn url_error_is_invalid_config() {
        let err: InventoryError = url::Url::parse("::not a url").unwrap_err().into();
        assert_eq!(err.kind, InventoryErrorKind::InvalidConfig);
    }
}
