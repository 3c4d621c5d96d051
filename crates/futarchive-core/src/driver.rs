//! Download session driver contract.
//!
//! The engine never talks HTTP itself; it consumes a [`DownloadDriver`]
//! holding an open provider session. Implementations classify every failure
//! into a [`ProviderError`] so the engine can decide between skipping the unit
//! and aborting the run.

use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::domain::{ContractId, Resolution};
use crate::normalize::RawTable;
use crate::window::DateWindow;

/// Provider failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Nothing downloadable for the identifier.
    NotFound,
    /// Daily download allowance exhausted; the run must stop.
    QuotaExceeded,
    /// Network or payload problem limited to one request.
    Transient,
    /// Login rejected or credentials missing.
    Authentication,
}

/// Structured provider error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retryable: bool,
}

impl ProviderError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::QuotaExceeded,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Authentication,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn is_quota_exceeded(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::QuotaExceeded)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::NotFound => "provider.not_found",
            ProviderErrorKind::QuotaExceeded => "provider.quota_exceeded",
            ProviderErrorKind::Transient => "provider.transient",
            ProviderErrorKind::Authentication => "provider.authentication",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// Provider login. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Open provider session used by the reconciliation engine.
///
/// Calls are made strictly one at a time.
pub trait DownloadDriver: Send + Sync {
    /// Download the full window for one contract.
    ///
    /// # Errors
    ///
    /// - [`ProviderErrorKind::NotFound`] when the provider has no download for the contract
    /// - [`ProviderErrorKind::QuotaExceeded`] when the daily allowance is spent
    /// - [`ProviderErrorKind::Transient`] for network failures and error bodies
    fn fetch_contract_series<'a>(
        &'a self,
        contract: &'a ContractId,
        resolution: Resolution,
        window: DateWindow,
    ) -> DriverFuture<'a, RawTable>;

    /// Recent prices for a contract, used for sufficiency probes and updates.
    fn fetch_recent_series<'a>(
        &'a self,
        contract: &'a ContractId,
        resolution: Resolution,
    ) -> DriverFuture<'a, RawTable>;

    /// End the session.
    fn close_session<'a>(&'a self) -> DriverFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_quota_errors_are_fatal() {
        assert!(ProviderError::quota_exceeded("limit").is_quota_exceeded());
        assert!(!ProviderError::not_found("missing").is_quota_exceeded());
        assert!(ProviderError::transient("timeout").retryable());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials::new("trader@example.test", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("trader@example.test"));
        assert!(!debug.contains("hunter2"));
        assert!(credentials.is_complete());
        assert!(!Credentials::new("", "x").is_complete());
    }
}
