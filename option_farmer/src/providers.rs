//! Provider abstraction for options market data sources.
//!
//! This module defines the [`OptionsDataProvider`] trait, the unified interface
//! the harvest workers use to pull contract reference data and snapshots from a
//! market data vendor. The concrete Polygon REST implementation lives in
//! [`polygon_rest`].
//!
//! The trait is async and object-safe, so tests and alternative vendors can be
//! swapped in behind `dyn OptionsDataProvider`.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use option_farmer::models::{
//!     contract::RawContract,
//!     request_params::{DateBounds, StrikeBounds},
//! };
//! use option_farmer::providers::{OptionsDataProvider, ProviderError};
//!
//! struct EmptyProvider;
//!
//! #[async_trait]
//! impl OptionsDataProvider for EmptyProvider {
//!     async fn fetch_chain(
//!         &self,
//!         _symbol: &str,
//!         _strikes: StrikeBounds,
//!         _dates: DateBounds,
//!     ) -> Result<Vec<RawContract>, ProviderError> {
//!         Ok(vec![])
//!     }
//!
//!     async fn fetch_contract_detail(&self, _symbol: &str) -> Result<Vec<RawContract>, ProviderError> {
//!         Ok(vec![])
//!     }
//!
//!     async fn fetch_snapshot(
//!         &self,
//!         _symbol: &str,
//!         option_id: &str,
//!     ) -> Result<RawContract, ProviderError> {
//!         option_farmer::providers::NotFoundSnafu { what: option_id }.fail()
//!     }
//! }
//! ```

pub mod polygon_rest;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{
    contract::RawContract,
    request_params::{DateBounds, StrikeBounds},
};

/// Trait for fetching option contracts from a market data provider.
#[async_trait]
pub trait OptionsDataProvider: Send + Sync {
    /// Fetches reference contracts for `symbol` within the strike and
    /// expiration windows, following pagination to the end.
    async fn fetch_chain(
        &self,
        symbol: &str,
        strikes: StrikeBounds,
        dates: DateBounds,
    ) -> Result<Vec<RawContract>, ProviderError>;

    /// Fetches the full snapshot chain (greeks, quotes, day bars) for `symbol`.
    async fn fetch_contract_detail(&self, symbol: &str) -> Result<Vec<RawContract>, ProviderError>;

    /// Fetches the snapshot of a single contract.
    async fn fetch_snapshot(&self, symbol: &str, option_id: &str)
    -> Result<RawContract, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The configured API key is empty.
    #[snafu(display("API key is empty"))]
    EmptyApiKey { backtrace: Backtrace },

    /// The API key cannot be carried in an HTTP header.
    #[snafu(display("API key is not a valid header value"))]
    InvalidApiKey {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within an `OptionsDataProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, body read).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The API answered with a non-success status other than 401.
    #[snafu(display("API returned HTTP {status}: {body}"))]
    Status {
        status: u16,
        body: String,
        backtrace: Backtrace,
    },

    /// The API rejected the key (HTTP 401). Never retried.
    #[snafu(display("API key rejected"))]
    Auth { backtrace: Backtrace },

    /// The response body was not the expected JSON.
    #[snafu(display("Failed to decode API response: {source}"))]
    Decode {
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    /// The API answered successfully but without the requested record.
    #[snafu(display("No results for {what}"))]
    NotFound { what: String },

    /// The retry budget was spent on retryable failures.
    #[snafu(display("Gave up after {attempts} attempts: {source}"))]
    RetriesExhausted {
        attempts: usize,
        #[snafu(source(from(ProviderError, Box::new)))]
        source: Box<ProviderError>,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}

impl ProviderError {
    /// Whether the request may succeed if sent again. Only a rejected key is
    /// terminal; everything else spends the retry budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Auth { .. } | Self::Init { .. } | Self::NotFound { .. })
    }

    /// HTTP statuses the vendor uses for throttling and transient outages.
    pub fn is_transient_status(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth { .. } => true,
            Self::RetriesExhausted { source, .. } => source.is_auth(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snafu::IntoError;

    #[test]
    fn only_auth_like_errors_are_terminal() {
        assert!(!AuthSnafu.build().is_retryable());
        assert!(!NotFoundSnafu { what: "O:X" }.build().is_retryable());
        assert!(
            StatusSnafu {
                status: 503u16,
                body: "busy"
            }
            .build()
            .is_retryable()
        );
        assert!(
            StatusSnafu {
                status: 404u16,
                body: "nope"
            }
            .build()
            .is_retryable()
        );
    }

    #[test]
    fn transient_statuses() {
        for s in [429, 500, 502, 503, 504] {
            assert!(ProviderError::is_transient_status(s));
        }
        assert!(!ProviderError::is_transient_status(401));
        assert!(!ProviderError::is_transient_status(404));
    }

    #[test]
    fn exhausted_wraps_last_error() {
        let last = StatusSnafu {
            status: 429u16,
            body: "slow down",
        }
        .build();
        let err = RetriesExhaustedSnafu { attempts: 5usize }.into_error(last);
        assert!(err.to_string().contains("5 attempts"));
        assert!(!err.is_auth());
    }
}
