//! Error taxonomy for forecasting and allocation.

use std::fmt;

use crate::series::Ticker;

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Infeasible or malformed configuration. Fatal to the run.
    Configuration,
    /// A single instrument's history cannot be fitted.
    InsufficientData,
    /// Non-finite intermediate values or solver failure.
    Numerical,
}

/// All errors produced by the core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid price series for {ticker}: {reason}")]
    InvalidSeries { ticker: Ticker, reason: String },

    #[error("insufficient data for {ticker}: {reason}")]
    InsufficientData { ticker: Ticker, reason: String },

    #[error("numerical error in {context}: {reason}")]
    Numerical { context: String, reason: String },

    #[error("{context} did not converge after {iterations} iterations (residual {residual:e})")]
    NotConverged {
        context: String,
        iterations: usize,
        residual: f64,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::InvalidSeries { .. } | Error::InsufficientData { .. } => {
                ErrorKind::InsufficientData
            }
            Error::Numerical { .. } | Error::NotConverged { .. } => ErrorKind::Numerical,
        }
    }

    /// Whether re-running the same computation (e.g. with a looser tolerance)
    /// might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NotConverged { .. })
    }

    /// The instrument a per-instrument failure refers to.
    pub fn ticker(&self) -> Option<&Ticker> {
        match self {
            Error::InvalidSeries { ticker, .. } | Error::InsufficientData { ticker, .. } => {
                Some(ticker)
            }
            _ => None,
        }
    }

    /// Narrow the context of a numerical failure, e.g. to the cycle date.
    /// Other kinds already name their instrument or setting and pass through.
    pub(crate) fn within(self, scope: impl fmt::Display) -> Self {
        match self {
            Error::Numerical { context, reason } => Error::Numerical {
                context: format!("{context} for {scope}"),
                reason,
            },
            Error::NotConverged {
                context,
                iterations,
                residual,
            } => Error::NotConverged {
                context: format!("{context} for {scope}"),
                iterations,
                residual,
            },
            other => other,
        }
    }

    pub(crate) fn numerical(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Numerical {
            context: context.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = Error::InsufficientData {
            ticker: Ticker::new("TCS.NS"),
            reason: "constant series".into(),
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for TCS.NS: constant series"
        );
        assert_eq!(
            Error::Config("risk_aversion must be > 0".into()).to_string(),
            "configuration error: risk_aversion must be > 0"
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::numerical("covariance", "nan").kind(),
            ErrorKind::Numerical
        );
        let nc = Error::NotConverged {
            context: "allocation".into(),
            iterations: 10,
            residual: 1e-3,
        };
        assert_eq!(nc.kind(), ErrorKind::Numerical);
        assert!(nc.is_retryable());
        assert!(!Error::Config("x".into()).is_retryable());
    }

    #[test]
    fn per_instrument_errors_carry_ticker() {
        let err = Error::InvalidSeries {
            ticker: Ticker::new("INFY.NS"),
            reason: "duplicate date".into(),
        };
        assert_eq!(err.ticker().map(Ticker::as_str), Some("INFY.NS"));
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert!(Error::Config("x".into()).ticker().is_none());
    }

    #[test]
    fn within_scopes_numerical_errors_only() {
        let nc = Error::NotConverged {
            context: "allocation".into(),
            iterations: 5,
            residual: 1e-3,
        }
        .within("cycle 2025-06-20");
        assert_eq!(
            nc.to_string(),
            "allocation for cycle 2025-06-20 did not converge after 5 iterations (residual 1e-3)"
        );
        assert!(nc.is_retryable());

        let cov = Error::numerical("covariance", "non-finite entry").within("cycle 2025-06-20");
        assert!(cov.to_string().contains("covariance for cycle 2025-06-20"));

        let cfg = Error::Config("x".into());
        assert_eq!(cfg.clone().within("cycle 2025-06-20"), cfg);
    }
}
