//! Error types for the alarmflow pipeline.
//!
//! Each external concern has its own error enum. Per-item failures inside a
//! stage are logged and dropped; only [`AlarmflowError`] crosses a stage
//! boundary, and only for structurally invalid input or setup problems.

use thiserror::Error;

/// The main error type for alarmflow operations.
#[derive(Debug, Error)]
pub enum AlarmflowError {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A backend REST call failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Token issuance or persistence failed.
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// A pipeline stage rejected its input.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the backend REST client.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request could not be sent or no response arrived.
    #[error("Request to {url} failed: {message}")]
    Request {
        /// The request URL.
        url: String,
        /// The transport error message.
        message: String,
    },

    /// The server answered with a status outside the accepted set.
    #[error("Unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The response body, if any.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode response from {url}: {message}")]
    Decode {
        /// The request URL.
        url: String,
        /// The decoder message.
        message: String,
    },

    /// The device identifier is not a valid IMEI.
    #[error("Invalid IMEI '{0}': contains non-digit characters")]
    InvalidImei(String),
}

impl ApiError {
    /// Creates a request error from a reqwest error.
    #[must_use]
    pub fn request(url: impl Into<String>, err: &reqwest::Error) -> Self {
        Self::Request {
            url: url.into(),
            message: err.to_string(),
        }
    }

    /// Creates an unexpected status error.
    #[must_use]
    pub fn unexpected_status(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while polling a vendor API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request timed out (the only retryable class).
    #[error("Request to {url} timed out")]
    Timeout {
        /// The request URL.
        url: String,
    },

    /// Any other transport failure.
    #[error("Request to {url} failed: {message}")]
    Request {
        /// The request URL.
        url: String,
        /// The transport error message.
        message: String,
    },

    /// The vendor answered with a non-2xx status.
    #[error("Vendor returned status {status} for {url}: {body}")]
    Status {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },
}

impl TransportError {
    /// Returns true if the error belongs to the timeout class.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Maps a reqwest error, keeping timeouts distinguishable.
    #[must_use]
    pub fn from_reqwest(url: impl Into<String>, err: &reqwest::Error) -> Self {
        let url = url.into();
        if err.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Request {
                url,
                message: err.to_string(),
            }
        }
    }
}

/// Errors raised while decoding a vendor response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The response body was empty.
    #[error("Empty response body")]
    EmptyBody,

    /// The body is not a valid envelope for this provider.
    #[error("Invalid {provider} payload: {message}")]
    Json {
        /// The provider name.
        provider: String,
        /// The decoder message.
        message: String,
    },

    /// The vendor answered with an error result code.
    #[error("{provider} returned result code {code}")]
    VendorCode {
        /// The provider name.
        provider: String,
        /// The vendor's result code.
        code: i64,
    },
}

/// Errors raised while building a provider URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The device's provider tag is not supported.
    #[error("Unknown provider for device {device_id}")]
    UnknownProvider {
        /// The device identifier.
        device_id: String,
    },

    /// The polling window cannot be rendered for this provider.
    #[error("Invalid polling window [{start}, {end}]: {message}")]
    InvalidWindow {
        /// Window start, unix seconds.
        start: i64,
        /// Window end, unix seconds.
        end: i64,
        /// The formatter message.
        message: String,
    },

    /// The configured base URL could not be parsed.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// The parser message.
        message: String,
    },
}

/// Errors related to token issuance and storage.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error("Token request failed: {0}")]
    Request(String),

    /// The token endpoint rejected the credentials.
    #[error("Token request rejected (code {code}): {result}")]
    Rejected {
        /// The vendor result code.
        code: i64,
        /// The vendor result message.
        result: String,
    },

    /// The response carried no token.
    #[error("Token response did not include an access token")]
    MissingToken,

    /// Reading or writing the token file failed.
    #[error("Token persistence failed: {0}")]
    Persistence(String),
}

/// Errors raised while delivering a notification.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The delivery service could not be reached.
    #[error("Delivery to {recipient} failed: {message}")]
    Request {
        /// The recipient address.
        recipient: String,
        /// The transport error message.
        message: String,
    },

    /// The delivery service rejected the message.
    #[error("Delivery to {recipient} rejected with status {status}: {body}")]
    Rejected {
        /// The recipient address.
        recipient: String,
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },
}

/// Error raised by a stage whose input is structurally invalid.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed: {message}")]
pub struct StageError {
    /// The stage name.
    pub stage: String,
    /// The error message.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_timeout_is_retryable_class() {
        let err = TransportError::Timeout {
            url: "http://vendor/alarm".to_string(),
        };
        assert!(err.is_timeout());

        let err = TransportError::Status {
            url: "http://vendor/alarm".to_string(),
            status: 503,
            body: String::new(),
        };
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_api_error_messages_name_the_url() {
        let err = ApiError::unexpected_status("http://backend/alarms/", 500, "boom");
        assert_eq!(
            err.to_string(),
            "Unexpected status 500 from http://backend/alarms/: boom"
        );
    }

    #[test]
    fn test_stage_error_wraps_into_crate_error() {
        let err: AlarmflowError = StageError::new("url_builder", "bad input").into();
        assert_eq!(err.to_string(), "Stage 'url_builder' failed: bad input");
    }

    #[test]
    fn test_auth_rejected_display() {
        let err = AuthError::Rejected {
            code: 1002,
            result: "signature error".to_string(),
        };
        assert!(err.to_string().contains("1002"));
        assert!(err.to_string().contains("signature error"));
    }
}
