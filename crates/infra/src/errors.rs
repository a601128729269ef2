//! Conversions from external infrastructure errors into domain errors.

use formlink_domain::FormlinkError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can
/// be converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub FormlinkError);

impl From<InfraError> for FormlinkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<FormlinkError> for InfraError {
    fn from(value: FormlinkError) -> Self {
        InfraError(value)
    }
}

impl From<HttpError> for InfraError {
    fn from(err: HttpError) -> Self {
        let kind = if err.is_timeout() {
            "http request timed out"
        } else if err.is_connect() {
            "http connection failed"
        } else if err.is_request() {
            "http request failed"
        } else if err.is_decode() {
            "http response body could not be decoded"
        } else if err.is_builder() {
            "http request could not be built"
        } else {
            "http error"
        };

        InfraError(FormlinkError::Network(format!("{kind}: {err}")))
    }
}
