//! Wire-level reply and outcome types.

use serde_json::Value;

/// Error codes the remote reports inside its `errorResponse` envelope.
///
/// The remote encodes these as strings. The four documented codes must stay
/// distinguishable so validation can produce actionable guidance; anything
/// else is carried through as [`ApiErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    /// Code 1: generic failure. The only lead is the remote API debug log.
    Generic,
    /// Code 2: the API key was rejected.
    InvalidApiKey,
    /// Code 3: the username/password pair was rejected.
    InvalidLogin,
    /// Code 4: the caller's IP address is not allow-listed.
    IpNotAllowed,
    Other(i64),
}

impl ApiErrorCode {
    pub fn from_raw(code: i64) -> Self {
        match code {
            1 => Self::Generic,
            2 => Self::InvalidApiKey,
            3 => Self::InvalidLogin,
            4 => Self::IpNotAllowed,
            other => Self::Other(other),
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Generic => 1,
            Self::InvalidApiKey => 2,
            Self::InvalidLogin => 3,
            Self::IpNotAllowed => 4,
            Self::Other(code) => code,
        }
    }
}

/// Structured business error returned by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFault {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiFault {
    /// Convert into a domain error for layers where the fault aborts the
    /// enclosing step.
    pub fn into_error(self) -> crate::errors::FormlinkError {
        crate::errors::FormlinkError::Api { code: self.code.as_i64(), message: self.message }
    }
}

/// Decoded outcome of one transport call.
///
/// A fault is a reply, not an error: the remote answered, with a structured
/// refusal the caller has to interpret. Only network-layer failures travel
/// the error channel.
#[derive(Debug, Clone)]
pub enum ApiReply {
    Data(Value),
    Fault(ApiFault),
}

impl ApiReply {
    /// Classify a decoded response body.
    pub fn from_value(value: Value) -> Self {
        match value.get("errorResponse") {
            Some(envelope) => {
                let code = envelope
                    .get("code")
                    .map(raw_code)
                    .unwrap_or(ApiErrorCode::Other(0));
                let message = envelope
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Self::Fault(ApiFault { code, message })
            }
            None => Self::Data(value),
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Fault(_) => None,
        }
    }

    pub fn fault(&self) -> Option<&ApiFault> {
        match self {
            Self::Fault(fault) => Some(fault),
            Self::Data(_) => None,
        }
    }
}

/// The remote reports codes as strings ("4") but nothing guarantees it.
fn raw_code(value: &Value) -> ApiErrorCode {
    let code = match value {
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        Value::Number(n) => n.as_i64().unwrap_or(0),
        _ => 0,
    };
    ApiErrorCode::from_raw(code)
}

/// Outcome of one submitter step.
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    Success { cons_id: String },
    ApiError(ApiFault),
    TransportError(String),
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Tri-state result of end-to-end credential validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    Valid,
    Invalid(String),
    /// The remote could not be reached; the credentials may or may not work.
    Indeterminate,
}

/// Audit record of one transport call, handed to observers for external
/// troubleshooting.
#[derive(Debug, Clone)]
pub struct CallAudit {
    pub url: String,
    /// Full outgoing payload, form-encoded.
    pub request_body: String,
    /// HTTP status, or 0 when the call never produced a response.
    pub response_status: u16,
    /// Raw response body, or the transport error description.
    pub response_body: String,
    pub ok: bool,
}
