//! Authentication and token management.
//!
//! Obtains and caches the API user's login token and constituent-scoped
//! single-sign-on tokens. Caches live for the processing run so repeated
//! feeds skip re-authentication; they are a performance optimization, not
//! a correctness requirement.

use std::sync::{Arc, Mutex, MutexGuard};

use formlink_domain::{
    ApiReply, CredentialCheck, FormlinkError, Result, TokenMode,
};
use serde_json::Value;
use tracing::{debug, error};

use super::normalize::scalar_string;
use super::transport::{ApiTransport, HttpMethod, ParamMap, ResponseFormat};

/// Cached outcome of a successful login.
#[derive(Debug, Clone)]
pub struct LoginBundle {
    pub token: String,
    /// Constituent id of the API user, when the remote reports one.
    pub cons_id: Option<String>,
}

/// Token acquisition and credential validation for one Luminate instance.
pub struct AuthManager {
    transport: Arc<ApiTransport>,
    login_cache: Mutex<Option<LoginBundle>>,
    sso_cache: Mutex<Option<String>>,
}

impl AuthManager {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport, login_cache: Mutex::new(None), sso_cache: Mutex::new(None) }
    }

    /// Log the API user in, reusing the cached bundle within a run.
    ///
    /// Fails fast with a `Config` error when the credential unit is
    /// incomplete — no network call is attempted in that case.
    pub async fn login(&self) -> Result<LoginBundle> {
        if let Some(bundle) = lock(&self.login_cache).clone() {
            debug!("using cached Luminate login token");
            return Ok(bundle);
        }

        self.transport.credentials().validate()?;

        let params = ParamMap::from([
            ("user_name".to_string(), self.transport.credentials().username.clone()),
            ("password".to_string(), self.transport.credentials().password.clone()),
        ]);

        let reply = self
            .transport
            .call("SRConsAPI_login", params, ResponseFormat::Json, HttpMethod::Post)
            .await?;

        let bundle = match reply {
            ApiReply::Fault(fault) => {
                error!(code = fault.code.as_i64(), message = %fault.message, "Luminate login rejected");
                return Err(fault.into_error());
            }
            ApiReply::Data(body) => login_bundle(&body)?,
        };

        debug!("Luminate login token received");
        *lock(&self.login_cache) = Some(bundle.clone());
        Ok(bundle)
    }

    /// Obtain a single-sign-on token, reusing the cached token within a run
    /// when no specific constituent is requested.
    ///
    /// With `cons_id` omitted the token is scoped to the API user, resolved
    /// from the cached login bundle. The remote is called exactly once per
    /// token.
    pub async fn single_sign_on_token(&self, cons_id: Option<&str>) -> Result<String> {
        if cons_id.is_none() {
            if let Some(token) = lock(&self.sso_cache).clone() {
                debug!("using cached single-sign-on token");
                return Ok(token);
            }
        }

        let cons_id = match cons_id {
            Some(id) => id.to_string(),
            None => self.login().await?.cons_id.ok_or_else(|| {
                FormlinkError::Auth("login response carried no constituent id".into())
            })?,
        };

        let params = ParamMap::from([("cons_id".to_string(), cons_id)]);
        let reply = self
            .transport
            .call("SRConsAPI_getSingleSignOnToken", params, ResponseFormat::Json, HttpMethod::Post)
            .await?;

        let token = match reply {
            ApiReply::Fault(fault) => {
                error!(
                    code = fault.code.as_i64(),
                    message = %fault.message,
                    "single-sign-on token request rejected"
                );
                return Err(fault.into_error());
            }
            ApiReply::Data(body) => sso_token(&body)?,
        };

        debug!("single-sign-on token received");
        *lock(&self.sso_cache) = Some(token.clone());
        Ok(token)
    }

    /// True once a single-sign-on token is in play for this run.
    pub fn sso_active(&self) -> bool {
        self.transport.token_mode() == TokenMode::Sso
    }

    /// Validate the credentials end-to-end by attempting a login.
    ///
    /// Each documented remote error code maps to a distinct actionable
    /// message; a transport failure leaves the verdict open.
    pub async fn validate_credentials(&self) -> CredentialCheck {
        if let Err(err) = self.transport.credentials().validate() {
            return CredentialCheck::Invalid(err.to_string());
        }

        match self.login().await {
            Ok(bundle) if bundle.cons_id.is_some() => CredentialCheck::Valid,
            Ok(_) => CredentialCheck::Invalid(
                "Login succeeded but the remote returned no usable record id. Verify that the \
                 API user account is active."
                    .into(),
            ),
            Err(FormlinkError::Api { code, message }) => {
                CredentialCheck::Invalid(validation_message(code, &message))
            }
            Err(FormlinkError::Network(cause)) => {
                error!(%cause, "could not reach the Luminate API to validate credentials");
                CredentialCheck::Indeterminate
            }
            Err(err) => CredentialCheck::Invalid(err.to_string()),
        }
    }
}

fn validation_message(code: i64, message: &str) -> String {
    match code {
        4 => format!(
            "Unable to connect to the Luminate API because of IP restrictions. The caller's IP \
             address is not allow-listed. Luminate reported: \"{message}\". Add the IP address \
             Luminate is seeing to the API allow-list."
        ),
        3 => "Unable to connect to the Luminate API because the username or password is \
              incorrect. Verify the API username and password."
            .to_string(),
        2 => "Unable to connect to the Luminate API because the API key is incorrect. Verify \
              the API key."
            .to_string(),
        1 => "Unable to authenticate with Luminate. The remote reported its generic failure \
              code; enable API debug logging in the Luminate administration console to \
              troubleshoot."
            .to_string(),
        other => format!("Unable to authenticate with Luminate (error code {other}): {message}"),
    }
}

fn login_bundle(body: &Value) -> Result<LoginBundle> {
    let envelope = body
        .get("loginResponse")
        .ok_or_else(|| FormlinkError::Auth("login response carried no loginResponse".into()))?;

    let token = envelope
        .get("token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty() && *token != "null")
        .ok_or_else(|| FormlinkError::Auth("login response carried no token".into()))?;

    Ok(LoginBundle {
        token: token.to_string(),
        cons_id: envelope.get("cons_id").and_then(scalar_string),
    })
}

fn sso_token(body: &Value) -> Result<String> {
    body.get("getSingleSignOnTokenResponse")
        .and_then(|envelope| envelope.get("token"))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty() && *token != "null")
        .map(str::to_string)
        .ok_or_else(|| {
            FormlinkError::Auth("single-sign-on response carried no token".into())
        })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
