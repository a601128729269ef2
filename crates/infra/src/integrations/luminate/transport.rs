//! Luminate API transport.
//!
//! Executes one API call against the CRM: servlet routing, credential
//! injection, cookie continuity, and response normalization into
//! [`ApiReply`] values. The remote runs two servlet families — client
//! (`CR…`) servlets authenticated with session tokens and server (`SR…`)
//! servlets authenticated with the API user's credentials — and the
//! transport decides per call which material applies.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use formlink_core::ApiCallObserver;
use formlink_domain::{
    ApiReply, CallAudit, FormlinkError, LuminateCredentials, Result, Session, TokenBundle,
    TokenMode,
};
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::InfraError;
use crate::http::HttpClient;

/// Parameters of one API call, in deterministic order.
pub type ParamMap = BTreeMap<String, String>;

/// Response encodings the remote can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
}

impl ResponseFormat {
    fn as_param(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

/// HTTP verbs the remote accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

/// Remote protocol version, sent as the `v` parameter on every call.
const PROTOCOL_VERSION: &str = "1.0";

/// Methods that must not carry a session token. The remote fails the call
/// when one of these arrives with token material attached.
const NO_AUTH_METHODS: &[&str] = &[
    "login",
    "getSingleSignOnToken",
    "getLoginUrl",
    "listSurveys",
    "startDonation",
    "getDonationFormInfo",
    "donate",
    "getDesignationTypes",
    "getDesignees",
    "addOfflineDonation",
    "offlineOrganizationGift",
    "recordRecurringTransaction",
    "refundOfflineDonation",
    "refundTransaction",
    "addLocalCompany",
    "addTeamraiserData",
    "createAndLinkFacebookFundraiser",
    "getCampaignByNameData",
    "getCaptainsMessage",
    "getCompaniesByInfo",
    "getCompanyList",
    "getCompanyPageInfo",
    "getCompanyPhoto",
    "getEventDataParameter",
    "getFundraisingResults",
    "getLocalCompany",
    "getNationalCompany",
    "getOrganizationMessage",
    "getParticipantCenterWrapper",
    "getParticipantFBConnectInfo",
    "getParticipantProgress",
    "getParticipants",
    "getParticipationType",
    "getParticipationTypes",
];

/// Methods that seed a fresh remote session. They are sent cookie-free and
/// their responses are the only source of cookies and token material.
const SESSION_SEED_METHODS: &[&str] = &["login", "getSingleSignOnToken", "getLoginUrl"];

enum Namespace {
    Client,
    Server,
    Other,
}

/// Stateful client for one Luminate instance.
///
/// Owns the mutable [`Session`]; token material and cookies are only
/// mutated here, in response to session-seeding calls.
pub struct ApiTransport {
    credentials: LuminateCredentials,
    api_base: String,
    http: HttpClient,
    session: Mutex<Session>,
    observer: Option<Arc<dyn ApiCallObserver>>,
}

impl ApiTransport {
    pub fn new(credentials: LuminateCredentials) -> Result<Self> {
        let http = HttpClient::builder().user_agent("formlink").build()?;
        let api_base = credentials.api_url();

        Ok(Self {
            credentials,
            api_base,
            http,
            session: Mutex::new(Session::default()),
            observer: None,
        })
    }

    /// Replace the derived API base URL. Intended for alternate endpoints
    /// and tests against a local server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Attach a hook receiving the audit record of every call.
    pub fn with_observer(mut self, observer: Arc<dyn ApiCallObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn credentials(&self) -> &LuminateCredentials {
        &self.credentials
    }

    /// Which credential regime later client-servlet calls will prefer.
    pub fn token_mode(&self) -> TokenMode {
        self.lock_session().mode
    }

    /// Execute one API call.
    ///
    /// `servlet_method` is the qualified name, e.g. `SRConsAPI_login` or
    /// `CRSurveyAPI_submitSurvey`. A structured remote error comes back as
    /// `Ok(ApiReply::Fault)`; only network-layer failures are `Err`.
    pub async fn call(
        &self,
        servlet_method: &str,
        params: ParamMap,
        format: ResponseFormat,
        http_method: HttpMethod,
    ) -> Result<ApiReply> {
        let (servlet, method) = split_servlet_method(servlet_method)?;
        let mut data = params;
        data.entry("method".to_string()).or_insert_with(|| method.to_string());

        let mut url = format!("{}/{}", self.api_base, servlet);
        let seed_call = SESSION_SEED_METHODS.contains(&method);
        let mut cookie_header = None;

        {
            let session = self.lock_session();
            match namespace(servlet) {
                Namespace::Client => {
                    inject_client_credentials(&mut data, &mut url, method, &session);
                }
                Namespace::Server => self.inject_server_credentials(&mut data),
                Namespace::Other => {}
            }

            if !seed_call && !session.cookies.is_empty() {
                let cookies = session
                    .cookies
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                cookie_header = Some(cookies);
            }
        }

        data.entry("api_key".to_string()).or_insert_with(|| self.credentials.api_key.clone());
        data.entry("v".to_string()).or_insert_with(|| PROTOCOL_VERSION.to_string());
        data.entry("response_format".to_string())
            .or_insert_with(|| format.as_param().to_string());

        let encoded = encode_params(&data);

        let mut request = match http_method {
            HttpMethod::Get => self.http.request(Method::GET, &url).query(&data),
            HttpMethod::Post => self
                .http
                .request(Method::POST, &url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=UTF-8")
                .body(encoded.clone()),
        };

        if let Some(cookies) = cookie_header {
            request = request.header(COOKIE, cookies);
        }

        let response = match self.http.send(request).await {
            Ok(response) => response,
            Err(err) => {
                self.audit(&url, &encoded, 0, &err.to_string(), false);
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        let cookies = response_cookies(&response);
        let raw = response.text().await.map_err(|err| {
            let infra: InfraError = err.into();
            FormlinkError::from(infra)
        })?;

        let value = match decode_body(&raw, format) {
            Ok(value) => value,
            Err(err) => {
                self.audit(&url, &encoded, status, &raw, false);
                return Err(err);
            }
        };

        let reply = ApiReply::from_value(value);
        match &reply {
            ApiReply::Fault(fault) => {
                self.audit(&url, &encoded, status, &raw, false);
                error!(
                    code = fault.code.as_i64(),
                    message = %fault.message,
                    %url,
                    "Luminate API reported an error"
                );
            }
            ApiReply::Data(body) => {
                if seed_call {
                    self.store_session_material(method, body, cookies);
                }
                self.audit(&url, &encoded, status, &raw, true);
                debug!(%url, "Luminate API call succeeded");
            }
        }

        Ok(reply)
    }

    /// Server-side calls authenticate with the API user, never session
    /// tokens.
    fn inject_server_credentials(&self, data: &mut ParamMap) {
        data.remove("auth");
        data.remove("sso_auth_token");
        data.entry("login_name".to_string())
            .or_insert_with(|| self.credentials.username.clone());
        data.entry("login_password".to_string())
            .or_insert_with(|| self.credentials.password.clone());
    }

    fn store_session_material(&self, method: &str, body: &Value, cookies: Vec<(String, String)>) {
        let mut session = self.lock_session();
        for (name, value) in cookies {
            session.cookies.insert(name, value);
        }

        match method {
            "login" => {
                if let Some(bundle) = token_bundle(body.get("loginResponse")) {
                    session.store_auth(bundle);
                }
            }
            "getSingleSignOnToken" => {
                if let Some(bundle) = token_bundle(body.get("getSingleSignOnTokenResponse")) {
                    session.store_sso(bundle);
                }
            }
            _ => {}
        }
    }

    fn audit(&self, url: &str, request_body: &str, status: u16, response_body: &str, ok: bool) {
        if ok {
            debug!(
                target: "formlink::api",
                %url,
                request = %request_body,
                status,
                response = %response_body,
                "Luminate API call"
            );
        } else {
            error!(
                target: "formlink::api",
                %url,
                request = %request_body,
                status,
                response = %response_body,
                "Luminate API call failed"
            );
        }

        if let Some(observer) = &self.observer {
            observer.on_call(&CallAudit {
                url: url.to_string(),
                request_body: request_body.to_string(),
                response_status: status,
                response_body: response_body.to_string(),
                ok,
            });
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Client-side calls carry at most one token, selected by call-site intent
/// and the session mode.
fn inject_client_credentials(
    data: &mut ParamMap,
    url: &mut String,
    method: &str,
    session: &Session,
) {
    if NO_AUTH_METHODS.contains(&method) {
        data.remove("auth");
        data.remove("sso_auth_token");
        return;
    }

    let prefer_sso =
        data.contains_key("sso_auth_token") || (session.mode == TokenMode::Sso && session.sso.is_some());

    if prefer_sso {
        data.remove("auth");
        if let Some(sso) = &session.sso {
            data.entry("sso_auth_token".to_string()).or_insert_with(|| sso.token.clone());
            attach_routing(data, url, sso);
        }
    } else {
        data.remove("sso_auth_token");
        if let Some(auth) = &session.auth {
            data.entry("auth".to_string()).or_insert_with(|| auth.token.clone());
            attach_routing(data, url, auth);
        }
    }
}

/// Keep the call on the load-balancer node that issued the session.
fn attach_routing(data: &mut ParamMap, url: &mut String, bundle: &TokenBundle) {
    if let Some(routing) = &bundle.routing_id {
        if !routing.is_empty() {
            url.push_str(&format!(";jsessionid={routing}"));
        }
    }

    if let Some(js_session_id) = &bundle.js_session_id {
        data.entry("JSESSIONID".to_string()).or_insert_with(|| js_session_id.clone());
    }

    if let Some(nonce) = &bundle.nonce {
        data.entry("nonce".to_string()).or_insert_with(|| nonce.clone());
    }
}

fn split_servlet_method(qualified: &str) -> Result<(&str, &str)> {
    qualified
        .split_once('_')
        .filter(|(servlet, method)| !servlet.is_empty() && !method.is_empty())
        .ok_or_else(|| {
            FormlinkError::InvalidInput(format!("malformed servlet method name: {qualified}"))
        })
}

fn namespace(servlet: &str) -> Namespace {
    let prefix: String = servlet.chars().take(2).collect::<String>().to_ascii_uppercase();
    match prefix.as_str() {
        "CR" => Namespace::Client,
        "SR" => Namespace::Server,
        _ => Namespace::Other,
    }
}

fn token_bundle(envelope: Option<&Value>) -> Option<TokenBundle> {
    let envelope = envelope?;
    let token = envelope.get("token").and_then(Value::as_str)?;
    // the remote reports a missing token as the literal string "null"
    if token.is_empty() || token == "null" {
        return None;
    }

    Some(TokenBundle {
        token: token.to_string(),
        js_session_id: string_field(envelope, "JSESSIONID"),
        nonce: string_field(envelope, "nonce"),
        routing_id: string_field(envelope, "routing_id"),
    })
}

fn string_field(envelope: &Value, name: &str) -> Option<String> {
    envelope.get(name).and_then(super::normalize::scalar_string)
}

fn encode_params(data: &ParamMap) -> String {
    data.iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn response_cookies(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| raw.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

fn decode_body(raw: &str, format: ResponseFormat) -> Result<Value> {
    match format {
        ResponseFormat::Json => serde_json::from_str(raw).map_err(|err| {
            FormlinkError::Network(format!("unexpected non-JSON response: {err}"))
        }),
        // The XML deserializer drops the document root element, which would
        // lose the response envelope name; wrap in a synthetic root first.
        ResponseFormat::Xml => quick_xml::de::from_str(&format!("<r>{raw}</r>")).map_err(|err| {
            FormlinkError::Network(format!("unexpected non-XML response: {err}"))
        }),
    }
}
