//! Transport session state.
//!
//! The remote API couples authentication tokens to server-side sessions:
//! a login or single-sign-on call hands back cookies, a `JSESSIONID`, a
//! nonce, and a load-balancer routing id, and later calls only succeed when
//! they replay the matching set. The session object carries all of it so
//! the transport can keep dependent calls on the same remote session.

use std::collections::BTreeMap;

/// Which credential regime is active for client-servlet calls.
///
/// At most one token is attached to any outbound call. Once a
/// single-sign-on token has been obtained it is preferred for the rest of
/// the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenMode {
    /// No token material obtained yet.
    #[default]
    None,
    /// Plain login token from the username/password flow.
    Auth,
    /// Constituent-scoped single-sign-on token.
    Sso,
}

/// Token material returned by a login or single-sign-on call.
#[derive(Debug, Clone, Default)]
pub struct TokenBundle {
    pub token: String,
    pub js_session_id: Option<String>,
    pub nonce: Option<String>,
    /// Load-balancer routing id, appended to request paths as
    /// `;jsessionid=<id>` so follow-up calls land on the same node.
    pub routing_id: Option<String>,
}

/// Mutable per-run session state owned by the transport.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Cookies replayed on every call except the session-seeding methods.
    pub cookies: BTreeMap<String, String>,
    /// Bundle from the username/password login flow.
    pub auth: Option<TokenBundle>,
    /// Bundle from the single-sign-on flow, kept separate from `auth`.
    pub sso: Option<TokenBundle>,
    pub mode: TokenMode,
}

impl Session {
    /// Record the outcome of a login call. SSO mode stays preferred once
    /// established.
    pub fn store_auth(&mut self, bundle: TokenBundle) {
        self.auth = Some(bundle);
        if self.mode == TokenMode::None {
            self.mode = TokenMode::Auth;
        }
    }

    /// Record the outcome of a single-sign-on token call and switch the
    /// session to SSO mode for the remainder of the run.
    pub fn store_sso(&mut self, bundle: TokenBundle) {
        self.sso = Some(bundle);
        self.mode = TokenMode::Sso;
    }
}
