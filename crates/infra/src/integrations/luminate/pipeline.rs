//! Feed processing pipeline.
//!
//! Top-level entry point for one submitted form entry. Coordination state
//! that crosses the two submitters (the record id, the survey-captured
//! email) lives in an explicit [`SubmissionContext`] scoped to one entry's
//! processing — never in ambient globals.

use std::sync::Arc;

use formlink_core::{CredentialStore, EntryAnnotator, FeedConfigStore, FieldValueAccessor};
use formlink_domain::{
    CredentialCheck, Entry, Feed, Form, IntegrationSettings, Result,
};
use tracing::{debug, error};

use super::auth::AuthManager;
use super::constituent::ConstituentSubmitter;
use super::survey::SurveySubmitter;
use super::transport::ApiTransport;

/// Shared state for one entry's processing run.
///
/// The record id is written once by the constituent submitter and read by
/// the survey submitter; execution is sequential, so no locking is needed.
#[derive(Debug, Default)]
pub struct SubmissionContext {
    cons_id: Option<String>,
    survey_email: Option<String>,
}

impl SubmissionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record id obtained for this run, once a constituent call
    /// succeeded.
    pub fn cons_id(&self) -> Option<&str> {
        self.cons_id.as_deref()
    }

    pub fn set_cons_id(&mut self, cons_id: String) {
        self.cons_id = Some(cons_id);
    }

    /// Email captured from a survey feed, consumed by the lazy constituent
    /// creation.
    pub fn survey_email(&self) -> Option<&str> {
        self.survey_email.as_deref()
    }

    pub fn set_survey_email(&mut self, email: String) {
        self.survey_email = Some(email);
    }
}

/// Processes the feeds attached to a form for one submitted entry.
pub struct FeedProcessor {
    auth: Arc<AuthManager>,
    feeds: Arc<dyn FeedConfigStore>,
    constituent: ConstituentSubmitter,
    survey: SurveySubmitter,
}

impl FeedProcessor {
    /// Build a processor from the host's stored settings.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        values: Arc<dyn FieldValueAccessor>,
        annotator: Arc<dyn EntryAnnotator>,
        feeds: Arc<dyn FeedConfigStore>,
    ) -> Result<Self> {
        let settings = store.settings()?;
        let transport = Arc::new(ApiTransport::new(settings.credentials.clone())?);
        Ok(Self::with_transport(transport, &settings, values, annotator, feeds))
    }

    /// Wire up against an existing transport (alternate endpoints, tests).
    pub fn with_transport(
        transport: Arc<ApiTransport>,
        settings: &IntegrationSettings,
        values: Arc<dyn FieldValueAccessor>,
        annotator: Arc<dyn EntryAnnotator>,
        feeds: Arc<dyn FeedConfigStore>,
    ) -> Self {
        let auth = Arc::new(AuthManager::new(transport.clone()));
        let constituent = ConstituentSubmitter::new(
            transport.clone(),
            values.clone(),
            settings.override_empty_fields,
        );
        let survey = SurveySubmitter::new(
            transport,
            values,
            annotator,
            auth.clone(),
            constituent.clone(),
            settings.override_empty_fields,
        );

        Self { auth, feeds, constituent, survey }
    }

    /// Process every feed attached to a form, sharing one context so the
    /// record id obtained by one feed is reused by the next.
    pub async fn process_entry(&self, form: &Form, entry: &Entry) {
        let feeds = match self.feeds.feeds_for_form(form.id) {
            Ok(feeds) => feeds,
            Err(err) => {
                error!(form_id = form.id, error = %err, "could not load feeds for form");
                return;
            }
        };

        let mut ctx = SubmissionContext::new();
        for feed in &feeds {
            self.process_feed(feed, entry, form, &mut ctx).await;
        }
    }

    /// Process one feed.
    ///
    /// Never propagates a fault to the caller: every failure terminates in
    /// a log entry and/or an entry note.
    pub async fn process_feed(
        &self,
        feed: &Feed,
        entry: &Entry,
        form: &Form,
        ctx: &mut SubmissionContext,
    ) {
        debug!(feed_id = feed.id, "processing feed");

        match self.auth.validate_credentials().await {
            CredentialCheck::Valid => {}
            CredentialCheck::Invalid(reason) => {
                error!(feed_id = feed.id, %reason, "unable to process feed");
                return;
            }
            CredentialCheck::Indeterminate => {
                error!(feed_id = feed.id, "unable to reach the Luminate API; skipping feed");
                return;
            }
        }

        let token = match self.auth.single_sign_on_token(None).await {
            Ok(token) => Some(token),
            Err(err) => {
                error!(error = %err, "could not obtain a session token");
                None
            }
        };

        self.constituent.submit(feed, entry, form, ctx).await;

        // the survey endpoint is a client-servlet call and needs a token
        match token {
            Some(token) => {
                self.survey.submit(feed, entry, form, ctx, &token, self.auth.sso_active()).await;
            }
            None => debug!(feed_id = feed.id, "skipping survey submission without a session token"),
        }
    }
}
