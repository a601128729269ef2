//! Constituent record submission.
//!
//! Builds and sends the create-or-update payload for a feed, propagates
//! the assigned record id into the run context, and chains the dependent
//! group-assignment call. Failures are reported, never raised: a failed
//! step must not block the survey submitter from attempting its own
//! submission.

use std::sync::Arc;

use formlink_core::FieldValueAccessor;
use formlink_domain::{luminate_field_name, ApiReply, Entry, Feed, Form, SubmissionOutcome};
use tracing::{debug, error};

use super::normalize::scalar_string;
use super::pipeline::SubmissionContext;
use super::transport::{ApiTransport, HttpMethod, ParamMap, ResponseFormat};

/// Default interaction subject when the feed maps none. The endpoint wants
/// interaction metadata for its audit trail.
const DEFAULT_INTERACTION_SUBJECT: &str = "Update profile data externally";

/// Default interaction body when the feed maps none.
const DEFAULT_INTERACTION_BODY: &str =
    "Profile update submitted through the website form integration";

/// Creates or updates one constituent record per feed.
#[derive(Clone)]
pub struct ConstituentSubmitter {
    transport: Arc<ApiTransport>,
    values: Arc<dyn FieldValueAccessor>,
    override_empty_fields: bool,
}

impl ConstituentSubmitter {
    pub fn new(
        transport: Arc<ApiTransport>,
        values: Arc<dyn FieldValueAccessor>,
        override_empty_fields: bool,
    ) -> Self {
        Self { transport, values, override_empty_fields }
    }

    /// Submit the mapped fields of `feed` as a create-or-update call.
    ///
    /// Returns `None` when the feed is not constituent-mapped. On success
    /// the returned record id is stored in the run context and the group
    /// step runs; a group failure never retroactively invalidates the
    /// constituent success.
    pub async fn submit(
        &self,
        feed: &Feed,
        entry: &Entry,
        form: &Form,
        ctx: &mut SubmissionContext,
    ) -> Option<SubmissionOutcome> {
        if !feed.meta.constituent {
            return None;
        }

        let mut params = ParamMap::new();
        for (name, field_id) in &feed.meta.mapped_fields {
            // unmapped fields stay untouched so stored CRM values survive
            // partial resubmissions
            if field_id.is_empty() {
                continue;
            }

            let value = self.values.value(form, entry, field_id);
            if value.is_empty() && !self.override_empty_fields {
                continue;
            }

            params.insert(luminate_field_name(name), value);
        }

        // the remote accepts two spellings for the primary email address
        if let Some(email) = params.get("email.primary_address").cloned() {
            params.entry("email_primary_address".to_string()).or_insert(email);
        }

        // one-shot hook: a survey-captured email forces every spelling
        if let Some(email) = ctx.survey_email().map(str::to_string) {
            params.insert("primary_email".to_string(), email.clone());
            params.insert("email_primary_address".to_string(), email.clone());
            params.insert("email.primary_address".to_string(), email);
        }

        for (field, default) in [
            ("interaction_subject", DEFAULT_INTERACTION_SUBJECT),
            ("interaction_body", DEFAULT_INTERACTION_BODY),
        ] {
            let missing = params.get(field).map_or(true, String::is_empty);
            if missing {
                params.insert(field.to_string(), default.to_string());
            }
        }

        debug!(feed_id = feed.id, "creating or updating constituent record");
        let outcome = match self
            .transport
            .call("SRConsAPI_createOrUpdate", params, ResponseFormat::Json, HttpMethod::Post)
            .await
        {
            Err(err) => {
                error!(error = %err, "could not create or update the constituent record");
                SubmissionOutcome::TransportError(err.to_string())
            }
            Ok(ApiReply::Fault(fault)) => {
                error!(
                    code = fault.code.as_i64(),
                    message = %fault.message,
                    "constituent create-or-update rejected"
                );
                SubmissionOutcome::ApiError(fault)
            }
            Ok(ApiReply::Data(body)) => {
                match body.pointer("/createOrUpdateConsResponse/cons_id").and_then(scalar_string) {
                    Some(cons_id) => {
                        debug!(cons_id = %cons_id, "constituent record created or updated");
                        ctx.set_cons_id(cons_id.clone());
                        self.assign_groups(feed, &cons_id).await;
                        SubmissionOutcome::Success { cons_id }
                    }
                    None => {
                        error!("create-or-update response carried no cons_id");
                        SubmissionOutcome::TransportError(
                            "create-or-update response carried no cons_id".to_string(),
                        )
                    }
                }
            }
        };

        Some(outcome)
    }

    async fn assign_groups(&self, feed: &Feed, cons_id: &str) {
        if !feed.meta.group {
            return;
        }

        let group_ids = feed.meta.selected_group_ids();
        if group_ids.is_empty() {
            debug!("no groups configured in the feed settings");
            return;
        }

        debug!(groups = %group_ids.join(","), cons_id, "assigning constituent to groups");
        let params = ParamMap::from([
            ("add_group_ids".to_string(), group_ids.join(",")),
            ("cons_id".to_string(), cons_id.to_string()),
        ]);

        match self
            .transport
            .call("SRConsAPI_update", params, ResponseFormat::Json, HttpMethod::Post)
            .await
        {
            Ok(ApiReply::Data(_)) => debug!(cons_id, "group assignment succeeded"),
            Ok(ApiReply::Fault(fault)) => error!(
                code = fault.code.as_i64(),
                message = %fault.message,
                cons_id,
                "group assignment rejected"
            ),
            Err(err) => error!(error = %err, cons_id, "group assignment failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use formlink_domain::LuminateCredentials;

    struct MapAccessor;

    impl FieldValueAccessor for MapAccessor {
        fn value(&self, _form: &Form, entry: &Entry, field_id: &str) -> String {
            entry.values.get(field_id).cloned().unwrap_or_default()
        }
    }

    fn test_credentials() -> LuminateCredentials {
        LuminateCredentials {
            host: "secure2.convio.net".into(),
            organization: "myorg".into(),
            custom_domain: false,
            api_key: "test-key".into(),
            username: "apiuser".into(),
            password: "apipass".into(),
        }
    }

    fn submitter_for(server: &MockServer, override_empty_fields: bool) -> ConstituentSubmitter {
        let transport = Arc::new(
            ApiTransport::new(test_credentials())
                .expect("transport")
                .with_api_base(format!("{}/site", server.uri())),
        );
        ConstituentSubmitter::new(transport, Arc::new(MapAccessor), override_empty_fields)
    }

    fn mapped_feed() -> Feed {
        Feed {
            id: 1,
            form_id: 7,
            meta: formlink_domain::FeedMeta {
                constituent: true,
                mapped_fields: BTreeMap::from([
                    ("primary_email".to_string(), "3".to_string()),
                    ("first_name".to_string(), "4".to_string()),
                    ("last_name".to_string(), String::new()),
                ]),
                ..Default::default()
            },
        }
    }

    fn entry() -> Entry {
        Entry {
            id: 11,
            values: BTreeMap::from([
                ("3".to_string(), "a@b.com".to_string()),
                ("4".to_string(), "Ann".to_string()),
            ]),
        }
    }

    fn form_pairs(body: &[u8]) -> BTreeMap<String, String> {
        String::from_utf8_lossy(body)
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| {
                (
                    urlencoding::decode(key).unwrap_or_default().into_owned(),
                    urlencoding::decode(value).unwrap_or_default().into_owned(),
                )
            })
            .collect()
    }

    async fn mount_create_or_update(server: &MockServer, cons_id: u64) {
        Mock::given(method("POST"))
            .and(body_string_contains("method=createOrUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "createOrUpdateConsResponse": { "cons_id": cons_id }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn submits_mapped_fields_with_default_interaction_metadata() {
        let server = MockServer::start().await;
        mount_create_or_update(&server, 42).await;

        let submitter = submitter_for(&server, true);
        let mut ctx = SubmissionContext::new();
        let outcome = submitter
            .submit(&mapped_feed(), &entry(), &Form::default(), &mut ctx)
            .await
            .expect("outcome");

        assert!(outcome.is_success());
        assert_eq!(ctx.cons_id(), Some("42"));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let pairs = form_pairs(&requests[0].body);

        assert_eq!(pairs.get("primary_email").map(String::as_str), Some("a@b.com"));
        assert_eq!(pairs.get("first_name").map(String::as_str), Some("Ann"));
        assert_eq!(
            pairs.get("interaction_subject").map(String::as_str),
            Some(DEFAULT_INTERACTION_SUBJECT)
        );
        assert_eq!(
            pairs.get("interaction_body").map(String::as_str),
            Some(DEFAULT_INTERACTION_BODY)
        );
        // the unmapped last_name entry is skipped entirely
        assert!(!pairs.contains_key("last_name"));
    }

    #[tokio::test]
    async fn assigns_only_groups_flagged_on() {
        let server = MockServer::start().await;
        mount_create_or_update(&server, 42).await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "updateConsResponse": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut feed = mapped_feed();
        feed.meta.group = true;
        feed.meta.group_selections = BTreeMap::from([
            ("10".to_string(), "1".to_string()),
            ("20".to_string(), "0".to_string()),
        ]);

        let submitter = submitter_for(&server, true);
        let mut ctx = SubmissionContext::new();
        submitter.submit(&feed, &entry(), &Form::default(), &mut ctx).await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        let pairs = form_pairs(&requests[1].body);

        assert_eq!(pairs.get("add_group_ids").map(String::as_str), Some("10"));
        assert_eq!(pairs.get("cons_id").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn group_failure_leaves_the_constituent_success_intact() {
        let server = MockServer::start().await;
        mount_create_or_update(&server, 42).await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errorResponse": { "code": "1", "message": "Unable to process request." }
            })))
            .mount(&server)
            .await;

        let mut feed = mapped_feed();
        feed.meta.group = true;
        feed.meta.group_selections = BTreeMap::from([("10".to_string(), "1".to_string())]);

        let submitter = submitter_for(&server, true);
        let mut ctx = SubmissionContext::new();
        let outcome =
            submitter.submit(&feed, &entry(), &Form::default(), &mut ctx).await.expect("outcome");

        assert!(outcome.is_success());
        assert_eq!(ctx.cons_id(), Some("42"));
    }

    #[tokio::test]
    async fn api_fault_terminates_processing_without_a_group_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=createOrUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errorResponse": { "code": "1", "message": "Unable to process request." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut feed = mapped_feed();
        feed.meta.group = true;
        feed.meta.group_selections = BTreeMap::from([("10".to_string(), "1".to_string())]);

        let submitter = submitter_for(&server, true);
        let mut ctx = SubmissionContext::new();
        let outcome =
            submitter.submit(&feed, &entry(), &Form::default(), &mut ctx).await.expect("outcome");

        assert!(matches!(outcome, SubmissionOutcome::ApiError(_)));
        assert_eq!(ctx.cons_id(), None);
        // only the create-or-update call went out
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn skips_feeds_without_constituent_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut feed = mapped_feed();
        feed.meta.constituent = false;

        let submitter = submitter_for(&server, true);
        let mut ctx = SubmissionContext::new();
        let outcome = submitter.submit(&feed, &entry(), &Form::default(), &mut ctx).await;

        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn empty_values_are_skipped_when_overriding_is_off() {
        let server = MockServer::start().await;
        mount_create_or_update(&server, 42).await;

        let mut entry = entry();
        entry.values.insert("4".to_string(), String::new());

        let submitter = submitter_for(&server, false);
        let mut ctx = SubmissionContext::new();
        submitter.submit(&mapped_feed(), &entry, &Form::default(), &mut ctx).await;

        let requests = server.received_requests().await.unwrap();
        let pairs = form_pairs(&requests[0].body);

        assert!(!pairs.contains_key("first_name"));
        assert_eq!(pairs.get("primary_email").map(String::as_str), Some("a@b.com"));
    }

    #[tokio::test]
    async fn dotted_email_spelling_is_normalized() {
        let server = MockServer::start().await;
        mount_create_or_update(&server, 42).await;

        let mut feed = mapped_feed();
        feed.meta.mapped_fields = BTreeMap::from([(
            "email__dot__primary_address".to_string(),
            "3".to_string(),
        )]);

        let submitter = submitter_for(&server, true);
        let mut ctx = SubmissionContext::new();
        submitter.submit(&feed, &entry(), &Form::default(), &mut ctx).await;

        let requests = server.received_requests().await.unwrap();
        let pairs = form_pairs(&requests[0].body);

        assert_eq!(pairs.get("email.primary_address").map(String::as_str), Some("a@b.com"));
        assert_eq!(pairs.get("email_primary_address").map(String::as_str), Some("a@b.com"));
    }

    #[tokio::test]
    async fn survey_email_hook_forces_every_spelling() {
        let server = MockServer::start().await;
        mount_create_or_update(&server, 42).await;

        let submitter = submitter_for(&server, true);
        let mut ctx = SubmissionContext::new();
        ctx.set_survey_email("survey@b.com".to_string());
        submitter.submit(&mapped_feed(), &entry(), &Form::default(), &mut ctx).await;

        let requests = server.received_requests().await.unwrap();
        let pairs = form_pairs(&requests[0].body);

        assert_eq!(pairs.get("primary_email").map(String::as_str), Some("survey@b.com"));
        assert_eq!(pairs.get("email_primary_address").map(String::as_str), Some("survey@b.com"));
        assert_eq!(pairs.get("email.primary_address").map(String::as_str), Some("survey@b.com"));
    }
}
