//! Survey response submission.
//!
//! Builds and sends the survey payload for a feed, lazily creating a
//! constituent record when none exists yet for this run, and classifies
//! partial field-level failures separately from full-submission failure.
//! Every outcome leaves a human-readable audit note on the entry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use formlink_core::{EntryAnnotator, FieldValueAccessor, NoteSeverity};
use formlink_domain::{
    luminate_field_name, survey_param_name, ApiErrorCode, ApiFault, ApiReply, Entry, Feed, Form,
    SubmissionOutcome, SurveyFieldError, QUESTION_NAME_PREFIX,
};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::auth::AuthManager;
use super::constituent::ConstituentSubmitter;
use super::normalize::{is_false, one_or_many, scalar_string};
use super::pipeline::SubmissionContext;
use super::transport::{ApiTransport, HttpMethod, ParamMap, ResponseFormat};

/// Submits one survey response per feed.
pub struct SurveySubmitter {
    transport: Arc<ApiTransport>,
    values: Arc<dyn FieldValueAccessor>,
    annotator: Arc<dyn EntryAnnotator>,
    auth: Arc<AuthManager>,
    constituent: ConstituentSubmitter,
    override_empty_fields: bool,
}

impl SurveySubmitter {
    pub fn new(
        transport: Arc<ApiTransport>,
        values: Arc<dyn FieldValueAccessor>,
        annotator: Arc<dyn EntryAnnotator>,
        auth: Arc<AuthManager>,
        constituent: ConstituentSubmitter,
        override_empty_fields: bool,
    ) -> Self {
        Self { transport, values, annotator, auth, constituent, override_empty_fields }
    }

    /// Submit the mapped survey answers of `feed`.
    ///
    /// Returns `None` when the feed is not survey-mapped or no survey is
    /// selected. When the run has no constituent record yet, one is created
    /// first from the survey's captured email, and the token is re-scoped
    /// to the new record.
    pub async fn submit(
        &self,
        feed: &Feed,
        entry: &Entry,
        form: &Form,
        ctx: &mut SubmissionContext,
        auth_token: &str,
        using_sso: bool,
    ) -> Option<SubmissionOutcome> {
        if !feed.meta.survey {
            return None;
        }

        let Some(survey_id) = feed.meta.survey_id.clone().filter(|id| !id.is_empty()) else {
            debug!(feed_id = feed.id, "survey mapping enabled but no survey selected");
            return None;
        };

        let field_map = &feed.meta.survey_mapped_fields;

        // capture the mapped email up front; the lazy constituent creation
        // below needs it
        if let Some(field_id) = field_map.get("cons_email").filter(|id| !id.is_empty()) {
            let email = self.values.value(form, entry, field_id);
            if !email.is_empty() {
                ctx.set_survey_email(email);
            }
        }

        let mut answers = ParamMap::new();
        for (name, field_id) in field_map {
            if name == "Email" || field_id.is_empty() {
                continue;
            }

            let value = self.values.value(form, entry, field_id);
            if value.is_empty() && !self.override_empty_fields {
                continue;
            }

            answers.insert(survey_param_name(name), value);
        }

        let mut survey_params = ParamMap::from([("survey_id".to_string(), survey_id.clone())]);
        if using_sso {
            survey_params.insert("sso_auth_token".to_string(), auth_token.to_string());
        } else {
            survey_params.insert("auth".to_string(), auth_token.to_string());
        }

        if ctx.cons_id().is_none() {
            // surveys must attach to a constituent record; create one from
            // the captured email before submitting
            debug!("no constituent record yet; creating one before the survey submission");
            let mut lazy_feed = feed.clone();
            lazy_feed.meta.constituent = true;
            self.constituent.submit(&lazy_feed, entry, form, ctx).await;

            if let Some(cons_id) = ctx.cons_id().map(str::to_string) {
                survey_params.insert("cons_id".to_string(), cons_id.clone());

                match self.auth.single_sign_on_token(Some(&cons_id)).await {
                    Ok(token) => {
                        survey_params.insert("sso_auth_token".to_string(), token);
                        survey_params.remove("auth");
                    }
                    Err(err) => warn!(
                        error = %err,
                        "could not scope a single-sign-on token to the new record"
                    ),
                }
            }
        }

        survey_params.append(&mut answers);

        debug!(survey_id = %survey_id, "submitting survey response");
        let reply = self
            .transport
            .call("CRSurveyAPI_submitSurvey", survey_params, ResponseFormat::Json, HttpMethod::Post)
            .await;

        let cons_id = ctx.cons_id().unwrap_or_default().to_string();
        let outcome = match reply {
            Err(err) => {
                error!(survey_id = %survey_id, error = %err, "survey submission failed");
                self.annotator.add_note(
                    entry.id,
                    &format!("Error submitting survey {survey_id}: {err}"),
                    NoteSeverity::Error,
                );
                SubmissionOutcome::TransportError(err.to_string())
            }
            Ok(ApiReply::Fault(fault)) => {
                error!(
                    survey_id = %survey_id,
                    code = fault.code.as_i64(),
                    message = %fault.message,
                    "survey submission rejected"
                );
                self.annotator.add_note(
                    entry.id,
                    &format!(
                        "Error submitting survey {survey_id}. Luminate API error {}: {}",
                        fault.code.as_i64(),
                        fault.message
                    ),
                    NoteSeverity::Error,
                );
                SubmissionOutcome::ApiError(fault)
            }
            Ok(ApiReply::Data(body)) => {
                self.classify_response(&body, feed, entry, form, &survey_id, &cons_id)
            }
        };

        Some(outcome)
    }

    /// Classify a decoded submit response: full failure, partial
    /// field-level failure, or clean success.
    ///
    /// Partial-failure detection keys off the nested `errors` shape; when
    /// the remote omits it, this deliberately fails closed and reports a
    /// clean success.
    fn classify_response(
        &self,
        body: &Value,
        feed: &Feed,
        entry: &Entry,
        form: &Form,
        survey_id: &str,
        cons_id: &str,
    ) -> SubmissionOutcome {
        let rejected =
            body.pointer("/submitSurveyResponse/success").map(is_false).unwrap_or(false);
        let errors = field_errors(body);

        if rejected {
            let detail = if errors.is_empty() {
                "the remote reported an unsuccessful submission".to_string()
            } else {
                self.field_error_report(form, entry, feed, &errors)
            };

            error!(survey_id, %detail, "survey submission was not successful");
            self.annotator.add_note(
                entry.id,
                &format!("Error submitting survey {survey_id}. {detail}"),
                NoteSeverity::Error,
            );
            return SubmissionOutcome::ApiError(ApiFault {
                code: ApiErrorCode::Other(0),
                message: detail,
            });
        }

        if errors.is_empty() {
            debug!(survey_id, cons_id, "survey response submitted");
            self.annotator.add_note(
                entry.id,
                &format!(
                    "Successfully added survey {survey_id} response to Luminate for \
                     constituent {cons_id}"
                ),
                NoteSeverity::Success,
            );
        } else {
            // submitted, but specific questions were rejected
            let report = self.field_error_report(form, entry, feed, &errors);
            warn!(survey_id, cons_id, %report, "survey submitted with field errors");
            self.annotator.add_note(
                entry.id,
                &format!(
                    "Successfully added survey {survey_id} response to Luminate for \
                     constituent {cons_id}, but some fields had errors during the \
                     submission: {report}"
                ),
                NoteSeverity::Warning,
            );
        }

        SubmissionOutcome::Success { cons_id: cons_id.to_string() }
    }

    /// Enumerate field errors, resolving mapped question ids back to form
    /// fields; unmapped ids are still reported.
    fn field_error_report(
        &self,
        form: &Form,
        entry: &Entry,
        feed: &Feed,
        errors: &[SurveyFieldError],
    ) -> String {
        let by_question: BTreeMap<&str, &SurveyFieldError> = errors
            .iter()
            .filter_map(|error| error.question_id.as_deref().map(|id| (id, error)))
            .collect();

        let mut lines = Vec::new();
        let mut reported: BTreeSet<String> = BTreeSet::new();

        for (name, field_id) in &feed.meta.survey_mapped_fields {
            let key = question_key(name);
            if let Some(error) = by_question.get(key.as_str()) {
                reported.insert(key.clone());
                let label = form.field(field_id).map(|f| f.label.as_str()).unwrap_or_default();
                let value = self.values.value(form, entry, field_id);
                lines.push(format!(
                    "Question {key}: {} (form field {field_id} \"{label}\", submitted value \
                     \"{value}\")",
                    error.message
                ));
            }
        }

        for error in errors {
            match &error.question_id {
                Some(id) if !reported.contains(id) => lines.push(format!(
                    "Question {id}: {} (not mapped to a form field)",
                    error.message
                )),
                None => lines.push(error.message.clone()),
                _ => {}
            }
        }

        lines.join("; ")
    }
}

/// The question key an error's `questionInError` value refers to.
fn question_key(mapped_name: &str) -> String {
    match mapped_name.strip_prefix(QUESTION_NAME_PREFIX) {
        Some(question_id) => question_id.to_string(),
        None => luminate_field_name(mapped_name),
    }
}

fn field_errors(body: &Value) -> Vec<SurveyFieldError> {
    one_or_many(body.pointer("/submitSurveyResponse/errors"))
        .into_iter()
        .map(|error| SurveyFieldError {
            question_id: error.get("questionInError").and_then(scalar_string),
            message: error
                .get("errorMessage")
                .and_then(scalar_string)
                .unwrap_or_else(|| "unknown error".to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use formlink_domain::{FeedMeta, FormField, LuminateCredentials};

    struct MapAccessor;

    impl FieldValueAccessor for MapAccessor {
        fn value(&self, _form: &Form, entry: &Entry, field_id: &str) -> String {
            entry.values.get(field_id).cloned().unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct RecordingAnnotator(Mutex<Vec<(u64, String, NoteSeverity)>>);

    impl RecordingAnnotator {
        fn notes(&self) -> Vec<(u64, String, NoteSeverity)> {
            self.0.lock().unwrap().clone()
        }
    }

    impl EntryAnnotator for RecordingAnnotator {
        fn add_note(&self, entry_id: u64, text: &str, severity: NoteSeverity) {
            self.0.lock().unwrap().push((entry_id, text.to_string(), severity));
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

    fn submitter_for(server: &MockServer) -> (SurveySubmitter, Arc<RecordingAnnotator>) {
        let transport = Arc::new(
            ApiTransport::new(test_credentials())
                .expect("transport")
                .with_api_base(format!("{}/site", server.uri())),
        );
        let values: Arc<dyn FieldValueAccessor> = Arc::new(MapAccessor);
        let annotator = Arc::new(RecordingAnnotator::default());
        let auth = Arc::new(AuthManager::new(transport.clone()));
        let constituent = ConstituentSubmitter::new(transport.clone(), values.clone(), true);
        let submitter = SurveySubmitter::new(
            transport,
            values,
            annotator.clone(),
            auth,
            constituent,
            true,
        );
        (submitter, annotator)
    }

    fn survey_feed() -> Feed {
        Feed {
            id: 2,
            form_id: 7,
            meta: FeedMeta {
                survey: true,
                survey_id: Some("55".to_string()),
                survey_mapped_fields: std::collections::BTreeMap::from([
                    ("cons_email".to_string(), "3".to_string()),
                    ("survey_question_777".to_string(), "5".to_string()),
                ]),
                ..Default::default()
            },
        }
    }

    fn entry() -> Entry {
        Entry {
            id: 11,
            values: std::collections::BTreeMap::from([
                ("3".to_string(), "a@b.com".to_string()),
                ("5".to_string(), "Yes".to_string()),
            ]),
        }
    }

    fn form() -> Form {
        Form {
            id: 7,
            title: "Contact".into(),
            fields: vec![
                FormField { id: "3".into(), label: "Email".into() },
                FormField { id: "5".into(), label: "Comments".into() },
            ],
        }
    }

    fn form_pairs(body: &[u8]) -> std::collections::BTreeMap<String, String> {
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

    async fn mount_submit_survey(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(body_string_contains("method=submitSurvey"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn lazily_creates_a_constituent_before_the_survey_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=createOrUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "createOrUpdateConsResponse": { "cons_id": "42" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=getSingleSignOnToken"))
            .and(body_string_contains("cons_id=42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "getSingleSignOnTokenResponse": { "token": "scoped-sso" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_submit_survey(&server, json!({ "submitSurveyResponse": { "success": "true" } }))
            .await;

        let (submitter, annotator) = submitter_for(&server);
        let mut ctx = SubmissionContext::new();
        let outcome = submitter
            .submit(&survey_feed(), &entry(), &form(), &mut ctx, "plain-token", false)
            .await
            .expect("outcome");

        assert!(outcome.is_success());
        assert_eq!(ctx.cons_id(), Some("42"));

        let requests = server.received_requests().await.unwrap();
        let survey_request = requests
            .iter()
            .find(|r| String::from_utf8_lossy(&r.body).contains("method=submitSurvey"))
            .expect("survey call");
        let pairs = form_pairs(&survey_request.body);

        // the constituent created on the fly feeds the survey call
        assert_eq!(pairs.get("cons_id").map(String::as_str), Some("42"));
        assert_eq!(pairs.get("question_777").map(String::as_str), Some("Yes"));
        assert_eq!(pairs.get("cons_email").map(String::as_str), Some("a@b.com"));
        assert_eq!(pairs.get("survey_id").map(String::as_str), Some("55"));
        // the re-scoped token replaces the plain one
        assert_eq!(pairs.get("sso_auth_token").map(String::as_str), Some("scoped-sso"));
        assert!(!pairs.contains_key("auth"));

        // the lazy creation used the survey's captured email
        let create_request = requests
            .iter()
            .find(|r| String::from_utf8_lossy(&r.body).contains("method=createOrUpdate"))
            .expect("create call");
        let create_pairs = form_pairs(&create_request.body);
        assert_eq!(create_pairs.get("primary_email").map(String::as_str), Some("a@b.com"));

        let notes = annotator.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].2, NoteSeverity::Success);
        assert!(notes[0].1.contains("survey 55"));
    }

    #[tokio::test]
    async fn reuses_an_existing_record_id_without_creating() {
        let server = MockServer::start().await;
        mount_submit_survey(&server, json!({ "submitSurveyResponse": { "success": true } }))
            .await;

        let (submitter, _annotator) = submitter_for(&server);
        let mut ctx = SubmissionContext::new();
        ctx.set_cons_id("42".to_string());

        let outcome = submitter
            .submit(&survey_feed(), &entry(), &form(), &mut ctx, "sso-token", true)
            .await
            .expect("outcome");
        assert!(outcome.is_success());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let pairs = form_pairs(&requests[0].body);
        assert_eq!(pairs.get("sso_auth_token").map(String::as_str), Some("sso-token"));
    }

    #[tokio::test]
    async fn partial_field_errors_produce_a_warning_note() {
        let server = MockServer::start().await;
        // a single error arrives as a bare object, not an array
        mount_submit_survey(
            &server,
            json!({
                "submitSurveyResponse": {
                    "success": "true",
                    "errors": {
                        "errorMessage": "Answer is too long",
                        "questionInError": 777
                    }
                }
            }),
        )
        .await;

        let (submitter, annotator) = submitter_for(&server);
        let mut ctx = SubmissionContext::new();
        ctx.set_cons_id("42".to_string());

        let outcome = submitter
            .submit(&survey_feed(), &entry(), &form(), &mut ctx, "sso-token", true)
            .await
            .expect("outcome");

        assert!(outcome.is_success());
        let notes = annotator.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].2, NoteSeverity::Warning);
        assert!(notes[0].1.contains("Question 777"));
        assert!(notes[0].1.contains("Answer is too long"));
        assert!(notes[0].1.contains("Comments"));
        assert!(notes[0].1.contains("Yes"));
    }

    #[tokio::test]
    async fn unmapped_error_questions_are_still_reported() {
        let server = MockServer::start().await;
        mount_submit_survey(
            &server,
            json!({
                "submitSurveyResponse": {
                    "success": "true",
                    "errors": [
                        { "errorMessage": "Required", "questionInError": 888 }
                    ]
                }
            }),
        )
        .await;

        let (submitter, annotator) = submitter_for(&server);
        let mut ctx = SubmissionContext::new();
        ctx.set_cons_id("42".to_string());

        submitter.submit(&survey_feed(), &entry(), &form(), &mut ctx, "sso-token", true).await;

        let notes = annotator.notes();
        assert!(notes[0].1.contains("Question 888"));
        assert!(notes[0].1.contains("not mapped"));
    }

    #[tokio::test]
    async fn full_submission_failure_produces_an_error_note() {
        let server = MockServer::start().await;
        mount_submit_survey(
            &server,
            json!({ "submitSurveyResponse": { "success": "false" } }),
        )
        .await;

        let (submitter, annotator) = submitter_for(&server);
        let mut ctx = SubmissionContext::new();
        ctx.set_cons_id("42".to_string());

        let outcome = submitter
            .submit(&survey_feed(), &entry(), &form(), &mut ctx, "sso-token", true)
            .await
            .expect("outcome");

        assert!(matches!(outcome, SubmissionOutcome::ApiError(_)));
        let notes = annotator.notes();
        assert_eq!(notes[0].2, NoteSeverity::Error);
        assert!(notes[0].1.contains("Error submitting survey 55"));
    }

    #[tokio::test]
    async fn api_faults_produce_an_error_note() {
        let server = MockServer::start().await;
        mount_submit_survey(
            &server,
            json!({ "errorResponse": { "code": "1", "message": "Unable to process request." } }),
        )
        .await;

        let (submitter, annotator) = submitter_for(&server);
        let mut ctx = SubmissionContext::new();
        ctx.set_cons_id("42".to_string());

        let outcome = submitter
            .submit(&survey_feed(), &entry(), &form(), &mut ctx, "sso-token", true)
            .await
            .expect("outcome");

        assert!(matches!(outcome, SubmissionOutcome::ApiError(_)));
        assert_eq!(annotator.notes()[0].2, NoteSeverity::Error);
    }

    #[tokio::test]
    async fn skips_feeds_without_survey_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut feed = survey_feed();
        feed.meta.survey = false;

        let (submitter, _annotator) = submitter_for(&server);
        let mut ctx = SubmissionContext::new();
        let outcome =
            submitter.submit(&feed, &entry(), &form(), &mut ctx, "token", false).await;

        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn missing_survey_selection_is_a_no_op() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut feed = survey_feed();
        feed.meta.survey_id = None;

        let (submitter, _annotator) = submitter_for(&server);
        let mut ctx = SubmissionContext::new();
        let outcome =
            submitter.submit(&feed, &entry(), &form(), &mut ctx, "token", false).await;

        assert!(outcome.is_none());
    }
}
