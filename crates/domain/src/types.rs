//! Domain types for the Luminate integration

pub mod api;
pub mod config;
pub mod feed;
pub mod fields;
pub mod session;
pub mod survey;

pub use api::{ApiErrorCode, ApiFault, ApiReply, CallAudit, CredentialCheck, SubmissionOutcome};
pub use config::{format_host, IntegrationSettings, LuminateCredentials};
pub use feed::{Entry, Feed, FeedMeta, Form, FormField};
pub use fields::{
    luminate_field_name, mappable_field_name, FieldMapping, GroupInfo, DOT_SENTINEL,
};
pub use session::{Session, TokenBundle, TokenMode};
pub use survey::{
    survey_param_name, QuestionOrigin, Survey, SurveyFieldError, SurveyQuestion,
    QUESTION_NAME_PREFIX, QUESTION_PARAM_PREFIX,
};
