//! Luminate CRM integration.
//!
//! Maps form submissions to Luminate constituent records, group
//! memberships, and survey responses. The transport executes individual
//! API calls with session/cookie continuity; the submitters orchestrate
//! the dependent call chains with partial-failure isolation.

pub mod auth;
pub mod cache;
pub mod constituent;
pub mod fields;
pub mod normalize;
pub mod pipeline;
pub mod survey;
pub mod transport;

pub use auth::AuthManager;
pub use cache::LuminateCaches;
pub use constituent::ConstituentSubmitter;
pub use fields::FieldMapResolver;
pub use pipeline::{FeedProcessor, SubmissionContext};
pub use survey::SurveySubmitter;
pub use transport::{ApiTransport, HttpMethod, ParamMap, ResponseFormat};
