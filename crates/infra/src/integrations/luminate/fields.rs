//! Field catalog resolution.
//!
//! Translates the CRM's field catalog (constituent fields, surveys,
//! survey questions, groups) into mappable field lists for the host's
//! feed configuration UI, and keeps the slow listings cached.

use std::sync::Arc;

use formlink_domain::{
    mappable_field_name, ApiReply, FieldMapping, GroupInfo, QuestionOrigin, Result, Survey,
    SurveyQuestion,
};
use serde_json::Value;
use tracing::{debug, error};

use super::auth::AuthManager;
use super::cache::LuminateCaches;
use super::normalize::{is_true, one_or_many, scalar_string};
use super::transport::{ApiTransport, HttpMethod, ParamMap, ResponseFormat};

/// Page size of the remote listing endpoints.
const LIST_PAGE_SIZE: usize = 25;

/// Fields that are always editable, used when the remote catalog cannot be
/// fetched or comes back empty.
const DEFAULT_EDITABLE_FIELDS: &[&str] = &[
    "first_name",
    "last_name",
    "primary_email",
    "home_phone",
    "mobile_phone",
    "work_Phone",
    "home_street1",
    "home_street2",
    "home_street3",
    "home_city",
    "home_stateprov",
    "home_zip",
    "home_county",
    "home_country",
    "other_street1",
    "other_street2",
    "other_city",
    "other_stateprov",
    "other_county",
    "other_zip",
    "other_country",
    "employer",
    "employer_street1",
    "employer_street2",
    "employer_street3",
    "employer_city",
    "employer_stateprov",
    "employer_county",
    "employer_zip",
    "employer_country",
    "cons_occupation",
    "position",
];

/// Write-only fields: not returned by the read endpoint but accepted by
/// the create-or-update endpoint.
const WRITE_ONLY_FIELDS: &[(&str, &str)] = &[
    ("add_center_ids", "Add Center IDs"),
    ("add_center_opt_in_ids", "Add Center IDs Email Opt-ins"),
    ("add_interest_ids", "Add Interest IDs"),
    ("remove_center_ids", "Remove Center IDs"),
    ("remove_center_opt_in_ids", "Remove Center IDs Email Opt-ins"),
    ("remove_group_ids", "Remove Groups"),
    ("remove_interest_ids", "Remove Interest IDs"),
    ("interaction_subject", "Interaction Subject (limit 80 characters)"),
    ("interaction_body", "Interaction Body"),
    ("interaction_cat_id", "Interaction Category ID"),
    ("interaction_count", "Interaction Count (number of times interaction performed)"),
    ("no_welcome", "Don't Send Welcome Email"),
    ("suppress_cleaning", "Suppress Data Cleaning"),
];

/// Attribution fields accepted by every submission endpoint.
const COMMON_FIELDS: &[(&str, &str)] = &[("source", "Source"), ("sub_source", "Sub-source")];

/// One editable field as reported by the remote catalog.
#[derive(Debug, Clone)]
struct EditableField {
    name: String,
    label: String,
    sub_group: Option<String>,
    required: bool,
}

impl EditableField {
    fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name").and_then(Value::as_str)?.to_string();
        let label = value
            .get("label")
            .and_then(scalar_string)
            .unwrap_or_else(|| title_case(&name));
        let sub_group = value
            .get("subGroup")
            .and_then(scalar_string)
            .filter(|sub| !sub.is_empty());
        let required = value.get("required").map(is_true).unwrap_or(false);

        Some(Self { name, label, sub_group, required })
    }
}

/// Resolves CRM catalogs into mappable field lists.
pub struct FieldMapResolver {
    transport: Arc<ApiTransport>,
    auth: Arc<AuthManager>,
    caches: Arc<LuminateCaches>,
}

impl FieldMapResolver {
    pub fn new(
        transport: Arc<ApiTransport>,
        auth: Arc<AuthManager>,
        caches: Arc<LuminateCaches>,
    ) -> Self {
        Self { transport, auth, caches }
    }

    /// The mappable constituent field list, served from cache within the
    /// TTL.
    ///
    /// Prepends the synthetic `cons_id` entry (mapping by record id avoids
    /// the remote's duplicate-email errors), appends the write-only fields
    /// the read endpoint never reports, and falls back to the hard-coded
    /// default list when the catalog cannot be fetched.
    pub async fn constituent_field_map(
        &self,
        force_refresh: bool,
    ) -> Result<Arc<Vec<FieldMapping>>> {
        if force_refresh {
            self.caches.invalidate_fields();
        } else if let Some(cached) = self.caches.fields() {
            debug!("serving constituent field map from cache");
            return Ok(cached);
        }

        // (native name, display label, required)
        let mut entries: Vec<(String, String, bool)> =
            vec![("cons_id".to_string(), "Constituent ID".to_string(), false)];

        let editable = match self.editable_fields().await {
            Ok(fields) => fields,
            Err(err) => {
                error!(error = %err, "failed to fetch editable constituent fields; using defaults");
                Vec::new()
            }
        };

        if editable.is_empty() {
            for name in DEFAULT_EDITABLE_FIELDS {
                entries.push(((*name).to_string(), title_case(name), false));
            }
        } else {
            for field in editable {
                let label = match &field.sub_group {
                    // similar labels repeat across subgroups; prefix to disambiguate
                    Some(sub_group) => format!("{sub_group}: {}", field.label),
                    None => field.label.clone(),
                };
                let required = field.required && field.name != "user_password";
                entries.push((field.name, label, required));
            }
        }

        for (name, label) in WRITE_ONLY_FIELDS {
            entries.push(((*name).to_string(), (*label).to_string(), false));
        }

        let mut map: Vec<FieldMapping> = entries
            .into_iter()
            .enumerate()
            .map(|(index, (name, label, required))| FieldMapping {
                name: mappable_field_name(&name),
                // numbered labels keep the long list navigable in the UI
                label: format!("{}. {label}", index + 1),
                required,
            })
            .collect();

        for (name, label) in COMMON_FIELDS {
            map.push(FieldMapping {
                name: (*name).to_string(),
                label: (*label).to_string(),
                required: false,
            });
        }

        Ok(self.caches.store_fields(map))
    }

    async fn editable_fields(&self) -> Result<Vec<EditableField>> {
        let params = ParamMap::from([
            ("access".to_string(), "update".to_string()),
            ("include_choices".to_string(), "true".to_string()),
            ("sort_order".to_string(), "group".to_string()),
        ]);

        let reply = self
            .transport
            .call("SRConsAPI_listUserFields", params, ResponseFormat::Json, HttpMethod::Post)
            .await?;

        let body = match reply {
            ApiReply::Fault(fault) => return Err(fault.into_error()),
            ApiReply::Data(body) => body,
        };

        Ok(one_or_many(body.pointer("/listConsFieldsResponse/field"))
            .into_iter()
            .filter_map(EditableField::from_value)
            .collect())
    }

    /// Published surveys, aggregated across listing pages.
    pub async fn surveys(&self) -> Result<Vec<Survey>> {
        let mut page: u32 = 0;
        let mut surveys = Vec::new();

        loop {
            let params = ParamMap::from([
                ("published_only".to_string(), "true".to_string()),
                ("list_ascending".to_string(), "true".to_string()),
                ("list_page_offset".to_string(), page.to_string()),
            ]);

            debug!(page, "listing published surveys");
            let reply = self
                .transport
                .call("CRSurveyAPI_listSurveys", params, ResponseFormat::Json, HttpMethod::Get)
                .await?;

            let body = match reply {
                ApiReply::Fault(fault) => return Err(fault.into_error()),
                ApiReply::Data(body) => body,
            };

            let Some(envelope) = body.get("listSurveysResponse") else {
                break;
            };

            for survey in one_or_many(envelope.get("surveys")) {
                let id = survey.get("surveyId").and_then(scalar_string);
                let name = survey.get("surveyName").and_then(scalar_string);
                if let (Some(id), Some(name)) = (id, name) {
                    surveys.push(Survey { id, name });
                }
            }

            let current_size = envelope
                .pointer("/pagingMetadata/currentSize")
                .and_then(scalar_string)
                .and_then(|size| size.parse::<usize>().ok())
                .unwrap_or(0);

            if current_size > LIST_PAGE_SIZE {
                page += 1;
            } else {
                break;
            }
        }

        Ok(surveys)
    }

    /// The mappable questions of one survey.
    pub async fn survey_questions(&self, survey_id: &str) -> Result<Vec<SurveyQuestion>> {
        let token = self.auth.single_sign_on_token(None).await?;
        let params = ParamMap::from([
            ("survey_id".to_string(), survey_id.to_string()),
            ("sso_auth_token".to_string(), token),
        ]);

        debug!(survey_id, "fetching survey questions");
        let reply = self
            .transport
            .call("CRSurveyAPI_getSurvey", params, ResponseFormat::Json, HttpMethod::Post)
            .await?;

        let body = match reply {
            ApiReply::Fault(fault) => return Err(fault.into_error()),
            ApiReply::Data(body) => body,
        };

        let mut questions = Vec::new();
        for question in one_or_many(body.pointer("/getSurveyResponse/survey/surveyQuestions")) {
            if let Some(cons_info) = question.pointer("/questionTypeData/consRegInfoData") {
                for field in one_or_many(cons_info.get("contactInfoField")) {
                    let Some(field_name) = field.get("fieldName").and_then(Value::as_str) else {
                        continue;
                    };
                    let required = field
                        .get("fieldStatus")
                        .and_then(Value::as_str)
                        .is_some_and(|status| status.eq_ignore_ascii_case("required"));
                    let label = field
                        .get("label")
                        .and_then(scalar_string)
                        .unwrap_or_else(|| field_name.to_string());

                    questions.push(SurveyQuestion {
                        origin: QuestionOrigin::Constituent { field_name: field_name.to_string() },
                        label: question_label(&label),
                        required,
                    });
                }
            } else if let Some(text) =
                question.get("questionText").and_then(Value::as_str).filter(|t| !t.is_empty())
            {
                let Some(question_id) = question.get("questionId").and_then(scalar_string) else {
                    continue;
                };
                let required = question.get("questionRequired").map(is_true).unwrap_or(false);

                questions.push(SurveyQuestion {
                    origin: QuestionOrigin::FreeForm { question_id },
                    label: question_label(text),
                    required,
                });
            }
        }

        Ok(questions)
    }

    /// Groups available for membership mapping, aggregated across pages
    /// and served from cache within the TTL.
    pub async fn groups(&self) -> Result<Arc<Vec<GroupInfo>>> {
        if let Some(cached) = self.caches.groups() {
            debug!("serving group list from cache");
            return Ok(cached);
        }

        let mut page: u32 = 0;
        let mut groups = Vec::new();

        loop {
            let params = ParamMap::from([
                ("selection_mode".to_string(), "MEMBERSHIP".to_string()),
                ("list_page_offset".to_string(), page.to_string()),
            ]);

            debug!(page, "listing groups");
            let reply = self
                .transport
                .call("SRGroupAPI_listGroups", params, ResponseFormat::Json, HttpMethod::Post)
                .await?;

            let body = match reply {
                ApiReply::Fault(fault) => return Err(fault.into_error()),
                ApiReply::Data(body) => body,
            };

            let infos = one_or_many(body.pointer("/listGroupsResponse/groupInfo"));
            if infos.is_empty() {
                break;
            }

            for info in &infos {
                // dynamic rebuilding groups cannot take direct membership
                if info.get("groupMode").and_then(Value::as_str) == Some("DYNAMIC_REBUILDABLE") {
                    continue;
                }

                let id = info.get("id").and_then(scalar_string);
                let name = info.get("name").and_then(scalar_string);
                if let (Some(id), Some(name)) = (id, name) {
                    groups.push(GroupInfo { id, name });
                }
            }

            if infos.len() >= LIST_PAGE_SIZE {
                page += 1;
            } else {
                break;
            }
        }

        if groups.is_empty() {
            // nothing worth caching; the next call retries the remote
            return Ok(Arc::new(groups));
        }

        Ok(self.caches.store_groups(groups))
    }
}

fn question_label(label: &str) -> String {
    match label {
        "cons_first_name" => "First Name:".to_string(),
        "cons_last_name" => "Last Name:".to_string(),
        other => title_case(other),
    }
}

fn title_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
