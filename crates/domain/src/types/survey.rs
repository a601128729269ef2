//! Survey structures as exposed to field mapping.

use serde::{Deserialize, Serialize};

use super::fields::{luminate_field_name, mappable_field_name};

/// Mappable-name prefix for free-form survey questions.
pub const QUESTION_NAME_PREFIX: &str = "survey_question_";

/// Wire-parameter prefix the submit endpoint expects for those questions.
pub const QUESTION_PARAM_PREFIX: &str = "question_";

/// One published survey of the Luminate instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    pub id: String,
    pub name: String,
}

/// Where a survey question takes its answer from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionOrigin {
    /// Constituent-profile question, identified by field name.
    Constituent { field_name: String },
    /// Free-form question, identified by numeric id.
    FreeForm { question_id: String },
}

/// One mappable question of a survey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyQuestion {
    pub origin: QuestionOrigin,
    pub label: String,
    pub required: bool,
}

impl SurveyQuestion {
    /// Host-safe mappable name. The two origins get distinct patterns so
    /// reverse mapping can tell them apart: free-form questions an id-based
    /// prefix, constituent questions the escaped field name.
    pub fn mappable_name(&self) -> String {
        match &self.origin {
            QuestionOrigin::FreeForm { question_id } => {
                format!("{QUESTION_NAME_PREFIX}{question_id}")
            }
            QuestionOrigin::Constituent { field_name } => mappable_field_name(field_name),
        }
    }
}

/// Turn a mapped survey field name back into its wire parameter name.
pub fn survey_param_name(mapped: &str) -> String {
    match mapped.strip_prefix(QUESTION_NAME_PREFIX) {
        Some(question_id) => format!("{QUESTION_PARAM_PREFIX}{question_id}"),
        None => luminate_field_name(mapped),
    }
}

/// One rejected question of an otherwise-submitted survey response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyFieldError {
    /// Question id, when the remote names one.
    pub question_id: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_form_questions_get_the_id_prefix() {
        let question = SurveyQuestion {
            origin: QuestionOrigin::FreeForm { question_id: "1234".into() },
            label: "Comments".into(),
            required: false,
        };

        assert_eq!(question.mappable_name(), "survey_question_1234");
    }

    #[test]
    fn constituent_questions_use_the_escaped_field_name() {
        let question = SurveyQuestion {
            origin: QuestionOrigin::Constituent { field_name: "email.primary_address".into() },
            label: "Email".into(),
            required: true,
        };

        assert_eq!(question.mappable_name(), "email__dot__primary_address");
    }

    #[test]
    fn param_names_distinguish_the_two_origins() {
        assert_eq!(survey_param_name("survey_question_1234"), "question_1234");
        assert_eq!(survey_param_name("email__dot__primary_address"), "email.primary_address");
        assert_eq!(survey_param_name("cons_email"), "cons_email");
    }
}
