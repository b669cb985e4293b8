//! Submission parsing and field validation.
//!
//! # Responsibilities
//! - Accept only a JSON object as the submission body
//! - Normalize and check the email (length, shape, optional domain allow-list)
//! - Bound every optional string field and drop empty ones
//! - Keep `utm`/`onboarding` only when at least one sub-field has a value
//!
//! # Design Decisions
//! - Pure: no network, no storage, no clock
//! - A field of the wrong type is reported the same way as an oversized one
//! - Lengths are counted in characters, not bytes

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::SubmissionConfig;
use crate::intake::error::IntakeError;

pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_NAME_LENGTH: usize = 80;
pub const MAX_REFERRER_LENGTH: usize = 500;
pub const MAX_UTM_LENGTH: usize = 120;
pub const MAX_ONBOARDING_FIELD_LENGTH: usize = 120;
pub const MAX_HONEYPOT_LENGTH: usize = 120;
pub const MAX_BOT_TOKEN_LENGTH: usize = 2048;

/// Hidden form field that real users never fill in.
pub const HONEYPOT_FIELD: &str = "website";

/// Field carrying the bot verification challenge token.
pub const BOT_TOKEN_FIELD: &str = "turnstileToken";

/// Campaign attribution captured by the landing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Utm {
    fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.medium.is_none()
            && self.campaign.is_none()
            && self.term.is_none()
            && self.content.is_none()
    }
}

/// Product survey answers from the sign-up form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Onboarding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pain_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routine_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_notification_hours: Option<String>,
}

impl Onboarding {
    fn is_empty(&self) -> bool {
        self.message_volume.is_none()
            && self.pain_point.is_none()
            && self.routine_channel.is_none()
            && self.weekly_notification_hours.is_none()
    }
}

/// A validated waitlist entry, ready for persistence once `ip_hash` is filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEntry {
    pub email: String,
    pub name: Option<String>,
    pub utm: Option<Utm>,
    pub onboarding: Option<Onboarding>,
    pub referrer: Option<String>,
    pub ip_hash: Option<String>,
}

/// Output of validation: the entry plus the anti-abuse fields that never get stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub entry: NormalizedEntry,
    pub honeypot: Option<String>,
    pub bot_token: Option<String>,
}

impl ValidatedSubmission {
    /// True when the hidden field was filled in.
    pub fn honeypot_triggered(&self) -> bool {
        self.honeypot.is_some()
    }
}

/// Field validator built once from configuration.
#[derive(Debug, Clone)]
pub struct SubmissionValidator {
    allowed_domains: HashSet<String>,
    domain_not_allowed_message: String,
}

impl SubmissionValidator {
    pub fn new(config: &SubmissionConfig) -> Self {
        Self {
            allowed_domains: config
                .allowed_email_domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            domain_not_allowed_message: config.domain_not_allowed_message.clone(),
        }
    }

    /// Parse a raw request body and validate it.
    pub fn parse(&self, body: &[u8]) -> Result<ValidatedSubmission, IntakeError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|_| IntakeError::MalformedPayload)?;
        self.validate(&value)
    }

    /// Validate an already-decoded submission.
    pub fn validate(&self, value: &Value) -> Result<ValidatedSubmission, IntakeError> {
        let fields = value.as_object().ok_or(IntakeError::MalformedPayload)?;

        let email = self.validate_email(fields.get("email"))?;

        let name = optional_string(fields, "name", MAX_NAME_LENGTH)?;
        let honeypot = optional_string(fields, HONEYPOT_FIELD, MAX_HONEYPOT_LENGTH)?;
        let bot_token = optional_string(fields, BOT_TOKEN_FIELD, MAX_BOT_TOKEN_LENGTH)?;
        let utm = pick_utm(fields.get("utm"))?;
        let onboarding = pick_onboarding(fields.get("onboarding"))?;
        let referrer = optional_string(fields, "referrer", MAX_REFERRER_LENGTH)?;

        Ok(ValidatedSubmission {
            entry: NormalizedEntry {
                email,
                name,
                utm,
                onboarding,
                referrer,
                ip_hash: None,
            },
            honeypot,
            bot_token,
        })
    }

    fn validate_email(&self, raw: Option<&Value>) -> Result<String, IntakeError> {
        let raw = raw.and_then(Value::as_str).unwrap_or_default();

        if raw.chars().count() > MAX_EMAIL_LENGTH {
            return Err(IntakeError::EmailTooLong);
        }

        let email = normalize_email(raw);
        if !is_valid_email(&email) {
            return Err(IntakeError::InvalidEmail);
        }

        if !self.allowed_domains.is_empty() {
            let domain = email.rsplit('@').next().unwrap_or_default();
            if !self.allowed_domains.contains(domain) {
                return Err(IntakeError::EmailDomainNotAllowed {
                    message: self.domain_not_allowed_message.clone(),
                });
            }
        }

        Ok(email)
    }
}

/// Trim and lowercase an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Loose `local@domain.tld` check: exactly one `@`, no whitespace, and a dot
/// inside the domain with at least one character on each side.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

fn optional_string(
    fields: &Map<String, Value>,
    field: &'static str,
    max_len: usize,
) -> Result<Option<String>, IntakeError> {
    bounded(fields.get(field), field, max_len)
}

fn bounded(
    value: Option<&Value>,
    field: &'static str,
    max_len: usize,
) -> Result<Option<String>, IntakeError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else if trimmed.chars().count() > max_len {
                Err(IntakeError::FieldTooLarge { field })
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(_) => Err(IntakeError::FieldTooLarge { field }),
    }
}

fn sub_record<'a>(
    value: Option<&'a Value>,
    field: &'static str,
) -> Result<Option<&'a Map<String, Value>>, IntakeError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(IntakeError::FieldTooLarge { field }),
    }
}

fn pick_utm(value: Option<&Value>) -> Result<Option<Utm>, IntakeError> {
    let Some(map) = sub_record(value, "utm")? else {
        return Ok(None);
    };

    let utm = Utm {
        source: bounded(map.get("source"), "utm.source", MAX_UTM_LENGTH)?,
        medium: bounded(map.get("medium"), "utm.medium", MAX_UTM_LENGTH)?,
        campaign: bounded(map.get("campaign"), "utm.campaign", MAX_UTM_LENGTH)?,
        term: bounded(map.get("term"), "utm.term", MAX_UTM_LENGTH)?,
        content: bounded(map.get("content"), "utm.content", MAX_UTM_LENGTH)?,
    };

    Ok((!utm.is_empty()).then_some(utm))
}

fn pick_onboarding(value: Option<&Value>) -> Result<Option<Onboarding>, IntakeError> {
    let Some(map) = sub_record(value, "onboarding")? else {
        return Ok(None);
    };

    let max = MAX_ONBOARDING_FIELD_LENGTH;
    let onboarding = Onboarding {
        message_volume: bounded(map.get("messageVolume"), "onboarding.messageVolume", max)?,
        pain_point: bounded(map.get("painPoint"), "onboarding.painPoint", max)?,
        routine_channel: bounded(map.get("routineChannel"), "onboarding.routineChannel", max)?,
        weekly_notification_hours: bounded(
            map.get("weeklyNotificationHours"),
            "onboarding.weeklyNotificationHours",
            max,
        )?,
    };

    Ok((!onboarding.is_empty()).then_some(onboarding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> SubmissionValidator {
        SubmissionValidator::new(&SubmissionConfig::default())
    }

    fn restricted(domains: &[&str]) -> SubmissionValidator {
        SubmissionValidator::new(&SubmissionConfig {
            allowed_email_domains: domains.iter().map(|d| d.to_string()).collect(),
            domain_not_allowed_message: "Domínio não permitido".into(),
        })
    }

    #[test]
    fn test_normalizes_email() {
        assert_eq!(normalize_email("  Foo@Example.COM "), "foo@example.com");
        let sub = validator()
            .validate(&json!({ "email": "  Foo@Example.COM " }))
            .unwrap();
        assert_eq!(sub.entry.email, "foo@example.com");
        assert_eq!(sub.entry.name, None);
        assert!(!sub.honeypot_triggered());
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@sub.example.com"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at.example.com"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@example"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@com."));
        assert!(!is_valid_email("a b@example.com"));
    }

    #[test]
    fn test_email_errors() {
        let v = validator();
        assert_eq!(v.validate(&json!({})).unwrap_err(), IntakeError::InvalidEmail);
        assert_eq!(
            v.validate(&json!({ "email": 42 })).unwrap_err(),
            IntakeError::InvalidEmail
        );

        let long = format!("{}@example.com", "a".repeat(250));
        assert_eq!(
            v.validate(&json!({ "email": long })).unwrap_err(),
            IntakeError::EmailTooLong
        );
    }

    #[test]
    fn test_domain_allow_list() {
        let v = restricted(&["Example.com"]);
        assert!(v.validate(&json!({ "email": "  Foo@Example.COM " })).is_ok());

        let err = v.validate(&json!({ "email": "foo@other.com" })).unwrap_err();
        assert_eq!(err.code(), "EMAIL_DOMAIN_NOT_ALLOWED");
        assert_eq!(err.to_string(), "Domínio não permitido");

        let v = restricted(&["other.com"]);
        assert!(v.validate(&json!({ "email": "foo@example.com" })).is_err());
    }

    #[test]
    fn test_rejects_non_objects() {
        let v = validator();
        for body in [json!([]), json!("a@b.co"), json!(1), json!(null)] {
            assert_eq!(v.validate(&body).unwrap_err(), IntakeError::MalformedPayload);
        }
        assert_eq!(v.parse(b"{not json").unwrap_err(), IntakeError::MalformedPayload);
    }

    #[test]
    fn test_name_length_boundary() {
        let v = validator();
        let ok = v
            .validate(&json!({ "email": "a@b.co", "name": "n".repeat(80) }))
            .unwrap();
        assert_eq!(ok.entry.name.unwrap().len(), 80);

        let err = v
            .validate(&json!({ "email": "a@b.co", "name": "n".repeat(81) }))
            .unwrap_err();
        assert_eq!(err, IntakeError::FieldTooLarge { field: "name" });
        assert_eq!(err.code(), "FIELD_TOO_LARGE");
    }

    #[test]
    fn test_length_counts_characters() {
        let name = "ç".repeat(80);
        let sub = validator()
            .validate(&json!({ "email": "a@b.co", "name": name }))
            .unwrap();
        assert_eq!(sub.entry.name.unwrap().chars().count(), 80);
    }

    #[test]
    fn test_non_string_optional_field_is_rejected() {
        let err = validator()
            .validate(&json!({ "email": "a@b.co", "referrer": { "url": "x" } }))
            .unwrap_err();
        assert_eq!(err, IntakeError::FieldTooLarge { field: "referrer" });
    }

    #[test]
    fn test_blank_fields_are_absent() {
        let sub = validator()
            .validate(&json!({
                "email": "a@b.co",
                "name": "   ",
                "referrer": null,
                "website": ""
            }))
            .unwrap();
        assert_eq!(sub.entry.name, None);
        assert_eq!(sub.entry.referrer, None);
        assert!(!sub.honeypot_triggered());
    }

    #[test]
    fn test_utm_present_only_with_values() {
        let v = validator();

        let sub = v
            .validate(&json!({ "email": "a@b.co", "utm": { "source": " ", "medium": "" } }))
            .unwrap();
        assert_eq!(sub.entry.utm, None);

        let sub = v
            .validate(&json!({ "email": "a@b.co", "utm": { "campaign": " launch " } }))
            .unwrap();
        assert_eq!(
            sub.entry.utm,
            Some(Utm {
                campaign: Some("launch".into()),
                ..Utm::default()
            })
        );

        let err = v
            .validate(&json!({ "email": "a@b.co", "utm": { "term": "t".repeat(121) } }))
            .unwrap_err();
        assert_eq!(err, IntakeError::FieldTooLarge { field: "utm.term" });

        let err = v
            .validate(&json!({ "email": "a@b.co", "utm": "google" }))
            .unwrap_err();
        assert_eq!(err, IntakeError::FieldTooLarge { field: "utm" });
    }

    #[test]
    fn test_onboarding_fields() {
        let sub = validator()
            .validate(&json!({
                "email": "a@b.co",
                "onboarding": {
                    "messageVolume": "50-100",
                    "painPoint": "",
                    "weeklyNotificationHours": "5"
                }
            }))
            .unwrap();
        let onboarding = sub.entry.onboarding.unwrap();
        assert_eq!(onboarding.message_volume.as_deref(), Some("50-100"));
        assert_eq!(onboarding.pain_point, None);
        assert_eq!(onboarding.weekly_notification_hours.as_deref(), Some("5"));

        let sub = validator()
            .validate(&json!({ "email": "a@b.co", "onboarding": {} }))
            .unwrap();
        assert_eq!(sub.entry.onboarding, None);
    }

    #[test]
    fn test_honeypot_and_token_are_captured() {
        let sub = validator()
            .validate(&json!({ "email": "a@b.co", "website": "x", "turnstileToken": " tok " }))
            .unwrap();
        assert!(sub.honeypot_triggered());
        assert_eq!(sub.bot_token.as_deref(), Some("tok"));

        let err = validator()
            .validate(&json!({ "email": "a@b.co", "website": "x".repeat(121) }))
            .unwrap_err();
        assert_eq!(err, IntakeError::FieldTooLarge { field: "website" });
    }
}
