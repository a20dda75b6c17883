//! Validation rules for step answer payloads.
//!
//! A step's validator is a pure predicate over the JSON payload the user
//! entered for that step. The engine never looks inside payloads; it only
//! asks the step's `StepValidator`. Field-level rules additionally produce
//! user-facing messages for inline display.

use std::sync::{Arc, LazyLock};

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Message shown when a step refuses to advance without field details.
pub const INCOMPLETE_STEP_MESSAGE: &str = "Please complete all required fields";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern compiles")
});

static PHONE_IN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[6-9]\d{9}$").expect("IN phone pattern compiles"));

static PHONE_US_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(?([0-9]{3})\)?[-. ]?([0-9]{3})[-. ]?([0-9]{4})$")
        .expect("US phone pattern compiles")
});

static PHONE_UK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(447|07)\d{9}$").expect("UK phone pattern compiles"));

static PASSWORD_SPECIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[!@#$%^&*(),.?":{}|<>]"#).expect("special character pattern compiles")
});

/// Outcome of validating a payload, with messages for the host view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }
}

/// Phone number formats accepted by `FieldRule::Phone`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PhoneRegion {
    #[default]
    In,
    Us,
    Uk,
}

/// Check a phone number after stripping everything but digits.
pub fn phone(value: &str, region: PhoneRegion) -> bool {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    match region {
        PhoneRegion::In => PHONE_IN_RE.is_match(&digits),
        PhoneRegion::Us => PHONE_US_RE.is_match(&digits),
        PhoneRegion::Uk => PHONE_UK_RE.is_match(&digits),
    }
}

pub fn email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Password strength problems; empty when the password is acceptable.
pub fn password_strength(password: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if !PASSWORD_SPECIAL_RE.is_match(password) {
        errors.push("Password must contain at least one special character".to_string());
    }
    errors
}

/// Validate an ISO date of birth against `today`. Age is the difference in
/// calendar years.
pub fn date_of_birth(
    value: &str,
    min_age: Option<i32>,
    max_age: Option<i32>,
    today: NaiveDate,
) -> Result<(), String> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| "Invalid date format".to_string())?;
    if date > today {
        return Err("Date cannot be in the future".to_string());
    }
    let age = today.year() - date.year();
    if let Some(min) = min_age
        && age < min
    {
        return Err(format!("Must be at least {min} years old"));
    }
    if let Some(max) = max_age
        && age > max
    {
        return Err(format!("Must be less than {max} years old"));
    }
    Ok(())
}

/// Loose presence check: non-blank strings, non-empty collections, `true`,
/// and non-zero numbers count as present.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Object(_)) => true,
    }
}

/// Look up a dotted path (`bankDetails.ifscCode`) in a payload.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |node, key| node.get(key))
}

/// One check applied to a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    Required,
    /// A non-blank string.
    Text,
    Email,
    Phone(PhoneRegion),
    MinLength(usize),
    MaxLength(usize),
    ArrayLength {
        min: Option<usize>,
        max: Option<usize>,
    },
    DateOfBirth {
        min_age: Option<i32>,
        max_age: Option<i32>,
    },
    Password,
}

impl FieldRule {
    /// Check a field value, returning the user-facing message on failure.
    pub fn check(&self, field: &str, value: Option<&Value>) -> Result<(), String> {
        match self {
            Self::Required => match value {
                None | Some(Value::Null) => Err(format!("{field} is required")),
                Some(Value::String(s)) if s.is_empty() => Err(format!("{field} is required")),
                Some(Value::String(s)) if s.trim().is_empty() => {
                    Err(format!("{field} cannot be empty"))
                }
                _ => Ok(()),
            },
            Self::Text => match value {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
                Some(Value::String(_)) | None | Some(Value::Null) => {
                    Self::Required.check(field, value)
                }
                Some(_) => Err(format!("{field} must be text")),
            },
            Self::Email => match value.and_then(Value::as_str) {
                Some(s) if email(s) => Ok(()),
                _ => Err("Please enter a valid email address".to_string()),
            },
            Self::Phone(region) => match value.and_then(Value::as_str) {
                Some(s) if phone(s, *region) => Ok(()),
                _ => Err("Please enter a valid phone number".to_string()),
            },
            Self::MinLength(min) => match value.and_then(Value::as_str) {
                Some(s) if s.chars().count() >= *min => Ok(()),
                _ => Err(format!("Must be at least {min} characters long")),
            },
            Self::MaxLength(max) => match value.and_then(Value::as_str) {
                Some(s) if s.chars().count() <= *max => Ok(()),
                _ => Err(format!("Must be no more than {max} characters long")),
            },
            Self::ArrayLength { min, max } => {
                let Some(items) = value.and_then(Value::as_array) else {
                    return Err(format!("{field} must be an array"));
                };
                if let Some(min) = min
                    && items.len() < *min
                {
                    return Err(format!("{field} must have at least {min} items"));
                }
                if let Some(max) = max
                    && items.len() > *max
                {
                    return Err(format!("{field} cannot have more than {max} items"));
                }
                Ok(())
            }
            Self::DateOfBirth { min_age, max_age } => match value.and_then(Value::as_str) {
                Some(s) => date_of_birth(s, *min_age, *max_age, Utc::now().date_naive()),
                None => Err("Invalid date format".to_string()),
            },
            Self::Password => {
                let errors = password_strength(value.and_then(Value::as_str).unwrap_or_default());
                match errors.into_iter().next() {
                    Some(first) => Err(first),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Ordered field rules for one step. The first failing rule of each field
/// produces that field's message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRules {
    fields: Vec<(String, Vec<FieldRule>)>,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, path: &str, rules: impl IntoIterator<Item = FieldRule>) -> Self {
        self.fields.push((path.to_string(), rules.into_iter().collect()));
        self
    }

    /// Shorthand for several fields that are only `Text`.
    pub fn text(self, paths: &[&str]) -> Self {
        paths
            .iter()
            .fold(self, |rules, path| rules.field(path, [FieldRule::Text]))
    }

    /// Shorthand for several fields that are only `Required`.
    pub fn required(self, paths: &[&str]) -> Self {
        paths
            .iter()
            .fold(self, |rules, path| rules.field(path, [FieldRule::Required]))
    }

    pub fn check(&self, data: &Value) -> ValidationResult {
        let errors = self
            .fields
            .iter()
            .filter_map(|(path, rules)| {
                let value = lookup(data, path);
                rules.iter().find_map(|rule| rule.check(path, value).err())
            })
            .collect();
        ValidationResult::failed(errors)
    }
}

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// The validation gate of a step.
#[derive(Clone, Default)]
pub enum StepValidator {
    /// Steps without a gate (welcome screens, completion).
    #[default]
    Always,
    Fields(FieldRules),
    Custom(Predicate),
}

impl std::fmt::Debug for StepValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Fields(rules) => f.debug_tuple("Fields").field(rules).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl StepValidator {
    pub fn custom(predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    pub fn validate(&self, data: &Value) -> bool {
        self.report(data).is_valid
    }

    pub fn report(&self, data: &Value) -> ValidationResult {
        match self {
            Self::Always => ValidationResult::ok(),
            Self::Fields(rules) => rules.check(data),
            Self::Custom(predicate) if predicate(data) => ValidationResult::ok(),
            Self::Custom(_) => ValidationResult::failed(vec![INCOMPLETE_STEP_MESSAGE.to_string()]),
        }
    }
}

// ── Catalog predicates ──────────────────────────────────────────────

pub fn welcome_started(data: &Value) -> bool {
    is_present(data.get("started"))
}

pub fn profile_rules() -> FieldRules {
    FieldRules::new().text(&["firstName", "lastName", "email", "phone"])
}

pub fn role_rules() -> FieldRules {
    FieldRules::new().required(&["role"])
}

pub fn address_rules() -> FieldRules {
    FieldRules::new().text(&["street", "city", "state"])
}

pub fn verification_rules() -> FieldRules {
    FieldRules::new().required(&[
        "idDocument.number",
        "bankDetails.accountNumber",
        "bankDetails.ifscCode",
        "idDocument.frontImage",
    ])
}

pub fn non_empty_list_rules(field: &str) -> FieldRules {
    FieldRules::new().field(
        field,
        [
            FieldRule::Required,
            FieldRule::ArrayLength {
                min: Some(1),
                max: None,
            },
        ],
    )
}

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

pub fn any_day_available(data: &Value) -> bool {
    WEEKDAYS
        .iter()
        .any(|day| is_present(lookup(data, &format!("{day}.available"))))
}
