use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use validator::ValidateEmail;

// --- Domain Errors ---

/// Why a single field was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    #[error("Field required")]
    Missing,
    #[error("Input should be a valid string")]
    NotAString,
    #[error("value is not a valid email address: {0}")]
    InvalidEmail(&'static str),
    #[error("Input should be a valid datetime")]
    InvalidTimestamp,
    #[error("Input should be a valid dictionary or object")]
    NotAnObject,
}

impl FieldErrorKind {
    /// Short machine-readable code, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            FieldErrorKind::Missing => "missing",
            FieldErrorKind::NotAString => "string_type",
            FieldErrorKind::InvalidEmail(_) => "value_error",
            FieldErrorKind::InvalidTimestamp => "datetime_type",
            FieldErrorKind::NotAnObject => "dict_type",
        }
    }
}

/// A rejected field. `field` is `None` when the payload as a whole is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Option<&'static str>,
    pub kind: FieldErrorKind,
}

impl FieldError {
    fn new(field: &'static str, kind: FieldErrorKind) -> Self {
        Self {
            field: Some(field),
            kind,
        }
    }

    fn body(kind: FieldErrorKind) -> Self {
        Self { field: None, kind }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(f, "{}: {}", field, self.kind),
            None => write!(f, "body: {}", self.kind),
        }
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Every field that failed, in schema order.
    #[error("{record} failed validation: {}", join_errors(.errors))]
    InvalidRecord {
        record: &'static str,
        errors: Vec<FieldError>,
    },
    #[error("Record could not be encoded: {0}")]
    Encoding(String),
}

// --- Document ID ---
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: String) -> Self {
        Self(id)
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<DocumentId> for String {
    fn from(doc_id: DocumentId) -> Self {
        doc_id.0
    }
}
impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Schema Definition ---

/// Defines the type of a field in a record schema.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Timestamp,
}

impl FieldType {
    /// Checks a non-null value and returns its normalized form.
    fn check(self, value: &Value) -> Result<Value, FieldErrorKind> {
        match self {
            FieldType::Text => value
                .as_str()
                .map(|text| Value::String(text.to_owned()))
                .ok_or(FieldErrorKind::NotAString),
            FieldType::Email => {
                let text = value.as_str().ok_or(FieldErrorKind::NotAString)?;
                normalize_email(text).map(Value::String)
            }
            FieldType::Timestamp => parse_timestamp(value)
                .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        }
    }
}

/// Defines a single field within a record schema.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    /// Value stored when the field is absent or null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    pub description: &'static str,
}

impl FieldDefinition {
    const fn required(
        name: &'static str,
        field_type: FieldType,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            field_type,
            required: true,
            default: None,
            description,
        }
    }

    const fn optional(
        name: &'static str,
        field_type: FieldType,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            field_type,
            required: false,
            default: None,
            description,
        }
    }

    const fn defaulted(
        name: &'static str,
        field_type: FieldType,
        default: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            field_type,
            required: false,
            default: Some(default),
            description,
        }
    }
}

/// A record kind: its accepted fields and the collection it is stored in.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSchema {
    pub name: &'static str,
    pub collection: &'static str,
    pub description: &'static str,
    pub fields: &'static [FieldDefinition],
}

impl RecordSchema {
    /// Validates an arbitrary JSON payload against this schema.
    ///
    /// Returns the accepted fields (normalized, defaults applied, unknown keys
    /// dropped) or an error listing every field that failed.
    pub fn validate(&self, input: &Value) -> Result<Map<String, Value>, DomainError> {
        let Some(object) = input.as_object() else {
            return Err(DomainError::InvalidRecord {
                record: self.name,
                errors: vec![FieldError::body(FieldErrorKind::NotAnObject)],
            });
        };

        let mut validated = Map::new();
        let mut errors = Vec::new();
        for field in self.fields {
            // An explicit null counts as absent
            match object.get(field.name).filter(|value| !value.is_null()) {
                Some(value) => match field.field_type.check(value) {
                    Ok(normalized) => {
                        validated.insert(field.name.to_string(), normalized);
                    }
                    Err(kind) => errors.push(FieldError::new(field.name, kind)),
                },
                None if field.required => {
                    errors.push(FieldError::new(field.name, FieldErrorKind::Missing));
                }
                None => {
                    let fallback = field
                        .default
                        .map_or(Value::Null, |default| Value::String(default.to_string()));
                    validated.insert(field.name.to_string(), fallback);
                }
            }
        }

        if errors.is_empty() {
            Ok(validated)
        } else {
            Err(DomainError::InvalidRecord {
                record: self.name,
                errors,
            })
        }
    }
}

// --- Field format checks ---

/// Checks the address with `validator` and lowercases the domain.
///
/// On top of the crate's check, the local part may not start, end, or repeat
/// a dot, and the domain needs at least one dot.
pub fn normalize_email(input: &str) -> Result<String, FieldErrorKind> {
    let Some((local, domain)) = input.rsplit_once('@') else {
        return Err(FieldErrorKind::InvalidEmail(
            "An email address must have an @-sign.",
        ));
    };
    if local.is_empty() {
        return Err(FieldErrorKind::InvalidEmail(
            "There must be something before the @-sign.",
        ));
    }
    if domain.is_empty() {
        return Err(FieldErrorKind::InvalidEmail(
            "There must be something after the @-sign.",
        ));
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(FieldErrorKind::InvalidEmail(
            "The part before the @-sign is not valid.",
        ));
    }
    if !domain.contains('.') || domain.ends_with('.') {
        return Err(FieldErrorKind::InvalidEmail(
            "The part after the @-sign is not valid. It should have a period.",
        ));
    }

    // validator only knows ASCII local parts; internationalized letters are
    // checked as plain letters.
    let ascii_local: String = local
        .chars()
        .map(|c| if !c.is_ascii() && c.is_alphanumeric() { 'a' } else { c })
        .collect();
    if !format!("{}@{}", ascii_local, domain).validate_email() {
        return Err(FieldErrorKind::InvalidEmail("The email address is not valid."));
    }
    Ok(format!("{}@{}", local, domain.to_lowercase()))
}

const MILLISECONDS_THRESHOLD: f64 = 2e10;

/// Accepts RFC 3339, naive ISO-8601 (taken as UTC), a bare date, or a Unix
/// timestamp in seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, FieldErrorKind> {
    match value {
        Value::String(text) => parse_timestamp_text(text.trim()),
        Value::Number(number) => {
            let raw = number
                .as_f64()
                .filter(|n| n.is_finite())
                .ok_or(FieldErrorKind::InvalidTimestamp)?;
            // Past 2e10 the number is milliseconds, as JavaScript's Date.now() sends
            let secs = if raw.abs() > MILLISECONDS_THRESHOLD {
                raw / 1000.0
            } else {
                raw
            };
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::from_timestamp(whole as i64, nanos).ok_or(FieldErrorKind::InvalidTimestamp)
        }
        _ => Err(FieldErrorKind::InvalidTimestamp),
    }
}

fn parse_timestamp_text(text: &str) -> Result<DateTime<Utc>, FieldErrorKind> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or(FieldErrorKind::InvalidTimestamp)
}

// --- Record kinds ---

/// A record kind that can be validated from JSON and stored as a document.
pub trait Record: Serialize + DeserializeOwned {
    fn schema() -> &'static RecordSchema;

    fn collection() -> &'static str {
        Self::schema().collection
    }

    /// Validates `input` and builds the typed record.
    fn parse(input: &Value) -> Result<Self, DomainError> {
        let fields = Self::schema().validate(input)?;
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| DomainError::Encoding(e.to_string()))
    }

    /// The record as a storage document.
    fn to_fields(&self) -> Result<Map<String, Value>, DomainError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(other) => Err(DomainError::Encoding(format!(
                "expected an object, got {}",
                other
            ))),
            Err(e) => Err(DomainError::Encoding(e.to_string())),
        }
    }
}

pub static APPOINTMENT_SCHEMA: RecordSchema = RecordSchema {
    name: "Appointment",
    collection: "appointment",
    description: "Appointment requests for Smylor Dental Care",
    fields: &[
        FieldDefinition::required("full_name", FieldType::Text, "Patient full name"),
        FieldDefinition::required("email", FieldType::Email, "Patient email"),
        FieldDefinition::required("phone", FieldType::Text, "Contact phone number"),
        FieldDefinition::optional(
            "preferred_date",
            FieldType::Text,
            "Preferred date (YYYY-MM-DD)",
        ),
        FieldDefinition::optional(
            "preferred_time",
            FieldType::Text,
            "Preferred time (e.g., 10:30 AM)",
        ),
        FieldDefinition::optional("service", FieldType::Text, "Requested service"),
        FieldDefinition::optional("notes", FieldType::Text, "Additional notes"),
        FieldDefinition::defaulted("source", FieldType::Text, "website", "Source of request"),
    ],
};

pub static CONTACT_MESSAGE_SCHEMA: RecordSchema = RecordSchema {
    name: "ContactMessage",
    collection: "contactmessage",
    description: "General contact messages",
    fields: &[
        FieldDefinition::required("name", FieldType::Text, "Sender name"),
        FieldDefinition::required("email", FieldType::Email, "Sender email"),
        FieldDefinition::optional("subject", FieldType::Text, "Message subject"),
        FieldDefinition::required("message", FieldType::Text, "Message body"),
        FieldDefinition::optional(
            "sent_at",
            FieldType::Timestamp,
            "Client timestamp if provided",
        ),
    ],
};

/// Every declared record kind, in a stable order.
pub fn schemas() -> [&'static RecordSchema; 2] {
    [&APPOINTMENT_SCHEMA, &CONTACT_MESSAGE_SCHEMA]
}

/// An appointment request submitted from the website.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Appointment {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub preferred_date: Option<String>,
    pub preferred_time: Option<String>,
    pub service: Option<String>,
    pub notes: Option<String>,
    pub source: String,
}

impl Record for Appointment {
    fn schema() -> &'static RecordSchema {
        &APPOINTMENT_SCHEMA
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Record for ContactMessage {
    fn schema() -> &'static RecordSchema {
        &CONTACT_MESSAGE_SCHEMA
    }
}

// --- Stored Document ---

/// A document as held by the store: its assigned ID plus the stored fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    id: DocumentId,
    fields: Map<String, Value>,
}

impl StoredDocument {
    pub fn new(id: DocumentId, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Flattens the document into its listing shape, exposing the ID as `id`.
    pub fn into_item(self) -> Map<String, Value> {
        let mut item = self.fields;
        item.insert("id".to_string(), Value::String(self.id.into()));
        item
    }
}
