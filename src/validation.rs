//! Recipe schema validation for imports and API payloads.
//!
//! Every candidate record runs through [`normalize_record`] and is then
//! checked field by field. Errors are collected, never raised: a batch is
//! always fully inspected so a caller can reject an import while reporting
//! every problem at once. Whether to accept a partially valid batch is the
//! caller's decision.
//!
//! # Error shape
//!
//! ```json
//! {
//!   "index": 1,
//!   "recipe_id": "bad-001",
//!   "recipe_title": "Test",
//!   "loc": ["body", "ingredients"],
//!   "msg": "List should have at least 1 item",
//!   "type": "too_short"
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::bounds::*;
use crate::models::{Recipe, RecipeInput};
use crate::normalize::{normalize_record, parse_timestamp};

const UNKNOWN_ID: &str = "?";
const UNKNOWN_TITLE: &str = "<no title>";

/// Category of a field-level validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TypeError,
    Missing,
    TooShort,
    TooLong,
    ValueError,
    DatetimeError,
}

/// One element of an error location: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// A failure on a single field of a single record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub loc: Vec<PathSegment>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
}

impl FieldError {
    fn new(path: &[PathSegment], msg: impl Into<String>, kind: ErrorKind) -> Self {
        let mut loc = vec![PathSegment::Field("body".to_string())];
        loc.extend_from_slice(path);
        Self {
            loc,
            msg: msg.into(),
            kind,
        }
    }

    /// Dotted form of the location, e.g. `body.ingredients.2`.
    pub fn location(&self) -> String {
        self.loc
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A [`FieldError`] tied to its position in an import batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub index: usize,
    pub recipe_id: String,
    pub recipe_title: String,
    #[serde(flatten)]
    pub error: FieldError,
}

/// Validate a batch of untyped records.
///
/// Returns the recipes that passed, in input order, and every error found
/// across the whole batch, ordered by record index. A record reusing an id
/// seen earlier in the batch is rejected.
pub fn validate_batch(records: &[Value]) -> (Vec<Recipe>, Vec<ValidationError>) {
    let now = Utc::now();
    let mut valid = Vec::new();
    let mut errors = Vec::new();
    let mut seen_ids = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let checked = validate_record_at(record, now).and_then(|recipe| {
            if seen_ids.insert(recipe.id.clone()) {
                Ok(recipe)
            } else {
                Err(vec![FieldError::new(
                    &[field("id")],
                    format!("Duplicate recipe id {:?} in batch", recipe.id),
                    ErrorKind::ValueError,
                )])
            }
        });
        match checked {
            Ok(recipe) => valid.push(recipe),
            Err(field_errors) => {
                let recipe_id = raw_label(record, "id", UNKNOWN_ID);
                let recipe_title = raw_label(record, "title", UNKNOWN_TITLE);
                errors.extend(field_errors.into_iter().map(|error| ValidationError {
                    index,
                    recipe_id: recipe_id.clone(),
                    recipe_title: recipe_title.clone(),
                    error,
                }));
            }
        }
    }

    (valid, errors)
}

/// Validate one import record into a full [`Recipe`].
pub fn validate_record(record: &Value) -> Result<Recipe, Vec<FieldError>> {
    validate_record_at(record, Utc::now())
}

/// Validate a create/update payload. `id` and timestamps are ignored.
pub fn validate_input(record: &Value) -> Result<RecipeInput, Vec<FieldError>> {
    let map = as_object(record)?;
    let normalized = normalize_record(map);
    let mut errors = Vec::new();
    let input = check_fields(&normalized, &mut errors);
    match input {
        Some(input) if errors.is_empty() => Ok(input),
        _ => Err(errors),
    }
}

fn validate_record_at(record: &Value, now: DateTime<Utc>) -> Result<Recipe, Vec<FieldError>> {
    let map = as_object(record)?;
    let normalized = normalize_record(map);

    let mut errors = Vec::new();
    let id = check_id(&normalized, &mut errors);
    let input = check_fields(&normalized, &mut errors);
    let created_at = check_timestamp(&normalized, "created_at", now, &mut errors);
    let updated_at = check_timestamp(&normalized, "updated_at", now, &mut errors);

    match (id, input, created_at, updated_at) {
        (Some(id), Some(input), Some(created_at), Some(updated_at)) if errors.is_empty() => {
            Ok(Recipe {
                id,
                title: input.title,
                description: input.description,
                ingredients: input.ingredients,
                instructions: input.instructions,
                tags: input.tags,
                cuisine: input.cuisine,
                created_at,
                updated_at,
            })
        }
        _ => Err(errors),
    }
}

fn as_object(record: &Value) -> Result<&Map<String, Value>, Vec<FieldError>> {
    record.as_object().ok_or_else(|| {
        vec![FieldError::new(
            &[],
            format!("Each item must be an object, got {}", json_type_name(record)),
            ErrorKind::TypeError,
        )]
    })
}

/// Best-effort label from the raw (unnormalized) record.
fn raw_label(record: &Value, key: &str, fallback: &str) -> String {
    match record.as_object().and_then(|m| m.get(key)) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => fallback.to_string(),
        Some(other) => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============ Field checks ============

fn check_fields(data: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<RecipeInput> {
    let title = required_string(data, "title", MAX_TITLE_LENGTH, errors);
    let description = required_string(data, "description", MAX_DESCRIPTION_LENGTH, errors);
    let ingredients = string_list(
        data,
        "ingredients",
        1,
        MAX_INGREDIENTS,
        MAX_INGREDIENT_LENGTH,
        errors,
    );
    let instructions = string_list(
        data,
        "instructions",
        1,
        MAX_INSTRUCTIONS,
        MAX_INSTRUCTION_LENGTH,
        errors,
    );
    let tags = string_list(data, "tags", 0, MAX_TAGS, MAX_TAG_LENGTH, errors);
    let cuisine = optional_string(data, "cuisine", MAX_CUISINE_LENGTH, errors);

    Some(RecipeInput {
        title: title?,
        description: description?,
        ingredients: ingredients?,
        instructions: instructions?,
        tags: tags?,
        cuisine: cuisine?,
    })
}

fn field(name: &str) -> PathSegment {
    PathSegment::Field(name.to_string())
}

/// Checks a non-empty bounded string value at `path`. Returns it trimmed.
fn bounded_string(
    value: &Value,
    path: &[PathSegment],
    max_len: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let Value::String(raw) = value else {
        errors.push(FieldError::new(
            path,
            "Input should be a valid string",
            ErrorKind::TypeError,
        ));
        return None;
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.push(FieldError::new(
            path,
            "String should have at least 1 character",
            ErrorKind::TooShort,
        ));
        return None;
    }
    if trimmed.chars().count() > max_len {
        errors.push(FieldError::new(
            path,
            format!("String should have at most {} characters", max_len),
            ErrorKind::TooLong,
        ));
        return None;
    }
    Some(trimmed.to_string())
}

fn required_string(
    data: &Map<String, Value>,
    name: &str,
    max_len: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match data.get(name) {
        None => {
            errors.push(FieldError::new(
                &[field(name)],
                "Field required",
                ErrorKind::Missing,
            ));
            None
        }
        Some(value) => bounded_string(value, &[field(name)], max_len, errors),
    }
}

fn optional_string(
    data: &Map<String, Value>,
    name: &str,
    max_len: usize,
    errors: &mut Vec<FieldError>,
) -> Option<Option<String>> {
    match data.get(name) {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) if s.trim().chars().count() <= max_len => {
            Some(Some(s.trim().to_string()))
        }
        Some(Value::String(_)) => {
            errors.push(FieldError::new(
                &[field(name)],
                format!("String should have at most {} characters", max_len),
                ErrorKind::TooLong,
            ));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(
                &[field(name)],
                "Input should be a valid string",
                ErrorKind::TypeError,
            ));
            None
        }
    }
}

fn string_list(
    data: &Map<String, Value>,
    name: &str,
    min_items: usize,
    max_items: usize,
    max_item_len: usize,
    errors: &mut Vec<FieldError>,
) -> Option<Vec<String>> {
    let path = [field(name)];
    let items = match data.get(name) {
        None => {
            errors.push(FieldError::new(&path, "Field required", ErrorKind::Missing));
            return None;
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            errors.push(FieldError::new(
                &path,
                "Input should be a valid list",
                ErrorKind::TypeError,
            ));
            return None;
        }
    };

    if items.len() < min_items {
        errors.push(FieldError::new(
            &path,
            format!(
                "List should have at least {} item{}",
                min_items,
                if min_items == 1 { "" } else { "s" }
            ),
            ErrorKind::TooShort,
        ));
        return None;
    }
    if items.len() > max_items {
        errors.push(FieldError::new(
            &path,
            format!("List should have at most {} items", max_items),
            ErrorKind::TooLong,
        ));
        return None;
    }

    let before = errors.len();
    let values: Vec<Option<String>> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_path = [field(name), PathSegment::Index(i)];
            bounded_string(item, &item_path, max_item_len, errors)
        })
        .collect();

    if errors.len() > before {
        return None;
    }
    values.into_iter().collect()
}

fn check_id(data: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<String> {
    match data.get("id") {
        None | Some(Value::Null) => Some(uuid::Uuid::new_v4().to_string()),
        Some(value) => bounded_string(value, &[field("id")], usize::MAX, errors),
    }
}

fn check_timestamp(
    data: &Map<String, Value>,
    name: &str,
    now: DateTime<Utc>,
    errors: &mut Vec<FieldError>,
) -> Option<DateTime<Utc>> {
    match data.get(name) {
        None | Some(Value::Null) => Some(now),
        Some(Value::String(raw)) => match parse_timestamp(raw) {
            Some(ts) => Some(ts),
            None => {
                errors.push(FieldError::new(
                    &[field(name)],
                    format!("Input should be a valid datetime, got {:?}", raw),
                    ErrorKind::DatetimeError,
                ));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new(
                &[field(name)],
                "Input should be a valid datetime",
                ErrorKind::DatetimeError,
            ));
            None
        }
    }
}

// ============ Import documents ============

/// Why an import document was rejected before per-record validation.
#[derive(Debug, thiserror::Error)]
pub enum ImportFormatError {
    #[error("Invalid JSON at line {line}: {message}")]
    InvalidJson { line: usize, message: String },
    #[error("Root must be a JSON array of recipes")]
    NotArray,
}

/// Parse an import document: a JSON array of recipe-like objects.
pub fn parse_import_document(content: &[u8]) -> Result<Vec<Value>, ImportFormatError> {
    let value: Value =
        serde_json::from_slice(content).map_err(|e| ImportFormatError::InvalidJson {
            line: e.line(),
            message: e.to_string(),
        })?;
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(ImportFormatError::NotArray),
    }
}

/// Result of validating one import file.
#[derive(Debug)]
pub struct FileReport {
    pub valid: Vec<Recipe>,
    pub errors: Vec<ValidationError>,
}

impl FileReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Human-readable lines, one block per failing record.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        let mut iter = self.errors.iter().peekable();
        while let Some(first) = iter.next() {
            let mut block = format!(
                "Recipe at index {} (id={}, title={:?}):\n  - {}: {}",
                first.index,
                first.recipe_id,
                first.recipe_title,
                first.error.location(),
                first.error.msg
            );
            while let Some(next) = iter.next_if(|e| e.index == first.index) {
                block.push_str(&format!("\n  - {}: {}", next.error.location(), next.error.msg));
            }
            messages.push(block);
        }
        messages
    }
}

/// Read, parse and validate an import file.
///
/// Fails when the file cannot be read, is not JSON, or its root is not an
/// array. Per-record problems are reported in the returned [`FileReport`].
pub fn validate_file(path: &Path) -> Result<FileReport> {
    let content = std::fs::read(path)
        .with_context(|| format!("Cannot read file: {}", path.display()))?;
    let records = parse_import_document(&content)?;
    let (valid, errors) = validate_batch(&records);
    Ok(FileReport { valid, errors })
}
