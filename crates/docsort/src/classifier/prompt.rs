//! Prompt construction and response parsing for chat-completion models.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{Analysis, CategorySet};
use crate::error::ClassificationError;

/// Entity keys requested from every document in addition to those used by templates.
pub const BASE_ENTITY_KEYS: &[&str] = &["organization", "document_date"];

/// Builds the system message.
pub fn system_prompt(categories: &CategorySet, entity_keys: &[String], language: &str) -> String {
    let mut keys: Vec<String> = BASE_ENTITY_KEYS.iter().map(|k| k.to_string()).collect();
    for key in entity_keys {
        if !keys.iter().any(|k| k.eq_ignore_ascii_case(key)) {
            keys.push(key.clone());
        }
    }

    let entity_lines: String = keys
        .iter()
        .map(|k| format!("    \"{}\": \"...\"", k))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "You classify documents for a personal archive.\n\
         \n\
         1. Choose exactly one category from this list: {categories}\n\
         2. Extract the entities listed below. For well-known organizations use the short \
         official name (e.g. Bayerische Motoren Werke AG = BMW). Dates use the format YYYY-MM-DD. \
         Leave out entities that do not occur in the document.\n\
         3. Summarize the content in one to three words, without organization, date or category. \
         Name a single item specifically, group many items under a common term.\n\
         \n\
         Write the summary and entity values in the language '{language}'.\n\
         Respond with a single JSON object and nothing else:\n\
         {{\n\
         \x20 \"category\": \"...\",\n\
         \x20 \"entities\": {{\n\
         {entity_lines}\n\
         \x20 }},\n\
         \x20 \"summary\": \"...\"\n\
         }}",
        categories = categories.names().join(", "),
        language = language,
        entity_lines = entity_lines,
    )
}

pub fn user_prompt(text: &str) -> String {
    format!("Document text:\n\n{}", text)
}

/// Parses the model's message content into an [`Analysis`].
///
/// Accepts `classification` for `category` and `content_summary` for `summary`.
/// Without an `entities` object, the remaining top-level scalar fields are taken as entities.
pub fn parse_response(content: &str) -> Result<Analysis, ClassificationError> {
    let json = extract_json_object(content).ok_or_else(|| {
        ClassificationError::InvalidResponse(format!(
            "no JSON object in model output: {}",
            crate::sanitize::preview(content, 200)
        ))
    })?;

    let value: Value = serde_json::from_str(json)
        .map_err(|e| ClassificationError::InvalidResponse(format!("malformed JSON: {}", e)))?;

    let Value::Object(mut object) = value else {
        return Err(ClassificationError::InvalidResponse(
            "model output is not a JSON object".to_string(),
        ));
    };

    let category = take_string(&mut object, &["category", "classification"])
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| {
            ClassificationError::InvalidResponse("response has no category".to_string())
        })?;

    let summary = take_string(&mut object, &["summary", "content_summary"]).unwrap_or_default();

    let entities = match object.remove("entities") {
        Some(Value::Object(map)) => flatten_entities(map),
        Some(Value::Null) | None => flatten_entities(object),
        Some(other) => {
            return Err(ClassificationError::InvalidResponse(format!(
                "entities must be an object, got {}",
                other
            )))
        }
    };

    Ok(Analysis {
        category: category.trim().to_string(),
        entities,
        summary: summary.trim().to_string(),
    })
}

/// Strips code fences and surrounding prose.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (start < end).then(|| &content[start..=end])
}

fn take_string(object: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match object.remove(*key) {
            Some(Value::String(s)) => return Some(s),
            Some(Value::Null) | None => continue,
            Some(other) => return Some(other.to_string()),
        }
    }
    None
}

fn flatten_entities(map: Map<String, Value>) -> BTreeMap<String, String> {
    map.into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Null => return None,
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            (!value.is_empty()).then_some((key, value))
        })
        .collect()
}
