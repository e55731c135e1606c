use serde_json::{Map, Value};

use super::api_docs::RESERVED_KEYS;

/// Merge a partial document over an existing one.
///
/// Top-level keys replace wholesale, except:
/// - `parameters` and `requestBody` merge one level deep;
/// - `responses` merges per status code, and a `null` code removes that response;
/// - `parameters.headers`, `requestBody.example` and `responses.<code>.example` accept JSON text,
///   which is stored parsed.
///
/// Store-owned keys (`id`, timestamps, location) are ignored.
pub fn merge_patch(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }

        match key.as_str() {
            "parameters" => merge_section(target, key, value, &["headers"]),
            "requestBody" => merge_section(target, key, value, &["example"]),
            "responses" => merge_responses(target, value),
            _ => {
                target.insert(key, value);
            }
        }
    }
}

/// Strip store-owned keys from caller input.
pub fn strip_reserved(fields: &mut Map<String, Value>) {
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
}

fn merge_section(target: &mut Map<String, Value>, key: String, value: Value, json_text_keys: &[&str]) {
    let Value::Object(mut incoming) = value else {
        target.insert(key, value);
        return;
    };
    for text_key in json_text_keys {
        if let Some(field) = incoming.get_mut(*text_key) {
            parse_json_text(field);
        }
    }

    match target.get_mut(&key) {
        Some(Value::Object(existing)) => existing.extend(incoming),
        _ => {
            target.insert(key, Value::Object(incoming));
        }
    }
}

fn merge_responses(target: &mut Map<String, Value>, value: Value) {
    let Value::Object(incoming) = value else {
        target.insert("responses".to_string(), value);
        return;
    };

    let responses = target
        .entry("responses")
        .or_insert_with(|| Value::Object(Map::new()));
    if !responses.is_object() {
        *responses = Value::Object(Map::new());
    }
    let Some(responses) = responses.as_object_mut() else {
        return;
    };

    for (code, response) in incoming {
        match response {
            Value::Null => {
                responses.remove(&code);
            }
            Value::Object(mut fields) => {
                if let Some(example) = fields.get_mut("example") {
                    parse_json_text(example);
                }
                match responses.get_mut(&code) {
                    Some(Value::Object(existing)) => existing.extend(fields),
                    _ => {
                        responses.insert(code, Value::Object(fields));
                    }
                }
            }
            other => {
                responses.insert(code, other);
            }
        }
    }
}

fn parse_json_text(field: &mut Value) {
    if let Value::String(text) = field {
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            *field = parsed;
        }
    }
}
