//! Structural path lookups into serialized raw items.

use serde_json::Value;

/// Extract a value from JSON using a dot-notation path.
///
/// Numeric segments index into arrays. A missing field or index anywhere
/// along the path yields `Value::Null`, never an error.
pub fn resolve_path(item: &Value, path: &str) -> Value {
    let mut current = item;

    for part in path.split('.').filter(|p| !p.is_empty()) {
        let next = match current {
            Value::Array(items) => part.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            Value::Object(map) => map.get(part),
            _ => None,
        };
        current = match next {
            Some(v) => v,
            None => return Value::Null,
        };
    }

    current.clone()
}

/// Convert a snake_case column name into the provider's PascalCase field name.
///
/// `vpc_peering_connection_id` becomes `VpcPeeringConnectionId`. Acronyms the
/// provider spells in capitals (`TrailARN`) need an explicit path instead.
pub fn field_name(column: &str) -> String {
    column
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
