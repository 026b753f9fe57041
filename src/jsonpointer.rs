//! RFC 6901 JSON Pointer walking, used for link-field extraction (§4.6) and
//! for deriving link fields from a chain's `link_source` expressions (§4.9).

use serde_json::Value;

/// Decodes the `~1`/`~0` escapes in a single pointer token.
#[must_use]
pub fn decode_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Encodes a raw key into a pointer token, escaping `~` and `/`.
#[must_use]
pub fn encode_token(raw: &str) -> String {
    raw.replace('~', "~0").replace('/', "~1")
}

/// Decodes a link expression into the field it binds: a body JSON pointer
/// (`$response.body#/id` → `/id`) or a header compound key
/// (`$response.header.Location` → `header/location`,
/// `$response.header.Location[0]` → `header/location/0`). Shared by chain
/// discovery (which only needs the field name) and the executor (which
/// resolves it against a real response).
#[must_use]
pub fn decode_link_expression(expr: &str) -> Option<String> {
    if let Some(pointer) = expr.strip_prefix("$response.body#") {
        return Some(pointer.to_string());
    }
    if let Some(rest) = expr.strip_prefix("$response.header.") {
        if let Some(idx_start) = rest.find('[') {
            let name = &rest[..idx_start];
            let idx = rest[idx_start + 1..].trim_end_matches(']');
            return Some(format!("header/{}/{idx}", name.to_lowercase()));
        }
        return Some(format!("header/{}", rest.to_lowercase()));
    }
    None
}

/// Walks `pointer` (an RFC 6901 JSON pointer, without the leading `#`) against
/// `value`, returning the pointed-to value or `None` if any segment is absent
/// or the wrong shape.
///
/// An empty pointer (`""`) resolves to the root value.
#[must_use]
pub fn resolve<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    if pointer.is_empty() {
        return Some(value);
    }
    let pointer = pointer.strip_prefix('/').unwrap_or(pointer);
    if pointer.is_empty() && value.is_object() {
        // "/" alone addresses the property with empty-string key.
        return value.get("");
    }

    let mut current = value;
    for raw_token in pointer.split('/') {
        let token = decode_token(raw_token);
        current = match current {
            Value::Object(map) => map.get(&token)?,
            Value::Array(items) => {
                if token == "-" {
                    return None;
                }
                let index: usize = token.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_object_field() {
        let v = json!({"id": "abc", "nested": {"field": 42}});
        assert_eq!(resolve(&v, "/id"), Some(&json!("abc")));
        assert_eq!(resolve(&v, "/nested/field"), Some(&json!(42)));
    }

    #[test]
    fn resolves_array_index() {
        let v = json!({"items": [1, 2, 3]});
        assert_eq!(resolve(&v, "/items/1"), Some(&json!(2)));
    }

    #[test]
    fn empty_pointer_is_root() {
        let v = json!({"a": 1});
        assert_eq!(resolve(&v, ""), Some(&v));
    }

    #[test]
    fn missing_path_resolves_to_none() {
        let v = json!({"a": 1});
        assert_eq!(resolve(&v, "/missing"), None);
    }

    #[test]
    fn decodes_tilde_and_slash_escapes() {
        let v = json!({"a/b": 1, "c~d": 2});
        assert_eq!(resolve(&v, "/a~1b"), Some(&json!(1)));
        assert_eq!(resolve(&v, "/c~0d"), Some(&json!(2)));
    }

    #[test]
    fn encode_token_round_trips() {
        let raw = "a/b~c";
        let encoded = encode_token(raw);
        assert_eq!(decode_token(&encoded), raw);
    }

    #[test]
    fn decodes_body_pointer_expression() {
        assert_eq!(decode_link_expression("$response.body#/id"), Some("/id".to_string()));
    }

    #[test]
    fn decodes_header_expression_with_index() {
        assert_eq!(
            decode_link_expression("$response.header.Location[0]"),
            Some("header/location/0".to_string())
        );
    }
}
