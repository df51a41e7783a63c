//! Resource documents: whole backend configuration objects.
//!
//! A [`ResourceDocument`] wraps the full document as fetched from a backend
//! together with an optional *field root* naming the sub-object the rules
//! target (e.g. the options block inside a virtual-folder config). Documents
//! are always round-tripped whole: read the full body, mutate targeted
//! fields through the root, write the full body back. Partial writes are a
//! correctness hazard on at least one backend, where posting a sub-object
//! creates a duplicate resource instead of updating the existing one.

use serde_json::Value;

/// One backend configuration object as a whole read-and-rewritten unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDocument {
    body: Value,
    field_root: Option<String>,
}

impl ResourceDocument {
    /// Wrap a document whose rule fields live at the top level.
    pub fn new(body: Value) -> Self {
        ResourceDocument {
            body,
            field_root: None,
        }
    }

    /// Wrap a document whose rule fields live under the named sub-object.
    pub fn with_root(body: Value, root: impl Into<String>) -> Self {
        ResourceDocument {
            body,
            field_root: Some(root.into()),
        }
    }

    /// Build a flat document from field/value pairs (used for backends that
    /// expose a flat preference listing rather than a JSON body).
    pub fn from_fields(fields: impl IntoIterator<Item = (String, Value)>) -> Self {
        let map: serde_json::Map<String, Value> = fields.into_iter().collect();
        ResourceDocument::new(Value::Object(map))
    }

    /// The full document body, as it would be written back.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Consume the document, yielding the full body.
    pub fn into_body(self) -> Value {
        self.body
    }

    pub fn field_root(&self) -> Option<&str> {
        self.field_root.as_deref()
    }

    /// True when a field root was requested but the body has no such
    /// sub-object. Adapters check this before handing the document to the
    /// engine, so a malformed backend response is rejected early.
    pub fn root_missing(&self) -> bool {
        match &self.field_root {
            None => false,
            Some(root) => !matches!(
                self.body.get(root.as_str()),
                Some(Value::Object(_))
            ),
        }
    }

    fn fields(&self) -> Option<&serde_json::Map<String, Value>> {
        let target = match &self.field_root {
            None => &self.body,
            Some(root) => self.body.get(root.as_str())?,
        };
        target.as_object()
    }

    /// Current value of a rule field, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields().and_then(|m| m.get(field))
    }

    /// Set a rule field in place, creating the field root if absent.
    pub fn set(&mut self, field: &str, value: Value) {
        let target = match &self.field_root {
            None => &mut self.body,
            Some(root) => {
                if let Value::Object(outer) = &mut self.body {
                    outer
                        .entry(root.clone())
                        .or_insert_with(|| Value::Object(serde_json::Map::new()))
                } else {
                    return;
                }
            }
        };
        if let Value::Object(map) = target {
            map.insert(field.to_string(), value);
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_get_and_set() {
        let mut doc = ResourceDocument::new(json!({"EnableUPnP": true, "Name": "srv"}));
        assert_eq!(doc.get("EnableUPnP"), Some(&json!(true)));

        doc.set("EnableUPnP", json!(false));
        assert_eq!(doc.get("EnableUPnP"), Some(&json!(false)));
        // untouched siblings survive the round trip
        assert_eq!(doc.body()["Name"], json!("srv"));
    }

    #[test]
    fn rooted_fields_resolve_through_sub_object() {
        let body = json!({
            "Name": "Movies",
            "ItemId": "42",
            "LibraryOptions": {"EnableMarkerDetection": true}
        });
        let mut doc = ResourceDocument::with_root(body, "LibraryOptions");

        assert_eq!(doc.get("EnableMarkerDetection"), Some(&json!(true)));
        assert_eq!(doc.get("ItemId"), None);

        doc.set("EnableMarkerDetection", json!(false));
        assert_eq!(
            doc.body()["LibraryOptions"]["EnableMarkerDetection"],
            json!(false)
        );
        // the parent document is preserved whole
        assert_eq!(doc.body()["ItemId"], json!("42"));
    }

    #[test]
    fn root_missing_detected() {
        let doc = ResourceDocument::with_root(json!({"Name": "Movies"}), "LibraryOptions");
        assert!(doc.root_missing());

        let doc = ResourceDocument::with_root(
            json!({"LibraryOptions": {}}),
            "LibraryOptions",
        );
        assert!(!doc.root_missing());
    }

    #[test]
    fn from_fields_builds_flat_document() {
        let doc = ResourceDocument::from_fields(vec![
            ("TranscoderQuality".to_string(), json!("2")),
            ("ScannerLowPriority".to_string(), json!("0")),
        ]);
        assert_eq!(doc.get("TranscoderQuality"), Some(&json!("2")));
        assert!(!doc.root_missing());
    }
}
