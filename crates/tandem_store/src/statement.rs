//! Statement rendering for query-language-backed graph stores.
//!
//! Graph stores that speak a declarative query language receive batched
//! `MERGE`/`DETACH DELETE` statement text. Rendering is pure: an
//! implementation of [`crate::GraphStore`] builds statements here and ships
//! them over whatever driver it owns.

use crate::graph::{GraphEdgeUpsert, GraphNodeUpsert};
use serde_json::Value;
use tandem_core::{EntityId, Record};

/// Escapes a string for use inside a single-quoted query literal.
///
/// The order is fixed: backslash first, then quote, newline, carriage
/// return, tab. Escaping the backslash first is what keeps the later steps
/// from double-escaping characters an earlier step introduced.
#[must_use]
pub fn escape_text(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Renders a record as a `{key: value, ...}` property map literal.
///
/// Strings are escaped and single-quoted; numbers, booleans, and null are
/// rendered bare; nested arrays and objects are stored as escaped JSON
/// text (the graph store indexes scalar properties only).
#[must_use]
pub fn property_map(record: &Record) -> String {
    let fields: Vec<String> = record
        .iter()
        .map(|(key, value)| format!("`{}`: {}", key, property_value(value)))
        .collect();
    format!("{{{}}}", fields.join(", "))
}

fn property_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", escape_text(s)),
        Value::Array(_) | Value::Object(_) => {
            format!("'{}'", escape_text(&value.to_string()))
        }
    }
}

/// Renders an idempotent upsert statement for one node.
#[must_use]
pub fn node_upsert(upsert: &GraphNodeUpsert) -> String {
    format!(
        "MERGE (n:Entity {{id: '{}'}}) SET n += {}",
        escape_text(upsert.id.as_str()),
        property_map(&upsert.properties)
    )
}

/// Renders an idempotent upsert statement for one edge.
#[must_use]
pub fn edge_upsert(upsert: &GraphEdgeUpsert) -> String {
    format!(
        "MATCH (a:Entity {{id: '{}'}}), (b:Entity {{id: '{}'}}) \
         MERGE (a)-[r:RELATES {{id: '{}'}}]->(b) SET r += {}",
        escape_text(upsert.source.as_str()),
        escape_text(upsert.target.as_str()),
        escape_text(upsert.id.as_str()),
        property_map(&upsert.properties)
    )
}

/// Renders a removal statement for one node.
#[must_use]
pub fn node_remove(id: &EntityId) -> String {
    format!(
        "MATCH (n:Entity {{id: '{}'}}) DETACH DELETE n",
        escape_text(id.as_str())
    )
}

/// Renders a removal statement for one edge.
#[must_use]
pub fn edge_remove(id: &EntityId) -> String {
    format!(
        "MATCH ()-[r:RELATES {{id: '{}'}}]->() DELETE r",
        escape_text(id.as_str())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn escapes_in_fixed_order() {
        assert_eq!(escape_text("a\\b"), "a\\\\b");
        assert_eq!(escape_text("it's"), "it\\'s");
        assert_eq!(escape_text("line1\nline2"), "line1\\nline2");
        assert_eq!(escape_text("a\rb"), "a\\rb");
        assert_eq!(escape_text("a\tb"), "a\\tb");
    }

    #[test]
    fn backslash_before_quote_avoids_double_escape() {
        // A payload already containing an escaped quote: the backslash is
        // escaped once, the quote once, and neither touches the other's
        // output.
        assert_eq!(escape_text("\\'"), "\\\\\\'");
    }

    #[test]
    fn node_upsert_statement() {
        let upsert = GraphNodeUpsert {
            id: "n1".into(),
            properties: record(json!({"title": "it's here", "rank": 3})),
        };
        let stmt = node_upsert(&upsert);
        assert!(stmt.starts_with("MERGE (n:Entity {id: 'n1'})"));
        assert!(stmt.contains("`title`: 'it\\'s here'"));
        assert!(stmt.contains("`rank`: 3"));
    }

    #[test]
    fn edge_upsert_names_both_endpoints() {
        let upsert = GraphEdgeUpsert {
            id: "e1".into(),
            source: "a".into(),
            target: "b".into(),
            properties: record(json!({"kind": "link"})),
        };
        let stmt = edge_upsert(&upsert);
        assert!(stmt.contains("{id: 'a'}"));
        assert!(stmt.contains("{id: 'b'}"));
        assert!(stmt.contains("MERGE (a)-[r:RELATES {id: 'e1'}]->(b)"));
    }

    #[test]
    fn nested_values_become_json_text() {
        // JSON double quotes pass through untouched; only the statement's
        // own quote character needs escaping.
        let map = property_map(&record(json!({"tags": ["a", "b"]})));
        assert!(map.contains(r#"`tags`: '["a","b"]'"#));
    }

    #[test]
    fn null_and_bool_render_bare() {
        let map = property_map(&record(json!({"done": true, "gone": null})));
        assert!(map.contains("`done`: true"));
        assert!(map.contains("`gone`: null"));
    }

    #[test]
    fn remove_statements() {
        assert_eq!(
            node_remove(&"n1".into()),
            "MATCH (n:Entity {id: 'n1'}) DETACH DELETE n"
        );
        assert_eq!(
            edge_remove(&"e1".into()),
            "MATCH ()-[r:RELATES {id: 'e1'}]->() DELETE r"
        );
    }

    proptest! {
        #[test]
        fn escaped_text_has_no_unescaped_specials(raw in ".{0,64}") {
            let escaped = escape_text(&raw);
            // No raw control characters survive.
            prop_assert!(!escaped.contains('\n'));
            prop_assert!(!escaped.contains('\r'));
            prop_assert!(!escaped.contains('\t'));
            // Every quote is preceded by a backslash.
            let bytes = escaped.as_bytes();
            for (i, b) in bytes.iter().enumerate() {
                if *b == b'\'' {
                    prop_assert!(i > 0 && bytes[i - 1] == b'\\');
                }
            }
        }

        #[test]
        fn escaping_round_trips_through_unescape(raw in ".{0,64}") {
            let escaped = escape_text(&raw);
            let mut unescaped = String::new();
            let mut chars = escaped.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    match chars.next() {
                        Some('\\') => unescaped.push('\\'),
                        Some('\'') => unescaped.push('\''),
                        Some('n') => unescaped.push('\n'),
                        Some('r') => unescaped.push('\r'),
                        Some('t') => unescaped.push('\t'),
                        other => prop_assert!(false, "dangling escape: {other:?}"),
                    }
                } else {
                    unescaped.push(c);
                }
            }
            prop_assert_eq!(unescaped, raw);
        }
    }
}
