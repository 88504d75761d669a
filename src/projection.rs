//! Projection of property values into template-addressable data.
//!
//! Mappings become JSON objects (field access by name in templates),
//! sequences become ordered arrays, and scalars pass through unchanged.
//! The projection is applied depth-first.

use crate::event::{Properties, PropertyValue, Scalar};
use serde_json::{Map, Number, Value};

/// Project a single property value.
pub fn project(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Scalar(scalar) => project_scalar(scalar),
        PropertyValue::Mapping(map) => Value::Object(project_properties(map)),
        PropertyValue::Sequence(items) => Value::Array(items.iter().map(project).collect()),
    }
}

/// Project a whole property bag into an object map, keys preserved.
pub fn project_properties(properties: &Properties) -> Map<String, Value> {
    properties
        .iter()
        .map(|(name, value)| (name.clone(), project(value)))
        .collect()
}

fn project_scalar(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Integer(i) => Value::Number((*i).into()),
        Scalar::Unsigned(u) => Value::Number((*u).into()),
        // JSON has no NaN/infinity
        Scalar::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Scalar::Text(s) => Value::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_pass_through() {
        assert_eq!(project(&PropertyValue::from("text")), json!("text"));
        assert_eq!(project(&PropertyValue::from(7i64)), json!(7));
        assert_eq!(project(&PropertyValue::from(true)), json!(true));
        assert_eq!(project(&PropertyValue::Scalar(Scalar::Null)), Value::Null);
        assert_eq!(
            project(&PropertyValue::Scalar(Scalar::Unsigned(u64::MAX))),
            json!(u64::MAX)
        );
    }

    #[test]
    fn non_finite_float_projects_to_null() {
        assert_eq!(project(&PropertyValue::from(f64::NAN)), Value::Null);
        assert_eq!(project(&PropertyValue::from(f64::INFINITY)), Value::Null);
    }

    #[test]
    fn nested_mapping_becomes_addressable_object() {
        let mut server = Properties::new();
        server.insert("hostname".to_string(), "prod-01".into());
        let ports = vec![80i64.into(), 443i64.into()];
        server.insert("ports".to_string(), PropertyValue::Sequence(ports));

        let mut root = Properties::new();
        root.insert("Server".to_string(), PropertyValue::Mapping(server));

        let projected = project_properties(&root);
        assert_eq!(
            Value::Object(projected),
            json!({"Server": {"hostname": "prod-01", "ports": [80, 443]}})
        );
    }

    #[test]
    fn sequence_order_is_preserved() {
        let seq = PropertyValue::Sequence(vec!["c".into(), "a".into(), "b".into()]);
        assert_eq!(project(&seq), json!(["c", "a", "b"]));
    }

    #[test]
    fn empty_containers_are_kept() {
        let empty = PropertyValue::Mapping(Properties::new());
        assert_eq!(project(&empty), json!({}));
        assert_eq!(project(&PropertyValue::Sequence(vec![])), json!([]));

        let mut root = Properties::new();
        root.insert("Empty".to_string(), empty);
        let projected = project_properties(&root);
        assert_eq!(Value::Object(projected), json!({"Empty": {}}));
    }

    #[test]
    fn sequence_of_mappings_is_projected_recursively() {
        let value = PropertyValue::from(json!([{"id": 1, "tags": []}, {"id": 2}]));
        assert_eq!(project(&value), json!([{"id": 1, "tags": []}, {"id": 2}]));
    }
}
