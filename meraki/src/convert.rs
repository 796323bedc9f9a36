//! Conversion between Dashboard API JSON and Terraform values
//!
//! Responses are projected onto the declared attributes only; anything the
//! API returns beyond that is dropped. Request bodies carry user-settable
//! attributes that have a value.

use crate::endpoint::{ApiAttribute, ApiKind};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use tfplug::Dynamic;

/// Projects an API object onto the attributes; missing fields become null
pub fn api_to_state(attributes: &[ApiAttribute], body: &Value) -> Dynamic {
    let fields = attributes
        .iter()
        .map(|attr| {
            let value = body
                .get(attr.api_name)
                .map(|v| value_to_dynamic(attr.kind, v))
                .unwrap_or(Dynamic::Null);
            (attr.name.to_string(), value)
        })
        .collect();
    Dynamic::Map(fields)
}

fn value_to_dynamic(kind: ApiKind, value: &Value) -> Dynamic {
    match (kind, value) {
        (_, Value::Null) => Dynamic::Null,

        (ApiKind::String, Value::String(s)) => Dynamic::String(s.clone()),
        // identifiers come back as numbers from some endpoints
        (ApiKind::String, Value::Number(n)) => Dynamic::String(n.to_string()),
        (ApiKind::String, Value::Bool(b)) => Dynamic::String(b.to_string()),

        (ApiKind::Number, Value::Number(n)) => {
            n.as_f64().map(Dynamic::Number).unwrap_or(Dynamic::Null)
        }
        (ApiKind::Number, Value::String(s)) => s
            .parse::<f64>()
            .map(Dynamic::Number)
            .unwrap_or(Dynamic::Null),

        (ApiKind::Bool, Value::Bool(b)) => Dynamic::Bool(*b),
        (ApiKind::Bool, Value::String(s)) => match s.as_str() {
            "true" => Dynamic::Bool(true),
            "false" => Dynamic::Bool(false),
            _ => Dynamic::Null,
        },

        (ApiKind::StringList, Value::Array(items)) => Dynamic::List(
            items
                .iter()
                .map(|item| value_to_dynamic(ApiKind::String, item))
                .collect(),
        ),

        (ApiKind::Object(attrs), Value::Object(_)) => api_to_state(attrs, value),

        (ApiKind::ObjectList(attrs) | ApiKind::ObjectSet(attrs), Value::Array(items)) => {
            Dynamic::List(items.iter().map(|item| api_to_state(attrs, item)).collect())
        }

        (ApiKind::ObjectMap(attrs), Value::Object(entries)) => Dynamic::Map(
            entries
                .iter()
                .map(|(key, entry)| (key.clone(), api_to_state(attrs, entry)))
                .collect::<BTreeMap<_, _>>(),
        ),

        (kind, other) => {
            tracing::warn!("Unexpected JSON value {} for {:?} attribute", other, kind);
            Dynamic::Null
        }
    }
}

/// Request body from user-settable attributes that have a value
///
/// `exclude` names top-level attributes that travel in the URL or cannot be
/// sent in this request.
pub fn state_to_body(attributes: &[ApiAttribute], state: &Dynamic, exclude: &[&str]) -> Value {
    let mut body = Map::new();

    for attr in attributes {
        if !attr.mode.is_user_settable() || exclude.contains(&attr.name) {
            continue;
        }
        let Some(value) = state.get(attr.name) else {
            continue;
        };
        if let Some(json) = dynamic_to_value(attr.kind, value) {
            body.insert(attr.api_name.to_string(), json);
        }
    }

    Value::Object(body)
}

fn dynamic_to_value(kind: ApiKind, value: &Dynamic) -> Option<Value> {
    match (kind, value) {
        (_, Dynamic::Null | Dynamic::Unknown) => None,

        (ApiKind::Object(attrs), Dynamic::Map(_)) => Some(state_to_body(attrs, value, &[])),
        (ApiKind::ObjectList(attrs) | ApiKind::ObjectSet(attrs), Dynamic::List(items)) => {
            Some(Value::Array(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| state_to_body(attrs, item, &[]))
                    .collect(),
            ))
        }
        (ApiKind::ObjectMap(attrs), Dynamic::Map(entries)) => Some(Value::Object(
            entries
                .iter()
                .filter(|(_, entry)| !entry.is_null())
                .map(|(key, entry)| (key.clone(), state_to_body(attrs, entry, &[])))
                .collect(),
        )),

        (_, Dynamic::Bool(b)) => Some(Value::Bool(*b)),
        (_, Dynamic::Number(n)) => Some(number_to_value(*n)),
        (_, Dynamic::String(s)) => Some(Value::String(s.clone())),
        (_, Dynamic::List(items)) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| dynamic_to_value(ApiKind::String, item))
                .collect(),
        )),
        (_, Dynamic::Map(entries)) => Some(Value::Object(
            entries
                .iter()
                .filter_map(|(key, entry)| {
                    dynamic_to_value(ApiKind::String, entry).map(|v| (key.clone(), v))
                })
                .collect(),
        )),
    }
}

/// Integral numbers go out as JSON integers; the API rejects `3.0` for ids
fn number_to_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tfplug::FieldMode;

    const SERVER: &[ApiAttribute] = &[
        ApiAttribute::string("id", "id", FieldMode::Computed),
        ApiAttribute::string("host", "host", FieldMode::Required),
        ApiAttribute::number("port", "port", FieldMode::OptionalComputed),
        ApiAttribute::string("secret", "secret", FieldMode::Optional).sensitive(),
    ];

    const FIXED_IP: &[ApiAttribute] = &[
        ApiAttribute::string("ip", "ip", FieldMode::Required),
        ApiAttribute::string("name", "name", FieldMode::Optional),
    ];

    const ATTRS: &[ApiAttribute] = &[
        ApiAttribute::string("network_id", "networkId", FieldMode::Required),
        ApiAttribute::number("number", "number", FieldMode::Required),
        ApiAttribute::string("name", "name", FieldMode::Required),
        ApiAttribute::bool("enabled", "enabled", FieldMode::OptionalComputed),
        ApiAttribute::string("psk", "psk", FieldMode::Optional).sensitive(),
        ApiAttribute::string_list("tags", "availabilityTags", FieldMode::OptionalComputed),
        ApiAttribute::string("url", "url", FieldMode::Computed),
        ApiAttribute::object_list("radius_servers", "radiusServers", FieldMode::Optional, SERVER),
        ApiAttribute::object_map(
            "fixed_ip_assignments",
            "fixedIpAssignments",
            FieldMode::Optional,
            FIXED_IP,
        ),
    ];

    fn field<'a>(state: &'a Dynamic, name: &str) -> &'a Dynamic {
        state.get(name).unwrap()
    }

    #[test]
    fn response_is_projected_onto_attributes() {
        let body = json!({
            "number": 3,
            "name": "Guest",
            "enabled": true,
            "availabilityTags": ["lobby", "cafe"],
            "splashPage": "None",
            "radiusServers": [{"id": "1", "host": "10.0.0.1", "port": 1812}],
            "fixedIpAssignments": {
                "22:33:44:55:66:77": {"ip": "192.168.1.5", "name": "printer"}
            }
        });

        let state = api_to_state(ATTRS, &body);
        let fields = state.as_map().unwrap();

        assert_eq!(fields.len(), ATTRS.len());
        assert!(fields.get("splashPage").is_none());
        assert_eq!(field(&state, "network_id"), &Dynamic::Null);
        assert_eq!(field(&state, "number"), &Dynamic::Number(3.0));
        assert_eq!(field(&state, "enabled"), &Dynamic::Bool(true));
        assert_eq!(
            field(&state, "tags"),
            &Dynamic::List(vec![Dynamic::from("lobby"), Dynamic::from("cafe")])
        );

        let server = &field(&state, "radius_servers").as_list().unwrap()[0];
        assert_eq!(server.get("port"), Some(&Dynamic::Number(1812.0)));
        assert_eq!(server.get("secret"), Some(&Dynamic::Null));

        let assignment = field(&state, "fixed_ip_assignments")
            .get("22:33:44:55:66:77")
            .unwrap();
        assert_eq!(assignment.get("ip"), Some(&Dynamic::from("192.168.1.5")));
    }

    #[test]
    fn scalar_values_are_coerced() {
        let state = api_to_state(
            ATTRS,
            &json!({"network_id": "ignored", "networkId": 1234, "number": "4", "enabled": "false"}),
        );
        assert_eq!(field(&state, "network_id"), &Dynamic::from("1234"));
        assert_eq!(field(&state, "number"), &Dynamic::Number(4.0));
        assert_eq!(field(&state, "enabled"), &Dynamic::Bool(false));

        let state = api_to_state(ATTRS, &json!({"name": {"unexpected": true}, "number": "four"}));
        assert_eq!(field(&state, "name"), &Dynamic::Null);
        assert_eq!(field(&state, "number"), &Dynamic::Null);
    }

    #[test]
    fn body_carries_user_settable_values() {
        let mut state = api_to_state(
            ATTRS,
            &json!({
                "networkId": "N_1",
                "number": 3,
                "name": "Guest",
                "url": "https://dashboard/ssid",
                "radiusServers": [{"id": "7", "host": "10.0.0.1", "port": 1812}]
            }),
        );
        if let Dynamic::Map(fields) = &mut state {
            fields.insert("psk".to_string(), Dynamic::from("s3cret"));
            fields.insert("enabled".to_string(), Dynamic::Unknown);
        }

        let body = state_to_body(ATTRS, &state, &["network_id"]);

        assert_eq!(
            body,
            json!({
                "number": 3,
                "name": "Guest",
                "psk": "s3cret",
                "radiusServers": [{"host": "10.0.0.1", "port": 1812}]
            })
        );
    }

    #[test]
    fn fractional_numbers_stay_floats() {
        assert_eq!(number_to_value(5.0), json!(5));
        assert_eq!(number_to_value(-2.0), json!(-2));
        assert_eq!(number_to_value(0.25), json!(0.25));
        assert_eq!(number_to_value(f64::NAN), Value::Null);
    }
}
