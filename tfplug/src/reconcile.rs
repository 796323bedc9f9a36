//! State reconciliation
//!
//! Combines prior Terraform state with a freshly decoded API response into the
//! state to persist. Two policies exist:
//!
//! - [`merge_for_write`] runs after create/update. Non-null API values win;
//!   user-settable fields the API did not echo keep their prior value.
//! - [`merge_for_read`] runs after a refresh. Computed fields always follow the
//!   API, even to null; user-settable fields only change when the API returns
//!   a value (write-only secrets such as PSKs are never erased).
//!
//! Both recurse into nested objects, maps and list elements. Lists whose
//! lengths differ are replaced wholesale by the new list. Equal-length lists
//! are matched by an element key when the shape declares one and every
//! element carries it, and positionally otherwise.
//!
//! Merging is a pure function of its inputs and may run concurrently.

use crate::schema::{Attribute, AttributeType, ObjectNestingMode, Schema};
use crate::types::Dynamic;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Who is authoritative for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    /// Must be set by the user
    Required,
    /// May be set by the user; the API is not authoritative
    Optional,
    /// May be set by the user, otherwise filled by the API
    OptionalComputed,
    /// Only ever set by the API
    Computed,
}

impl FieldMode {
    pub fn is_user_settable(self) -> bool {
        !matches!(self, FieldMode::Computed)
    }
}

/// How a nested shape applies to a field's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    /// The value is one object
    Single,
    /// The value is a list or set of objects
    List,
    /// The value is a map of objects
    Map,
}

/// Merge metadata for one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub mode: FieldMode,
    pub nesting: Nesting,
    pub nested: Option<Shape>,
    pub element_key: Option<String>,
}

impl FieldShape {
    pub fn scalar(mode: FieldMode) -> Self {
        Self {
            mode,
            nesting: Nesting::Single,
            nested: None,
            element_key: None,
        }
    }
}

/// Field descriptors for one object, derived from its schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    fields: BTreeMap<String, FieldShape>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, mode: FieldMode) -> Self {
        self.fields
            .insert(name.to_string(), FieldShape::scalar(mode));
        self
    }

    pub fn object(mut self, name: &str, mode: FieldMode, nested: Shape) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldShape {
                mode,
                nesting: Nesting::Single,
                nested: Some(nested),
                element_key: None,
            },
        );
        self
    }

    pub fn list(mut self, name: &str, mode: FieldMode, element: Shape) -> Self {
        let element_key = default_element_key(&element);
        self.fields.insert(
            name.to_string(),
            FieldShape {
                mode,
                nesting: Nesting::List,
                nested: Some(element),
                element_key,
            },
        );
        self
    }

    pub fn keyed_list(mut self, name: &str, mode: FieldMode, key: &str, element: Shape) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldShape {
                mode,
                nesting: Nesting::List,
                nested: Some(element),
                element_key: Some(key.to_string()),
            },
        );
        self
    }

    pub fn map(mut self, name: &str, mode: FieldMode, element: Shape) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldShape {
                mode,
                nesting: Nesting::Map,
                nested: Some(element),
                element_key: None,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldShape> {
        self.fields.get(name)
    }

    pub fn from_schema(schema: &Schema) -> Self {
        Self::from_attributes(&schema.attributes)
    }

    pub fn from_attributes(attributes: &[Attribute]) -> Self {
        let fields = attributes
            .iter()
            .map(|attr| (attr.name.clone(), field_shape_for(attr)))
            .collect();
        Self { fields }
    }
}

fn field_shape_for(attr: &Attribute) -> FieldShape {
    let mode = attr.field_mode();
    let (nesting, nested) = match &attr.nested_type {
        Some(nested) => {
            let nesting = match nested.nesting {
                ObjectNestingMode::Single => Nesting::Single,
                ObjectNestingMode::List | ObjectNestingMode::Set => Nesting::List,
                ObjectNestingMode::Map => Nesting::Map,
            };
            (nesting, Some(Shape::from_attributes(&nested.attributes)))
        }
        None => shape_for_type(&attr.r#type, mode),
    };

    let element_key = match (&attr.element_key, nesting, &nested) {
        (Some(key), _, _) => Some(key.clone()),
        (None, Nesting::List, Some(element)) => default_element_key(element),
        _ => None,
    };

    FieldShape {
        mode,
        nesting,
        nested,
        element_key,
    }
}

/// Object types without nested attributes inherit the enclosing mode
fn shape_for_type(type_: &AttributeType, mode: FieldMode) -> (Nesting, Option<Shape>) {
    match type_ {
        AttributeType::Object(fields) => (Nesting::Single, Some(object_type_shape(fields, mode))),
        AttributeType::List(inner) | AttributeType::Set(inner) => match inner.as_ref() {
            AttributeType::Object(fields) => (Nesting::List, Some(object_type_shape(fields, mode))),
            _ => (Nesting::List, None),
        },
        AttributeType::Map(inner) => match inner.as_ref() {
            AttributeType::Object(fields) => (Nesting::Map, Some(object_type_shape(fields, mode))),
            _ => (Nesting::Map, None),
        },
        _ => (Nesting::Single, None),
    }
}

fn object_type_shape(fields: &HashMap<String, AttributeType>, mode: FieldMode) -> Shape {
    let fields = fields
        .iter()
        .map(|(name, type_)| {
            let (nesting, nested) = shape_for_type(type_, mode);
            (
                name.clone(),
                FieldShape {
                    mode,
                    nesting,
                    nested,
                    element_key: None,
                },
            )
        })
        .collect();
    Shape { fields }
}

fn default_element_key(element: &Shape) -> Option<String> {
    element.get("id").map(|_| "id".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    Write,
    Read,
}

/// Merge after a create or update call
pub fn merge_for_write(old: &Dynamic, new: &Dynamic, shape: &Shape) -> Dynamic {
    merge_record(old, new, Some(shape), FieldMode::OptionalComputed, Policy::Write)
}

/// Merge after a refresh read
pub fn merge_for_read(old: &Dynamic, new: &Dynamic, shape: &Shape) -> Dynamic {
    merge_record(old, new, Some(shape), FieldMode::OptionalComputed, Policy::Read)
}

/// Field-level view used while recursing; unshaped children inherit `mode`
#[derive(Clone, Copy)]
struct Field<'a> {
    mode: FieldMode,
    nesting: Nesting,
    nested: Option<&'a Shape>,
    element_key: Option<&'a str>,
}

impl<'a> Field<'a> {
    fn from_shape(shape: &'a FieldShape) -> Self {
        Self {
            mode: shape.mode,
            nesting: shape.nesting,
            nested: shape.nested.as_ref(),
            element_key: shape.element_key.as_deref(),
        }
    }

    fn inherited(mode: FieldMode) -> Self {
        Self {
            mode,
            nesting: Nesting::Single,
            nested: None,
            element_key: None,
        }
    }

    /// The view applied to each element of a list or map
    fn element(self) -> Self {
        Self {
            nesting: Nesting::Single,
            element_key: None,
            ..self
        }
    }
}

fn merge_record(
    old: &Dynamic,
    new: &Dynamic,
    shape: Option<&Shape>,
    inherited: FieldMode,
    policy: Policy,
) -> Dynamic {
    let empty = BTreeMap::new();
    let old_fields = old.as_map().unwrap_or(&empty);
    let new_fields = new.as_map().unwrap_or(&empty);

    let names: BTreeSet<&String> = old_fields.keys().chain(new_fields.keys()).collect();

    let merged = names
        .into_iter()
        .map(|name| {
            let field = shape
                .and_then(|s| s.get(name))
                .map(Field::from_shape)
                .unwrap_or_else(|| Field::inherited(inherited));
            let old_value = old_fields.get(name).unwrap_or(&Dynamic::Null);
            let new_value = new_fields.get(name).unwrap_or(&Dynamic::Null);
            (name.clone(), merge_field(old_value, new_value, field, policy))
        })
        .collect();

    Dynamic::Map(merged)
}

fn merge_field(old: &Dynamic, new: &Dynamic, field: Field<'_>, policy: Policy) -> Dynamic {
    if policy == Policy::Read && field.mode == FieldMode::Computed {
        return new.clone();
    }

    // an unknown from a plan is never a value worth keeping
    let old_present = !old.is_null() && !old.is_unknown();

    if new.is_null() {
        return if field.mode.is_user_settable() && old_present {
            old.clone()
        } else {
            Dynamic::Null
        };
    }

    if !old_present {
        return new.clone();
    }

    match (old, new) {
        (Dynamic::Map(_), Dynamic::Map(new_entries)) => match field.nesting {
            Nesting::Map => merge_map(old, new_entries, field, policy),
            Nesting::Single | Nesting::List => {
                merge_record(old, new, field.nested, field.mode, policy)
            }
        },
        (Dynamic::List(old_items), Dynamic::List(new_items)) => {
            merge_list(old_items, new_items, field, policy)
        }
        (old, new) => {
            debug_assert!(
                new.is_unknown() || std::mem::discriminant(old) == std::mem::discriminant(new),
                "reconcile: {} in prior state but {} in new state",
                old.kind_name(),
                new.kind_name()
            );
            new.clone()
        }
    }
}

fn merge_map(
    old: &Dynamic,
    new_entries: &BTreeMap<String, Dynamic>,
    field: Field<'_>,
    policy: Policy,
) -> Dynamic {
    let empty = BTreeMap::new();
    let old_entries = old.as_map().unwrap_or(&empty);

    // map keys are data: a different key set means entries were added or
    // removed remotely, and the new map stands as is
    if !old_entries.keys().eq(new_entries.keys()) {
        return Dynamic::Map(new_entries.clone());
    }

    let element = field.element();
    let merged = new_entries
        .iter()
        .map(|(key, new_value)| {
            let old_value = old_entries.get(key).unwrap_or(&Dynamic::Null);
            (key.clone(), merge_field(old_value, new_value, element, policy))
        })
        .collect();
    Dynamic::Map(merged)
}

fn merge_list(
    old_items: &[Dynamic],
    new_items: &[Dynamic],
    field: Field<'_>,
    policy: Policy,
) -> Dynamic {
    if old_items.len() != new_items.len() {
        return Dynamic::List(new_items.to_vec());
    }

    let element = field.element();
    let pairs: Vec<Option<&Dynamic>> = match field
        .element_key
        .and_then(|key| match_by_key(old_items, new_items, key))
    {
        Some(pairs) => pairs,
        None => old_items.iter().map(Some).collect(),
    };

    Dynamic::List(
        new_items
            .iter()
            .zip(pairs)
            .map(|(new_item, old_item)| {
                merge_field(old_item.unwrap_or(&Dynamic::Null), new_item, element, policy)
            })
            .collect(),
    )
}

/// Pairs each new element with the old element sharing its key.
/// None when keys are missing or ambiguous on either side.
fn match_by_key<'a>(
    old_items: &'a [Dynamic],
    new_items: &[Dynamic],
    key: &str,
) -> Option<Vec<Option<&'a Dynamic>>> {
    let mut by_key = HashMap::with_capacity(old_items.len());
    for item in old_items {
        let id = key_repr(item.get(key)?)?;
        if by_key.insert(id, item).is_some() {
            return None;
        }
    }

    let mut seen = BTreeSet::new();
    new_items
        .iter()
        .map(|item| {
            let id = key_repr(item.get(key)?)?;
            if !seen.insert(id.clone()) {
                return None;
            }
            Some(by_key.get(&id).copied())
        })
        .collect()
}

fn key_repr(value: &Dynamic) -> Option<String> {
    match value {
        Dynamic::String(s) => Some(s.clone()),
        Dynamic::Number(n) => Some(n.to_string()),
        Dynamic::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
