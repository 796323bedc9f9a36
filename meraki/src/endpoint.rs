//! Declarative endpoint descriptors
//!
//! Each Terraform resource or data source is described by a static table:
//! REST paths with `{attribute}` placeholders, how each Terraform attribute
//! maps onto a JSON field, and who owns the field (user or API). Schemas and
//! reconciler shapes are derived from the same table, so they cannot drift.

use serde_json::Value;
use std::sync::Arc;
use tfplug::plan_modifier::{RequiresReplaceIfChanged, UseStateForUnknown};
use tfplug::reconcile::{FieldMode, Shape};
use tfplug::schema::{Attribute, AttributeBuilder, AttributeType, ObjectNestingMode, SchemaBuilder};
use tfplug::validator::StringOneOfValidator;
use tfplug::{Dynamic, Schema};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApiKind {
    String,
    Number,
    Bool,
    StringList,
    Object(&'static [ApiAttribute]),
    ObjectList(&'static [ApiAttribute]),
    ObjectSet(&'static [ApiAttribute]),
    /// JSON object keyed by arbitrary strings (MAC addresses, port ids)
    ObjectMap(&'static [ApiAttribute]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApiAttribute {
    /// Terraform attribute name
    pub name: &'static str,
    /// JSON field name in the Dashboard API
    pub api_name: &'static str,
    pub kind: ApiKind,
    pub mode: FieldMode,
    pub sensitive: bool,
    /// Changing the value forces a new resource; never sent on update
    pub requires_replace: bool,
    /// Computed value that stays the same for the life of the resource
    pub stable: bool,
    pub one_of: &'static [&'static str],
    pub description: &'static str,
}

impl ApiAttribute {
    pub const fn new(
        name: &'static str,
        api_name: &'static str,
        kind: ApiKind,
        mode: FieldMode,
    ) -> Self {
        Self {
            name,
            api_name,
            kind,
            mode,
            sensitive: false,
            requires_replace: false,
            stable: false,
            one_of: &[],
            description: "",
        }
    }

    pub const fn string(name: &'static str, api_name: &'static str, mode: FieldMode) -> Self {
        Self::new(name, api_name, ApiKind::String, mode)
    }

    pub const fn number(name: &'static str, api_name: &'static str, mode: FieldMode) -> Self {
        Self::new(name, api_name, ApiKind::Number, mode)
    }

    pub const fn bool(name: &'static str, api_name: &'static str, mode: FieldMode) -> Self {
        Self::new(name, api_name, ApiKind::Bool, mode)
    }

    pub const fn string_list(name: &'static str, api_name: &'static str, mode: FieldMode) -> Self {
        Self::new(name, api_name, ApiKind::StringList, mode)
    }

    pub const fn object(
        name: &'static str,
        api_name: &'static str,
        mode: FieldMode,
        attributes: &'static [ApiAttribute],
    ) -> Self {
        Self::new(name, api_name, ApiKind::Object(attributes), mode)
    }

    pub const fn object_list(
        name: &'static str,
        api_name: &'static str,
        mode: FieldMode,
        attributes: &'static [ApiAttribute],
    ) -> Self {
        Self::new(name, api_name, ApiKind::ObjectList(attributes), mode)
    }

    pub const fn object_set(
        name: &'static str,
        api_name: &'static str,
        mode: FieldMode,
        attributes: &'static [ApiAttribute],
    ) -> Self {
        Self::new(name, api_name, ApiKind::ObjectSet(attributes), mode)
    }

    pub const fn object_map(
        name: &'static str,
        api_name: &'static str,
        mode: FieldMode,
        attributes: &'static [ApiAttribute],
    ) -> Self {
        Self::new(name, api_name, ApiKind::ObjectMap(attributes), mode)
    }

    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub const fn replace(mut self) -> Self {
        self.requires_replace = true;
        self
    }

    pub const fn stable(mut self) -> Self {
        self.stable = true;
        self
    }

    pub const fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.one_of = allowed;
        self
    }

    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn attribute_type(&self) -> AttributeType {
        match self.kind {
            ApiKind::String => AttributeType::String,
            ApiKind::Number => AttributeType::Number,
            ApiKind::Bool => AttributeType::Bool,
            ApiKind::StringList => AttributeType::List(Box::new(AttributeType::String)),
            ApiKind::Object(attrs) => object_type(attrs),
            ApiKind::ObjectList(attrs) => AttributeType::List(Box::new(object_type(attrs))),
            ApiKind::ObjectSet(attrs) => AttributeType::Set(Box::new(object_type(attrs))),
            ApiKind::ObjectMap(attrs) => AttributeType::Map(Box::new(object_type(attrs))),
        }
    }

    /// Schema attribute; `mode_override` forces a mode onto the whole subtree
    pub fn schema_attribute(&self, mode_override: Option<FieldMode>) -> Attribute {
        let nested = |attrs: &[ApiAttribute]| -> Vec<Attribute> {
            attrs
                .iter()
                .map(|a| a.schema_attribute(mode_override))
                .collect()
        };

        let mut builder = match self.kind {
            ApiKind::Object(attrs) => {
                AttributeBuilder::nested(self.name, ObjectNestingMode::Single, nested(attrs))
            }
            ApiKind::ObjectList(attrs) => {
                AttributeBuilder::nested(self.name, ObjectNestingMode::List, nested(attrs))
            }
            ApiKind::ObjectSet(attrs) => {
                AttributeBuilder::nested(self.name, ObjectNestingMode::Set, nested(attrs))
            }
            ApiKind::ObjectMap(attrs) => {
                AttributeBuilder::nested(self.name, ObjectNestingMode::Map, nested(attrs))
            }
            _ => AttributeBuilder::new(self.name, self.attribute_type()),
        };

        builder = match mode_override.unwrap_or(self.mode) {
            FieldMode::Required => builder.required(),
            FieldMode::Optional => builder.optional(),
            FieldMode::OptionalComputed => builder.optional().computed(),
            FieldMode::Computed => builder.computed(),
        };

        if !self.description.is_empty() {
            builder = builder.description(self.description);
        }
        if self.sensitive {
            builder = builder.sensitive();
        }
        if !self.one_of.is_empty() {
            builder = builder.validator(Arc::new(StringOneOfValidator::new(self.one_of)));
        }
        if mode_override.is_none() {
            if self.requires_replace {
                builder = builder.plan_modifier(RequiresReplaceIfChanged::create());
            }
            if self.stable {
                builder = builder.plan_modifier(UseStateForUnknown::create());
            }
        }

        builder.build()
    }
}

fn object_type(attrs: &[ApiAttribute]) -> AttributeType {
    AttributeType::Object(
        attrs
            .iter()
            .map(|a| (a.name.to_string(), a.attribute_type()))
            .collect(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourceKind {
    /// Created with POST to `create_path`; the API assigns the identifier
    /// returned as `id_attribute`
    Collection {
        create_path: &'static str,
        id_attribute: &'static str,
    },
    /// Always exists on the parent; create and update both PUT the item path
    Settings,
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceDescriptor {
    pub type_name: &'static str,
    pub description: &'static str,
    pub kind: ResourceKind,
    pub item_path: &'static str,
    /// Attributes filled from a comma separated import identifier
    pub import_attributes: &'static [&'static str],
    pub attributes: &'static [ApiAttribute],
    /// Applied to every API response before it is projected onto state
    pub response_filter: Option<fn(&mut Value)>,
}

impl ResourceDescriptor {
    pub fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description(self.description)
            .attributes(self.attributes.iter().map(|a| a.schema_attribute(None)))
            .build()
    }

    pub fn shape(&self) -> Shape {
        Shape::from_schema(&self.schema())
    }

    pub fn attribute(&self, name: &str) -> Option<&ApiAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Top-level attributes left out of the create body
    pub fn create_exclusions(&self) -> Vec<&'static str> {
        match self.kind {
            ResourceKind::Collection { create_path, .. } => placeholders(create_path),
            ResourceKind::Settings => placeholders(self.item_path),
        }
    }

    /// Top-level attributes left out of update bodies: URL parameters and
    /// attributes that can only change by replacement
    pub fn update_exclusions(&self) -> Vec<&'static str> {
        let mut names = placeholders(self.item_path);
        let replace_only: Vec<&'static str> = self
            .attributes
            .iter()
            .filter(|a| a.requires_replace && !names.contains(&a.name))
            .map(|a| a.name)
            .collect();
        names.extend(replace_only);
        names
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DataSourceDescriptor {
    pub type_name: &'static str,
    pub description: &'static str,
    /// User supplied arguments: path placeholders or query parameters
    pub params: &'static [ApiAttribute],
    pub list_path: Option<&'static str>,
    pub item_path: Option<&'static str>,
    /// Parameter whose presence switches to the single item lookup
    pub selector: Option<&'static str>,
    pub attributes: &'static [ApiAttribute],
}

impl DataSourceDescriptor {
    /// Params plus `item` (single lookup) and `items` (list lookup)
    pub fn schema(&self) -> Schema {
        let response: Vec<Attribute> = self
            .attributes
            .iter()
            .map(|a| a.schema_attribute(Some(FieldMode::Computed)))
            .collect();

        SchemaBuilder::new()
            .version(0)
            .description(self.description)
            .attributes(self.params.iter().map(|a| a.schema_attribute(None)))
            .attribute(
                AttributeBuilder::nested("item", ObjectNestingMode::Single, response.clone())
                    .computed()
                    .description("Result of a single item lookup")
                    .build(),
            )
            .attribute(
                AttributeBuilder::nested("items", ObjectNestingMode::List, response)
                    .computed()
                    .description("Result of a list lookup")
                    .build(),
            )
            .build()
    }

    pub fn shape(&self) -> Shape {
        Shape::from_schema(&self.schema())
    }

    /// Params that become query string arguments
    pub fn query_params(&self) -> impl Iterator<Item = &ApiAttribute> {
        let in_path: Vec<&str> = self
            .list_path
            .into_iter()
            .chain(self.item_path)
            .flat_map(placeholders)
            .collect();
        self.params
            .iter()
            .filter(move |p| !in_path.contains(&p.name) && Some(p.name) != self.selector)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PathError {
    #[error("missing value for path parameter '{0}'")]
    MissingParameter(String),

    #[error("unterminated placeholder in path template '{0}'")]
    Malformed(String),
}

/// Names of the `{attribute}` placeholders in a template, in order
pub fn placeholders(template: &'static str) -> Vec<&'static str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        names.push(&rest[start + 1..start + len]);
        rest = &rest[start + len + 1..];
    }
    names
}

/// Fills each `{attribute}` with the percent-encoded value from `values`
pub fn render_path(template: &str, values: &Dynamic) -> Result<String, PathError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let len = rest[start..]
            .find('}')
            .ok_or_else(|| PathError::Malformed(template.to_string()))?;
        let name = &rest[start + 1..start + len];
        let segment = values
            .get(name)
            .and_then(path_segment)
            .ok_or_else(|| PathError::MissingParameter(name.to_string()))?;

        out.push_str(&rest[..start]);
        out.push_str(&urlencoding::encode(&segment));
        rest = &rest[start + len + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn path_segment(value: &Dynamic) -> Option<String> {
    match value {
        Dynamic::String(s) if !s.is_empty() => Some(s.clone()),
        Dynamic::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        Dynamic::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
