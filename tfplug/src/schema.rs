//! Schema types and builders for tfplug
//!
//! This module provides the schema system for defining provider, resource and
//! data source schemas. Attribute flags double as the field descriptors the
//! state reconciler uses to decide merge precedence.

use crate::defaults::Default;
use crate::plan_modifier::PlanModifier;
use crate::reconcile::FieldMode;
use crate::validator::Validator;
use std::collections::HashMap;
use std::sync::Arc;

/// AttributeType defines the type system for Terraform attributes
/// This must match Terraform's type system exactly
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    Number, // Always f64
    Bool,
    List(Box<AttributeType>),               // Ordered, allows duplicates
    Set(Box<AttributeType>),                // Unordered, no duplicates
    Map(Box<AttributeType>),                // String keys only
    Object(HashMap<String, AttributeType>), // Fixed structure
}

/// Schema is returned by providers/resources/data sources
/// Version is used for state migration
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: i64,
    pub description: String,
    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Attribute represents a single configuration attribute
#[derive(Clone)]
pub struct Attribute {
    pub name: String,
    pub r#type: AttributeType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub deprecated: bool,
    pub validators: Vec<Arc<dyn Validator>>,
    pub plan_modifiers: Vec<Arc<dyn PlanModifier>>,
    pub default: Option<Arc<dyn Default>>,
    pub nested_type: Option<NestedType>,
    /// Attribute identifying elements of a nested list/set across reads
    pub element_key: Option<String>,
}

impl Attribute {
    /// Merge precedence tag derived from the required/optional/computed flags
    pub fn field_mode(&self) -> FieldMode {
        match (self.required, self.optional, self.computed) {
            (true, _, _) => FieldMode::Required,
            (false, true, true) => FieldMode::OptionalComputed,
            (false, false, true) => FieldMode::Computed,
            _ => FieldMode::Optional,
        }
    }
}

// Manual Debug implementation since validators/modifiers don't implement Debug
impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("sensitive", &self.sensitive)
            .field(
                "validators",
                &format!("{} validators", self.validators.len()),
            )
            .field(
                "plan_modifiers",
                &format!("{} plan modifiers", self.plan_modifiers.len()),
            )
            .field("default", &self.default.is_some())
            .field("nested_type", &self.nested_type)
            .field("element_key", &self.element_key)
            .finish()
    }
}

/// NestedType for attributes with nested structures
#[derive(Debug, Clone)]
pub struct NestedType {
    pub attributes: Vec<Attribute>,
    pub nesting: ObjectNestingMode,
}

/// ObjectNestingMode for nested attribute objects
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectNestingMode {
    Single,
    List,
    Set,
    Map,
}

/// AttributeBuilder provides fluent API for building attributes
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    pub fn new(name: &str, type_: AttributeType) -> Self {
        Self {
            attribute: Attribute {
                name: name.to_string(),
                r#type: type_,
                description: String::new(),
                required: false,
                optional: false,
                computed: false,
                sensitive: false,
                deprecated: false,
                validators: Vec::new(),
                plan_modifiers: Vec::new(),
                default: None,
                nested_type: None,
                element_key: None,
            },
        }
    }

    /// Attribute made of nested attributes; the type is derived from them
    pub fn nested(name: &str, nesting: ObjectNestingMode, attributes: Vec<Attribute>) -> Self {
        let object = AttributeType::Object(
            attributes
                .iter()
                .map(|a| (a.name.clone(), a.r#type.clone()))
                .collect(),
        );
        let type_ = match nesting {
            ObjectNestingMode::Single => object,
            ObjectNestingMode::List => AttributeType::List(Box::new(object)),
            ObjectNestingMode::Set => AttributeType::Set(Box::new(object)),
            ObjectNestingMode::Map => AttributeType::Map(Box::new(object)),
        };
        Self::new(name, type_).nested_type(NestedType {
            attributes,
            nesting,
        })
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.attribute.description = desc.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.attribute.required = true;
        self.attribute.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.attribute.optional = true;
        self.attribute.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.attribute.computed = true;
        self
    }

    /// Mark as sensitive (hidden in plan output)
    pub fn sensitive(mut self) -> Self {
        self.attribute.sensitive = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.attribute.deprecated = true;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.attribute.validators.push(validator);
        self
    }

    pub fn plan_modifier(mut self, modifier: Arc<dyn PlanModifier>) -> Self {
        self.attribute.plan_modifiers.push(modifier);
        self
    }

    pub fn default(mut self, default: Arc<dyn Default>) -> Self {
        self.attribute.default = Some(default);
        self
    }

    pub fn nested_type(mut self, nested: NestedType) -> Self {
        self.attribute.nested_type = Some(nested);
        self
    }

    pub fn element_key(mut self, key: &str) -> Self {
        self.attribute.element_key = Some(key.to_string());
        self
    }

    pub fn build(self) -> Attribute {
        self.attribute
    }
}

/// SchemaBuilder provides fluent API for building schemas
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            schema: Schema {
                version: 0,
                description: String::new(),
                attributes: Vec::new(),
            },
        }
    }

    pub fn version(mut self, version: i64) -> Self {
        self.schema.version = version;
        self
    }

    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.schema.attributes.push(attr);
        self
    }

    pub fn attributes(mut self, attrs: impl IntoIterator<Item = Attribute>) -> Self {
        self.schema.attributes.extend(attrs);
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.schema.description = desc.to_string();
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

impl std::default::Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
