//! Declarative attribute schemas exposed to the host framework.
//!
//! Every resource kind publishes one [`ResourceSchema`]: the attribute names
//! it understands, their types, and whether they are required, optional or
//! computed. Attributes flagged `force_new` can never be changed in place.

use serde::Serialize;

/// Attribute value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string.
    String,
    /// A 64-bit integer.
    Int,
    /// A list of strings.
    StringList,
    /// A string to string map.
    StringMap,
    /// A set of `{ name, values }` filter blocks.
    FilterSet,
}

/// A single attribute declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    /// Value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Must be set by the caller.
    pub required: bool,
    /// May be set by the caller.
    pub optional: bool,
    /// Filled in from the remote object.
    pub computed: bool,
    /// Changing the value requires destroying and recreating the object.
    pub force_new: bool,
}

/// Schema of one resource or lookup kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSchema {
    /// Resource type name.
    pub type_name: &'static str,
    /// Attributes in declaration order.
    pub attributes: Vec<(&'static str, Attribute)>,
}

impl Attribute {
    const fn new(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
        }
    }

    /// A required string.
    #[must_use]
    pub const fn required_string() -> Self {
        Self::new(AttributeType::String).required()
    }

    /// A computed string.
    #[must_use]
    pub const fn computed_string() -> Self {
        Self::new(AttributeType::String).computed()
    }

    /// Creates an attribute of any type.
    #[must_use]
    pub const fn of(attr_type: AttributeType) -> Self {
        Self::new(attr_type)
    }

    /// Optional `tags` map.
    #[must_use]
    pub const fn tags() -> Self {
        Self::new(AttributeType::StringMap).optional()
    }

    /// Computed `tags_all` map.
    #[must_use]
    pub const fn tags_all() -> Self {
        Self::new(AttributeType::StringMap).computed()
    }

    /// Marks the attribute required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the attribute optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the attribute computed.
    #[must_use]
    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Marks the attribute create-time only.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

impl ResourceSchema {
    /// Creates an empty schema.
    #[must_use]
    pub const fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            attributes: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: &'static str, attribute: Attribute) -> Self {
        self.attributes.push((name, attribute));
        self
    }

    /// Gets an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, a)| a)
    }

    /// Names of attributes that must be set.
    #[must_use]
    pub fn required_attributes(&self) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.required)
            .map(|(n, _)| *n)
            .collect()
    }

    /// Returns true if changing `name` requires replacement.
    #[must_use]
    pub fn is_force_new(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| a.force_new)
    }
}
