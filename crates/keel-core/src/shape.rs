//! Shape descriptors.
//!
//! A [`Shape`] is the static schema of one resource type (or of one nested
//! block). It is supplied by the resource catalog and treated as read-only by
//! the engine. Each [`Field`] records:
//!
//! - the attribute name used in trees and the vendor field name used on the wire
//! - the value kind, with a nested shape for block kinds
//! - whether the vendor fills in a default when the field is omitted
//! - whether the vendor never returns the field on read
//! - whether an empty string stands for "not set"
//! - whether a change forces the whole resource to be replaced
//! - an optional condition on a sibling discriminator field
//!
//! ```
//! use keel_core::{Condition, Field, Shape};
//!
//! let action = Shape::new().field(Field::string("type").vendor("Type"));
//! let rule = Shape::new()
//!     .field(Field::string("type").vendor("Type").computed())
//!     .field(
//!         Field::block("override_action", action.clone())
//!             .vendor("OverrideAction")
//!             .when(Condition::equals("type", "GROUP")),
//!     )
//!     .field(
//!         Field::block("action", action)
//!             .vendor("Action")
//!             .when(Condition::not_equals("type", "GROUP")),
//!     );
//!
//! assert_eq!(rule.fields().len(), 3);
//! ```

use crate::tree::{AttrTree, Scalar};

/// The kind of value a field holds.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// String scalar.
    String,
    /// Integer scalar.
    Int,
    /// Floating point scalar.
    Float,
    /// Boolean scalar.
    Bool,
    /// Unordered set of strings (vendor: JSON array of strings).
    StringSet,
    /// String map (vendor: JSON object of strings).
    StringMap,
    /// Single nested block (vendor: JSON object; tree: list of 0 or 1 entries).
    Block(Shape),
    /// Repeated nested block, order significant (vendor: JSON array of objects).
    List(Shape),
    /// Repeated nested block, order insignificant (vendor: JSON array of objects).
    Set(Shape),
}

impl FieldKind {
    /// Name of the kind, used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::StringSet => "string set",
            Self::StringMap => "string map",
            Self::Block(_) => "block",
            Self::List(_) => "list",
            Self::Set(_) => "set",
        }
    }

    /// The nested shape of a block kind.
    #[must_use]
    pub const fn nested(&self) -> Option<&Shape> {
        match self {
            Self::Block(shape) | Self::List(shape) | Self::Set(shape) => Some(shape),
            _ => None,
        }
    }

    /// Whether this kind holds a single scalar.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        matches!(self, Self::String | Self::Int | Self::Float | Self::Bool)
    }
}

/// When a change to a field cannot be applied in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ForceReplace {
    /// Changes are always applied in place.
    #[default]
    Never,
    /// Any change replaces the resource.
    Always,
    /// A change replaces the resource only when a sibling field in the same
    /// block moves from `from` to `to` in the same plan.
    OnSiblingTransition {
        /// Sibling attribute name.
        sibling: String,
        /// Sibling value before the change.
        from: Scalar,
        /// Sibling value after the change.
        to: Scalar,
    },
}

/// Activation condition on a sibling discriminator field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Active when the sibling equals the value.
    Equals {
        /// Discriminator attribute name.
        field: String,
        /// Value selecting this branch.
        value: Scalar,
    },
    /// Active when the sibling is absent or differs from the value.
    NotEquals {
        /// Discriminator attribute name.
        field: String,
        /// Value deselecting this branch.
        value: Scalar,
    },
}

impl Condition {
    /// Active when `field == value`.
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Active when `field != value` (including when `field` is absent).
    #[must_use]
    pub fn not_equals(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::NotEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// The discriminator attribute this condition reads.
    #[must_use]
    pub fn discriminator(&self) -> &str {
        match self {
            Self::Equals { field, .. } | Self::NotEquals { field, .. } => field,
        }
    }

    /// Evaluate against the block containing the field.
    #[must_use]
    pub fn holds(&self, block: &AttrTree) -> bool {
        match self {
            Self::Equals { field, value } => block.scalar(field) == Some(value),
            Self::NotEquals { field, value } => block.scalar(field) != Some(value),
        }
    }
}

/// One attribute of a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    vendor_name: String,
    kind: FieldKind,
    computed: bool,
    write_only: bool,
    omit_empty: bool,
    force_replace: ForceReplace,
    when: Option<Condition>,
}

impl Field {
    /// Create a field of the given kind. The vendor name defaults to `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            vendor_name: name.clone(),
            name,
            kind,
            computed: false,
            write_only: false,
            omit_empty: false,
            force_replace: ForceReplace::Never,
            when: None,
        }
    }

    /// A string field.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// An integer field.
    #[must_use]
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int)
    }

    /// A float field.
    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    /// A boolean field.
    #[must_use]
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    /// A string set field.
    #[must_use]
    pub fn string_set(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::StringSet)
    }

    /// A string map field.
    #[must_use]
    pub fn string_map(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::StringMap)
    }

    /// A single nested block.
    #[must_use]
    pub fn block(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, FieldKind::Block(shape))
    }

    /// An ordered repeated block.
    #[must_use]
    pub fn list(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, FieldKind::List(shape))
    }

    /// An unordered repeated block.
    #[must_use]
    pub fn set(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, FieldKind::Set(shape))
    }

    /// Set the vendor field name.
    #[must_use]
    pub fn vendor(mut self, vendor_name: impl Into<String>) -> Self {
        self.vendor_name = vendor_name.into();
        self
    }

    /// Optional with a vendor-side default: omitting it is never drift.
    #[must_use]
    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Never returned by the vendor on read.
    #[must_use]
    pub const fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    /// An empty string is sent and compared as if the field were absent.
    #[must_use]
    pub const fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    /// Any change replaces the resource.
    #[must_use]
    pub fn force_replace(mut self) -> Self {
        self.force_replace = ForceReplace::Always;
        self
    }

    /// A change replaces the resource when `sibling` moves from `from` to `to`.
    #[must_use]
    pub fn force_replace_when(
        mut self,
        sibling: impl Into<String>,
        from: impl Into<Scalar>,
        to: impl Into<Scalar>,
    ) -> Self {
        self.force_replace = ForceReplace::OnSiblingTransition {
            sibling: sibling.into(),
            from: from.into(),
            to: to.into(),
        };
        self
    }

    /// Only meaningful when the condition holds on the enclosing block.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.when = Some(condition);
        self
    }

    /// Attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vendor field name.
    #[must_use]
    pub fn vendor_name(&self) -> &str {
        &self.vendor_name
    }

    /// Value kind.
    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether the vendor defaults the field when omitted.
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        self.computed
    }

    /// Whether the vendor never returns the field.
    #[must_use]
    pub const fn is_write_only(&self) -> bool {
        self.write_only
    }

    /// Whether an empty string counts as absent.
    #[must_use]
    pub const fn omits_empty(&self) -> bool {
        self.omit_empty
    }

    /// Replacement rule.
    #[must_use]
    pub const fn replacement(&self) -> &ForceReplace {
        &self.force_replace
    }

    /// Activation condition.
    #[must_use]
    pub const fn condition(&self) -> Option<&Condition> {
        self.when.as_ref()
    }

    /// Whether the field is active in the given enclosing block.
    #[must_use]
    pub fn is_active(&self, block: &AttrTree) -> bool {
        self.when.as_ref().map_or(true, |c| c.holds(block))
    }
}

/// The schema of a resource or nested block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    fields: Vec<Field>,
}

impl Shape {
    /// An empty shape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// All fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by attribute name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by vendor name.
    #[must_use]
    pub fn get_by_vendor(&self, vendor_name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.vendor_name == vendor_name)
    }

    /// Whether any field at any depth is write-only.
    #[must_use]
    pub fn has_write_only(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.write_only || f.kind.nested().is_some_and(Self::has_write_only))
    }
}
