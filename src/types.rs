//! Schema type definitions
//!
//! These are the user-facing building blocks of a schema: item types, object
//! types, enums and type aliases. They are created through the
//! [`TypeRegistry`](crate::registry::TypeRegistry), which owns the canonical
//! instance of every named type and hands out [`TypeId`] handles.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::deferred::Deferred;
use crate::stringify::DefaultValue;

// =============================================================================
// Handles
// =============================================================================

/// Index-stable handle to a type in a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// Panics if the registry has outgrown `u32` handles
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).expect("type registry exceeded u32::MAX entries"))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which kind of schema type a definition is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeKind {
    Item,
    Object,
    Enum,
    Alias,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item => write!(f, "itemType"),
            Self::Object => write!(f, "objectType"),
            Self::Enum => write!(f, "enumType"),
            Self::Alias => write!(f, "type"),
        }
    }
}

// =============================================================================
// Scalars and hints
// =============================================================================

/// Primitive kinds at the bottom of every alias chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarKind {
    Bool,
    String,
    Bytes,
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Uint32,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl ScalarKind {
    pub fn is_number(self) -> bool {
        !matches!(self, Self::Bool | Self::String | Self::Bytes)
    }

    pub fn is_integer(self) -> bool {
        self.is_number() && !matches!(self, Self::Double | Self::Float)
    }

    pub fn is_unsigned_64(self) -> bool {
        matches!(self, Self::Uint64 | Self::Fixed64)
    }
}

/// Hint telling downstream consumers how to treat a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterpretAs {
    Uuid,
    TimestampSeconds,
    TimestampMilliseconds,
    TimestampMicroseconds,
    DurationSeconds,
    DurationMilliseconds,
    KeyPath,
    Url,
}

impl InterpretAs {
    pub fn is_timestamp(self) -> bool {
        matches!(
            self,
            Self::TimestampSeconds | Self::TimestampMilliseconds | Self::TimestampMicroseconds
        )
    }

    pub fn is_duration(self) -> bool {
        matches!(self, Self::DurationSeconds | Self::DurationMilliseconds)
    }
}

/// A CEL expression that values of a type must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validation {
    pub valid: String,
    #[serde(default)]
    pub message: String,
}

impl Validation {
    pub fn new(valid: impl Into<String>) -> Self {
        Self {
            valid: valid.into(),
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl From<&str> for Validation {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// Type alias
// =============================================================================

/// What an alias is built on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasParent {
    Scalar(ScalarKind),
    Type(TypeId),
}

impl From<ScalarKind> for AliasParent {
    fn from(kind: ScalarKind) -> Self {
        Self::Scalar(kind)
    }
}

impl From<TypeId> for AliasParent {
    fn from(id: TypeId) -> Self {
        Self::Type(id)
    }
}

/// Options for [`TypeRegistry::alias`](crate::registry::TypeRegistry::alias)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasOptions {
    pub validations: Vec<Validation>,
    pub interpret_as: Option<InterpretAs>,
    pub no_alias: bool,
    pub deprecated: Option<String>,
    pub comments: Option<String>,
}

impl AliasOptions {
    pub fn valid(mut self, v: impl Into<Validation>) -> Self {
        self.validations.push(v.into());
        self
    }

    pub fn interpret_as(mut self, hint: InterpretAs) -> Self {
        self.interpret_as = Some(hint);
        self
    }

    pub fn no_alias(mut self) -> Self {
        self.no_alias = true;
        self
    }

    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecated = Some(reason.into());
        self
    }

    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

/// A named wrapper around a scalar or another type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAlias {
    pub name: String,
    pub parent: AliasParent,
    pub array: bool,
    pub validations: Vec<Validation>,
    pub interpret_as: Option<InterpretAs>,
    pub no_alias: bool,
    pub deprecated: Option<String>,
    pub comments: Option<String>,
}

impl TypeAlias {
    pub fn new(name: impl Into<String>, parent: impl Into<AliasParent>, options: AliasOptions) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            array: false,
            validations: options.validations,
            interpret_as: options.interpret_as,
            no_alias: options.no_alias,
            deprecated: options.deprecated,
            comments: options.comments,
        }
    }
}

// =============================================================================
// Fields
// =============================================================================

/// Item metadata a field can mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FromMetadata {
    CreatedAtTime,
    LastModifiedAtTime,
    CreatedAtVersion,
    LastModifiedAtVersion,
    Ttl,
}

impl FromMetadata {
    /// Wire ordinal
    pub fn ordinal(self) -> u32 {
        match self {
            Self::CreatedAtTime => 1,
            Self::LastModifiedAtTime => 2,
            Self::CreatedAtVersion => 3,
            Self::LastModifiedAtVersion => 4,
            Self::Ttl => 7,
        }
    }
}

/// Generators for a field's value at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitialValue {
    Sequence,
    Uuid,
    Rand53,
}

impl InitialValue {
    /// Wire ordinal
    pub fn ordinal(self) -> u32 {
        match self {
            Self::Sequence => 1,
            Self::Uuid => 2,
            Self::Rand53 => 4,
        }
    }
}

/// A field in an item or object type
#[derive(Debug, Clone)]
pub struct Field {
    pub field_type: Deferred<TypeId>,
    pub required: Option<bool>,
    pub deprecated: Option<String>,
    pub comments: Option<String>,
    pub read_default: Option<DefaultValue>,
    pub valid: Vec<String>,
    pub from_metadata: Option<FromMetadata>,
    pub initial_value: Option<InitialValue>,
}

impl Field {
    pub fn new(field_type: impl Into<Deferred<TypeId>>) -> Self {
        Self {
            field_type: field_type.into(),
            required: None,
            deprecated: None,
            comments: None,
            read_default: None,
            valid: Vec::new(),
            from_metadata: None,
            initial_value: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn optional(self) -> Self {
        self.required(false)
    }

    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecated = Some(reason.into());
        self
    }

    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn read_default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.read_default = Some(value.into());
        self
    }

    pub fn valid(mut self, expr: impl Into<String>) -> Self {
        self.valid.push(expr.into());
        self
    }

    pub fn from_metadata(mut self, source: FromMetadata) -> Self {
        self.from_metadata = Some(source);
        self
    }

    pub fn initial_value(mut self, generator: InitialValue) -> Self {
        self.initial_value = Some(generator);
        self
    }

    /// Structural comparison used by the registry's fingerprint check
    fn same_shape(&self, other: &Field) -> bool {
        !self.field_type.provably_differs(&other.field_type)
            && self.required == other.required
            && self.valid == other.valid
            && self.from_metadata == other.from_metadata
            && self.initial_value == other.initial_value
            && self.read_default == other.read_default
    }
}

/// Ordered map of field name to field
pub type Fields = IndexMap<String, Field>;

fn same_fields(a: &Fields, b: &Fields) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(name, field)| b.get(name).is_some_and(|other| field.same_shape(other)))
}

// =============================================================================
// Item and object types
// =============================================================================

/// A key path template, optionally overriding the item's feature flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPathConfig {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syncable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioned: Option<bool>,
}

impl From<&str> for KeyPathConfig {
    fn from(path: &str) -> Self {
        Self {
            path: path.to_string(),
            syncable: None,
            versioned: None,
        }
    }
}

impl From<String> for KeyPathConfig {
    fn from(path: String) -> Self {
        Self {
            path,
            syncable: None,
            versioned: None,
        }
    }
}

/// Where an item's TTL is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TtlSource {
    FromCreated,
    FromLastModified,
    AtTimestamp,
}

impl TtlSource {
    pub fn ordinal(self) -> u32 {
        match self {
            Self::FromCreated => 1,
            Self::FromLastModified => 2,
            Self::AtTimestamp => 3,
        }
    }
}

/// Constant duration or a field holding the duration/timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TtlValue {
    DurationSeconds(u64),
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlConfig {
    pub source: TtlSource,
    pub value: TtlValue,
}

/// A group-local index over one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLocalIndexConfig {
    pub group_local_index: u32,
    pub field: String,
}

/// A root, independently addressable stored entity
#[derive(Debug, Clone)]
pub struct ItemType {
    pub name: String,
    pub fields: Fields,
    pub key_paths: Vec<KeyPathConfig>,
    pub ttl: Option<TtlConfig>,
    pub syncable: Option<bool>,
    pub versioned: Option<bool>,
    pub indexes: Vec<GroupLocalIndexConfig>,
    pub reserved_names: Vec<String>,
    pub deprecated: Option<String>,
    pub comments: Option<String>,
}

impl ItemType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Fields::new(),
            key_paths: Vec::new(),
            ttl: None,
            syncable: None,
            versioned: None,
            indexes: Vec::new(),
            reserved_names: Vec::new(),
            deprecated: None,
            comments: None,
        }
    }

    pub fn key_path(mut self, key_path: impl Into<KeyPathConfig>) -> Self {
        self.key_paths.push(key_path.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn ttl(mut self, source: TtlSource, value: TtlValue) -> Self {
        self.ttl = Some(TtlConfig { source, value });
        self
    }

    pub fn syncable(mut self, syncable: bool) -> Self {
        self.syncable = Some(syncable);
        self
    }

    pub fn versioned(mut self, versioned: bool) -> Self {
        self.versioned = Some(versioned);
        self
    }

    pub fn index(mut self, group_local_index: u32, field: impl Into<String>) -> Self {
        self.indexes.push(GroupLocalIndexConfig {
            group_local_index,
            field: field.into(),
        });
        self
    }

    pub fn reserved(mut self, name: impl Into<String>) -> Self {
        self.reserved_names.push(name.into());
        self
    }

    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecated = Some(reason.into());
        self
    }

    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

/// A nested structure, usable only as a field type
#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub fields: Fields,
    pub reserved_names: Vec<String>,
    pub deprecated: Option<String>,
    pub comments: Option<String>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Fields::new(),
            reserved_names: Vec::new(),
            deprecated: None,
            comments: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn reserved(mut self, name: impl Into<String>) -> Self {
        self.reserved_names.push(name.into());
        self
    }

    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecated = Some(reason.into());
        self
    }

    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValueConfig {
    pub value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl From<i32> for EnumValueConfig {
    fn from(value: i32) -> Self {
        Self {
            value,
            deprecated: None,
            comments: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub values: IndexMap<String, EnumValueConfig>,
    pub deprecated: Option<String>,
    pub comments: Option<String>,
}

impl EnumType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: IndexMap::new(),
            deprecated: None,
            comments: None,
        }
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<EnumValueConfig>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecated = Some(reason.into());
        self
    }

    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

// =============================================================================
// Schema type
// =============================================================================

/// Any definition the registry can hold
#[derive(Debug, Clone)]
pub enum SchemaType {
    Item(ItemType),
    Object(ObjectType),
    Enum(EnumType),
    Alias(TypeAlias),
}

impl SchemaType {
    pub fn name(&self) -> &str {
        match self {
            Self::Item(t) => &t.name,
            Self::Object(t) => &t.name,
            Self::Enum(t) => &t.name,
            Self::Alias(t) => &t.name,
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Self::Item(_) => TypeKind::Item,
            Self::Object(_) => TypeKind::Object,
            Self::Enum(_) => TypeKind::Enum,
            Self::Alias(_) => TypeKind::Alias,
        }
    }

    /// Fields of a message-like type
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            Self::Item(t) => Some(&t.fields),
            Self::Object(t) => Some(&t.fields),
            _ => None,
        }
    }

    /// Structural fingerprint comparison.
    ///
    /// Definitions are rebuilt on every call, so identity comparison is
    /// meaningless here. Two definitions are the same unless the comparison
    /// can prove otherwise.
    pub fn same_shape(&self, other: &SchemaType) -> bool {
        match (self, other) {
            (Self::Item(a), Self::Item(b)) => {
                same_fields(&a.fields, &b.fields)
                    && a.key_paths == b.key_paths
                    && a.ttl == b.ttl
                    && a.indexes == b.indexes
                    && a.syncable == b.syncable
                    && a.versioned == b.versioned
            }
            (Self::Object(a), Self::Object(b)) => same_fields(&a.fields, &b.fields),
            (Self::Enum(a), Self::Enum(b)) => {
                a.values.len() == b.values.len()
                    && a.values
                        .iter()
                        .all(|(k, v)| b.values.get(k).is_some_and(|o| o.value == v.value))
            }
            (Self::Alias(a), Self::Alias(b)) => {
                a.parent == b.parent
                    && a.array == b.array
                    && a.validations == b.validations
                    && a.interpret_as == b.interpret_as
                    && a.no_alias == b.no_alias
            }
            _ => false,
        }
    }
}

impl From<ItemType> for SchemaType {
    fn from(t: ItemType) -> Self {
        Self::Item(t)
    }
}

impl From<ObjectType> for SchemaType {
    fn from(t: ObjectType) -> Self {
        Self::Object(t)
    }
}

impl From<EnumType> for SchemaType {
    fn from(t: EnumType) -> Self {
        Self::Enum(t)
    }
}

impl From<TypeAlias> for SchemaType {
    fn from(t: TypeAlias) -> Self {
        Self::Alias(t)
    }
}

// =============================================================================
// Schema defaults
// =============================================================================

/// Schema-wide defaults for item types and key paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syncable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioned: Option<bool>,
    #[serde(
        default,
        alias = "tombstoneTtlHours",
        alias = "tombstoneTTLHours",
        skip_serializing_if = "Option::is_none"
    )]
    pub tombstone_ttl_hours: Option<u64>,
}

// =============================================================================
// Names
// =============================================================================

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

/// Check a name against the identifier grammar
pub fn is_valid_name(name: &str) -> bool {
    identifier_regex().is_match(name)
}
