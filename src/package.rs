//! Compiled schema package
//!
//! The flat, serializable form of a schema. Everything here is plain data:
//! names instead of handles, strings instead of host values. Field and enum
//! value order follows declaration order and is significant to consumers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{FromMetadata, InitialValue, InterpretAs, ScalarKind, TtlSource, TtlValue};

// =============================================================================
// Package
// =============================================================================

/// A compiled schema, ready for persistence and code generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaPackage {
    pub package_name: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub messages: Vec<MessageDescriptor>,
    #[serde(default)]
    pub enums: Vec<EnumDescriptor>,
    #[serde(default)]
    pub type_aliases: Vec<TypeAliasDescriptor>,
    pub default_group_config: DefaultGroupConfig,
}

impl SchemaPackage {
    pub fn message(&self, type_name: &str) -> Option<&MessageDescriptor> {
        self.messages.iter().find(|m| m.type_name == type_name)
    }

    pub fn enum_type(&self, type_name: &str) -> Option<&EnumDescriptor> {
        self.enums.iter().find(|e| e.type_name == type_name)
    }

    pub fn type_alias(&self, type_name: &str) -> Option<&TypeAliasDescriptor> {
        self.type_aliases.iter().find(|a| a.type_name == type_name)
    }

    /// Whether any message, enum or alias uses this name
    pub fn contains(&self, type_name: &str) -> bool {
        self.message(type_name).is_some()
            || self.enum_type(type_name).is_some()
            || self.type_alias(type_name).is_some()
    }
}

/// Group-level defaults for every item type in the package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultGroupConfig {
    pub supported_feature_flags: SupportedFeatures,
    /// Zero means the server default
    pub tombstone_duration_seconds: u64,
}

/// Bit set of storage features
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupportedFeatures(pub u32);

impl SupportedFeatures {
    pub const NONE: Self = Self(0);
    pub const VERSIONED_GROUP: Self = Self(1);
    pub const SYNC: Self = Self(2);

    pub fn from_flags(versioned: bool, syncable: bool) -> Self {
        let mut flags = Self::NONE;
        if versioned {
            flags.0 |= Self::VERSIONED_GROUP.0;
        }
        if syncable {
            flags.0 |= Self::SYNC.0;
        }
        flags
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn versioned(self) -> bool {
        self.contains(Self::VERSIONED_GROUP)
    }

    pub fn syncable(self) -> bool {
        self.contains(Self::SYNC)
    }
}

impl fmt::Display for SupportedFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.versioned() {
            names.push("versioned");
        }
        if self.syncable() {
            names.push("sync");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDescriptor {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comments: String,
    pub fields: Vec<FieldDescriptor>,
    /// Present only for item types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type_options: Option<MessageOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

impl MessageDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    pub fn is_item_type(&self) -> bool {
        self.item_type_options.is_some()
    }
}

/// Item-type metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageOptions {
    pub key_paths: Vec<KeyPathDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<TtlDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPathDescriptor {
    pub path_template: String,
    pub supported_feature_flags: SupportedFeatures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlDescriptor {
    pub source: TtlSource,
    pub value: TtlValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    pub property_path: String,
    pub group_local_index: u32,
}

// =============================================================================
// Fields
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub field_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comments: String,
    #[serde(default)]
    pub require_non_zero: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<Constraint>,
    pub field_type: TypeDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_option: Option<ValueOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

impl FieldDescriptor {
    /// The written value is ignored; it is derived by the server
    pub fn is_ephemeral(&self) -> bool {
        self.value_option.is_some()
    }
}

/// How the server fills in a field on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueOption {
    FromMetadata(FromMetadata),
    InitialValue(InitialValue),
}

/// A validation expression attached to a field or alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub id: String,
    pub message: String,
    pub expression: String,
}

/// The wire shape of a field or alias value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeDescriptor {
    Number {
        kind: ScalarKind,
        #[serde(default, rename = "interpretAs", skip_serializing_if = "Option::is_none")]
        interpret_as: Option<InterpretAs>,
    },
    Bool,
    String {
        #[serde(default, rename = "interpretAs", skip_serializing_if = "Option::is_none")]
        interpret_as: Option<InterpretAs>,
    },
    Binary {
        #[serde(default, rename = "interpretAs", skip_serializing_if = "Option::is_none")]
        interpret_as: Option<InterpretAs>,
    },
    List {
        #[serde(rename = "elementType")]
        element_type: Box<TypeDescriptor>,
    },
    /// Fully qualified `package.Type`
    ReferenceByName(String),
}

impl TypeDescriptor {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List { .. })
    }

    /// Element type for lists, the type itself otherwise
    pub fn element(&self) -> &TypeDescriptor {
        match self {
            Self::List { element_type } => element_type,
            other => other,
        }
    }

    /// Qualified name of the referenced type, if any
    pub fn reference(&self) -> Option<&str> {
        match self.element() {
            Self::ReferenceByName(name) => Some(name),
            _ => None,
        }
    }
}

// =============================================================================
// Enums and aliases
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumDescriptor {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comments: String,
    pub values: Vec<EnumValueDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

impl EnumDescriptor {
    /// Look up a value by its un-namespaced name
    pub fn value_by_short_name(&self, short_name: &str) -> Option<&EnumValueDescriptor> {
        self.values.iter().find(|v| v.short_name == short_name)
    }

    pub(crate) fn value_by_short_name_mut(
        &mut self,
        short_name: &str,
    ) -> Option<&mut EnumValueDescriptor> {
        self.values.iter_mut().find(|v| v.short_name == short_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumValueDescriptor {
    /// `<Enum>_<short_name>`
    pub name: String,
    pub short_name: String,
    pub ordinal: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeAliasDescriptor {
    pub type_name: String,
    pub element_type: TypeDescriptor,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comments: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_flags() {
        let flags = SupportedFeatures::from_flags(true, true);
        assert_eq!(flags.0, 3);
        assert!(flags.versioned());
        assert!(flags.syncable());
        assert_eq!(flags.to_string(), "versioned|sync");
        assert_eq!(SupportedFeatures::from_flags(false, false).to_string(), "none");
        assert_eq!(SupportedFeatures::from_flags(false, true), SupportedFeatures::SYNC);
    }

    #[test]
    fn test_type_descriptor_reference() {
        let list = TypeDescriptor::List {
            element_type: Box::new(TypeDescriptor::ReferenceByName("pkg.Node".into())),
        };
        assert!(list.is_list());
        assert_eq!(list.reference(), Some("pkg.Node"));
        assert_eq!(TypeDescriptor::Bool.reference(), None);
    }

    #[test]
    fn test_type_descriptor_json_shape() {
        let ty = TypeDescriptor::Number {
            kind: ScalarKind::Sint64,
            interpret_as: Some(InterpretAs::TimestampSeconds),
        };
        assert_eq!(
            serde_json::to_string(&ty).unwrap(),
            r#"{"number":{"kind":"sint64","interpretAs":"timestampSeconds"}}"#
        );
        assert_eq!(serde_json::to_string(&TypeDescriptor::Bool).unwrap(), r#""bool""#);
    }
}
