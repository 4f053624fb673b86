//! Error types for the schema compiler
//!
//! Every failure carries a stable, machine-readable [`ErrorCode`] so that the
//! embedding driver can report it without parsing the message.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema compiler errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("{existing} \"{name}\" is already defined with a different shape (attempted to redefine it as {attempted}) - did you mean to use a different name?")]
    DuplicateTypeDefinition {
        name: String,
        existing: String,
        attempted: String,
    },

    #[error("Found two different types with the same name: {name}")]
    DuplicateType { name: String },

    #[error("Invalid name for {what}: \"{name}\". Names must consist of letters, numbers, and underscore, and must not start with a number.")]
    InvalidName { what: String, name: String },

    #[error("Field {type_name}.{field} uses item type {item_type} - item types are addressed by key path and cannot be nested; use an object type instead")]
    ItemTypeAsField {
        type_name: String,
        field: String,
        item_type: String,
    },

    #[error("{name} is already an array, and nested arrays are not supported. Consider making a wrapper type with an object type.")]
    NestedArrays { name: String },

    #[error("Invalid configuration for field {type_name}.{field}: {reason}")]
    InvalidFieldConfig {
        type_name: String,
        field: String,
        reason: String,
    },

    #[error("Invalid option on {type_name}: {reason}")]
    InvalidOption { type_name: String, reason: String },

    #[error("Field {type_name}.{field} reuses a reserved field name")]
    ReservedFieldName { type_name: String, field: String },

    #[error("Enum {enum_name} has a duplicate value: {reason}")]
    DuplicateEnumValue { enum_name: String, reason: String },

    #[error("No field type or type name found for {name}{}", hint_suffix(.hint))]
    UnknownType { name: String, hint: Option<String> },

    #[error("Type {name} was not exported (referenced from {referenced_from}). Please export it alongside the types that use it.")]
    UnexportedType {
        name: String,
        referenced_from: String,
    },

    #[error("Cannot serialize default value: {0}")]
    UnserializableDefault(String),

    #[error("Migration \"{name}\" from version {from_version} failed: {reason}")]
    MigrationFailed {
        from_version: u64,
        name: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!(" (did you mean {}?)", h),
        None => String::new(),
    }
}

impl SchemaError {
    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateTypeDefinition { .. } => ErrorCode::DuplicateTypeDefinition,
            Self::DuplicateType { .. } => ErrorCode::DuplicateType,
            Self::InvalidName { .. } => ErrorCode::InvalidName,
            Self::ItemTypeAsField { .. } => ErrorCode::ItemTypeAsField,
            Self::NestedArrays { .. } => ErrorCode::NestedArrays,
            Self::InvalidFieldConfig { .. } => ErrorCode::InvalidFieldConfig,
            Self::InvalidOption { .. } => ErrorCode::InvalidOption,
            Self::ReservedFieldName { .. } => ErrorCode::ReservedFieldName,
            Self::DuplicateEnumValue { .. } => ErrorCode::DuplicateEnumValue,
            Self::UnknownType { .. } => ErrorCode::UnknownType,
            Self::UnexportedType { .. } => ErrorCode::UnexportedType,
            Self::UnserializableDefault(_) => ErrorCode::UnserializableDefault,
            Self::MigrationFailed { .. } => ErrorCode::MigrationFailed,
            Self::Io(_) => ErrorCode::Io,
            Self::Json(_) => ErrorCode::Json,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    /// Convert into the serializable form carried in a response
    pub fn details(&self) -> ErrorDetails {
        ErrorDetails {
            code: self.code(),
            message: self.to_string(),
        }
    }

    pub(crate) fn invalid_field(
        type_name: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldConfig {
            type_name: type_name.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_option(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

/// Machine-readable error codes, serialized as their `as_str` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "SchemaDuplicateTypeDefinition")]
    DuplicateTypeDefinition,
    #[serde(rename = "SchemaDuplicateType")]
    DuplicateType,
    #[serde(rename = "SchemaInvalidName")]
    InvalidName,
    #[serde(rename = "SchemaItemTypeAsField")]
    ItemTypeAsField,
    #[serde(rename = "SchemaNestedArrays")]
    NestedArrays,
    #[serde(rename = "SchemaInvalidFieldConfig")]
    InvalidFieldConfig,
    #[serde(rename = "SchemaInvalidOption")]
    InvalidOption,
    #[serde(rename = "SchemaReservedFieldName")]
    ReservedFieldName,
    #[serde(rename = "SchemaDuplicateEnumValue")]
    DuplicateEnumValue,
    #[serde(rename = "SchemaUnknownType")]
    UnknownType,
    #[serde(rename = "SchemaUnexportedType")]
    UnexportedType,
    #[serde(rename = "SchemaUnserializableDefault")]
    UnserializableDefault,
    #[serde(rename = "SchemaMigrationFailed")]
    MigrationFailed,
    #[serde(rename = "SchemaIo")]
    Io,
    #[serde(rename = "SchemaJson")]
    Json,
    #[serde(rename = "SchemaConfig")]
    Config,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateTypeDefinition => "SchemaDuplicateTypeDefinition",
            Self::DuplicateType => "SchemaDuplicateType",
            Self::InvalidName => "SchemaInvalidName",
            Self::ItemTypeAsField => "SchemaItemTypeAsField",
            Self::NestedArrays => "SchemaNestedArrays",
            Self::InvalidFieldConfig => "SchemaInvalidFieldConfig",
            Self::InvalidOption => "SchemaInvalidOption",
            Self::ReservedFieldName => "SchemaReservedFieldName",
            Self::DuplicateEnumValue => "SchemaDuplicateEnumValue",
            Self::UnknownType => "SchemaUnknownType",
            Self::UnexportedType => "SchemaUnexportedType",
            Self::UnserializableDefault => "SchemaUnserializableDefault",
            Self::MigrationFailed => "SchemaMigrationFailed",
            Self::Io => "SchemaIo",
            Self::Json => "SchemaJson",
            Self::Config => "SchemaConfig",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serializable error as reported to the caller of a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorDetails {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&SchemaError> for ErrorDetails {
    fn from(err: &SchemaError) -> Self {
        err.details()
    }
}
