//! Comment bindings
//!
//! Documentation extracted from schema sources by an external tool, attached
//! to a compiled package after assembly. New text goes in front of whatever
//! comment the definition already carried.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::package::SchemaPackage;

/// Which kind of definition a binding documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommentKind {
    ItemType,
    ObjectType,
    EnumType,
    Alias,
}

/// Comments for one type and its fields (or enum values, by short name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentBinding {
    #[serde(rename = "type")]
    pub kind: CommentKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Only documented fields appear here
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

/// Put `new` in front of `existing`, separated by a blank line
pub fn prepend_comment(existing: &str, new: &str) -> String {
    if existing.is_empty() {
        new.to_string()
    } else {
        format!("{}\n\n{}", new, existing)
    }
}

fn apply(target: &mut String, comment: &str) {
    if !comment.is_empty() {
        *target = prepend_comment(target, comment);
    }
}

/// Apply bindings to a package in place. Bindings for unknown names are ignored.
pub fn apply_comment_bindings(package: &mut SchemaPackage, bindings: &[CommentBinding]) {
    let by_name: IndexMap<&str, &CommentBinding> =
        bindings.iter().map(|b| (b.name.as_str(), b)).collect();

    for message in &mut package.messages {
        let Some(binding) = by_name.get(message.type_name.as_str()) else {
            continue;
        };
        if !matches!(binding.kind, CommentKind::ItemType | CommentKind::ObjectType) {
            continue;
        }
        if let Some(comment) = &binding.comment {
            apply(&mut message.comments, comment);
        }
        for (field_name, comment) in &binding.fields {
            if let Some(field) = message.fields.iter_mut().find(|f| &f.field_name == field_name) {
                apply(&mut field.comments, comment);
            }
        }
    }

    for enum_type in &mut package.enums {
        let Some(binding) = by_name.get(enum_type.type_name.as_str()) else {
            continue;
        };
        if binding.kind != CommentKind::EnumType {
            continue;
        }
        if let Some(comment) = &binding.comment {
            apply(&mut enum_type.comments, comment);
        }
        for (short_name, comment) in &binding.fields {
            if let Some(value) = enum_type.value_by_short_name_mut(short_name) {
                apply(&mut value.comments, comment);
            }
        }
    }

    for alias in &mut package.type_aliases {
        let Some(binding) = by_name.get(alias.type_name.as_str()) else {
            continue;
        };
        if binding.kind != CommentKind::Alias {
            continue;
        }
        if let Some(comment) = &binding.comment {
            apply(&mut alias.comments, comment);
        }
    }
}
