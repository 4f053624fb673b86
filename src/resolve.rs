//! Type resolution
//!
//! Walks an alias chain down to the concrete type underneath it, collecting
//! what each link contributes along the way.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, SchemaError};
use crate::registry::TypeRegistry;
use crate::types::{AliasParent, InterpretAs, ScalarKind, SchemaType, TypeId, Validation};

/// The concrete type at the bottom of an alias chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Underlying {
    Scalar(ScalarKind),
    /// An item or object type
    Message(TypeId),
    Enum(TypeId),
}

/// Everything a field needs to know about its (possibly aliased) type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub underlying: Underlying,
    pub repeated: bool,
    /// Root alias first
    pub validations: Vec<Validation>,
    pub interpret_as: Option<InterpretAs>,
}

fn this_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bthis\b").expect("valid regex"))
}

/// Rewrite a whole-value expression to hold for every element of a list
pub fn per_element(expr: &str) -> String {
    format!("this.all(v, {})", this_regex().replace_all(expr, "v"))
}

/// Resolve a type to its underlying kind.
///
/// Pure over the registry: resolving the same type twice gives equal results.
pub fn resolve(registry: &TypeRegistry, id: TypeId) -> Result<TypeInfo> {
    let mut repeated = false;
    let mut interpret_as = None;
    let mut validations = Vec::new();
    let mut visited = HashSet::new();
    let mut current = id;

    let underlying = loop {
        if !visited.insert(current) {
            return Err(SchemaError::UnknownType {
                name: registry.name_of(id).to_string(),
                hint: None,
            });
        }
        match registry.get(current)? {
            SchemaType::Item(_) | SchemaType::Object(_) => break Underlying::Message(current),
            SchemaType::Enum(_) => break Underlying::Enum(current),
            SchemaType::Alias(alias) => {
                repeated |= alias.array;
                if interpret_as.is_none() {
                    interpret_as = alias.interpret_as;
                }
                validations.extend(alias.validations.iter().cloned());
                match alias.parent {
                    AliasParent::Scalar(kind) => break Underlying::Scalar(kind),
                    AliasParent::Type(parent) => current = parent,
                }
            }
        }
    };

    if repeated {
        for v in &mut validations {
            v.valid = per_element(&v.valid);
        }
    }

    Ok(TypeInfo {
        underlying,
        repeated,
        validations,
        interpret_as,
    })
}

/// Every alias on the way down from `id`, topmost first
pub fn alias_chain(registry: &TypeRegistry, id: TypeId) -> Vec<TypeId> {
    let mut chain = Vec::new();
    let mut current = id;
    while let Ok(SchemaType::Alias(alias)) = registry.get(current) {
        if chain.contains(&current) {
            break;
        }
        chain.push(current);
        match alias.parent {
            AliasParent::Type(parent) => current = parent,
            AliasParent::Scalar(_) => break,
        }
    }
    chain
}
