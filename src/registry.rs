//! Type Registry
//!
//! Interning table for one compilation run. The registry serves three
//! purposes:
//!
//! 1. It rejects a second, different definition under a name that is already
//!    taken (usually a copy/paste mistake).
//! 2. It allows self-referential types. A type's identity can be reserved with
//!    [`TypeRegistry::declare`] before its body exists, so fields can hold a
//!    stable [`TypeId`] for a type that is still being built.
//! 3. It interns definitions, so each named type has exactly one canonical
//!    instance and can be compared by handle.
//!
//! A registry is an explicit value. Independent compilations use independent
//! registries; [`TypeRegistry::clear`] resets one for reuse.

use std::collections::HashMap;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::types::{
    is_valid_name, AliasOptions, AliasParent, EnumType, ItemType, ObjectType, SchemaType,
    TypeAlias, TypeId, TypeKind,
};

#[derive(Debug, Clone)]
struct RegistryEntry {
    name: String,
    kind: TypeKind,
    /// `None` between `declare` and `define`
    body: Option<SchemaType>,
}

/// Arena of schema types keyed by name
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entries: Vec<RegistryEntry>,
    by_name: HashMap<String, TypeId>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the well-known types
    pub fn with_known_types() -> Self {
        let mut registry = Self::new();
        crate::known_types::register_known_types(&mut registry);
        registry
    }

    /// Drop every registered type
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_name.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Reserve an identity for a type whose body will be supplied later.
    ///
    /// Declaring the same name and kind twice returns the same handle.
    pub fn declare(&mut self, name: impl Into<String>, kind: TypeKind) -> Result<TypeId> {
        let name = name.into();
        if kind != TypeKind::Alias && !is_valid_name(&name) {
            return Err(SchemaError::InvalidName {
                what: kind.to_string(),
                name,
            });
        }
        if let Some(&id) = self.by_name.get(&name) {
            let existing = self.entries[id.index()].kind;
            if existing != kind {
                return Err(SchemaError::DuplicateTypeDefinition {
                    name,
                    existing: existing.to_string(),
                    attempted: kind.to_string(),
                });
            }
            return Ok(id);
        }
        let id = TypeId::from_index(self.entries.len());
        debug!(name = %name, kind = %kind, "declared type");
        self.entries.push(RegistryEntry {
            name: name.clone(),
            kind,
            body: None,
        });
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Populate a declared type through its handle
    pub fn define(&mut self, id: TypeId, body: impl Into<SchemaType>) -> Result<TypeId> {
        let body = body.into();
        let entry = self.entries.get(id.index()).ok_or_else(|| SchemaError::UnknownType {
            name: body.name().to_string(),
            hint: None,
        })?;
        if entry.name != body.name() {
            return Err(SchemaError::invalid_option(
                &entry.name,
                format!("defined through a handle declared as \"{}\" but named \"{}\"", entry.name, body.name()),
            ));
        }
        self.intern(body)
    }

    /// Create a type, or return the interned one if an equal definition exists
    pub fn get_or_create(&mut self, body: impl Into<SchemaType>) -> Result<TypeId> {
        let body = body.into();
        if body.kind() != TypeKind::Alias && !is_valid_name(body.name()) {
            return Err(SchemaError::InvalidName {
                what: body.kind().to_string(),
                name: body.name().to_string(),
            });
        }
        self.intern(body)
    }

    fn intern(&mut self, body: SchemaType) -> Result<TypeId> {
        let name = body.name().to_string();
        let kind = body.kind();
        let id = self.declare(name.clone(), kind)?;
        let entry = &mut self.entries[id.index()];
        match &entry.body {
            None => {
                debug!(name = %name, kind = %kind, "registered type");
                entry.body = Some(body);
                Ok(id)
            }
            Some(existing) if existing.same_shape(&body) => Ok(id),
            Some(existing) => Err(SchemaError::DuplicateTypeDefinition {
                name,
                existing: existing.kind().to_string(),
                attempted: kind.to_string(),
            }),
        }
    }

    /// Register an item type
    pub fn item_type(&mut self, item: ItemType) -> Result<TypeId> {
        self.get_or_create(item)
    }

    /// Register an object type
    pub fn object_type(&mut self, object: ObjectType) -> Result<TypeId> {
        self.get_or_create(object)
    }

    /// Register an enum type, checking value names and ordinals up front
    pub fn enum_type(&mut self, enum_type: EnumType) -> Result<TypeId> {
        if !is_valid_name(&enum_type.name) {
            return Err(SchemaError::InvalidName {
                what: "enum".to_string(),
                name: enum_type.name,
            });
        }
        let mut seen: HashMap<i32, &str> = HashMap::new();
        for (value_name, config) in &enum_type.values {
            if !is_valid_name(value_name) {
                return Err(SchemaError::InvalidName {
                    what: "enum value".to_string(),
                    name: format!("{}.{}", enum_type.name, value_name),
                });
            }
            if let Some(other) = seen.insert(config.value, value_name) {
                return Err(SchemaError::DuplicateEnumValue {
                    enum_name: enum_type.name.clone(),
                    reason: format!(
                        "{} and {} both use the value {}",
                        other, value_name, config.value
                    ),
                });
            }
        }
        self.get_or_create(enum_type)
    }

    /// Register a named alias over a scalar or another type
    pub fn alias(
        &mut self,
        name: impl Into<String>,
        parent: impl Into<AliasParent>,
        options: AliasOptions,
    ) -> Result<TypeId> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(SchemaError::InvalidName {
                what: "type".to_string(),
                name,
            });
        }
        let parent = parent.into();
        if let AliasParent::Type(id) = parent {
            self.check_handle(id)?;
        }
        self.intern(TypeAlias::new(name, parent, options).into())
    }

    /// Register the list form of a type, named `"<inner>[]"`.
    ///
    /// Lists of lists are not supported.
    pub fn array_of(&mut self, inner: TypeId) -> Result<TypeId> {
        self.check_handle(inner)?;
        let entry = &self.entries[inner.index()];
        if entry.kind == TypeKind::Alias {
            match &entry.body {
                Some(SchemaType::Alias(alias)) if alias.array => {
                    return Err(SchemaError::NestedArrays {
                        name: entry.name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    return Err(SchemaError::UnknownType {
                        name: entry.name.clone(),
                        hint: None,
                    });
                }
            }
        }
        let mut alias = TypeAlias::new(
            format!("{}[]", entry.name),
            inner,
            AliasOptions::default().no_alias(),
        );
        alias.array = true;
        self.intern(alias.into())
    }

    /// Register a built-in type without the identifier check
    pub(crate) fn register_builtin(&mut self, alias: TypeAlias) -> TypeId {
        let name = alias.name.clone();
        match self.intern(alias.into()) {
            Ok(id) => id,
            // built-ins are registered first into a fresh registry
            Err(_) => self.by_name[&name],
        }
    }

    fn check_handle(&self, id: TypeId) -> Result<()> {
        if id.index() < self.entries.len() {
            Ok(())
        } else {
            Err(SchemaError::UnknownType {
                name: format!("#{}", id.index()),
                hint: None,
            })
        }
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// The definition behind a handle. Declared-but-undefined types are unknown.
    pub fn get(&self, id: TypeId) -> Result<&SchemaType> {
        let entry = self.entries.get(id.index()).ok_or_else(|| SchemaError::UnknownType {
            name: format!("#{}", id.index()),
            hint: None,
        })?;
        entry.body.as_ref().ok_or_else(|| SchemaError::UnknownType {
            name: entry.name.clone(),
            hint: None,
        })
    }

    pub fn name_of(&self, id: TypeId) -> &str {
        self.entries
            .get(id.index())
            .map(|e| e.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn kind_of(&self, id: TypeId) -> Option<TypeKind> {
        self.entries.get(id.index()).map(|e| e.kind)
    }

    /// Handle for a name, if registered
    pub fn find(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Handle for a name, failing with a "did you mean" hint
    pub fn lookup(&self, name: &str) -> Result<TypeId> {
        self.find(name).ok_or_else(|| SchemaError::UnknownType {
            name: name.to_string(),
            hint: self.suggest(name),
        })
    }

    /// Closest registered name to `query`
    pub fn suggest(&self, query: &str) -> Option<String> {
        let matcher = SkimMatcherV2::default();
        self.entries
            .iter()
            .filter_map(|e| matcher.fuzzy_match(&e.name, query).map(|score| (score, &e.name)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, name)| name.clone())
    }

    /// All defined types in registration order
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &SchemaType)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.body.as_ref().map(|b| (TypeId::from_index(i), b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use crate::types::{Field, ScalarKind};

    fn person(registry: &mut TypeRegistry, name_field: &str) -> Result<TypeId> {
        let string = registry.find("string").unwrap();
        registry.item_type(
            ItemType::new("Person")
                .key_path("/people-:id")
                .field("id", Field::new(string))
                .field(name_field, Field::new(Deferred::named("string"))),
        )
    }

    #[test]
    fn test_idempotent_redeclaration() {
        let mut registry = TypeRegistry::with_known_types();
        let a = person(&mut registry, "name").unwrap();
        let b = person(&mut registry, "name").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_conflicting_shape() {
        let mut registry = TypeRegistry::with_known_types();
        person(&mut registry, "name").unwrap();
        let err = person(&mut registry, "full_name").unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaDuplicateTypeDefinition");
    }

    #[test]
    fn test_conflicting_kind() {
        let mut registry = TypeRegistry::new();
        registry.object_type(ObjectType::new("Thing")).unwrap();
        let err = registry
            .enum_type(EnumType::new("Thing").value("A", 1))
            .unwrap_err();
        match err {
            SchemaError::DuplicateTypeDefinition {
                existing, attempted, ..
            } => {
                assert_eq!(existing, "objectType");
                assert_eq!(attempted, "enumType");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_declare_then_define_self_reference() {
        let mut registry = TypeRegistry::with_known_types();
        let node = registry.declare("Node", TypeKind::Object).unwrap();
        let children = registry.array_of(node).unwrap();
        let defined = registry
            .define(
                node,
                ObjectType::new("Node").field("children", Field::new(children)),
            )
            .unwrap();
        assert_eq!(node, defined);
        assert!(registry.get(node).is_ok());
        assert_eq!(registry.name_of(children), "Node[]");
    }

    #[test]
    fn test_undefined_declaration_is_unknown() {
        let mut registry = TypeRegistry::new();
        let id = registry.declare("Later", TypeKind::Object).unwrap();
        assert_eq!(
            registry.get(id).unwrap_err().code().as_str(),
            "SchemaUnknownType"
        );
    }

    #[test]
    fn test_nested_arrays_rejected() {
        let mut registry = TypeRegistry::with_known_types();
        let string = registry.find("string").unwrap();
        let strings = registry.array_of(string).unwrap();
        let err = registry.array_of(strings).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaNestedArrays");
    }

    #[test]
    fn test_invalid_names() {
        let mut registry = TypeRegistry::new();
        assert!(registry.object_type(ObjectType::new("1Bad")).is_err());
        assert!(registry
            .alias("bad name", ScalarKind::String, AliasOptions::default())
            .is_err());
        assert!(registry
            .enum_type(EnumType::new("Good").value("bad-value", 1))
            .is_err());
    }

    #[test]
    fn test_duplicate_enum_ordinal() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .enum_type(EnumType::new("State").value("A", 1).value("B", 1))
            .unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaDuplicateEnumValue");
    }

    #[test]
    fn test_lookup_suggests_close_name() {
        let mut registry = TypeRegistry::new();
        registry.object_type(ObjectType::new("Address")).unwrap();
        match registry.lookup("Adress").unwrap_err() {
            SchemaError::UnknownType { hint, .. } => {
                assert_eq!(hint.as_deref(), Some("Address"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_clear_starts_fresh() {
        let mut registry = TypeRegistry::with_known_types();
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.find("string").is_none());
    }
}
