//! Message, enum and alias compilers
//!
//! Each compiler turns one registered definition into its descriptor. Field
//! references to other types are recorded on the [`CompileContext`] so the
//! assembler can pull them in or report them.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, SchemaError};
use crate::fields::{compile_field, constraint, type_descriptor};
use crate::package::{
    EnumDescriptor, EnumValueDescriptor, IndexDescriptor, KeyPathDescriptor, MessageDescriptor,
    MessageOptions, SupportedFeatures, TtlDescriptor, TypeAliasDescriptor,
};
use crate::registry::TypeRegistry;
use crate::resolve::resolve;
use crate::types::{
    EnumType, Fields, ItemType, ObjectType, SchemaDefaults, SchemaType, TtlSource, TtlValue,
    TypeAlias, TypeId,
};

/// Comment attached to a synthesized zero value
pub const UNSPECIFIED_COMMENT: &str =
    "Default value, used when the field is unset. Reading it back means \"no value\".";

// =============================================================================
// Context
// =============================================================================

/// A named type reached from a compiled field or alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: TypeId,
    /// `Type.field` or alias name
    pub referenced_from: String,
}

/// State shared by the compilers during one package build
pub struct CompileContext<'a> {
    registry: &'a TypeRegistry,
    package_name: String,
    defaults: SchemaDefaults,
    references: Vec<Reference>,
    aliases: Vec<TypeId>,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        package_name: impl Into<String>,
        defaults: SchemaDefaults,
    ) -> Self {
        Self {
            registry,
            package_name: package_name.into(),
            defaults,
            references: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn defaults(&self) -> &SchemaDefaults {
        &self.defaults
    }

    /// `package.Type`
    pub fn qualified(&self, type_name: &str) -> String {
        format!("{}.{}", self.package_name, type_name)
    }

    pub(crate) fn reference(&mut self, id: TypeId, referenced_from: &str) {
        self.references.push(Reference {
            id,
            referenced_from: referenced_from.to_string(),
        });
    }

    /// Note an alias a field passed through; only emittable aliases are kept
    pub(crate) fn reference_alias(&mut self, id: TypeId, _referenced_from: &str) {
        if let Ok(SchemaType::Alias(alias)) = self.registry.get(id) {
            if !alias.no_alias && !self.aliases.contains(&id) {
                self.aliases.push(id);
            }
        }
    }

    /// Drain the message and enum references recorded so far
    pub fn take_references(&mut self) -> Vec<Reference> {
        std::mem::take(&mut self.references)
    }

    /// Drain the emittable aliases reached so far
    pub fn take_aliases(&mut self) -> Vec<TypeId> {
        std::mem::take(&mut self.aliases)
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// The descriptor form of any definition
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledType {
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
    Alias(TypeAliasDescriptor),
}

/// Compile a registered type. `no_alias` aliases produce nothing.
pub fn compile_type(ctx: &mut CompileContext<'_>, id: TypeId) -> Result<Option<CompiledType>> {
    let compiled = match ctx.registry().get(id)? {
        SchemaType::Item(item) => Some(CompiledType::Message(compile_item_type(ctx, item)?)),
        SchemaType::Object(object) => Some(CompiledType::Message(compile_object_type(ctx, object)?)),
        SchemaType::Enum(enum_type) => Some(CompiledType::Enum(compile_enum_type(enum_type)?)),
        SchemaType::Alias(alias) => compile_alias(ctx, id, alias)?.map(CompiledType::Alias),
    };
    Ok(compiled)
}

// =============================================================================
// Enums
// =============================================================================

/// Compile an enum, synthesizing `<Enum>_UNSPECIFIED = 0` if nothing is zero
pub fn compile_enum_type(enum_type: &EnumType) -> Result<EnumDescriptor> {
    let name = &enum_type.name;
    let mut seen = HashSet::new();
    let mut values = Vec::with_capacity(enum_type.values.len() + 1);

    for (short_name, config) in &enum_type.values {
        if !seen.insert(config.value) {
            return Err(SchemaError::DuplicateEnumValue {
                enum_name: name.clone(),
                reason: format!("{} reuses the value {}", short_name, config.value),
            });
        }
        values.push(EnumValueDescriptor {
            name: format!("{}_{}", name, short_name),
            short_name: short_name.clone(),
            ordinal: config.value,
            comments: config.comments.clone().unwrap_or_default(),
            deprecated: config.deprecated.clone(),
        });
    }

    if !seen.contains(&0) {
        if enum_type.values.contains_key("UNSPECIFIED") {
            return Err(SchemaError::DuplicateEnumValue {
                enum_name: name.clone(),
                reason: "UNSPECIFIED must be 0, or another value must be 0".to_string(),
            });
        }
        values.insert(
            0,
            EnumValueDescriptor {
                name: format!("{}_UNSPECIFIED", name),
                short_name: "UNSPECIFIED".to_string(),
                ordinal: 0,
                comments: UNSPECIFIED_COMMENT.to_string(),
                deprecated: None,
            },
        );
    }

    Ok(EnumDescriptor {
        type_name: name.clone(),
        comments: enum_type.comments.clone().unwrap_or_default(),
        values,
        deprecated: enum_type.deprecated.clone(),
    })
}

// =============================================================================
// Messages
// =============================================================================

fn compile_fields(
    ctx: &mut CompileContext<'_>,
    type_name: &str,
    fields: &Fields,
    reserved_names: &[String],
) -> Result<Vec<crate::package::FieldDescriptor>> {
    if let Some(reused) = reserved_names.iter().find(|r| fields.contains_key(r.as_str())) {
        return Err(SchemaError::ReservedFieldName {
            type_name: type_name.to_string(),
            field: reused.clone(),
        });
    }
    fields
        .iter()
        .map(|(field_name, field)| compile_field(ctx, type_name, field_name, field))
        .collect()
}

/// Compile an object type
pub fn compile_object_type(
    ctx: &mut CompileContext<'_>,
    object: &ObjectType,
) -> Result<MessageDescriptor> {
    Ok(MessageDescriptor {
        type_name: object.name.clone(),
        comments: object.comments.clone().unwrap_or_default(),
        fields: compile_fields(ctx, &object.name, &object.fields, &object.reserved_names)?,
        item_type_options: None,
        deprecated: object.deprecated.clone(),
    })
}

/// Compile an item type, including key paths, TTL and indexes
pub fn compile_item_type(ctx: &mut CompileContext<'_>, item: &ItemType) -> Result<MessageDescriptor> {
    let fields = compile_fields(ctx, &item.name, &item.fields, &item.reserved_names)?;
    let has_field = |path: &str| {
        let head = path.split('.').next().unwrap_or(path);
        item.fields.contains_key(head)
    };

    if item.key_paths.is_empty() {
        return Err(SchemaError::invalid_option(
            &item.name,
            "item types need at least one key path",
        ));
    }
    let defaults = ctx.defaults();
    let mut key_paths = Vec::with_capacity(item.key_paths.len());
    for key_path in &item.key_paths {
        if !key_path.path.starts_with('/') {
            return Err(SchemaError::invalid_option(
                &item.name,
                format!("key path \"{}\" must start with /", key_path.path),
            ));
        }
        for var in key_path_variables(&key_path.path) {
            if !has_field(var) {
                return Err(SchemaError::invalid_option(
                    &item.name,
                    format!(
                        "key path \"{}\" refers to :{} but there is no such field",
                        key_path.path, var
                    ),
                ));
            }
        }
        let syncable = key_path
            .syncable
            .or(item.syncable)
            .or(defaults.syncable)
            .unwrap_or(true);
        let versioned = key_path
            .versioned
            .or(item.versioned)
            .or(defaults.versioned)
            .unwrap_or(true);
        key_paths.push(KeyPathDescriptor {
            path_template: key_path.path.clone(),
            supported_feature_flags: SupportedFeatures::from_flags(versioned, syncable),
        });
    }

    let ttl = match &item.ttl {
        None => None,
        Some(ttl) => {
            match &ttl.value {
                TtlValue::Field(field) if !has_field(field) => {
                    return Err(SchemaError::invalid_option(
                        &item.name,
                        format!("ttl refers to field {} but there is no such field", field),
                    ));
                }
                TtlValue::DurationSeconds(_) if ttl.source == TtlSource::AtTimestamp => {
                    return Err(SchemaError::invalid_option(
                        &item.name,
                        "an atTimestamp ttl needs a field holding the timestamp",
                    ));
                }
                _ => {}
            }
            Some(TtlDescriptor {
                source: ttl.source,
                value: ttl.value.clone(),
            })
        }
    };

    let mut slots: HashMap<u32, &str> = HashMap::new();
    let mut indexes = Vec::with_capacity(item.indexes.len());
    for index in &item.indexes {
        if !(1..=4).contains(&index.group_local_index) {
            return Err(SchemaError::invalid_option(
                &item.name,
                format!(
                    "group-local index slot {} for {} must be between 1 and 4",
                    index.group_local_index, index.field
                ),
            ));
        }
        if let Some(other) = slots.insert(index.group_local_index, &index.field) {
            return Err(SchemaError::invalid_option(
                &item.name,
                format!(
                    "{} and {} both use group-local index slot {}",
                    other, index.field, index.group_local_index
                ),
            ));
        }
        if !has_field(&index.field) {
            return Err(SchemaError::invalid_option(
                &item.name,
                format!("index on {} but there is no such field", index.field),
            ));
        }
        indexes.push(IndexDescriptor {
            property_path: index.field.clone(),
            group_local_index: index.group_local_index,
        });
    }

    Ok(MessageDescriptor {
        type_name: item.name.clone(),
        comments: item.comments.clone().unwrap_or_default(),
        fields,
        item_type_options: Some(MessageOptions {
            key_paths,
            ttl,
            indexes,
        }),
        deprecated: item.deprecated.clone(),
    })
}

fn key_path_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r":([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)")
            .expect("valid key path regex")
    })
}

/// Property paths named by `:var` segments of a key path template
pub fn key_path_variables(template: &str) -> Vec<&str> {
    key_path_var_regex()
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

// =============================================================================
// Aliases
// =============================================================================

/// Compile an alias. `no_alias` aliases are never emitted.
pub fn compile_alias(
    ctx: &mut CompileContext<'_>,
    id: TypeId,
    alias: &TypeAlias,
) -> Result<Option<TypeAliasDescriptor>> {
    if alias.no_alias {
        return Ok(None);
    }
    let info = resolve(ctx.registry(), id)?;
    let element_type = type_descriptor(ctx, &info, &alias.name)?;
    let validations = info
        .validations
        .into_iter()
        .map(|v| constraint(&alias.name, "Type", v))
        .collect();
    Ok(Some(TypeAliasDescriptor {
        type_name: alias.name.clone(),
        element_type,
        comments: alias.comments.clone().unwrap_or_default(),
        validations,
        deprecated: alias.deprecated.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use crate::package::TypeDescriptor;
    use crate::types::{AliasOptions, Field, KeyPathConfig, ScalarKind};
    use rstest::rstest;

    fn state(values: &[(&str, i32)]) -> EnumType {
        values
            .iter()
            .fold(EnumType::new("State"), |e, (name, v)| e.value(*name, *v))
    }

    #[test]
    fn test_enum_zero_value_synthesized() {
        let desc = compile_enum_type(&state(&[("Active", 1), ("Archived", 2)])).unwrap();
        let names: Vec<_> = desc.values.iter().map(|v| (v.name.as_str(), v.ordinal)).collect();
        assert_eq!(
            names,
            vec![("State_UNSPECIFIED", 0), ("State_Active", 1), ("State_Archived", 2)]
        );
        assert_eq!(desc.values[0].comments, UNSPECIFIED_COMMENT);
        assert_eq!(desc.value_by_short_name("Active").unwrap().ordinal, 1);
    }

    #[test]
    fn test_enum_with_zero_value() {
        let desc = compile_enum_type(&state(&[("Pending", 0), ("Active", 1)])).unwrap();
        assert_eq!(desc.values.len(), 2);
        assert_eq!(desc.values[0].name, "State_Pending");
    }

    #[test]
    fn test_enum_unspecified_collision() {
        let err = compile_enum_type(&state(&[("UNSPECIFIED", 3)])).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaDuplicateEnumValue");
    }

    fn person() -> ItemType {
        ItemType::new("Person")
            .key_path("/people-:id")
            .field("id", Field::new(Deferred::named("uint")))
            .field("name", Field::new(Deferred::named("string")))
    }

    fn compile_item(item: ItemType, defaults: SchemaDefaults) -> Result<MessageDescriptor> {
        let registry = TypeRegistry::with_known_types();
        let mut ctx = CompileContext::new(&registry, "pkg", defaults);
        compile_item_type(&mut ctx, &item)
    }

    #[test]
    fn test_item_type_fields_in_order() {
        let desc = compile_item(person(), SchemaDefaults::default()).unwrap();
        let names: Vec<_> = desc.fields.iter().map(|f| f.field_name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        let options = desc.item_type_options.unwrap();
        assert_eq!(options.key_paths[0].path_template, "/people-:id");
        assert_eq!(
            options.key_paths[0].supported_feature_flags,
            SupportedFeatures::from_flags(true, true)
        );
    }

    #[rstest]
    #[case(None, None, None, true)]
    #[case(None, None, Some(false), false)]
    #[case(None, Some(true), Some(false), true)]
    #[case(Some(false), Some(true), Some(true), false)]
    fn test_key_path_flag_resolution(
        #[case] key_path: Option<bool>,
        #[case] item: Option<bool>,
        #[case] schema: Option<bool>,
        #[case] expected: bool,
    ) {
        let mut item_type = person();
        item_type.key_paths = vec![KeyPathConfig {
            path: "/people-:id".into(),
            syncable: key_path,
            versioned: None,
        }];
        item_type.syncable = item;
        let defaults = SchemaDefaults {
            syncable: schema,
            ..Default::default()
        };
        let desc = compile_item(item_type, defaults).unwrap();
        let flags = desc.item_type_options.unwrap().key_paths[0].supported_feature_flags;
        assert_eq!(flags.syncable(), expected);
        assert!(flags.versioned());
    }

    #[test]
    fn test_key_path_must_name_a_field() {
        let item = person().key_path("/people-:missing");
        let err = compile_item(item, SchemaDefaults::default()).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaInvalidOption");
        assert!(err.to_string().contains(":missing"));
    }

    #[test]
    fn test_reserved_name_collision() {
        let err = compile_item(person().reserved("name"), SchemaDefaults::default()).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaReservedFieldName");
    }

    #[test]
    fn test_index_slots() {
        let ok = compile_item(person().index(1, "name"), SchemaDefaults::default()).unwrap();
        assert_eq!(ok.item_type_options.unwrap().indexes[0].property_path, "name");

        let dup = person().index(1, "name").index(1, "id");
        assert!(compile_item(dup, SchemaDefaults::default()).is_err());
        assert!(compile_item(person().index(5, "name"), SchemaDefaults::default()).is_err());
        assert!(compile_item(person().index(2, "nope"), SchemaDefaults::default()).is_err());
    }

    #[test]
    fn test_ttl() {
        let item = person()
            .field("expires", Field::new(Deferred::named("timestampSeconds")))
            .ttl(TtlSource::AtTimestamp, TtlValue::Field("expires".into()));
        let desc = compile_item(item, SchemaDefaults::default()).unwrap();
        assert_eq!(
            desc.item_type_options.unwrap().ttl.unwrap().source,
            TtlSource::AtTimestamp
        );

        let bad = person().ttl(TtlSource::AtTimestamp, TtlValue::DurationSeconds(60));
        assert!(compile_item(bad, SchemaDefaults::default()).is_err());
        let missing = person().ttl(TtlSource::FromCreated, TtlValue::Field("nope".into()));
        assert!(compile_item(missing, SchemaDefaults::default()).is_err());
    }

    #[test]
    fn test_item_type_requires_key_path() {
        let mut item = person();
        item.key_paths.clear();
        assert!(compile_item(item, SchemaDefaults::default()).is_err());
    }

    #[test]
    fn test_alias_compiles_unless_no_alias() {
        let mut registry = TypeRegistry::with_known_types();
        let email = registry
            .alias(
                "Email",
                ScalarKind::String,
                AliasOptions::default().valid("this.contains('@')"),
            )
            .unwrap();
        let mut ctx = CompileContext::new(&registry, "pkg", SchemaDefaults::default());
        let desc = match compile_type(&mut ctx, email).unwrap() {
            Some(CompiledType::Alias(desc)) => desc,
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(desc.element_type, TypeDescriptor::String { interpret_as: None });
        assert_eq!(desc.validations[0].id, "Email");

        let uuid = registry.find("uuid").unwrap();
        assert_eq!(compile_type(&mut ctx, uuid).unwrap(), None);
    }

    #[test]
    fn test_key_path_variables() {
        assert_eq!(key_path_variables("/a-:id/b-:meta.owner"), vec!["id", "meta.owner"]);
        assert!(key_path_variables("/static").is_empty());
    }
}
