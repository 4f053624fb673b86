//! Field compiler
//!
//! Turns one declared field into a [`FieldDescriptor`]: resolves its type,
//! enforces the per-field rules, and emits constraints.

use crate::compile::CompileContext;
use crate::error::{Result, SchemaError};
use crate::package::{Constraint, FieldDescriptor, TypeDescriptor, ValueOption};
use crate::resolve::{alias_chain, resolve, TypeInfo, Underlying};
use crate::stringify::stringify_default;
use crate::types::{
    is_valid_name, Field, FromMetadata, InitialValue, InterpretAs, ScalarKind, SchemaType,
    Validation,
};

/// Compile `type_name.field_name`
pub fn compile_field(
    ctx: &mut CompileContext<'_>,
    type_name: &str,
    field_name: &str,
    field: &Field,
) -> Result<FieldDescriptor> {
    if !is_valid_name(field_name) {
        return Err(SchemaError::InvalidName {
            what: "field".to_string(),
            name: format!("{}.{}", type_name, field_name),
        });
    }

    let value_option = match (field.from_metadata, field.initial_value) {
        (Some(_), Some(_)) => {
            return Err(SchemaError::invalid_field(
                type_name,
                field_name,
                "only one of fromMetadata and initialValue may be set",
            ));
        }
        (Some(source), None) => Some(ValueOption::FromMetadata(source)),
        (None, Some(generator)) => Some(ValueOption::InitialValue(generator)),
        (None, None) => None,
    };

    let registry = ctx.registry();
    let type_id = field.field_type.force(registry)?;
    let info = resolve(registry, type_id)?;
    if let Underlying::Message(id) = info.underlying {
        if let SchemaType::Item(item) = registry.get(id)? {
            return Err(SchemaError::ItemTypeAsField {
                type_name: type_name.to_string(),
                field: field_name.to_string(),
                item_type: item.name.clone(),
            });
        }
    }

    let path = format!("{}.{}", type_name, field_name);
    for alias in alias_chain(registry, type_id) {
        ctx.reference_alias(alias, &path);
    }
    let field_type = type_descriptor(ctx, &info, &path)?;

    if let Some(option) = value_option {
        check_value_option(type_name, field_name, option, &info)?;
    }
    let ephemeral = value_option.is_some();
    let is_bool = info.underlying == Underlying::Scalar(ScalarKind::Bool) && !info.repeated;

    if field.required == Some(true) {
        if is_bool {
            return Err(SchemaError::invalid_field(
                type_name,
                field_name,
                "bool fields cannot be required, since false is their zero value; leave required unset",
            ));
        }
        if ephemeral {
            return Err(SchemaError::invalid_field(
                type_name,
                field_name,
                "fields filled in by fromMetadata or initialValue cannot be required",
            ));
        }
    }
    let require_non_zero = !ephemeral && !is_bool && field.required != Some(false);

    let read_default = stringify_default(field.read_default.as_ref())?;
    if read_default.is_some() && !require_non_zero {
        return Err(SchemaError::invalid_field(
            type_name,
            field_name,
            "readDefault is only allowed on required fields",
        ));
    }

    let validations = info
        .validations
        .iter()
        .cloned()
        .chain(field.valid.iter().map(|v| Validation::new(v.as_str())))
        .map(|v| constraint(field_name, "Field", v))
        .collect();

    Ok(FieldDescriptor {
        field_name: field_name.to_string(),
        comments: field.comments.clone().unwrap_or_default(),
        require_non_zero,
        validations,
        field_type,
        read_default,
        value_option,
        deprecated: field.deprecated.clone(),
    })
}

/// One constraint per validation, identified by the owning field or alias
pub(crate) fn constraint(id: &str, owner_kind: &str, validation: Validation) -> Constraint {
    let message = if validation.message.is_empty() {
        format!("{} {} is invalid", owner_kind, id)
    } else {
        validation.message
    };
    Constraint {
        id: id.to_string(),
        message,
        expression: validation.valid,
    }
}

/// Descriptor for a resolved type, recording any named reference it makes
pub(crate) fn type_descriptor(
    ctx: &mut CompileContext<'_>,
    info: &TypeInfo,
    referenced_from: &str,
) -> Result<TypeDescriptor> {
    let element = match info.underlying {
        Underlying::Scalar(kind) => scalar_descriptor(kind, info.interpret_as, referenced_from)?,
        Underlying::Message(id) | Underlying::Enum(id) => {
            ctx.reference(id, referenced_from);
            TypeDescriptor::ReferenceByName(ctx.qualified(ctx.registry().name_of(id)))
        }
    };
    Ok(if info.repeated {
        TypeDescriptor::List {
            element_type: Box::new(element),
        }
    } else {
        element
    })
}

/// Scalar descriptor, checking the hint suits the scalar
pub(crate) fn scalar_descriptor(
    kind: ScalarKind,
    interpret_as: Option<InterpretAs>,
    owner: &str,
) -> Result<TypeDescriptor> {
    let compatible = match interpret_as {
        None => true,
        Some(hint) => match kind {
            ScalarKind::Bool => false,
            ScalarKind::String => matches!(hint, InterpretAs::KeyPath | InterpretAs::Url),
            ScalarKind::Bytes => hint == InterpretAs::Uuid,
            _ => hint.is_timestamp() || hint.is_duration(),
        },
    };
    if !compatible {
        return Err(SchemaError::invalid_option(
            owner,
            format!("interpretAs {:?} cannot be used with {:?}", interpret_as, kind),
        ));
    }
    Ok(match kind {
        ScalarKind::Bool => TypeDescriptor::Bool,
        ScalarKind::String => TypeDescriptor::String { interpret_as },
        ScalarKind::Bytes => TypeDescriptor::Binary { interpret_as },
        _ => TypeDescriptor::Number { kind, interpret_as },
    })
}

fn check_value_option(
    type_name: &str,
    field_name: &str,
    option: ValueOption,
    info: &TypeInfo,
) -> Result<()> {
    let scalar = match info.underlying {
        Underlying::Scalar(kind) if !info.repeated => Some(kind),
        _ => None,
    };
    let number = scalar.filter(|k| k.is_number());

    let (ok, expected) = match option {
        ValueOption::FromMetadata(FromMetadata::CreatedAtTime)
        | ValueOption::FromMetadata(FromMetadata::LastModifiedAtTime) => (
            number.is_some() && info.interpret_as.is_some_and(InterpretAs::is_timestamp),
            "a timestamp type",
        ),
        ValueOption::FromMetadata(FromMetadata::CreatedAtVersion)
        | ValueOption::FromMetadata(FromMetadata::LastModifiedAtVersion) => (
            number.is_some_and(ScalarKind::is_unsigned_64),
            "a uint type",
        ),
        ValueOption::FromMetadata(FromMetadata::Ttl) => (number.is_some(), "a number type"),
        ValueOption::InitialValue(InitialValue::Uuid) => (
            scalar == Some(ScalarKind::Bytes) && info.interpret_as == Some(InterpretAs::Uuid),
            "the uuid type",
        ),
        ValueOption::InitialValue(InitialValue::Sequence)
        | ValueOption::InitialValue(InitialValue::Rand53) => {
            (number.is_some_and(ScalarKind::is_integer), "an integer type")
        }
    };
    if ok {
        Ok(())
    } else {
        Err(SchemaError::invalid_field(
            type_name,
            field_name,
            format!("{:?} requires {}", option, expected),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use crate::registry::TypeRegistry;
    use crate::types::{AliasOptions, ItemType, ObjectType, SchemaDefaults};
    use rstest::rstest;

    fn compile(registry: &TypeRegistry, field: Field) -> Result<FieldDescriptor> {
        let mut ctx = CompileContext::new(registry, "pkg", SchemaDefaults::default());
        compile_field(&mut ctx, "Thing", "value", &field)
    }

    fn known(name: &str) -> Field {
        Field::new(Deferred::named(name))
    }

    #[test]
    fn test_scalar_field_defaults_to_required() {
        let registry = TypeRegistry::with_known_types();
        let desc = compile(&registry, known("string")).unwrap();
        assert!(desc.require_non_zero);
        assert_eq!(desc.field_type, TypeDescriptor::String { interpret_as: None });

        let optional = compile(&registry, known("string").optional()).unwrap();
        assert!(!optional.require_non_zero);
    }

    #[test]
    fn test_bool_required_rejected() {
        let registry = TypeRegistry::with_known_types();
        let err = compile(&registry, known("bool").required(true)).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaInvalidFieldConfig");
        assert!(err.to_string().contains("Thing.value"));

        let desc = compile(&registry, known("bool")).unwrap();
        assert!(!desc.require_non_zero);
        assert_eq!(desc.field_type, TypeDescriptor::Bool);
    }

    #[test]
    fn test_value_options_are_exclusive() {
        let registry = TypeRegistry::with_known_types();
        let field = known("uint")
            .from_metadata(FromMetadata::CreatedAtVersion)
            .initial_value(InitialValue::Sequence);
        let err = compile(&registry, field).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaInvalidFieldConfig");
    }

    #[rstest]
    #[case("timestampSeconds", ValueOption::FromMetadata(FromMetadata::CreatedAtTime), true)]
    #[case("int", ValueOption::FromMetadata(FromMetadata::CreatedAtTime), false)]
    #[case("uint", ValueOption::FromMetadata(FromMetadata::LastModifiedAtVersion), true)]
    #[case("int", ValueOption::FromMetadata(FromMetadata::LastModifiedAtVersion), false)]
    #[case("durationSeconds", ValueOption::FromMetadata(FromMetadata::Ttl), true)]
    #[case("string", ValueOption::FromMetadata(FromMetadata::Ttl), false)]
    #[case("uuid", ValueOption::InitialValue(InitialValue::Uuid), true)]
    #[case("byte[]", ValueOption::InitialValue(InitialValue::Uuid), false)]
    #[case("uint", ValueOption::InitialValue(InitialValue::Sequence), true)]
    #[case("double", ValueOption::InitialValue(InitialValue::Rand53), false)]
    fn test_value_option_type_checks(
        #[case] type_name: &str,
        #[case] option: ValueOption,
        #[case] ok: bool,
    ) {
        let registry = TypeRegistry::with_known_types();
        let field = match option {
            ValueOption::FromMetadata(source) => known(type_name).from_metadata(source),
            ValueOption::InitialValue(generator) => known(type_name).initial_value(generator),
        };
        let result = compile(&registry, field);
        assert_eq!(result.is_ok(), ok, "{type_name} with {option:?}: {result:?}");
        if let Ok(desc) = result {
            assert!(desc.is_ephemeral());
            assert!(!desc.require_non_zero);
        }
    }

    #[test]
    fn test_item_type_as_field_rejected() {
        let mut registry = TypeRegistry::with_known_types();
        let id = registry.find("string").unwrap();
        let item = registry
            .item_type(
                ItemType::new("Person")
                    .key_path("/p-:id")
                    .field("id", Field::new(id)),
            )
            .unwrap();
        let err = compile(&registry, Field::new(item)).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaItemTypeAsField");
        assert!(err.to_string().contains("Thing.value"));
        assert!(err.to_string().contains("Person"));

        let list = registry.array_of(item).unwrap();
        assert!(compile(&registry, Field::new(list)).is_err());
    }

    #[test]
    fn test_constraints_combine_type_and_field() {
        let mut registry = TypeRegistry::with_known_types();
        let string = registry.find("string").unwrap();
        let name = registry
            .alias("name", string, AliasOptions::default().valid("size(this) > 0"))
            .unwrap();
        let desc = compile(&registry, Field::new(name).valid("size(this) < 64")).unwrap();
        let exprs: Vec<_> = desc.validations.iter().map(|c| c.expression.as_str()).collect();
        assert_eq!(exprs, vec!["size(this) > 0", "size(this) < 64"]);
        assert!(desc.validations.iter().all(|c| c.id == "value"));
        assert_eq!(desc.validations[0].message, "Field value is invalid");
    }

    #[test]
    fn test_reference_is_namespaced_and_recorded() {
        let mut registry = TypeRegistry::with_known_types();
        let point = registry.object_type(ObjectType::new("Point")).unwrap();
        let points = registry.array_of(point).unwrap();

        let mut ctx = CompileContext::new(&registry, "pkg", SchemaDefaults::default());
        let desc = compile_field(&mut ctx, "Shape", "points", &Field::new(points)).unwrap();
        assert_eq!(desc.field_type.reference(), Some("pkg.Point"));
        assert!(desc.field_type.is_list());
        let refs = ctx.take_references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, point);
        assert_eq!(refs[0].referenced_from, "Shape.points");
    }

    #[test]
    fn test_read_default() {
        let registry = TypeRegistry::with_known_types();
        let desc = compile(&registry, known("int").read_default(42i32)).unwrap();
        assert_eq!(desc.read_default.as_deref(), Some("42"));

        let err = compile(&registry, known("int").optional().read_default(42i32)).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaInvalidFieldConfig");
    }

    #[test]
    fn test_incompatible_interpret_as() {
        let mut registry = TypeRegistry::new();
        let bad = registry
            .alias(
                "weird",
                ScalarKind::String,
                AliasOptions::default().interpret_as(InterpretAs::Uuid),
            )
            .unwrap();
        let err = compile(&registry, Field::new(bad)).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaInvalidOption");
    }

    #[test]
    fn test_invalid_field_name() {
        let registry = TypeRegistry::with_known_types();
        let mut ctx = CompileContext::new(&registry, "pkg", SchemaDefaults::default());
        let err = compile_field(&mut ctx, "Thing", "bad name", &known("string")).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaInvalidName");
    }
}
