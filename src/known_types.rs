//! Well-known types
//!
//! Built-in aliases every schema can use by name. They are all `no_alias`, so
//! they never appear in a package as aliases of their own; fields using them
//! resolve straight to the scalar plus whatever hint and validation the
//! built-in adds.

use crate::registry::TypeRegistry;
use crate::types::{AliasOptions, AliasParent, InterpretAs, ScalarKind, TypeAlias};

fn builtin(registry: &mut TypeRegistry, name: &str, parent: impl Into<AliasParent>, options: AliasOptions) {
    registry.register_builtin(TypeAlias::new(name, parent, options.no_alias()));
}

/// Register the well-known types into `registry`
pub fn register_known_types(registry: &mut TypeRegistry) {
    let plain = AliasOptions::default;

    builtin(registry, "bool", ScalarKind::Bool, plain());
    builtin(registry, "string", ScalarKind::String, plain());
    builtin(registry, "int", ScalarKind::Sint64, plain());
    builtin(registry, "uint", ScalarKind::Uint64, plain());
    builtin(registry, "int32", ScalarKind::Sint32, plain());
    builtin(registry, "uint32", ScalarKind::Uint32, plain());
    builtin(registry, "double", ScalarKind::Double, plain());
    builtin(registry, "float", ScalarKind::Float, plain());
    builtin(registry, "byte[]", ScalarKind::Bytes, plain());

    builtin(
        registry,
        "uuid",
        ScalarKind::Bytes,
        plain()
            .interpret_as(InterpretAs::Uuid)
            .valid("size(this) == 0 || size(this) == 16"),
    );
    builtin(registry, "url", ScalarKind::String, plain().interpret_as(InterpretAs::Url));
    builtin(
        registry,
        "keyPath",
        ScalarKind::String,
        plain().interpret_as(InterpretAs::KeyPath),
    );

    let numeric = [
        ("timestampSeconds", ScalarKind::Sint64, InterpretAs::TimestampSeconds),
        ("timestampMilliseconds", ScalarKind::Sint64, InterpretAs::TimestampMilliseconds),
        ("timestampMicroseconds", ScalarKind::Sint64, InterpretAs::TimestampMicroseconds),
        ("futureTimestampMicroseconds", ScalarKind::Uint64, InterpretAs::TimestampMicroseconds),
        ("durationSeconds", ScalarKind::Sint64, InterpretAs::DurationSeconds),
        ("durationMilliseconds", ScalarKind::Sint64, InterpretAs::DurationMilliseconds),
    ];
    for (name, scalar, hint) in numeric {
        builtin(registry, name, scalar, plain().interpret_as(hint));
    }
}

/// Names of every well-known type
pub const KNOWN_TYPE_NAMES: &[&str] = &[
    "bool",
    "string",
    "int",
    "uint",
    "int32",
    "uint32",
    "double",
    "float",
    "byte[]",
    "uuid",
    "url",
    "keyPath",
    "timestampSeconds",
    "timestampMilliseconds",
    "timestampMicroseconds",
    "futureTimestampMicroseconds",
    "durationSeconds",
    "durationMilliseconds",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SchemaType;

    #[test]
    fn test_all_known_types_registered() {
        let registry = TypeRegistry::with_known_types();
        for name in KNOWN_TYPE_NAMES {
            let id = registry.lookup(name).unwrap();
            match registry.get(id).unwrap() {
                SchemaType::Alias(alias) => assert!(alias.no_alias, "{name} should be no_alias"),
                other => panic!("{name} is not an alias: {other:?}"),
            }
        }
        assert_eq!(registry.len(), KNOWN_TYPE_NAMES.len());
    }

    #[test]
    fn test_registering_twice_is_idempotent() {
        let mut registry = TypeRegistry::with_known_types();
        let before = registry.len();
        register_known_types(&mut registry);
        assert_eq!(registry.len(), before);
    }
}
