//! Build driver
//!
//! Runs one full build: assemble the exported types, pick and build the
//! migrations to ship, then attach comments and checksum the package. Errors
//! from assembly and migrations are reported together in the response and
//! never escape as `Err`.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::assemble::{assemble, AssemblyOptions, ExportedValue};
use crate::checksum::Checksum;
use crate::comments::{apply_comment_bindings, CommentBinding};
use crate::error::ErrorDetails;
use crate::migrate::{select_migrations, DeferredMigration, Migration};
use crate::package::SchemaPackage;
use crate::registry::TypeRegistry;

/// Version of this compiler, stamped on every response
pub const DSL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result of a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DslResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<SchemaPackage>,
    #[serde(default)]
    pub migrations: Vec<Migration>,
    #[serde(default)]
    pub errors: Vec<ErrorDetails>,
    pub dsl_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_checksum: Option<Checksum>,
}

impl DslResponse {
    /// A response carrying only errors
    pub fn from_errors(errors: Vec<ErrorDetails>) -> Self {
        Self {
            package: None,
            migrations: Vec::new(),
            errors,
            dsl_version: DSL_VERSION.to_string(),
            package_checksum: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Inputs to one build
#[derive(Debug, Default)]
pub struct BuildRequest {
    pub exports: Vec<ExportedValue>,
    pub migrations: Vec<DeferredMigration>,
    pub options: AssemblyOptions,
    /// Ship migrations starting at this version instead of the latest
    pub from_version: Option<u64>,
    pub comment_bindings: Vec<CommentBinding>,
}

/// Run a build against `registry`
#[instrument(skip_all, fields(package = %request.options.package_name))]
pub fn build(registry: &TypeRegistry, request: &BuildRequest) -> DslResponse {
    let mut errors = Vec::new();
    let assembled = match assemble(registry, &request.exports, &request.options) {
        Ok(package) => Some(package),
        Err(failures) => {
            warn!(errors = failures.len(), "assembly failed");
            errors.extend(failures.iter().map(|e| e.details()));
            None
        }
    };

    let mut migrations = Vec::new();
    let mut migration_failures = 0usize;
    for deferred in select_migrations(&request.migrations, request.from_version) {
        match deferred.build() {
            Ok(migration) => migrations.push(migration),
            Err(e) => {
                migration_failures += 1;
                errors.push(e.details());
            }
        }
    }
    if migration_failures > 0 {
        warn!(errors = migration_failures, "migrations failed");
    }

    let mut package = match assembled {
        Some(package) if errors.is_empty() => package,
        _ => return DslResponse::from_errors(errors),
    };
    apply_comment_bindings(&mut package, &request.comment_bindings);

    let package_checksum = match Checksum::of_package(&package) {
        Ok(checksum) => checksum,
        Err(e) => return DslResponse::from_errors(vec![e.details()]),
    };

    info!(
        checksum = %package_checksum,
        messages = package.messages.len(),
        migrations = migrations.len(),
        "build complete"
    );
    DslResponse {
        package: Some(package),
        migrations,
        errors: Vec::new(),
        dsl_version: DSL_VERSION.to_string(),
        package_checksum: Some(package_checksum),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate;
    use crate::types::{EnumType, Field, ItemType};

    fn registry() -> (TypeRegistry, ExportedValue) {
        let mut registry = TypeRegistry::with_known_types();
        let uint = registry.find("uint").unwrap();
        let person = registry
            .item_type(
                ItemType::new("Person")
                    .key_path("/people-:id")
                    .field("id", Field::new(uint)),
            )
            .unwrap();
        (registry, person.into())
    }

    #[test]
    fn test_successful_build() {
        let (registry, person) = registry();
        let request = BuildRequest {
            exports: vec![person],
            migrations: vec![
                migrate(1, "Old", |m| {
                    m.add_type("Person");
                    Ok(())
                }),
                migrate(2, "Rename", |m| {
                    m.change_type("Person", |t| {
                        t.rename_field("key", "id");
                        Ok(())
                    })?;
                    Ok(())
                }),
            ],
            ..Default::default()
        };
        let response = build(&registry, &request);
        assert!(response.is_ok(), "{:?}", response.errors);
        assert_eq!(response.dsl_version, DSL_VERSION);
        assert_eq!(response.migrations.len(), 1);
        assert_eq!(response.migrations[0].name, "Rename");
        let package = response.package.as_ref().unwrap();
        assert!(response.package_checksum.as_ref().unwrap().verify(package));
    }

    #[test]
    fn test_requested_version() {
        let (registry, person) = registry();
        let request = BuildRequest {
            exports: vec![person],
            migrations: vec![
                migrate(1, "Old", |_| Ok(())),
                migrate(2, "New", |_| Ok(())),
            ],
            from_version: Some(1),
            ..Default::default()
        };
        let response = build(&registry, &request);
        assert_eq!(response.migrations.len(), 1);
        assert_eq!(response.migrations[0].name, "Old");
    }

    #[test]
    fn test_assembly_errors_are_reported() {
        let mut registry = TypeRegistry::with_known_types();
        let state = registry
            .enum_type(EnumType::new("State").value("Active", 1))
            .unwrap();
        let person = registry
            .item_type(
                ItemType::new("Person")
                    .key_path("/people")
                    .field("state", Field::new(state)),
            )
            .unwrap();
        let request = BuildRequest {
            exports: vec![person.into()],
            ..Default::default()
        };
        let response = build(&registry, &request);
        assert!(!response.is_ok());
        assert!(response.package.is_none());
        assert!(response.package_checksum.is_none());
        assert_eq!(response.errors[0].code.as_str(), "SchemaUnexportedType");
    }

    #[test]
    fn test_migration_errors_are_reported() {
        let (registry, person) = registry();
        let request = BuildRequest {
            exports: vec![person],
            migrations: vec![migrate(1, "", |_| Ok(()))],
            ..Default::default()
        };
        let response = build(&registry, &request);
        assert!(response.package.is_none());
        assert_eq!(response.errors[0].code.as_str(), "SchemaMigrationFailed");
    }

    #[test]
    fn test_assembly_and_migration_errors_reported_together() {
        let mut registry = TypeRegistry::with_known_types();
        let state = registry
            .enum_type(EnumType::new("State").value("Active", 1))
            .unwrap();
        let person = registry
            .item_type(
                ItemType::new("Person")
                    .key_path("/people")
                    .field("state", Field::new(state)),
            )
            .unwrap();
        let request = BuildRequest {
            exports: vec![person.into()],
            migrations: vec![migrate(1, "", |_| Ok(()))],
            ..Default::default()
        };
        let response = build(&registry, &request);
        assert!(response.package.is_none());
        assert!(response.migrations.is_empty());
        let codes: Vec<_> = response.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["SchemaUnexportedType", "SchemaMigrationFailed"]);
    }
}
