//! Package assembly
//!
//! Walks the exported definitions, compiles each one exactly once, and makes
//! sure the finished package never names a type it does not contain.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compile::{compile_type, CompileContext, CompiledType};
use crate::deferred::Deferred;
use crate::error::SchemaError;
use crate::package::{DefaultGroupConfig, SchemaPackage, SupportedFeatures};
use crate::registry::TypeRegistry;
use crate::types::{SchemaDefaults, TypeId};

/// Package used when none is configured
pub const DEFAULT_PACKAGE_NAME: &str = "schema.generated";

/// One top-level value handed over by the schema loader
#[derive(Debug, Clone)]
pub enum ExportedValue {
    Type(Deferred<TypeId>),
    Types(Deferred<Vec<TypeId>>),
    /// Anything that is not a schema definition, e.g. a constant
    Other { name: String },
}

impl From<TypeId> for ExportedValue {
    fn from(id: TypeId) -> Self {
        Self::Type(Deferred::Value(id))
    }
}

impl From<Deferred<TypeId>> for ExportedValue {
    fn from(deferred: Deferred<TypeId>) -> Self {
        Self::Type(deferred)
    }
}

impl From<Vec<TypeId>> for ExportedValue {
    fn from(ids: Vec<TypeId>) -> Self {
        Self::Types(Deferred::Value(ids))
    }
}

/// What to do about a field that names a type nobody exported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Fail with `UnexportedType`
    #[default]
    Reject,
    /// Pull the referenced type into the package
    IncludeTransitive,
}

/// Inputs to [`assemble`] other than the exports themselves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOptions {
    pub package_name: String,
    pub file_name: String,
    pub defaults: SchemaDefaults,
    pub policy: ReferencePolicy,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
            file_name: String::new(),
            defaults: SchemaDefaults::default(),
            policy: ReferencePolicy::default(),
        }
    }
}

/// Package-wide group defaults: flags enabled unless turned off, tombstones in seconds
pub fn default_group_config(defaults: &SchemaDefaults) -> DefaultGroupConfig {
    DefaultGroupConfig {
        supported_feature_flags: SupportedFeatures::from_flags(
            defaults.versioned.unwrap_or(true),
            defaults.syncable.unwrap_or(true),
        ),
        tombstone_duration_seconds: defaults
            .tombstone_ttl_hours
            .map(|hours| hours.saturating_mul(3600))
            .unwrap_or(0),
    }
}

/// Assemble a package from exported definitions.
///
/// Every independent problem found is returned together.
pub fn assemble(
    registry: &TypeRegistry,
    exports: &[ExportedValue],
    options: &AssemblyOptions,
) -> Result<SchemaPackage, Vec<SchemaError>> {
    let mut errors = Vec::new();

    // Flatten exports, keeping first-seen order
    let mut roots = Vec::new();
    let mut by_name: HashMap<&str, TypeId> = HashMap::new();
    for export in exports {
        let ids = match export {
            ExportedValue::Type(deferred) => deferred.force(registry).map(|id| vec![id]),
            ExportedValue::Types(deferred) => deferred.force(registry),
            ExportedValue::Other { name } => {
                debug!(export = %name, "skipping non-schema export");
                continue;
            }
        };
        let ids = match ids {
            Ok(ids) => ids,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        for id in ids {
            let name = registry.name_of(id);
            match by_name.get(name) {
                Some(&existing) if existing == id => {}
                Some(_) => errors.push(SchemaError::DuplicateType {
                    name: name.to_string(),
                }),
                None => {
                    by_name.insert(name, id);
                    roots.push(id);
                }
            }
        }
    }

    let mut ctx = CompileContext::new(registry, &options.package_name, options.defaults.clone());
    let mut package = SchemaPackage {
        package_name: options.package_name.clone(),
        file_name: options.file_name.clone(),
        messages: Vec::new(),
        enums: Vec::new(),
        type_aliases: Vec::new(),
        default_group_config: default_group_config(&options.defaults),
    };

    let mut queued: HashSet<TypeId> = roots.iter().copied().collect();
    let mut queue: VecDeque<TypeId> = roots.into_iter().collect();
    let mut emitted: HashSet<TypeId> = HashSet::new();
    let mut dangling = Vec::new();

    while let Some(id) = queue.pop_front() {
        match compile_type(&mut ctx, id) {
            Ok(Some(CompiledType::Message(m))) => package.messages.push(m),
            Ok(Some(CompiledType::Enum(e))) => package.enums.push(e),
            Ok(Some(CompiledType::Alias(a))) => package.type_aliases.push(a),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
        emitted.insert(id);

        for alias in ctx.take_aliases() {
            if queued.insert(alias) {
                queue.push_back(alias);
            }
        }
        for reference in ctx.take_references() {
            match options.policy {
                ReferencePolicy::IncludeTransitive => {
                    if queued.insert(reference.id) {
                        debug!(
                            name = registry.name_of(reference.id),
                            from = %reference.referenced_from,
                            "including referenced type"
                        );
                        queue.push_back(reference.id);
                    }
                }
                ReferencePolicy::Reject => dangling.push(reference),
            }
        }
    }

    let mut reported = HashSet::new();
    for reference in dangling {
        if !emitted.contains(&reference.id) && reported.insert(reference.id) {
            errors.push(SchemaError::UnexportedType {
                name: registry.name_of(reference.id).to_string(),
                referenced_from: reference.referenced_from,
            });
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    info!(
        package = %package.package_name,
        messages = package.messages.len(),
        enums = package.enums.len(),
        aliases = package.type_aliases.len(),
        "assembled schema package"
    );
    Ok(package)
}
