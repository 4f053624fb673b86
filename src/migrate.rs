//! Migration compiler
//!
//! A migration is declared as a closure over a [`Migrator`]; building it runs
//! the closure once and records every call as a command, in call order.
//!
//! Names are not checked against any schema here. Old migrations are kept as
//! history and refer to types that may no longer exist; only the server,
//! which holds both schema versions, can validate them.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::stringify::{stringify_default, DefaultValue};

// =============================================================================
// Output model
// =============================================================================

/// Edits that turned schema version `from_schema_version` into the next one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Migration {
    pub from_schema_version: u64,
    pub name: String,
    pub commands: Vec<MigrationCommand>,
}

/// All edits for one type, in call order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCommand {
    pub type_name: String,
    pub actions: Vec<MigrateAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MigrateAction {
    AddField { name: String },
    /// `read_default` is empty when none was given
    RemoveField { name: String, read_default: String },
    RenameField { old_name: String, new_name: String },
    MarkFieldAsRequired { name: String },
    MarkFieldAsNotRequired { name: String, read_default: String },
    ModifyFieldReadDefault { name: String },
    RenameType { new_name: String },
    RemoveType,
    AddType,
    RenameEnumValue { old_value_name: String, new_value_name: String },
    AddEnumValue { new_value_name: String },
    RemoveEnumValue { value_name: String },
}

// =============================================================================
// Builders
// =============================================================================

/// Records edits to one item or object type
pub struct TypeMigrator {
    command: MigrationCommand,
}

impl TypeMigrator {
    fn new(type_name: &str) -> Self {
        Self {
            command: MigrationCommand {
                type_name: type_name.to_string(),
                actions: Vec::new(),
            },
        }
    }

    fn push(&mut self, action: MigrateAction) -> &mut Self {
        self.command.actions.push(action);
        self
    }

    pub fn add_field(&mut self, name: &str) -> &mut Self {
        self.push(MigrateAction::AddField { name: name.into() })
    }

    /// Remove a field. Required fields need a read default for old readers.
    pub fn remove_field(&mut self, name: &str, read_default: Option<DefaultValue>) -> Result<&mut Self> {
        let read_default = stringify_default(read_default.as_ref())?.unwrap_or_default();
        Ok(self.push(MigrateAction::RemoveField {
            name: name.into(),
            read_default,
        }))
    }

    pub fn rename_field(&mut self, old_name: &str, new_name: &str) -> &mut Self {
        self.push(MigrateAction::RenameField {
            old_name: old_name.into(),
            new_name: new_name.into(),
        })
    }

    pub fn mark_field_as_required(&mut self, name: &str) -> &mut Self {
        self.push(MigrateAction::MarkFieldAsRequired { name: name.into() })
    }

    pub fn mark_field_as_not_required(
        &mut self,
        name: &str,
        read_default: Option<DefaultValue>,
    ) -> Result<&mut Self> {
        let read_default = stringify_default(read_default.as_ref())?.unwrap_or_default();
        Ok(self.push(MigrateAction::MarkFieldAsNotRequired {
            name: name.into(),
            read_default,
        }))
    }

    pub fn modify_field_read_default(&mut self, name: &str) -> &mut Self {
        self.push(MigrateAction::ModifyFieldReadDefault { name: name.into() })
    }
}

/// Records edits to one enum
pub struct EnumTypeMigrator {
    command: MigrationCommand,
}

impl EnumTypeMigrator {
    fn new(enum_name: &str) -> Self {
        Self {
            command: MigrationCommand {
                type_name: enum_name.to_string(),
                actions: Vec::new(),
            },
        }
    }

    fn push(&mut self, action: MigrateAction) -> &mut Self {
        self.command.actions.push(action);
        self
    }

    pub fn add_value(&mut self, name: &str) -> &mut Self {
        self.push(MigrateAction::AddEnumValue {
            new_value_name: name.into(),
        })
    }

    pub fn remove_value(&mut self, name: &str) -> &mut Self {
        self.push(MigrateAction::RemoveEnumValue {
            value_name: name.into(),
        })
    }

    pub fn rename_value(&mut self, old_name: &str, new_name: &str) -> &mut Self {
        self.push(MigrateAction::RenameEnumValue {
            old_value_name: old_name.into(),
            new_value_name: new_name.into(),
        })
    }
}

/// The context a migration's declare function runs against
pub struct Migrator {
    commands: Vec<MigrationCommand>,
}

impl Migrator {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Edit a type; the edits become one command
    pub fn change_type(
        &mut self,
        type_name: &str,
        change: impl FnOnce(&mut TypeMigrator) -> Result<()>,
    ) -> Result<&mut Self> {
        let mut migrator = TypeMigrator::new(type_name);
        change(&mut migrator)?;
        self.commands.push(migrator.command);
        Ok(self)
    }

    /// Edit an enum; the edits become one command
    pub fn change_enum(
        &mut self,
        enum_name: &str,
        change: impl FnOnce(&mut EnumTypeMigrator) -> Result<()>,
    ) -> Result<&mut Self> {
        let mut migrator = EnumTypeMigrator::new(enum_name);
        change(&mut migrator)?;
        self.commands.push(migrator.command);
        Ok(self)
    }

    fn single(&mut self, type_name: &str, action: MigrateAction) -> &mut Self {
        self.commands.push(MigrationCommand {
            type_name: type_name.to_string(),
            actions: vec![action],
        });
        self
    }

    pub fn add_type(&mut self, name: &str) -> &mut Self {
        self.single(name, MigrateAction::AddType)
    }

    pub fn remove_type(&mut self, name: &str) -> &mut Self {
        self.single(name, MigrateAction::RemoveType)
    }

    /// The command is keyed by the old name
    pub fn rename_type(&mut self, old_name: &str, new_name: &str) -> &mut Self {
        self.single(
            old_name,
            MigrateAction::RenameType {
                new_name: new_name.into(),
            },
        )
    }
}

// =============================================================================
// Deferred migrations
// =============================================================================

type DeclareFn = Rc<dyn Fn(&mut Migrator) -> Result<()>>;

/// A migration whose commands are produced on [`build`](Self::build)
#[derive(Clone)]
pub struct DeferredMigration {
    pub from_version: u64,
    pub name: String,
    declare: DeclareFn,
}

impl fmt::Debug for DeferredMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredMigration")
            .field("from_version", &self.from_version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Declare a migration from `from_version` to the next version
pub fn migrate(
    from_version: u64,
    name: impl Into<String>,
    declare: impl Fn(&mut Migrator) -> Result<()> + 'static,
) -> DeferredMigration {
    DeferredMigration {
        from_version,
        name: name.into(),
        declare: Rc::new(declare),
    }
}

impl DeferredMigration {
    /// Run the declare function and collect its commands
    pub fn build(&self) -> Result<Migration> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::MigrationFailed {
                from_version: self.from_version,
                name: self.name.clone(),
                reason: "migrations need a descriptive name".to_string(),
            });
        }
        let mut migrator = Migrator::new();
        (self.declare)(&mut migrator)?;
        debug!(
            from_version = self.from_version,
            name = %self.name,
            commands = migrator.commands.len(),
            "built migration"
        );
        Ok(Migration {
            from_schema_version: self.from_version,
            name: self.name.clone(),
            commands: migrator.commands,
        })
    }
}

/// Pick the migrations to ship.
///
/// With a requested version, those starting there. Otherwise every migration
/// at the highest starting version.
pub fn select_migrations(
    migrations: &[DeferredMigration],
    requested: Option<u64>,
) -> Vec<DeferredMigration> {
    let target = match requested {
        Some(version) => version,
        None => match migrations.iter().map(|m| m.from_version).max() {
            Some(version) => version,
            None => return Vec::new(),
        },
    };
    let selected: Vec<_> = migrations
        .iter()
        .filter(|m| m.from_version == target)
        .cloned()
        .collect();
    info!(
        from_version = target,
        selected = selected.len(),
        total = migrations.len(),
        "selected migrations"
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_field_with_default() {
        let m = migrate(3, "drop col", |m| {
            m.change_type("T", |t| {
                t.remove_field("x", Some(42i32.into()))?;
                Ok(())
            })?;
            Ok(())
        });
        let migration = m.build().unwrap();
        assert_eq!(migration.from_schema_version, 3);
        assert_eq!(migration.commands.len(), 1);
        assert_eq!(migration.commands[0].type_name, "T");
        assert_eq!(
            migration.commands[0].actions,
            vec![MigrateAction::RemoveField {
                name: "x".into(),
                read_default: "42".into()
            }]
        );
    }

    #[test]
    fn test_commands_follow_call_order() {
        let m = migrate(1, "reshape", |m| {
            m.rename_type("Old", "New")
                .add_type("Fresh")
                .change_type("New", |t| {
                    t.add_field("a").rename_field("b", "c").mark_field_as_required("a");
                    t.mark_field_as_not_required("d", None)?
                        .modify_field_read_default("e");
                    Ok(())
                })?
                .change_enum("State", |e| {
                    e.add_value("Paused").rename_value("Gone", "Archived").remove_value("X");
                    Ok(())
                })?
                .remove_type("Stale");
            Ok(())
        });
        let migration = m.build().unwrap();
        let types: Vec<_> = migration.commands.iter().map(|c| c.type_name.as_str()).collect();
        assert_eq!(types, vec!["Old", "Fresh", "New", "State", "Stale"]);
        assert_eq!(
            migration.commands[0].actions,
            vec![MigrateAction::RenameType { new_name: "New".into() }]
        );
        assert_eq!(migration.commands[2].actions.len(), 5);
        assert_eq!(
            migration.commands[2].actions[3],
            MigrateAction::MarkFieldAsNotRequired {
                name: "d".into(),
                read_default: String::new()
            }
        );
        assert_eq!(migration.commands[3].actions.len(), 3);
    }

    #[test]
    fn test_unserializable_default_fails_build() {
        let m = migrate(2, "bad", |m| {
            m.change_type("T", |t| {
                t.remove_field(
                    "f",
                    Some(DefaultValue::Opaque {
                        type_name: "function".into(),
                    }),
                )?;
                Ok(())
            })?;
            Ok(())
        });
        assert_eq!(m.build().unwrap_err().code().as_str(), "SchemaUnserializableDefault");
    }

    #[test]
    fn test_build_is_repeatable() {
        let m = migrate(1, "add", |m| {
            m.add_type("A");
            Ok(())
        });
        assert_eq!(m.build().unwrap(), m.build().unwrap());
    }

    #[test]
    fn test_select_migrations() {
        fn noop(_: &mut Migrator) -> Result<()> {
            Ok(())
        }
        let all = vec![
            migrate(1, "a", noop),
            migrate(3, "b", noop),
            migrate(3, "c", noop),
            migrate(2, "d", noop),
        ];
        let latest: Vec<_> = select_migrations(&all, None).into_iter().map(|m| m.name).collect();
        assert_eq!(latest, vec!["b", "c"]);
        let requested: Vec<_> = select_migrations(&all, Some(2)).into_iter().map(|m| m.name).collect();
        assert_eq!(requested, vec!["d"]);
        assert!(select_migrations(&all, Some(9)).is_empty());
        assert!(select_migrations(&[], None).is_empty());
    }

    #[test]
    fn test_action_json_shape() {
        let action = MigrateAction::RenameEnumValue {
            old_value_name: "A".into(),
            new_value_name: "B".into(),
        };
        assert_eq!(
            serde_json::to_string(&action).unwrap(),
            r#"{"renameEnumValue":{"oldValueName":"A","newValueName":"B"}}"#
        );
        assert_eq!(serde_json::to_string(&MigrateAction::AddType).unwrap(), r#""addType""#);
    }
}
