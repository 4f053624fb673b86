//! Schema DSL compiler
//!
//! Turns typed schema declarations into a compiled [`SchemaPackage`]: messages,
//! enums and type aliases with their validations, plus ordered migrations
//! describing how the schema changed between versions.
//!
//! ## Features
//!
//! - **Type registry**: one arena of named types, with forward references and
//!   structural de-duplication of repeated definitions
//! - **Field compilation**: alias chains resolved to their base representation
//!   and inherited validations
//! - **Package assembly**: exported types gathered into one package, with every
//!   independent error reported together
//! - **Migrations**: named, versioned edit lists built on demand
//! - **Documents**: JSON schema documents loaded by name
//!
//! ## Pipeline
//!
//! ```text
//! documents ──► TypeRegistry ──► assemble ──► SchemaPackage ──┐
//!                                                             ├──► DslResponse
//! migrate(...) ──► select_migrations ──► Migration ───────────┘
//! ```

pub mod assemble;
pub mod checksum;
pub mod codec;
pub mod comments;
pub mod compile;
pub mod config;
pub mod deferred;
pub mod document;
pub mod driver;
pub mod error;
pub mod fields;
pub mod known_types;
pub mod migrate;
pub mod package;
pub mod registry;
pub mod resolve;
pub mod stringify;
pub mod types;

pub use assemble::{assemble, AssemblyOptions, ExportedValue, ReferencePolicy};
pub use checksum::Checksum;
pub use codec::{JsonCodec, ResponseCodec};
pub use comments::{apply_comment_bindings, CommentBinding, CommentKind};
pub use config::{CompilerConfig, OutputFormat};
pub use deferred::Deferred;
pub use document::{LoadedSchema, SchemaDocument, SchemaLoader};
pub use driver::{build, BuildRequest, DslResponse, DSL_VERSION};
pub use error::{ErrorCode, ErrorDetails, Result, SchemaError};
pub use migrate::{migrate, select_migrations, DeferredMigration, Migration, MigrateAction};
pub use package::{SchemaPackage, SupportedFeatures, TypeDescriptor};
pub use registry::TypeRegistry;
pub use stringify::DefaultValue;
pub use types::{
    AliasOptions, EnumType, Field, InterpretAs, ItemType, ObjectType, ScalarKind, SchemaDefaults,
    TypeId, TypeKind,
};
