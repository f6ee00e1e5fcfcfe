//! # Catena: a lightweight, multi-dialect ORM core
//!
//! Catena maps plain Rust types to database tables through eagerly-built
//! schemas of typed [`Property`] descriptors, tracks exactly which attributes
//! of each object have changed since the last round-trip, compiles a small
//! composable query algebra into parameterized SQL per dialect, and rebuilds
//! typed objects (including joined object graphs) straight from result rows.
//!
//! Architecture:
//! - [`Property`]/[`FieldStore`]: typed attributes with validation, defaults,
//!   and per-object dirty tracking
//! - [`ModelSchema`]/[`Model`]: per-type metadata and reconstitution
//! - [`Expr`]/[`Query`]: the query algebra (comparisons, AND/OR, joins)
//! - [`ExprCompiler`]/[`State`]: expression-to-SQL compilation with stable
//!   table aliases and positional parameters
//! - [`Operator`]/[`Dialect`]: CRUD over an abstract [`Executor`], with
//!   SQLite and PostgreSQL dialects included
//!
//! Connection pooling, transactions, and migrations are deliberately outside
//! this crate; anything that can run one parameterized statement can
//! implement [`Executor`].

#![warn(clippy::all)]

pub mod compile;
pub mod convert;
pub mod error;
pub mod expr;
mod macros;
pub mod model;
pub mod operator;
pub mod postgres;
pub mod property;
pub mod sqlite;
pub mod value;

// re-exported for the model! macro expansion
#[doc(hidden)]
pub use once_cell;

pub use compile::{
    compile_base, compile_join, compile_query, substitute_placeholders, BaseCompiler,
    ExprCompiler, Fragment, Placeholder, State,
};
pub use convert::Converter;
pub use error::{OrmError, OrmResult};
pub use expr::{
    and, col, eq, gt, gte, join, left_join, lt, lte, neq, or, table, val, CompareOp, Comparison,
    Expr, Join, Query,
};
pub use model::{
    object_info, reconstitute_groups, reconstitute_single, Model, ModelSchema,
    ModelSchemaBuilder, ObjectInfo, Selectable,
};
pub use operator::{
    delete_statement, insert_statement, refresh_statement, update_from_row, update_statement,
    DbRow, Dialect, Executor, Operator,
};
pub use postgres::{PostgresCompiler, PostgresDialect, PostgresExecutor, PostgresOperator};
pub use property::{FieldStore, Property, PropertyKind, Validator};
pub use sqlite::{SqliteCompiler, SqliteDialect, SqliteExecutor, SqliteOperator};
pub use value::{DataType, Value};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
