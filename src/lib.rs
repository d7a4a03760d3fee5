//! Config persistence runtime.
//!
//! Keeps in-memory config objects in sync with one file each, through a
//! format-neutral [`Value`](value::Value) tree, schema-driven converters and
//! a runtime that saves on change and reloads on external edits.

// Data model and codecs
pub mod value;
pub mod convert;
pub mod schema;
pub mod store;

// Files and orchestration
pub mod config;
pub mod runtime;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{Config, ConfigError, RuntimeSettings};
pub use runtime::ConfigRuntime;
pub use schema::{Configurable, SchemaBuilder};
pub use store::Store;
pub use value::Value;
