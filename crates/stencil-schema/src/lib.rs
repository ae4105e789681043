//! JSON Schema validation for stencil content.
//!
//! Loads every `*.schema.json` file from a schemas directory and checks each
//! page content document against the `page` schema, collecting every
//! violation in every file before judging the run.

pub mod validate;

pub use validate::{
    FileReport, SchemaError, SchemaRegistry, ValidationReport, Violation, PAGE_SCHEMA,
    SCHEMA_SUFFIX,
};
