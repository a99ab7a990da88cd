//! # Core Module
//!
//! The stateless building blocks of composition: parameter schemas, the
//! component framework and its registry, particle tables, the engine-input
//! document, models, the global id space and the selection engine.
//!
//! ## Overview
//!
//! Nothing in this module knows how a whole simulation is assembled. Each
//! submodule owns one concept and its error type:
//!
//! - **Schemas** ([`schema`]) - declared parameter kinds and their validation
//! - **Components** ([`component`], [`registry`]) - classes, descriptions, constructors
//! - **Documents** ([`table`], [`document`]) - labelled tables and the pure fragment merge
//! - **Models** ([`models`]) - per-model state, structure, force field and types
//! - **Ids** ([`ids`], [`selection`]) - the flat global-id space and selection resolution
//!
//! ## Ids
//!
//! Every model numbers its particles locally from zero. When the models of a
//! simulation are concatenated, a model's local id `i` becomes the global id
//! `offset + i`, where the offset is the particle count of all earlier
//! models. Selections, operations and emitted fragments all speak global ids.

pub mod component;
pub mod document;
pub mod ids;
pub mod models;
pub mod registry;
pub mod schema;
pub mod selection;
pub mod table;
pub mod utils;
