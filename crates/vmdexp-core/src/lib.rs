//! # vmdexp Core Library
//!
//! Composes declarative molecular-dynamics experiments into self-contained
//! input documents for an external GPU engine, packs them into simulation
//! sets and materializes the sets for launching.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict layering so that each concern can be tested
//! on its own.
//!
//! - **[`core`]: The Foundation.** Stateless data: parameter schemas, the
//!   component framework, tables and documents, models, the global id space
//!   and the selection engine.
//!
//! - **[`components`]: The Catalogue.** The built-in component classes (units,
//!   ensembles, models, operations, extensions, integrators, steps), registered
//!   explicitly with a [`core::registry::Registry`].
//!
//! - **[`engine`]: The Composer.** The stateful assembly of one simulation:
//!   instantiating components, linking them through the id handler and
//!   merging their fragments.
//!
//! - **[`workflows`]: The Public API.** Pool composition, packing into sets,
//!   on-disk materialization and the session manifest handed to launchers.

pub mod components;
pub mod core;
pub mod engine;
pub mod workflows;
