//! # Engine Module
//!
//! The stateful part of the library: composing one simulation description
//! into a merged engine-input document.
//!
//! ## Overview
//!
//! Composition runs in a fixed order. Units and types are instantiated
//! first, then every model in declaration order; the models are handed to an
//! [`IdsHandler`](crate::core::ids::IdsHandler) that assigns their id
//! offsets. Model operations then edit positions through the handler, after
//! which extensions, the ensemble, integrators, systems and steps emit their
//! fragments. Fragments are merged by a pure function; nothing mutates the
//! growing document in place.
//!
//! - **Composition** ([`composer`]) - [`Composer`](composer::Composer) and its output
//! - **Error Handling** ([`error`]) - [`ComposeError`](error::ComposeError) with component context
//! - **Progress Monitoring** ([`progress`]) - callbacks used by pool-level workflows

pub mod composer;
pub mod error;
pub mod progress;
