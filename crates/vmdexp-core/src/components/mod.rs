//! # Components Module
//!
//! The built-in catalogue of simulation components. Each submodule declares
//! the classes of one or more categories together with their constructors,
//! and registers them with a [`Registry`].
//!
//! Adding a component type means writing its constructor, describing its
//! parameters with [`ComponentClass::builder`](crate::core::component::ComponentClass::builder),
//! and adding one `register` call here.

use crate::core::registry::{Registry, RegistryError};

pub mod extensions;
pub mod global;
pub mod integrators;
pub mod models;
pub mod operations;
pub mod steps;
pub mod systems;

pub(crate) fn register_builtins(registry: &mut Registry) -> Result<(), RegistryError> {
    global::register(registry)?;
    systems::register(registry)?;
    integrators::register(registry)?;
    models::register(registry)?;
    operations::register(registry)?;
    extensions::register(registry)?;
    steps::register(registry)?;
    Ok(())
}
