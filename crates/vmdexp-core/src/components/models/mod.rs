//! Model classes.
//!
//! Every model produces its data bundles in local ids. The common
//! predicates `particleId` and `type` are answered by the model wrapper;
//! polymers add their own chain-aware vocabulary.

use crate::core::component::{Category, ComponentClass, ComponentClassBuilder};
use crate::core::models::TypeInfo;
use crate::core::registry::{Registry, RegistryError};
use crate::core::schema::{DefaultValue, ParamKind, ParameterError, Parameters};

pub mod gas;
pub mod particles;
pub mod polymer;
pub mod table;

pub(crate) fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(particles::class()?, particles::build)?;
    registry.register(gas::class()?, gas::build)?;
    registry.register(polymer::class()?, polymer::build)?;
    registry.register(table::class()?, table::build)?;
    Ok(())
}

fn model_class(type_name: &'static str) -> ComponentClassBuilder {
    ComponentClass::builder(Category::Model, type_name)
}

/// Declares the single-type parameters shared by generated models.
fn with_type_parameters(builder: ComponentClassBuilder) -> ComponentClassBuilder {
    builder
        .defaulted("particleName", ParamKind::Text, DefaultValue::Text("A"))
        .defaulted("particleMass", ParamKind::PositiveReal, DefaultValue::Real(1.0))
        .defaulted("particleRadius", ParamKind::PositiveReal, DefaultValue::Real(0.5))
        .defaulted("particleCharge", ParamKind::Real, DefaultValue::Real(0.0))
}

fn particle_type(params: &Parameters) -> Result<(String, TypeInfo), ParameterError> {
    Ok((
        params.text("particleName")?.to_string(),
        TypeInfo::new(
            params.real("particleMass")?,
            params.real("particleRadius")?,
            params.real("particleCharge")?,
        ),
    ))
}
