use super::{model_class, particle_type, with_type_parameters};
use crate::core::component::{Built, ComponentClass, ComponentError};
use crate::core::models::{ModelData, ModelParts, PlainModel, TYPE_COLUMN, single_type_tables};
use crate::core::registry::RegistryError;
use crate::core::schema::{ParamKind, Parameters};
use std::collections::BTreeMap;

pub(super) fn class() -> Result<ComponentClass, RegistryError> {
    with_type_parameters(model_class("PARTICLES"))
        .required("positions", ParamKind::Vector3List)
        .predicates(&[TYPE_COLUMN])
        .build()
}

/// Particles of a single type at explicitly given positions.
pub(super) fn build(params: &Parameters) -> Result<Built, ComponentError> {
    let positions = params.vector3_list("positions")?;
    let (type_name, info) = particle_type(params)?;
    let (state, structure) = single_type_tables(&positions, &type_name);
    let data = ModelData {
        state,
        structure,
        force_field: BTreeMap::new(),
        types: BTreeMap::from([(type_name, info)]),
    };
    Ok(Built::Model(ModelParts::new(data, PlainModel)))
}
