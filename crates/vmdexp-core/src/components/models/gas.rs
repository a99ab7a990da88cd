use super::{model_class, particle_type, with_type_parameters};
use crate::core::component::{Built, ComponentClass, ComponentError};
use crate::core::models::{ModelData, ModelParts, PlainModel, TYPE_COLUMN, single_type_tables};
use crate::core::registry::RegistryError;
use crate::core::schema::{DefaultValue, ParamKind, Parameters};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

pub(super) fn class() -> Result<ComponentClass, RegistryError> {
    with_type_parameters(model_class("GAS"))
        .required("numberOfParticles", ParamKind::PositiveInteger)
        .required("box", ParamKind::Vector3)
        .defaulted("seed", ParamKind::Integer, DefaultValue::Integer(0))
        .predicates(&[TYPE_COLUMN])
        .build()
}

/// Particles placed uniformly at random inside a box centered at the origin.
///
/// The generator is seeded from the `seed` parameter so that composing the
/// same description twice yields the same positions.
pub(super) fn build(params: &Parameters) -> Result<Built, ComponentError> {
    let n = params.count("numberOfParticles")?;
    let half = params.vector3("box")? / 2.0;
    let mut rng = StdRng::seed_from_u64(params.integer("seed")? as u64);

    let positions: Vec<Vector3<f64>> = (0..n)
        .map(|_| {
            Vector3::new(
                sample(&mut rng, half.x),
                sample(&mut rng, half.y),
                sample(&mut rng, half.z),
            )
        })
        .collect();

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

fn sample(rng: &mut StdRng, half: f64) -> f64 {
    if half > 0.0 {
        rng.gen_range(-half..half)
    } else {
        0.0
    }
}
