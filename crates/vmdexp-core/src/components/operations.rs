//! Model operations.
//!
//! Operations run after every model has been placed in the global id space
//! and before any fragment is emitted. They edit positions exclusively
//! through [`IdsHandler::set_state_of`].

use crate::core::component::{Built, Category, ComponentClass, ComponentError, ModelOperation};
use crate::core::ids::IdsHandler;
use crate::core::models::POSITION_COLUMN;
use crate::core::registry::{Registry, RegistryError};
use crate::core::schema::{DefaultValue, ParamKind, ParameterError, ParameterErrorKind, Parameters};
use crate::core::selection::SelectionExpr;
use crate::core::utils::geometry::{
    center_of_mass, rotate_about, rotation_from_axis_angle, vector_from_value, vector_to_value,
};
use nalgebra::{Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

pub(crate) fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        ComponentClass::builder(Category::ModelOperation, "setCenterOfMassPosition")
            .required("position", ParamKind::Vector3)
            .required_selection("selection")
            .build()?,
        set_center_of_mass,
    )?;
    registry.register(
        ComponentClass::builder(Category::ModelOperation, "translate")
            .required("translation", ParamKind::Vector3)
            .required_selection("selection")
            .build()?,
        translate,
    )?;
    registry.register(
        ComponentClass::builder(Category::ModelOperation, "rotation")
            .required("axis", ParamKind::Vector3)
            .required("angle", ParamKind::Real)
            .required_selection("selection")
            .build()?,
        rotation,
    )?;
    registry.register(
        ComponentClass::builder(Category::ModelOperation, "setLowestPoint")
            .required("position", ParamKind::Real)
            .defaulted("considerRadius", ParamKind::Boolean, DefaultValue::Boolean(false))
            .required_selection("selection")
            .build()?,
        set_lowest_point,
    )?;
    registry.register(
        ComponentClass::builder(Category::ModelOperation, "distributeRandomly")
            .required("box", ParamKind::Vector3)
            .defaulted("seed", ParamKind::Integer, DefaultValue::Integer(0))
            .optional("models", ParamKind::TextList)
            .build()?,
        distribute_randomly,
    )?;
    Ok(())
}

fn required_selection(params: &Parameters, key: &str) -> Result<SelectionExpr, ParameterError> {
    params
        .selection(key)
        .cloned()
        .ok_or_else(|| ParameterError::new(ParameterErrorKind::Missing, key, params.class()))
}

fn position_of(ids: &IdsHandler, id: usize) -> Result<Vector3<f64>, ComponentError> {
    let value = ids.state_of(id, POSITION_COLUMN)?;
    vector_from_value(value)
        .ok_or_else(|| ComponentError::Invalid(format!("particle {} has a malformed position", id)))
}

fn weighted_positions(ids: &IdsHandler, selected: &[usize]) -> Result<Vec<(Vector3<f64>, f64)>, ComponentError> {
    selected
        .iter()
        .map(|&id| Ok((position_of(ids, id)?, ids.property_of(id, "mass")?)))
        .collect()
}

fn move_particles(
    ids: &mut IdsHandler,
    selected: &[usize],
    transform: impl Fn(&Vector3<f64>) -> Vector3<f64>,
) -> Result<(), ComponentError> {
    for &id in selected {
        let moved = transform(&position_of(ids, id)?);
        ids.set_state_of(id, POSITION_COLUMN, vector_to_value(&moved))?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct SetCenterOfMass {
    position: Vector3<f64>,
    selection: SelectionExpr,
}

impl ModelOperation for SetCenterOfMass {
    fn apply(&self, ids: &mut IdsHandler) -> Result<(), ComponentError> {
        let selected = ids.select(&self.selection)?;
        let Some(com) = center_of_mass(&weighted_positions(ids, &selected)?) else {
            return Ok(());
        };
        let shift = self.position - com;
        move_particles(ids, &selected, |p| p + shift)
    }
}

fn set_center_of_mass(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(Built::Operation(Box::new(SetCenterOfMass {
        position: params.vector3("position")?,
        selection: required_selection(params, "selection")?,
    })))
}

#[derive(Debug, Clone)]
struct Translate {
    translation: Vector3<f64>,
    selection: SelectionExpr,
}

impl ModelOperation for Translate {
    fn apply(&self, ids: &mut IdsHandler) -> Result<(), ComponentError> {
        let selected = ids.select(&self.selection)?;
        move_particles(ids, &selected, |p| p + self.translation)
    }
}

fn translate(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(Built::Operation(Box::new(Translate {
        translation: params.vector3("translation")?,
        selection: required_selection(params, "selection")?,
    })))
}

/// Rotates the selection about its own center of mass.
#[derive(Debug, Clone)]
struct Rotate {
    rotation: Rotation3<f64>,
    selection: SelectionExpr,
}

impl ModelOperation for Rotate {
    fn apply(&self, ids: &mut IdsHandler) -> Result<(), ComponentError> {
        let selected = ids.select(&self.selection)?;
        let Some(com) = center_of_mass(&weighted_positions(ids, &selected)?) else {
            return Ok(());
        };
        move_particles(ids, &selected, |p| rotate_about(p, &com, &self.rotation))
    }
}

fn rotation(params: &Parameters) -> Result<Built, ComponentError> {
    let axis = params.vector3("axis")?;
    let angle = params.real("angle")?;
    let rotation = rotation_from_axis_angle(&axis, angle).ok_or_else(|| {
        ParameterError::new(ParameterErrorKind::InvalidValue, "axis", params.class())
            .with_detail("must not be the zero vector")
    })?;
    Ok(Built::Operation(Box::new(Rotate {
        rotation,
        selection: required_selection(params, "selection")?,
    })))
}

/// Shifts the selection along z so that its lowest point sits at `position`.
#[derive(Debug, Clone)]
struct SetLowestPoint {
    position: f64,
    consider_radius: bool,
    selection: SelectionExpr,
}

impl ModelOperation for SetLowestPoint {
    fn apply(&self, ids: &mut IdsHandler) -> Result<(), ComponentError> {
        let selected = ids.select(&self.selection)?;
        let mut lowest: Option<f64> = None;
        for &id in &selected {
            let mut z = position_of(ids, id)?.z;
            if self.consider_radius {
                z -= ids.property_of(id, "radius")?;
            }
            lowest = Some(lowest.map_or(z, |l| l.min(z)));
        }
        let Some(lowest) = lowest else {
            return Ok(());
        };
        let shift = Vector3::new(0.0, 0.0, self.position - lowest);
        move_particles(ids, &selected, |p| p + shift)
    }
}

fn set_lowest_point(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(Built::Operation(Box::new(SetLowestPoint {
        position: params.real("position")?,
        consider_radius: params.boolean("considerRadius")?,
        selection: required_selection(params, "selection")?,
    })))
}

/// Gives each target model a random orientation and moves its center of mass
/// to a random point of the box.
#[derive(Debug, Clone)]
struct DistributeRandomly {
    half_box: Vector3<f64>,
    seed: u64,
    models: Option<Vec<String>>,
}

impl ModelOperation for DistributeRandomly {
    fn apply(&self, ids: &mut IdsHandler) -> Result<(), ComponentError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let targets: Vec<String> = match &self.models {
            Some(names) => names.clone(),
            None => ids.models().map(|m| m.name().to_string()).collect(),
        };
        for name in targets {
            let model = ids.model(&name).ok_or_else(|| {
                ComponentError::Invalid(format!("distributeRandomly references unknown model '{}'", name))
            })?;
            let selected: Vec<usize> = model.global_id_range().collect();
            let Some(com) = center_of_mass(&weighted_positions(ids, &selected)?) else {
                continue;
            };
            let axis = Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            let rotation = rotation_from_axis_angle(&axis, rng.gen_range(0.0..2.0 * PI))
                .unwrap_or_else(Rotation3::identity);
            let target = Vector3::new(
                sample(&mut rng, self.half_box.x),
                sample(&mut rng, self.half_box.y),
                sample(&mut rng, self.half_box.z),
            );
            move_particles(ids, &selected, |p| target + rotation * (p - com))?;
        }
        Ok(())
    }
}

fn sample(rng: &mut StdRng, half: f64) -> f64 {
    if half > 0.0 {
        rng.gen_range(-half..half)
    } else {
        0.0
    }
}

fn distribute_randomly(params: &Parameters) -> Result<Built, ComponentError> {
    let models = if params.contains("models") {
        Some(params.text_list("models")?)
    } else {
        None
    };
    Ok(Built::Operation(Box::new(DistributeRandomly {
        half_box: params.vector3("box")? / 2.0,
        seed: params.integer("seed")? as u64,
        models,
    })))
}
