//! Model extensions: interactions added on top of the models' own terms.
//!
//! Extensions run after the model operations, so ids and positions they
//! read reflect the final layout of the simulation.

use crate::core::component::{
    Built, Category, Component, ComponentClass, ComponentError, FragmentContext, Forwarded,
};
use crate::core::document::{Contribution, Entry, Section};
use crate::core::models::POSITION_COLUMN;
use crate::core::registry::{Registry, RegistryError};
use crate::core::schema::{DefaultValue, ParamKind, ParameterError, ParameterErrorKind, Parameters};
use crate::core::selection::SelectionExpr;
use crate::core::table::Table;
use serde_json::{Value, json};

pub(crate) fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        ComponentClass::builder(Category::ModelExtension, "constantForce")
            .required("constantForce", ParamKind::Vector3)
            .required_selection("selection")
            .build()?,
        constant_force,
    )?;
    registry.register(
        ComponentClass::builder(Category::ModelExtension, "fixedHarmonicTether")
            .required("K", ParamKind::Real)
            .defaulted("r0", ParamKind::Real, DefaultValue::Real(0.0))
            .required_selection("selection")
            .build()?,
        fixed_harmonic_tether,
    )?;
    registry.register(
        ComponentClass::builder(Category::ModelExtension, "lennardJones")
            .required("epsilon", ParamKind::PositiveReal)
            .required("sigma", ParamKind::PositiveReal)
            .defaulted("cutOffFactor", ParamKind::PositiveReal, DefaultValue::Real(2.5))
            .build()?,
        lennard_jones,
    )?;
    registry.register(
        ComponentClass::builder(Category::ModelExtension, "sphericalShell")
            .required("shellCenter", ParamKind::Vector3)
            .required("shellRadius", ParamKind::PositiveReal)
            .defaulted("epsilon", ParamKind::PositiveReal, DefaultValue::Real(1.0))
            .defaulted("sigma", ParamKind::PositiveReal, DefaultValue::Real(1.0))
            .selection("selection")
            .build()?,
        spherical_shell,
    )?;
    Ok(())
}

fn required_selection(params: &Parameters, key: &str) -> Result<SelectionExpr, ParameterError> {
    params
        .selection(key)
        .cloned()
        .ok_or_else(|| ParameterError::new(ParameterErrorKind::Missing, key, params.class()))
}

fn constant_force(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(Forwarded::new(
        Section::ForceField,
        "External",
        "ConstantForce",
        params.forward(&["constantForce"]),
    )
    .with_selection(params.selection("selection"))
    .boxed())
}

fn spherical_shell(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(Forwarded::new(
        Section::ForceField,
        "External",
        "SphericalShell",
        params.forward(&["shellCenter", "shellRadius", "epsilon", "sigma"]),
    )
    .with_selection(params.selection("selection"))
    .boxed())
}

/// Tethers every selected particle to the position it has after the model
/// operations.
#[derive(Debug, Clone)]
struct FixedHarmonicTether {
    k: f64,
    r0: f64,
    selection: SelectionExpr,
}

impl Component for FixedHarmonicTether {
    fn fragment(&self, ctx: &FragmentContext<'_>) -> Result<Vec<Contribution>, ComponentError> {
        let mut table = Table::new(&["id_i", "K", "r0", "position"]);
        for id in ctx.ids.select(&self.selection)? {
            let position = ctx.ids.state_of(id, POSITION_COLUMN)?.clone();
            table.push_row(vec![Value::from(id), Value::from(self.k), Value::from(self.r0), position])?;
        }
        let entry = Entry::new("Bond1", "FixedHarmonic").with_table(table);
        Ok(vec![Contribution::entry(Section::ForceField, ctx.name, entry)])
    }
}

fn fixed_harmonic_tether(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(Built::Component(Box::new(FixedHarmonicTether {
        k: params.real("K")?,
        r0: params.real("r0")?,
        selection: required_selection(params, "selection")?,
    })))
}

/// One Lennard-Jones row for every unordered pair of particle types.
#[derive(Debug, Clone)]
struct LennardJones {
    epsilon: f64,
    sigma: f64,
    cut_off_factor: f64,
}

impl Component for LennardJones {
    fn fragment(&self, ctx: &FragmentContext<'_>) -> Result<Vec<Contribution>, ComponentError> {
        let names: Vec<&String> = ctx.types.keys().collect();
        let mut table = Table::new(&["name_i", "name_j", "epsilon", "sigma"]);
        for (i, a) in names.iter().enumerate() {
            for b in &names[i..] {
                table.push_row(vec![
                    Value::from(a.as_str()),
                    Value::from(b.as_str()),
                    Value::from(self.epsilon),
                    Value::from(self.sigma),
                ])?;
            }
        }
        let entry = Entry::new("NonBonded", "LennardJonesType2")
            .with_parameter("cutOffFactor", self.cut_off_factor)
            .with_parameter("condition", json!("all"))
            .with_table(table);
        Ok(vec![Contribution::entry(Section::ForceField, ctx.name, entry)])
    }
}

fn lennard_jones(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(Built::Component(Box::new(LennardJones {
        epsilon: params.real("epsilon")?,
        sigma: params.real("sigma")?,
        cut_off_factor: params.real("cutOffFactor")?,
    })))
}
