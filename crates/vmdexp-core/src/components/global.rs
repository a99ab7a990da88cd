//! Units, types, ensembles and the `global` fundamental components.
//!
//! All of them land in the `global` section of the engine input under a
//! fixed entry name, so a simulation carries at most one of each.

use crate::core::component::{
    Built, Category, Component, ComponentClass, ComponentError, FragmentContext, Forwarded,
};
use crate::core::document::{Contribution, Entry, Section};
use crate::core::registry::{Registry, RegistryError};
use crate::core::schema::{DefaultValue, ParamKind, Parameters};
use crate::core::table::Table;
use serde_json::{Map, Value};

pub const UNITS_ENTRY: &str = "units";
pub const TYPES_ENTRY: &str = "types";
pub const ENSEMBLE_ENTRY: &str = "ensemble";
pub const FUNDAMENTAL_ENTRY: &str = "fundamental";

pub(crate) fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(ComponentClass::builder(Category::Units, "none").build()?, units_none)?;
    registry.register(ComponentClass::builder(Category::Units, "KcalMol_A").build()?, units_kcal)?;
    registry.register(ComponentClass::builder(Category::Types, "basic").build()?, types_basic)?;
    registry.register(
        ComponentClass::builder(Category::Ensemble, "NVT")
            .required("box", ParamKind::Vector3)
            .required("temperature", ParamKind::Real)
            .build()?,
        ensemble_nvt,
    )?;
    registry.register(
        ComponentClass::builder(Category::Ensemble, "NVTlambda")
            .required("box", ParamKind::Vector3)
            .required("temperature", ParamKind::Real)
            .required("lambda", ParamKind::Real)
            .build()?,
        ensemble_nvt_lambda,
    )?;
    registry.register(
        ComponentClass::builder(Category::Global, "Time")
            .optional("currentStep", ParamKind::NonNegativeInteger)
            .optional("simulationTime", ParamKind::Real)
            .build()?,
        fundamental_time,
    )?;
    registry.register(ComponentClass::builder(Category::Global, "None").build()?, fundamental_none)?;
    registry.register(
        ComponentClass::builder(Category::Global, "DynamicallyBondedPatchyParticles")
            .defaulted("energyThreshold", ParamKind::Real, DefaultValue::Real(0.0))
            .build()?,
        fundamental_patchy,
    )?;
    Ok(())
}

fn units_none(_: &Parameters) -> Result<Built, ComponentError> {
    Ok(Forwarded::new(Section::Global, "Units", "None", Map::new())
        .named(UNITS_ENTRY)
        .boxed())
}

fn units_kcal(_: &Parameters) -> Result<Built, ComponentError> {
    Ok(Forwarded::new(Section::Global, "Units", "KcalMol_A", Map::new())
        .named(UNITS_ENTRY)
        .boxed())
}

/// Emits one row per particle type found in the simulation's models.
#[derive(Debug, Clone, Copy)]
struct BasicTypes;

impl Component for BasicTypes {
    fn fragment(&self, ctx: &FragmentContext<'_>) -> Result<Vec<Contribution>, ComponentError> {
        let mut table = Table::new(&["name", "mass", "radius", "charge"]);
        for (name, info) in ctx.types {
            table.push_row(vec![
                Value::from(name.as_str()),
                Value::from(info.mass),
                Value::from(info.radius),
                Value::from(info.charge),
            ])?;
        }
        let entry = Entry::new("Types", "Basic").with_table(table);
        Ok(vec![Contribution::entry(Section::Global, TYPES_ENTRY, entry)])
    }
}

fn types_basic(_: &Parameters) -> Result<Built, ComponentError> {
    Ok(Built::Component(Box::new(BasicTypes)))
}

fn ensemble_table(params: &Parameters, columns: &[&str]) -> Result<Table, ComponentError> {
    let mut table = Table::new(columns);
    let row = columns
        .iter()
        .map(|c| params.value(c).cloned().unwrap_or(Value::Null))
        .collect();
    table.push_row(row)?;
    Ok(table)
}

fn ensemble_nvt(params: &Parameters) -> Result<Built, ComponentError> {
    let table = ensemble_table(params, &["box", "temperature"])?;
    Ok(Forwarded::from_entry(Section::Global, Entry::new("Ensemble", "NVT").with_table(table))
        .named(ENSEMBLE_ENTRY)
        .boxed())
}

fn ensemble_nvt_lambda(params: &Parameters) -> Result<Built, ComponentError> {
    let table = ensemble_table(params, &["box", "temperature", "lambda"])?;
    Ok(Forwarded::from_entry(Section::Global, Entry::new("Ensemble", "NVTlambda").with_table(table))
        .named(ENSEMBLE_ENTRY)
        .boxed())
}

fn fundamental_time(params: &Parameters) -> Result<Built, ComponentError> {
    let forwarded = params.forward(&["currentStep", "simulationTime"]);
    Ok(Forwarded::new(Section::Global, "Fundamental", "Time", forwarded)
        .named(FUNDAMENTAL_ENTRY)
        .boxed())
}

fn fundamental_none(_: &Parameters) -> Result<Built, ComponentError> {
    Ok(Forwarded::new(Section::Global, "Fundamental", "None", Map::new())
        .named(FUNDAMENTAL_ENTRY)
        .boxed())
}

fn fundamental_patchy(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(Forwarded::new(
        Section::Global,
        "Fundamental",
        "DynamicallyBondedPatchyParticles",
        params.forward(&["energyThreshold"]),
    )
    .named(FUNDAMENTAL_ENTRY)
    .boxed())
}
