//! Integrators.
//!
//! `integrationSteps` is validated here but never forwarded: the composer
//! turns it into a row of the integrator schedule.

use crate::core::component::{Built, Category, ComponentClass, ComponentError, Forwarded};
use crate::core::document::Section;
use crate::core::registry::{Registry, RegistryError};
use crate::core::schema::{DefaultValue, ParamKind, Parameters};

pub const INTEGRATION_STEPS: &str = "integrationSteps";

pub(crate) fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        ComponentClass::builder(Category::Integrator, "BBK")
            .required("timeStep", ParamKind::PositiveReal)
            .required("frictionConstant", ParamKind::Real)
            .required(INTEGRATION_STEPS, ParamKind::PositiveInteger)
            .build()?,
        bbk,
    )?;
    registry.register(
        ComponentClass::builder(Category::Integrator, "GJF")
            .required("timeStep", ParamKind::PositiveReal)
            .required("frictionConstant", ParamKind::Real)
            .required(INTEGRATION_STEPS, ParamKind::PositiveInteger)
            .build()?,
        gjf,
    )?;
    registry.register(
        ComponentClass::builder(Category::Integrator, "EulerMaruyama")
            .required("timeStep", ParamKind::PositiveReal)
            .required("viscosity", ParamKind::PositiveReal)
            .required(INTEGRATION_STEPS, ParamKind::PositiveInteger)
            .build()?,
        euler_maruyama,
    )?;
    registry.register(
        ComponentClass::builder(Category::Integrator, "SteepestDescent")
            .required("h", ParamKind::PositiveReal)
            .required("maxObjectiveForce", ParamKind::PositiveReal)
            .required(INTEGRATION_STEPS, ParamKind::PositiveInteger)
            .build()?,
        steepest_descent,
    )?;
    registry.register(
        ComponentClass::builder(Category::Integrator, "VerletNVE")
            .required("timeStep", ParamKind::PositiveReal)
            .required(INTEGRATION_STEPS, ParamKind::PositiveInteger)
            .defaulted("initVelocities", ParamKind::Boolean, DefaultValue::Boolean(true))
            .build()?,
        verlet_nve,
    )?;
    Ok(())
}

fn bbk(params: &Parameters) -> Result<Built, ComponentError> {
    let forwarded = params.forward(&["timeStep", "frictionConstant"]);
    Ok(Forwarded::new(Section::Integrator, "Langevin", "BBK", forwarded).boxed())
}

fn gjf(params: &Parameters) -> Result<Built, ComponentError> {
    let forwarded = params.forward(&["timeStep", "frictionConstant"]);
    Ok(Forwarded::new(Section::Integrator, "Langevin", "GronbechJensenFarago", forwarded).boxed())
}

fn euler_maruyama(params: &Parameters) -> Result<Built, ComponentError> {
    let forwarded = params.forward(&["timeStep", "viscosity"]);
    Ok(Forwarded::new(Section::Integrator, "Brownian", "EulerMaruyama", forwarded).boxed())
}

fn steepest_descent(params: &Parameters) -> Result<Built, ComponentError> {
    let forwarded = params.forward(&["h", "maxObjectiveForce"]);
    Ok(Forwarded::new(Section::Integrator, "Minimization", "SteepestDescent", forwarded).boxed())
}

fn verlet_nve(params: &Parameters) -> Result<Built, ComponentError> {
    let forwarded = params.forward(&["timeStep", "initVelocities"]);
    Ok(Forwarded::new(Section::Integrator, "Verlet", "VelocityVerlet", forwarded).boxed())
}
