//! Simulation steps.
//!
//! Every step runs every `intervalStep` steps between the optional
//! `startStep` and `endStep`. Steps that drive or observe per-step state
//! (lambda control, patch polymer bookkeeping) must run on every step.

use crate::core::component::{Built, Category, ComponentClass, ComponentClassBuilder, ComponentError, Forwarded};
use crate::core::document::Section;
use crate::core::registry::{Registry, RegistryError};
use crate::core::schema::{ParamKind, ParameterError, ParameterErrorKind, Parameters};

pub const INTERVAL_STEP: &str = "intervalStep";
const SCHEDULE_KEYS: [&str; 3] = [INTERVAL_STEP, "startStep", "endStep"];

fn step_class(type_name: &'static str) -> ComponentClassBuilder {
    every_step_class(type_name, ParamKind::PositiveInteger)
}

fn every_step_class(type_name: &'static str, interval: ParamKind) -> ComponentClassBuilder {
    ComponentClass::builder(Category::SimulationStep, type_name)
        .required(INTERVAL_STEP, interval)
        .optional("startStep", ParamKind::NonNegativeInteger)
        .optional("endStep", ParamKind::NonNegativeInteger)
}

pub(crate) fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    let each_step = ParamKind::ExactInteger(1);

    registry.register(step_class("info").build()?, info)?;
    registry.register(
        step_class("saveState")
            .required("outputFilePath", ParamKind::Text)
            .required("outputFormat", ParamKind::Text)
            .build()?,
        save_state,
    )?;
    registry.register(
        step_class("thermodynamicMeasurement")
            .required("outputFilePath", ParamKind::Text)
            .selection("selection")
            .build()?,
        thermodynamic_measurement,
    )?;
    registry.register(
        step_class("centerOfMassMeasurement")
            .required("outputFilePath", ParamKind::Text)
            .required_selection("selection")
            .build()?,
        center_of_mass_measurement,
    )?;
    registry.register(
        every_step_class("lambdaActivation", each_step)
            .required("lambdaValues", ParamKind::RealList)
            .required("lambdaValueStep", ParamKind::PositiveInteger)
            .build()?,
        lambda_activation,
    )?;
    registry.register(
        every_step_class("lambdaCycle", each_step)
            .required("lambdaValues", ParamKind::RealList)
            .required("activationStep", ParamKind::PositiveInteger)
            .required("measureStep", ParamKind::PositiveInteger)
            .required("pauseStep", ParamKind::NonNegativeInteger)
            .build()?,
        lambda_cycle,
    )?;
    registry.register(
        every_step_class("patchPolymersMeasure", each_step)
            .required("outputFilePath", ParamKind::Text)
            .build()?,
        patch_polymers_measure,
    )?;
    Ok(())
}

fn step(params: &Parameters, class: &str, subclass: &str, extra: &[&str]) -> Result<Forwarded, ParameterError> {
    let window = (params.opt_integer("startStep")?, params.opt_integer("endStep")?);
    if let (Some(start), Some(end)) = window {
        if end < start {
            return Err(ParameterError::new(ParameterErrorKind::InvalidValue, "endStep", params.class())
                .with_detail(format!("({}) must not precede startStep ({})", end, start)));
        }
    }
    let mut parameters = params.forward(&SCHEDULE_KEYS);
    parameters.extend(params.forward(extra));
    Ok(Forwarded::new(Section::SimulationStep, class, subclass, parameters))
}

fn info(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(step(params, "UtilsStep", "InfoStep", &[])?.boxed())
}

fn save_state(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(step(params, "WriteStep", "WriteStep", &["outputFilePath", "outputFormat"])?.boxed())
}

fn thermodynamic_measurement(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(step(params, "ParticlesListMeasure", "ThermodynamicMeasure", &["outputFilePath"])?
        .with_selection(params.selection("selection"))
        .boxed())
}

fn center_of_mass_measurement(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(step(params, "GeometricalMeasure", "CenterOfMassMeasure", &["outputFilePath"])?
        .with_selection(params.selection("selection"))
        .boxed())
}

fn lambda_activation(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(step(params, "FlowControl", "LambdaActivation", &["lambdaValues", "lambdaValueStep"])?.boxed())
}

fn lambda_cycle(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(step(
        params,
        "FlowControl",
        "LambdaCycle",
        &["lambdaValues", "activationStep", "measureStep", "pauseStep"],
    )?
    .boxed())
}

fn patch_polymers_measure(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(step(params, "PatchyParticles", "PatchPolymersMeasure", &["outputFilePath"])?.boxed())
}
