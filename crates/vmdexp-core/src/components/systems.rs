use crate::core::component::{Built, Category, ComponentClass, ComponentError, Forwarded};
use crate::core::document::Section;
use crate::core::registry::{Registry, RegistryError};
use crate::core::schema::{DefaultValue, ParamKind, ParameterError, ParameterErrorKind, Parameters};
use crate::core::utils::paths::is_plain_component;
use serde_json::{Map, Value};

/// The system class every simulation must declare exactly once.
pub const SIMULATION_NAME: &str = "simulationName";

pub(crate) fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        ComponentClass::builder(Category::System, SIMULATION_NAME)
            .required("simulationName", ParamKind::Text)
            .build()?,
        simulation_name,
    )?;
    registry.register(
        ComponentClass::builder(Category::System, "backup")
            .required("backupIntervalStep", ParamKind::PositiveInteger)
            .defaulted("backupFilePath", ParamKind::Text, DefaultValue::Text("backup"))
            .optional("backupStartStep", ParamKind::NonNegativeInteger)
            .optional("backupEndStep", ParamKind::NonNegativeInteger)
            .build()?,
        backup,
    )?;
    registry.register(
        ComponentClass::builder(Category::System, "seed")
            .required("seed", ParamKind::Integer)
            .build()?,
        seed,
    )?;
    Ok(())
}

fn simulation_name(params: &Parameters) -> Result<Built, ComponentError> {
    let name = params.text("simulationName")?;
    if !is_plain_component(name) {
        return Err(ParameterError::new(ParameterErrorKind::InvalidValue, "simulationName", params.class())
            .with_detail(format!("'{}' is not usable as a directory name", name))
            .into());
    }
    let mut parameters = Map::new();
    parameters.insert("name".into(), Value::from(name));
    Ok(Forwarded::new(Section::System, "Simulation", "Information", parameters).boxed())
}

fn backup(params: &Parameters) -> Result<Built, ComponentError> {
    let forwarded = params.forward(&[
        "backupIntervalStep",
        "backupFilePath",
        "backupStartStep",
        "backupEndStep",
    ]);
    Ok(Forwarded::new(Section::System, "Simulation", "Backup", forwarded).boxed())
}

fn seed(params: &Parameters) -> Result<Built, ComponentError> {
    Ok(Forwarded::new(Section::System, "Simulation", "Seed", params.forward(&["seed"])).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn construct(name: &str) -> Result<Built, ComponentError> {
        let registry = Registry::with_builtins().unwrap();
        let registration = registry.get(Category::System, SIMULATION_NAME).unwrap();
        let given = json!({ "simulationName": name });
        let params = registration
            .class
            .schema
            .validate(SIMULATION_NAME, given.as_object().unwrap())
            .unwrap();
        (registration.constructor)(&params)
    }

    #[test]
    fn simulation_name_must_be_a_plain_directory_name() {
        assert!(construct("run_01").is_ok());
        for bad in ["../../escaped", "a/b", "..", ""] {
            match construct(bad) {
                Err(ComponentError::Parameter(e)) => {
                    assert_eq!(e.kind, ParameterErrorKind::InvalidValue);
                    assert_eq!(e.key, "simulationName");
                }
                other => panic!("{:?} was not rejected: {:?}", bad, other.map(|_| ())),
            }
        }
    }
}
