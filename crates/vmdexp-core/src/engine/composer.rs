use super::error::ComposeError;
use crate::components::integrators::INTEGRATION_STEPS;
use crate::components::systems::SIMULATION_NAME;
use crate::core::component::{
    Built, Category, Component, ComponentClass, ComponentDescription, ComponentError, ComponentSummary,
    FragmentContext, ModelOperation, SimulationDescription, summarize,
};
use crate::core::document::{Contribution, EngineInput, Entry, Section};
use crate::core::ids::IdsHandler;
use crate::core::models::{Model, TypeInfo};
use crate::core::registry::Registry;
use crate::core::schema::Parameters;
use crate::core::table::Table;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument};

/// Name of the integrator schedule entry.
pub const SCHEDULE_ENTRY: &str = "schedule";

/// The composer's output for one simulation description.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedSimulation {
    pub name: String,
    pub document: EngineInput,
    pub summary: ComponentSummary,
    pub number_of_particles: usize,
    pub number_of_models: usize,
    pub integration_steps: usize,
}

impl ComposedSimulation {
    /// Scalar summaries usable as packing properties.
    pub fn property(&self, name: &str) -> Option<f64> {
        match name {
            "numberOfParticles" => Some(self.number_of_particles as f64),
            "numberOfModels" => Some(self.number_of_models as f64),
            "numberOfIntegrationSteps" => Some(self.integration_steps as f64),
            _ => None,
        }
    }
}

/// An instantiated component waiting to emit its fragment.
struct Instance<T: ?Sized> {
    category: Category,
    class: String,
    name: String,
    parameters: Parameters,
    component: Box<T>,
}

impl<T: ?Sized> Instance<T> {
    fn fail(&self, source: impl Into<ComponentError>) -> ComposeError {
        ComposeError::component(self.category, &self.class, &self.name, source)
    }
}

/// Instantiates components and merges their fragments into one engine input.
///
/// The composer is stateless between calls; one instance can compose any
/// number of descriptions, concurrently if needed.
#[derive(Debug, Clone, Copy)]
pub struct Composer<'a> {
    registry: &'a Registry,
}

impl<'a> Composer<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Composes one simulation description.
    ///
    /// # Arguments
    ///
    /// * `desc` - The simulation description to compose.
    ///
    /// # Return
    ///
    /// The merged engine input with its summary and packing properties.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError`] on the first invalid component, on duplicate
    /// names, on missing mandatory components, or when fragments collide.
    #[instrument(skip_all, fields(simulation = desc.simulation_name().unwrap_or_default()))]
    pub fn compose(&self, desc: &SimulationDescription) -> Result<ComposedSimulation, ComposeError> {
        check_names(desc)?;
        check_cardinality(desc)?;

        // Units and types first; types default to `basic`.
        let units = self.components(desc, Category::Units)?;
        let types = match desc.components(Category::Types) {
            [] => vec![self.component(Category::Types, &ComponentDescription::new("basic"))?],
            _ => self.components(desc, Category::Types)?,
        };

        let mut models = Vec::new();
        for d in desc.components(Category::Model) {
            models.push(self.model(d)?);
        }
        let collected_types = collect_types(&models)?;
        let mut ids = IdsHandler::new(models)?;
        debug!(
            particles = ids.total_particles(),
            models = ids.model_count(),
            "Models placed in the global id space."
        );

        for d in desc.components(Category::ModelOperation) {
            let op = self.operation(d)?;
            op.component.apply(&mut ids).map_err(|e| op.fail(e))?;
        }

        let extensions = self.components(desc, Category::ModelExtension)?;
        let ensemble = self.components(desc, Category::Ensemble)?;
        let integrators = self.components(desc, Category::Integrator)?;
        let systems = self.components(desc, Category::System)?;
        let globals = self.components(desc, Category::Global)?;
        let steps = self.components(desc, Category::SimulationStep)?;

        let mut contributions = Vec::new();
        emit_fragments(&units, &ids, &collected_types, &mut contributions)?;
        emit_fragments(&types, &ids, &collected_types, &mut contributions)?;
        emit_fragments(&globals, &ids, &collected_types, &mut contributions)?;
        for model in ids.models() {
            contributions.extend(model.fragment());
        }
        emit_fragments(&extensions, &ids, &collected_types, &mut contributions)?;
        emit_fragments(&ensemble, &ids, &collected_types, &mut contributions)?;
        emit_fragments(&integrators, &ids, &collected_types, &mut contributions)?;
        emit_fragments(&systems, &ids, &collected_types, &mut contributions)?;
        emit_fragments(&steps, &ids, &collected_types, &mut contributions)?;

        let (schedule, integration_steps) = schedule(&integrators)?;
        contributions.push(Contribution::entry(Section::Integrator, SCHEDULE_ENTRY, schedule));

        let document = EngineInput::merge(contributions)?;
        let name = desc.simulation_name().unwrap_or_default().to_string();
        debug!(
            particles = document.number_of_particles(),
            steps = integration_steps,
            "Simulation composed."
        );

        Ok(ComposedSimulation {
            name,
            summary: summarize(desc),
            number_of_particles: ids.total_particles(),
            number_of_models: ids.model_count(),
            integration_steps,
            document,
        })
    }

    fn lookup(&self, category: Category, d: &ComponentDescription) -> Result<(&ComponentClass, Parameters, Built), ComposeError> {
        let registration = self
            .registry
            .get(category, &d.type_name)
            .ok_or_else(|| ComposeError::UnknownComponent {
                category,
                class: d.type_name.clone(),
                name: d.instance_name().to_string(),
            })?;
        let fail = |e: ComponentError| ComposeError::component(category, &d.type_name, d.instance_name(), e);
        let parameters = registration
            .class
            .schema
            .validate(&d.type_name, &d.parameters)
            .map_err(|e| fail(e.into()))?;
        let built = (registration.constructor)(&parameters).map_err(fail)?;
        Ok((&registration.class, parameters, built))
    }

    fn wrong_kind(category: Category, d: &ComponentDescription, built: &Built) -> ComposeError {
        ComposeError::component(
            category,
            &d.type_name,
            d.instance_name(),
            ComponentError::Invalid(format!("constructor produced an unexpected component: {:?}", built)),
        )
    }

    fn component(&self, category: Category, d: &ComponentDescription) -> Result<Instance<dyn Component>, ComposeError> {
        match self.lookup(category, d)? {
            (_, parameters, Built::Component(component)) => Ok(Instance {
                category,
                class: d.type_name.clone(),
                name: d.instance_name().to_string(),
                parameters,
                component,
            }),
            (_, _, other) => Err(Self::wrong_kind(category, d, &other)),
        }
    }

    fn components(&self, desc: &SimulationDescription, category: Category) -> Result<Vec<Instance<dyn Component>>, ComposeError> {
        desc.components(category)
            .iter()
            .map(|d| self.component(category, d))
            .collect()
    }

    fn operation(&self, d: &ComponentDescription) -> Result<Instance<dyn ModelOperation>, ComposeError> {
        let category = Category::ModelOperation;
        match self.lookup(category, d)? {
            (_, parameters, Built::Operation(component)) => Ok(Instance {
                category,
                class: d.type_name.clone(),
                name: d.instance_name().to_string(),
                parameters,
                component,
            }),
            (_, _, other) => Err(Self::wrong_kind(category, d, &other)),
        }
    }

    fn model(&self, d: &ComponentDescription) -> Result<Model, ComposeError> {
        let category = Category::Model;
        match self.lookup(category, d)? {
            (class, _, Built::Model(parts)) => {
                Model::new(d.instance_name(), &d.type_name, parts, class.defined_selections.clone())
                    .map_err(|e| ComposeError::component(category, &d.type_name, d.instance_name(), e))
            }
            (_, _, other) => Err(Self::wrong_kind(category, d, &other)),
        }
    }
}

fn emit_fragments(
    instances: &[Instance<dyn Component>],
    ids: &IdsHandler,
    types: &BTreeMap<String, TypeInfo>,
    out: &mut Vec<Contribution>,
) -> Result<(), ComposeError> {
    for instance in instances {
        let ctx = FragmentContext {
            name: &instance.name,
            ids,
            types,
        };
        let fragment = instance.component.fragment(&ctx).map_err(|e| instance.fail(e))?;
        out.extend(fragment);
    }
    Ok(())
}

/// Names must be unique within each category.
fn check_names(desc: &SimulationDescription) -> Result<(), ComposeError> {
    for category in Category::ALL {
        let mut seen = HashSet::new();
        for d in desc.components(category) {
            if !seen.insert(d.instance_name()) {
                return Err(ComposeError::DuplicateName {
                    category,
                    name: d.instance_name().to_string(),
                });
            }
        }
    }
    Ok(())
}

fn check_cardinality(desc: &SimulationDescription) -> Result<(), ComposeError> {
    let count = |category| desc.components(category).len();
    let rules: [(Category, usize, Option<usize>); 6] = [
        (Category::Units, 1, Some(1)),
        (Category::Types, 0, Some(1)),
        (Category::Ensemble, 1, Some(1)),
        (Category::Global, 0, Some(1)),
        (Category::Model, 1, None),
        (Category::Integrator, 1, None),
    ];
    for (category, min, max) in rules {
        let found = count(category);
        if found < min || max.is_some_and(|max| found > max) {
            let expected = match (min, max) {
                (min, Some(max)) if min == max => format!("exactly {}", min),
                (_, Some(max)) => format!("at most {}", max),
                (min, None) => format!("at least {}", min),
            };
            return Err(ComposeError::Cardinality {
                category,
                message: format!("Expected {} {} component(s), found {}", expected, category.key(), found),
            });
        }
    }

    let names = desc
        .components(Category::System)
        .iter()
        .filter(|d| d.type_name == SIMULATION_NAME)
        .count();
    if names != 1 {
        return Err(ComposeError::Cardinality {
            category: Category::System,
            message: format!("Expected exactly one {} system, found {}", SIMULATION_NAME, names),
        });
    }
    Ok(())
}

/// Merges the types of every model; a type defined differently by two
/// models is a conflict.
fn collect_types(models: &[Model]) -> Result<BTreeMap<String, TypeInfo>, ComposeError> {
    let mut types: BTreeMap<String, (TypeInfo, &str)> = BTreeMap::new();
    for model in models {
        for (name, info) in model.types() {
            match types.get(name) {
                Some((existing, owner)) if existing != info => {
                    return Err(ComposeError::TypeConflict {
                        type_name: name.clone(),
                        first: owner.to_string(),
                        second: model.name().to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    types.insert(name.clone(), (*info, model.name()));
                }
            }
        }
    }
    Ok(types.into_iter().map(|(name, (info, _))| (name, info)).collect())
}

/// Builds the integrator schedule: one `[order, integrator, steps]` row per
/// integrator, in declaration order, with orders starting at 1.
fn schedule(integrators: &[Instance<dyn Component>]) -> Result<(Entry, usize), ComposeError> {
    let mut table = Table::new(&["order", "integrator", "steps"]);
    let mut total = 0;
    for (order, integrator) in integrators.iter().enumerate() {
        let steps = integrator
            .parameters
            .count(INTEGRATION_STEPS)
            .map_err(|e| integrator.fail(e))?;
        total += steps;
        table
            .push_row(vec![
                Value::from(order + 1),
                Value::from(integrator.name.as_str()),
                Value::from(steps),
            ])
            .map_err(|e| integrator.fail(e))?;
    }
    Ok((Entry::new("Schedule", "Integrator").with_table(table), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ParameterErrorKind;
    use serde_json::json;

    fn description(value: Value) -> SimulationDescription {
        serde_json::from_value(value).unwrap()
    }

    fn base(extra: Value) -> Value {
        let mut base = json!({
            "system": [{"type": "simulationName", "parameters": {"simulationName": "test"}}],
            "units": {"type": "none"},
            "ensemble": {"type": "NVT", "parameters": {"box": [10, 10, 10], "temperature": 1.0}},
            "integrators": [{"type": "BBK", "name": "bbk",
                "parameters": {"timeStep": 0.01, "frictionConstant": 1.0, "integrationSteps": 100}}],
            "models": [{"type": "PARTICLES", "name": "p",
                "parameters": {"positions": [[0, 0, 0], [1, 0, 0], [2, 0, 0]]}}]
        });
        if let (Some(target), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        base
    }

    fn compose(value: Value) -> Result<ComposedSimulation, ComposeError> {
        let registry = Registry::with_builtins().unwrap();
        Composer::new(&registry).compose(&description(value))
    }

    #[test]
    fn minimal_simulation_composes_every_section() {
        let sim = compose(base(json!({}))).unwrap();
        assert_eq!(sim.name, "test");
        assert_eq!(sim.number_of_particles, 3);
        assert_eq!(sim.integration_steps, 100);

        let doc = &sim.document;
        assert_eq!(doc.state.labels, vec!["id", "position"]);
        assert!(doc.global.contains_key("units"));
        assert!(doc.global.contains_key("types"));
        assert!(doc.global.contains_key("ensemble"));
        assert!(!doc.integrator["bbk"].parameters.contains_key("integrationSteps"));
        assert_eq!(
            doc.integrator[SCHEDULE_ENTRY].data,
            vec![vec![json!(1), json!("bbk"), json!(100)]]
        );
        assert_eq!(doc.system["simulationName"].parameters["name"], json!("test"));
    }

    #[test]
    fn missing_required_parameter_is_reported_with_context() {
        let err = compose(base(json!({
            "integrators": [{"type": "BBK", "name": "bbk",
                "parameters": {"timeStep": 0.01, "integrationSteps": 100}}]
        })))
        .unwrap_err();
        match &err {
            ComposeError::Component {
                source: ComponentError::Parameter(p),
                ..
            } => {
                assert_eq!(p.kind, ParameterErrorKind::Missing);
                assert_eq!(p.key, "frictionConstant");
                assert_eq!(p.class, "BBK");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "[Integrator] (BBK) Required parameter frictionConstant not given for integrator bbk"
        );
    }

    #[test]
    fn zero_integration_steps_is_a_parameter_error() {
        let err = compose(base(json!({
            "integrators": [{"type": "BBK",
                "parameters": {"timeStep": 0.01, "frictionConstant": 1.0, "integrationSteps": 0}}]
        })))
        .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Component {
                source: ComponentError::Parameter(_),
                ..
            }
        ));
    }

    #[test]
    fn duplicate_names_within_a_category_fail() {
        let err = compose(base(json!({
            "modelOperations": [
                {"type": "translate", "name": "t", "parameters": {"translation": [1, 0, 0], "selection": {}}},
                {"type": "translate", "name": "t", "parameters": {"translation": [1, 0, 0], "selection": {}}}
            ]
        })))
        .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::DuplicateName {
                category: Category::ModelOperation,
                ..
            }
        ));
    }

    #[test]
    fn unknown_component_type_fails() {
        let err = compose(base(json!({"units": {"type": "furlongs"}}))).unwrap_err();
        assert!(matches!(err, ComposeError::UnknownComponent { .. }));
    }

    #[test]
    fn missing_simulation_name_fails() {
        let err = compose(base(json!({"system": []}))).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Cardinality {
                category: Category::System,
                ..
            }
        ));
    }

    #[test]
    fn integrators_are_scheduled_in_declaration_order() {
        let sim = compose(base(json!({
            "integrators": [
                {"type": "SteepestDescent", "name": "relax",
                    "parameters": {"h": 0.1, "maxObjectiveForce": 1.0, "integrationSteps": 50}},
                {"type": "BBK", "name": "run",
                    "parameters": {"timeStep": 0.01, "frictionConstant": 1.0, "integrationSteps": 200}}
            ]
        })))
        .unwrap();
        assert_eq!(
            sim.document.integrator[SCHEDULE_ENTRY].data,
            vec![
                vec![json!(1), json!("relax"), json!(50)],
                vec![json!(2), json!("run"), json!(200)]
            ]
        );
        assert_eq!(sim.property("numberOfIntegrationSteps"), Some(250.0));
    }

    #[test]
    fn conflicting_types_across_models_fail() {
        let err = compose(base(json!({
            "models": [
                {"type": "PARTICLES", "name": "a", "parameters": {"positions": [[0, 0, 0]]}},
                {"type": "PARTICLES", "name": "b", "parameters": {"positions": [[0, 0, 0]], "particleMass": 2.0}}
            ]
        })))
        .unwrap_err();
        assert!(matches!(err, ComposeError::TypeConflict { .. }));
    }

    #[test]
    fn composition_is_deterministic() {
        let value = base(json!({
            "models": [{"type": "GAS", "name": "g",
                "parameters": {"numberOfParticles": 20, "box": [5, 5, 5], "seed": 3}}],
            "modelOperations": [{"type": "distributeRandomly", "parameters": {"box": [5, 5, 5]}}]
        }));
        let a = serde_json::to_string(&compose(value.clone()).unwrap().document).unwrap();
        let b = serde_json::to_string(&compose(value).unwrap().document).unwrap();
        assert_eq!(a, b);
    }
}
