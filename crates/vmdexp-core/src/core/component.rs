use crate::core::document::{Contribution, Entry, EntryType, GROUPS_ENTRY, Group, Section};
use crate::core::ids::{IdsError, IdsHandler};
use crate::core::models::{ModelError, ModelParts, TypeInfo};
use crate::core::registry::RegistryError;
use crate::core::schema::{DefaultValue, ParamKind, ParamSpec, ParameterError, Parameters, Schema};
use crate::core::selection::{SelectionError, SelectionExpr};
use crate::core::table::TableError;
use phf::phf_map;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of component categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    System,
    Units,
    Types,
    Ensemble,
    Model,
    ModelOperation,
    ModelExtension,
    Integrator,
    SimulationStep,
    Global,
}

static CATEGORY_KEYS: phf::Map<&'static str, Category> = phf_map! {
    "system" => Category::System,
    "systems" => Category::System,
    "units" => Category::Units,
    "types" => Category::Types,
    "ensemble" => Category::Ensemble,
    "ensembles" => Category::Ensemble,
    "model" => Category::Model,
    "models" => Category::Model,
    "modelOperation" => Category::ModelOperation,
    "modelOperations" => Category::ModelOperation,
    "modelExtension" => Category::ModelExtension,
    "modelExtensions" => Category::ModelExtension,
    "integrator" => Category::Integrator,
    "integrators" => Category::Integrator,
    "simulationStep" => Category::SimulationStep,
    "simulationSteps" => Category::SimulationStep,
    "global" => Category::Global,
    "globals" => Category::Global,
};

impl Category {
    pub const ALL: [Category; 10] = [
        Category::System,
        Category::Units,
        Category::Types,
        Category::Ensemble,
        Category::Model,
        Category::ModelOperation,
        Category::ModelExtension,
        Category::Integrator,
        Category::SimulationStep,
        Category::Global,
    ];

    /// The key used for this category in descriptions and summaries.
    pub fn key(self) -> &'static str {
        match self {
            Category::System => "system",
            Category::Units => "units",
            Category::Types => "types",
            Category::Ensemble => "ensemble",
            Category::Model => "model",
            Category::ModelOperation => "modelOperation",
            Category::ModelExtension => "modelExtension",
            Category::Integrator => "integrator",
            Category::SimulationStep => "simulationStep",
            Category::Global => "global",
        }
    }

    /// The tag used in error messages, e.g. `Integrator`.
    pub fn tag(self) -> &'static str {
        match self {
            Category::System => "System",
            Category::Units => "Units",
            Category::Types => "Types",
            Category::Ensemble => "Ensemble",
            Category::Model => "Model",
            Category::ModelOperation => "ModelOperation",
            Category::ModelExtension => "ModelExtension",
            Category::Integrator => "Integrator",
            Category::SimulationStep => "SimulationStep",
            Category::Global => "Global",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = DescriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATEGORY_KEYS
            .get(s)
            .copied()
            .ok_or_else(|| DescriptionError::UnknownCategory(s.to_string()))
    }
}

/// Immutable metadata of one component class.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentClass {
    pub category: Category,
    pub type_name: &'static str,
    pub schema: Schema,
    /// Selection predicates understood by a model class.
    pub defined_selections: Vec<&'static str>,
}

impl ComponentClass {
    pub fn builder(category: Category, type_name: &'static str) -> ComponentClassBuilder {
        ComponentClassBuilder {
            category,
            type_name,
            schema: Schema::default(),
            defined_selections: Vec::new(),
        }
    }
}

pub struct ComponentClassBuilder {
    category: Category,
    type_name: &'static str,
    schema: Schema,
    defined_selections: Vec<&'static str>,
}

impl ComponentClassBuilder {
    pub fn required(self, name: &'static str, kind: ParamKind) -> Self {
        self.optional(name, kind).require(name)
    }

    pub fn optional(mut self, name: &'static str, kind: ParamKind) -> Self {
        self.schema.parameters.push(ParamSpec {
            name,
            kind,
            default: None,
        });
        self
    }

    pub fn defaulted(mut self, name: &'static str, kind: ParamKind, default: DefaultValue) -> Self {
        self.schema.parameters.push(ParamSpec {
            name,
            kind,
            default: Some(default),
        });
        self
    }

    /// Marks a key as required without declaring it.
    pub fn require(mut self, name: &'static str) -> Self {
        self.schema.required_parameters.push(name);
        self
    }

    pub fn selection(mut self, name: &'static str) -> Self {
        self.schema.selections.push(name);
        self
    }

    pub fn required_selection(mut self, name: &'static str) -> Self {
        self.schema.selections.push(name);
        self.schema.required_selections.push(name);
        self
    }

    pub fn predicates(mut self, names: &[&'static str]) -> Self {
        self.defined_selections.extend_from_slice(names);
        self
    }

    pub fn build(self) -> Result<ComponentClass, RegistryError> {
        if let Some(key) = self.schema.inconsistency() {
            return Err(RegistryError::SchemaInconsistency {
                category: self.category,
                type_name: self.type_name.to_string(),
                key: key.to_string(),
            });
        }
        Ok(ComponentClass {
            category: self.category,
            type_name: self.type_name,
            schema: self.schema,
            defined_selections: self.defined_selections,
        })
    }
}

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Ids(#[from] IdsError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Read-only view handed to components when they emit their fragment.
#[derive(Debug, Clone, Copy)]
pub struct FragmentContext<'a> {
    /// The instance name of the component being emitted.
    pub name: &'a str,
    pub ids: &'a IdsHandler,
    /// Types collected from every model of the simulation.
    pub types: &'a BTreeMap<String, TypeInfo>,
}

impl FragmentContext<'_> {
    /// Resolves a selection into a group named after the component.
    pub fn group(&self, expr: &SelectionExpr) -> Result<Group, SelectionError> {
        Ok(Group {
            name: self.name.to_string(),
            ids: self.ids.select(expr)?,
        })
    }
}

/// A component whose only job is to contribute to the engine input.
pub trait Component: fmt::Debug + Send + Sync {
    fn fragment(&self, ctx: &FragmentContext<'_>) -> Result<Vec<Contribution>, ComponentError>;
}

/// A component that edits model state during composition.
pub trait ModelOperation: fmt::Debug + Send + Sync {
    fn apply(&self, ids: &mut IdsHandler) -> Result<(), ComponentError>;
}

/// What a class constructor produces.
#[derive(Debug)]
pub enum Built {
    Component(Box<dyn Component>),
    Operation(Box<dyn ModelOperation>),
    Model(ModelParts),
}

pub type Constructor = fn(&Parameters) -> Result<Built, ComponentError>;

/// A component emitting one fixed entry, optionally with a resolved group.
///
/// Most built-in classes are thin adapters that forward a subset of their
/// parameters into a single entry; this covers all of them.
#[derive(Debug, Clone)]
pub struct Forwarded {
    section: Section,
    entry_name: Option<&'static str>,
    entry: Entry,
    selection: Option<SelectionExpr>,
}

impl Forwarded {
    pub fn new(section: Section, class: &str, subclass: &str, parameters: Map<String, Value>) -> Self {
        Self::from_entry(section, Entry::new(class, subclass).with_parameters(parameters))
    }

    /// Emits under a fixed name instead of the instance name.
    pub fn named(mut self, name: &'static str) -> Self {
        self.entry_name = Some(name);
        self
    }

    pub fn from_entry(section: Section, entry: Entry) -> Self {
        Self {
            section,
            entry_name: None,
            entry,
            selection: None,
        }
    }

    /// Resolves `selection` at emission into a group referenced by `group`.
    pub fn with_selection(mut self, selection: Option<&SelectionExpr>) -> Self {
        self.selection = selection.cloned();
        self
    }

    pub fn entry_type(&self) -> &EntryType {
        &self.entry.entry_type
    }

    pub fn boxed(self) -> Built {
        Built::Component(Box::new(self))
    }
}

impl Component for Forwarded {
    fn fragment(&self, ctx: &FragmentContext<'_>) -> Result<Vec<Contribution>, ComponentError> {
        let name = self.entry_name.unwrap_or(ctx.name);
        let mut entry = self.entry.clone();
        let mut out = Vec::with_capacity(2);
        if let Some(selection) = &self.selection {
            let group = ctx.group(selection)?;
            entry.parameters.insert("group".into(), Value::from(group.name.as_str()));
            out.push(Contribution::entry(
                self.section,
                GROUPS_ENTRY,
                Entry::groups_list(&[group]),
            ));
        }
        out.insert(0, Contribution::entry(self.section, name, entry));
        Ok(out)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DescriptionError {
    #[error("Unknown component category '{0}'")]
    UnknownCategory(String),

    #[error("Category '{0}' is given twice (singular and plural keys)")]
    RepeatedCategory(Category),
}

/// One user-provided component: `{type, name?, parameters?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescription {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ComponentDescription {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            name: None,
            parameters: Map::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    /// The instance name, defaulting to the type name.
    pub fn instance_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.type_name)
    }
}

/// A category value: a single description or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(ComponentDescription),
    Many(Vec<ComponentDescription>),
}

/// A simulation description: component descriptions grouped by category.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, OneOrMany>", into = "BTreeMap<String, Vec<ComponentDescription>>")]
pub struct SimulationDescription {
    components: BTreeMap<Category, Vec<ComponentDescription>>,
}

impl SimulationDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: Category, description: ComponentDescription) -> Self {
        self.components.entry(category).or_default().push(description);
        self
    }

    pub fn components(&self, category: Category) -> &[ComponentDescription] {
        self.components.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    /// The simulation name declared by the `simulationName` system component.
    pub fn simulation_name(&self) -> Option<&str> {
        self.components(Category::System)
            .iter()
            .find(|d| d.type_name == "simulationName")
            .and_then(|d| d.parameters.get("simulationName"))
            .and_then(Value::as_str)
    }
}

impl TryFrom<BTreeMap<String, OneOrMany>> for SimulationDescription {
    type Error = DescriptionError;

    fn try_from(raw: BTreeMap<String, OneOrMany>) -> Result<Self, Self::Error> {
        let mut components = BTreeMap::new();
        for (key, value) in raw {
            let category: Category = key.parse()?;
            let list = match value {
                OneOrMany::One(d) => vec![d],
                OneOrMany::Many(list) => list,
            };
            if components.insert(category, list).is_some() {
                return Err(DescriptionError::RepeatedCategory(category));
            }
        }
        Ok(Self { components })
    }
}

impl From<SimulationDescription> for BTreeMap<String, Vec<ComponentDescription>> {
    fn from(desc: SimulationDescription) -> Self {
        desc.components
            .into_iter()
            .map(|(category, list)| (category.key().to_string(), list))
            .collect()
    }
}

/// One summarized component: its name, type and the parameters as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub parameters: Map<String, Value>,
}

/// `{category: [{name, type, parameters}]}` for one simulation or set.
pub type ComponentSummary = BTreeMap<String, Vec<SummaryEntry>>;

pub fn summarize(desc: &SimulationDescription) -> ComponentSummary {
    desc.components
        .iter()
        .map(|(category, list)| {
            let entries = list
                .iter()
                .map(|d| SummaryEntry {
                    name: d.instance_name().to_string(),
                    type_name: d.type_name.clone(),
                    parameters: d.parameters.clone(),
                })
                .collect();
            (category.key().to_string(), entries)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn singular_and_plural_keys_map_to_the_same_category() {
        assert_eq!("integrators".parse::<Category>().unwrap(), Category::Integrator);
        assert_eq!("integrator".parse::<Category>().unwrap(), Category::Integrator);
        assert!(matches!(
            "integratorz".parse::<Category>(),
            Err(DescriptionError::UnknownCategory(_))
        ));
    }

    #[test]
    fn description_accepts_single_objects_and_lists() {
        let desc: SimulationDescription = serde_json::from_value(json!({
            "units": {"type": "none"},
            "models": [{"type": "PARTICLES", "name": "p", "parameters": {"positions": [[0, 0, 0]]}}]
        }))
        .unwrap();
        assert_eq!(desc.components(Category::Units)[0].instance_name(), "none");
        assert_eq!(desc.components(Category::Model)[0].instance_name(), "p");
        assert!(desc.components(Category::Integrator).is_empty());
    }

    #[test]
    fn description_rejects_repeated_categories() {
        let err = serde_json::from_value::<SimulationDescription>(json!({
            "model": [], "models": []
        }))
        .unwrap_err();
        assert!(err.to_string().contains("given twice"));
    }

    #[test]
    fn summary_reproduces_parameters_as_given() {
        let desc = SimulationDescription::new().with(
            Category::Integrator,
            ComponentDescription::new("BBK").named("bbk").with("timeStep", 0.01),
        );
        let summary = summarize(&desc);
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({"integrator": [{"name": "bbk", "type": "BBK", "parameters": {"timeStep": 0.01}}]})
        );
    }

    #[test]
    fn builder_rejects_required_keys_outside_available() {
        let err = ComponentClass::builder(Category::Integrator, "Broken")
            .optional("timeStep", ParamKind::Real)
            .require("frictionConstant")
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::SchemaInconsistency { .. }));
    }
}
