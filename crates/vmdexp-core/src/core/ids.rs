use crate::core::models::{Model, TYPE_COLUMN};
use crate::core::selection::{self, SelectionError, SelectionExpr};
use serde_json::Value;
use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;
use thiserror::Error;

new_key_type! {
    /// A stable handle to a model inside an [`IdsHandler`].
    pub struct ModelKey;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdsError {
    #[error("Duplicate model name '{0}'")]
    DuplicateModel(String),

    #[error("Global id {id} is out of range (simulation has {total} particles)")]
    IdOutOfRange { id: usize, total: usize },

    #[error("Model '{model}' has no state column '{column}'")]
    UnknownStateColumn { model: String, column: String },

    #[error("Particle {id} has no type property '{property}'")]
    UnknownProperty { id: usize, property: String },

    #[error("Cannot write '{column}' of particle {id}: {detail}")]
    TypeMismatch {
        id: usize,
        column: String,
        detail: String,
    },

    #[error("Structure column '{column}' of model '{model}' holds a non-integer value")]
    NonIntegerStructure { model: String, column: String },
}

/// The flat global-id space of one simulation.
///
/// The handler owns the simulation's models for the duration of a
/// composition. Models keep their declaration order; each one's id offset is
/// the cumulative particle count of the models before it. Per-particle reads
/// and writes are addressed by global id and routed to the owning model.
#[derive(Debug, Default)]
pub struct IdsHandler {
    models: SlotMap<ModelKey, Model>,
    order: Vec<ModelKey>,
    by_name: HashMap<String, ModelKey>,
    id2model: Vec<ModelKey>,
    id2local: Vec<usize>,
}

impl IdsHandler {
    /// Assigns id offsets in order and builds the global lookup tables.
    ///
    /// # Errors
    ///
    /// Returns [`IdsError::DuplicateModel`] if two models share a name.
    pub fn new(models: Vec<Model>) -> Result<Self, IdsError> {
        let mut handler = IdsHandler::default();
        let mut offset = 0;
        for mut model in models {
            if handler.by_name.contains_key(model.name()) {
                return Err(IdsError::DuplicateModel(model.name().to_string()));
            }
            model.set_id_offset(offset);
            let count = model.particle_count();
            let name = model.name().to_string();
            let key = handler.models.insert(model);
            handler.order.push(key);
            handler.by_name.insert(name, key);
            handler.id2model.extend(std::iter::repeat_n(key, count));
            handler.id2local.extend(0..count);
            offset += count;
        }
        Ok(handler)
    }

    /// Iterates the models in declaration order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.order.iter().filter_map(|key| self.models.get(*key))
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.by_name.get(name).and_then(|key| self.models.get(*key))
    }

    pub fn model_count(&self) -> usize {
        self.order.len()
    }

    pub fn total_particles(&self) -> usize {
        self.id2local.len()
    }

    /// Returns the owning model and local id of a global id.
    pub fn locate(&self, id: usize) -> Result<(&Model, usize), IdsError> {
        let key = self.key_of(id)?;
        let model = self
            .models
            .get(key)
            .ok_or(IdsError::IdOutOfRange { id, total: self.total_particles() })?;
        Ok((model, self.id2local[id]))
    }

    fn key_of(&self, id: usize) -> Result<ModelKey, IdsError> {
        self.id2model.get(id).copied().ok_or(IdsError::IdOutOfRange {
            id,
            total: self.total_particles(),
        })
    }

    /// Reads a type property (`mass`, `radius`, `charge`) of a particle.
    pub fn property_of(&self, id: usize, property: &str) -> Result<f64, IdsError> {
        let (model, local) = self.locate(id)?;
        model
            .data()
            .type_of(local)
            .and_then(|t| model.types().get(t))
            .and_then(|info| info.property(property))
            .ok_or_else(|| IdsError::UnknownProperty {
                id,
                property: property.to_string(),
            })
    }

    pub fn state_of(&self, id: usize, column: &str) -> Result<&Value, IdsError> {
        let (model, local) = self.locate(id)?;
        model
            .state()
            .cell(local, column)
            .ok_or_else(|| IdsError::UnknownStateColumn {
                model: model.name().to_string(),
                column: column.to_string(),
            })
    }

    /// Overwrites one state cell.
    ///
    /// The new value must have the runtime shape of the existing one: a
    /// scalar replaces a scalar, a list replaces a list of the same length.
    /// On rejection the state is left untouched.
    pub fn set_state_of(&mut self, id: usize, column: &str, value: Value) -> Result<(), IdsError> {
        let key = self.key_of(id)?;
        let local = self.id2local[id];
        let total = self.total_particles();
        let model = self
            .models
            .get_mut(key)
            .ok_or(IdsError::IdOutOfRange { id, total })?;
        let model_name = model.name().to_string();
        let cell = model
            .state_mut()
            .cell_mut(local, column)
            .ok_or_else(|| IdsError::UnknownStateColumn {
                model: model_name,
                column: column.to_string(),
            })?;

        let mismatch = |detail: String| IdsError::TypeMismatch {
            id,
            column: column.to_string(),
            detail,
        };
        match (&*cell, &value) {
            (Value::Array(old), Value::Array(new)) if old.len() != new.len() => {
                return Err(mismatch(format!(
                    "expected a list of length {}, got {}",
                    old.len(),
                    new.len()
                )));
            }
            (Value::Array(_), Value::Array(_)) => {}
            (Value::Array(_), _) => return Err(mismatch("expected a list, got a scalar".into())),
            (_, Value::Array(_)) => return Err(mismatch("expected a scalar, got a list".into())),
            _ => {}
        }
        *cell = value;
        Ok(())
    }

    /// Returns a globally unique value of a structure column for each id.
    ///
    /// Models are numbered consecutively: a model holding the column
    /// occupies `max + 1` slots starting at the running offset, and a model
    /// without it occupies a single slot shared by all of its particles.
    pub fn structure_of(&self, ids: &[usize], column: &str) -> Result<Vec<i64>, IdsError> {
        let mut bases: HashMap<ModelKey, i64> = HashMap::new();
        let mut running: i64 = 0;
        for &key in &self.order {
            let Some(model) = self.models.get(key) else {
                continue;
            };
            bases.insert(key, running);
            running += match model.structure().column(column) {
                Some(values) => {
                    let mut max: Option<i64> = None;
                    for v in values {
                        let v = v.as_i64().ok_or_else(|| IdsError::NonIntegerStructure {
                            model: model.name().to_string(),
                            column: column.to_string(),
                        })?;
                        max = Some(max.map_or(v, |m| m.max(v)));
                    }
                    max.map_or(0, |m| m + 1)
                }
                None => 1,
            };
        }

        ids.iter()
            .map(|&id| {
                let (model, local) = self.locate(id)?;
                let key = self.key_of(id)?;
                let base = bases.get(&key).copied().unwrap_or_default();
                let local_value = model
                    .structure()
                    .cell(local, column)
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                Ok(base + local_value)
            })
            .collect()
    }

    /// Returns the type name of a particle.
    pub fn type_of(&self, id: usize) -> Result<&str, IdsError> {
        let (model, local) = self.locate(id)?;
        model
            .data()
            .type_of(local)
            .ok_or_else(|| IdsError::UnknownProperty {
                id,
                property: TYPE_COLUMN.to_string(),
            })
    }

    /// Resolves a selection expression against the handler's models.
    pub fn select(&self, expr: &SelectionExpr) -> Result<Vec<usize>, SelectionError> {
        selection::resolve(self.models(), expr)
    }

    /// Releases the models in declaration order.
    pub fn into_models(mut self) -> Vec<Model> {
        self.order
            .iter()
            .filter_map(|key| self.models.remove(*key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::testing::point_model;
    use crate::core::models::{Model, ModelData, ModelParts, PlainModel, TypeInfo};
    use crate::core::table::Table;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn model_with_ids(name: &str, model_ids: &[i64]) -> Model {
        let mut state = Table::new(&["position"]);
        let mut structure = Table::new(&["type", "modelId"]);
        for &m in model_ids {
            state.push_row(vec![json!([0.0, 0.0, 0.0])]).unwrap();
            structure.push_row(vec![json!("A"), json!(m)]).unwrap();
        }
        let data = ModelData {
            state,
            structure,
            force_field: BTreeMap::new(),
            types: BTreeMap::from([("A".to_string(), TypeInfo::new(2.0, 0.5, 0.0))]),
        };
        Model::new(name, "POLYMER", ModelParts::new(data, PlainModel), vec![]).unwrap()
    }

    #[test]
    fn offsets_cover_the_global_space_without_overlap() {
        let ids = IdsHandler::new(vec![point_model("A", 3), point_model("B", 0), point_model("C", 2)]).unwrap();
        let ranges: Vec<_> = ids.models().map(|m| m.global_id_range()).collect();
        assert_eq!(ranges, vec![0..3, 3..3, 3..5]);
        assert_eq!(ids.total_particles(), 5);

        let (model, local) = ids.locate(4).unwrap();
        assert_eq!((model.name(), local), ("C", 1));
        assert_eq!(
            ids.locate(5).unwrap_err(),
            IdsError::IdOutOfRange { id: 5, total: 5 }
        );
    }

    #[test]
    fn duplicate_model_names_are_rejected() {
        let err = IdsHandler::new(vec![point_model("A", 1), point_model("A", 1)]).unwrap_err();
        assert_eq!(err, IdsError::DuplicateModel("A".into()));
    }

    #[test]
    fn property_of_reads_the_type_table() {
        let ids = IdsHandler::new(vec![point_model("A", 1), model_with_ids("B", &[0])]).unwrap();
        assert_eq!(ids.property_of(0, "mass").unwrap(), 1.0);
        assert_eq!(ids.property_of(1, "mass").unwrap(), 2.0);
        assert!(matches!(
            ids.property_of(1, "spin"),
            Err(IdsError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn set_state_of_enforces_shape_and_leaves_state_untouched() {
        let mut ids = IdsHandler::new(vec![point_model("A", 2)]).unwrap();
        ids.set_state_of(1, "position", json!([5.0, 5.0, 5.0])).unwrap();
        assert_eq!(ids.state_of(1, "position").unwrap(), &json!([5.0, 5.0, 5.0]));

        let err = ids.set_state_of(1, "position", json!([1.0, 2.0])).unwrap_err();
        assert!(matches!(err, IdsError::TypeMismatch { id: 1, .. }));
        assert!(matches!(
            ids.set_state_of(1, "position", json!(3.0)),
            Err(IdsError::TypeMismatch { .. })
        ));
        assert_eq!(ids.state_of(1, "position").unwrap(), &json!([5.0, 5.0, 5.0]));
    }

    #[test]
    fn structure_of_numbers_models_contiguously() {
        let ids = IdsHandler::new(vec![
            model_with_ids("A", &[0, 0, 1, 1]),
            point_model("B", 2),
            model_with_ids("C", &[0, 1, 2]),
        ])
        .unwrap();
        let all: Vec<usize> = (0..ids.total_particles()).collect();
        let values = ids.structure_of(&all, "modelId").unwrap();
        assert_eq!(values, vec![0, 0, 1, 1, 2, 2, 3, 4, 5]);
    }

    #[test]
    fn into_models_keeps_declaration_order() {
        let ids = IdsHandler::new(vec![point_model("B", 1), point_model("A", 1)]).unwrap();
        let names: Vec<String> = ids.into_models().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
