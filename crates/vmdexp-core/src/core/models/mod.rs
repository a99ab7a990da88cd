//! # Core Models Module
//!
//! This module defines the particle models that make up a simulation: the three
//! data bundles every model carries, the per-type physical properties, and the
//! hook through which a model answers selection predicates.
//!
//! ## Overview
//!
//! A [`Model`] is a named component instance owning
//!
//! - **state** - per-particle dynamic values (positions, velocities, ...), one row per local id
//! - **structure** - per-particle static attributes, always including `type`
//! - **force field** - named interaction terms expressed in local ids
//! - **types** - the physical properties shared by every particle of a type
//!
//! Local ids are row indices. When a model joins a simulation it receives an
//! id offset, and its global ids are `[offset, offset + N)`. The model keeps
//! its tables in local ids; renumbering happens only when its fragment is
//! emitted.

use crate::core::document::{Contribution, Entry, Section};
use crate::core::selection::{PARTICLE_ID, SelectionError, parse_ids};
use crate::core::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Structure column holding each particle's type name.
pub const TYPE_COLUMN: &str = "type";
/// State column holding each particle's position.
pub const POSITION_COLUMN: &str = "position";

/// Physical properties shared by all particles of one type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub mass: f64,
    pub radius: f64,
    pub charge: f64,
}

impl TypeInfo {
    pub fn new(mass: f64, radius: f64, charge: f64) -> Self {
        Self {
            mass,
            radius,
            charge,
        }
    }

    /// Looks up a property by its document name.
    pub fn property(&self, name: &str) -> Option<f64> {
        match name {
            "mass" => Some(self.mass),
            "radius" => Some(self.radius),
            "charge" => Some(self.charge),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("State has {state} rows but structure has {structure}")]
    RowCountMismatch { state: usize, structure: usize },

    #[error("Structure is missing the '{TYPE_COLUMN}' column")]
    MissingTypeColumn,

    #[error("Particle {local_id} has type '{type_name}' which is not defined by the model")]
    UndefinedType { local_id: usize, type_name: String },

    #[error("Particle {local_id} has a non-string type")]
    InvalidType { local_id: usize },
}

/// The data bundles of one model, in local ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    pub state: Table,
    pub structure: Table,
    pub force_field: BTreeMap<String, Entry>,
    pub types: BTreeMap<String, TypeInfo>,
}

impl ModelData {
    pub fn particle_count(&self) -> usize {
        self.state.len()
    }

    /// Returns the type name of a local particle.
    pub fn type_of(&self, local_id: usize) -> Option<&str> {
        self.structure.cell(local_id, TYPE_COLUMN)?.as_str()
    }

    /// Checks that state and structure line up and that every referenced
    /// type is defined.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.state.len() != self.structure.len() {
            return Err(ModelError::RowCountMismatch {
                state: self.state.len(),
                structure: self.structure.len(),
            });
        }
        let column = self
            .structure
            .column(TYPE_COLUMN)
            .ok_or(ModelError::MissingTypeColumn)?;
        for (local_id, value) in column.enumerate() {
            let type_name = value
                .as_str()
                .ok_or(ModelError::InvalidType { local_id })?;
            if !self.types.contains_key(type_name) {
                return Err(ModelError::UndefinedType {
                    local_id,
                    type_name: type_name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The model-type specific part of a model: its selection vocabulary.
///
/// `particleId` and `type` are answered by [`Model`] itself; every other
/// predicate advertised by the model's class is forwarded here.
pub trait ModelKind: fmt::Debug + Send + Sync {
    fn select(
        &self,
        data: &ModelData,
        predicate: &str,
        value: &Value,
    ) -> Result<BTreeSet<usize>, SelectionError>;
}

/// A model without predicates beyond the common ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainModel;

impl ModelKind for PlainModel {
    fn select(
        &self,
        _data: &ModelData,
        predicate: &str,
        _value: &Value,
    ) -> Result<BTreeSet<usize>, SelectionError> {
        Err(SelectionError::InvalidPredicateValue {
            predicate: predicate.to_string(),
            reason: "predicate is not implemented by this model".into(),
        })
    }
}

/// What a model constructor produces, before the model is named.
#[derive(Debug)]
pub struct ModelParts {
    pub data: ModelData,
    pub kind: Box<dyn ModelKind>,
}

impl ModelParts {
    pub fn new(data: ModelData, kind: impl ModelKind + 'static) -> Self {
        Self {
            data,
            kind: Box::new(kind),
        }
    }
}

/// A named model instance inside one simulation.
#[derive(Debug)]
pub struct Model {
    name: String,
    class: String,
    data: ModelData,
    kind: Box<dyn ModelKind>,
    defined_selections: Vec<&'static str>,
    id_offset: usize,
}

impl Model {
    /// Creates a model from constructor output.
    ///
    /// # Arguments
    ///
    /// * `name` - The instance name, unique among the simulation's models.
    /// * `class` - The model class (e.g. `POLYMER`), used in messages.
    /// * `parts` - The data bundles and selection hook built by the class.
    /// * `defined_selections` - The predicates the class advertises.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the data bundles are inconsistent.
    pub fn new(
        name: impl Into<String>,
        class: impl Into<String>,
        parts: ModelParts,
        defined_selections: Vec<&'static str>,
    ) -> Result<Self, ModelError> {
        parts.data.validate()?;
        Ok(Self {
            name: name.into(),
            class: class.into(),
            data: parts.data,
            kind: parts.kind,
            defined_selections,
            id_offset: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn particle_count(&self) -> usize {
        self.data.particle_count()
    }

    pub fn id_offset(&self) -> usize {
        self.id_offset
    }

    pub(crate) fn set_id_offset(&mut self, offset: usize) {
        self.id_offset = offset;
    }

    pub fn global_id_range(&self) -> Range<usize> {
        self.id_offset..self.id_offset + self.particle_count()
    }

    pub fn state(&self) -> &Table {
        &self.data.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut Table {
        &mut self.data.state
    }

    pub fn structure(&self) -> &Table {
        &self.data.structure
    }

    pub fn force_field(&self) -> &BTreeMap<String, Entry> {
        &self.data.force_field
    }

    pub fn types(&self) -> &BTreeMap<String, TypeInfo> {
        &self.data.types
    }

    pub fn data(&self) -> &ModelData {
        &self.data
    }

    pub fn defined_selections(&self) -> &[&'static str] {
        &self.defined_selections
    }

    pub fn defines_selection(&self, predicate: &str) -> bool {
        predicate == PARTICLE_ID || self.defined_selections.contains(&predicate)
    }

    /// Resolves predicates to a set of local ids.
    ///
    /// An empty predicate map selects every particle. With several
    /// predicates the result is their intersection.
    pub fn resolve_selection(
        &self,
        predicates: &BTreeMap<String, Value>,
    ) -> Result<BTreeSet<usize>, SelectionError> {
        let n = self.particle_count();
        let mut result: BTreeSet<usize> = (0..n).collect();
        for (predicate, value) in predicates {
            if !self.defines_selection(predicate) {
                return Err(SelectionError::UnknownPredicate {
                    model: self.name.clone(),
                    predicate: predicate.clone(),
                });
            }
            let matched = match predicate.as_str() {
                PARTICLE_ID => {
                    let ids = parse_ids(predicate, value)?;
                    if let Some(&bad) = ids.iter().find(|&&id| id < 0 || id as usize >= n) {
                        return Err(SelectionError::IdOutOfRange { id: bad, limit: n });
                    }
                    ids.into_iter().map(|id| id as usize).collect()
                }
                TYPE_COLUMN => self.select_types(value)?,
                _ => self.kind.select(&self.data, predicate, value)?,
            };
            result = result.intersection(&matched).copied().collect();
        }
        Ok(result)
    }

    fn select_types(&self, value: &Value) -> Result<BTreeSet<usize>, SelectionError> {
        let invalid = || SelectionError::InvalidPredicateValue {
            predicate: TYPE_COLUMN.to_string(),
            reason: "expected a type name or a list of type names".into(),
        };
        let wanted: Vec<&str> = match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().ok_or_else(invalid))
                .collect::<Result<_, _>>()?,
            _ => return Err(invalid()),
        };
        Ok((0..self.particle_count())
            .filter(|&i| self.data.type_of(i).is_some_and(|t| wanted.contains(&t)))
            .collect())
    }

    /// The model's contribution to the engine input, in global ids.
    ///
    /// State and structure gain an `id` column starting at the id offset.
    /// Force-field terms are prefixed with the model name so that models
    /// using the same term names do not collide.
    pub fn fragment(&self) -> Vec<Contribution> {
        let offset = self.id_offset;
        let mut out = vec![
            Contribution::State(self.data.state.with_id_column(offset)),
            Contribution::Structure(self.data.structure.with_id_column(offset)),
        ];
        for (term, entry) in &self.data.force_field {
            let mut entry = entry.clone();
            entry.shift_ids(offset as i64);
            out.push(Contribution::entry(
                Section::ForceField,
                format!("{}_{}", self.name, term),
                entry,
            ));
        }
        out
    }
}

/// Builds state and structure tables for particles of a single type.
pub fn single_type_tables(positions: &[nalgebra::Vector3<f64>], type_name: &str) -> (Table, Table) {
    let mut state = Table::new(&[POSITION_COLUMN]);
    state.data = positions
        .iter()
        .map(|p| vec![serde_json::json!([p.x, p.y, p.z])])
        .collect();
    let mut structure = Table::new(&[TYPE_COLUMN]);
    structure.data = positions
        .iter()
        .map(|_| vec![Value::from(type_name)])
        .collect();
    (state, structure)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use nalgebra::Vector3;

    /// A model of `n` unit-mass particles on the x axis that understands only
    /// `particleId`.
    pub fn point_model(name: &str, n: usize) -> Model {
        let positions: Vec<Vector3<f64>> = (0..n).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect();
        let (state, structure) = single_type_tables(&positions, "A");
        let data = ModelData {
            state,
            structure,
            force_field: BTreeMap::new(),
            types: BTreeMap::from([("A".to_string(), TypeInfo::new(1.0, 0.5, 0.0))]),
        };
        Model::new(name, "PARTICLES", ModelParts::new(data, PlainModel), vec![]).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::point_model;
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_predicates_select_every_particle() {
        let model = point_model("A", 4);
        let all = model.resolve_selection(&BTreeMap::new()).unwrap();
        assert_eq!(all.into_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn particle_id_is_coerced_to_a_set() {
        let model = point_model("A", 4);
        let predicates = BTreeMap::from([(PARTICLE_ID.to_string(), json!([3, 1, 3]))]);
        let selected = model.resolve_selection(&predicates).unwrap();
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn undefined_predicate_is_rejected() {
        let model = point_model("A", 4);
        let predicates = BTreeMap::from([("type".to_string(), json!("A"))]);
        assert_eq!(
            model.resolve_selection(&predicates),
            Err(SelectionError::UnknownPredicate {
                model: "A".into(),
                predicate: "type".into()
            })
        );
    }

    #[test]
    fn validation_rejects_undefined_types() {
        let mut data = point_model("A", 2).data().clone();
        data.types.clear();
        assert_eq!(
            data.validate(),
            Err(ModelError::UndefinedType {
                local_id: 0,
                type_name: "A".into()
            })
        );
    }

    #[test]
    fn fragment_renumbers_into_global_ids() {
        let mut model = point_model("A", 2);
        model.set_id_offset(10);
        let fragment = model.fragment();
        let Contribution::State(state) = &fragment[0] else {
            panic!("state expected first");
        };
        assert_eq!(state.labels, vec!["id", "position"]);
        assert_eq!(state.data[0][0], json!(10));
        assert_eq!(state.data[1][0], json!(11));
        assert_eq!(model.global_id_range(), 10..12);
    }
}
