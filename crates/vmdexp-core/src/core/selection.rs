use crate::core::models::Model;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// The predicate every model understands: a list of particle ids.
pub const PARTICLE_ID: &str = "particleId";

const MODELS_KEY: &str = "models";
const EXPRESSION_KEY: &str = "expression";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Model '{model}' does not define the selection predicate '{predicate}'")]
    UnknownPredicate { model: String, predicate: String },

    #[error("Particle id {id} is out of range (valid ids: 0..{limit})")]
    IdOutOfRange { id: i64, limit: usize },

    #[error("Selection references unknown model '{0}'")]
    UnknownModel(String),

    #[error("Malformed selection expression: {0}")]
    Malformed(String),

    #[error("Invalid value for selection predicate '{predicate}': {reason}")]
    InvalidPredicateValue { predicate: String, reason: String },
}

/// A declarative particle subset.
///
/// In its serialized form the expression is a flat JSON object: the optional
/// `models` key restricts the target models, an optional `expression` object
/// carries predicates, and every other key is itself a predicate. An
/// expression without predicates selects every particle of its target models.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct SelectionExpr {
    pub models: Option<Vec<String>>,
    pub predicates: BTreeMap<String, Value>,
}

impl SelectionExpr {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn particle_ids(ids: impl IntoIterator<Item = usize>) -> Self {
        let ids: Vec<Value> = ids.into_iter().map(Value::from).collect();
        Self {
            models: None,
            predicates: BTreeMap::from([(PARTICLE_ID.to_string(), Value::Array(ids))]),
        }
    }

    pub fn in_models(mut self, models: &[&str]) -> Self {
        self.models = Some(models.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn with_predicate(mut self, name: &str, value: Value) -> Self {
        self.predicates.insert(name.to_string(), value);
        self
    }

    pub fn from_value(value: &Value) -> Result<Self, SelectionError> {
        let object = value
            .as_object()
            .ok_or_else(|| SelectionError::Malformed("expected an object".into()))?;

        let mut expr = SelectionExpr::default();
        for (key, v) in object {
            match key.as_str() {
                MODELS_KEY => {
                    let names = v
                        .as_array()
                        .and_then(|items| {
                            items
                                .iter()
                                .map(|n| n.as_str().map(str::to_string))
                                .collect::<Option<Vec<_>>>()
                        })
                        .ok_or_else(|| {
                            SelectionError::Malformed("'models' must be a list of model names".into())
                        })?;
                    expr.models = Some(names);
                }
                EXPRESSION_KEY => {
                    let inner = v.as_object().ok_or_else(|| {
                        SelectionError::Malformed("'expression' must be an object".into())
                    })?;
                    for (predicate, pv) in inner {
                        expr.predicates.insert(predicate.clone(), pv.clone());
                    }
                }
                _ => {
                    expr.predicates.insert(key.clone(), v.clone());
                }
            }
        }
        Ok(expr)
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        if let Some(models) = &self.models {
            object.insert(
                MODELS_KEY.to_string(),
                Value::Array(models.iter().cloned().map(Value::from).collect()),
            );
        }
        for (k, v) in &self.predicates {
            object.insert(k.clone(), v.clone());
        }
        Value::Object(object)
    }
}

impl TryFrom<Value> for SelectionExpr {
    type Error = SelectionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl From<SelectionExpr> for Value {
    fn from(expr: SelectionExpr) -> Self {
        expr.to_value()
    }
}

/// Parses a `particleId`-style value: a single integer or a list of them.
pub fn parse_ids(predicate: &str, value: &Value) -> Result<Vec<i64>, SelectionError> {
    let invalid = || SelectionError::InvalidPredicateValue {
        predicate: predicate.to_string(),
        reason: "expected an integer or a list of integers".into(),
    };
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_i64().ok_or_else(invalid))
            .collect(),
        other => other.as_i64().map(|v| vec![v]).ok_or_else(invalid),
    }
}

/// Resolves `expr` against an ordered, offset-assigned model list.
///
/// Returns sorted, deduplicated global ids. When the expression names its
/// target models, every predicate must be defined by each of them. Without a
/// `models` filter, models that do not define a used predicate are skipped,
/// so a predicate nobody defines yields an empty selection, and `particleId`
/// values are interpreted as global ids.
pub fn resolve<'a>(
    models: impl IntoIterator<Item = &'a Model>,
    expr: &SelectionExpr,
) -> Result<Vec<usize>, SelectionError> {
    let models: Vec<&Model> = models.into_iter().collect();
    let total: usize = models.iter().map(|m| m.particle_count()).sum();

    let targets: Vec<&Model> = match &expr.models {
        Some(names) => {
            if let Some(unknown) = names.iter().find(|n| !models.iter().any(|m| m.name() == n.as_str())) {
                return Err(SelectionError::UnknownModel(unknown.clone()));
            }
            models
                .iter()
                .filter(|m| names.iter().any(|n| n.as_str() == m.name()))
                .copied()
                .collect()
        }
        None => models.clone(),
    };
    let explicit = expr.models.is_some();

    let global_ids = match (explicit, expr.predicates.get(PARTICLE_ID)) {
        (false, Some(v)) => {
            let ids = parse_ids(PARTICLE_ID, v)?;
            if let Some(&bad) = ids.iter().find(|&&id| id < 0 || id as usize >= total) {
                return Err(SelectionError::IdOutOfRange { id: bad, limit: total });
            }
            Some(ids)
        }
        _ => None,
    };

    let mut selected = BTreeSet::new();
    for model in targets {
        let mut predicates = expr.predicates.clone();
        if let Some(ids) = &global_ids {
            let range = model.global_id_range();
            let local: Vec<Value> = ids
                .iter()
                .map(|&id| id as usize)
                .filter(|id| range.contains(id))
                .map(|id| Value::from(id - range.start))
                .collect();
            predicates.insert(PARTICLE_ID.to_string(), Value::Array(local));
        }
        if !explicit && !predicates.keys().all(|p| model.defines_selection(p)) {
            continue;
        }
        let offset = model.id_offset();
        selected.extend(
            model
                .resolve_selection(&predicates)?
                .into_iter()
                .map(|local| local + offset),
        );
    }

    Ok(selected.into_iter().collect())
}
