use crate::core::selection::SelectionExpr;
use nalgebra::Vector3;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// The declared shape of a component parameter.
///
/// Every parameter a component class advertises carries one of these kinds.
/// Validation checks the runtime JSON value against it once, at
/// instantiation, so the typed accessors on [`Parameters`] can rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Any integer.
    Integer,
    /// An integer `>= 1`.
    PositiveInteger,
    /// An integer `>= 0`.
    NonNegativeInteger,
    /// An integer that must equal the given value.
    ExactInteger(i64),
    /// Any finite number (integers are accepted).
    Real,
    /// A number `> 0`.
    PositiveReal,
    Boolean,
    Text,
    /// A list of exactly three numbers.
    Vector3,
    RealList,
    IntegerList,
    TextList,
    /// A list of three-number lists.
    Vector3List,
    /// Accepted as given; the component interprets it.
    Any,
}

impl ParamKind {
    pub fn describe(self) -> String {
        match self {
            ParamKind::Integer => "integer".into(),
            ParamKind::PositiveInteger => "positive integer".into(),
            ParamKind::NonNegativeInteger => "non-negative integer".into(),
            ParamKind::ExactInteger(v) => format!("integer equal to {}", v),
            ParamKind::Real => "real number".into(),
            ParamKind::PositiveReal => "positive real number".into(),
            ParamKind::Boolean => "boolean".into(),
            ParamKind::Text => "string".into(),
            ParamKind::Vector3 => "list of 3 numbers".into(),
            ParamKind::RealList => "list of numbers".into(),
            ParamKind::IntegerList => "list of integers".into(),
            ParamKind::TextList => "list of strings".into(),
            ParamKind::Vector3List => "list of 3-number lists".into(),
            ParamKind::Any => "any value".into(),
        }
    }

    /// Checks `value` against this kind.
    ///
    /// A value of the wrong shape is a type mismatch; a value of the right
    /// shape that violates the kind's constraint is an invalid value.
    fn check(self, value: &Value) -> Result<(), (ParameterErrorKind, String)> {
        let mismatch = || Err((ParameterErrorKind::TypeMismatch, self.describe()));
        match self {
            ParamKind::Integer => match value.as_i64() {
                Some(_) => Ok(()),
                None => mismatch(),
            },
            ParamKind::PositiveInteger => self.check_integer(value, |v| v >= 1),
            ParamKind::NonNegativeInteger => self.check_integer(value, |v| v >= 0),
            ParamKind::ExactInteger(expected) => self.check_integer(value, |v| v == expected),
            ParamKind::Real => match value.as_f64() {
                Some(v) if v.is_finite() => Ok(()),
                _ => mismatch(),
            },
            ParamKind::PositiveReal => match value.as_f64() {
                Some(v) if v > 0.0 && v.is_finite() => Ok(()),
                Some(v) => Err((
                    ParameterErrorKind::InvalidValue,
                    format!("must be a positive real number, got {}", v),
                )),
                None => mismatch(),
            },
            ParamKind::Boolean if value.is_boolean() => Ok(()),
            ParamKind::Text if value.is_string() => Ok(()),
            ParamKind::Boolean | ParamKind::Text => mismatch(),
            ParamKind::Vector3 => {
                if is_vector3(value) {
                    Ok(())
                } else {
                    mismatch()
                }
            }
            ParamKind::RealList => match value.as_array() {
                Some(items) if items.iter().all(Value::is_number) => Ok(()),
                _ => mismatch(),
            },
            ParamKind::IntegerList => match value.as_array() {
                Some(items) if items.iter().all(|v| v.as_i64().is_some()) => Ok(()),
                _ => mismatch(),
            },
            ParamKind::TextList => match value.as_array() {
                Some(items) if items.iter().all(Value::is_string) => Ok(()),
                _ => mismatch(),
            },
            ParamKind::Vector3List => match value.as_array() {
                Some(items) if items.iter().all(is_vector3) => Ok(()),
                _ => mismatch(),
            },
            ParamKind::Any => Ok(()),
        }
    }

    fn check_integer(
        self,
        value: &Value,
        constraint: impl Fn(i64) -> bool,
    ) -> Result<(), (ParameterErrorKind, String)> {
        match value.as_i64() {
            None => Err((ParameterErrorKind::TypeMismatch, self.describe())),
            Some(v) if constraint(v) => Ok(()),
            Some(v) => Err((
                ParameterErrorKind::InvalidValue,
                format!("must be a {}, got {}", self.describe(), v),
            )),
        }
    }
}

fn is_vector3(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|v| v.len() == 3 && v.iter().all(Value::is_number))
}

fn to_vector3(value: &Value) -> Option<Vector3<f64>> {
    let items = value.as_array()?;
    if items.len() != 3 {
        return None;
    }
    Some(Vector3::new(
        items[0].as_f64()?,
        items[1].as_f64()?,
        items[2].as_f64()?,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(&'static str),
}

impl DefaultValue {
    pub fn to_value(self) -> Value {
        match self {
            DefaultValue::Integer(v) => Value::from(v),
            DefaultValue::Real(v) => Value::from(v),
            DefaultValue::Boolean(v) => Value::from(v),
            DefaultValue::Text(v) => Value::from(v),
        }
    }
}

/// One entry of a component class's `availableParameters`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Option<DefaultValue>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterErrorKind {
    #[error("missing")]
    Missing,
    #[error("unknown")]
    Unknown,
    #[error("typeMismatch")]
    TypeMismatch,
    #[error("invalidValue")]
    InvalidValue,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", render_parameter_error(.kind, .key, .detail))]
pub struct ParameterError {
    pub kind: ParameterErrorKind,
    pub key: String,
    pub class: String,
    pub detail: String,
}

impl ParameterError {
    pub fn new(kind: ParameterErrorKind, key: &str, class: &str) -> Self {
        Self {
            kind,
            key: key.to_string(),
            class: class.to_string(),
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

fn render_parameter_error(kind: &ParameterErrorKind, key: &str, detail: &str) -> String {
    match kind {
        ParameterErrorKind::Missing => format!("Required parameter {} not given", key),
        ParameterErrorKind::Unknown => format!("Parameter {} is not available", key),
        ParameterErrorKind::TypeMismatch => format!("Parameter {} has the wrong type (expected {})", key, detail),
        ParameterErrorKind::InvalidValue => format!("Parameter {} {}", key, detail),
    }
}

/// The declared parameter and selection schema of one component class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub parameters: Vec<ParamSpec>,
    pub required_parameters: Vec<&'static str>,
    pub selections: Vec<&'static str>,
    pub required_selections: Vec<&'static str>,
}

impl Schema {
    pub fn parameter(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn is_selection(&self, name: &str) -> bool {
        self.selections.contains(&name)
    }

    /// Returns the first required parameter or selection that is not
    /// declared as available, if any.
    pub fn inconsistency(&self) -> Option<&'static str> {
        self.required_parameters
            .iter()
            .find(|r| self.parameter(r).is_none())
            .or_else(|| {
                self.required_selections
                    .iter()
                    .find(|r| !self.is_selection(r))
            })
            .copied()
    }

    /// Validates a caller-provided parameter map and fills in defaults.
    pub fn validate(&self, class: &str, given: &Map<String, Value>) -> Result<Parameters, ParameterError> {
        for key in given.keys() {
            if self.parameter(key).is_none() && !self.is_selection(key) {
                return Err(ParameterError::new(ParameterErrorKind::Unknown, key, class));
            }
        }
        for required in self
            .required_parameters
            .iter()
            .chain(self.required_selections.iter())
        {
            if !given.contains_key(*required) {
                return Err(ParameterError::new(ParameterErrorKind::Missing, required, class));
            }
        }

        let mut values = BTreeMap::new();
        let mut selections = BTreeMap::new();
        for (key, value) in given {
            if let Some(spec) = self.parameter(key) {
                spec.kind
                    .check(value)
                    .map_err(|(kind, detail)| ParameterError::new(kind, key, class).with_detail(detail))?;
                values.insert(key.clone(), value.clone());
            } else {
                let selection = SelectionExpr::from_value(value).map_err(|e| {
                    ParameterError::new(ParameterErrorKind::TypeMismatch, key, class)
                        .with_detail(format!("selection expression ({})", e))
                })?;
                selections.insert(key.clone(), selection);
            }
        }
        for spec in &self.parameters {
            if let Some(default) = spec.default {
                values
                    .entry(spec.name.to_string())
                    .or_insert_with(|| default.to_value());
            }
        }

        Ok(Parameters {
            class: class.to_string(),
            values,
            selections,
        })
    }
}

/// Validated parameters of one component instance, defaults included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    class: String,
    values: BTreeMap<String, Value>,
    selections: BTreeMap<String, SelectionExpr>,
}

impl Parameters {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.selections.contains_key(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    fn missing(&self, key: &str) -> ParameterError {
        ParameterError::new(ParameterErrorKind::Missing, key, &self.class)
    }

    fn mismatch(&self, key: &str, expected: &str) -> ParameterError {
        ParameterError::new(ParameterErrorKind::TypeMismatch, key, &self.class).with_detail(expected)
    }

    pub fn real(&self, key: &str) -> Result<f64, ParameterError> {
        self.opt_real(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn opt_real(&self, key: &str) -> Result<Option<f64>, ParameterError> {
        self.values
            .get(key)
            .map(|v| v.as_f64().ok_or_else(|| self.mismatch(key, "real number")))
            .transpose()
    }

    pub fn integer(&self, key: &str) -> Result<i64, ParameterError> {
        self.opt_integer(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn opt_integer(&self, key: &str) -> Result<Option<i64>, ParameterError> {
        self.values
            .get(key)
            .map(|v| v.as_i64().ok_or_else(|| self.mismatch(key, "integer")))
            .transpose()
    }

    pub fn count(&self, key: &str) -> Result<usize, ParameterError> {
        let v = self.integer(key)?;
        usize::try_from(v).map_err(|_| {
            ParameterError::new(ParameterErrorKind::InvalidValue, key, &self.class)
                .with_detail(format!("must be non-negative, got {}", v))
        })
    }

    pub fn boolean(&self, key: &str) -> Result<bool, ParameterError> {
        self.values
            .get(key)
            .ok_or_else(|| self.missing(key))?
            .as_bool()
            .ok_or_else(|| self.mismatch(key, "boolean"))
    }

    pub fn text(&self, key: &str) -> Result<&str, ParameterError> {
        self.opt_text(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn opt_text(&self, key: &str) -> Result<Option<&str>, ParameterError> {
        self.values
            .get(key)
            .map(|v| v.as_str().ok_or_else(|| self.mismatch(key, "string")))
            .transpose()
    }

    pub fn vector3(&self, key: &str) -> Result<Vector3<f64>, ParameterError> {
        self.opt_vector3(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn opt_vector3(&self, key: &str) -> Result<Option<Vector3<f64>>, ParameterError> {
        self.values
            .get(key)
            .map(|v| to_vector3(v).ok_or_else(|| self.mismatch(key, "list of 3 numbers")))
            .transpose()
    }

    pub fn vector3_list(&self, key: &str) -> Result<Vec<Vector3<f64>>, ParameterError> {
        let items = self
            .values
            .get(key)
            .ok_or_else(|| self.missing(key))?
            .as_array()
            .ok_or_else(|| self.mismatch(key, "list of 3-number lists"))?;
        items
            .iter()
            .map(|v| to_vector3(v).ok_or_else(|| self.mismatch(key, "list of 3-number lists")))
            .collect()
    }

    pub fn real_list(&self, key: &str) -> Result<Vec<f64>, ParameterError> {
        let items = self
            .values
            .get(key)
            .ok_or_else(|| self.missing(key))?
            .as_array()
            .ok_or_else(|| self.mismatch(key, "list of numbers"))?;
        items
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| self.mismatch(key, "list of numbers")))
            .collect()
    }

    pub fn text_list(&self, key: &str) -> Result<Vec<String>, ParameterError> {
        let items = self
            .values
            .get(key)
            .ok_or_else(|| self.missing(key))?
            .as_array()
            .ok_or_else(|| self.mismatch(key, "list of strings"))?;
        items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.mismatch(key, "list of strings"))
            })
            .collect()
    }

    pub fn selection(&self, key: &str) -> Option<&SelectionExpr> {
        self.selections.get(key)
    }

    /// Copies the listed keys, when present, into a JSON map.
    ///
    /// Components use this to forward their physical parameters verbatim
    /// into the `parameters` object of the engine-input entry they emit.
    pub fn forward(&self, keys: &[&str]) -> Map<String, Value> {
        keys.iter()
            .filter_map(|k| self.values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn integrator_schema() -> Schema {
        Schema {
            parameters: vec![
                ParamSpec {
                    name: "timeStep",
                    kind: ParamKind::PositiveReal,
                    default: None,
                },
                ParamSpec {
                    name: "frictionConstant",
                    kind: ParamKind::Real,
                    default: None,
                },
                ParamSpec {
                    name: "integrationSteps",
                    kind: ParamKind::PositiveInteger,
                    default: None,
                },
                ParamSpec {
                    name: "label",
                    kind: ParamKind::Text,
                    default: Some(DefaultValue::Text("none")),
                },
            ],
            required_parameters: vec!["timeStep", "frictionConstant", "integrationSteps"],
            selections: vec!["selection"],
            required_selections: vec![],
        }
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn validate_accepts_complete_parameters_and_fills_defaults() {
        let params = integrator_schema()
            .validate(
                "BBK",
                &map(json!({"timeStep": 0.01, "frictionConstant": 1.0, "integrationSteps": 100})),
            )
            .unwrap();

        assert_eq!(params.real("timeStep").unwrap(), 0.01);
        assert_eq!(params.count("integrationSteps").unwrap(), 100);
        assert_eq!(params.text("label").unwrap(), "none");
        assert!(params.selection("selection").is_none());
    }

    #[test]
    fn validate_reports_missing_required_parameter() {
        let err = integrator_schema()
            .validate("BBK", &map(json!({"timeStep": 0.01, "integrationSteps": 100})))
            .unwrap_err();

        assert_eq!(err.kind, ParameterErrorKind::Missing);
        assert_eq!(err.key, "frictionConstant");
        assert_eq!(err.class, "BBK");
        assert_eq!(err.to_string(), "Required parameter frictionConstant not given");
    }

    #[test]
    fn validate_rejects_unknown_keys() {
        let err = integrator_schema()
            .validate(
                "BBK",
                &map(json!({"timeStep": 0.01, "frictionConstant": 1.0, "integrationSteps": 1, "bogus": 3})),
            )
            .unwrap_err();
        assert_eq!(err.kind, ParameterErrorKind::Unknown);
        assert_eq!(err.key, "bogus");
    }

    #[test]
    fn validate_distinguishes_type_mismatch_from_invalid_value() {
        let schema = integrator_schema();
        let wrong_type = schema
            .validate(
                "BBK",
                &map(json!({"timeStep": "fast", "frictionConstant": 1.0, "integrationSteps": 1})),
            )
            .unwrap_err();
        assert_eq!(wrong_type.kind, ParameterErrorKind::TypeMismatch);

        let zero_steps = schema
            .validate(
                "BBK",
                &map(json!({"timeStep": 0.1, "frictionConstant": 1.0, "integrationSteps": 0})),
            )
            .unwrap_err();
        assert_eq!(zero_steps.kind, ParameterErrorKind::InvalidValue);
        assert_eq!(zero_steps.key, "integrationSteps");
    }

    #[test]
    fn exact_integer_kind_rejects_other_values() {
        assert!(ParamKind::ExactInteger(1).check(&json!(1)).is_ok());
        let (kind, _) = ParamKind::ExactInteger(1).check(&json!(2)).unwrap_err();
        assert_eq!(kind, ParameterErrorKind::InvalidValue);
    }

    #[test]
    fn selections_are_parsed_at_validation_time() {
        let params = integrator_schema()
            .validate(
                "BBK",
                &map(json!({
                    "timeStep": 0.01, "frictionConstant": 1.0, "integrationSteps": 5,
                    "selection": {"models": ["A"], "particleId": [0, 1]}
                })),
            )
            .unwrap();
        let sel = params.selection("selection").unwrap();
        assert_eq!(sel.models.as_deref(), Some(&["A".to_string()][..]));

        let err = integrator_schema()
            .validate(
                "BBK",
                &map(json!({
                    "timeStep": 0.01, "frictionConstant": 1.0, "integrationSteps": 5,
                    "selection": 7
                })),
            )
            .unwrap_err();
        assert_eq!(err.kind, ParameterErrorKind::TypeMismatch);
    }

    #[test]
    fn inconsistency_detects_required_keys_outside_available() {
        let mut schema = integrator_schema();
        assert_eq!(schema.inconsistency(), None);
        schema.required_parameters.push("temperature");
        assert_eq!(schema.inconsistency(), Some("temperature"));
    }

    #[test]
    fn parameter_errors_render_per_kind() {
        let missing = ParameterError::new(ParameterErrorKind::Missing, "frictionConstant", "BBK");
        assert_eq!(missing.to_string(), "Required parameter frictionConstant not given");

        let mismatch =
            ParameterError::new(ParameterErrorKind::TypeMismatch, "timeStep", "BBK").with_detail("a real number");
        assert_eq!(
            mismatch.to_string(),
            "Parameter timeStep has the wrong type (expected a real number)"
        );
        assert_eq!(ParameterErrorKind::InvalidValue.to_string(), "invalidValue");

        let as_error: &dyn std::error::Error = &missing;
        assert!(as_error.source().is_none());
    }
}
