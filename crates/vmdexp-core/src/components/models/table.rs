use super::model_class;
use crate::core::component::{Built, ComponentClass, ComponentError};
use crate::core::models::{ModelData, ModelParts, POSITION_COLUMN, PlainModel, TYPE_COLUMN, TypeInfo};
use crate::core::registry::RegistryError;
use crate::core::schema::{ParamKind, Parameters};
use crate::core::table::Table;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_TYPE: TypeInfo = TypeInfo {
    mass: 1.0,
    radius: 0.5,
    charge: 0.0,
};

pub(super) fn class() -> Result<ComponentClass, RegistryError> {
    model_class("PARTICLE_TABLE")
        .required("path", ParamKind::Text)
        .predicates(&[TYPE_COLUMN])
        .build()
}

#[derive(Debug, Deserialize)]
struct ParticleRecord {
    #[serde(rename = "type")]
    type_name: String,
    x: f64,
    y: f64,
    z: f64,
    mass: Option<f64>,
    radius: Option<f64>,
    charge: Option<f64>,
}

impl ParticleRecord {
    fn type_info(&self) -> TypeInfo {
        TypeInfo::new(
            self.mass.unwrap_or(DEFAULT_TYPE.mass),
            self.radius.unwrap_or(DEFAULT_TYPE.radius),
            self.charge.unwrap_or(DEFAULT_TYPE.charge),
        )
    }
}

/// Particles read from a CSV file with a `type,x,y,z[,mass,radius,charge]` header.
pub(super) fn build(params: &Parameters) -> Result<Built, ComponentError> {
    let path = params.text("path")?;
    let data = read_particles(Path::new(path))?;
    Ok(Built::Model(ModelParts::new(data, PlainModel)))
}

fn read_particles(path: &Path) -> Result<ModelData, ComponentError> {
    let display = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| ComponentError::Csv {
            path: display.clone(),
            source,
        })?;

    let mut state = Table::new(&[POSITION_COLUMN]);
    let mut structure = Table::new(&[TYPE_COLUMN]);
    let mut types: BTreeMap<String, TypeInfo> = BTreeMap::new();

    for (line, record) in reader.deserialize::<ParticleRecord>().enumerate() {
        let record = record.map_err(|source| ComponentError::Csv {
            path: display.clone(),
            source,
        })?;
        let info = record.type_info();
        match types.get(&record.type_name) {
            Some(existing) if *existing != info => {
                return Err(ComponentError::Invalid(format!(
                    "'{}' row {}: type '{}' redefined with different properties",
                    display,
                    line + 1,
                    record.type_name
                )));
            }
            Some(_) => {}
            None => {
                types.insert(record.type_name.clone(), info);
            }
        }
        state.push_row(vec![json!([record.x, record.y, record.z])])?;
        structure.push_row(vec![Value::from(record.type_name)])?;
    }

    Ok(ModelData {
        state,
        structure,
        force_field: BTreeMap::new(),
        types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_positions_and_types_with_defaults() {
        let file = csv_file("type,x,y,z,mass\nA,0,0,0,2.0\nB,1,0,0,\nA,2,0,0,2.0\n");
        let data = read_particles(file.path()).unwrap();
        assert_eq!(data.particle_count(), 3);
        assert_eq!(data.types["A"].mass, 2.0);
        assert_eq!(data.types["B"], DEFAULT_TYPE);
        assert_eq!(data.type_of(1), Some("B"));
        assert!(data.validate().is_ok());
    }

    #[test]
    fn conflicting_type_definitions_are_rejected() {
        let file = csv_file("type,x,y,z,mass\nA,0,0,0,1.0\nA,1,0,0,3.0\n");
        assert!(matches!(
            read_particles(file.path()),
            Err(ComponentError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let err = read_particles(Path::new("/nonexistent/particles.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/particles.csv"));
    }
}
