use crate::components;
use crate::core::component::{Category, ComponentClass, Constructor};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Component class {category}/{type_name} requires '{key}' which it does not declare as available")]
    SchemaInconsistency {
        category: Category,
        type_name: String,
        key: String,
    },

    #[error("Component class {category}/{type_name} is registered twice")]
    DuplicateComponent { category: Category, type_name: String },
}

/// A registered class with the function that instantiates it.
#[derive(Debug, Clone)]
pub struct Registration {
    pub class: ComponentClass,
    pub constructor: Constructor,
}

/// Index of component classes by `(category, type name)`.
///
/// Populated once at startup and read-only afterwards, so a single registry
/// can be shared by every composition of a pool.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    classes: HashMap<Category, HashMap<&'static str, Registration>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in component class.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        components::register_builtins(&mut registry)?;
        Ok(registry)
    }

    pub fn register(&mut self, class: ComponentClass, constructor: Constructor) -> Result<(), RegistryError> {
        let by_type = self.classes.entry(class.category).or_default();
        if by_type.contains_key(class.type_name) {
            return Err(RegistryError::DuplicateComponent {
                category: class.category,
                type_name: class.type_name.to_string(),
            });
        }
        by_type.insert(class.type_name, Registration { class, constructor });
        Ok(())
    }

    pub fn get(&self, category: Category, type_name: &str) -> Option<&Registration> {
        self.classes.get(&category)?.get(type_name)
    }

    /// The registered classes of one category, sorted by type name.
    pub fn classes(&self, category: Category) -> Vec<&ComponentClass> {
        let mut classes: Vec<&ComponentClass> = self
            .classes
            .get(&category)
            .map(|by_type| by_type.values().map(|r| &r.class).collect())
            .unwrap_or_default();
        classes.sort_by_key(|c| c.type_name);
        classes
    }

    pub fn len(&self) -> usize {
        self.classes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.values().all(HashMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::component::{Built, ComponentError};
    use crate::core::schema::{ParamKind, Parameters};

    fn never(_: &Parameters) -> Result<Built, ComponentError> {
        Err(ComponentError::Invalid("not constructible".into()))
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = Registry::new();
        let class = ComponentClass::builder(Category::Units, "none").build().unwrap();
        registry.register(class.clone(), never).unwrap();
        assert_eq!(
            registry.register(class, never),
            Err(RegistryError::DuplicateComponent {
                category: Category::Units,
                type_name: "none".into()
            })
        );
    }

    #[test]
    fn builtins_cover_every_category() {
        let registry = Registry::with_builtins().unwrap();
        for category in Category::ALL {
            assert!(
                !registry.classes(category).is_empty(),
                "no built-in classes for {}",
                category
            );
        }
        let bbk = registry.get(Category::Integrator, "BBK").unwrap();
        assert_eq!(
            bbk.class.schema.parameter("integrationSteps").map(|p| p.kind),
            Some(ParamKind::PositiveInteger)
        );
    }

    #[test]
    fn lookup_accepts_borrowed_type_names() {
        let registry = Registry::with_builtins().unwrap();
        let requested = String::from("GAS");
        let gas = registry.get(Category::Model, requested.as_str()).unwrap();
        assert_eq!(gas.class.type_name, "GAS");
        assert!(registry.get(Category::Model, &format!("{}X", requested)).is_none());
        assert_eq!(
            registry.len(),
            Category::ALL.iter().map(|&c| registry.classes(c).len()).sum::<usize>()
        );
    }

    #[test]
    fn lookup_is_per_category() {
        let registry = Registry::with_builtins().unwrap();
        assert!(registry.get(Category::Model, "PARTICLES").is_some());
        assert!(registry.get(Category::Integrator, "PARTICLES").is_none());
    }
}
