use crate::core::component::{Category, ComponentError};
use crate::core::document::DocumentError;
use crate::core::ids::IdsError;
use thiserror::Error;

/// A failure composing one simulation.
///
/// Component failures carry their context and render as
/// `[Integrator] (BBK) Required parameter timeStep not given for integrator foo`.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("[{}] ({class}) {source} for {} {name}", .category.tag(), .category.key())]
    Component {
        category: Category,
        class: String,
        name: String,
        source: ComponentError,
    },

    #[error("[{}] ({class}) Unknown component type for {} {name}", .category.tag(), .category.key())]
    UnknownComponent {
        category: Category,
        class: String,
        name: String,
    },

    #[error("[{}] Duplicate name {name} for {}", .category.tag(), .category.key())]
    DuplicateName { category: Category, name: String },

    #[error("[{}] {message}", .category.tag())]
    Cardinality { category: Category, message: String },

    #[error("[Types] Type '{type_name}' is defined differently by models {first} and {second}")]
    TypeConflict {
        type_name: String,
        first: String,
        second: String,
    },

    #[error("{0}")]
    Document(#[from] DocumentError),

    #[error("{0}")]
    Ids(#[from] IdsError),
}

impl ComposeError {
    pub(crate) fn component(category: Category, class: &str, name: &str, source: impl Into<ComponentError>) -> Self {
        ComposeError::Component {
            category,
            class: class.to_string(),
            name: name.to_string(),
            source: source.into(),
        }
    }

    /// The category the failure is attributed to, when there is one.
    pub fn category(&self) -> Option<Category> {
        match self {
            ComposeError::Component { category, .. }
            | ComposeError::UnknownComponent { category, .. }
            | ComposeError::DuplicateName { category, .. }
            | ComposeError::Cardinality { category, .. } => Some(*category),
            ComposeError::TypeConflict { .. } => Some(Category::Types),
            ComposeError::Document(_) | ComposeError::Ids(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ParameterError, ParameterErrorKind};

    #[test]
    fn component_errors_render_with_their_context() {
        let err = ComposeError::component(
            Category::Integrator,
            "BBK",
            "foo",
            ParameterError::new(ParameterErrorKind::Missing, "timeStep", "BBK"),
        );
        assert_eq!(
            err.to_string(),
            "[Integrator] (BBK) Required parameter timeStep not given for integrator foo"
        );
        assert_eq!(err.category(), Some(Category::Integrator));
    }

    #[test]
    fn duplicate_names_name_the_category() {
        let err = ComposeError::DuplicateName {
            category: Category::ModelOperation,
            name: "shift".into(),
        };
        assert_eq!(err.to_string(), "[ModelOperation] Duplicate name shift for modelOperation");
    }
}
