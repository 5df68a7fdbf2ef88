use std::fmt;

/// Configuration problems detected while building matchers, storing
/// hypermodel records or declaring search spaces.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required key is absent, e.g. `params` in a stored record or a
    /// matcher parameter in a params map.
    MissingField(String),
    /// A parameter is present but has the wrong type or lies outside of
    /// its domain.
    InvalidParameter { name: String, reason: String },
    /// Two constituents of a composite declared the same search-space key.
    SearchSpaceCollision(String),
    /// The hypermodel registry holds no kinds to select from.
    EmptyRegistry,
    /// A route was annotated with a different number of elevations than
    /// it has vertices.
    ElevationMismatch { vertices: usize, elevations: usize },
}

impl ConfigError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingField(name) => write!(f, "missing required field `{}`", name),
            ConfigError::InvalidParameter { name, reason } => {
                write!(f, "invalid parameter `{}`: {}", name, reason)
            }
            ConfigError::SearchSpaceCollision(name) => {
                write!(f, "search space declares `{}` more than once", name)
            }
            ConfigError::EmptyRegistry => write!(f, "no hypermodel kinds are registered"),
            ConfigError::ElevationMismatch {
                vertices,
                elevations,
            } => write!(
                f,
                "route has {} vertices but {} elevations",
                vertices, elevations
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
