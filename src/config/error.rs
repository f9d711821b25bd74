use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    EmptyCatalogUrl,
    EmptyFacet(String),
    MissingFacet(&'static str),
    PhysicsIndex,
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyCatalogUrl => write!(f, "catalog_url cannot be empty"),
            ConfigError::EmptyFacet(column) => {
                write!(f, "search facet '{}' needs at least one value", column)
            }
            ConfigError::MissingFacet(column) => write!(f, "search must constrain '{}'", column),
            ConfigError::PhysicsIndex => write!(f, "member_policy physics index starts at 1"),
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Json(e) => write!(f, "Failed to parse JSON: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> ConfigError {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> ConfigError {
        ConfigError::Json(err)
    }
}
