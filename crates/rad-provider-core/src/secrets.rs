use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("secret {0} is not available")]
    NotFound(String),
}

/// Opaque credential source, consulted once at adapter construction.
pub trait SecretsSource: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<String, SecretsError>;
}

/// Resolves references as environment variable names.
#[derive(Debug, Default)]
pub struct EnvSecretsSource;

impl SecretsSource for EnvSecretsSource {
    fn resolve(&self, reference: &str) -> Result<String, SecretsError> {
        std::env::var(reference)
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| SecretsError::NotFound(reference.to_string()))
    }
}

/// Fixed map, for tests and embedded setups.
#[derive(Debug, Default)]
pub struct StaticSecretsSource {
    values: HashMap<String, String>,
}

impl StaticSecretsSource {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl SecretsSource for StaticSecretsSource {
    fn resolve(&self, reference: &str) -> Result<String, SecretsError> {
        self.values
            .get(reference)
            .cloned()
            .ok_or_else(|| SecretsError::NotFound(reference.to_string()))
    }
}
