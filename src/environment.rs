use crate::error::{Result, RunconfError};
use crate::naming::environment_name;
use crate::resolver::{EnvValue, ValueResolver};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// One resolved `KEY: value` pair of an environment file
#[derive(Debug, Clone, PartialEq)]
pub struct EnvEntry {
    pub key: String,
    pub value: EnvValue,
}

impl EnvEntry {
    #[must_use]
    pub fn new(key: impl Into<String>, value: EnvValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A parsed environment file whose placeholders are not yet resolved
#[derive(Debug, Clone)]
pub struct Environment {
    /// Display name, e.g. `Dev` for `dev.yml`
    pub name: String,
    pub path: PathBuf,
    raw: Vec<(String, Value)>,
}

impl Environment {
    /// Reads and parses an environment file.
    ///
    /// An empty file is an environment without variables.
    ///
    /// # Errors
    ///
    /// - `RunconfError::EnvironmentNotFound` if the file doesn't exist.
    /// - `RunconfError::MalformedEnvironment` if the file is not valid YAML.
    /// - `RunconfError::EnvironmentNotMapping` if the top level is not a mapping.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RunconfError::EnvironmentNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(path, &contents)
    }

    /// Parses environment file `contents` as if read from `path`.
    ///
    /// # Errors
    ///
    /// See [`Environment::load`].
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        let document: Value =
            serde_yaml::from_str(contents).map_err(|source| RunconfError::MalformedEnvironment {
                path: path.to_path_buf(),
                source,
            })?;

        let raw = match document {
            Value::Null => Vec::new(),
            Value::Mapping(mapping) => mapping
                .into_iter()
                .map(|(key, value)| (key_to_string(&key), value))
                .collect(),
            _ => {
                return Err(RunconfError::EnvironmentNotMapping {
                    path: path.to_path_buf(),
                });
            }
        };

        Ok(Self {
            name: environment_name(path),
            path: path.to_path_buf(),
            raw,
        })
    }

    /// Keys in file order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.raw.iter().map(|(key, _)| key.as_str())
    }

    /// Resolves every value, one concurrent task per key, keeping file order.
    ///
    /// # Errors
    ///
    /// Returns `RunconfError::Join` if a resolution task panicked.
    pub async fn resolve(&self, resolver: &Arc<ValueResolver>) -> Result<Vec<EnvEntry>> {
        let mut tasks = JoinSet::new();
        for (index, (key, value)) in self.raw.iter().enumerate() {
            let key = key.clone();
            let value = value.clone();
            let resolver = Arc::clone(resolver);
            tasks.spawn(async move {
                let value = resolve_value(&resolver, value).await;
                (index, EnvEntry { key, value })
            });
        }

        let mut resolved: Vec<Option<EnvEntry>> = vec![None; self.raw.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, entry) = joined?;
            resolved[index] = Some(entry);
        }

        Ok(resolved.into_iter().flatten().collect())
    }
}

/// Loads `path` and resolves all of its values.
///
/// # Errors
///
/// See [`Environment::load`] and [`Environment::resolve`].
pub async fn load_environment(path: &Path, resolver: &Arc<ValueResolver>) -> Result<Vec<EnvEntry>> {
    Environment::load(path).await?.resolve(resolver).await
}

async fn resolve_value(resolver: &ValueResolver, mut value: Value) -> EnvValue {
    while let Value::Tagged(tagged) = value {
        value = tagged.value;
    }

    match value {
        Value::String(token) => resolver.resolve(&token).await,
        Value::Number(n) => yaml_number(&n),
        Value::Bool(b) => EnvValue::Bool(b),
        Value::Null => EnvValue::Absent,
        nested @ (Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_)) => EnvValue::Opaque(
            serde_json::to_string(&nested).unwrap_or_else(|_| format!("{nested:?}")),
        ),
    }
}

// `.inf` and `.nan` have no JSON number form and keep their YAML spelling.
fn yaml_number(n: &serde_yaml::Number) -> EnvValue {
    if let Some(i) = n.as_i64() {
        EnvValue::Number(i.into())
    } else if let Some(u) = n.as_u64() {
        EnvValue::Number(u.into())
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| EnvValue::String(n.to_string()), EnvValue::Number)
    }
}

fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}
