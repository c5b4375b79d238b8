//! Mapper configuration
//!
//! Loadable from TOML or JSON:
//!
//! ```toml
//! table = "users"
//! primary_key = "id"          # or ["tenant", "id"]
//! fields = ["id", "name"]     # optional projection
//! default_sort = "name DESC"  # optional, defaults to the key columns
//! editmode = true             # optional schema auto-evolution
//! ```

use crate::errors::{ConfigError, Result};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MapperConfig {
    pub table: String,
    #[serde(default = "default_primary_key", deserialize_with = "one_or_many")]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub default_sort: Option<String>,
    /// Alter the schema and retry when a save fails
    #[serde(default)]
    pub editmode: bool,
}

fn default_primary_key() -> Vec<String> {
    vec!["id".to_string()]
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(column) => vec![column],
        OneOrMany::Many(columns) => columns,
    })
}

impl MapperConfig {
    /// Configuration for `table` keyed by `id`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: default_primary_key(),
            fields: None,
            default_sort: None,
            editmode: false,
        }
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn fields<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_sort(mut self, order: impl Into<String>) -> Self {
        self.default_sort = Some(order.into());
        self
    }

    pub fn editmode(mut self, enabled: bool) -> Self {
        self.editmode = enabled;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::EmptyTable.into());
        }
        if self.primary_key.is_empty() {
            return Err(ConfigError::MissingPrimaryKey.into());
        }
        if self.primary_key.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::EmptyPrimaryKeyColumn.into());
        }
        Ok(())
    }

    /// ORDER BY used when a find does not specify one
    pub fn resolved_default_sort(&self) -> String {
        self.default_sort
            .clone()
            .unwrap_or_else(|| self.primary_key.join(", "))
    }
}
