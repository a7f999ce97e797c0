use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use discover_fields::{InMemoryStore, Params};
use discover_log::LogConfig;
use serde::Deserialize;

/// Defines the source of a config error.
#[derive(Debug)]
enum ConfigErrorSource {
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override, such as a CLI parameter.
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::File(file_name) => write!(f, " (file {})", file_name.display()),
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    inner: Option<Box<dyn Error + Send + Sync>>,
}

impl ConfigError {
    #[inline]
    fn file<E>(kind: ConfigErrorKind, path: impl AsRef<Path>, inner: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::File(path.as_ref().to_path_buf()),
            kind,
            inner: Some(Box::new(inner)),
        }
    }

    #[inline]
    fn field<E>(name: &'static str, inner: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::FieldOverride(name.to_owned()),
            kind: ConfigErrorKind::InvalidValue,
            inner: Some(Box::new(inner)),
        }
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

/// Default parameters of resolved queries.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Organization, projects, teams and time range of queries.
    #[serde(flatten)]
    pub params: Params,
    /// Private functions and combinators callers may use, such as `array_join` or `avgArray`.
    pub functions_acl: Vec<String>,
}

/// Configuration of the Discover CLI.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub logging: LogConfig,
    /// Default query parameters.
    pub query: QueryConfig,
    /// Thresholds and key transactions for pseudo field lookups.
    pub store: InMemoryStore,
}

impl Config {
    /// Loads the configuration from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = fs::File::open(path)
            .map_err(|e| ConfigError::file(ConfigErrorKind::CouldNotOpenFile, path, e))?;

        serde_yaml::from_reader(io::BufReader::new(file))
            .map_err(|e| ConfigError::file(ConfigErrorKind::BadYaml, path, e))
    }

    /// Applies overrides from the command line to the query parameters.
    pub fn apply_override(&mut self, overrides: OverridableConfig) -> Result<(), ConfigError> {
        let query = &mut self.query;

        if let Some(organization_id) = overrides.organization_id {
            let organization_id = organization_id
                .parse()
                .map_err(|e| ConfigError::field("organization_id", e))?;
            query.params.organization_id = Some(organization_id);
        }

        if let Some(project_ids) = overrides.project_ids {
            query.params.project_ids =
                parse_ids(&project_ids).map_err(|e| ConfigError::field("project_ids", e))?;
        }

        if let Some(team_ids) = overrides.team_ids {
            query.params.team_ids =
                Some(parse_ids(&team_ids).map_err(|e| ConfigError::field("team_ids", e))?);
        }

        if let Some(start) = overrides.start {
            query.params.start = Some(parse_date(&start).map_err(|e| ConfigError::field("start", e))?);
        }

        if let Some(end) = overrides.end {
            query.params.end = Some(parse_date(&end).map_err(|e| ConfigError::field("end", e))?);
        }

        query.functions_acl.extend(overrides.functions_acl);

        Ok(())
    }

    /// Returns the query parameters with the configured store attached.
    pub fn params(&self) -> Params {
        self.query
            .params
            .clone()
            .with_store(Arc::new(self.store.clone()))
    }

    /// Returns the functions ACL, if any functions are granted.
    pub fn functions_acl(&self) -> Option<&[String]> {
        Some(self.query.functions_acl.as_slice()).filter(|acl| !acl.is_empty())
    }
}

fn parse_ids(value: &str) -> Result<Vec<u64>, std::num::ParseIntError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::parse)
        .collect()
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|date| date.with_timezone(&Utc))
}

/// Query parameters overridden from the command line.
///
/// Values are kept as strings and validated when applied to a [`Config`].
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The organization id.
    pub organization_id: Option<String>,
    /// Comma-separated project ids.
    pub project_ids: Option<String>,
    /// Comma-separated team ids.
    pub team_ids: Option<String>,
    /// Start of the time range in RFC 3339 format.
    pub start: Option<String>,
    /// End of the time range in RFC 3339 format.
    pub end: Option<String>,
    /// Additional private functions to grant.
    pub functions_acl: Vec<String>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::TimeZone;
    use discover_fields::ProjectStore;
    use discover_log::Level;
    use similar_asserts::assert_eq;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.query.params.organization_id.is_none());
        assert!(config.functions_acl().is_none());
        assert!(config.store.project_thresholds.is_empty());
    }

    #[test]
    fn test_from_path() {
        let file = write_config(
            r#"
logging:
  level: debug
query:
  organization_id: 1
  project_ids: [1, 2]
  team_ids: [3]
  start: "2021-01-01T00:00:00Z"
  functions_acl: [array_join]
store:
  project_thresholds:
    - { project_id: 1, metric: lcp, threshold: 400 }
  key_transactions:
    - { team_id: 3, project_id: 1, transaction: "/api" }
"#,
        );

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.logging.level, Level::Debug);
        assert_eq!(config.query.params.organization_id, Some(1));
        assert_eq!(config.query.params.project_ids, vec![1, 2]);
        assert_eq!(config.query.params.team_ids, Some(vec![3]));
        assert_eq!(
            config.query.params.start,
            Some(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(config.functions_acl(), Some(&["array_join".to_owned()][..]));

        let params = config.params();
        let store = params.store.unwrap();
        assert_eq!(store.project_thresholds(1, &[1, 2]).unwrap().len(), 1);
        assert_eq!(
            store.team_key_transactions(1, &[3], &[1], 10).unwrap(),
            vec![(1, "/api".to_owned())]
        );
    }

    #[test]
    fn test_missing_file() {
        let error = Config::from_path("/does/not/exist.yml").unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert_eq!(
            error.to_string(),
            "could not open config file (file /does/not/exist.yml)"
        );
        assert!(error.source().is_some());
    }

    #[test]
    fn test_bad_yaml() {
        let file = write_config("query: [1, 2");
        let error = Config::from_path(file.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                organization_id: Some("7".to_owned()),
                project_ids: Some("1, 2,3".to_owned()),
                end: Some("2021-01-02T00:00:00+01:00".to_owned()),
                functions_acl: vec!["avgArray".to_owned()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.query.params.organization_id, Some(7));
        assert_eq!(config.query.params.project_ids, vec![1, 2, 3]);
        assert_eq!(
            config.query.params.end,
            Some(Utc.with_ymd_and_hms(2021, 1, 1, 23, 0, 0).unwrap())
        );
        assert_eq!(config.functions_acl(), Some(&["avgArray".to_owned()][..]));
    }

    #[test]
    fn test_invalid_override() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                project_ids: Some("1,two".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field project_ids)");
    }
}
