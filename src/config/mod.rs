use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Deserializer;
use serde::de::Error;

use crate::catalog::{MemberPolicy, PANGEO_CMIP6_URL, Query};
use crate::readers::DEFAULT_GCS_ENDPOINT;
use crate::reduce::ReduceOptions;

pub mod error;
pub use error::ConfigError;

pub const DEFAULT_OUTPUT_DIR: &str = "./global/";

/// Settings for one run. Built once, then only read.
#[derive(Debug, Clone)]
pub struct RunConfig {
    catalog_url: String,
    query: Query,
    member_policy: MemberPolicy,
    output_dir: PathBuf,
    strict_calendar: bool,
    gcs_endpoint: String,
    gdal_options: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            catalog_url: PANGEO_CMIP6_URL.to_string(),
            query: default_query(),
            member_policy: MemberPolicy::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            strict_calendar: true,
            gcs_endpoint: DEFAULT_GCS_ENDPOINT.to_string(),
            gdal_options: default_gdal_options(),
        }
    }
}

fn default_query() -> Query {
    Query::new()
        .with("experiment_id", ["historical"])
        .with("variable_id", ["tos"])
        .with("grid_label", ["gn"])
        .require_all_on(["source_id"])
}

fn default_gdal_options() -> BTreeMap<String, String> {
    // Avoids listing whole bucket prefixes before opening a store
    BTreeMap::from([(
        "GDAL_DISABLE_READDIR_ON_OPEN".to_string(),
        "EMPTY_DIR".to_string(),
    )])
}

// Deserializes a RunConfig, filling unset fields with the defaults and
// checking that the search can actually select something.
impl<'de> Deserialize<'de> for RunConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct ConfigHelper {
            catalog_url: Option<String>,
            search: Option<SearchHelper>,
            member_policy: Option<MemberPolicy>,
            output_dir: Option<PathBuf>,
            strict_calendar: Option<bool>,
            gcs_endpoint: Option<String>,
            gdal_options: Option<BTreeMap<String, String>>,
        }

        #[derive(Deserialize)]
        struct SearchHelper {
            #[serde(default)]
            require_all_on: Vec<String>,
            #[serde(flatten)]
            facets: BTreeMap<String, OneOrMany>,
        }

        // `"grid_label": "gn"` and `"grid_label": ["gn"]` are both accepted
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        let helper = ConfigHelper::deserialize(deserializer)?;
        let defaults = RunConfig::default();

        let catalog_url = helper.catalog_url.unwrap_or(defaults.catalog_url);
        if catalog_url.trim().is_empty() {
            return Err(D::Error::custom(ConfigError::EmptyCatalogUrl));
        }

        let query = match helper.search {
            Some(search) => {
                let mut query = Query::new().require_all_on(search.require_all_on);
                for (column, values) in search.facets {
                    let values = match values {
                        OneOrMany::One(v) => vec![v],
                        OneOrMany::Many(v) => v,
                    };
                    if values.is_empty() {
                        return Err(D::Error::custom(ConfigError::EmptyFacet(column)));
                    }
                    query = query.with(&column, values);
                }
                query
            }
            None => defaults.query,
        };

        // The variable name is also used to open stores that do not carry one
        if !query.facets.contains_key("variable_id") {
            return Err(D::Error::custom(ConfigError::MissingFacet("variable_id")));
        }

        let member_policy = helper.member_policy.unwrap_or(defaults.member_policy);
        if let MemberPolicy::LowestRealization { physics: 0 } = member_policy {
            return Err(D::Error::custom(ConfigError::PhysicsIndex));
        }

        Ok(RunConfig {
            catalog_url,
            query,
            member_policy,
            output_dir: helper.output_dir.unwrap_or(defaults.output_dir),
            strict_calendar: helper.strict_calendar.unwrap_or(defaults.strict_calendar),
            gcs_endpoint: helper.gcs_endpoint.unwrap_or(defaults.gcs_endpoint),
            gdal_options: helper.gdal_options.unwrap_or(defaults.gdal_options),
        })
    }
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RunConfig, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let config: RunConfig = serde_json::from_reader(reader).map_err(ConfigError::from)?;

        Ok(config)
    }

    pub fn with_catalog_url(mut self, url: &str) -> Self {
        self.catalog_url = url.to_string();
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_member_policy(mut self, policy: MemberPolicy) -> Self {
        self.member_policy = policy;
        self
    }

    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn member_policy(&self) -> &MemberPolicy {
        &self.member_policy
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn gcs_endpoint(&self) -> &str {
        &self.gcs_endpoint
    }

    pub fn gdal_options(&self) -> &BTreeMap<String, String> {
        &self.gdal_options
    }

    pub fn reduce_options(&self) -> ReduceOptions {
        ReduceOptions {
            strict_calendar: self.strict_calendar,
        }
    }

    /// First requested variable, used when a store does not name its own.
    pub fn variable(&self) -> &str {
        self.query
            .facets
            .get("variable_id")
            .and_then(|v| v.first())
            .map_or("tos", String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.json");
        let mut file = File::create(&file_path).unwrap();

        let config_data = r#"
    {
        "catalog_url": "./catalog/pangeo-cmip6.json",
        "search": {
            "experiment_id": ["historical", "ssp585"],
            "variable_id": ["tos"],
            "grid_label": "gn",
            "require_all_on": ["source_id"]
        },
        "member_policy": {"policy": "contains", "marker": "p1"},
        "output_dir": "./out",
        "strict_calendar": false
    }
    "#;

        file.write_all(config_data.as_bytes()).unwrap();

        let config = RunConfig::from_file(file_path).unwrap();

        assert_eq!(config.catalog_url(), "./catalog/pangeo-cmip6.json");
        assert_eq!(
            config.query().facets["experiment_id"],
            vec!["historical".to_string(), "ssp585".to_string()]
        );
        assert_eq!(config.query().facets["grid_label"], vec!["gn".to_string()]);
        assert_eq!(config.query().require_all_on, vec!["source_id".to_string()]);
        assert_eq!(
            config.member_policy(),
            &MemberPolicy::Contains {
                marker: "p1".to_string()
            }
        );
        assert_eq!(config.output_dir(), Path::new("./out"));
        assert!(!config.reduce_options().strict_calendar);
        assert_eq!(config.variable(), "tos");
        // Unset fields keep their defaults
        assert_eq!(config.gcs_endpoint(), DEFAULT_GCS_ENDPOINT);
    }

    #[test]
    fn test_empty_object_is_default() {
        let config: RunConfig = serde_json::from_str("{}").unwrap();
        let defaults = RunConfig::default();

        assert_eq!(config.catalog_url(), PANGEO_CMIP6_URL);
        assert_eq!(config.query(), defaults.query());
        assert_eq!(config.output_dir(), Path::new("./global/"));
        assert!(config.reduce_options().strict_calendar);
        assert_eq!(
            config.gdal_options().get("GDAL_DISABLE_READDIR_ON_OPEN"),
            Some(&"EMPTY_DIR".to_string())
        );
    }

    #[test]
    fn test_rejects_empty_facet() {
        let result: Result<RunConfig, _> =
            serde_json::from_str(r#"{"search": {"variable_id": ["tos"], "experiment_id": []}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_search_without_variable() {
        let result: Result<RunConfig, _> =
            serde_json::from_str(r#"{"search": {"experiment_id": "historical"}}"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("variable_id"));
    }

    #[test]
    fn test_rejects_physics_zero() {
        let result: Result<RunConfig, _> = serde_json::from_str(
            r#"{"member_policy": {"policy": "lowest_realization", "physics": 0}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let result: Result<RunConfig, _> = serde_json::from_str(r#"{"outdir": "./x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = RunConfig::from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
