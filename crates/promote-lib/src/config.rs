//! Configuration read from environment variables.

use std::env;
use thiserror::Error;

use crate::domain::{ObjectKind, Tag};

/// Content store folder that holds the main folders.
const DEFAULT_ROOT_FOLDER_ID: &str = "team_folders";
/// Name of the backup folder under the admin folder.
const DEFAULT_BACKUP_FOLDER_NAME: &str = "Backup";
/// Marker that flags an object for promotion.
const DEFAULT_TAG: &str = "(накат)";
/// Template copied to originate a new report.
const DEFAULT_TEMPLATE_REPORT_ID: &str = "i89740B1A4FE54835B1EB17AFB3618D22";
/// Template copied to originate a new dashboard.
const DEFAULT_TEMPLATE_DASHBOARD_ID: &str = "i4AA85B4F0F64440AA020BF583B360483";
/// Accepted module description prefixes.
const DEFAULT_DESCRIPTION_PREFIXES: [&str; 2] = ["бизнес владелец:", "бизнес-владелец:"];
/// The data source new modules must use.
const DEFAULT_REQUIRED_SOURCE: &str = "Greenplum";

/// Errors that can occur while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("{key} environment variable is required")]
    Missing {
        /// The variable, or the alternatives, that were looked up.
        key: String,
    },

    /// A variable is set but empty where a value is needed.
    #[error("{key} must not be empty")]
    Empty {
        /// The variable.
        key: &'static str,
    },

    /// A variable cannot be parsed.
    #[error("{key} has an invalid value: {reason}")]
    Invalid {
        /// The variable.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// How to reach and authenticate against one content server.
#[derive(Clone)]
pub struct Connection {
    /// API base URL without a trailing slash.
    pub base_url: String,
    /// Authentication namespace.
    pub namespace: String,
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Whether to verify the server certificate.
    pub verify_tls: bool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url)
            .field("namespace", &self.namespace)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// Folder layout and promotion rules shared by both servers.
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Marker that flags an object for promotion.
    pub tag: Tag,
    /// Folder holding the main folders.
    pub root_folder_id: String,
    /// Main folders to scan; empty means every folder under the root.
    pub main_folders: Vec<String>,
    /// Folder holding the backup folder.
    pub admin_folder_name: String,
    /// Backup folder under the admin folder.
    pub backup_folder_name: String,
    /// Backup subfolder name per object kind, in configuration order.
    pub backup_subfolders: Vec<(ObjectKind, String)>,
    /// Template copied to originate a new report.
    pub template_report_id: String,
    /// Template copied to originate a new dashboard.
    pub template_dashboard_id: String,
    /// Accepted module description prefixes, compared case-insensitively.
    pub description_prefixes: Vec<String>,
    /// The only upstream data source new modules may use.
    pub required_source: String,
}

/// All application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Development server objects are promoted from.
    pub source: Connection,
    /// Production server objects are promoted to.
    pub destination: Connection,
    /// Folder layout and promotion rules.
    pub migration: MigrationSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is unset or a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is unset or a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let verify_tls = vars
            .get("VERIFY_SSL")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let source = vars.connection("DEV", verify_tls)?;
        let destination = vars.connection("PROD", verify_tls)?;

        let tag = Tag::new(lookup("TAG").unwrap_or_else(|| DEFAULT_TAG.to_owned()))
            .ok_or(ConfigError::Empty { key: "TAG" })?;

        let description_prefixes = match vars.get("DESCRIPTION_PREFIXES") {
            Some(raw) => parse_list(&raw),
            None => DEFAULT_DESCRIPTION_PREFIXES
                .into_iter()
                .map(str::to_owned)
                .collect(),
        };

        let migration = MigrationSettings {
            tag,
            root_folder_id: vars.or("ROOT_FOLDER_ID", DEFAULT_ROOT_FOLDER_ID),
            main_folders: vars.get("MAIN_FOLDERS").map(|raw| parse_list(&raw)).unwrap_or_default(),
            admin_folder_name: vars.required("ADMIN_FOLDER_NAME")?,
            backup_folder_name: vars.or("BACKUP_FOLDER_NAME", DEFAULT_BACKUP_FOLDER_NAME),
            backup_subfolders: match vars.get("BACKUP_SUBFOLDERS") {
                Some(raw) => parse_backup_subfolders(&raw)?,
                None => Vec::new(),
            },
            template_report_id: vars.or("TEMPLATE_REPORT_ID", DEFAULT_TEMPLATE_REPORT_ID),
            template_dashboard_id: vars.or("TEMPLATE_DASHBOARD_ID", DEFAULT_TEMPLATE_DASHBOARD_ID),
            description_prefixes,
            required_source: vars.or("REQUIRED_SOURCE", DEFAULT_REQUIRED_SOURCE),
        };

        Ok(Self {
            source,
            destination,
            migration,
        })
    }
}

/// Variable lookup that treats blank values as unset.
struct Vars<'lookup, F>(&'lookup F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// The value of `key`, unless it is unset or blank.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// The value of `key`, or `default`.
    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    /// The value of `key`, which must be set.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing {
            key: key.to_owned(),
        })
    }

    /// `{ENV}_{KEY}` wins over the shared `{KEY}`.
    fn scoped(&self, env: &str, key: &str) -> Result<String, ConfigError> {
        self.get(&format!("{env}_{key}"))
            .or_else(|| self.get(key))
            .ok_or_else(|| ConfigError::Missing {
                key: format!("{env}_{key} or {key}"),
            })
    }

    /// Connection settings for the `env` server.
    fn connection(&self, env: &str, verify_tls: bool) -> Result<Connection, ConfigError> {
        Ok(Connection {
            base_url: self
                .required(&format!("{env}_URL"))?
                .trim_end_matches('/')
                .to_owned(),
            namespace: self.scoped(env, "NAMESPACE")?,
            username: self.scoped(env, "USERNAME")?,
            password: self.scoped(env, "PASSWORD")?,
            verify_tls,
        })
    }
}

/// Parse a JSON array of strings, falling back to a `,`/`;` separated list.
fn parse_list(raw: &str) -> Vec<String> {
    if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
        return items;
    }
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse `{"report": "Reports", ...}` or `report=Reports,module=Modules`.
fn parse_backup_subfolders(raw: &str) -> Result<Vec<(ObjectKind, String)>, ConfigError> {
    let pairs: Vec<(String, String)> =
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
            Ok(map) => map
                .into_iter()
                .map(|(kind, value)| match value {
                    serde_json::Value::String(folder) => Ok((kind, folder)),
                    other => Err(ConfigError::Invalid {
                        key: "BACKUP_SUBFOLDERS",
                        reason: format!("folder name for '{kind}' must be a string, got {other}"),
                    }),
                })
                .collect::<Result<_, _>>()?,
            Err(_) => raw
                .split([',', ';'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|pair| {
                    pair.split_once('=')
                        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
                        .ok_or_else(|| ConfigError::Invalid {
                            key: "BACKUP_SUBFOLDERS",
                            reason: format!("expected kind=folder, got '{pair}'"),
                        })
                })
                .collect::<Result<_, _>>()?,
        };

    pairs
        .into_iter()
        .map(|(raw_kind, name)| {
            let kind = ObjectKind::from(raw_kind);
            if kind.is_migratable() {
                Ok((kind, name))
            } else {
                Err(ConfigError::Invalid {
                    key: "BACKUP_SUBFOLDERS",
                    reason: format!("'{kind}' is not a report, dashboard or module"),
                })
            }
        })
        .collect()
}
