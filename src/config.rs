use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::field::{FieldMapping, FieldShape, RefAttr};
use crate::model::plan::TransitionPlan;

const FIELD_ENV_PREFIX: &str = "FIELD_";

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
    /// Logical field name → raw value, applied to every created issue.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    #[serde(default)]
    pub transition: TransitionPlan,
}

#[derive(Debug, Deserialize, Default)]
pub struct JiraConfig {
    /// Full base URL, e.g. `https://acme.atlassian.net`.
    pub url: Option<String>,
    /// Atlassian Cloud site name, used when `url` is absent.
    pub domain: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub assignee_account_id: Option<String>,
    pub assignee: Option<String>,
}

pub struct Credentials {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl JiraConfig {
    pub fn base_url(&self) -> Option<String> {
        if let Some(url) = non_empty(&self.url) {
            return Some(url.trim_end_matches('/').to_string());
        }
        non_empty(&self.domain).map(|d| format!("https://{d}.atlassian.net"))
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let Some(base_url) = self.base_url() else {
            bail!("Jira URL not configured. Set JIRA_URL or [jira] url in the config file");
        };
        let Some(email) = non_empty(&self.email) else {
            bail!("Jira email not configured. Set JIRA_EMAIL or [jira] email");
        };
        let Some(api_token) = non_empty(&self.api_token) else {
            bail!("Jira API token not configured. Set JIRA_TOKEN or [jira] api_token");
        };
        Ok(Credentials {
            base_url,
            email: email.to_string(),
            api_token: api_token.to_string(),
        })
    }
}

/// Candidate field ids for the post-creation pass, tried in order.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    pub story_points: Vec<String>,
    pub start_date: Vec<String>,
    pub original_estimate: Vec<String>,
    pub mappings: BTreeMap<String, FieldMapping>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            story_points: vec!["customfield_10016".into(), "customfield_10146".into()],
            start_date: vec!["customfield_10008".into()],
            original_estimate: vec!["timetracking".into(), "timeoriginalestimate".into()],
            mappings: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Overlay `JIRA_*` credentials and `FIELD_<NAME>` defaults. Environment wins over the file.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "JIRA_URL" => self.jira.url = Some(value),
                "JIRA_DOMAIN" => self.jira.domain = Some(value),
                "JIRA_EMAIL" => self.jira.email = Some(value),
                "JIRA_TOKEN" | "JIRA_API_TOKEN" => self.jira.api_token = Some(value),
                "JIRA_ASSIGNEE_ACCOUNTID" => self.jira.assignee_account_id = Some(value),
                "JIRA_ASSIGNEE" => self.jira.assignee = Some(value),
                _ => {
                    if let Some(name) = key.strip_prefix(FIELD_ENV_PREFIX) {
                        self.defaults.insert(normalize_name(name), value);
                    }
                }
            }
        }
    }

    /// Mapping for a logical field name: configured entries first, then the built-in ones.
    pub fn mapping(&self, name: &str) -> Option<FieldMapping> {
        let name = normalize_name(name);
        if let Some(mapping) = self
            .fields
            .mappings
            .iter()
            .find(|(k, _)| normalize_name(k) == name)
            .map(|(_, m)| m.clone())
        {
            return Some(mapping);
        }
        builtin_mapping(&name)
    }
}

fn builtin_mapping(name: &str) -> Option<FieldMapping> {
    let mapping = match name {
        "labels" => FieldMapping::new("labels", FieldShape::StringList, RefAttr::Value),
        "components" => FieldMapping::new("components", FieldShape::OptionList, RefAttr::Name),
        "fix_versions" => FieldMapping::new("fixVersions", FieldShape::OptionList, RefAttr::Name),
        "priority" => FieldMapping::new("priority", FieldShape::Option, RefAttr::Name),
        "reporter" => FieldMapping::new("reporter", FieldShape::Option, RefAttr::Id),
        _ if name.starts_with("customfield_") => {
            FieldMapping::new(name, FieldShape::Scalar, RefAttr::Value)
        }
        _ => return None,
    };
    Some(mapping)
}

/// `Business Unit`, `business-unit` and `BUSINESS_UNIT` all name the same field.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".jira-import")
}

/// Load the TOML config (explicit path must exist, the default one may not) and overlay the environment.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = explicit.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut config = if path.exists() {
        parse_config_file(&path)?
    } else if explicit.is_some() {
        bail!("Config file not found: {}", path.display());
    } else {
        AppConfig::default()
    };
    config.apply_env(std::env::vars());
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}
