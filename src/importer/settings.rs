use log::warn;

use crate::config::{AppConfig, FieldsConfig};
use crate::model::field::{FieldDefault, FieldValue, RefAttr};

#[derive(Debug, Clone, PartialEq)]
pub enum Assignee {
    AccountId(String),
    Name(String),
}

impl Assignee {
    pub fn value(&self) -> FieldValue {
        match self {
            Assignee::AccountId(id) => FieldValue::OptionRef(RefAttr::Id, id.clone()),
            Assignee::Name(name) => FieldValue::OptionRef(RefAttr::Name, name.clone()),
        }
    }
}

/// Everything the importer needs besides the rows. Built once, never mutated during a run.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Lowest precedence on the create payload.
    pub defaults: Vec<FieldDefault>,
    /// Highest precedence on the create payload.
    pub overrides: Vec<FieldDefault>,
    pub story_points_fields: Vec<String>,
    pub start_date_fields: Vec<String>,
    pub estimate_fields: Vec<String>,
    pub assignee: Option<Assignee>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        let fields = FieldsConfig::default();
        Self {
            defaults: Vec::new(),
            overrides: Vec::new(),
            story_points_fields: fields.story_points,
            start_date_fields: fields.start_date,
            estimate_fields: fields.original_estimate,
            assignee: None,
        }
    }
}

impl ImportSettings {
    /// `overrides` are `(name, raw value)` pairs, typically from `--set NAME=VALUE`.
    pub fn from_config(config: &AppConfig, overrides: &[(String, String)]) -> Self {
        let defaults = config
            .defaults
            .iter()
            .filter_map(|(name, raw)| resolve_field(config, name, raw))
            .collect();
        let overrides = overrides
            .iter()
            .filter_map(|(name, raw)| resolve_field(config, name, raw))
            .collect();

        let jira = &config.jira;
        let assignee = non_empty(&jira.assignee_account_id)
            .map(Assignee::AccountId)
            .or_else(|| non_empty(&jira.assignee).map(Assignee::Name));

        Self {
            defaults,
            overrides,
            story_points_fields: config.fields.story_points.clone(),
            start_date_fields: config.fields.start_date.clone(),
            estimate_fields: config.fields.original_estimate.clone(),
            assignee,
        }
    }
}

fn resolve_field(config: &AppConfig, name: &str, raw: &str) -> Option<FieldDefault> {
    let Some(mapping) = config.mapping(name) else {
        warn!("No field mapping for '{name}'; add [fields.mappings.{name}] to the config. Ignoring it");
        return None;
    };
    Some(FieldDefault {
        name: name.to_string(),
        value: mapping.value_from(raw),
        field_id: mapping.id,
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
