//! Config - wercker.yml 설정 문서
//!
//! Top-level parsed `wercker.yml` document: a box reference, an ordered list
//! of service names, global options, and the build block's ordered
//! `{step_reference: property_map}` entries. Immutable after load.

use serde::Deserialize;
use std::path::Path;
use tracing::debug;
use wercker_foundation::{Error, GlobalOptions, Result};

/// Name of the configuration document inside a project checkout
pub const CONFIG_FILE: &str = "wercker.yml";

/// Box reference - the base image a build runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxRef {
    pub name: String,
}

/// One `{step_reference: properties}` entry from the build block
///
/// A bare string entry is shorthand for an empty property map. Property
/// order is the document's declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDef {
    pub reference: String,
    pub properties: Vec<(String, String)>,
}

/// Parsed configuration document
#[derive(Debug, Clone)]
pub struct Config {
    pub box_ref: BoxRef,
    pub services: Vec<String>,
    pub global_options: GlobalOptions,
    pub steps: Vec<StepDef>,
}

// ============================================================================
// Raw document shape
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "box")]
    box_name: String,

    #[serde(default)]
    services: Vec<String>,

    #[serde(default)]
    build: RawBuild,

    #[serde(flatten)]
    options: GlobalOptions,
}

#[derive(Debug, Default, Deserialize)]
struct RawBuild {
    #[serde(default)]
    steps: Vec<serde_yaml::Value>,
}

impl Config {
    /// Load the configuration document from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse the configuration document from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(text)?;

        let steps = raw
            .build
            .steps
            .iter()
            .map(convert_step_entry)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            box_ref: BoxRef { name: raw.box_name },
            services: raw.services,
            global_options: raw.options,
            steps,
        })
    }
}

/// Convert one build-block entry into a StepDef
fn convert_step_entry(value: &serde_yaml::Value) -> Result<StepDef> {
    match value {
        serde_yaml::Value::String(reference) => Ok(StepDef {
            reference: reference.clone(),
            properties: Vec::new(),
        }),
        serde_yaml::Value::Mapping(mapping) => {
            if mapping.len() != 1 {
                return Err(Error::Config(format!(
                    "step entry must have exactly one key, found {}",
                    mapping.len()
                )));
            }
            let Some((key, props)) = mapping.iter().next() else {
                return Err(Error::Config("step entry must not be empty".to_string()));
            };
            let reference = key
                .as_str()
                .ok_or_else(|| Error::Config("step reference must be a string".to_string()))?
                .to_string();
            Ok(StepDef {
                reference,
                properties: convert_properties(props)?,
            })
        }
        other => Err(Error::Config(format!(
            "step entry must be a string or a single-key mapping, found {:?}",
            other
        ))),
    }
}

/// Convert a step's property mapping, preserving declaration order
fn convert_properties(value: &serde_yaml::Value) -> Result<Vec<(String, String)>> {
    match value {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Mapping(mapping) => mapping
            .iter()
            .map(|(key, value)| {
                let key = key
                    .as_str()
                    .ok_or_else(|| Error::Config("property name must be a string".to_string()))?
                    .to_string();
                Ok((key, scalar_to_string(value)?))
            })
            .collect(),
        other => Err(Error::Config(format!(
            "step properties must be a mapping, found {:?}",
            other
        ))),
    }
}

/// Render a scalar document value as its shell-visible text
pub(crate) fn scalar_to_string(value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::Config(format!(
            "expected a scalar value, found {:?}",
            other
        ))),
    }
}
