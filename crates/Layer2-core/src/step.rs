//! Step - 파이프라인 작업 단위
//!
//! A step is either a published reusable unit identified by `owner/name` or
//! an inline script with a generated identity. Steps hold no reference back
//! to their Build; path and env methods take the Build as an explicit
//! argument.

use crate::build::Build;
use crate::config::scalar_to_string;
use serde_yaml::Value;
use std::path::PathBuf;
use uuid::Uuid;
use wercker_foundation::{Env, Error, Result};

/// Per-step descriptor file read during property resolution
pub const STEP_DESCRIPTOR_FILE: &str = "wercker-step.yml";

/// Owner assigned to steps referenced without a `/` separator
const DEFAULT_OWNER: &str = "wercker";

/// How a step's files are materialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Copied from a pre-staged tree in the step repository
    Registry,

    /// Synthesized from inline code as an executable run script
    Script { code: String },
}

/// One unit of pipeline work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    owner: String,
    name: String,
    id: String,
    data: Vec<(String, String)>,
    kind: StepKind,
}

impl Step {
    /// Create a step from an `owner/name` reference.
    ///
    /// No separator implies owner `wercker` and an id equal to the name;
    /// with a separator the id is `owner_name`.
    pub fn from_reference(reference: &str, data: Vec<(String, String)>) -> Self {
        let (owner, name) = match reference.split_once('/') {
            Some((owner, name)) => (owner.to_string(), name.to_string()),
            None => (DEFAULT_OWNER.to_string(), reference.to_string()),
        };
        let id = if reference.contains('/') {
            format!("{}_{}", owner, name)
        } else {
            name.clone()
        };

        Self {
            owner,
            name,
            id,
            data,
            kind: StepKind::Registry,
        }
    }

    /// Create an inline script step with a freshly generated opaque identity.
    ///
    /// The `code` property becomes the script body; remaining properties are
    /// kept as ordinary overrides.
    pub fn script(mut data: Vec<(String, String)>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let code = match data.iter().position(|(k, _)| k == "code") {
            Some(index) => data.remove(index).1,
            None => String::new(),
        };

        Self {
            owner: DEFAULT_OWNER.to_string(),
            name: id.clone(),
            id,
            data,
            kind: StepKind::Script { code },
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    /// Raw property overrides in declaration order
    pub fn data(&self) -> &[(String, String)] {
        &self.data
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// Where this step's files are staged on the host
    pub fn host_path(&self, build: &Build) -> PathBuf {
        build.host_root().join(&self.id)
    }

    /// Where this step's files land read-write in the container
    pub fn guest_path(&self, build: &Build) -> String {
        format!("{}/{}", build.guest_root(), self.id)
    }

    /// Where this step's staged tree is mounted read-only in the container
    pub fn mnt_path(&self, build: &Build) -> String {
        format!("{}/{}", build.mnt_root(), self.id)
    }

    /// Steps execute with the build source as cwd, not their own path
    pub fn cwd_path(&self, build: &Build) -> String {
        build.source_root()
    }

    pub fn report_dir(&self, build: &Build) -> String {
        format!("{}/{}", build.report_dir(), self.id)
    }

    pub fn report_numbers_file(&self, build: &Build) -> String {
        format!("{}/numbers.ini", self.report_dir(build))
    }

    pub fn report_message_file(&self, build: &Build) -> String {
        format!("{}/message.txt", self.report_dir(build))
    }

    pub fn report_artifacts_dir(&self, build: &Build) -> String {
        format!("{}/artifacts", self.report_dir(build))
    }

    // ========================================================================
    // Environment
    // ========================================================================

    /// The step-level environment.
    ///
    /// Identity variables are sorted by key; resolved user properties follow
    /// in declaration order so a property value may reference an identity
    /// variable, never the reverse.
    pub fn env(&self, build: &Build) -> Result<Env> {
        let fixed = [
            ("WERCKER_STEP_ROOT", self.guest_path(build)),
            ("WERCKER_STEP_ID", self.id.clone()),
            ("WERCKER_STEP_OWNER", self.owner.clone()),
            ("WERCKER_STEP_NAME", self.name.clone()),
            (
                "WERCKER_REPORT_NUMBERS_FILE",
                self.report_numbers_file(build),
            ),
            (
                "WERCKER_REPORT_MESSAGE_FILE",
                self.report_message_file(build),
            ),
            (
                "WERCKER_REPORT_ARTIFACTS_DIR",
                self.report_artifacts_dir(build),
            ),
        ];

        let mut env = Env::sorted(fixed);
        for (key, value) in self.resolved_properties(build)? {
            env.set(key, value);
        }
        Ok(env)
    }

    /// Resolve declared properties against this step's descriptor.
    ///
    /// Per property declared in the descriptor: the explicit value from the
    /// step data wins, else the descriptor default, else empty string. Keys
    /// are namespaced `WERCKER_<STEP_NAME>_<PROPERTY>`, uppercased, with `-`
    /// in the step name mapped to `_`.
    fn resolved_properties(&self, build: &Build) -> Result<Vec<(String, String)>> {
        let descriptor_path = self.host_path(build).join(STEP_DESCRIPTOR_FILE);
        if !descriptor_path.exists() {
            return Ok(Vec::new());
        }

        let text = std::fs::read_to_string(&descriptor_path)?;
        let doc: Value = serde_yaml::from_str(&text)?;
        let Some(properties) = doc.get("properties").and_then(Value::as_mapping) else {
            return Ok(Vec::new());
        };

        let mut resolved = Vec::with_capacity(properties.len());
        for (prop_name, prop_spec) in properties {
            let prop_name = prop_name.as_str().ok_or_else(|| {
                Error::Config(format!(
                    "property name in {} must be a string",
                    descriptor_path.display()
                ))
            })?;

            let value = match self.data.iter().find(|(k, _)| k == prop_name) {
                Some((_, explicit)) => explicit.clone(),
                None => prop_spec
                    .get("default")
                    .map(scalar_to_string)
                    .transpose()?
                    .unwrap_or_default(),
            };

            let key = format!(
                "WERCKER_{}_{}",
                self.name.replace('-', "_"),
                prop_name
            )
            .to_uppercase();
            resolved.push((key, value));
        }
        Ok(resolved)
    }
}
