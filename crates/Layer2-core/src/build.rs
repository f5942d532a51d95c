//! Build - 한 빌드의 스텝 목록과 환경
//!
//! A Build owns the ordered step sequence (a synthetic `wercker-init` step is
//! always prepended), the global options, and a build identifier fixed at
//! construction. All host/guest/mount path roots derive from it.
//!
//! Ambient state is injected exactly once: the caller may pass a build id
//! (the CLI forwards `WERCKER_BUILD_ID` when set) and a snapshot of the host
//! process environment. Nothing here reads `std::env` on its own.

use crate::config::Config;
use crate::step::Step;
use crate::DEFAULT_BUILD_DIR;
use std::path::PathBuf;
use uuid::Uuid;
use wercker_foundation::{Env, GlobalOptions};

/// Read-only mount root inside the container
pub const MNT_ROOT: &str = "/mnt";

/// Read-write working root inside the container
pub const GUEST_ROOT: &str = "/pipeline";

/// Host variables carrying this prefix are passed into the build env with
/// the prefix stripped
const PASSTHRU_PREFIX: &str = "PASSTHRU_";

/// Host variables mirrored verbatim into the build env when present
const MIRROR_ENV: &[&str] = &[
    "WERCKER_GIT_DOMAIN",
    "WERCKER_GIT_OWNER",
    "WERCKER_GIT_REPOSITORY",
    "WERCKER_GIT_BRANCH",
    "WERCKER_GIT_COMMIT",
    "WERCKER_STARTED_BY",
    "WERCKER_MAIN_PIPELINE_STARTED",
    "WERCKER_APPLICATION_URL",
    "WERCKER_APPLICATION_ID",
    "WERCKER_APPLICATION_NAME",
    "WERCKER_APPLICATION_OWNER_NAME",
];

/// One build: ordered steps, options, identity, path roots
#[derive(Debug, Clone)]
pub struct Build {
    id: String,
    steps: Vec<Step>,
    global_options: GlobalOptions,
    build_dir: PathBuf,
    host_env: Vec<(String, String)>,
}

impl Build {
    /// Create a Build from a parsed configuration document.
    ///
    /// `build_id` is the single injection point for an externally assigned
    /// identifier; `None` generates a fresh one. The id never changes for
    /// the lifetime of this Build.
    pub fn new(config: &Config, build_id: Option<String>) -> Self {
        let id = build_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        // Synthetic init step always runs first
        let mut steps = vec![Step::from_reference("wercker-init", Vec::new())];
        for def in &config.steps {
            if def.reference == "script" {
                steps.push(Step::script(def.properties.clone()));
            } else {
                steps.push(Step::from_reference(&def.reference, def.properties.clone()));
            }
        }

        Self {
            id,
            steps,
            global_options: config.global_options.clone(),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            host_env: Vec::new(),
        }
    }

    /// Set the host directory that receives this build's staging tree.
    /// Callers should pass an absolute path.
    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = build_dir.into();
        self
    }

    /// Inject the host process environment snapshot used for passthru and
    /// mirror variables. The CLI captures `std::env::vars()` once.
    pub fn with_host_env(mut self, host_env: Vec<(String, String)>) -> Self {
        self.host_env = host_env;
        self
    }

    /// The build identifier, fixed at construction
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn global_options(&self) -> &GlobalOptions {
        &self.global_options
    }

    // ========================================================================
    // Path roots
    // ========================================================================

    /// Root dir for this build on the host machine
    pub fn host_root(&self) -> PathBuf {
        self.build_dir.join(&self.id)
    }

    /// Root dir where staged trees are mounted read-only in the container
    pub fn mnt_root(&self) -> String {
        MNT_ROOT.to_string()
    }

    /// Read-write working root in the container
    pub fn guest_root(&self) -> String {
        GUEST_ROOT.to_string()
    }

    /// Report tree under the guest root
    pub fn report_dir(&self) -> String {
        format!("{}/report", GUEST_ROOT)
    }

    /// The checked-out source tree under the guest root (the wercker root)
    pub fn source_root(&self) -> String {
        format!("{}/source", GUEST_ROOT)
    }

    // ========================================================================
    // Environment
    // ========================================================================

    /// The build-level environment, sorted by key.
    ///
    /// Merge order (increasing precedence): passthru host variables with the
    /// marker stripped, mirrored host variables, then the pipeline identity
    /// block.
    pub fn env(&self) -> Env {
        let mut merged: Vec<(String, String)> = Vec::new();

        for (key, value) in &self.host_env {
            if let Some(stripped) = key.strip_prefix(PASSTHRU_PREFIX) {
                upsert(&mut merged, stripped.to_string(), value.clone());
            }
        }

        for mirror in MIRROR_ENV {
            if let Some((_, value)) = self.host_env.iter().find(|(k, _)| k == mirror) {
                upsert(&mut merged, mirror.to_string(), value.clone());
            }
        }

        let source_root = self.source_root();
        let source_dir = if self.global_options.source_dir.is_empty() {
            source_root.clone()
        } else {
            format!("{}/{}", source_root, self.global_options.source_dir)
        };
        let identity = [
            ("WERCKER".to_string(), "true".to_string()),
            ("BUILD".to_string(), "true".to_string()),
            ("CI".to_string(), "true".to_string()),
            ("WERCKER_BUILD_ID".to_string(), self.id.clone()),
            ("WERCKER_ROOT".to_string(), source_root),
            ("WERCKER_SOURCE_DIR".to_string(), source_dir),
            ("WERCKER_CACHE_DIR".to_string(), "/cache".to_string()),
            (
                "WERCKER_OUTPUT_DIR".to_string(),
                format!("{}/output", self.guest_root()),
            ),
            ("WERCKER_PIPELINE_DIR".to_string(), self.guest_root()),
            ("WERCKER_REPORT_DIR".to_string(), self.report_dir()),
            ("TERM".to_string(), "xterm-256color".to_string()),
        ];
        for (key, value) in identity {
            upsert(&mut merged, key, value);
        }

        Env::sorted(merged)
    }
}

/// Replace an existing key or append - later sources win
fn upsert(pairs: &mut Vec<(String, String)>, key: String, value: String) {
    match pairs.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => pairs.push((key, value)),
    }
}
