//! Build orchestrator - stages a build and drives the container sequence
//!
//! The orchestrator owns no protocol details: it computes paths and
//! environments from the data model and issues every container-side
//! sub-action as one checked send over a [`CommandChannel`]. Exit statuses
//! are observed and recorded; under the default policy they never halt the
//! sequence - deciding pass/fail from the gathered reports is the caller's
//! concern.

use crate::docker;
use crate::session::{CommandChannel, Session, SessionConfig};
use bollard::Docker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wercker_core::{staging, BoxRef, Build, Step, DEFAULT_STEP_DIR};
use wercker_foundation::{Error, Result};

// ============================================================================
// Failure policy
// ============================================================================

/// What a non-zero exit status inside the container does to the remaining
/// sequence. Build-level setup commands are always observed only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure and keep going
    #[default]
    Continue,

    /// Skip the failing step's remaining sub-actions, continue with the
    /// next step
    AbortStep,

    /// Stop the whole build sequence
    AbortBuild,
}

// ============================================================================
// Reports
// ============================================================================

/// One checked send and its observed result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReport {
    /// Owning step id; `None` for build-level setup commands
    pub step_id: Option<String>,

    /// What the commands were doing (e.g. `copy-step`, `run-script`)
    pub action: String,

    /// The exact commands issued
    pub commands: Vec<String>,

    /// Raw textual exit status from the sentinel line
    pub exit_status: String,

    /// Output lines captured between command boundaries
    pub output: Vec<String>,
}

impl CommandReport {
    /// Exit-status comparisons stay textual by design
    pub fn succeeded(&self) -> bool {
        self.exit_status == "0"
    }
}

/// Everything observed while driving one build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub build_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub commands: Vec<CommandReport>,
}

impl BuildReport {
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            commands: Vec::new(),
        }
    }

    pub fn record(&mut self, command: CommandReport) {
        self.commands.push(command);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Commands that exited non-zero, in execution order
    pub fn failed_commands(&self) -> Vec<&CommandReport> {
        self.commands.iter().filter(|c| !c.succeeded()).collect()
    }

    /// Commands belonging to one step, in execution order
    pub fn commands_for_step(&self, step_id: &str) -> Vec<&CommandReport> {
        self.commands
            .iter()
            .filter(|c| c.step_id.as_deref() == Some(step_id))
            .collect()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Directory that holds fetched step trees
    pub step_dir: PathBuf,

    /// Policy for non-zero exit statuses inside steps
    pub failure_policy: FailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_dir: PathBuf::from(DEFAULT_STEP_DIR),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Sequences one build: host staging, container launch, command sequence
pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Full build: stage on the host, launch the container, attach a
    /// session, drive the command sequence
    pub async fn run(
        &self,
        docker: Arc<Docker>,
        build: &Build,
        box_ref: &BoxRef,
        project_path: &Path,
    ) -> Result<BuildReport> {
        let binds = self.stage(build, project_path)?;

        let image_id = docker::ensure_image(&docker, box_ref).await?;
        let container_name = format!("wercker-build-{}", build.id());
        let container_id =
            docker::create_build_container(&docker, &image_id, &container_name, binds).await?;
        docker::start_container(&docker, &container_id).await?;
        info!("started container {} for build {}", container_name, build.id());

        let mut session = Session::new(
            &container_id,
            docker,
            SessionConfig::from_options(build.global_options()),
        );
        session.attach().await?;

        self.run_sequence(build, &mut session).await
    }

    /// Host-side staging: build root, source checkout copy, step fetches.
    /// Returns the read-only bind specifications for every staged entry.
    pub fn stage(&self, build: &Build, project_path: &Path) -> Result<Vec<String>> {
        let host_root = build.host_root();
        std::fs::create_dir_all(&host_root).map_err(|e| {
            Error::Staging(format!("Failed to create {}: {}", host_root.display(), e))
        })?;

        staging::copy_tree(project_path, &host_root.join("source"))?;
        for step in build.steps() {
            let staged = staging::fetch_step(step, build, &self.config.step_dir)?;
            debug!("staged step {} at {}", step.id(), staged.display());
        }

        // Every entry staged under the host build path is mounted read-only
        let mut entries: Vec<String> = std::fs::read_dir(&host_root)
            .map_err(|e| {
                Error::Staging(format!("Failed to read {}: {}", host_root.display(), e))
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();

        Ok(entries
            .iter()
            .map(|name| {
                format!(
                    "{}:{}/{}:ro",
                    host_root.join(name).display(),
                    build.mnt_root(),
                    name
                )
            })
            .collect())
    }

    /// Drive the container command sequence over any channel. Assumes the
    /// build has been staged (step env resolution and the init/run checks
    /// read the staged host trees).
    pub async fn run_sequence(
        &self,
        build: &Build,
        channel: &mut dyn CommandChannel,
    ) -> Result<BuildReport> {
        let mut report = BuildReport::new(build.id());

        self.checked(
            channel,
            &mut report,
            None,
            "create-root",
            vec![format!("mkdir \"{}\"", build.guest_root())],
        )
        .await?;
        self.checked(
            channel,
            &mut report,
            None,
            "copy-source",
            vec![format!(
                "cp -r {}/source {}",
                build.mnt_root(),
                build.source_root()
            )],
        )
        .await?;
        self.checked(
            channel,
            &mut report,
            None,
            "export-env",
            build.env().to_commands(),
        )
        .await?;

        'steps: for step in build.steps() {
            for (action, commands) in self.step_actions(step, build)? {
                let ok = self
                    .checked(channel, &mut report, Some(step.id()), &action, commands)
                    .await?;
                if !ok {
                    match self.config.failure_policy {
                        FailurePolicy::Continue => {}
                        FailurePolicy::AbortStep => {
                            warn!(
                                "step {} failed during {}, skipping its remaining actions",
                                step.id(),
                                action
                            );
                            continue 'steps;
                        }
                        FailurePolicy::AbortBuild => {
                            warn!(
                                "step {} failed during {}, aborting build",
                                step.id(),
                                action
                            );
                            break 'steps;
                        }
                    }
                }
            }
        }

        report.finish();
        Ok(report)
    }

    /// The ordered sub-actions for one step. Failures must stay observable,
    /// so the step block starts by relaxing fail-fast shell behavior.
    fn step_actions(&self, step: &Step, build: &Build) -> Result<Vec<(String, Vec<String>)>> {
        let guest_path = step.guest_path(build);
        let mut actions = vec![
            ("relax-shell".to_string(), vec!["set +e".to_string()]),
            (
                "copy-step".to_string(),
                vec![format!("cp -r {} {}", step.mnt_path(build), guest_path)],
            ),
            (
                "enter-source".to_string(),
                vec![format!("cd \"{}\"", step.cwd_path(build))],
            ),
            ("export-env".to_string(), step.env(build)?.to_commands()),
        ];

        let host_path = step.host_path(build);
        if host_path.join("init.sh").exists() {
            actions.push((
                "init-script".to_string(),
                vec![format!("source \"{}/init.sh\"", guest_path)],
            ));
        }
        if host_path.join("run.sh").exists() {
            actions.push((
                "run-script".to_string(),
                vec![
                    format!("chmod +x \"{}/run.sh\"", guest_path),
                    format!("source \"{}/run.sh\"", guest_path),
                ],
            ));
        }
        Ok(actions)
    }

    /// Issue one checked send and record it; returns whether it succeeded
    async fn checked(
        &self,
        channel: &mut dyn CommandChannel,
        report: &mut BuildReport,
        step_id: Option<&str>,
        action: &str,
        commands: Vec<String>,
    ) -> Result<bool> {
        debug!(action, "issuing {} command(s)", commands.len());
        let (exit_status, output) = channel.send_checked(commands.clone()).await?;
        info!("{} : {}", action, exit_status);

        let ok = exit_status == "0";
        if !ok {
            warn!(action, exit = %exit_status, "command exited non-zero");
        }
        report.record(CommandReport {
            step_id: step_id.map(str::to_string),
            action: action.to_string(),
            commands,
            exit_status,
            output,
        });
        Ok(ok)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
