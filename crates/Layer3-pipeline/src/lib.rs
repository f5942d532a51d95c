//! # wercker-pipeline
//!
//! The container-facing half of the wercker runner:
//! - Session: the attach/send/receive primitive. A background reader decodes
//!   the raw attached byte stream into ordered lines; a sentinel scheme
//!   gives synchronous `(exit_status, output_lines)` command execution.
//! - Docker plumbing: image resolution, container create/start.
//! - Orchestrator: stages a build on the host, then drives the container
//!   command sequence and accumulates per-command reports.

pub mod docker;
pub mod orchestrator;
pub mod session;

// ============================================================================
// Session (프로토콜 코어)
// ============================================================================
pub use session::{CommandChannel, Session, SessionConfig};

// ============================================================================
// Orchestrator
// ============================================================================
pub use orchestrator::{
    BuildReport, CommandReport, FailurePolicy, Orchestrator, OrchestratorConfig,
};
