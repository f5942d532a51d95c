//! # wercker-foundation
//!
//! Foundation layer for the wercker build runner:
//! - Error: central error taxonomy (configuration, staging, engine, session)
//! - Env: insertion-ordered environment mapping, serializable to shell exports
//! - GlobalOptions: document-level options (source dir, session timeouts)

pub mod env;
pub mod error;
pub mod options;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Env (환경변수 모델)
// ============================================================================
pub use env::Env;

// ============================================================================
// Options
// ============================================================================
pub use options::GlobalOptions;
