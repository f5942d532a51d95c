//! GlobalOptions - 문서 레벨 옵션
//!
//! Document-level options read from the top of `wercker.yml`. Pure value
//! object; the two timeouts bound the session's checked sends.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_no_response_timeout() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    10
}

/// Global build options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalOptions {
    /// Source directory relative to the checkout root
    #[serde(default)]
    pub source_dir: String,

    /// Max seconds without any output line before a checked send gives up
    #[serde(default = "default_no_response_timeout")]
    pub no_response_timeout: u64,

    /// Max seconds for one checked send overall
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            source_dir: String::new(),
            no_response_timeout: default_no_response_timeout(),
            command_timeout: default_command_timeout(),
        }
    }
}

impl GlobalOptions {
    /// `no-response-timeout` as a Duration
    pub fn no_response_duration(&self) -> Duration {
        Duration::from_secs(self.no_response_timeout)
    }

    /// `command-timeout` as a Duration
    pub fn command_duration(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }
}
