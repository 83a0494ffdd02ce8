// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic renderer errors.

use std::fmt;

use thiserror::Error;

/// Pipeline stage a fatal error is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Instance,
    Surface,
    Device,
    Swapchain,
    Sync,
    Command,
    Submit,
    Present,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Instance => "instance",
            Stage::Surface => "surface",
            Stage::Device => "device",
            Stage::Swapchain => "swapchain",
            Stage::Sync => "sync",
            Stage::Command => "command",
            Stage::Submit => "submit",
            Stage::Present => "present",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    /// Unrecoverable backend failure; the run loop should stop.
    #[error("{stage} stage failed: {message}")]
    Backend { stage: Stage, message: String },

    #[error("invalid renderer configuration: {0}")]
    Config(String),
}

impl RenderError {
    pub fn backend(stage: Stage, message: impl Into<String>) -> Self {
        RenderError::Backend {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            RenderError::Backend { stage, .. } => Some(*stage),
            RenderError::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names_the_stage() {
        let err = RenderError::backend(Stage::Present, "device lost");
        assert_eq!(err.to_string(), "present stage failed: device lost");
        assert_eq!(err.stage(), Some(Stage::Present));
    }

    #[test]
    fn test_config_errors_have_no_stage() {
        assert_eq!(RenderError::Config("bad".into()).stage(), None);
    }
}
