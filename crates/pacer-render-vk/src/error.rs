// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend errors.
//!
//! Driver results are classified where the call is made: device loss and
//! memory exhaustion get their own variants so the frame loop can tell them
//! apart from ordinary API failures.

use ash::vk;
use pacer_render::{RenderError, Stage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no devices supporting Vulkan were found")]
    NoVulkanCapableDevices,

    #[error("no physical device meets the renderer requirements")]
    NoDeviceFound,

    #[error("none of the {0} depth format candidates is supported")]
    NoDepthFormat(usize),

    #[error("{stage}: device lost")]
    DeviceLost { stage: Stage },

    #[error("{stage}: out of memory ({result})")]
    OutOfMemory { stage: Stage, result: vk::Result },

    #[error("{stage}: {result}")]
    Vulkan { stage: Stage, result: vk::Result },

    #[error("{stage}: {message}")]
    Platform { stage: Stage, message: String },

    #[error("frame protocol violated: {0}")]
    InvalidState(&'static str),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

impl BackendError {
    pub fn vulkan(stage: Stage, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => BackendError::DeviceLost { stage },
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                BackendError::OutOfMemory { stage, result }
            }
            _ => BackendError::Vulkan { stage, result },
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            BackendError::Loading(_) => Stage::Instance,
            BackendError::NoVulkanCapableDevices
            | BackendError::NoDeviceFound
            | BackendError::NoDepthFormat(_) => Stage::Device,
            BackendError::DeviceLost { stage }
            | BackendError::OutOfMemory { stage, .. }
            | BackendError::Vulkan { stage, .. }
            | BackendError::Platform { stage, .. } => *stage,
            BackendError::InvalidState(_) => Stage::Command,
        }
    }
}

/// Shorthand for `map_err(|r| BackendError::vulkan(stage, r))`.
pub(crate) trait VkResultExt<T> {
    fn at(self, stage: Stage) -> BackendResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn at(self, stage: Stage) -> BackendResult<T> {
        self.map_err(|r| BackendError::vulkan(stage, r))
    }
}

impl From<BackendError> for RenderError {
    fn from(err: BackendError) -> Self {
        RenderError::backend(err.stage(), err.to_string())
    }
}
