// SPDX-License-Identifier: CEPL-1.0
//! Renderer configuration surface, deserialised from the `[render]` table.

use serde::Deserialize;

use crate::RenderError;

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Vulkan,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    #[default]
    Mailbox, // no tearing, lowest added latency
    Fifo,      // always available
    Immediate, // may tear
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepthFormat {
    D32Sfloat,
    D32SfloatS8Uint,
    D24UnormS8Uint,
    D16Unorm,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    pub backend: BackendKind,
    pub app_name: String,
    pub present_mode: PresentModePreference,
    pub desired_image_count: Option<u32>,
    pub min_image_count: Option<u32>,
    pub max_image_count: Option<u32>,
    /// Ordered by preference; the first format the device supports wins.
    pub depth_formats: Vec<DepthFormat>,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    /// Bound on the per-slot fence wait in `begin_frame`. `None` waits forever.
    pub frame_timeout_ms: Option<u64>,
    pub validation: bool,
    pub require_discrete_gpu: bool,
    pub require_sampler_anisotropy: bool,
    pub require_compute: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            backend: BackendKind::Vulkan,
            app_name: "pacer".to_owned(),
            present_mode: PresentModePreference::Mailbox,
            desired_image_count: None,
            min_image_count: None,
            max_image_count: None,
            depth_formats: default_depth_formats(),
            clear_color: default_clear(),
            clear_depth: 1.0,
            clear_stencil: 0,
            frame_timeout_ms: None,
            validation: cfg!(debug_assertions),
            require_discrete_gpu: false,
            require_sampler_anisotropy: true,
            require_compute: false,
        }
    }
}

fn default_depth_formats() -> Vec<DepthFormat> {
    vec![
        DepthFormat::D32Sfloat,
        DepthFormat::D32SfloatS8Uint,
        DepthFormat::D24UnormS8Uint,
    ]
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}

impl RendererConfig {
    /// Fence wait bound in nanoseconds, `u64::MAX` when unbounded.
    pub fn frame_timeout_ns(&self) -> u64 {
        match self.frame_timeout_ms {
            Some(ms) => ms.saturating_mul(1_000_000),
            None => u64::MAX,
        }
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.depth_formats.is_empty() {
            return Err(RenderError::Config(
                "depth_formats must name at least one format".into(),
            ));
        }
        if let (Some(min), Some(max)) = (self.min_image_count, self.max_image_count) {
            if min > max {
                return Err(RenderError::Config(format!(
                    "min_image_count {min} exceeds max_image_count {max}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.clear_depth) {
            return Err(RenderError::Config(format!(
                "clear_depth {} outside 0..=1",
                self.clear_depth
            )));
        }
        Ok(())
    }
}
