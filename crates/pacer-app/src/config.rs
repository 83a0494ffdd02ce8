// SPDX-License-Identifier: CEPL-1.0
use std::{fs, io::ErrorKind, path::Path};

use anyhow::{bail, Context, Result};
use pacer_platform::WindowConfig;
use pacer_render::{BackendKind, RendererConfig};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::Args;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowConfig,
    pub render: RendererConfig,
}

impl AppCfg {
    /// Command-line flags win over the file.
    pub fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(name) = &args.backend {
            self.render.backend = parse_backend(name)?;
        }
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        Ok(())
    }
}

pub fn parse_backend(name: &str) -> Result<BackendKind> {
    match name.to_ascii_lowercase().as_str() {
        "vk" | "vulkan" => Ok(BackendKind::Vulkan),
        other => bail!("unknown backend {other:?} (available: vulkan)"),
    }
}

fn parse_cfg(text: &str) -> Result<AppCfg> {
    toml::from_str(text).context("parsing config")
}

/// Missing file: defaults. Malformed file: the error is logged and
/// defaults are used.
pub fn load_cfg(path: &Path) -> AppCfg {
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} not found, using defaults", path.display());
            return AppCfg::default();
        }
        Err(e) => {
            error!("reading {}: {e}; using defaults", path.display());
            return AppCfg::default();
        }
    };
    match parse_cfg(&text) {
        Ok(cfg) => {
            info!("loaded config from {}", path.display());
            cfg
        }
        Err(e) => {
            error!("{}: {e:#}; using defaults", path.display());
            AppCfg::default()
        }
    }
}
