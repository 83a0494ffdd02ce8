// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::Parser;
use pacer_core::init_tracing;
use pacer_platform::winit::event_loop::EventLoop;
use tracing::{error, info};

mod app;
mod config;
mod game;

use app::App;
use config::load_cfg;
use game::Testbed;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML config file; missing means defaults
    #[arg(long, default_value = "pacer.toml")]
    pub config: PathBuf,
    /// Renderer backend: vulkan | vk
    #[arg(long)]
    pub backend: Option<String>,
    /// Initial window width, overrides the config file
    #[arg(long)]
    pub width: Option<u32>,
    /// Initial window height, overrides the config file
    #[arg(long)]
    pub height: Option<u32>,
}

fn run(args: Args) -> Result<()> {
    let mut cfg = load_cfg(&args.config);
    cfg.apply_args(&args)?;
    cfg.render.validate()?;

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, Testbed::default());
    event_loop.run_app(&mut app)?;
    app.finish()
}

fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()) {
        Ok(()) => {
            info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}
