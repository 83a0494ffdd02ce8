// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use pacer_core::FrameClock;
use pacer_platform::{
    create_window,
    winit::{
        application::ApplicationHandler,
        event::WindowEvent,
        event_loop::{ActiveEventLoop, ControlFlow},
        window::{Window, WindowId},
    },
    FramebufferSize,
};
use pacer_render::{
    BackendKind, RenderError, RenderPacket, RenderSize, RendererBackend, RendererConfig,
    RendererFrontend,
};
use pacer_render_vk::VulkanBackend;
use tracing::{debug, info};

use crate::config::AppCfg;
use crate::game::Game;

fn create_backend(
    window: &Window,
    size: RenderSize,
    cfg: &RendererConfig,
) -> Result<Box<dyn RendererBackend>, RenderError> {
    match cfg.backend {
        BackendKind::Vulkan => Ok(Box::new(VulkanBackend::initialize(
            window, window, size, cfg,
        )?)),
    }
}

pub struct App<G: Game> {
    cfg: AppCfg,
    game: G,

    // Dropped before the window it renders into.
    renderer: Option<RendererFrontend>,
    window: Option<Window>,

    framebuffer: FramebufferSize,
    clock: FrameClock,
    exiting: bool,
    failure: Option<anyhow::Error>,
}

impl<G: Game> App<G> {
    pub fn new(cfg: AppCfg, game: G) -> Self {
        Self {
            cfg,
            game,
            renderer: None,
            window: None,
            framebuffer: FramebufferSize::default(),
            clock: FrameClock::new(),
            exiting: false,
            failure: None,
        }
    }

    /// The error that ended the run, if any.
    pub fn finish(self) -> Result<()> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = create_window(event_loop, &self.cfg.window)?;
        let size = window.inner_size();
        self.framebuffer = FramebufferSize::new(size.width, size.height);

        let backend = create_backend(
            &window,
            RenderSize::new(size.width, size.height),
            &self.cfg.render,
        )
        .context("renderer initialisation")?;
        let mut renderer = RendererFrontend::new(backend);
        renderer.set_clear_color(self.cfg.render.clear_color);
        info!("backend = {:?}", self.cfg.render.backend);

        if !self.game.initialize() {
            return Err(anyhow!("game initialisation failed"));
        }
        self.game.on_resize(size.width, size.height);

        window.request_redraw();
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        if let Some((width, height)) = self.framebuffer.take() {
            renderer.on_resize(RenderSize::new(width, height));
            self.game.on_resize(width, height);
        }
        if self.framebuffer.is_minimized() {
            return Ok(());
        }

        let delta_time = self.clock.tick();
        if !self.game.update(delta_time) {
            return Err(anyhow!("game update failed"));
        }
        if !self.game.render(delta_time) {
            return Err(anyhow!("game render failed"));
        }
        if let Some(rgba) = self.game.clear_color() {
            renderer.set_clear_color(rgba);
        }

        if renderer.draw_frame(&RenderPacket { delta_time })? {
            self.clock.frame_drawn();
        }
        if let Some(fps) = self.clock.poll_fps() {
            info!("fps ~ {fps}");
        }
        Ok(())
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        if let Some(mut renderer) = self.renderer.take() {
            renderer.shutdown();
            info!(
                "{} frame(s) submitted, {} drawn in {:.1}s",
                renderer.frame_number(),
                self.clock.frames_drawn(),
                self.clock.elapsed().as_secs_f32()
            );
        }
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.failure = Some(err);
        self.stop(event_loop);
    }
}

impl<G: Game> ApplicationHandler for App<G> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.exiting {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        match &self.window {
            Some(window) if window.id() == window_id => {}
            _ => return,
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.stop(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                let was_minimized = self.framebuffer.is_minimized();
                self.framebuffer.record(new_size.width, new_size.height);
                let minimized = self.framebuffer.is_minimized();
                if minimized != was_minimized {
                    info!("minimized = {minimized}");
                    self.clock.pause();
                }
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                if let Err(e) = self.frame() {
                    self.fail(event_loop, e);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.framebuffer.is_minimized() {
            debug!("minimized, waiting for events");
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }
}
