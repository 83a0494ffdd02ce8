// SPDX-License-Identifier: CEPL-1.0
//! Frame orchestration: the begin/end state machine that paces the CPU
//! against the GPU.
//!
//! Each frame slot goes `Idle -> Acquiring -> Recording -> Submitted -> Idle`.
//! The CPU only ever blocks in two places: on the slot's own fence at the top
//! of `begin_frame`, and in `end_frame` when the acquired image is still owned
//! by another slot's submission. All other ordering is left to semaphores.
//!
//! Resizes are only recorded; the swapchain is rebuilt at the next
//! `begin_frame`, after the device has gone idle.

use ash::vk;
use pacer_render::{FrameStatus, RenderSize, RendererConfig, Stage};
use tracing::{debug, info, warn};

use crate::error::{BackendError, BackendResult, VkResultExt};
use crate::frame::{FrameSlots, ImagesInFlight};
use crate::gpu::{Gpu, QueueRole, Submission};
use crate::renderpass::{Framebuffer, Renderpass};
use crate::swapchain::{AcquireOutcome, Swapchain, SwapchainSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording { image: u32 },
    Submitted { image: u32 },
}

pub struct FrameOrchestrator<G: Gpu> {
    gpu: G,
    swapchain: Swapchain,
    renderpass: Renderpass,
    /// One per swapchain image, same indexing.
    framebuffers: Vec<Framebuffer>,
    slots: FrameSlots,
    images_in_flight: ImagesInFlight,
    phase: FramePhase,
    recreating: bool,
    /// Bumped by every resize notification.
    size_generation: u64,
    last_generation: u64,
    pending_size: RenderSize,
    /// Set when acquire or present reported a stale surface.
    surface_stale: bool,
    frame_timeout_ns: u64,
    destroyed: bool,
}

impl<G: Gpu> FrameOrchestrator<G> {
    pub fn new(
        gpu: G,
        size: RenderSize,
        settings: SwapchainSettings,
        cfg: &RendererConfig,
    ) -> BackendResult<Self> {
        let mut swapchain = Swapchain::create(&gpu, size, settings)?;
        let mut renderpass = match Renderpass::create(
            &gpu,
            swapchain.image_format(),
            swapchain.depth_format(),
            swapchain.extent(),
            cfg,
        ) {
            Ok(rp) => rp,
            Err(e) => {
                swapchain.destroy(&gpu);
                return Err(e);
            }
        };
        // Slots are created once; recreation only changes how many rotate.
        let slots = match FrameSlots::create(&gpu, swapchain.max_frames_in_flight()) {
            Ok(s) => s,
            Err(e) => {
                renderpass.destroy(&gpu);
                swapchain.destroy(&gpu);
                return Err(e);
            }
        };
        let images_in_flight = ImagesInFlight::new(swapchain.image_count());

        let mut this = Self {
            gpu,
            swapchain,
            renderpass,
            framebuffers: Vec::new(),
            slots,
            images_in_flight,
            phase: FramePhase::Idle,
            recreating: false,
            size_generation: 0,
            last_generation: 0,
            pending_size: size,
            surface_stale: false,
            frame_timeout_ns: cfg.frame_timeout_ns(),
            destroyed: false,
        };
        if let Err(e) = this.create_framebuffers() {
            this.destroy();
            return Err(e);
        }
        info!(
            "frame orchestrator ready: {} slot(s), {} image(s)",
            this.slots.len(),
            this.swapchain.image_count()
        );
        Ok(this)
    }

    fn create_framebuffers(&mut self) -> BackendResult<()> {
        let extent = self.swapchain.extent();
        for i in 0..self.swapchain.image_count() {
            let attachments = self.swapchain.attachments(i);
            let fb = Framebuffer::create(&self.gpu, &self.renderpass, extent, &attachments)?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    fn destroy_framebuffers(&mut self) {
        for mut fb in self.framebuffers.drain(..) {
            fb.destroy(&self.gpu);
        }
    }

    /// Records the new framebuffer size. GPU objects are left alone until
    /// the next `begin_frame`.
    pub fn on_resize(&mut self, size: RenderSize) {
        self.size_generation = self.size_generation.wrapping_add(1);
        self.pending_size = size;
        debug!(
            "resize to {}x{} queued (generation {})",
            size.width, size.height, self.size_generation
        );
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.renderpass.set_clear_color(rgba);
    }

    fn needs_recreate(&self) -> bool {
        self.size_generation != self.last_generation || self.surface_stale
    }

    /// Rebuilds the swapchain and everything sized by it at the pending
    /// size. A zero-sized target leaves the request outstanding.
    fn recreate_pending(&mut self) -> BackendResult<bool> {
        if self.pending_size.is_empty() {
            debug!("framebuffer is zero-sized; recreation deferred");
            return Ok(false);
        }
        self.recreate(self.pending_size)?;
        Ok(true)
    }

    pub fn recreate(&mut self, size: RenderSize) -> BackendResult<()> {
        self.recreating = true;
        self.gpu.device_wait_idle().at(Stage::Swapchain)?;

        // STRICT ORDER: framebuffers reference the swapchain views.
        self.destroy_framebuffers();
        self.swapchain.recreate(&self.gpu, size)?;
        self.renderpass.set_extent(self.swapchain.extent());
        self.create_framebuffers()?;

        self.images_in_flight.reset(self.swapchain.image_count());
        self.slots.set_active(self.swapchain.max_frames_in_flight());
        if self.slots.active() != self.slots.len() {
            debug!(
                "swapchain allows {} frame(s) in flight; rotating {} of {} slot(s)",
                self.swapchain.max_frames_in_flight(),
                self.slots.active(),
                self.slots.len()
            );
        }

        self.last_generation = self.size_generation;
        self.surface_stale = false;
        self.recreating = false;
        info!(
            "swapchain recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }

    /// `NotReady` means skip drawing this iteration; it is not an error.
    pub fn begin_frame(&mut self) -> BackendResult<FrameStatus> {
        if self.phase != FramePhase::Idle {
            return Err(BackendError::InvalidState(
                "begin_frame called while a frame is already in progress",
            ));
        }

        if self.recreating {
            self.gpu.device_wait_idle().at(Stage::Swapchain)?;
            return Ok(FrameStatus::NotReady);
        }

        if self.needs_recreate() {
            self.recreate_pending()?;
            return Ok(FrameStatus::NotReady);
        }

        // Backpressure: the slot's previous submission must have finished.
        let timeout = self.frame_timeout_ns;
        let slot = self.slots.current_mut();
        if !slot.in_flight.wait(&self.gpu, timeout)? {
            return Ok(FrameStatus::NotReady);
        }

        self.phase = FramePhase::Acquiring;
        let outcome = self.swapchain.acquire_next_image(
            &self.gpu,
            timeout,
            slot.image_available.handle(),
        );
        let image = match outcome {
            Ok(AcquireOutcome::Acquired { index, suboptimal }) => {
                if suboptimal {
                    debug!("acquired image {index} is suboptimal; recreating after this frame");
                    self.surface_stale = true;
                }
                index
            }
            Ok(AcquireOutcome::RecreateNeeded) => {
                self.phase = FramePhase::Idle;
                self.surface_stale = true;
                self.recreate_pending()?;
                return Ok(FrameStatus::NotReady);
            }
            Ok(AcquireOutcome::Timeout) => {
                self.phase = FramePhase::Idle;
                return Ok(FrameStatus::NotReady);
            }
            Err(e) => {
                self.phase = FramePhase::Idle;
                return Err(e);
            }
        };

        if let Err(e) = self.record_start(image) {
            self.phase = FramePhase::Idle;
            return Err(e);
        }
        self.phase = FramePhase::Recording { image };
        Ok(FrameStatus::Ready)
    }

    fn record_start(&mut self, image: u32) -> BackendResult<()> {
        let extent = self.swapchain.extent();
        let framebuffer = self
            .framebuffers
            .get(image as usize)
            .ok_or(BackendError::InvalidState("acquired image has no framebuffer"))?;
        let slot = self.slots.current_mut();
        slot.cmd.reset(&self.gpu)?;
        slot.cmd
            .begin(&self.gpu, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        self.gpu.cmd_set_viewport_scissor(slot.cmd.handle(), extent);
        self.renderpass.begin(&self.gpu, &mut slot.cmd, framebuffer)
    }

    pub fn end_frame(&mut self) -> BackendResult<()> {
        let FramePhase::Recording { image } = self.phase else {
            return Err(BackendError::InvalidState(
                "end_frame without a successful begin_frame",
            ));
        };
        let result = self.submit_and_present(image);
        self.slots.advance();
        self.phase = FramePhase::Idle;
        result
    }

    fn submit_and_present(&mut self, image: u32) -> BackendResult<()> {
        let current = self.slots.current_index();
        {
            let slot = self.slots.current_mut();
            self.renderpass.end(&self.gpu, &mut slot.cmd)?;
            slot.cmd.end(&self.gpu)?;
        }

        // Another slot may still be writing this image.
        if let Some(owner) = self.images_in_flight.owner(image) {
            if owner != current {
                self.slots
                    .get_mut(owner)
                    .in_flight
                    .wait(&self.gpu, u64::MAX)?;
            }
        }
        self.images_in_flight.claim(image, current);

        let slot = self.slots.current_mut();
        slot.in_flight.reset(&self.gpu)?;
        let cmds = [slot.cmd.handle()];
        let submission = Submission {
            command_buffers: &cmds,
            wait: Some((
                slot.image_available.handle(),
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            )),
            signal: Some(slot.queue_complete.handle()),
            fence: slot.in_flight.handle(),
        };
        self.gpu
            .queue_submit(QueueRole::Graphics, &submission)
            .at(Stage::Submit)?;
        slot.cmd.update_submitted();
        let wait = slot.queue_complete.handle();
        self.phase = FramePhase::Submitted { image };

        let outcome = self.swapchain.present(&self.gpu, wait, image)?;
        if outcome.needs_recreate() {
            debug!("present reported {outcome:?}; recreating swapchain");
            self.surface_stale = true;
            self.recreate_pending()?;
        }
        Ok(())
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[inline]
    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Device idle, then slots, framebuffers, renderpass and swapchain.
    /// The device itself is left to the caller.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Err(e) = self.gpu.device_wait_idle() {
            warn!("device_wait_idle during shutdown failed: {e}");
        }
        self.slots.destroy(&self.gpu);
        self.destroy_framebuffers();
        self.renderpass.destroy(&self.gpu);
        self.swapchain.destroy(&self.gpu);
        self.phase = FramePhase::Idle;
        self.destroyed = true;
        debug!("frame resources destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_buffer::CommandBufferState;
    use crate::mock::MockGpu;
    use pacer_render::DepthFormat;

    fn cfg() -> RendererConfig {
        RendererConfig {
            depth_formats: vec![DepthFormat::D32Sfloat],
            ..RendererConfig::default()
        }
    }

    fn orchestrator_with(gpu: MockGpu, cfg: &RendererConfig) -> FrameOrchestrator<MockGpu> {
        let settings = SwapchainSettings::from_config(cfg, vk::Format::D32_SFLOAT);
        FrameOrchestrator::new(gpu, RenderSize::new(800, 600), settings, cfg).unwrap()
    }

    fn orchestrator() -> FrameOrchestrator<MockGpu> {
        orchestrator_with(MockGpu::new(), &cfg())
    }

    fn frame(o: &mut FrameOrchestrator<MockGpu>) {
        assert_eq!(o.begin_frame().unwrap(), FrameStatus::Ready);
        o.end_frame().unwrap();
    }

    #[test]
    fn test_three_images_give_two_slots() {
        let mut o = orchestrator();
        assert_eq!(o.swapchain().image_count(), 3);
        assert_eq!(o.swapchain().max_frames_in_flight(), 2);
        assert_eq!(o.slots.len(), 2);
        o.destroy();
    }

    #[test]
    fn test_begin_end_presents_without_leaking() {
        let mut o = orchestrator();
        let before = o.gpu().state.borrow().live_objects();

        frame(&mut o);

        let s = o.gpu().state.borrow();
        assert_eq!(s.live_objects(), before);
        assert_eq!(s.submits, 1);
        assert_eq!(s.presents, vec![0]);
        assert_eq!(s.render_pass_begins, 1);
        assert!(s.recording.is_empty());
        drop(s);
        assert_eq!(o.phase(), FramePhase::Idle);

        o.destroy();
        assert_eq!(o.gpu().state.borrow().live_objects(), 0);
    }

    #[test]
    fn test_third_frame_blocks_on_reused_slot_fence() {
        let cfg = RendererConfig {
            frame_timeout_ms: Some(5),
            ..cfg()
        };
        let mut o = orchestrator_with(MockGpu::new(), &cfg);
        o.gpu().state.borrow_mut().stalled = true;
        let slot0_fence = o.slots.current_mut().in_flight.handle();

        frame(&mut o);
        frame(&mut o);
        assert_eq!(o.slots.outstanding(), 2);
        assert!(o.slots.outstanding() <= o.swapchain().max_frames_in_flight());

        assert_eq!(o.begin_frame().unwrap(), FrameStatus::NotReady);
        {
            let s = o.gpu().state.borrow();
            assert_eq!(s.acquires, 2);
            assert_eq!(s.fence_waits.last(), Some(&(slot0_fence, 5_000_000)));
        }
        assert_eq!(o.phase(), FramePhase::Idle);

        o.gpu().state.borrow_mut().stalled = false;
        frame(&mut o);
        assert_eq!(o.gpu().state.borrow().acquires, 3);
        o.destroy();
    }

    #[test]
    fn test_shrunken_surface_limits_frames_in_flight() {
        let mut o = orchestrator();
        assert_eq!(o.slots.len(), 2);
        frame(&mut o);

        o.gpu().state.borrow_mut().support.capabilities.max_image_count = 2;
        o.on_resize(RenderSize::new(640, 480));
        assert_eq!(o.begin_frame().unwrap(), FrameStatus::NotReady);
        assert_eq!(o.swapchain().image_count(), 2);
        assert_eq!(o.swapchain().max_frames_in_flight(), 1);

        for _ in 0..4 {
            frame(&mut o);
            assert!(o.slots.outstanding() <= o.swapchain().max_frames_in_flight());
        }
        // the idle slot is kept, not destroyed
        assert_eq!(o.slots.len(), 2);

        o.gpu().state.borrow_mut().support.capabilities.max_image_count = 3;
        o.on_resize(RenderSize::new(800, 600));
        assert_eq!(o.begin_frame().unwrap(), FrameStatus::NotReady);
        frame(&mut o);
        frame(&mut o);
        assert_eq!(o.slots.outstanding(), 2);

        o.destroy();
        assert_eq!(o.gpu().state.borrow().live_objects(), 0);
    }

    #[test]
    fn test_two_resizes_cause_one_recreation_at_latest_size() {
        let mut o = orchestrator();
        frame(&mut o);

        o.on_resize(RenderSize::new(1024, 768));
        o.on_resize(RenderSize::new(1280, 720));
        assert_eq!(o.gpu().state.borrow().swapchains_created, 1);

        assert_eq!(o.begin_frame().unwrap(), FrameStatus::NotReady);
        {
            let s = o.gpu().state.borrow();
            assert_eq!(s.swapchains_created, 2);
            assert_eq!(
                s.created_extents.last(),
                Some(&vk::Extent2D {
                    width: 1280,
                    height: 720
                })
            );
            assert!(s.device_idle_waits >= 1);
        }

        frame(&mut o);
        assert_eq!(o.gpu().state.borrow().swapchains_created, 2);
        assert_eq!(o.renderpass.area().extent.width, 1280);
        o.destroy();
        assert_eq!(o.gpu().state.borrow().live_objects(), 0);
    }

    #[test]
    fn test_out_of_date_acquire_skips_frame_and_recreates() {
        let mut o = orchestrator();
        o.gpu()
            .state
            .borrow_mut()
            .acquire_script
            .push_back(vk::Result::ERROR_OUT_OF_DATE_KHR);

        assert_eq!(o.begin_frame().unwrap(), FrameStatus::NotReady);
        {
            let s = o.gpu().state.borrow();
            assert!(s.recording.is_empty());
            assert_eq!(s.swapchains_created, 2);
        }
        assert_ne!(o.slots.current_mut().cmd.state(), CommandBufferState::Recording);

        frame(&mut o);
        assert_eq!(o.gpu().state.borrow().acquires, 2);
        o.destroy();
    }

    #[test]
    fn test_zero_size_defers_recreation_until_nonzero() {
        let mut o = orchestrator();
        o.on_resize(RenderSize::new(0, 600));
        for _ in 0..3 {
            assert_eq!(o.begin_frame().unwrap(), FrameStatus::NotReady);
        }
        assert_eq!(o.gpu().state.borrow().swapchains_created, 1);
        assert_eq!(o.gpu().state.borrow().acquires, 0);

        o.on_resize(RenderSize::new(640, 480));
        assert_eq!(o.begin_frame().unwrap(), FrameStatus::NotReady);
        assert_eq!(o.gpu().state.borrow().swapchains_created, 2);
        frame(&mut o);
        o.destroy();
    }

    #[test]
    fn test_image_reused_by_other_slot_waits_on_its_fence() {
        let mut o = orchestrator();
        let slot0_fence = o.slots.current_mut().in_flight.handle();

        // slot0/img0, slot1/img1, slot0/img2, then slot1 lands on img0
        frame(&mut o);
        frame(&mut o);
        frame(&mut o);
        assert_eq!(o.begin_frame().unwrap(), FrameStatus::Ready);
        assert_eq!(o.phase(), FramePhase::Recording { image: 0 });
        o.end_frame().unwrap();

        let s = o.gpu().state.borrow();
        assert_eq!(s.fence_waits.last(), Some(&(slot0_fence, u64::MAX)));
        assert_eq!(s.presents, vec![0, 1, 2, 0]);
        drop(s);
        o.destroy();
    }

    #[test]
    fn test_suboptimal_acquire_renders_then_recreates() {
        let mut o = orchestrator();
        o.gpu()
            .state
            .borrow_mut()
            .acquire_script
            .push_back(vk::Result::SUBOPTIMAL_KHR);

        frame(&mut o);
        assert_eq!(o.gpu().state.borrow().presents.len(), 1);
        assert_eq!(o.begin_frame().unwrap(), FrameStatus::NotReady);
        assert_eq!(o.gpu().state.borrow().swapchains_created, 2);
        frame(&mut o);
        o.destroy();
    }

    #[test]
    fn test_out_of_date_present_recreates_after_presenting() {
        let mut o = orchestrator();
        o.gpu()
            .state
            .borrow_mut()
            .present_script
            .push_back(vk::Result::ERROR_OUT_OF_DATE_KHR);

        frame(&mut o);
        let s = o.gpu().state.borrow();
        assert_eq!(s.presents.len(), 1);
        assert_eq!(s.swapchains_created, 2);
        drop(s);
        frame(&mut o);
        o.destroy();
    }

    #[test]
    fn test_submit_failure_is_fatal_and_resets_phase() {
        let mut o = orchestrator();
        o.gpu()
            .state
            .borrow_mut()
            .submit_script
            .push_back(vk::Result::ERROR_DEVICE_LOST);

        assert_eq!(o.begin_frame().unwrap(), FrameStatus::Ready);
        let err = o.end_frame().unwrap_err();
        assert!(matches!(err, BackendError::DeviceLost { stage: Stage::Submit }));
        assert_eq!(o.phase(), FramePhase::Idle);
        o.destroy();
        assert_eq!(o.gpu().state.borrow().live_objects(), 0);
    }

    #[test]
    fn test_protocol_misuse_is_reported() {
        let mut o = orchestrator();
        assert!(matches!(o.end_frame(), Err(BackendError::InvalidState(_))));
        assert_eq!(o.begin_frame().unwrap(), FrameStatus::Ready);
        assert!(matches!(o.begin_frame(), Err(BackendError::InvalidState(_))));
        o.end_frame().unwrap();
        o.destroy();
        o.destroy();
    }
}
