// SPDX-License-Identifier: CEPL-1.0
//! Simulated device for unit tests.
//!
//! Submissions complete lazily: a fence handed to `queue_submit` stays
//! pending until someone waits on it (or the device goes idle). With
//! `stalled` set, pending fences never complete and bounded waits time out.
//! Protocol violations a validation layer would flag panic immediately.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::device::SwapchainSupport;
use crate::gpu::{Gpu, ImageDesc, QueueRole, Submission, SwapchainDesc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FenceState {
    Unsignaled,
    Pending,
    Signaled,
}

pub(crate) struct MockSwapchain {
    pub images: Vec<vk::Image>,
    next: u32,
}

#[derive(Default)]
pub(crate) struct MockState {
    next_handle: u64,
    pub fences: HashMap<vk::Fence, FenceState>,
    pub semaphores: HashMap<vk::Semaphore, bool>,
    pub command_buffers: HashSet<vk::CommandBuffer>,
    /// Queue whose family each buffer's pool belongs to.
    pub buffer_pools: HashMap<vk::CommandBuffer, QueueRole>,
    pub recording: HashSet<vk::CommandBuffer>,
    pub in_render_pass: HashSet<vk::CommandBuffer>,
    pub swapchains: HashMap<vk::SwapchainKHR, MockSwapchain>,
    pub images: HashSet<vk::Image>,
    pub views: HashSet<vk::ImageView>,
    pub render_passes: HashSet<vk::RenderPass>,
    pub framebuffers: HashSet<vk::Framebuffer>,

    pub support: SwapchainSupport,
    pub depth_supported: Vec<vk::Format>,
    pub acquire_script: VecDeque<vk::Result>,
    pub present_script: VecDeque<vk::Result>,
    pub wait_script: VecDeque<vk::Result>,
    pub submit_script: VecDeque<vk::Result>,
    pub stalled: bool,

    pub swapchains_created: usize,
    pub created_extents: Vec<vk::Extent2D>,
    pub fence_waits: Vec<(vk::Fence, u64)>,
    pub device_idle_waits: usize,
    pub queue_idle_waits: usize,
    pub acquires: usize,
    pub submits: usize,
    pub submitted_to: Vec<QueueRole>,
    pub presents: Vec<u32>,
    pub render_pass_begins: usize,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Count of every object the mock currently considers alive.
    pub fn live_objects(&self) -> usize {
        self.fences.len()
            + self.semaphores.len()
            + self.command_buffers.len()
            + self.swapchains.len()
            + self.images.len()
            + self.views.len()
            + self.render_passes.len()
            + self.framebuffers.len()
    }

    pub fn pending_fences(&self) -> usize {
        self.fences
            .values()
            .filter(|s| **s == FenceState::Pending)
            .count()
    }
}

pub(crate) struct MockGpu {
    pub state: RefCell<MockState>,
}

pub(crate) fn default_support() -> SwapchainSupport {
    SwapchainSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}

impl MockGpu {
    pub fn new() -> Self {
        Self::with_support(default_support())
    }

    pub fn with_support(support: SwapchainSupport) -> Self {
        let state = MockState {
            support,
            depth_supported: vec![vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT],
            ..Default::default()
        };
        Self {
            state: RefCell::new(state),
        }
    }
}

impl Gpu for MockGpu {
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state.borrow_mut();
        let fence = vk::Fence::from_raw(s.handle());
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        s.fences.insert(fence, state);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.state.borrow_mut();
        let state = s.fences.remove(&fence).expect("destroying unknown fence");
        assert_ne!(state, FenceState::Pending, "destroying a fence still in use");
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.fence_waits.push((fence, timeout_ns));
        if let Some(r) = s.wait_script.pop_front() {
            return Err(r);
        }
        let stalled = s.stalled;
        let state = s.fences.get_mut(&fence).expect("waiting on unknown fence");
        match *state {
            FenceState::Signaled => Ok(()),
            FenceState::Pending if !stalled => {
                *state = FenceState::Signaled;
                Ok(())
            }
            _ if timeout_ns == u64::MAX => {
                panic!("unbounded wait on a fence that will never signal")
            }
            _ => Err(vk::Result::TIMEOUT),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        let state = s.fences.get_mut(&fence).expect("resetting unknown fence");
        assert_ne!(*state, FenceState::Pending, "resetting a fence still in use");
        *state = FenceState::Unsignaled;
        Ok(())
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut s = self.state.borrow_mut();
        let sem = vk::Semaphore::from_raw(s.handle());
        s.semaphores.insert(sem, false);
        Ok(sem)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut s = self.state.borrow_mut();
        s.semaphores
            .remove(&semaphore)
            .expect("destroying unknown semaphore");
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.device_idle_waits += 1;
        for state in s.fences.values_mut() {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
            }
        }
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: QueueRole) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.queue_idle_waits += 1;
        Ok(())
    }

    fn allocate_command_buffer(&self, _primary: bool) -> VkResult<vk::CommandBuffer> {
        let mut s = self.state.borrow_mut();
        let cmd = vk::CommandBuffer::from_raw(s.handle());
        s.command_buffers.insert(cmd);
        // the device owns a single graphics-family pool
        s.buffer_pools.insert(cmd, QueueRole::Graphics);
        Ok(cmd)
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        let mut s = self.state.borrow_mut();
        assert!(s.command_buffers.remove(&cmd), "freeing unknown command buffer");
        s.buffer_pools.remove(&cmd);
        s.recording.remove(&cmd);
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.recording.remove(&cmd);
        s.in_render_pass.remove(&cmd);
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        assert!(s.recording.insert(cmd), "command buffer already recording");
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        assert!(
            !s.in_render_pass.contains(&cmd),
            "ending a command buffer inside a render pass"
        );
        assert!(s.recording.remove(&cmd), "command buffer was not recording");
        Ok(())
    }

    fn cmd_set_viewport_scissor(&self, cmd: vk::CommandBuffer, _extent: vk::Extent2D) {
        assert!(self.state.borrow().recording.contains(&cmd));
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        _area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let mut s = self.state.borrow_mut();
        assert!(s.recording.contains(&cmd), "render pass outside recording");
        assert!(s.render_passes.contains(&render_pass));
        assert!(s.framebuffers.contains(&framebuffer));
        assert_eq!(clear_values.len(), 2);
        assert!(s.in_render_pass.insert(cmd), "render pass already open");
        s.render_pass_begins += 1;
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        let mut s = self.state.borrow_mut();
        assert!(s.in_render_pass.remove(&cmd), "no render pass open");
    }

    fn query_swapchain_support(&self) -> VkResult<SwapchainSupport> {
        Ok(self.state.borrow().support.clone())
    }

    fn supports_depth_format(&self, format: vk::Format) -> bool {
        self.state.borrow().depth_supported.contains(&format)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let mut s = self.state.borrow_mut();
        let sc = vk::SwapchainKHR::from_raw(s.handle());
        let images = (0..desc.image_count)
            .map(|_| vk::Image::from_raw(s.handle()))
            .collect();
        s.swapchains.insert(
            sc,
            MockSwapchain {
                images,
                next: 0,
            },
        );
        s.swapchains_created += 1;
        s.created_extents.push(desc.extent);
        Ok(sc)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut s = self.state.borrow_mut();
        assert!(
            s.pending_fences() == 0,
            "swapchain destroyed while GPU work is pending"
        );
        s.swapchains
            .remove(&swapchain)
            .expect("destroying unknown swapchain");
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok(self.state.borrow().swapchains[&swapchain].images.clone())
    }

    fn create_image(&self, _desc: &ImageDesc) -> VkResult<(vk::Image, vk::DeviceMemory)> {
        let mut s = self.state.borrow_mut();
        let image = vk::Image::from_raw(s.handle());
        let memory = vk::DeviceMemory::from_raw(s.handle());
        s.images.insert(image);
        Ok((image, memory))
    }

    fn destroy_image(&self, image: vk::Image, _memory: vk::DeviceMemory) {
        let mut s = self.state.borrow_mut();
        assert!(s.images.remove(&image), "destroying unknown image");
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        let mut s = self.state.borrow_mut();
        let view = vk::ImageView::from_raw(s.handle());
        s.views.insert(view);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut s = self.state.borrow_mut();
        assert!(s.views.remove(&view), "destroying unknown image view");
    }

    fn create_render_pass(
        &self,
        _color_format: vk::Format,
        _depth_format: vk::Format,
    ) -> VkResult<vk::RenderPass> {
        let mut s = self.state.borrow_mut();
        let rp = vk::RenderPass::from_raw(s.handle());
        s.render_passes.insert(rp);
        Ok(rp)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        let mut s = self.state.borrow_mut();
        assert!(s.render_passes.remove(&render_pass));
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut s = self.state.borrow_mut();
        assert!(s.render_passes.contains(&render_pass));
        assert!(attachments.iter().all(|v| s.views.contains(v)));
        let fb = vk::Framebuffer::from_raw(s.handle());
        s.framebuffers.insert(fb);
        Ok(fb)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut s = self.state.borrow_mut();
        assert!(s.framebuffers.remove(&framebuffer));
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state.borrow_mut();
        s.acquires += 1;
        let scripted = s.acquire_script.pop_front();
        let suboptimal = match scripted {
            Some(vk::Result::SUBOPTIMAL_KHR) => true,
            Some(r) => return Err(r),
            None => false,
        };
        let signaled = s.semaphores.get_mut(&signal).expect("unknown semaphore");
        assert!(!*signaled, "acquire into a semaphore that is already signaled");
        *signaled = true;
        let sc = s.swapchains.get_mut(&swapchain).expect("unknown swapchain");
        let index = sc.next;
        sc.next = (sc.next + 1) % sc.images.len() as u32;
        Ok((index, suboptimal))
    }

    fn queue_submit(&self, queue: QueueRole, submission: &Submission<'_>) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        if let Some(r) = s.submit_script.pop_front() {
            return Err(r);
        }
        for cmd in submission.command_buffers {
            assert!(!s.recording.contains(cmd), "submitting a recording buffer");
            assert_eq!(
                s.buffer_pools.get(cmd),
                Some(&queue),
                "submitting a command buffer to a queue outside its pool's family"
            );
        }
        if let Some((sem, _)) = submission.wait {
            let signaled = s.semaphores.get_mut(&sem).expect("unknown semaphore");
            assert!(*signaled, "submit waits on a semaphore nobody signals");
            *signaled = false;
        }
        if let Some(sem) = submission.signal {
            let signaled = s.semaphores.get_mut(&sem).expect("unknown semaphore");
            assert!(!*signaled, "submit signals an already signaled semaphore");
            *signaled = true;
        }
        if submission.fence != vk::Fence::null() {
            let state = s
                .fences
                .get_mut(&submission.fence)
                .expect("unknown fence");
            assert_eq!(*state, FenceState::Unsignaled, "submit with a fence not reset");
            *state = FenceState::Pending;
        }
        s.submits += 1;
        s.submitted_to.push(queue);
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        wait: vk::Semaphore,
        image_index: u32,
    ) -> VkResult<bool> {
        let mut s = self.state.borrow_mut();
        assert!(s.swapchains.contains_key(&swapchain));
        let signaled = s.semaphores.get_mut(&wait).expect("unknown semaphore");
        assert!(*signaled, "present waits on a semaphore nobody signals");
        *signaled = false;
        s.presents.push(image_index);
        match s.present_script.pop_front() {
            Some(vk::Result::SUBOPTIMAL_KHR) => Ok(true),
            Some(r) => Err(r),
            None => Ok(false),
        }
    }
}
