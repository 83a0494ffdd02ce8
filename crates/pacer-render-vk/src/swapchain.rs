// SPDX-License-Identifier: CEPL-1.0
//! Swapchain manager: negotiates the presentable image ring with the surface,
//! owns the per-image views and the shared depth attachment, and rebuilds all
//! of it on recreation.

use ash::vk;
use pacer_render::{PresentModePreference, RenderSize, RendererConfig, Stage};
use tracing::{debug, info};

use crate::error::{BackendError, BackendResult, VkResultExt};
use crate::gpu::{Gpu, SwapchainDesc};
use crate::image::Image;

/// Optional image-count bounds layered on top of the surface capabilities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageCountBounds {
    pub desired: Option<u32>,
    pub min: Option<u32>,
    pub max: Option<u32>,
}

/// Everything the swapchain needs to know besides the size, fixed at startup.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainSettings {
    pub present_mode: PresentModePreference,
    pub image_counts: ImageCountBounds,
    pub depth_format: vk::Format,
}

impl SwapchainSettings {
    pub fn from_config(cfg: &RendererConfig, depth_format: vk::Format) -> Self {
        Self {
            present_mode: cfg.present_mode,
            image_counts: ImageCountBounds {
                desired: cfg.desired_image_count,
                min: cfg.min_image_count,
                max: cfg.max_image_count,
            },
            depth_format,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `suboptimal` images are still usable; the semaphore will be signaled.
    Acquired { index: u32, suboptimal: bool },
    /// The surface no longer matches the swapchain. Skip the frame.
    RecreateNeeded,
    /// No image became available within the timeout.
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .unwrap_or(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        })
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    pref: PresentModePreference,
) -> vk::PresentModeKHR {
    let order: &[vk::PresentModeKHR] = match pref {
        PresentModePreference::Mailbox => &[vk::PresentModeKHR::MAILBOX],
        PresentModePreference::Immediate => {
            &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
        }
        PresentModePreference::Fifo => &[],
    };
    // FIFO is the only mode every surface must support.
    order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// `min + 1` unless overridden, then the configured bounds, then the surface
/// limits (a zero `max_image_count` means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, bounds: ImageCountBounds) -> u32 {
    let mut count = bounds.desired.unwrap_or(caps.min_image_count + 1);
    if let Some(min) = bounds.min {
        count = count.max(min);
    }
    if let Some(max) = bounds.max {
        count = count.min(max);
    }
    count = count.max(caps.min_image_count).max(1);
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

/// The surface's current extent, or the requested size clamped to the
/// surface bounds when the surface leaves the choice to the swapchain.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

#[inline]
pub fn max_frames_in_flight(image_count: u32) -> usize {
    (image_count as usize).saturating_sub(1).max(1)
}

#[derive(Debug)]
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    settings: SwapchainSettings,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    depth: Image,
    max_frames_in_flight: usize,
}

impl Swapchain {
    pub fn create<G: Gpu + ?Sized>(
        gpu: &G,
        size: RenderSize,
        settings: SwapchainSettings,
    ) -> BackendResult<Self> {
        let support = gpu.query_swapchain_support().at(Stage::Swapchain)?;
        if !support.is_adequate() {
            return Err(BackendError::Platform {
                stage: Stage::Swapchain,
                message: "surface reports no formats or present modes".into(),
            });
        }
        let caps = &support.capabilities;

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, settings.present_mode);
        let image_count = choose_image_count(caps, settings.image_counts);
        let extent = choose_extent(caps, size);

        let desc = SwapchainDesc {
            surface_format,
            present_mode,
            image_count,
            extent,
            pre_transform: caps.current_transform,
        };
        let handle = gpu.create_swapchain(&desc).at(Stage::Swapchain)?;

        let mut sc = Self {
            handle,
            settings,
            surface_format,
            present_mode,
            extent,
            images: Vec::new(),
            views: Vec::new(),
            depth: Image::empty(),
            max_frames_in_flight: 1,
        };
        if let Err(e) = sc.create_targets(gpu) {
            sc.destroy(gpu);
            return Err(e);
        }

        info!(
            "swapchain: format={:?} colorspace={:?} present={:?} images={} extent={}x{} frames_in_flight={}",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            sc.images.len(),
            extent.width,
            extent.height,
            sc.max_frames_in_flight
        );
        Ok(sc)
    }

    fn create_targets<G: Gpu + ?Sized>(&mut self, gpu: &G) -> BackendResult<()> {
        self.images = gpu.swapchain_images(self.handle).at(Stage::Swapchain)?;
        self.max_frames_in_flight = max_frames_in_flight(self.images.len() as u32);
        for &image in &self.images {
            let view = gpu
                .create_image_view(image, self.surface_format.format, vk::ImageAspectFlags::COLOR)
                .at(Stage::Swapchain)?;
            self.views.push(view);
        }
        self.depth = Image::depth_attachment(gpu, self.extent, self.settings.depth_format)?;
        Ok(())
    }

    /// Waits for the device to go idle, tears the current chain down, and
    /// builds a fresh one at `size`.
    pub fn recreate<G: Gpu + ?Sized>(&mut self, gpu: &G, size: RenderSize) -> BackendResult<()> {
        gpu.device_wait_idle().at(Stage::Swapchain)?;
        self.destroy(gpu);
        *self = Self::create(gpu, size, self.settings)?;
        Ok(())
    }

    pub fn acquire_next_image<G: Gpu + ?Sized>(
        &self,
        gpu: &G,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> BackendResult<AcquireOutcome> {
        match gpu.acquire_next_image(self.handle, timeout_ns, signal) {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("acquire: swapchain out of date");
                Ok(AcquireOutcome::RecreateNeeded)
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                debug!("acquire: no image available yet");
                Ok(AcquireOutcome::Timeout)
            }
            Err(result) => Err(BackendError::vulkan(Stage::Swapchain, result)),
        }
    }

    pub fn present<G: Gpu + ?Sized>(
        &self,
        gpu: &G,
        wait: vk::Semaphore,
        image_index: u32,
    ) -> BackendResult<PresentOutcome> {
        match gpu.queue_present(self.handle, wait, image_index) {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(result) => Err(BackendError::vulkan(Stage::Present, result)),
        }
    }

    /// Views and depth go before the swapchain handle.
    pub fn destroy<G: Gpu + ?Sized>(&mut self, gpu: &G) {
        self.depth.destroy(gpu);
        for view in self.views.drain(..) {
            gpu.destroy_image_view(view);
        }
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            gpu.destroy_swapchain(self.handle);
            self.handle = vk::SwapchainKHR::null();
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.settings.depth_format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    /// Color view of image `index` followed by the shared depth view.
    pub fn attachments(&self, index: usize) -> Vec<vk::ImageView> {
        let mut out = vec![self.views[index]];
        out.extend(self.depth.view());
        out
    }
}
