// SPDX-License-Identifier: CEPL-1.0
//! Device-local 2D images with their memory and an optional view.

use ash::vk;
use pacer_render::Stage;

use crate::error::{BackendError, BackendResult, VkResultExt};
use crate::gpu::{Gpu, ImageDesc};

#[derive(Debug)]
pub struct Image {
    handle: vk::Image,
    memory: vk::DeviceMemory,
    view: Option<vk::ImageView>,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl Image {
    /// Creates the image, binds memory, and builds a view over `view_aspect`
    /// when one is given.
    pub fn create<G: Gpu + ?Sized>(
        gpu: &G,
        desc: &ImageDesc,
        view_aspect: Option<vk::ImageAspectFlags>,
    ) -> BackendResult<Self> {
        let (handle, memory) = gpu.create_image(desc).at(Stage::Swapchain)?;
        let mut image = Self {
            handle,
            memory,
            view: None,
            extent: desc.extent,
            format: desc.format,
        };
        if let Some(aspect) = view_aspect {
            match gpu.create_image_view(handle, desc.format, aspect) {
                Ok(view) => image.view = Some(view),
                Err(result) => {
                    image.destroy(gpu);
                    return Err(BackendError::vulkan(Stage::Swapchain, result));
                }
            }
        }
        Ok(image)
    }

    /// Placeholder holding no handles; `destroy` on it is a no-op.
    pub(crate) fn empty() -> Self {
        Self {
            handle: vk::Image::null(),
            memory: vk::DeviceMemory::null(),
            view: None,
            extent: vk::Extent2D::default(),
            format: vk::Format::UNDEFINED,
        }
    }

    /// Depth attachment sized to the swapchain.
    pub fn depth_attachment<G: Gpu + ?Sized>(
        gpu: &G,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> BackendResult<Self> {
        let desc = ImageDesc {
            extent,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };
        Self::create(gpu, &desc, Some(vk::ImageAspectFlags::DEPTH))
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> Option<vk::ImageView> {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn destroy<G: Gpu + ?Sized>(&mut self, gpu: &G) {
        if let Some(view) = self.view.take() {
            gpu.destroy_image_view(view);
        }
        if self.handle != vk::Image::null() {
            gpu.destroy_image(self.handle, self.memory);
            self.handle = vk::Image::null();
            self.memory = vk::DeviceMemory::null();
        }
    }
}
