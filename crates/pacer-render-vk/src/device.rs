// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection and the logical device.
//!
//! Selection runs over [`PhysicalDeviceSnapshot`]s, plain data captured from
//! the driver one device at a time, so the qualification rules can be tested
//! without a GPU. [`VulkanDevice`] owns the logical device, its queues and the
//! graphics command pool, and is the production [`Gpu`].

use std::ffi::{CStr, CString};

use ash::prelude::VkResult;
use ash::{khr, vk};
use pacer_render::{DepthFormat, RendererConfig, Stage};
use tracing::{debug, error, info, trace};

use crate::error::{BackendError, BackendResult, VkResultExt};
use crate::gpu::{Gpu, ImageDesc, QueueRole, Submission, SwapchainDesc};
use crate::instance::Surface;
use crate::renderpass::external_dependency;

#[derive(Clone, Debug, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// What a physical device has to offer to be picked.
#[derive(Clone, Debug)]
pub struct DeviceRequirements {
    pub graphics: bool,
    pub present: bool,
    pub compute: bool,
    pub transfer: bool,
    pub extensions: Vec<&'static CStr>,
    pub sampler_anisotropy: bool,
    pub discrete_gpu: bool,
}

impl DeviceRequirements {
    pub fn from_config(cfg: &RendererConfig) -> Self {
        Self {
            graphics: true,
            present: true,
            compute: cfg.require_compute,
            transfer: true,
            extensions: vec![khr::swapchain::NAME],
            sampler_anisotropy: cfg.require_sampler_anisotropy,
            discrete_gpu: cfg.require_discrete_gpu,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn satisfies(&self, req: &DeviceRequirements) -> bool {
        (!req.graphics || self.graphics.is_some())
            && (!req.present || self.present.is_some())
            && (!req.compute || self.compute.is_some())
            && (!req.transfer || self.transfer.is_some())
    }

    /// Distinct family indices, in graphics/present/transfer/compute order.
    /// One queue create info is issued per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(4);
        for idx in [self.graphics, self.present, self.transfer, self.compute]
            .into_iter()
            .flatten()
        {
            if !out.contains(&idx) {
                out.push(idx);
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilySnapshot {
    pub flags: vk::QueueFlags,
    pub supports_present: bool,
}

/// How many roles besides transfer a family also serves. Lower means more
/// dedicated.
fn transfer_score(flags: vk::QueueFlags) -> u8 {
    u8::from(flags.contains(vk::QueueFlags::GRAPHICS))
        + u8::from(flags.contains(vk::QueueFlags::COMPUTE))
}

/// Graphics, compute and present take the first family that fits. Transfer
/// takes the lowest score; on a tie the earlier family stays.
pub fn resolve_queue_families(families: &[QueueFamilySnapshot]) -> QueueFamilyIndices {
    let mut out = QueueFamilyIndices::default();
    let mut best_transfer = u8::MAX;

    for (i, fam) in families.iter().enumerate() {
        let i = i as u32;
        if out.graphics.is_none() && fam.flags.contains(vk::QueueFlags::GRAPHICS) {
            out.graphics = Some(i);
        }
        if out.compute.is_none() && fam.flags.contains(vk::QueueFlags::COMPUTE) {
            out.compute = Some(i);
        }
        if out.present.is_none() && fam.supports_present {
            out.present = Some(i);
        }
        if fam.flags.contains(vk::QueueFlags::TRANSFER) {
            let score = transfer_score(fam.flags);
            if score < best_transfer {
                best_transfer = score;
                out.transfer = Some(i);
            }
        }
    }
    out
}

/// Everything selection needs to know about one physical device.
#[derive(Clone, Debug, Default)]
pub struct PhysicalDeviceSnapshot {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub driver_version: u32,
    pub memory: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<QueueFamilySnapshot>,
    pub swapchain_support: SwapchainSupport,
    pub extensions: Vec<CString>,
    pub sampler_anisotropy: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    NotDiscrete,
    MissingQueue(QueueFamilyIndices),
    InadequateSwapchain,
    MissingExtension(String),
    NoSamplerAnisotropy,
}

pub fn evaluate_physical_device(
    dev: &PhysicalDeviceSnapshot,
    req: &DeviceRequirements,
) -> Result<QueueFamilyIndices, Rejection> {
    if req.discrete_gpu && dev.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
        return Err(Rejection::NotDiscrete);
    }

    let indices = resolve_queue_families(&dev.queue_families);
    if !indices.satisfies(req) {
        return Err(Rejection::MissingQueue(indices));
    }

    if !dev.swapchain_support.is_adequate() {
        return Err(Rejection::InadequateSwapchain);
    }

    if let Some(missing) = req
        .extensions
        .iter()
        .find(|want| !dev.extensions.iter().any(|have| have.as_c_str() == **want))
    {
        return Err(Rejection::MissingExtension(
            missing.to_string_lossy().into_owned(),
        ));
    }

    if req.sampler_anisotropy && !dev.sampler_anisotropy {
        return Err(Rejection::NoSamplerAnisotropy);
    }

    Ok(indices)
}

/// Walks the candidates in order and stops at the first one that qualifies;
/// later candidates are never pulled from the iterator.
pub fn select_physical_device<I>(
    candidates: I,
    req: &DeviceRequirements,
) -> BackendResult<(PhysicalDeviceSnapshot, QueueFamilyIndices)>
where
    I: IntoIterator<Item = BackendResult<PhysicalDeviceSnapshot>>,
{
    let mut seen = 0usize;
    for candidate in candidates {
        let dev = candidate?;
        seen += 1;
        match evaluate_physical_device(&dev, req) {
            Ok(indices) => {
                trace!(
                    graphics = ?indices.graphics,
                    present = ?indices.present,
                    compute = ?indices.compute,
                    transfer = ?indices.transfer,
                    "queue families for '{}'",
                    dev.name
                );
                return Ok((dev, indices));
            }
            Err(why) => info!("skipping device '{}': {:?}", dev.name, why),
        }
    }

    if seen == 0 {
        error!("no devices supporting Vulkan were found");
        Err(BackendError::NoVulkanCapableDevices)
    } else {
        error!("none of {seen} devices meets the renderer requirements");
        Err(BackendError::NoDeviceFound)
    }
}

pub fn find_memory_index(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && props.memory_types[i as usize].property_flags.contains(flags)
    })
}

pub fn vk_depth_format(f: DepthFormat) -> vk::Format {
    match f {
        DepthFormat::D32Sfloat => vk::Format::D32_SFLOAT,
        DepthFormat::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        DepthFormat::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        DepthFormat::D16Unorm => vk::Format::D16_UNORM,
    }
}

/// First candidate usable as a depth-stencil attachment.
pub fn detect_depth_format<G: Gpu + ?Sized>(
    gpu: &G,
    candidates: &[DepthFormat],
) -> BackendResult<vk::Format> {
    candidates
        .iter()
        .map(|&f| vk_depth_format(f))
        .find(|&f| gpu.supports_depth_format(f))
        .ok_or(BackendError::NoDepthFormat(candidates.len()))
}

fn device_type_name(t: vk::PhysicalDeviceType) -> &'static str {
    match t {
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated",
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Unknown",
    }
}

fn version_triple(v: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(v),
        vk::api_version_minor(v),
        vk::api_version_patch(v)
    )
}

fn log_device_report(dev: &PhysicalDeviceSnapshot) {
    info!("selected device: '{}'", dev.name);
    info!("GPU type: {}", device_type_name(dev.device_type));
    info!("GPU driver version: {}", version_triple(dev.driver_version));
    info!("Vulkan API version: {}", version_triple(dev.api_version));
    let heaps = &dev.memory.memory_heaps[..dev.memory.memory_heap_count as usize];
    for heap in heaps {
        let gib = heap.size as f64 / (1024.0 * 1024.0 * 1024.0);
        if heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL) {
            info!("local GPU memory: {gib:.2} GiB");
        } else {
            info!("shared system memory: {gib:.2} GiB");
        }
    }
}

unsafe fn snapshot_physical_device(
    instance: &ash::Instance,
    surface: &Surface,
    handle: vk::PhysicalDevice,
) -> BackendResult<PhysicalDeviceSnapshot> {
    let props = instance.get_physical_device_properties(handle);
    let features = instance.get_physical_device_features(handle);
    let memory = instance.get_physical_device_memory_properties(handle);

    let families = instance.get_physical_device_queue_family_properties(handle);
    let mut queue_families = Vec::with_capacity(families.len());
    for (i, fam) in families.iter().enumerate() {
        let supports_present = surface
            .loader()
            .get_physical_device_surface_support(handle, i as u32, surface.handle())
            .at(Stage::Device)?;
        queue_families.push(QueueFamilySnapshot {
            flags: fam.queue_flags,
            supports_present,
        });
    }

    let swapchain_support =
        query_surface_support(surface, handle).at(Stage::Device)?;

    let extensions = instance
        .enumerate_device_extension_properties(handle)
        .at(Stage::Device)?
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();

    Ok(PhysicalDeviceSnapshot {
        handle,
        name: props
            .device_name_as_c_str()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        device_type: props.device_type,
        api_version: props.api_version,
        driver_version: props.driver_version,
        memory,
        queue_families,
        swapchain_support,
        extensions,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
    })
}

unsafe fn query_surface_support(
    surface: &Surface,
    phys: vk::PhysicalDevice,
) -> VkResult<SwapchainSupport> {
    let loader = surface.loader();
    Ok(SwapchainSupport {
        capabilities: loader.get_physical_device_surface_capabilities(phys, surface.handle())?,
        formats: loader.get_physical_device_surface_formats(phys, surface.handle())?,
        present_modes: loader.get_physical_device_surface_present_modes(phys, surface.handle())?,
    })
}

pub struct VulkanDevice {
    instance: ash::Instance,
    physical: vk::PhysicalDevice,
    memory: vk::PhysicalDeviceMemoryProperties,
    indices: QueueFamilyIndices,
    device: ash::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    transfer_queue: vk::Queue,
    command_pool: vk::CommandPool,
    surface_loader: khr::surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain_loader: khr::swapchain::Device,
    destroyed: bool,
}

/// Picks the first qualifying physical device, then creates the logical
/// device, its queues and the graphics command pool.
pub fn select_and_create_device(
    instance: &ash::Instance,
    surface: &Surface,
    req: &DeviceRequirements,
) -> BackendResult<VulkanDevice> {
    let physical_devices = unsafe { instance.enumerate_physical_devices() }.at(Stage::Device)?;
    debug!("{} physical device(s) enumerated", physical_devices.len());

    let candidates = physical_devices
        .iter()
        .map(|&pd| unsafe { snapshot_physical_device(instance, surface, pd) });
    let (dev, indices) = select_physical_device(candidates, req)?;
    log_device_report(&dev);

    // Indices are guaranteed by `satisfies` for every required role.
    let graphics = indices.graphics.ok_or(BackendError::NoDeviceFound)?;
    let present = indices.present.ok_or(BackendError::NoDeviceFound)?;
    let transfer = indices.transfer.unwrap_or(graphics);

    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = indices
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let ext_ptrs: Vec<*const std::ffi::c_char> =
        req.extensions.iter().map(|e| e.as_ptr()).collect();
    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: if req.sampler_anisotropy { vk::TRUE } else { vk::FALSE },
        ..Default::default()
    };
    let dinfo = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&ext_ptrs)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(dev.handle, &dinfo, None) }.at(Stage::Device)?;
    info!("logical device created ({} queue families)", queue_infos.len());

    let (graphics_queue, present_queue, transfer_queue) = unsafe {
        (
            device.get_device_queue(graphics, 0),
            device.get_device_queue(present, 0),
            device.get_device_queue(transfer, 0),
        )
    };

    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(graphics)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
    let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
        Ok(pool) => pool,
        Err(result) => {
            unsafe { device.destroy_device(None) };
            return Err(BackendError::vulkan(Stage::Device, result));
        }
    };
    debug!("graphics command pool created");

    Ok(VulkanDevice {
        instance: instance.clone(),
        physical: dev.handle,
        memory: dev.memory,
        indices,
        swapchain_loader: khr::swapchain::Device::new(instance, &device),
        device,
        graphics_queue,
        present_queue,
        transfer_queue,
        command_pool,
        surface_loader: surface.loader().clone(),
        surface: surface.handle(),
        destroyed: false,
    })
}

impl VulkanDevice {
    fn queue(&self, role: QueueRole) -> vk::Queue {
        match role {
            QueueRole::Graphics => self.graphics_queue,
            QueueRole::Present => self.present_queue,
            QueueRole::Transfer => self.transfer_queue,
        }
    }

    /// Pool, then device. Everything allocated from the device must already
    /// be gone.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        unsafe {
            if self.command_pool != vk::CommandPool::null() {
                self.device.destroy_command_pool(self.command_pool, None);
                self.command_pool = vk::CommandPool::null();
                debug!("command pool destroyed");
            }
            self.device.destroy_device(None);
        }
        info!("logical device destroyed");
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Gpu for VulkanDevice {
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn queue_wait_idle(&self, queue: QueueRole) -> VkResult<()> {
        unsafe { self.device.queue_wait_idle(self.queue(queue)) }
    }

    fn allocate_command_buffer(&self, primary: bool) -> VkResult<vk::CommandBuffer> {
        let level = if primary {
            vk::CommandBufferLevel::PRIMARY
        } else {
            vk::CommandBufferLevel::SECONDARY
        };
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(level)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }?;
        buffers.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(self.command_pool, &[cmd]) }
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device.begin_command_buffer(cmd, &info) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }

    fn cmd_set_viewport_scissor(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(cmd, 0, &[scissor]);
        }
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(area)
            .clear_values(clear_values);
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn query_swapchain_support(&self) -> VkResult<SwapchainSupport> {
        let loader = &self.surface_loader;
        unsafe {
            Ok(SwapchainSupport {
                capabilities: loader
                    .get_physical_device_surface_capabilities(self.physical, self.surface)?,
                formats: loader.get_physical_device_surface_formats(self.physical, self.surface)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(self.physical, self.surface)?,
            })
        }
    }

    fn supports_depth_format(&self, format: vk::Format) -> bool {
        let props = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical, format)
        };
        let want = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        props.linear_tiling_features.contains(want) || props.optimal_tiling_features.contains(want)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let families = [
            self.indices.graphics.unwrap_or_default(),
            self.indices.present.unwrap_or_default(),
        ];
        let mut info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);

        // Shared images when presentation happens on another family.
        if families[0] != families[1] {
            info = info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families);
        } else {
            info = info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
        }

        unsafe { self.swapchain_loader.create_swapchain(&info, None) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn create_image(&self, desc: &ImageDesc) -> VkResult<(vk::Image, vk::DeviceMemory)> {
        let img_ci = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format: desc.format,
            extent: vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: desc.tiling,
            usage: desc.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = unsafe { self.device.create_image(&img_ci, None) }?;

        let req = unsafe { self.device.get_image_memory_requirements(image) };
        let Some(memory_type_index) =
            find_memory_index(&self.memory, req.memory_type_bits, desc.memory_flags)
        else {
            error!("no memory type matches {:?}", desc.memory_flags);
            unsafe { self.device.destroy_image(image, None) };
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        };

        let alloc = vk::MemoryAllocateInfo::default()
            .allocation_size(req.size)
            .memory_type_index(memory_type_index);
        let memory = match unsafe { self.device.allocate_memory(&alloc, None) } {
            Ok(m) => m,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };
        if let Err(e) = unsafe { self.device.bind_image_memory(image, memory, 0) } {
            unsafe {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
            }
            return Err(e);
        }
        Ok((image, memory))
    }

    fn destroy_image(&self, image: vk::Image, memory: vk::DeviceMemory) {
        unsafe {
            self.device.destroy_image(image, None);
            self.device.free_memory(memory, None);
        }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.device.create_image_view(&info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_render_pass(
        &self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> VkResult<vk::RenderPass> {
        let attachments = [
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            vk::AttachmentDescription::default()
                .format(depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];
        let color_ref = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_ref)
            .depth_stencil_attachment(&depth_ref)];
        let dependencies = [external_dependency()];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe { self.device.create_render_pass(&info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { self.device.create_framebuffer(&info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        }
    }

    fn queue_submit(&self, queue: QueueRole, submission: &Submission<'_>) -> VkResult<()> {
        let (wait_sems, wait_stages): (Vec<_>, Vec<_>) = submission.wait.into_iter().unzip();
        let signal_sems: Vec<_> = submission.signal.into_iter().collect();
        let info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_sems)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(submission.command_buffers)
            .signal_semaphores(&signal_sems);
        unsafe {
            self.device
                .queue_submit(self.queue(queue), &[info], submission.fence)
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        wait: vk::Semaphore,
        image_index: u32,
    ) -> VkResult<bool> {
        let waits = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &info)
        }
    }
}
