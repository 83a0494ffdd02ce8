// SPDX-License-Identifier: CEPL-1.0
//! Instance, validation layer, debug messenger and window surface.

use std::ffi::{c_void, CStr, CString};

use ash::{ext, khr, vk, Entry};
use pacer_render::Stage;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, error, info, trace, warn, Level};

use crate::error::{BackendError, BackendResult, VkResultExt};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Tracing level a validation message is logged at.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if severity.contains(S::ERROR) {
        Level::ERROR
    } else if severity.contains(S::WARNING) {
        Level::WARN
    } else if severity.contains(S::INFO) {
        Level::INFO
    } else {
        Level::TRACE
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    let level = severity_level(severity);
    if level == Level::ERROR {
        error!("[vulkan] {msg}");
    } else if level == Level::WARN {
        warn!("[vulkan] {msg}");
    } else if level == Level::INFO {
        info!("[vulkan] {msg}");
    } else {
        trace!("[vulkan] {msg}");
    }
    vk::FALSE
}

fn has_layer(available: &[vk::LayerProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == name))
}

/// Window surface plus the instance-level loader that services it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn loader(&self) -> &khr::surface::Instance {
        &self.loader
    }

    /// After the device, before the instance.
    pub fn destroy(&mut self) {
        if self.handle != vk::SurfaceKHR::null() {
            unsafe { self.loader.destroy_surface(self.handle, None) };
            self.handle = vk::SurfaceKHR::null();
            debug!("surface destroyed");
        }
    }
}

pub struct VulkanInstance {
    entry: Entry,
    instance: ash::Instance,
    debug: Option<(ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    // STRICT ORDER:
    // 1) instance (WSI extensions + debug utils when validating)
    // 2) debug messenger
    // 3) surface, from THIS instance
    pub fn create(display: RawDisplayHandle, app_name: &str, validation: bool) -> BackendResult<Self> {
        let entry = unsafe { Entry::load() }?;

        let app = CString::new(app_name).map_err(|e| BackendError::Platform {
            stage: Stage::Instance,
            message: format!("application name: {e}"),
        })?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"pacer")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .at(Stage::Instance)?
            .to_vec();

        let validation = validation && {
            let layers = unsafe { entry.enumerate_instance_layer_properties() }.at(Stage::Instance)?;
            let found = has_layer(&layers, VALIDATION_LAYER);
            if !found {
                warn!("validation requested but {VALIDATION_LAYER:?} is not installed; continuing without it");
            }
            found
        };

        let layer_ptrs: Vec<*const std::ffi::c_char> = if validation {
            extensions.push(ext::debug_utils::NAME.as_ptr());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        for ext_name in &extensions {
            debug!("instance extension: {:?}", unsafe { CStr::from_ptr(*ext_name) });
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);
        let instance = unsafe { entry.create_instance(&create_info, None) }.at(Stage::Instance)?;
        info!("Vulkan instance created (validation: {validation})");

        let mut this = Self {
            entry,
            instance,
            debug: None,
        };
        if validation {
            if let Err(e) = this.create_debug_messenger() {
                this.destroy();
                return Err(e);
            }
        }
        Ok(this)
    }

    fn create_debug_messenger(&mut self) -> BackendResult<()> {
        let loader = ext::debug_utils::Instance::new(&self.entry, &self.instance);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));
        let messenger =
            unsafe { loader.create_debug_utils_messenger(&ci, None) }.at(Stage::Instance)?;
        debug!("debug messenger created");
        self.debug = Some((loader, messenger));
        Ok(())
    }

    pub fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> BackendResult<Surface> {
        let handle = unsafe {
            ash_window::create_surface(&self.entry, &self.instance, display, window, None)
        }
        .at(Stage::Surface)?;
        info!("surface created");
        Ok(Surface {
            handle,
            loader: khr::surface::Instance::new(&self.entry, &self.instance),
        })
    }

    #[inline]
    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }

    /// Debug messenger, then the instance. Last thing torn down.
    pub fn destroy(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
                debug!("debug messenger destroyed");
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_maps_to_tracing_level() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(severity_level(S::ERROR), Level::ERROR);
        assert_eq!(severity_level(S::WARNING), Level::WARN);
        assert_eq!(severity_level(S::INFO), Level::INFO);
        assert_eq!(severity_level(S::VERBOSE), Level::TRACE);
        assert_eq!(severity_level(S::WARNING | S::ERROR), Level::ERROR);
    }

    #[test]
    fn test_layer_lookup_by_name() {
        let mut props = vk::LayerProperties::default();
        for (dst, src) in props
            .layer_name
            .iter_mut()
            .zip(VALIDATION_LAYER.to_bytes_with_nul())
        {
            *dst = *src as std::ffi::c_char;
        }
        assert!(has_layer(&[props], VALIDATION_LAYER));
        assert!(!has_layer(&[], VALIDATION_LAYER));
        assert!(!has_layer(&[vk::LayerProperties::default()], VALIDATION_LAYER));
    }
}
