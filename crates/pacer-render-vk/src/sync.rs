// SPDX-License-Identifier: CEPL-1.0
//! Synchronization primitives.
//!
//! - [`Fence`] - CPU-waitable GPU completion marker, with a cached
//!   signaled flag so repeated waits on a known-complete fence never reach
//!   the driver.
//! - [`Semaphore`] - GPU-only ordering between queue operations.
//!
//! Neither type owns its device; the caller passes the [`Gpu`] in and must
//! call `destroy` before the device goes away.

use ash::vk;
use pacer_render::Stage;
use tracing::{debug, error, warn};

use crate::error::{BackendError, BackendResult, VkResultExt};
use crate::gpu::Gpu;

#[derive(Debug)]
pub struct Fence {
    handle: vk::Fence,
    is_signaled: bool,
}

impl Fence {
    /// Creates a fence. A fence created signaled lets the very first wait on
    /// a frame slot return immediately.
    pub fn create<G: Gpu + ?Sized>(gpu: &G, signaled: bool) -> BackendResult<Self> {
        let handle = gpu.create_fence(signaled).at(Stage::Sync)?;
        Ok(Self {
            handle,
            is_signaled: signaled,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Cached state. Only flips to `true` after a successful wait.
    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.is_signaled
    }

    /// Blocks until the fence signals or `timeout_ns` elapses.
    ///
    /// `Ok(false)` is a timeout and may be retried. Device loss and
    /// out-of-memory come back as errors.
    pub fn wait<G: Gpu + ?Sized>(&mut self, gpu: &G, timeout_ns: u64) -> BackendResult<bool> {
        if self.is_signaled {
            return Ok(true);
        }

        match gpu.wait_for_fence(self.handle, timeout_ns) {
            Ok(()) => {
                self.is_signaled = true;
                Ok(true)
            }
            Err(vk::Result::TIMEOUT) => {
                warn!("fence wait timed out after {timeout_ns} ns");
                Ok(false)
            }
            Err(result) => {
                let err = BackendError::vulkan(Stage::Sync, result);
                error!("fence wait failed: {err}");
                Err(err)
            }
        }
    }

    /// Returns the fence to the unsignaled state. A no-op when the cache
    /// already says unsignaled.
    pub fn reset<G: Gpu + ?Sized>(&mut self, gpu: &G) -> BackendResult<()> {
        if self.is_signaled {
            gpu.reset_fence(self.handle).at(Stage::Sync)?;
            self.is_signaled = false;
        }
        Ok(())
    }

    pub fn destroy<G: Gpu + ?Sized>(&mut self, gpu: &G) {
        if self.handle != vk::Fence::null() {
            gpu.destroy_fence(self.handle);
            self.handle = vk::Fence::null();
            debug!("destroyed fence");
        }
        self.is_signaled = false;
    }
}

#[derive(Debug)]
pub struct Semaphore {
    handle: vk::Semaphore,
}

impl Semaphore {
    pub fn create<G: Gpu + ?Sized>(gpu: &G) -> BackendResult<Self> {
        let handle = gpu.create_semaphore().at(Stage::Sync)?;
        Ok(Self { handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }

    pub fn destroy<G: Gpu + ?Sized>(&mut self, gpu: &G) {
        if self.handle != vk::Semaphore::null() {
            gpu.destroy_semaphore(self.handle);
            self.handle = vk::Semaphore::null();
        }
    }
}
