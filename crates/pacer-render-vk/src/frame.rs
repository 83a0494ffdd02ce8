// SPDX-License-Identifier: CEPL-1.0
//! Per-frame resources.
//!
//! Two index spaces live here and are never mixed:
//! - [`FrameSlots`], indexed by [`SlotIndex`]: one set of sync objects and a
//!   command buffer per frame in flight.
//! - [`ImagesInFlight`], indexed by swapchain image: which slot last
//!   submitted work targeting that image.

use tracing::debug;

use crate::command_buffer::CommandBuffer;
use crate::error::{BackendError, BackendResult};
use crate::gpu::Gpu;
use crate::sync::{Fence, Semaphore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotIndex(usize);

impl SlotIndex {
    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct FrameSlot {
    pub cmd: CommandBuffer,
    /// Signaled by acquire, waited on by submit.
    pub image_available: Semaphore,
    /// Signaled by submit, waited on by present.
    pub queue_complete: Semaphore,
    /// Created signaled so the first wait on the slot falls through.
    pub in_flight: Fence,
}

impl FrameSlot {
    fn create<G: Gpu + ?Sized>(gpu: &G) -> BackendResult<Self> {
        let cmd = CommandBuffer::allocate(gpu, true)?;
        let image_available = Semaphore::create(gpu)?;
        let queue_complete = Semaphore::create(gpu)?;
        let in_flight = Fence::create(gpu, true)?;
        Ok(Self {
            cmd,
            image_available,
            queue_complete,
            in_flight,
        })
    }

    fn destroy<G: Gpu + ?Sized>(&mut self, gpu: &G) {
        self.in_flight.destroy(gpu);
        self.queue_complete.destroy(gpu);
        self.image_available.destroy(gpu);
        self.cmd.free(gpu);
    }
}

/// All slots are created up front. Only the first `active` of them rotate,
/// so a swapchain that now allows fewer frames in flight leaves the rest idle.
#[derive(Debug)]
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    active: usize,
    current: usize,
}

impl FrameSlots {
    pub fn create<G: Gpu + ?Sized>(gpu: &G, count: usize) -> BackendResult<Self> {
        if count == 0 {
            return Err(BackendError::InvalidState("at least one frame slot is required"));
        }
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match FrameSlot::create(gpu) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in &mut slots {
                        slot.destroy(gpu);
                    }
                    return Err(e);
                }
            }
        }
        debug!("{count} frame slot(s) created");
        Ok(Self {
            slots,
            active: count,
            current: 0,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn active(&self) -> usize {
        self.active
    }

    /// Limits rotation to `min(limit, len)` slots, never fewer than one.
    /// Only valid while the device is idle.
    pub fn set_active(&mut self, limit: usize) {
        self.active = limit.clamp(1, self.slots.len().max(1));
        if self.current >= self.active {
            self.current = 0;
        }
    }

    #[inline]
    pub fn current_index(&self) -> SlotIndex {
        SlotIndex(self.current)
    }

    pub fn current_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[self.current]
    }

    pub fn get(&self, index: SlotIndex) -> &FrameSlot {
        &self.slots[index.0]
    }

    pub fn get_mut(&mut self, index: SlotIndex) -> &mut FrameSlot {
        &mut self.slots[index.0]
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.active.max(1);
    }

    /// Slots whose fence is not known to have signaled.
    pub fn outstanding(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !s.in_flight.is_signaled())
            .count()
    }

    pub fn destroy<G: Gpu + ?Sized>(&mut self, gpu: &G) {
        for slot in &mut self.slots {
            slot.destroy(gpu);
        }
        self.slots.clear();
        self.active = 0;
        self.current = 0;
    }
}

/// Non-owning record of which slot last used each swapchain image.
#[derive(Debug, Default)]
pub struct ImagesInFlight {
    owners: Vec<Option<SlotIndex>>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Only valid while the device is idle.
    pub fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn owner(&self, image: u32) -> Option<SlotIndex> {
        self.owners.get(image as usize).copied().flatten()
    }

    /// Records `slot` as the latest user of `image`, returning the previous one.
    pub fn claim(&mut self, image: u32, slot: SlotIndex) -> Option<SlotIndex> {
        self.owners
            .get_mut(image as usize)
            .and_then(|entry| entry.replace(slot))
    }
}
