use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{command_buffer::GfxCommandBuffer, fence::GfxFence, submit_info::GfxSubmitInfo},
    foundation::device::GfxDevice,
};

/// 队列封装
///
/// 队列提交必须外部串行化：不允许两个线程同时向同一个 queue 提交
pub struct GfxQueue {
    handle: vk::Queue,
    queue_family_index: u32,

    device: Rc<GfxDevice>,
}

// new
impl GfxQueue {
    pub fn new(device: Rc<GfxDevice>, queue_family_index: u32, queue_index: u32) -> Self {
        let handle = unsafe { device.get_device_queue(queue_family_index, queue_index) };
        Self {
            handle,
            queue_family_index,
            device,
        }
    }
}

// getter
impl GfxQueue {
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

// tools
impl GfxQueue {
    pub fn submit(&self, batches: Vec<GfxSubmitInfo>, fence: Option<&GfxFence>) {
        unsafe {
            // batches 的存在是有必要的，submit_infos 引用的是 batches 的内存
            let submit_infos = batches.iter().map(|b| b.as_raw()).collect_vec();

            self.device
                .queue_submit2(self.handle, &submit_infos, fence.map_or(vk::Fence::null(), |f| f.handle()))
                .unwrap();
        }
    }

    /// 不带 semaphore 依赖的提交
    #[inline]
    pub fn submit_cmds(&self, cmds: &[GfxCommandBuffer], fence: Option<&GfxFence>) {
        self.submit(vec![GfxSubmitInfo::new(cmds)], fence);
    }

    /// 根据 specification，vkQueueWaitIdle 应该和 Fence 效率相同
    #[inline]
    pub fn wait_idle(&self) {
        unsafe { self.device.queue_wait_idle(self.handle).unwrap() }
    }
}
