use ash::vk;
use itertools::Itertools;

use crate::commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore};

/// 对 vk::SubmitInfo2 的封装，持有 semaphore/command buffer 的 submit info 内存
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBufferSubmitInfo<'static>>,
    wait_semaphores: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signal_semaphores: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

impl GfxSubmitInfo {
    pub fn new(cmds: &[GfxCommandBuffer]) -> Self {
        Self {
            command_buffers: cmds
                .iter()
                .map(|c| vk::CommandBufferSubmitInfo::default().command_buffer(c.handle()))
                .collect_vec(),
            wait_semaphores: Vec::new(),
            signal_semaphores: Vec::new(),
        }
    }

    pub fn wait(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.wait_semaphores
            .push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore.handle()).stage_mask(stage));
        self
    }

    pub fn signal(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signal_semaphores
            .push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore.handle()).stage_mask(stage));
        self
    }

    /// 注意：返回值引用了 self 的内存，self 必须活到 queue submit 调用之后
    pub fn as_raw(&self) -> vk::SubmitInfo2<'_> {
        vk::SubmitInfo2::default()
            .command_buffer_infos(&self.command_buffers)
            .wait_semaphore_infos(&self.wait_semaphores)
            .signal_semaphore_infos(&self.signal_semaphores)
    }
}
