use std::rc::Rc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use caelum_gfx::{
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, semaphore::GfxSemaphore},
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};

use crate::settings::{FifLabel, FrameBudget};

/// 合成 quad 的顶点：NDC 位置 + uv + bindless 纹理槽位
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct QuadVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    pub slot: u32,
    pub _padding: u32,
}

const VERTEX_REGION_SIZE: usize = FrameBudget::VERTICES * size_of::<QuadVertex>();
const INDEX_REGION_SIZE: usize = FrameBudget::INDICES * size_of::<u32>();
const STAGING_SIZE: usize = VERTEX_REGION_SIZE + INDEX_REGION_SIZE;

/// 一个 quad 在 staging buffer 中的落点，draw_indexed 直接用它的两个 first
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadAlloc {
    pub first_vertex: u32,
    pub first_index: u32,
}

/// 每帧 staging 分配的游标，上限固定
///
/// 超出上限是配置/编程错误，在越界的那一次调用处 panic，不会动态增长
#[derive(Default, Debug)]
pub struct FrameScratch {
    vertex_count: usize,
    index_count: usize,
    texture_slot_count: usize,
}

impl FrameScratch {
    pub fn reset(&mut self) {
        self.vertex_count = 0;
        self.index_count = 0;
        self.texture_slot_count = 0;
    }

    /// 预留 4 顶点 + 6 索引
    pub fn alloc_quad(&mut self) -> QuadAlloc {
        assert!(
            self.vertex_count + 4 <= FrameBudget::VERTICES,
            "frame vertex budget exceeded: {} + 4 > {}",
            self.vertex_count,
            FrameBudget::VERTICES
        );
        assert!(
            self.index_count + 6 <= FrameBudget::INDICES,
            "frame index budget exceeded: {} + 6 > {}",
            self.index_count,
            FrameBudget::INDICES
        );

        let alloc = QuadAlloc {
            first_vertex: self.vertex_count as u32,
            first_index: self.index_count as u32,
        };
        self.vertex_count += 4;
        self.index_count += 6;
        alloc
    }

    /// 预留 bindless 纹理数组中的一个槽位
    pub fn alloc_texture_slot(&mut self) -> u32 {
        assert!(
            self.texture_slot_count < FrameBudget::TEXTURE_SLOTS,
            "frame texture slot budget exceeded: {} slots",
            FrameBudget::TEXTURE_SLOTS
        );

        let slot = self.texture_slot_count as u32;
        self.texture_slot_count += 1;
        slot
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.index_count
    }

    #[inline]
    pub fn texture_slot_count(&self) -> usize {
        self.texture_slot_count
    }
}

/// 帧环中的一个槽位
///
/// graphics/compute 各有一个 command pool，录制都是 one-time 的，
/// 槽位复用时整个 pool reset。staging buffer 常驻映射，按游标写入。
pub struct Frame {
    label: FifLabel,

    graphics_pool: Rc<GfxCommandPool>,
    graphics_cmd: GfxCommandBuffer,
    compute_pool: Rc<GfxCommandPool>,
    compute_cmd: GfxCommandBuffer,

    /// swapchain image 可用时 signal
    image_acquired_semaphore: GfxSemaphore,
    /// 本帧 graphics 提交完成时 signal，present 等它
    submit_semaphore: GfxSemaphore,
    /// 本帧 compute 提交完成时 signal，本帧 graphics 提交等它
    compute_finished_semaphore: GfxSemaphore,
    /// 本帧 graphics 提交完成时 signal，下一帧的 compute 提交等它
    graphics_finished_semaphore: GfxSemaphore,
    /// 本帧 graphics 提交回收的 fence，创建时即 signaled
    fence: GfxFence,
    /// 本帧 compute 提交回收的 fence，创建时即 signaled
    compute_fence: GfxFence,

    staging: GfxBuffer,
    scratch: FrameScratch,
}

// new & init
impl Frame {
    pub fn new(gfx: &Gfx, label: FifLabel) -> Self {
        let graphics_pool = Rc::new(GfxCommandPool::new(
            gfx.device.clone(),
            gfx.graphics_queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            &format!("frame-{}-graphics", label),
        ));
        let compute_pool = Rc::new(GfxCommandPool::new(
            gfx.device.clone(),
            gfx.compute_queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            &format!("frame-{}-compute", label),
        ));

        let graphics_cmd = GfxCommandBuffer::new(gfx.device.clone(), graphics_pool.clone(), &format!("frame-{}-graphics", label));
        let compute_cmd = GfxCommandBuffer::new(gfx.device.clone(), compute_pool.clone(), &format!("frame-{}-compute", label));

        Self {
            label,
            graphics_pool,
            graphics_cmd,
            compute_pool,
            compute_cmd,
            image_acquired_semaphore: GfxSemaphore::new(gfx.device.clone(), &format!("frame-{}-image-acquired", label)),
            submit_semaphore: GfxSemaphore::new(gfx.device.clone(), &format!("frame-{}-submit", label)),
            compute_finished_semaphore: GfxSemaphore::new(gfx.device.clone(), &format!("frame-{}-compute-finished", label)),
            graphics_finished_semaphore: GfxSemaphore::new(gfx.device.clone(), &format!("frame-{}-graphics-finished", label)),
            fence: GfxFence::new(gfx.device.clone(), true, &format!("frame-{}", label)),
            compute_fence: GfxFence::new(gfx.device.clone(), true, &format!("frame-{}-compute", label)),
            staging: GfxBuffer::new_geometry_stream_buffer(gfx, STAGING_SIZE as vk::DeviceSize, format!("frame-{}-staging", label)),
            scratch: FrameScratch::default(),
        }
    }
}

// getter
impl Frame {
    #[inline]
    pub fn label(&self) -> FifLabel {
        self.label
    }

    #[inline]
    pub fn graphics_cmd(&self) -> &GfxCommandBuffer {
        &self.graphics_cmd
    }

    #[inline]
    pub fn compute_cmd(&self) -> &GfxCommandBuffer {
        &self.compute_cmd
    }

    #[inline]
    pub fn image_acquired_semaphore(&self) -> &GfxSemaphore {
        &self.image_acquired_semaphore
    }

    #[inline]
    pub fn submit_semaphore(&self) -> &GfxSemaphore {
        &self.submit_semaphore
    }

    #[inline]
    pub fn compute_finished_semaphore(&self) -> &GfxSemaphore {
        &self.compute_finished_semaphore
    }

    #[inline]
    pub fn graphics_finished_semaphore(&self) -> &GfxSemaphore {
        &self.graphics_finished_semaphore
    }

    #[inline]
    pub fn fence(&self) -> &GfxFence {
        &self.fence
    }

    #[inline]
    pub fn compute_fence(&self) -> &GfxFence {
        &self.compute_fence
    }

    #[inline]
    pub fn staging_buffer(&self) -> vk::Buffer {
        self.staging.vk_buffer()
    }

    #[inline]
    pub fn index_region_offset(&self) -> vk::DeviceSize {
        VERTEX_REGION_SIZE as vk::DeviceSize
    }

    #[inline]
    pub fn scratch(&self) -> &FrameScratch {
        &self.scratch
    }

    #[inline]
    pub fn scratch_mut(&mut self) -> &mut FrameScratch {
        &mut self.scratch
    }
}

// phase methods
impl Frame {
    /// 阻塞等待本槽位上一次的 GPU 工作完全退役，然后复位以供重新录制
    ///
    /// graphics/compute 两个提交各有一个 fence，都等到才能 reset pool；
    /// fence 等待也是 semaphore 复用安全的前提：等到之后，
    /// 本槽位的 semaphore 的上一次 wait 必然已被满足
    pub fn begin(&mut self) {
        self.fence.wait();
        self.fence.reset();
        self.compute_fence.wait();
        self.compute_fence.reset();

        self.graphics_pool.reset_all_buffers();
        self.compute_pool.reset_all_buffers();

        self.scratch.reset();
    }

    /// 写入一个 quad 的 4 顶点 + 6 索引
    pub fn push_quad(&mut self, vertices: &[QuadVertex; 4]) -> QuadAlloc {
        let alloc = self.scratch.alloc_quad();

        let vertex_offset = alloc.first_vertex as usize * size_of::<QuadVertex>();
        self.staging.write_bytes(vertex_offset, bytemuck::cast_slice(vertices));

        // quad 内的索引固定，base vertex 由 draw_indexed 的 vertex_offset 提供
        let indices: [u32; 6] = [0, 1, 2, 2, 1, 3];
        let index_offset = VERTEX_REGION_SIZE + alloc.first_index as usize * size_of::<u32>();
        self.staging.write_bytes(index_offset, bytemuck::cast_slice(&indices));

        alloc
    }

    /// flush 本帧写过的 staging 范围，提交前调用
    pub fn flush_staging(&self) {
        let vertex_bytes = self.scratch.vertex_count * size_of::<QuadVertex>();
        let index_bytes = self.scratch.index_count * size_of::<u32>();

        if vertex_bytes > 0 {
            self.staging.flush(0, vertex_bytes as vk::DeviceSize);
        }
        if index_bytes > 0 {
            self.staging.flush(VERTEX_REGION_SIZE as vk::DeviceSize, index_bytes as vk::DeviceSize);
        }
    }
}

// destroy
impl Frame {
    pub fn destroy(self) {
        self.graphics_cmd.free();
        self.compute_cmd.free();
        Rc::try_unwrap(self.graphics_pool).ok().unwrap().destroy();
        Rc::try_unwrap(self.compute_pool).ok().unwrap().destroy();
        self.image_acquired_semaphore.destroy();
        self.submit_semaphore.destroy();
        self.compute_finished_semaphore.destroy();
        self.graphics_finished_semaphore.destroy();
        self.fence.destroy();
        self.compute_fence.destroy();
        self.staging.destroy();
    }
}

/// N 帧并行的帧环
pub struct FrameRing {
    frames: Vec<Frame>,
    label: FifLabel,
}

// new & init
impl FrameRing {
    pub fn new(gfx: &Gfx) -> Self {
        let frames = (0..FifLabel::FRAMES_IN_FLIGHT).map(|idx| Frame::new(gfx, FifLabel::from_usize(idx))).collect();
        Self {
            // 第一次 begin_frame 推进后从 A 开始
            label: FifLabel::from_usize(FifLabel::FRAMES_IN_FLIGHT - 1),
            frames,
        }
    }
}

// getter
impl FrameRing {
    #[inline]
    pub fn current_label(&self) -> FifLabel {
        self.label
    }

    #[inline]
    pub fn current_frame(&self) -> &Frame {
        &self.frames[*self.label]
    }

    #[inline]
    pub fn current_frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[*self.label]
    }
}

// phase methods
impl FrameRing {
    /// 推进到下一个槽位并复位它，阻塞直到该槽位上一次的 GPU 工作退役
    pub fn begin_frame(&mut self) {
        self.label.next_frame();
        self.frames[*self.label].begin();
    }
}

// destroy
impl FrameRing {
    pub fn destroy(self) {
        for frame in self.frames {
            frame.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 正好用满预算不报错
    #[test]
    fn test_scratch_exact_budget() {
        let mut scratch = FrameScratch::default();
        for i in 0..FrameBudget::TEXTURE_SLOTS {
            let alloc = scratch.alloc_quad();
            assert_eq!(alloc.first_vertex as usize, i * 4);
            assert_eq!(alloc.first_index as usize, i * 6);
            assert_eq!(scratch.alloc_texture_slot(), i as u32);
        }
        assert_eq!(scratch.vertex_count(), FrameBudget::VERTICES);
        assert_eq!(scratch.index_count(), FrameBudget::INDICES);
    }

    /// 超出预算的恰好那一次调用 panic
    #[test]
    #[should_panic(expected = "vertex budget exceeded")]
    fn test_scratch_quad_budget_panics() {
        let mut scratch = FrameScratch::default();
        for _ in 0..FrameBudget::TEXTURE_SLOTS {
            scratch.alloc_quad();
        }
        scratch.alloc_quad();
    }

    #[test]
    #[should_panic(expected = "texture slot budget exceeded")]
    fn test_scratch_texture_slot_budget_panics() {
        let mut scratch = FrameScratch::default();
        for _ in 0..FrameBudget::TEXTURE_SLOTS {
            scratch.alloc_texture_slot();
        }
        scratch.alloc_texture_slot();
    }

    /// reset 后游标归零，可再次用满
    #[test]
    fn test_scratch_reset() {
        let mut scratch = FrameScratch::default();
        for _ in 0..FrameBudget::TEXTURE_SLOTS {
            scratch.alloc_quad();
        }
        scratch.reset();
        assert_eq!(scratch.alloc_quad(), QuadAlloc { first_vertex: 0, first_index: 0 });
    }
}
