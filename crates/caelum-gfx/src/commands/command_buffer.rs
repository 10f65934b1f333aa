use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{barrier::GfxImageBarrier, command_pool::GfxCommandPool},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    resources::buffer::GfxBuffer,
};

/// # Destroy
/// command buffer 的资源随 pool reset/destroy 回收，可以 Clone
#[derive(Clone)]
pub struct GfxCommandBuffer {
    handle: vk::CommandBuffer,
    pool: vk::CommandPool,

    device: Rc<GfxDevice>,
}

impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// new & free
impl GfxCommandBuffer {
    pub fn new(device: Rc<GfxDevice>, pool: Rc<GfxCommandPool>, debug_name: &str) -> Self {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let handle = unsafe { device.allocate_command_buffers(&alloc_info).unwrap()[0] };

        let cmd = Self {
            handle,
            pool: pool.handle(),
            device: device.clone(),
        };
        device.set_debug_name(&cmd, debug_name);
        cmd
    }

    pub fn free(self) {
        unsafe {
            self.device.free_command_buffers(self.pool, std::slice::from_ref(&self.handle));
        }
    }
}

// getter
impl GfxCommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}

// 录制控制
impl GfxCommandBuffer {
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags) {
        unsafe {
            self.device
                .begin_command_buffer(self.handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
                .unwrap();
        }
    }

    #[inline]
    pub fn end(&self) {
        unsafe { self.device.end_command_buffer(self.handle).unwrap() }
    }
}

// 同步命令
impl GfxCommandBuffer {
    pub fn image_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        let raw_barriers = barriers.iter().map(|b| b.as_raw()).collect_vec();
        let dependency_info = vk::DependencyInfo::default()
            .dependency_flags(dependency_flags)
            .image_memory_barriers(&raw_barriers);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.handle, &dependency_info);
        }
    }
}

// transfer 类型的命令
impl GfxCommandBuffer {
    #[inline]
    pub fn cmd_copy_buffer(&self, src: &GfxBuffer, dst: &GfxBuffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device.cmd_copy_buffer(self.handle, src.vk_buffer(), dst.vk_buffer(), regions);
        }
    }
}

// compute 类型的命令
impl GfxCommandBuffer {
    #[inline]
    pub fn bind_compute_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::COMPUTE, pipeline);
        }
    }

    #[inline]
    pub fn bind_compute_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.handle,
                vk::PipelineBindPoint::COMPUTE,
                layout,
                first_set,
                sets,
                &[],
            );
        }
    }

    #[inline]
    pub fn dispatch(&self, group_count: glam::UVec3) {
        unsafe {
            self.device.cmd_dispatch(self.handle, group_count.x, group_count.y, group_count.z);
        }
    }
}

// graphics 类型的命令
impl GfxCommandBuffer {
    #[inline]
    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        unsafe {
            self.device.cmd_begin_rendering(self.handle, rendering_info);
        }
    }

    #[inline]
    pub fn end_rendering(&self) {
        unsafe {
            self.device.cmd_end_rendering(self.handle);
        }
    }

    #[inline]
    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    #[inline]
    pub fn bind_graphics_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.handle,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            );
        }
    }

    #[inline]
    pub fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(self.handle, first_binding, buffers, offsets);
        }
    }

    #[inline]
    pub fn bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe {
            self.device.cmd_bind_index_buffer(self.handle, buffer, offset, index_type);
        }
    }

    #[inline]
    pub fn set_viewport(&self, viewport: vk::Viewport) {
        unsafe {
            self.device.cmd_set_viewport(self.handle, 0, std::slice::from_ref(&viewport));
        }
    }

    #[inline]
    pub fn set_scissor(&self, scissor: vk::Rect2D) {
        unsafe {
            self.device.cmd_set_scissor(self.handle, 0, std::slice::from_ref(&scissor));
        }
    }

    #[inline]
    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw(self.handle, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    #[inline]
    pub fn draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            self.device.cmd_draw_indexed(self.handle, index_count, 1, first_index, vertex_offset, 0);
        }
    }
}

// push constant
impl GfxCommandBuffer {
    #[inline]
    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(self.handle, layout, stages, offset, data);
        }
    }
}
