use std::{ptr, rc::Rc};

use ash::vk;
use vk_mem::Alloc;

use crate::{
    foundation::debug_messenger::DebugType,
    gfx::{Gfx, GfxAllocator},
};

/// 独占所有权的 buffer 封装：恰好持有一个 allocation 和一个 vk::Buffer
///
/// move-only；析构时释放一次，被 move 走之后原值不再做任何操作
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,

    debug_name: String,

    allocator: Rc<GfxAllocator>,
}

impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxBuffer {
    fn drop(&mut self) {
        if self.handle == vk::Buffer::null() {
            return;
        }
        unsafe {
            if self.map_ptr.is_some() {
                self.allocator.unmap_memory(&mut self.allocation);
            }
            self.allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}

// new & init
impl GfxBuffer {
    /// - mem_map: 创建时就持久映射，之后通过 mapped_ptr 写入
    /// - 优先使用 device memory
    pub fn new(
        gfx: &Gfx,
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> Self {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let (buffer, mut alloc) = unsafe {
            gfx.allocator
                .create_buffer(&buffer_ci, &alloc_ci)
                .unwrap_or_else(|e| panic!("failed to create buffer {}: {:?}", name.as_ref(), e))
        };

        let mut mapped_ptr = None;
        if mem_map {
            unsafe {
                mapped_ptr = Some(gfx.allocator.map_memory(&mut alloc).unwrap());
            }
        }

        gfx.device.set_object_debug_name(buffer, format!("Buffer::{}", name.as_ref()));
        Self {
            handle: buffer,
            allocation: alloc,
            size: buffer_size,
            map_ptr: mapped_ptr,
            debug_name: name.as_ref().to_string(),
            allocator: gfx.allocator.clone(),
        }
    }

    #[inline]
    pub fn new_uniform_buffer(gfx: &Gfx, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> Self {
        Self::new(gfx, size, vk::BufferUsageFlags::UNIFORM_BUFFER, true, debug_name)
    }

    /// 常驻映射、直接作为顶点/索引数据源绑定的 buffer，不经过 GPU copy
    #[inline]
    pub fn new_geometry_stream_buffer(gfx: &Gfx, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> Self {
        Self::new(
            gfx,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
            true,
            debug_name,
        )
    }
}

// destroy
impl GfxBuffer {
    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}

// getter
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

// tools
impl GfxBuffer {
    #[inline]
    pub fn mapped_ptr(&self) -> *mut u8 {
        self.map_ptr.expect("buffer is not mapped, create it with mem_map = true")
    }

    #[inline]
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) {
        self.allocator.flush_allocation(&self.allocation, offset, size).unwrap();
    }

    /// 通过 mem map 的方式将 data 写入 buffer 指定 offset 处，不做 flush
    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.size as usize);
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.mapped_ptr().add(offset), data.len());
        }
    }

    /// 通过 mem map 的方式将 data 传入到 buffer 中，并 flush
    pub fn transfer_data_by_mmap<T>(&self, data: &[T])
    where
        T: Sized + Copy,
    {
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr() as *const u8, self.mapped_ptr(), size_of_val(data));
        }
        self.flush(0, size_of_val(data) as vk::DeviceSize);
    }
}
