use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;
use vk_mem::{Alloc, Allocation};

use crate::{
    foundation::debug_messenger::DebugType,
    gfx::{Gfx, GfxAllocator},
};

/// Image 来源枚举
pub enum ImageSource {
    /// 由 VMA 分配的 Image
    Allocated(Allocation),
    /// 外部 Image（例如 Swapchain Image），不管理其内存生命周期
    External,
}

/// 独占所有权的 image 封装，move-only，析构恰好一次
pub struct GfxImage {
    handle: vk::Image,
    source: ImageSource,

    extent: vk::Extent3D,
    format: vk::Format,

    name: String,

    allocator: Option<Rc<GfxAllocator>>,
}

impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// getter
impl GfxImage {
    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

// new & init
impl GfxImage {
    pub fn new(gfx: &Gfx, image_info: &GfxImageCreateInfo, debug_name: &str) -> Self {
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (image, alloc) = unsafe {
            gfx.allocator
                .create_image(&image_info.as_info(), &alloc_ci)
                .unwrap_or_else(|e| panic!("failed to create image {}: {:?}", debug_name, e))
        };

        let image = Self {
            handle: image,
            source: ImageSource::Allocated(alloc),
            extent: image_info.inner.extent,
            format: image_info.inner.format,
            name: debug_name.to_string(),
            allocator: Some(gfx.allocator.clone()),
        };
        gfx.device.set_debug_name(&image, debug_name);
        image
    }

    /// 包装一个外部 image（例如 swapchain image），不管理内存
    pub fn from_external(gfx: &Gfx, image: vk::Image, extent: vk::Extent2D, format: vk::Format, name: &str) -> Self {
        let image = Self {
            handle: image,
            source: ImageSource::External,
            extent: extent.into(),
            format,
            name: name.to_string(),
            allocator: None,
        };
        gfx.device.set_debug_name(&image, name);
        image
    }
}

// destroy
impl GfxImage {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        log::debug!("destroying GfxImage: {}", self.name);

        match &mut self.source {
            ImageSource::External => (),
            ImageSource::Allocated(allocation) => unsafe {
                self.allocator.as_ref().unwrap().destroy_image(self.handle, allocation)
            },
        }
        self.handle = vk::Image::null();
    }
}

impl Drop for GfxImage {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxImage {} must be destroyed manually", self.name);
    }
}

pub struct GfxImageCreateInfo {
    inner: vk::ImageCreateInfo<'static>,
}

impl GfxImageCreateInfo {
    #[inline]
    pub fn new_image_2d_info(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            inner: vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: extent.into(),
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                // spec 上面说，这里只能是 UNDEFINED 或者 PREINITIALIZED
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            },
        }
    }

    #[inline]
    pub fn as_info(&self) -> vk::ImageCreateInfo<'_> {
        self.inner
    }
}
