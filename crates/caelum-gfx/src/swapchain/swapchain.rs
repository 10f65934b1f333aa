use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{queue::GfxQueue, semaphore::GfxSemaphore},
    gfx::Gfx,
    swapchain::{NeedsRecreate, surface::GfxSurface},
};

pub struct GfxSwapchain {
    surface: GfxSurface,
    handle: vk::SwapchainKHR,

    images: Vec<vk::Image>,
    image_index: usize,

    color_format: vk::Format,
    extent: vk::Extent2D,

    device: std::rc::Rc<crate::foundation::device::GfxDevice>,
}

// new & init
impl GfxSwapchain {
    pub fn new(
        gfx: &Gfx,
        surface: GfxSurface,
        present_mode: vk::PresentModeKHR,
        surface_format: vk::SurfaceFormatKHR,
        window_physical_extent: vk::Extent2D,
    ) -> Self {
        let surface_capabilities = surface.get_capabilities();

        // 确定 window 的 extent 尺寸
        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = Self::calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        log::info!(
            "create swapchain: surface extent {}x{}, window physical extent {}x{}, final extent {}x{}",
            surface_capabilities.current_extent.width,
            surface_capabilities.current_extent.height,
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height
        );

        let handle = Self::create_swapchain(gfx, &surface, surface_format.format, surface_format.color_space, extent, present_mode);
        let images = unsafe { gfx.device().swapchain().get_swapchain_images(handle).unwrap() };

        Self {
            surface,
            handle,
            images,
            image_index: 0,
            color_format: surface_format.format,
            extent,
            device: gfx.device.clone(),
        }
    }

    /// 重建 swapchain 以匹配新的 surface 尺寸
    ///
    /// 调用方必须保证旧 swapchain 上的 GPU 工作已全部完成
    pub fn recreate(self, gfx: &Gfx, window_physical_extent: vk::Extent2D, present_mode: vk::PresentModeKHR) -> Self {
        let Self { surface, handle, color_format, .. } = self;

        unsafe {
            gfx.device().swapchain().destroy_swapchain(handle, None);
        }

        Self::new(
            gfx,
            surface,
            present_mode,
            vk::SurfaceFormatKHR {
                format: color_format,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            window_physical_extent,
        )
    }

    fn create_swapchain(
        gfx: &Gfx,
        surface: &GfxSurface,
        format: vk::Format,
        color_space: vk::ColorSpaceKHR,
        extent: vk::Extent2D,
        present_mode: vk::PresentModeKHR,
    ) -> vk::SwapchainKHR {
        // 确定 image count
        // max_image_count == 0，表示不限制 image 数量
        let surface_capabilities = surface.get_capabilities();

        let image_count = if surface_capabilities.max_image_count == 0 {
            surface_capabilities.min_image_count + 1
        } else {
            u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(format)
            .image_color_space(color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true);

        unsafe {
            let handle = gfx.device().swapchain().create_swapchain(&create_info, None).unwrap();
            gfx.device().set_object_debug_name(handle, "main");
            handle
        }
    }
}

// getters
impl GfxSwapchain {
    #[inline]
    pub fn present_images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn current_image_index(&self) -> usize {
        self.image_index
    }

    #[inline]
    pub fn current_image(&self) -> vk::Image {
        self.images[self.image_index]
    }
}

// tools
impl GfxSwapchain {
    /// 确定 window 的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == 0xFFFFFFFF || surface_extent.height == 0xFFFFFFFF {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }
}

// update
impl GfxSwapchain {
    /// timeout: nano seconds
    ///
    /// OUT_OF_DATE 不是失败：返回 Err(NeedsRecreate)，由上层在安全点重建
    pub fn acquire_next_image(&mut self, semaphore: &GfxSemaphore, timeout: u64) -> Result<usize, NeedsRecreate> {
        let result = unsafe {
            self.device.swapchain().acquire_next_image(self.handle, timeout, semaphore.handle(), vk::Fence::null())
        };

        match result {
            Ok((image_index, is_suboptimal)) => {
                if is_suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                self.image_index = image_index as usize;
                Ok(self.image_index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                Err(NeedsRecreate)
            }
            Err(e) => {
                panic!("failed to acquire next swapchain image: {:?}", e);
            }
        }
    }

    pub fn present_image(&self, queue: &GfxQueue, wait_semaphores: &[GfxSemaphore]) -> Result<(), NeedsRecreate> {
        let wait_semaphores = wait_semaphores.iter().map(|s| s.handle()).collect_vec();
        let image_indices = [self.image_index as u32];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.handle));

        let result = unsafe { self.device.swapchain().queue_present(queue.handle(), &present_info) };
        match result {
            Ok(is_suboptimal) => {
                if is_suboptimal {
                    log::warn!("swapchain present image index {} is not optimal", self.image_index);
                    return Err(NeedsRecreate);
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when present image");
                Err(NeedsRecreate)
            }
            Err(e) => {
                panic!("failed to present swapchain image: {:?}", e);
            }
        }
    }
}

// destroy
impl GfxSwapchain {
    pub fn destroy(mut self) {
        unsafe {
            self.device.swapchain().destroy_swapchain(self.handle, None);
        }
        self.handle = vk::SwapchainKHR::null();
    }
}
