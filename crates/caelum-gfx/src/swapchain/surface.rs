use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,

    pdevice: vk::PhysicalDevice,
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl GfxSurface {
    pub fn new(
        gfx: &Gfx,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> Self {
        let surface_pf = ash::khr::surface::Instance::new(&gfx.vk_pf, gfx.instance());

        let handle = unsafe {
            ash_window::create_surface(&gfx.vk_pf, gfx.instance(), raw_display_handle, raw_window_handle, None).unwrap()
        };

        let surface = GfxSurface {
            handle,
            pf: surface_pf,
            pdevice: gfx.physical_device().handle,
        };
        gfx.device().set_debug_name(&surface, "main");

        surface
    }
}

// getters
impl GfxSurface {
    pub fn get_capabilities(&self) -> vk::SurfaceCapabilitiesKHR {
        unsafe { self.pf.get_physical_device_surface_capabilities(self.pdevice, self.handle).unwrap() }
    }

    pub fn get_formats(&self) -> Vec<vk::SurfaceFormatKHR> {
        unsafe { self.pf.get_physical_device_surface_formats(self.pdevice, self.handle).unwrap() }
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

/// 当前窗口系统的 surface 所需的 instance 扩展
pub fn required_instance_extensions(
    raw_display_handle: raw_window_handle::RawDisplayHandle,
) -> Vec<&'static std::ffi::CStr> {
    ash_window::enumerate_required_extensions(raw_display_handle)
        .unwrap()
        .iter()
        .map(|ext| unsafe { std::ffi::CStr::from_ptr(*ext) })
        .collect()
}
