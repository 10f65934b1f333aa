use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::GfxDebugMessenger;

pub struct GfxInstance {
    pub handle: ash::Instance,
}

// new & init
impl GfxInstance {
    pub fn new(entry: &ash::Entry, app_name: &str, engine_name: &str, extra_exts: Vec<&'static CStr>) -> Self {
        let app_name = std::ffi::CString::new(app_name).unwrap();
        let engine_name = std::ffi::CString::new(engine_name).unwrap();
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name.as_c_str())
            .engine_name(engine_name.as_c_str())
            .api_version(vk::API_VERSION_1_3);

        let mut exts = extra_exts;
        exts.push(ash::ext::debug_utils::NAME);

        let ext_ptrs = exts.iter().map(|e| e.as_ptr()).collect_vec();
        log::info!("instance exts: {:?}", exts);

        // validation layer 只在 debug 下开启
        let layers: Vec<*const std::os::raw::c_char> = if cfg!(debug_assertions) {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let mut debug_ci = GfxDebugMessenger::debug_messenger_ci();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&ext_ptrs)
            .enabled_layer_names(&layers)
            .push_next(&mut debug_ci);

        let handle = unsafe { entry.create_instance(&instance_ci, None).expect("failed to create vk instance") };

        Self { handle }
    }

    pub fn destroy(self) {
        unsafe {
            self.handle.destroy_instance(None);
        }
    }
}
