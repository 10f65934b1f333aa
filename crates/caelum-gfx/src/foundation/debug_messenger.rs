use std::ffi::CStr;

use ash::vk;

/// 可以设置 debug name 的 vk 对象类型
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

/// validation layer 的消息回调，转发到 log
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = unsafe { *p_callback_data };
    let msg = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[vulkan][{:?}] {}", message_type, msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[vulkan][{:?}] {}", message_type, msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("[vulkan][{:?}] {}", message_type, msg),
        _ => log::debug!("[vulkan][{:?}] {}", message_type, msg),
    }

    vk::FALSE
}

pub struct GfxDebugMessenger {
    debug_utils: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

// new & destroy
impl GfxDebugMessenger {
    pub fn debug_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
    }

    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> Self {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger =
            unsafe { debug_utils.create_debug_utils_messenger(&Self::debug_messenger_ci(), None).unwrap() };

        Self { debug_utils, messenger }
    }

    pub fn destroy(self) {
        unsafe {
            self.debug_utils.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}
