use ash::vk;
use itertools::Itertools;

pub struct GfxPhysicalDevice {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,

    pub graphics_queue_family: u32,
    pub compute_queue_family: u32,
}

// new & init
impl GfxPhysicalDevice {
    /// 优先选择独显；graphics 与 compute 可能来自不同的 queue family，
    /// 后续的 queue family ownership transfer 依赖这两个 index
    pub fn new_discrete_gpu(instance: &ash::Instance) -> Self {
        let pdevices = unsafe { instance.enumerate_physical_devices().unwrap() };
        assert!(!pdevices.is_empty(), "no vulkan physical device found");

        let pdevice = pdevices
            .iter()
            .copied()
            .find(|p| {
                let props = unsafe { instance.get_physical_device_properties(*p) };
                props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
            })
            .unwrap_or(pdevices[0]);

        let properties = unsafe { instance.get_physical_device_properties(pdevice) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };

        let graphics_queue_family = queue_families
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .expect("no graphics queue family") as u32;

        // 优先找一个独立的 compute queue family（不带 graphics），没有就和 graphics 共用
        let compute_queue_family = queue_families
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.queue_flags.contains(vk::QueueFlags::COMPUTE) && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .map(|(idx, _)| idx as u32)
            .next()
            .unwrap_or(graphics_queue_family);

        let device_name = properties.device_name_as_c_str().unwrap_or(c"<unknown>").to_string_lossy();
        log::info!(
            "physical device: {}, graphics family: {}, compute family: {}",
            device_name,
            graphics_queue_family,
            compute_queue_family
        );

        Self {
            handle: pdevice,
            properties,
            graphics_queue_family,
            compute_queue_family,
        }
    }
}

// getter
impl GfxPhysicalDevice {
    /// graphics 与 compute 是否处于不同的 queue family
    #[inline]
    pub fn has_dedicated_compute(&self) -> bool {
        self.graphics_queue_family != self.compute_queue_family
    }

    /// device 创建所需的 queue create info；family 相同时只能有一条
    pub fn queue_create_infos(&self) -> Vec<vk::DeviceQueueCreateInfo<'static>> {
        const PRIORITY: [f32; 1] = [1.0];
        [self.graphics_queue_family, self.compute_queue_family]
            .iter()
            .unique()
            .map(|family| {
                vk::DeviceQueueCreateInfo {
                    queue_family_index: *family,
                    queue_count: 1,
                    p_queue_priorities: PRIORITY.as_ptr(),
                    ..Default::default()
                }
            })
            .collect_vec()
    }
}
