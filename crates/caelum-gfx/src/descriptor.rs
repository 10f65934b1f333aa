use std::rc::Rc;

use ash::vk;

use crate::{
    cache::layout_cache::{GfxDescriptorSetLayoutCache, GfxDescriptorSetLayoutDesc},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    gfx::Gfx,
};

/// 将 descriptor set layout 的 bindings 抽象为一个 trait，通过类型系统来保证 bindings 的正确性
///
/// bindings 以结构化描述给出，因此同构的 layout 会经由 layout cache 得到同一个 handle
pub trait DescriptorBindings {
    fn layout_desc() -> GfxDescriptorSetLayoutDesc;
}

/// 类型化的 descriptor set layout
///
/// 注：为什么要使用 <T>
/// 这样每种 bindings struct 都对应一个独立的 layout 类型，绑定错 set 会在编译期暴露
pub struct GfxDescriptorSetLayout<T>
where
    T: DescriptorBindings,
{
    layout: vk::DescriptorSetLayout,
    phantom_data: std::marker::PhantomData<T>,
}

impl<T> GfxDescriptorSetLayout<T>
where
    T: DescriptorBindings,
{
    /// layout 实际来自 cache：同构的 T 共享同一个 vk handle
    pub fn new(layout_cache: &GfxDescriptorSetLayoutCache) -> Self {
        Self {
            layout: layout_cache.get_or_create(&T::layout_desc()),
            phantom_data: std::marker::PhantomData,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

pub enum GfxDescriptorUpdateInfo {
    Image(vk::DescriptorImageInfo),
    Buffer(vk::DescriptorBufferInfo),
}

pub struct GfxDescriptorSet<T>
where
    T: DescriptorBindings,
{
    descriptor_set: vk::DescriptorSet,

    device: Rc<GfxDevice>,
    phantom_data: std::marker::PhantomData<T>,
}

impl<T> DebugType for GfxDescriptorSet<T>
where
    T: DescriptorBindings,
{
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSet"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.descriptor_set
    }
}

impl<T> GfxDescriptorSet<T>
where
    T: DescriptorBindings,
{
    pub fn new(gfx: &Gfx, pool: &GfxDescriptorPool, layout: &GfxDescriptorSetLayout<T>, debug_name: &str) -> Self {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default() //
            .descriptor_pool(pool.handle())
            .set_layouts(&layouts);

        let descriptor_set = unsafe { gfx.device.allocate_descriptor_sets(&alloc_info).unwrap()[0] };

        let set = Self {
            descriptor_set,
            device: gfx.device.clone(),
            phantom_data: std::marker::PhantomData,
        };
        gfx.device.set_debug_name(&set, debug_name);
        set
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// 按 (binding, array element, info) 批量写 descriptor
    pub fn write(&self, writes: &[(u32, u32, GfxDescriptorUpdateInfo)]) {
        // 先把 info 收进数组：vk write 持有的是指向它们的指针，
        // 构建 write 期间数组不能再增长
        let (image_infos, buffer_infos) = collect_update_infos(writes);
        let vk_writes = build_vk_writes(self.descriptor_set, &T::layout_desc(), writes, &image_infos, &buffer_infos);

        unsafe {
            self.device.update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

/// 按 info 的种类分别收集成定长数组，供 vk write 按序取用
fn collect_update_infos(
    writes: &[(u32, u32, GfxDescriptorUpdateInfo)],
) -> (Vec<[vk::DescriptorImageInfo; 1]>, Vec<[vk::DescriptorBufferInfo; 1]>) {
    let image_infos = writes
        .iter()
        .filter_map(|(_, _, info)| match info {
            GfxDescriptorUpdateInfo::Image(image_info) => Some([*image_info]),
            GfxDescriptorUpdateInfo::Buffer(_) => None,
        })
        .collect();
    let buffer_infos = writes
        .iter()
        .filter_map(|(_, _, info)| match info {
            GfxDescriptorUpdateInfo::Buffer(buffer_info) => Some([*buffer_info]),
            GfxDescriptorUpdateInfo::Image(_) => None,
        })
        .collect();
    (image_infos, buffer_infos)
}

/// 把结构化的 writes 展开成 vk::WriteDescriptorSet 数组
///
/// image/buffer info 由调用方收集好并保持存活，这里只按序引用，不拷贝
fn build_vk_writes<'a>(
    dst_set: vk::DescriptorSet,
    desc: &GfxDescriptorSetLayoutDesc,
    writes: &[(u32, u32, GfxDescriptorUpdateInfo)],
    image_infos: &'a [[vk::DescriptorImageInfo; 1]],
    buffer_infos: &'a [[vk::DescriptorBufferInfo; 1]],
) -> Vec<vk::WriteDescriptorSet<'a>> {
    let mut image_iter = image_infos.iter();
    let mut buffer_iter = buffer_infos.iter();

    writes
        .iter()
        .map(|(binding, array_element, info)| {
            let binding_desc = desc
                .bindings
                .iter()
                .find(|b| b.binding == *binding)
                .unwrap_or_else(|| panic!("descriptor write to undeclared binding {}", binding));

            let write = vk::WriteDescriptorSet::default()
                .dst_set(dst_set)
                .dst_binding(*binding)
                .dst_array_element(*array_element)
                .descriptor_type(binding_desc.descriptor_type);

            match info {
                GfxDescriptorUpdateInfo::Image(_) => write.image_info(image_iter.next().unwrap()),
                GfxDescriptorUpdateInfo::Buffer(_) => write.buffer_info(buffer_iter.next().unwrap()),
            }
        })
        .collect()
}

pub struct GfxDescriptorPool {
    handle: vk::DescriptorPool,

    device: Rc<GfxDevice>,
}

impl DebugType for GfxDescriptorPool {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorPool"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// new & destroy
impl GfxDescriptorPool {
    pub fn new(
        gfx: &Gfx,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        name: &str,
    ) -> Self {
        let pool_ci = vk::DescriptorPoolCreateInfo::default() //
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let handle = unsafe { gfx.device.create_descriptor_pool(&pool_ci, None).unwrap() };

        let pool = Self { handle, device: gfx.device.clone() };
        gfx.device.set_debug_name(&pool, name);
        pool
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.handle, None);
        }
    }
}

// getter
impl GfxDescriptorPool {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::layout_cache::GfxDescriptorBindingDesc;

    fn test_layout_desc() -> GfxDescriptorSetLayoutDesc {
        GfxDescriptorSetLayoutDesc {
            flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            bindings: vec![
                GfxDescriptorBindingDesc {
                    binding: 0,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    count: 1,
                    stages: vk::ShaderStageFlags::COMPUTE,
                    binding_flags: vk::DescriptorBindingFlags::empty(),
                },
                GfxDescriptorBindingDesc {
                    binding: 1,
                    descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    count: 4,
                    stages: vk::ShaderStageFlags::FRAGMENT,
                    binding_flags: vk::DescriptorBindingFlags::empty(),
                },
            ],
        }
    }

    /// 混合 image/buffer 的批量写：每个 write 都指向自己那份 info，
    /// 且 info 收集完成后地址保持稳定
    #[test]
    fn test_write_infos_stay_pinned() {
        let writes = vec![
            (
                1u32,
                0u32,
                GfxDescriptorUpdateInfo::Image(vk::DescriptorImageInfo::default().image_layout(vk::ImageLayout::GENERAL)),
            ),
            (0, 0, GfxDescriptorUpdateInfo::Buffer(vk::DescriptorBufferInfo::default().range(64))),
            (
                1,
                3,
                GfxDescriptorUpdateInfo::Image(
                    vk::DescriptorImageInfo::default().image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                ),
            ),
        ];

        let (image_infos, buffer_infos) = collect_update_infos(&writes);
        assert_eq!(image_infos.len(), 2);
        assert_eq!(buffer_infos.len(), 1);

        let vk_writes = build_vk_writes(vk::DescriptorSet::null(), &test_layout_desc(), &writes, &image_infos, &buffer_infos);
        assert_eq!(vk_writes.len(), 3);

        assert_eq!(vk_writes[0].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(vk_writes[0].descriptor_count, 1);
        assert_eq!(vk_writes[0].p_image_info, image_infos[0].as_ptr());

        assert_eq!(vk_writes[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(vk_writes[1].p_buffer_info, buffer_infos[0].as_ptr());

        assert_eq!(vk_writes[2].dst_array_element, 3);
        assert_eq!(vk_writes[2].p_image_info, image_infos[1].as_ptr());
    }

    /// 写到未声明的 binding 直接 panic
    #[test]
    #[should_panic(expected = "undeclared binding")]
    fn test_write_undeclared_binding_panics() {
        let writes = vec![(7u32, 0u32, GfxDescriptorUpdateInfo::Buffer(vk::DescriptorBufferInfo::default()))];
        let (image_infos, buffer_infos) = collect_update_infos(&writes);
        build_vk_writes(vk::DescriptorSet::null(), &test_layout_desc(), &writes, &image_infos, &buffer_infos);
    }
}
