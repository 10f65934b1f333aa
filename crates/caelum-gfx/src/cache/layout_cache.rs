use std::rc::Rc;

use ash::vk;

use crate::{cache::object_cache::ObjectCache, foundation::device::GfxDevice};

/// descriptor set layout 中单个 binding 的结构化描述
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct GfxDescriptorBindingDesc {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
    pub binding_flags: vk::DescriptorBindingFlags,
}

/// descriptor set layout 的结构化描述，按内容比较/哈希
///
/// bindings 的顺序参与比较：调用方按 binding index 升序填写
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct GfxDescriptorSetLayoutDesc {
    pub flags: vk::DescriptorSetLayoutCreateFlags,
    pub bindings: Vec<GfxDescriptorBindingDesc>,
}

/// descriptor set layout 去重缓存
///
/// layout 由 cache 持有，调用方只拿 handle；统一在 destroy 时释放
pub struct GfxDescriptorSetLayoutCache {
    cache: ObjectCache<GfxDescriptorSetLayoutDesc, vk::DescriptorSetLayout>,

    device: Rc<GfxDevice>,
}

// new & destroy
impl GfxDescriptorSetLayoutCache {
    pub fn new(device: Rc<GfxDevice>) -> Self {
        Self {
            cache: ObjectCache::new(),
            device,
        }
    }

    pub fn destroy(self) {
        for (_, layout) in self.cache.drain() {
            unsafe {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}

// tools
impl GfxDescriptorSetLayoutCache {
    /// 查找或创建 desc 对应的 layout
    pub fn get_or_create(&self, desc: &GfxDescriptorSetLayoutDesc) -> vk::DescriptorSetLayout {
        self.cache.get_or_create(
            desc,
            |desc| {
                let vk_bindings = desc
                    .bindings
                    .iter()
                    .map(|b| {
                        vk::DescriptorSetLayoutBinding::default()
                            .binding(b.binding)
                            .descriptor_type(b.descriptor_type)
                            .descriptor_count(b.count)
                            .stage_flags(b.stages)
                    })
                    .collect::<Vec<_>>();
                let binding_flags = desc.bindings.iter().map(|b| b.binding_flags).collect::<Vec<_>>();

                let mut flags_ci = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
                let layout_ci = vk::DescriptorSetLayoutCreateInfo::default()
                    .flags(desc.flags)
                    .bindings(&vk_bindings)
                    .push_next(&mut flags_ci);

                unsafe { self.device.create_descriptor_set_layout(&layout_ci, None).unwrap() }
            },
            |layout| *layout,
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(index: u32, ty: vk::DescriptorType) -> GfxDescriptorBindingDesc {
        GfxDescriptorBindingDesc {
            binding: index,
            descriptor_type: ty,
            count: 1,
            stages: vk::ShaderStageFlags::COMPUTE,
            binding_flags: vk::DescriptorBindingFlags::empty(),
        }
    }

    /// 结构相同的 desc 相等且哈希一致，结构不同则不等
    #[test]
    fn test_layout_desc_structural_equality() {
        let a = GfxDescriptorSetLayoutDesc {
            flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            bindings: vec![
                binding(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
                binding(1, vk::DescriptorType::STORAGE_IMAGE),
            ],
        };
        let b = a.clone();
        assert_eq!(a, b);

        let mut c = a.clone();
        c.bindings[1].descriptor_type = vk::DescriptorType::UNIFORM_BUFFER;
        assert_ne!(a, c);

        let mut d = a.clone();
        d.bindings[1].count = 128;
        assert_ne!(a, d);

        let mut e = a;
        e.bindings[1].binding_flags = vk::DescriptorBindingFlags::PARTIALLY_BOUND;
        assert_ne!(e.bindings[1], binding(1, vk::DescriptorType::STORAGE_IMAGE));
    }
}
