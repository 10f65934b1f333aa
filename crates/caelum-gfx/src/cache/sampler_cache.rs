use ash::vk;

use crate::{
    cache::object_cache::ObjectCache,
    gfx::Gfx,
    resources::sampler::{GfxSampler, GfxSamplerDesc},
};

/// sampler 去重缓存
///
/// sampler 由 cache 持有，调用方只拿 handle；统一在 destroy 时释放
pub struct GfxSamplerCache {
    cache: ObjectCache<GfxSamplerDesc, GfxSampler>,
}

// new & destroy
impl GfxSamplerCache {
    pub fn new() -> Self {
        Self {
            cache: ObjectCache::new(),
        }
    }

    pub fn destroy(self) {
        for (_, sampler) in self.cache.drain() {
            sampler.destroy();
        }
    }
}

impl Default for GfxSamplerCache {
    fn default() -> Self {
        Self::new()
    }
}

// tools
impl GfxSamplerCache {
    /// 查找或创建 desc 对应的 sampler
    pub fn get_or_create(&self, gfx: &Gfx, desc: &GfxSamplerDesc) -> vk::Sampler {
        self.cache.get_or_create(
            desc,
            |desc| GfxSampler::new(gfx, desc, format!("cached-{:?}-{:?}", desc.mag_filter, desc.address_mode_u)),
            |sampler| sampler.handle(),
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
