use ash::vk;
use caelum_gfx::{
    cache::layout_cache::GfxDescriptorSetLayoutCache,
    descriptor::GfxDescriptorPool,
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};
use glam::Vec3;
use slotmap::SlotMap;

use crate::{
    atmosphere::{AtmosphereParams, DirectionalLight},
    layouts::{DirectionalLightUbo, LIGHT_UBO_OFFSET, PlanetUbo, SCENE_UBO_SIZE},
    lut::transmittance::TransmittanceLut,
};

slotmap::new_key_type! {
    /// 带 generation 的 scene 句柄
    ///
    /// SceneView 持有 key 而不是指针：scene 被移除后旧 key 查询得到 None，
    /// 不存在悬垂引用
    pub struct SceneKey;
}

/// 行星 + 方向光的全局 uniform 数据，以及由它们驱动的 transmittance LUT
///
/// setter 同步写入常驻映射的 uniform buffer；LUT 的重算由下一次渲染时的
/// 快照比较触发，这里不维护 dirty 标记
pub struct Scene {
    params: AtmosphereParams,
    planet_position: Vec3,
    sun: DirectionalLight,

    /// 行星块 @0，方向光块 @112，共 144 字节
    ubo: GfxBuffer,
    transmittance: TransmittanceLut,
}

// new & init
impl Scene {
    pub fn new(
        gfx: &Gfx,
        layout_cache: &GfxDescriptorSetLayoutCache,
        descriptor_pool: &GfxDescriptorPool,
        params: AtmosphereParams,
        name: &str,
    ) -> Self {
        let ubo = GfxBuffer::new_uniform_buffer(gfx, SCENE_UBO_SIZE as vk::DeviceSize, format!("{}-scene", name));
        let transmittance = TransmittanceLut::new(gfx, layout_cache, descriptor_pool, name);

        let scene = Self {
            params,
            planet_position: Vec3::ZERO,
            sun: DirectionalLight::DEFAULT_SUN,
            ubo,
            transmittance,
        };
        scene.write_planet_block();
        scene.write_light_block();
        scene
    }
}

// getter
impl Scene {
    #[inline]
    pub fn params(&self) -> &AtmosphereParams {
        &self.params
    }

    #[inline]
    pub fn sun(&self) -> &DirectionalLight {
        &self.sun
    }

    #[inline]
    pub fn planet_position(&self) -> Vec3 {
        self.planet_position
    }

    #[inline]
    pub fn ubo(&self) -> &GfxBuffer {
        &self.ubo
    }

    #[inline]
    pub fn transmittance(&self) -> &TransmittanceLut {
        &self.transmittance
    }

    #[inline]
    pub fn transmittance_mut(&mut self) -> &mut TransmittanceLut {
        &mut self.transmittance
    }
}

// setter
impl Scene {
    pub fn set_atmosphere(&mut self, params: AtmosphereParams) {
        self.params = params;
        self.write_planet_block();
    }

    pub fn set_planet_position(&mut self, position: Vec3) {
        self.planet_position = position;
        self.write_planet_block();
    }

    pub fn set_sun_direction(&mut self, direction: Vec3) {
        self.sun.direction = direction.normalize();
        self.write_light_block();
    }

    pub fn set_sun_irradiance(&mut self, irradiance: Vec3) {
        self.sun.irradiance = irradiance;
        self.write_light_block();
    }
}

// tools
impl Scene {
    fn write_planet_block(&self) {
        let planet = PlanetUbo::pack(self.planet_position, &self.params);
        self.ubo.write_bytes(0, bytemuck::bytes_of(&planet));
        self.ubo.flush(0, size_of::<PlanetUbo>() as vk::DeviceSize);
    }

    fn write_light_block(&self) {
        let light = DirectionalLightUbo::pack(&self.sun);
        self.ubo.write_bytes(LIGHT_UBO_OFFSET, bytemuck::bytes_of(&light));
        self.ubo.flush(LIGHT_UBO_OFFSET as vk::DeviceSize, size_of::<DirectionalLightUbo>() as vk::DeviceSize);
    }
}

// destroy
impl Scene {
    pub fn destroy(self) {
        self.transmittance.destroy();
        self.ubo.destroy();
    }
}

/// scene 的 arena
///
/// 多个 SceneView 可以引用同一个 scene；移除后已发出的 key 自动失效
#[derive(Default)]
pub struct SceneArena {
    scenes: SlotMap<SceneKey, Scene>,
}

impl SceneArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scene: Scene) -> SceneKey {
        self.scenes.insert(scene)
    }

    /// 移除并销毁；key 无效时为 no-op
    pub fn remove(&mut self, key: SceneKey) {
        if let Some(scene) = self.scenes.remove(key) {
            scene.destroy();
        }
    }

    #[inline]
    pub fn get(&self, key: SceneKey) -> Option<&Scene> {
        self.scenes.get(key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: SceneKey) -> Option<&mut Scene> {
        self.scenes.get_mut(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn destroy(mut self) {
        for (_, scene) in self.scenes.drain() {
            scene.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::SceneKey;

    /// 移除后旧 key 失效，即使槽位被新 scene 复用也不会串
    #[test]
    fn test_scene_key_generation_check() {
        let mut arena: SlotMap<SceneKey, u32> = SlotMap::with_key();

        let key_a = arena.insert(1);
        arena.remove(key_a);
        let key_b = arena.insert(2);

        assert!(arena.get(key_a).is_none());
        assert_eq!(arena.get(key_b), Some(&2));
        assert_ne!(key_a, key_b);
    }
}
