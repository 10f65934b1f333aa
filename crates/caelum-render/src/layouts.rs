//! GPU 侧的字节布局
//!
//! 所有 push constant / uniform block 都以 Pod struct 表达，
//! 字段偏移与总大小由编译期断言钉死，必须和 shader 内的声明逐字节一致。

use std::mem::offset_of;

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::atmosphere::{AtmosphereParams, DirectionalLight};

/// transmittance LUT compute 的 push constant，36 字节
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct TransmittancePc {
    pub rayleigh_scattering: [f32; 3],
    pub mie_extinction: f32,
    pub ozone_absorption: [f32; 3],
    pub planet_radius: f32,
    pub atmosphere_radius: f32,
}

const _: () = assert!(size_of::<TransmittancePc>() == 36);
const _: () = assert!(offset_of!(TransmittancePc, mie_extinction) == 12);
const _: () = assert!(offset_of!(TransmittancePc, ozone_absorption) == 16);
const _: () = assert!(offset_of!(TransmittancePc, planet_radius) == 28);
const _: () = assert!(offset_of!(TransmittancePc, atmosphere_radius) == 32);

impl TransmittancePc {
    pub fn pack(params: &AtmosphereParams) -> Self {
        Self {
            rayleigh_scattering: params.rayleigh_scattering.to_array(),
            mie_extinction: params.mie_extinction(),
            ozone_absorption: params.ozone_absorption.to_array(),
            planet_radius: params.planet_radius,
            atmosphere_radius: params.atmosphere_radius,
        }
    }
}

/// sky-view LUT compute 的 push constant，96 字节（含 8 字节尾部 padding）
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct SkyViewPc {
    pub rayleigh_scattering: [f32; 3],
    pub mie_scattering: f32,
    pub ozone_absorption: [f32; 3],
    pub mie_absorption: f32,
    pub sun_irradiance: [f32; 3],
    pub planet_radius: f32,
    pub sun_direction: [f32; 3],
    pub atmosphere_radius: f32,
    pub rayleigh_scale_height: f32,
    pub mie_scale_height: f32,
    pub mie_g: f32,
    pub ozone_layer_height: f32,
    pub ozone_layer_thickness: f32,
    pub camera_height: f32,
    pub _padding: [u32; 2],
}

const _: () = assert!(size_of::<SkyViewPc>() == 96);
const _: () = assert!(offset_of!(SkyViewPc, mie_scattering) == 12);
const _: () = assert!(offset_of!(SkyViewPc, ozone_absorption) == 16);
const _: () = assert!(offset_of!(SkyViewPc, mie_absorption) == 28);
const _: () = assert!(offset_of!(SkyViewPc, sun_irradiance) == 32);
const _: () = assert!(offset_of!(SkyViewPc, planet_radius) == 44);
const _: () = assert!(offset_of!(SkyViewPc, sun_direction) == 48);
const _: () = assert!(offset_of!(SkyViewPc, atmosphere_radius) == 60);
const _: () = assert!(offset_of!(SkyViewPc, rayleigh_scale_height) == 64);
const _: () = assert!(offset_of!(SkyViewPc, mie_scale_height) == 68);
const _: () = assert!(offset_of!(SkyViewPc, mie_g) == 72);
const _: () = assert!(offset_of!(SkyViewPc, ozone_layer_height) == 76);
const _: () = assert!(offset_of!(SkyViewPc, ozone_layer_thickness) == 80);
const _: () = assert!(offset_of!(SkyViewPc, camera_height) == 84);

impl SkyViewPc {
    pub fn pack(params: &AtmosphereParams, sun: &DirectionalLight, camera_height: f32) -> Self {
        Self {
            rayleigh_scattering: params.rayleigh_scattering.to_array(),
            mie_scattering: params.mie_scattering,
            ozone_absorption: params.ozone_absorption.to_array(),
            mie_absorption: params.mie_absorption,
            sun_irradiance: sun.irradiance.to_array(),
            planet_radius: params.planet_radius,
            sun_direction: sun.direction.to_array(),
            atmosphere_radius: params.atmosphere_radius,
            rayleigh_scale_height: params.rayleigh_scale_height,
            mie_scale_height: params.mie_scale_height,
            mie_g: params.mie_g,
            ozone_layer_height: params.ozone_layer_height,
            ozone_layer_thickness: params.ozone_layer_thickness,
            camera_height,
            _padding: [0; 2],
        }
    }
}

/// LUT 合成 draw 的 push constant，80 字节
///
/// frustum corner 的顺序：左下、右下、左上、右上（NDC 四角的世界空间方向）
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct CompositePc {
    pub frustum_corners: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    /// 每个呈现帧自增一次，用于抖动
    pub seed: u32,
}

const _: () = assert!(size_of::<CompositePc>() == 80);
const _: () = assert!(offset_of!(CompositePc, camera_pos) == 64);
const _: () = assert!(offset_of!(CompositePc, seed) == 76);

impl CompositePc {
    pub fn pack(frustum_corners: [Vec4; 4], camera_pos: Vec3, seed: u32) -> Self {
        Self {
            frustum_corners: frustum_corners.map(|c| c.to_array()),
            camera_pos: camera_pos.to_array(),
            seed,
        }
    }
}

/// 全散射 draw（不经 LUT 的 ray march 变体）的 push constant，112 字节
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct FullScatteringPc {
    pub frustum_corners: [[f32; 4]; 4],
    pub eye_pos: [f32; 3],
    pub sun_radiance: [f32; 3],
    pub sun_direction: [f32; 3],
    pub mie_g: f32,
    pub planet_radius: f32,
    pub atmosphere_radius: f32,
}

const _: () = assert!(size_of::<FullScatteringPc>() == 112);
const _: () = assert!(offset_of!(FullScatteringPc, eye_pos) == 64);
const _: () = assert!(offset_of!(FullScatteringPc, sun_radiance) == 76);
const _: () = assert!(offset_of!(FullScatteringPc, sun_direction) == 88);
const _: () = assert!(offset_of!(FullScatteringPc, mie_g) == 100);
const _: () = assert!(offset_of!(FullScatteringPc, planet_radius) == 104);
const _: () = assert!(offset_of!(FullScatteringPc, atmosphere_radius) == 108);

impl FullScatteringPc {
    pub fn pack(frustum_corners: [Vec4; 4], eye_pos: Vec3, params: &AtmosphereParams, sun: &DirectionalLight) -> Self {
        Self {
            frustum_corners: frustum_corners.map(|c| c.to_array()),
            eye_pos: eye_pos.to_array(),
            sun_radiance: sun.irradiance.to_array(),
            sun_direction: sun.direction.to_array(),
            mie_g: params.mie_g,
            planet_radius: params.planet_radius,
            atmosphere_radius: params.atmosphere_radius,
        }
    }
}

/// scene uniform buffer 中的行星块，100 字节
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct PlanetUbo {
    pub position: [f32; 3],
    pub ground_radius: f32,
    pub atmosphere_radius: f32,
    pub _padding0: [f32; 3],
    pub albedo: [f32; 3],
    pub mie_g: f32,
    pub rayleigh_scattering: [f32; 3],
    pub rayleigh_scale_height: f32,
    pub mie_scattering: f32,
    pub mie_absorption: f32,
    pub mie_scale_height: f32,
    pub ozone_absorption: [f32; 3],
    pub ozone_layer_height: f32,
    pub ozone_layer_thickness: f32,
    pub _padding1: f32,
}

const _: () = assert!(size_of::<PlanetUbo>() == 100);
const _: () = assert!(offset_of!(PlanetUbo, ground_radius) == 12);
const _: () = assert!(offset_of!(PlanetUbo, atmosphere_radius) == 16);
const _: () = assert!(offset_of!(PlanetUbo, albedo) == 32);
const _: () = assert!(offset_of!(PlanetUbo, rayleigh_scattering) == 48);
const _: () = assert!(offset_of!(PlanetUbo, ozone_layer_thickness) == 92);

impl PlanetUbo {
    pub fn pack(position: Vec3, params: &AtmosphereParams) -> Self {
        Self {
            position: position.to_array(),
            ground_radius: params.planet_radius,
            atmosphere_radius: params.atmosphere_radius,
            _padding0: [0.0; 3],
            albedo: params.ground_albedo.to_array(),
            mie_g: params.mie_g,
            rayleigh_scattering: params.rayleigh_scattering.to_array(),
            rayleigh_scale_height: params.rayleigh_scale_height,
            mie_scattering: params.mie_scattering,
            mie_absorption: params.mie_absorption,
            mie_scale_height: params.mie_scale_height,
            ozone_absorption: params.ozone_absorption.to_array(),
            ozone_layer_height: params.ozone_layer_height,
            ozone_layer_thickness: params.ozone_layer_thickness,
            _padding1: 0.0,
        }
    }
}

/// scene uniform buffer 中的方向光块，32 字节，写在 align(16, 100) = 112 处
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct DirectionalLightUbo {
    pub direction: [f32; 3],
    pub _padding0: f32,
    pub irradiance: [f32; 3],
    pub _padding1: f32,
}

const _: () = assert!(size_of::<DirectionalLightUbo>() == 32);
const _: () = assert!(offset_of!(DirectionalLightUbo, irradiance) == 16);

/// 方向光块在 scene uniform buffer 中的偏移：行星块之后按 16 对齐
pub const LIGHT_UBO_OFFSET: usize = size_of::<PlanetUbo>().next_multiple_of(16);
/// scene uniform buffer 的总大小
pub const SCENE_UBO_SIZE: usize = LIGHT_UBO_OFFSET + size_of::<DirectionalLightUbo>();

const _: () = assert!(LIGHT_UBO_OFFSET == 112);
const _: () = assert!(SCENE_UBO_SIZE == 144);

impl DirectionalLightUbo {
    pub fn pack(light: &DirectionalLight) -> Self {
        Self {
            direction: light.direction.to_array(),
            _padding0: 0.0,
            irradiance: light.irradiance.to_array(),
            _padding1: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atmosphere::{AtmosphereParams, DirectionalLight};

    /// 打包后的字节在文档偏移处逐位还原出原始 f32
    #[test]
    fn test_transmittance_pc_bytes() {
        let params = AtmosphereParams::EARTH;
        let pc = TransmittancePc::pack(&params);
        let bytes = bytemuck::bytes_of(&pc);

        assert_eq!(bytes.len(), 36);
        let read_f32 = |offset: usize| f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        assert_eq!(read_f32(0).to_bits(), params.rayleigh_scattering.x.to_bits());
        assert_eq!(read_f32(12).to_bits(), params.mie_extinction().to_bits());
        assert_eq!(read_f32(28).to_bits(), params.planet_radius.to_bits());
        assert_eq!(read_f32(32).to_bits(), params.atmosphere_radius.to_bits());
    }

    #[test]
    fn test_sky_view_pc_bytes() {
        let params = AtmosphereParams::EARTH;
        let sun = DirectionalLight::DEFAULT_SUN;
        let pc = SkyViewPc::pack(&params, &sun, 0.5);
        let bytes = bytemuck::bytes_of(&pc);

        assert_eq!(bytes.len(), 96);
        let read_f32 = |offset: usize| f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        assert_eq!(read_f32(32).to_bits(), sun.irradiance.x.to_bits());
        assert_eq!(read_f32(48).to_bits(), sun.direction.x.to_bits());
        assert_eq!(read_f32(72).to_bits(), params.mie_g.to_bits());
        assert_eq!(read_f32(84).to_bits(), 0.5f32.to_bits());
        // 尾部 padding 写 0
        assert_eq!(&bytes[88..96], &[0u8; 8]);
    }

    #[test]
    fn test_composite_pc_seed_offset() {
        let pc = CompositePc::pack([glam::Vec4::ZERO; 4], glam::Vec3::ZERO, 0xDEADBEEF);
        let bytes = bytemuck::bytes_of(&pc);

        assert_eq!(bytes.len(), 80);
        assert_eq!(u32::from_le_bytes(bytes[76..80].try_into().unwrap()), 0xDEADBEEF);
    }

    /// 行星块 + 按 16 对齐的光照块构成 144 字节的 scene uniform buffer
    #[test]
    fn test_scene_ubo_layout() {
        let params = AtmosphereParams::EARTH;
        let planet = PlanetUbo::pack(glam::Vec3::ZERO, &params);
        let light = DirectionalLightUbo::pack(&DirectionalLight::DEFAULT_SUN);

        let mut ubo = [0u8; SCENE_UBO_SIZE];
        ubo[0..size_of::<PlanetUbo>()].copy_from_slice(bytemuck::bytes_of(&planet));
        ubo[LIGHT_UBO_OFFSET..].copy_from_slice(bytemuck::bytes_of(&light));

        let read_f32 = |offset: usize| f32::from_le_bytes(ubo[offset..offset + 4].try_into().unwrap());
        assert_eq!(read_f32(12).to_bits(), params.planet_radius.to_bits());
        assert_eq!(read_f32(92).to_bits(), params.ozone_layer_thickness.to_bits());
        assert_eq!(read_f32(112).to_bits(), DirectionalLight::DEFAULT_SUN.direction.x.to_bits());
    }
}
