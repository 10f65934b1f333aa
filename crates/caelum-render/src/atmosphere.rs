use glam::Vec3;

/// 大气的物理参数
///
/// 长度单位统一为 km，散射/吸收系数单位为 km⁻¹
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct AtmosphereParams {
    pub rayleigh_scattering: Vec3,
    pub rayleigh_scale_height: f32,

    pub mie_scattering: f32,
    pub mie_absorption: f32,
    pub mie_scale_height: f32,
    /// Mie 相函数的不对称因子 g
    pub mie_g: f32,

    pub ozone_absorption: Vec3,
    /// 臭氧层中心高度
    pub ozone_layer_height: f32,
    /// 臭氧层厚度（浓度在中心向两侧线性衰减到 0）
    pub ozone_layer_thickness: f32,

    pub planet_radius: f32,
    pub atmosphere_radius: f32,

    pub ground_albedo: Vec3,
}

impl AtmosphereParams {
    /// 地球大气，系数来自 Bruneton 式的标准参数
    pub const EARTH: Self = Self {
        rayleigh_scattering: Vec3::new(5.802e-3, 13.558e-3, 33.1e-3),
        rayleigh_scale_height: 8.0,

        mie_scattering: 3.996e-3,
        mie_absorption: 4.4e-3,
        mie_scale_height: 1.2,
        mie_g: 0.8,

        ozone_absorption: Vec3::new(0.650e-3, 1.881e-3, 0.085e-3),
        ozone_layer_height: 25.0,
        ozone_layer_thickness: 30.0,

        planet_radius: 6360.0,
        atmosphere_radius: 6460.0,

        ground_albedo: Vec3::new(0.3, 0.3, 0.3),
    };

    /// Mie 消光 = 散射 + 吸收
    #[inline]
    pub fn mie_extinction(&self) -> f32 {
        self.mie_scattering + self.mie_absorption
    }
}

/// 方向光（太阳）
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct DirectionalLight {
    /// 光的传播方向，单位向量
    pub direction: Vec3,
    pub irradiance: Vec3,
}

impl DirectionalLight {
    pub const DEFAULT_SUN: Self = Self {
        direction: Vec3::new(0.0, -1.0, 0.0),
        irradiance: Vec3::new(1.0, 1.0, 1.0),
    };
}

/// transmittance LUT 的重算判据：影响光学深度的全部参数的位级快照
///
/// 按 f32 的 bit pattern 比较，任何一个参数有非零变化都会触发重算，
/// 而浮点上相等但 bit 不同的值（如 0.0 与 -0.0）也视为变化，保持判定保守
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TransmittanceSnapshot {
    bits: [u32; 13],
}

impl TransmittanceSnapshot {
    pub fn of(params: &AtmosphereParams) -> Self {
        Self {
            bits: [
                params.rayleigh_scattering.x.to_bits(),
                params.rayleigh_scattering.y.to_bits(),
                params.rayleigh_scattering.z.to_bits(),
                params.rayleigh_scale_height.to_bits(),
                params.mie_extinction().to_bits(),
                params.mie_scale_height.to_bits(),
                params.ozone_absorption.x.to_bits(),
                params.ozone_absorption.y.to_bits(),
                params.ozone_absorption.z.to_bits(),
                params.ozone_layer_height.to_bits(),
                params.ozone_layer_thickness.to_bits(),
                params.planet_radius.to_bits(),
                params.atmosphere_radius.to_bits(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 参数位级相同则快照相等，任何一个跟踪参数变化则不等
    #[test]
    fn test_snapshot_gating() {
        let params = AtmosphereParams::EARTH;
        assert_eq!(TransmittanceSnapshot::of(&params), TransmittanceSnapshot::of(&params));

        let mut changed = params;
        changed.planet_radius += 1.0;
        assert_ne!(TransmittanceSnapshot::of(&params), TransmittanceSnapshot::of(&changed));

        let mut changed = params;
        changed.ozone_layer_thickness += f32::EPSILON * 30.0;
        assert_ne!(TransmittanceSnapshot::of(&params), TransmittanceSnapshot::of(&changed));
    }

    /// mie 散射与吸收的变化通过合并后的消光系数参与判据
    #[test]
    fn test_snapshot_tracks_mie_extinction() {
        let params = AtmosphereParams::EARTH;

        let mut changed = params;
        changed.mie_absorption *= 2.0;
        assert_ne!(TransmittanceSnapshot::of(&params), TransmittanceSnapshot::of(&changed));
    }

    /// 不影响光学深度的参数（g、反照率）不触发重算
    #[test]
    fn test_snapshot_ignores_untracked_params() {
        let params = AtmosphereParams::EARTH;

        let mut changed = params;
        changed.mie_g = 0.5;
        changed.ground_albedo = Vec3::ZERO;
        assert_eq!(TransmittanceSnapshot::of(&params), TransmittanceSnapshot::of(&changed));
    }
}
