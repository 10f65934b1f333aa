use std::{fmt::Display, ops::Deref};

use ash::vk;

pub struct DefaultRendererSettings;
impl DefaultRendererSettings {
    pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    pub const DEFAULT_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::MAILBOX;

    /// SceneView 渲染目标的格式
    pub const VIEW_COLOR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

    /// transmittance LUT: (view-zenith cos, normalized altitude)
    pub const TRANSMITTANCE_LUT_EXTENT: vk::Extent2D = vk::Extent2D { width: 256, height: 64 };
    /// sky-view LUT: (azimuth, elevation)
    pub const SKY_VIEW_LUT_EXTENT: vk::Extent2D = vk::Extent2D { width: 192, height: 108 };

    /// LUT 存储格式，compute 写入 / fragment 采样
    pub const LUT_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
}

/// 定位 workspace 根目录下 shaders/ 里的 SPIR-V 产物
pub fn shader_path(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../shaders").join(name)
}

/// 每帧的硬上限，draw 超出即 panic，不会动态增长
pub struct FrameBudget;
impl FrameBudget {
    /// bindless 纹理数组的槽位数，即每帧最多 draw 的 view 数
    pub const TEXTURE_SLOTS: usize = 128;
    /// 每个 view 一个全屏 quad：4 顶点 6 索引
    pub const VERTICES: usize = 4 * Self::TEXTURE_SLOTS;
    pub const INDICES: usize = 6 * Self::TEXTURE_SLOTS;
}

/// frames in flight 中每一帧的 label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifLabel {
    A,
    B,
    C,
}
impl Deref for FifLabel {
    type Target = usize;
    #[inline]
    fn deref(&self) -> &Self::Target {
        match self {
            Self::A => &Self::INDEX[0],
            Self::B => &Self::INDEX[1],
            Self::C => &Self::INDEX[2],
        }
    }
}
impl Display for FifLabel {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}
impl FifLabel {
    pub const FRAMES_IN_FLIGHT: usize = 3;

    const INDEX: [usize; 3] = [0, 1, 2];

    #[inline]
    pub fn from_usize(idx: usize) -> Self {
        match idx {
            0 => Self::A,
            1 => Self::B,
            2 => Self::C,
            _ => panic!("Invalid frame index: {idx}"),
        }
    }

    #[inline]
    pub fn next_frame(&mut self) {
        *self = match self {
            Self::A => Self::B,
            Self::B => Self::C,
            Self::C => Self::A,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// label 循环推进，绕回后索引与初始一致
    #[test]
    fn test_fif_label_wraparound() {
        let mut label = FifLabel::A;
        let mut seen = Vec::new();
        for _ in 0..(FifLabel::FRAMES_IN_FLIGHT * 2) {
            seen.push(*label);
            label.next_frame();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(*label, 0);
    }

    #[test]
    fn test_fif_label_from_usize() {
        for idx in 0..FifLabel::FRAMES_IN_FLIGHT {
            assert_eq!(*FifLabel::from_usize(idx), idx);
        }
    }
}
