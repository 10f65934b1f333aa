//! caelum 渲染器
//!
//! 基于物理的大气渲染：transmittance LUT → sky-view LUT 两级 compute 管线，
//! 多帧并行的帧环，以及把若干 SceneView 合成到 swapchain 的 Renderer。

pub mod asset;
pub mod atmosphere;
pub mod frame_ring;
pub mod layouts;
pub mod lut;
pub mod renderer;
pub mod scene;
pub mod scene_view;
pub mod settings;
