//! caelum 的 GFX 层
//!
//! 对 Vulkan 做一层薄封装：device context、资源 wrapper、命令与同步原语、
//! 去重的 GPU 对象缓存，以及 swapchain。

pub mod cache;
pub mod commands;
pub mod descriptor;
pub mod foundation;
pub mod gfx;
pub mod resources;
pub mod swapchain;
