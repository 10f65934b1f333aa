//! 重量级资源（mesh、纹理等）的异步加载
//!
//! 渲染线程永远不等 IO：请求发给后台 worker，就绪前一律拿到 fallback 资源

pub mod async_cache;
