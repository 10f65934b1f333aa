pub mod surface;
pub mod swapchain;

/// swapchain 与当前 surface 尺寸不匹配，需要 wait idle 后重建
///
/// acquire/present 返回它而不是 panic：窗口 resize 是正常事件，不是错误
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NeedsRecreate;

impl std::fmt::Display for NeedsRecreate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "swapchain needs recreate")
    }
}

impl std::error::Error for NeedsRecreate {}
