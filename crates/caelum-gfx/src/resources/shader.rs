use std::rc::Rc;

use ash::vk;

use crate::{
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    gfx::Gfx,
};

/// SPIR-V shader module
///
/// 所有 pipeline stage 的入口函数名固定为 `main`
pub struct GfxShaderModule {
    handle: vk::ShaderModule,

    device: Rc<GfxDevice>,
}

impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// new & destroy
impl GfxShaderModule {
    /// 从文件加载 SPIR-V；字节数必须是 4 的倍数，否则在加载时失败
    pub fn new(gfx: &Gfx, path: &std::path::Path) -> Self {
        let bytes = std::fs::read(path).unwrap_or_else(|e| panic!("failed to read shader {:?}: {}", path, e));
        assert!(
            bytes.len() % 4 == 0,
            "malformed SPIR-V {:?}: byte length {} is not word aligned",
            path,
            bytes.len()
        );

        let mut cursor = std::io::Cursor::new(bytes);
        let shader_code = ash::util::read_spv(&mut cursor).unwrap();

        Self::from_spirv(gfx, &shader_code, path.to_str().unwrap())
    }

    pub fn from_spirv(gfx: &Gfx, code: &[u32], debug_name: &str) -> Self {
        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(code);

        let handle = unsafe { gfx.device.create_shader_module(&shader_module_info, None).unwrap() };

        let module = Self { handle, device: gfx.device.clone() };
        gfx.device.set_debug_name(&module, debug_name);
        module
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}

// getter
impl GfxShaderModule {
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    /// shader stage create info，入口固定为 main
    #[inline]
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default().stage(stage).module(self.handle).name(c"main")
    }
}
