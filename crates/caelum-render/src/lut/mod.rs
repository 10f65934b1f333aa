use ash::vk;
use caelum_gfx::{gfx::Gfx, resources::shader::GfxShaderModule};

pub mod sky_view;
pub mod transmittance;

/// LUT compute pass 的固定 work group 尺寸
pub const LUT_GROUP_SIZE: u32 = 8;

/// 由 shader + set layout + push constant 大小构建 compute pipeline
pub(crate) fn create_compute_pipeline(
    gfx: &Gfx,
    set_layout: vk::DescriptorSetLayout,
    pc_size: u32,
    shader_path: &std::path::Path,
    name: &str,
) -> (vk::PipelineLayout, vk::Pipeline) {
    let shader = GfxShaderModule::new(gfx, shader_path);

    let pc_range = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::COMPUTE,
        offset: 0,
        size: pc_size,
    };
    let set_layouts = [set_layout];
    let layout_ci = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(std::slice::from_ref(&pc_range));
    let pipeline_layout = unsafe { gfx.device().create_pipeline_layout(&layout_ci, None).unwrap() };

    let pipeline_ci = vk::ComputePipelineCreateInfo::default()
        .stage(shader.stage_info(vk::ShaderStageFlags::COMPUTE))
        .layout(pipeline_layout);
    let pipeline = unsafe {
        gfx.device()
            .create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_ci), None)
            .unwrap()[0]
    };
    gfx.device().set_object_debug_name(pipeline, name);

    shader.destroy();
    (pipeline_layout, pipeline)
}

/// dispatch 覆盖 extent 所需的 group 数
#[inline]
pub(crate) fn dispatch_groups(extent: vk::Extent2D) -> glam::UVec3 {
    glam::uvec3(extent.width.div_ceil(LUT_GROUP_SIZE), extent.height.div_ceil(LUT_GROUP_SIZE), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// group 数向上取整，非 8 对齐的 extent 也被完整覆盖
    #[test]
    fn test_dispatch_groups_cover_extent() {
        let groups = dispatch_groups(vk::Extent2D { width: 256, height: 64 });
        assert_eq!(groups, glam::uvec3(32, 8, 1));

        let groups = dispatch_groups(vk::Extent2D { width: 192, height: 108 });
        assert_eq!(groups, glam::uvec3(24, 14, 1));
        assert!(groups.y * LUT_GROUP_SIZE >= 108);
    }
}
