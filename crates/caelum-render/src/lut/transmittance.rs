use std::rc::Rc;

use ash::vk;
use caelum_gfx::{
    cache::layout_cache::{GfxDescriptorBindingDesc, GfxDescriptorSetLayoutCache, GfxDescriptorSetLayoutDesc},
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer},
    descriptor::{DescriptorBindings, GfxDescriptorPool, GfxDescriptorSet, GfxDescriptorSetLayout, GfxDescriptorUpdateInfo},
    foundation::device::GfxDevice,
    gfx::Gfx,
    resources::{
        image::{GfxImage, GfxImageCreateInfo},
        image_view::GfxImageView,
    },
};

use crate::{
    atmosphere::{AtmosphereParams, TransmittanceSnapshot},
    layouts::TransmittancePc,
    lut::{create_compute_pipeline, dispatch_groups},
    settings::{DefaultRendererSettings, shader_path},
};

/// binding 0: 输出 LUT，storage image
pub struct TransmittanceLutBindings;
impl DescriptorBindings for TransmittanceLutBindings {
    fn layout_desc() -> GfxDescriptorSetLayoutDesc {
        GfxDescriptorSetLayoutDesc {
            flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            bindings: vec![GfxDescriptorBindingDesc {
                binding: 0,
                descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
                count: 1,
                stages: vk::ShaderStageFlags::COMPUTE,
                binding_flags: vk::DescriptorBindingFlags::empty(),
            }],
        }
    }
}

/// transmittance LUT：(view-zenith cos, 归一化海拔) → 到大气顶的透射率
///
/// 参数驱动：只有跟踪参数的位级快照变化时才重算。
/// compute 返回是否真的 dispatch 了，调用方据此决定是否需要 post-barrier。
pub struct TransmittanceLut {
    image: GfxImage,
    view: GfxImageView,

    descriptor_set: GfxDescriptorSet<TransmittanceLutBindings>,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,

    snapshot: Option<TransmittanceSnapshot>,

    device: Rc<GfxDevice>,
}

// new & init
impl TransmittanceLut {
    pub fn new(gfx: &Gfx, layout_cache: &GfxDescriptorSetLayoutCache, descriptor_pool: &GfxDescriptorPool, name: &str) -> Self {
        let extent = DefaultRendererSettings::TRANSMITTANCE_LUT_EXTENT;
        let image = GfxImage::new(
            gfx,
            &GfxImageCreateInfo::new_image_2d_info(
                extent,
                DefaultRendererSettings::LUT_FORMAT,
                vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
            ),
            &format!("{}-transmittance-lut", name),
        );
        let view = GfxImageView::new_2d(gfx, &image, vk::ImageAspectFlags::COLOR, &format!("{}-transmittance-lut", name));

        let set_layout = GfxDescriptorSetLayout::<TransmittanceLutBindings>::new(layout_cache);
        let descriptor_set =
            GfxDescriptorSet::new(gfx, descriptor_pool, &set_layout, &format!("{}-transmittance-lut", name));
        descriptor_set.write(&[(
            0,
            0,
            GfxDescriptorUpdateInfo::Image(
                vk::DescriptorImageInfo::default().image_view(view.handle()).image_layout(vk::ImageLayout::GENERAL),
            ),
        )]);

        let (pipeline_layout, pipeline) = create_compute_pipeline(
            gfx,
            set_layout.handle(),
            size_of::<TransmittancePc>() as u32,
            &shader_path("transmittance_lut.comp.spv"),
            &format!("{}-transmittance-lut", name),
        );

        Self {
            image,
            view,
            descriptor_set,
            pipeline_layout,
            pipeline,
            snapshot: None,
            device: gfx.device.clone(),
        }
    }
}

// getter
impl TransmittanceLut {
    #[inline]
    pub fn view(&self) -> &GfxImageView {
        &self.view
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent_2d()
    }
}

// phase methods
impl TransmittanceLut {
    /// 跟踪参数是否和上次 dispatch 时一致
    #[inline]
    pub fn needs_recompute(&self, params: &AtmosphereParams) -> bool {
        self.snapshot != Some(TransmittanceSnapshot::of(params))
    }

    /// 参数变化时录制重算，返回是否 dispatch 了
    ///
    /// prev_read_stage：之前的帧在本队列上读这张图的 stage。重写是 WAR，
    /// 用 execution dependency 挡住在途的读即可，不需要 access mask。
    /// 只做 UNDEFINED→GENERAL 的 pre-barrier；compute 完成后的
    /// GENERAL→SHADER_READ_ONLY 转换由调用方负责（它知道消费端在哪个 stage/queue）
    pub fn compute(&mut self, cmd: &GfxCommandBuffer, params: &AtmosphereParams, prev_read_stage: vk::PipelineStageFlags2) -> bool {
        let snapshot = TransmittanceSnapshot::of(params);
        if self.snapshot == Some(snapshot) {
            return false;
        }

        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::new()
                .image(self.image.handle())
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL)
                .src_mask(prev_read_stage, vk::AccessFlags2::empty())
                .dst_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_WRITE)],
        );

        cmd.bind_compute_pipeline(self.pipeline);
        cmd.bind_compute_descriptor_sets(self.pipeline_layout, 0, &[self.descriptor_set.handle()]);
        cmd.push_constants(
            self.pipeline_layout,
            vk::ShaderStageFlags::COMPUTE,
            0,
            bytemuck::bytes_of(&TransmittancePc::pack(params)),
        );
        cmd.dispatch(dispatch_groups(self.image.extent_2d()));

        self.snapshot = Some(snapshot);
        true
    }
}

// destroy
impl TransmittanceLut {
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
        self.view.destroy();
        self.image.destroy();
    }
}
