use std::rc::Rc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use caelum_gfx::{
    cache::layout_cache::{GfxDescriptorBindingDesc, GfxDescriptorSetLayoutCache, GfxDescriptorSetLayoutDesc},
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer},
    descriptor::{DescriptorBindings, GfxDescriptorPool, GfxDescriptorSet, GfxDescriptorSetLayout, GfxDescriptorUpdateInfo},
    foundation::device::GfxDevice,
    gfx::Gfx,
    resources::{
        buffer::GfxBuffer,
        image::{GfxImage, GfxImageCreateInfo},
        image_view::GfxImageView,
    },
};

use crate::{
    layouts::SkyViewPc,
    lut::{create_compute_pipeline, dispatch_groups},
    settings::{DefaultRendererSettings, shader_path},
};

/// sky-view compute 的视角相关 uniform：相机位置 + 切空间基
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct SkyViewUbo {
    pub camera_pos: [f32; 3],
    pub _padding0: f32,
    /// 切空间的东方向（方位角 0）
    pub tangent_east: [f32; 3],
    pub _padding1: f32,
    /// 切空间的北方向
    pub tangent_north: [f32; 3],
    pub _padding2: f32,
}

const _: () = assert!(size_of::<SkyViewUbo>() == 48);

/// binding 0: scene uniform buffer
/// binding 1: 自身的视角 uniform buffer
/// binding 2: transmittance LUT，采样
/// binding 3: 输出 LUT，storage image
pub struct SkyViewLutBindings;
impl DescriptorBindings for SkyViewLutBindings {
    fn layout_desc() -> GfxDescriptorSetLayoutDesc {
        let buffer = |binding| GfxDescriptorBindingDesc {
            binding,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            count: 1,
            stages: vk::ShaderStageFlags::COMPUTE,
            binding_flags: vk::DescriptorBindingFlags::empty(),
        };
        GfxDescriptorSetLayoutDesc {
            flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            bindings: vec![
                buffer(0),
                buffer(1),
                GfxDescriptorBindingDesc {
                    binding: 2,
                    descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    count: 1,
                    stages: vk::ShaderStageFlags::COMPUTE,
                    binding_flags: vk::DescriptorBindingFlags::empty(),
                },
                GfxDescriptorBindingDesc {
                    binding: 3,
                    descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
                    count: 1,
                    stages: vk::ShaderStageFlags::COMPUTE,
                    binding_flags: vk::DescriptorBindingFlags::empty(),
                },
            ],
        }
    }
}

/// sky-view LUT：(方位角, 仰角) → 单次散射的入射辐射
///
/// 相机和太阳方向每帧都变，因此每个被 draw 的帧都无条件重算；
/// 它在单次散射 ray march 的每一步采样 transmittance LUT 的纹理
pub struct SkyViewLut {
    image: GfxImage,
    view: GfxImageView,
    ubo: GfxBuffer,

    descriptor_set: GfxDescriptorSet<SkyViewLutBindings>,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,

    device: Rc<GfxDevice>,
}

// new & init
impl SkyViewLut {
    pub fn new(gfx: &Gfx, layout_cache: &GfxDescriptorSetLayoutCache, descriptor_pool: &GfxDescriptorPool, name: &str) -> Self {
        let extent = DefaultRendererSettings::SKY_VIEW_LUT_EXTENT;
        let image = GfxImage::new(
            gfx,
            &GfxImageCreateInfo::new_image_2d_info(
                extent,
                DefaultRendererSettings::LUT_FORMAT,
                vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
            ),
            &format!("{}-sky-view-lut", name),
        );
        let view = GfxImageView::new_2d(gfx, &image, vk::ImageAspectFlags::COLOR, &format!("{}-sky-view-lut", name));
        let ubo = GfxBuffer::new_uniform_buffer(gfx, size_of::<SkyViewUbo>() as vk::DeviceSize, format!("{}-sky-view", name));

        let set_layout = GfxDescriptorSetLayout::<SkyViewLutBindings>::new(layout_cache);
        let descriptor_set = GfxDescriptorSet::new(gfx, descriptor_pool, &set_layout, &format!("{}-sky-view-lut", name));

        // binding 0/2 指向 scene 的资源，由 rebind_scene 在首次渲染前写入
        descriptor_set.write(&[
            (
                1,
                0,
                GfxDescriptorUpdateInfo::Buffer(
                    vk::DescriptorBufferInfo::default().buffer(ubo.vk_buffer()).range(size_of::<SkyViewUbo>() as vk::DeviceSize),
                ),
            ),
            (
                3,
                0,
                GfxDescriptorUpdateInfo::Image(
                    vk::DescriptorImageInfo::default().image_view(view.handle()).image_layout(vk::ImageLayout::GENERAL),
                ),
            ),
        ]);

        let (pipeline_layout, pipeline) = create_compute_pipeline(
            gfx,
            set_layout.handle(),
            size_of::<SkyViewPc>() as u32,
            &shader_path("sky_view_lut.comp.spv"),
            &format!("{}-sky-view-lut", name),
        );

        // FullScattering 的 view 不跑 compute，但 draw set 仍然绑着这张图：
        // 先同步转成可采样布局，避免它停留在 UNDEFINED
        gfx.one_time_exec(
            |cmd| {
                cmd.image_memory_barrier(
                    vk::DependencyFlags::empty(),
                    &[GfxImageBarrier::new()
                        .image(image.handle())
                        .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                        .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                        .dst_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_READ)],
                );
            },
            &format!("{}-sky-view-lut-init", name),
        );

        Self {
            image,
            view,
            ubo,
            descriptor_set,
            pipeline_layout,
            pipeline,
            device: gfx.device.clone(),
        }
    }
}

// getter
impl SkyViewLut {
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
impl SkyViewLut {
    /// 把 binding 0/2 重写到另一个 scene 的 uniform buffer 和 transmittance LUT
    ///
    /// SceneView 换绑 scene 时调用一次，不需要重新分配 descriptor set
    pub fn rebind_scene(&self, scene_ubo: vk::Buffer, scene_ubo_size: vk::DeviceSize, transmittance_view: vk::ImageView, sampler: vk::Sampler) {
        self.descriptor_set.write(&[
            (
                0,
                0,
                GfxDescriptorUpdateInfo::Buffer(vk::DescriptorBufferInfo::default().buffer(scene_ubo).range(scene_ubo_size)),
            ),
            (
                2,
                0,
                GfxDescriptorUpdateInfo::Image(
                    vk::DescriptorImageInfo::default()
                        .image_view(transmittance_view)
                        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                        .sampler(sampler),
                ),
            ),
        ]);
    }

    /// 录制无条件重算；transmittance LUT 必须已处于 SHADER_READ_ONLY_OPTIMAL
    ///
    /// prev_read_stage：之前的帧在本队列上采样这张图的 stage。重写是 WAR，
    /// execution dependency 即可；跨 queue 的在途采样由提交层的
    /// graphics→compute semaphore 链挡住
    pub fn compute(&self, cmd: &GfxCommandBuffer, view_ubo: &SkyViewUbo, pc: &SkyViewPc, prev_read_stage: vk::PipelineStageFlags2) {
        self.ubo.transfer_data_by_mmap(std::slice::from_ref(view_ubo));

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
        cmd.push_constants(self.pipeline_layout, vk::ShaderStageFlags::COMPUTE, 0, bytemuck::bytes_of(pc));
        cmd.dispatch(dispatch_groups(self.image.extent_2d()));
    }
}

// destroy
impl SkyViewLut {
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
        self.ubo.destroy();
        self.view.destroy();
        self.image.destroy();
    }
}
