use std::rc::Rc;

use ash::vk;
use caelum_gfx::{
    cache::layout_cache::{GfxDescriptorBindingDesc, GfxDescriptorSetLayoutCache, GfxDescriptorSetLayoutDesc},
    commands::{barrier::GfxImageBarrier, semaphore::GfxSemaphore},
    descriptor::{DescriptorBindings, GfxDescriptorPool, GfxDescriptorSet, GfxDescriptorSetLayout, GfxDescriptorUpdateInfo},
    foundation::device::GfxDevice,
    gfx::Gfx,
    resources::{
        image::{GfxImage, GfxImageCreateInfo},
        image_view::GfxImageView,
        shader::GfxShaderModule,
    },
};
use glam::{Vec3, Vec4};

use crate::{
    frame_ring::Frame,
    layouts::{CompositePc, FullScatteringPc, SkyViewPc},
    lut::sky_view::{SkyViewLut, SkyViewUbo},
    scene::{Scene, SceneKey},
    settings::{DefaultRendererSettings, FifLabel, shader_path},
};

/// 针孔相机，大气 draw 通过 frustum corner 射线重建每像素的视线方向
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    /// 垂直视场角，弧度
    pub fov_y: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.2, 0.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov_y: std::f32::consts::FRAC_PI_3,
        }
    }
}

impl Camera {
    /// NDC 四角的世界空间视线方向：左下、右下、左上、右上
    pub fn frustum_corners(&self, aspect: f32) -> [Vec4; 4] {
        let forward = self.forward.normalize();
        let right = forward.cross(self.up).normalize();
        let up = right.cross(forward);

        let half_h = (self.fov_y * 0.5).tan();
        let half_w = half_h * aspect;

        let corner = |x: f32, y: f32| (forward + right * (x * half_w) + up * (y * half_h)).extend(0.0);
        [corner(-1.0, -1.0), corner(1.0, -1.0), corner(-1.0, 1.0), corner(1.0, 1.0)]
    }

    /// 相机在行星表面上方的高度
    #[inline]
    pub fn height_above(&self, planet_center: Vec3, planet_radius: f32) -> f32 {
        (self.position - planet_center).length() - planet_radius
    }

    /// 以脚下天顶方向为极轴的切空间 (east, north)
    pub fn tangent_frame(&self, planet_center: Vec3) -> (Vec3, Vec3) {
        let zenith = (self.position - planet_center).try_normalize().unwrap_or(Vec3::Y);

        // 天顶接近世界 Z 时换参考轴，避免叉积退化
        let reference = if zenith.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
        let east = reference.cross(zenith).normalize();
        let north = zenith.cross(east);
        (east, north)
    }
}

/// 大气 draw 的变体
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AtmospherePass {
    /// 采样两级 LUT 的合成 draw，80 字节 push constant
    LutComposite,
    /// 不经 LUT、在 shader 内完整 ray march 的变体，112 字节 push constant
    FullScattering,
}

/// binding 0: scene uniform buffer
/// binding 1: sky-view LUT，采样
/// binding 2: transmittance LUT，采样（气透视）
pub struct AtmosphereDrawBindings;
impl DescriptorBindings for AtmosphereDrawBindings {
    fn layout_desc() -> GfxDescriptorSetLayoutDesc {
        let sampled = |binding| GfxDescriptorBindingDesc {
            binding,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count: 1,
            stages: vk::ShaderStageFlags::FRAGMENT,
            binding_flags: vk::DescriptorBindingFlags::empty(),
        };
        GfxDescriptorSetLayoutDesc {
            flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            bindings: vec![
                GfxDescriptorBindingDesc {
                    binding: 0,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    count: 1,
                    stages: vk::ShaderStageFlags::FRAGMENT,
                    binding_flags: vk::DescriptorBindingFlags::empty(),
                },
                sampled(1),
                sampled(2),
            ],
        }
    }
}

/// 一个帧槽位的渲染目标
struct ViewTarget {
    image: GfxImage,
    view: GfxImageView,
    /// 本槽位的 LUT compute 完成时 signal，graphics 提交等它
    render_complete: GfxSemaphore,
}

/// 一个观察大气的视口
///
/// 持有相机、sky-view LUT 和 N 个槽位的渲染目标；
/// 通过 SceneKey 引用 scene，帧间可以换绑到另一个 scene
pub struct SceneView {
    name: String,
    pub camera: Camera,
    pass: AtmospherePass,
    scene_key: SceneKey,

    sky_view: SkyViewLut,

    draw_set: GfxDescriptorSet<AtmosphereDrawBindings>,
    draw_pipeline_layout: vk::PipelineLayout,
    draw_pipeline: vk::Pipeline,

    extent: vk::Extent2D,
    targets: Vec<ViewTarget>,

    /// 每个槽位上一次渲染所针对的 scene，不一致时惰性重写 descriptor
    last_scene: [Option<SceneKey>; FifLabel::FRAMES_IN_FLIGHT],

    /// renderer 用来做每帧 first-reference-wins 去重
    id: u64,

    device: Rc<GfxDevice>,
}

fn next_view_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

// new & init
impl SceneView {
    pub fn new(
        gfx: &Gfx,
        layout_cache: &GfxDescriptorSetLayoutCache,
        descriptor_pool: &GfxDescriptorPool,
        scene_key: SceneKey,
        extent: vk::Extent2D,
        pass: AtmospherePass,
        name: &str,
    ) -> Self {
        let sky_view = SkyViewLut::new(gfx, layout_cache, descriptor_pool, name);

        let set_layout = GfxDescriptorSetLayout::<AtmosphereDrawBindings>::new(layout_cache);
        let draw_set = GfxDescriptorSet::new(gfx, descriptor_pool, &set_layout, &format!("{}-draw", name));

        let (pc_size, frag_shader) = match pass {
            AtmospherePass::LutComposite => (size_of::<CompositePc>() as u32, "atmosphere_composite.frag.spv"),
            AtmospherePass::FullScattering => (size_of::<FullScatteringPc>() as u32, "atmosphere_full.frag.spv"),
        };
        let (draw_pipeline_layout, draw_pipeline) = create_fullscreen_pipeline(
            gfx,
            set_layout.handle(),
            pc_size,
            &shader_path("fullscreen.vert.spv"),
            &shader_path(frag_shader),
            DefaultRendererSettings::VIEW_COLOR_FORMAT,
            &format!("{}-draw", name),
        );

        let targets = Self::create_targets(gfx, extent, name);

        Self {
            name: name.to_string(),
            camera: Camera::default(),
            pass,
            scene_key,
            sky_view,
            draw_set,
            draw_pipeline_layout,
            draw_pipeline,
            extent,
            targets,
            last_scene: [None; FifLabel::FRAMES_IN_FLIGHT],
            id: next_view_id(),
            device: gfx.device.clone(),
        }
    }

    fn create_targets(gfx: &Gfx, extent: vk::Extent2D, name: &str) -> Vec<ViewTarget> {
        (0..FifLabel::FRAMES_IN_FLIGHT)
            .map(|idx| {
                let label = FifLabel::from_usize(idx);
                let image = GfxImage::new(
                    gfx,
                    &GfxImageCreateInfo::new_image_2d_info(
                        extent,
                        DefaultRendererSettings::VIEW_COLOR_FORMAT,
                        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                    ),
                    &format!("{}-target-{}", name, label),
                );
                let view = GfxImageView::new_2d(gfx, &image, vk::ImageAspectFlags::COLOR, &format!("{}-target-{}", name, label));
                let render_complete = GfxSemaphore::new(gfx.device.clone(), &format!("{}-render-complete-{}", name, label));
                ViewTarget { image, view, render_complete }
            })
            .collect()
    }
}

// getter
impl SceneView {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn scene_key(&self) -> SceneKey {
        self.scene_key
    }

    #[inline]
    pub fn pass(&self) -> AtmospherePass {
        self.pass
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// 槽位的目标 image view，composite 把它接到 bindless 数组里采样
    #[inline]
    pub fn target_view(&self, label: FifLabel) -> vk::ImageView {
        self.targets[*label].view.handle()
    }

    #[inline]
    pub fn render_complete_semaphore(&self, label: FifLabel) -> &GfxSemaphore {
        &self.targets[*label].render_complete
    }
}

// setter
impl SceneView {
    /// 换绑到另一个 scene；descriptor 在各槽位下一次渲染时惰性重写
    pub fn set_scene(&mut self, scene_key: SceneKey) {
        self.scene_key = scene_key;
    }

    /// 调整输出尺寸：所有槽位的目标一次性重建
    ///
    /// 会等待 device idle，只应在 resize 事件时调用
    pub fn set_extent(&mut self, gfx: &Gfx, extent: vk::Extent2D) {
        if extent == self.extent {
            return;
        }

        gfx.device().wait_idle();
        for target in self.targets.drain(..) {
            target.view.destroy();
            target.image.destroy();
            target.render_complete.destroy();
        }
        self.targets = Self::create_targets(gfx, extent, &self.name);
        self.extent = extent;
    }
}

// phase methods
impl SceneView {
    /// 录制本 view 这一帧的全部 GPU 工作
    ///
    /// compute cmd：sky-view LUT 重算（无条件）；
    /// graphics cmd：把大气 draw 进本槽位的目标并转为可采样。
    /// scene 的 transmittance LUT 必须已在本帧由 renderer 录制/转换完毕。
    pub fn render(&mut self, gfx: &Gfx, frame: &Frame, scene: &Scene, lut_sampler: vk::Sampler, seed: u32) {
        let slot = *frame.label();

        // scene 换绑后的惰性 descriptor 重写
        if self.last_scene[slot] != Some(self.scene_key) {
            self.sky_view.rebind_scene(
                scene.ubo().vk_buffer(),
                scene.ubo().size(),
                scene.transmittance().view().handle(),
                lut_sampler,
            );
            self.draw_set.write(&[
                (
                    0,
                    0,
                    GfxDescriptorUpdateInfo::Buffer(
                        vk::DescriptorBufferInfo::default().buffer(scene.ubo().vk_buffer()).range(scene.ubo().size()),
                    ),
                ),
                (
                    1,
                    0,
                    GfxDescriptorUpdateInfo::Image(
                        vk::DescriptorImageInfo::default()
                            .image_view(self.sky_view.view().handle())
                            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                            .sampler(lut_sampler),
                    ),
                ),
                (
                    2,
                    0,
                    GfxDescriptorUpdateInfo::Image(
                        vk::DescriptorImageInfo::default()
                            .image_view(scene.transmittance().view().handle())
                            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                            .sampler(lut_sampler),
                    ),
                ),
            ]);
            self.last_scene[slot] = Some(self.scene_key);
        }

        if self.pass == AtmospherePass::LutComposite {
            self.record_sky_view_compute(gfx, frame, scene);
        }
        self.record_draw(frame, scene, seed);
    }

    fn record_sky_view_compute(&self, gfx: &Gfx, frame: &Frame, scene: &Scene) {
        let cmd = frame.compute_cmd();

        let (east, north) = self.camera.tangent_frame(scene.planet_position());
        let view_ubo = SkyViewUbo {
            camera_pos: self.camera.position.to_array(),
            _padding0: 0.0,
            tangent_east: east.to_array(),
            _padding1: 0.0,
            tangent_north: north.to_array(),
            _padding2: 0.0,
        };
        let camera_height = self.camera.height_above(scene.planet_position(), scene.params().planet_radius);
        let pc = SkyViewPc::pack(scene.params(), scene.sun(), camera_height);

        let graphics_family = gfx.graphics_queue_family();
        let compute_family = gfx.compute_queue_family();

        // 同 queue 时上一帧的 fragment 还在采样这张图，重写前用 execution
        // dependency 挡住；跨 queue 的在途采样由提交层的 semaphore 链负责
        let prev_read_stage = if graphics_family == compute_family {
            vk::PipelineStageFlags2::FRAGMENT_SHADER
        } else {
            vk::PipelineStageFlags2::TOP_OF_PIPE
        };
        self.sky_view.compute(cmd, &view_ubo, &pc, prev_read_stage);

        let sky_view_barrier = GfxImageBarrier::new()
            .image(self.sky_view.image())
            .layout_transfer(vk::ImageLayout::GENERAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_WRITE)
            .dst_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_READ);

        if graphics_family == compute_family {
            cmd.image_memory_barrier(vk::DependencyFlags::empty(), &[sky_view_barrier]);
        } else {
            // 跨 queue family：release/acquire 成对，参数一致
            let barrier = sky_view_barrier.queue_family_transfer(compute_family, graphics_family);
            cmd.image_memory_barrier(vk::DependencyFlags::empty(), std::slice::from_ref(&barrier));
            frame.graphics_cmd().image_memory_barrier(vk::DependencyFlags::empty(), std::slice::from_ref(&barrier));
        }
    }

    fn record_draw(&self, frame: &Frame, scene: &Scene, seed: u32) {
        let cmd = frame.graphics_cmd();
        let target = &self.targets[*frame.label()];

        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::new()
                .image(target.image.handle())
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                .dst_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)],
        );

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(target.view.handle())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 1.0] },
            });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));

        cmd.begin_rendering(&rendering_info);
        cmd.set_viewport(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        });

        cmd.bind_graphics_pipeline(self.draw_pipeline);
        cmd.bind_graphics_descriptor_sets(self.draw_pipeline_layout, 0, &[self.draw_set.handle()]);

        let aspect = self.extent.width as f32 / self.extent.height as f32;
        let corners = self.camera.frustum_corners(aspect);
        let pc_stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        match self.pass {
            AtmospherePass::LutComposite => {
                let pc = CompositePc::pack(corners, self.camera.position, seed);
                cmd.push_constants(self.draw_pipeline_layout, pc_stages, 0, bytemuck::bytes_of(&pc));
            }
            AtmospherePass::FullScattering => {
                let pc = FullScatteringPc::pack(corners, self.camera.position, scene.params(), scene.sun());
                cmd.push_constants(self.draw_pipeline_layout, pc_stages, 0, bytemuck::bytes_of(&pc));
            }
        }

        // 全屏三角形，无 vertex buffer
        cmd.draw(3, 1, 0, 0);
        cmd.end_rendering();

        // composite 在同一 graphics 提交里采样这个目标
        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::new()
                .image(target.image.handle())
                .layout_transfer(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                .dst_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_READ)],
        );
    }
}

// destroy
impl SceneView {
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_pipeline(self.draw_pipeline, None);
            self.device.destroy_pipeline_layout(self.draw_pipeline_layout, None);
        }
        for target in self.targets {
            target.view.destroy();
            target.image.destroy();
            target.render_complete.destroy();
        }
        self.sky_view.destroy();
    }
}

/// 全屏 draw 的 graphics pipeline：无 vertex input，dynamic rendering
pub(crate) fn create_fullscreen_pipeline(
    gfx: &Gfx,
    set_layout: vk::DescriptorSetLayout,
    pc_size: u32,
    vert_path: &std::path::Path,
    frag_path: &std::path::Path,
    color_format: vk::Format,
    name: &str,
) -> (vk::PipelineLayout, vk::Pipeline) {
    let vert = GfxShaderModule::new(gfx, vert_path);
    let frag = GfxShaderModule::new(gfx, frag_path);
    let stages = [
        vert.stage_info(vk::ShaderStageFlags::VERTEX),
        frag.stage_info(vk::ShaderStageFlags::FRAGMENT),
    ];

    let pc_range = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        offset: 0,
        size: pc_size,
    };
    let set_layouts = [set_layout];
    let layout_ci = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(std::slice::from_ref(&pc_range));
    let pipeline_layout = unsafe { gfx.device().create_pipeline_layout(&layout_ci, None).unwrap() };

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
    let input_assembly =
        vk::PipelineInputAssemblyStateCreateInfo::default().topology(vk::PrimitiveTopology::TRIANGLE_LIST);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .line_width(1.0);
    let multisample =
        vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let attachment = vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
    let color_blend =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(std::slice::from_ref(&attachment));
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats = [color_format];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

    let pipeline_ci = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(pipeline_layout)
        .push_next(&mut rendering_info);

    let pipeline = unsafe {
        gfx.device()
            .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_ci), None)
            .unwrap()[0]
    };
    gfx.device().set_object_debug_name(pipeline, name);

    vert.destroy();
    frag.destroy();
    (pipeline_layout, pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// frustum corner 的顺序与符号：左下在 -x/-y 方向，右上在 +x/+y
    #[test]
    fn test_frustum_corners_orientation() {
        let camera = Camera {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov_y: std::f32::consts::FRAC_PI_2,
        };
        let corners = camera.frustum_corners(1.0);

        // fov 90°、方形画幅：半宽/半高均为 1
        assert!((corners[0].x + 1.0).abs() < 1e-5 && (corners[0].y + 1.0).abs() < 1e-5);
        assert!((corners[3].x - 1.0).abs() < 1e-5 && (corners[3].y - 1.0).abs() < 1e-5);
        assert!(corners.iter().all(|c| (c.z + 1.0).abs() < 1e-5 && c.w == 0.0));
    }

    #[test]
    fn test_camera_height_above() {
        let camera = Camera {
            position: Vec3::new(0.0, 6361.0, 0.0),
            ..Default::default()
        };
        let height = camera.height_above(Vec3::ZERO, 6360.0);
        assert!((height - 1.0).abs() < 1e-3);
    }

    /// 切空间始终正交且与天顶垂直，包括天顶指向参考轴的退化情形
    #[test]
    fn test_tangent_frame_orthogonal() {
        for position in [Vec3::new(0.0, 6360.0, 0.0), Vec3::new(0.0, 0.0, 6360.0)] {
            let camera = Camera { position, ..Default::default() };
            let (east, north) = camera.tangent_frame(Vec3::ZERO);
            let zenith = position.normalize();

            assert!(east.dot(north).abs() < 1e-5);
            assert!(east.dot(zenith).abs() < 1e-5);
            assert!(north.dot(zenith).abs() < 1e-5);
            assert!((east.length() - 1.0).abs() < 1e-5);
        }
    }
}
