use std::collections::{HashMap, HashSet};

use ash::vk;
use caelum_gfx::{
    cache::{
        layout_cache::{GfxDescriptorBindingDesc, GfxDescriptorSetLayoutCache, GfxDescriptorSetLayoutDesc},
        sampler_cache::GfxSamplerCache,
    },
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore, submit_info::GfxSubmitInfo},
    descriptor::{DescriptorBindings, GfxDescriptorPool, GfxDescriptorSet, GfxDescriptorSetLayout, GfxDescriptorUpdateInfo},
    gfx::Gfx,
    resources::{image::GfxImage, image_view::GfxImageView, sampler::GfxSamplerDesc, shader::GfxShaderModule},
    swapchain::{NeedsRecreate, surface::GfxSurface, swapchain::GfxSwapchain},
};

use crate::{
    atmosphere::AtmosphereParams,
    frame_ring::{FrameRing, QuadAlloc, QuadVertex},
    scene::{Scene, SceneArena, SceneKey},
    scene_view::SceneView,
    settings::{DefaultRendererSettings, FifLabel, FrameBudget, shader_path},
};

/// binding 0: bindless 纹理数组，每个被 draw 的 view 占一个槽位
pub struct BindlessBindings;
impl DescriptorBindings for BindlessBindings {
    fn layout_desc() -> GfxDescriptorSetLayoutDesc {
        GfxDescriptorSetLayoutDesc {
            flags: vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
            bindings: vec![GfxDescriptorBindingDesc {
                binding: 0,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                count: FrameBudget::TEXTURE_SLOTS as u32,
                stages: vk::ShaderStageFlags::FRAGMENT,
                binding_flags: vk::DescriptorBindingFlags::PARTIALLY_BOUND
                    | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND,
            }],
        }
    }
}

/// 帧循环的编排者
///
/// begin_frame 推进帧环 → draw 录制各 view 的 LUT/draw 工作并登记合成 quad →
/// end_frame 合成到 swapchain image、按 semaphore 依赖提交并 present。
/// scene 的 transmittance 重算、view 的渲染和槽位分配都是每帧
/// first-reference-wins 的：同一个 scene/view 在一帧内只处理一次。
pub struct Renderer {
    gfx: Gfx,

    layout_cache: GfxDescriptorSetLayoutCache,
    sampler_cache: GfxSamplerCache,
    descriptor_pool: GfxDescriptorPool,
    bindless_pool: GfxDescriptorPool,

    frame_ring: FrameRing,
    swapchain: Option<GfxSwapchain>,
    swapchain_images: Vec<GfxImage>,
    swapchain_views: Vec<GfxImageView>,

    composite_pipeline_layout: vk::PipelineLayout,
    composite_pipeline: vk::Pipeline,
    /// 每个帧槽位一个 bindless set，fence 保证重写时槽位已退役
    bindless_sets: Vec<GfxDescriptorSet<BindlessBindings>>,

    lut_sampler: vk::Sampler,

    arena: SceneArena,

    /// 合成抖动种子，每个呈现帧自增一次
    seed: u32,

    /// 上一帧 graphics 提交 signal 的 semaphore，下一帧的 compute 提交等它；
    /// 首帧之前没有可等的，为 None
    previous_graphics_finished: Option<GfxSemaphore>,

    // 当帧的登记状态，begin_frame 清空
    scenes_seen: HashSet<SceneKey>,
    view_slots: HashMap<u64, u32>,
    drawn_semaphores: Vec<GfxSemaphore>,
    drawn_quads: Vec<QuadAlloc>,
}

// new & init
impl Renderer {
    pub fn new(
        app_name: &str,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> Self {
        let surface_exts = caelum_gfx::swapchain::surface::required_instance_extensions(raw_display_handle);
        let gfx = Gfx::new(app_name, surface_exts);

        let layout_cache = GfxDescriptorSetLayoutCache::new(gfx.device.clone());
        let sampler_cache = GfxSamplerCache::new();

        let descriptor_pool = GfxDescriptorPool::new(
            &gfx,
            vk::DescriptorPoolCreateFlags::empty(),
            256,
            &[
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 512,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: 512,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_IMAGE,
                    descriptor_count: 256,
                },
            ],
            "renderer",
        );
        let bindless_pool = GfxDescriptorPool::new(
            &gfx,
            vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND,
            FifLabel::FRAMES_IN_FLIGHT as u32,
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: (FrameBudget::TEXTURE_SLOTS * FifLabel::FRAMES_IN_FLIGHT) as u32,
            }],
            "renderer-bindless",
        );

        let surface = GfxSurface::new(&gfx, raw_display_handle, raw_window_handle);
        let swapchain = GfxSwapchain::new(
            &gfx,
            surface,
            DefaultRendererSettings::DEFAULT_PRESENT_MODE,
            DefaultRendererSettings::DEFAULT_SURFACE_FORMAT,
            window_extent,
        );
        let (swapchain_images, swapchain_views) = Self::wrap_swapchain_images(&gfx, &swapchain);

        let bindless_layout = GfxDescriptorSetLayout::<BindlessBindings>::new(&layout_cache);
        let bindless_sets = (0..FifLabel::FRAMES_IN_FLIGHT)
            .map(|idx| GfxDescriptorSet::new(&gfx, &bindless_pool, &bindless_layout, &format!("bindless-{}", idx)))
            .collect();

        let (composite_pipeline_layout, composite_pipeline) =
            Self::create_composite_pipeline(&gfx, bindless_layout.handle(), swapchain.color_format());

        let lut_sampler = sampler_cache.get_or_create(&gfx, &GfxSamplerDesc::linear_clamp());

        let frame_ring = FrameRing::new(&gfx);

        Self {
            gfx,
            layout_cache,
            sampler_cache,
            descriptor_pool,
            bindless_pool,
            frame_ring,
            swapchain: Some(swapchain),
            swapchain_images,
            swapchain_views,
            composite_pipeline_layout,
            composite_pipeline,
            bindless_sets,
            lut_sampler,
            arena: SceneArena::new(),
            seed: 0,
            previous_graphics_finished: None,
            scenes_seen: HashSet::new(),
            view_slots: HashMap::new(),
            drawn_semaphores: Vec::new(),
            drawn_quads: Vec::new(),
        }
    }

    fn wrap_swapchain_images(gfx: &Gfx, swapchain: &GfxSwapchain) -> (Vec<GfxImage>, Vec<GfxImageView>) {
        let images: Vec<GfxImage> = swapchain
            .present_images()
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                GfxImage::from_external(gfx, *image, swapchain.extent(), swapchain.color_format(), &format!("swapchain-{}", idx))
            })
            .collect();
        let views = images
            .iter()
            .enumerate()
            .map(|(idx, image)| GfxImageView::new_2d(gfx, image, vk::ImageAspectFlags::COLOR, &format!("swapchain-{}", idx)))
            .collect();
        (images, views)
    }

    /// 合成 pipeline：QuadVertex 顶点流 + bindless set，push constant 只有 4 字节 seed
    fn create_composite_pipeline(
        gfx: &Gfx,
        bindless_layout: vk::DescriptorSetLayout,
        color_format: vk::Format,
    ) -> (vk::PipelineLayout, vk::Pipeline) {
        let vert = GfxShaderModule::new(gfx, &shader_path("composite.vert.spv"));
        let frag = GfxShaderModule::new(gfx, &shader_path("composite.frag.spv"));
        let stages = [
            vert.stage_info(vk::ShaderStageFlags::VERTEX),
            frag.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let pc_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: size_of::<u32>() as u32,
        };
        let set_layouts = [bindless_layout];
        let layout_ci = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(std::slice::from_ref(&pc_range));
        let pipeline_layout = unsafe { gfx.device().create_pipeline_layout(&layout_ci, None).unwrap() };

        let vertex_binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<QuadVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        let vertex_attributes = [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 8,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32_UINT,
                offset: 16,
            },
        ];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(std::slice::from_ref(&vertex_binding))
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .line_width(1.0);
        let multisample =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let attachment =
            vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
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
        gfx.device().set_object_debug_name(pipeline, "composite");

        vert.destroy();
        frag.destroy();
        (pipeline_layout, pipeline)
    }
}

// getter
impl Renderer {
    #[inline]
    pub fn gfx(&self) -> &Gfx {
        &self.gfx
    }

    #[inline]
    pub fn layout_cache(&self) -> &GfxDescriptorSetLayoutCache {
        &self.layout_cache
    }

    #[inline]
    pub fn descriptor_pool(&self) -> &GfxDescriptorPool {
        &self.descriptor_pool
    }

    #[inline]
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.as_ref().unwrap().extent()
    }

    #[inline]
    pub fn scene(&self, key: SceneKey) -> Option<&Scene> {
        self.arena.get(key)
    }

    #[inline]
    pub fn scene_mut(&mut self, key: SceneKey) -> Option<&mut Scene> {
        self.arena.get_mut(key)
    }
}

// scene & view 管理
impl Renderer {
    pub fn create_scene(&mut self, params: AtmosphereParams, name: &str) -> SceneKey {
        let scene = Scene::new(&self.gfx, &self.layout_cache, &self.descriptor_pool, params, name);
        self.arena.insert(scene)
    }

    /// 等待 device idle 后移除并销毁；引用它的 view 的 key 自动失效
    pub fn destroy_scene(&mut self, key: SceneKey) {
        self.gfx.device().wait_idle();
        self.arena.remove(key);
    }

    pub fn create_view(
        &mut self,
        scene_key: SceneKey,
        extent: vk::Extent2D,
        pass: crate::scene_view::AtmospherePass,
        name: &str,
    ) -> SceneView {
        SceneView::new(&self.gfx, &self.layout_cache, &self.descriptor_pool, scene_key, extent, pass, name)
    }

    /// view 由调用方持有，销毁前等待 device idle
    pub fn destroy_view(&mut self, view: SceneView) {
        self.gfx.device().wait_idle();
        view.destroy();
    }
}

// phase methods
impl Renderer {
    /// 推进帧环并复位当帧槽位；阻塞到该槽位上一次的 GPU 工作退役
    pub fn begin_frame(&mut self) {
        self.frame_ring.begin_frame();

        let frame = self.frame_ring.current_frame();
        frame.graphics_cmd().begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        frame.compute_cmd().begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        self.scenes_seen.clear();
        self.view_slots.clear();
        self.drawn_semaphores.clear();
        self.drawn_quads.clear();
    }

    /// 把 view 合成到 swapchain image 的 region 区域
    ///
    /// scene 的 transmittance 重算和 view 的渲染每帧只发生一次（首次引用生效），
    /// 但每次调用都会登记一个合成 quad，同一个 view 可以被合成到多个区域
    pub fn draw(&mut self, view: &mut SceneView, region: vk::Rect2D) {
        let scene_key = view.scene_key();
        assert!(self.arena.get(scene_key).is_some(), "SceneView references a removed scene");

        if self.scenes_seen.insert(scene_key) {
            self.record_scene_lut(scene_key);
        }

        let label = self.frame_ring.current_label();
        if !self.view_slots.contains_key(&view.id()) {
            let frame = self.frame_ring.current_frame_mut();
            let slot = frame.scratch_mut().alloc_texture_slot();

            let scene = self.arena.get(scene_key).unwrap();
            view.render(&self.gfx, self.frame_ring.current_frame(), scene, self.lut_sampler, self.seed);

            // 新分配槽位指向本槽位的目标；update-after-bind，fence 已保证安全
            self.bindless_sets[*label].write(&[(
                0,
                slot,
                GfxDescriptorUpdateInfo::Image(
                    vk::DescriptorImageInfo::default()
                        .image_view(view.target_view(label))
                        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                        .sampler(self.lut_sampler),
                ),
            )]);

            self.drawn_semaphores.push(view.render_complete_semaphore(label).clone());
            self.view_slots.insert(view.id(), slot);
        }
        let slot = self.view_slots[&view.id()];

        let extent = self.swapchain.as_ref().unwrap().extent();
        let quad = self.push_region_quad(region, extent, slot);
        self.drawn_quads.push(quad);
    }

    /// 录制一个 scene 的 transmittance LUT 工作（每帧每 scene 至多一次）
    fn record_scene_lut(&mut self, scene_key: SceneKey) {
        let graphics_family = self.gfx.graphics_queue_family();
        let compute_family = self.gfx.compute_queue_family();
        let same_family = graphics_family == compute_family;

        let frame = self.frame_ring.current_frame();
        let compute_cmd = frame.compute_cmd().clone();
        let graphics_cmd = frame.graphics_cmd().clone();

        let scene = self.arena.get_mut(scene_key).unwrap();
        let params = *scene.params();

        // 重写前挡住本队列上在途的读：上一帧的 sky-view compute 采样，
        // 同 family 时还有 fragment 采样。跨 queue 的读由 semaphore 链负责
        let prev_read_stage = if same_family {
            vk::PipelineStageFlags2::COMPUTE_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER
        } else {
            vk::PipelineStageFlags2::COMPUTE_SHADER
        };
        let recomputed = scene.transmittance_mut().compute(&compute_cmd, &params, prev_read_stage);
        let lut_image = scene.transmittance().image();

        if recomputed {
            // compute 写完 → 本队列后续 sky-view compute 可读；
            // 同 family 时 fragment 采样也在此覆盖
            let dst_stage = if same_family {
                vk::PipelineStageFlags2::COMPUTE_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER
            } else {
                vk::PipelineStageFlags2::COMPUTE_SHADER
            };
            compute_cmd.image_memory_barrier(
                vk::DependencyFlags::empty(),
                &[GfxImageBarrier::new()
                    .image(lut_image)
                    .layout_transfer(vk::ImageLayout::GENERAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .src_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_WRITE)
                    .dst_mask(dst_stage, vk::AccessFlags2::SHADER_READ)],
            );
        } else if !same_family {
            // 上一帧把所有权 release 给了 compute（graphics cmd 尾部），这里 acquire 回来
            let acquire = GfxImageBarrier::new()
                .image(lut_image)
                .layout_transfer(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::empty())
                .dst_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_READ)
                .queue_family_transfer(graphics_family, compute_family);
            compute_cmd.image_memory_barrier(vk::DependencyFlags::empty(), std::slice::from_ref(&acquire));
        }

        if !same_family {
            // compute→graphics 的 acquire 端；release 端在 end_frame 时录到
            // compute cmd 的尾部（必须排在所有 sky-view compute 之后）
            let acquire = Self::lut_transfer_barrier(lut_image, compute_family, graphics_family);
            graphics_cmd.image_memory_barrier(vk::DependencyFlags::empty(), std::slice::from_ref(&acquire));
        }
    }

    /// transmittance LUT 的 compute→graphics 所有权转移；
    /// release 和 acquire 两端用同一份参数
    fn lut_transfer_barrier(lut_image: vk::Image, compute_family: u32, graphics_family: u32) -> GfxImageBarrier {
        GfxImageBarrier::new()
            .image(lut_image)
            .layout_transfer(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_READ)
            .dst_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_READ)
            .queue_family_transfer(compute_family, graphics_family)
    }

    /// 把 swapchain 像素坐标的 region 转成 NDC quad 写进 staging
    fn push_region_quad(&mut self, region: vk::Rect2D, surface_extent: vk::Extent2D, slot: u32) -> QuadAlloc {
        let to_ndc_x = |x: f32| x / surface_extent.width as f32 * 2.0 - 1.0;
        let to_ndc_y = |y: f32| y / surface_extent.height as f32 * 2.0 - 1.0;

        let x0 = to_ndc_x(region.offset.x as f32);
        let y0 = to_ndc_y(region.offset.y as f32);
        let x1 = to_ndc_x((region.offset.x + region.extent.width as i32) as f32);
        let y1 = to_ndc_y((region.offset.y + region.extent.height as i32) as f32);

        let vertex = |pos: [f32; 2], uv: [f32; 2]| QuadVertex {
            pos,
            uv,
            slot,
            _padding: 0,
        };
        let vertices = [
            vertex([x0, y0], [0.0, 0.0]),
            vertex([x1, y0], [1.0, 0.0]),
            vertex([x0, y1], [0.0, 1.0]),
            vertex([x1, y1], [1.0, 1.0]),
        ];

        self.frame_ring.current_frame_mut().push_quad(&vertices)
    }

    /// flush staging → acquire swapchain image → 录制合成 → 提交 → present
    ///
    /// acquire 失败返回 Err 时尚未提交任何东西：rebuild_swapchain 后重试本方法。
    /// present 失败返回 Err 时本帧已提交完毕：rebuild 后直接进入下一帧即可
    pub fn end_frame(&mut self) -> Result<(), NeedsRecreate> {
        let frame = self.frame_ring.current_frame();
        frame.flush_staging();

        let image_index = {
            let swapchain = self.swapchain.as_mut().unwrap();
            swapchain.acquire_next_image(frame.image_acquired_semaphore(), u64::MAX)?
        };

        self.record_composite(image_index);

        let frame = self.frame_ring.current_frame();

        // 跨 family 时，所有 sky-view compute 都录完了，这里统一 release
        // transmittance 的所有权给 graphics，与 draw 时录下的 acquire 配对
        let graphics_family = self.gfx.graphics_queue_family();
        let compute_family = self.gfx.compute_queue_family();
        if graphics_family != compute_family {
            for scene_key in &self.scenes_seen {
                if let Some(scene) = self.arena.get(*scene_key) {
                    let release = Self::lut_transfer_barrier(scene.transmittance().image(), compute_family, graphics_family);
                    frame.compute_cmd().image_memory_barrier(vk::DependencyFlags::empty(), std::slice::from_ref(&release));
                }
            }
        }

        frame.compute_cmd().end();
        frame.graphics_cmd().end();

        // compute 先行：等上一帧 graphics 完成（LUT 的重写不能超过在途的采样），
        // signal 每个被 draw 的 view 的 render-complete semaphore
        let mut compute_submit = GfxSubmitInfo::new(std::slice::from_ref(frame.compute_cmd()))
            .signal(frame.compute_finished_semaphore(), vk::PipelineStageFlags2::ALL_COMMANDS);
        if let Some(prev) = &self.previous_graphics_finished {
            compute_submit = compute_submit.wait(prev, vk::PipelineStageFlags2::COMPUTE_SHADER);
        }
        for semaphore in &self.drawn_semaphores {
            compute_submit = compute_submit.signal(semaphore, vk::PipelineStageFlags2::COMPUTE_SHADER);
        }
        self.gfx.compute_queue.submit(vec![compute_submit], Some(frame.compute_fence()));

        // graphics 无条件等本帧 compute 完成 + image acquire，
        // 没有 draw 的帧也一样，保证帧间的 compute→graphics→compute 链不断开
        let mut graphics_submit = GfxSubmitInfo::new(std::slice::from_ref(frame.graphics_cmd()))
            .wait(frame.image_acquired_semaphore(), vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .wait(frame.compute_finished_semaphore(), vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .signal(frame.submit_semaphore(), vk::PipelineStageFlags2::ALL_COMMANDS)
            .signal(frame.graphics_finished_semaphore(), vk::PipelineStageFlags2::ALL_COMMANDS);
        for semaphore in &self.drawn_semaphores {
            graphics_submit = graphics_submit.wait(semaphore, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        }
        self.gfx.graphics_queue.submit(vec![graphics_submit], Some(frame.fence()));
        self.previous_graphics_finished = Some(frame.graphics_finished_semaphore().clone());

        let result = self
            .swapchain
            .as_ref()
            .unwrap()
            .present_image(&self.gfx.graphics_queue, std::slice::from_ref(frame.submit_semaphore()));

        self.seed = self.seed.wrapping_add(1);
        result
    }

    /// 录制合成 pass：每个登记的 quad 一次 indexed draw
    fn record_composite(&self, image_index: usize) {
        let label = self.frame_ring.current_label();
        let frame = self.frame_ring.current_frame();
        let cmd: &GfxCommandBuffer = frame.graphics_cmd();
        let swapchain = self.swapchain.as_ref().unwrap();
        let extent = swapchain.extent();

        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::new()
                .image(self.swapchain_images[image_index].handle())
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                .dst_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)],
        );

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.swapchain_views[image_index].handle())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 1.0] },
            });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));

        cmd.begin_rendering(&rendering_info);
        cmd.set_viewport(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });

        cmd.bind_graphics_pipeline(self.composite_pipeline);
        cmd.bind_graphics_descriptor_sets(self.composite_pipeline_layout, 0, &[self.bindless_sets[*label].handle()]);
        cmd.push_constants(
            self.composite_pipeline_layout,
            vk::ShaderStageFlags::FRAGMENT,
            0,
            bytemuck::bytes_of(&self.seed),
        );

        cmd.bind_vertex_buffers(0, &[frame.staging_buffer()], &[0]);
        cmd.bind_index_buffer(frame.staging_buffer(), frame.index_region_offset(), vk::IndexType::UINT32);
        for quad in &self.drawn_quads {
            cmd.draw_indexed(6, quad.first_index, quad.first_vertex as i32);
        }

        cmd.end_rendering();

        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::new()
                .image(self.swapchain_images[image_index].handle())
                .layout_transfer(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
                .src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                .dst_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::empty())],
        );

        // 跨 family 时把这一帧用过的 transmittance LUT release 给 compute，
        // 下一帧的 acquire 与之配对
        let graphics_family = self.gfx.graphics_queue_family();
        let compute_family = self.gfx.compute_queue_family();
        if graphics_family != compute_family {
            for scene_key in &self.scenes_seen {
                if let Some(scene) = self.arena.get(*scene_key) {
                    let release = GfxImageBarrier::new()
                        .image(scene.transmittance().image())
                        .layout_transfer(
                            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        )
                        .src_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::empty())
                        .dst_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_READ)
                        .queue_family_transfer(graphics_family, compute_family);
                    cmd.image_memory_barrier(vk::DependencyFlags::empty(), std::slice::from_ref(&release));
                }
            }
        }
    }

    /// swapchain 过期后的重建：等 device idle，销毁并重建 swapchain 及其包装
    pub fn rebuild_swapchain(&mut self, window_extent: vk::Extent2D) {
        self.gfx.device().wait_idle();

        for view in self.swapchain_views.drain(..) {
            view.destroy();
        }
        for image in self.swapchain_images.drain(..) {
            image.destroy();
        }

        let swapchain = self.swapchain.take().unwrap().recreate(
            &self.gfx,
            window_extent,
            DefaultRendererSettings::DEFAULT_PRESENT_MODE,
        );
        let (images, views) = Self::wrap_swapchain_images(&self.gfx, &swapchain);
        self.swapchain = Some(swapchain);
        self.swapchain_images = images;
        self.swapchain_views = views;
    }
}

// destroy
impl Renderer {
    /// 等 device idle 后自顶向下销毁，最后拆掉 Gfx；
    /// 调用方持有的 SceneView 必须先经 destroy_view 销毁
    pub fn destroy(mut self) {
        self.gfx.device().wait_idle();

        unsafe {
            self.gfx.device().destroy_pipeline(self.composite_pipeline, None);
            self.gfx.device().destroy_pipeline_layout(self.composite_pipeline_layout, None);
        }

        self.frame_ring.destroy();
        self.arena.destroy();

        // descriptor set 随 pool 释放，semaphore clone 随各自的 Frame 销毁；
        // 这里只是放掉它们持有的 device Rc，否则最后解不开
        self.bindless_sets.clear();
        self.drawn_semaphores.clear();
        self.previous_graphics_finished = None;

        for view in self.swapchain_views.drain(..) {
            view.destroy();
        }
        for image in self.swapchain_images.drain(..) {
            image.destroy();
        }
        self.swapchain.take().unwrap().destroy();

        self.bindless_pool.destroy();
        self.descriptor_pool.destroy();
        self.sampler_cache.destroy();
        self.layout_cache.destroy();

        // 派生资源都没了，最后拆掉设备上下文本身
        self.gfx.destroy();
    }
}
