use std::{ffi::CStr, ops::Deref, rc::Rc};

use ash::vk;

use crate::{
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, queue::GfxQueue},
    foundation::{
        debug_messenger::GfxDebugMessenger, device::GfxDevice, instance::GfxInstance,
        physical_device::GfxPhysicalDevice,
    },
};

/// VMA 分配器封装，和 device 一起共享给各种资源
pub struct GfxAllocator {
    allocator: vk_mem::Allocator,
}
impl GfxAllocator {
    pub fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice, device: &ash::Device) -> Self {
        let allocator_ci = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        let allocator = unsafe { vk_mem::Allocator::new(allocator_ci).unwrap() };
        Self { allocator }
    }
}
impl Deref for GfxAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.allocator
    }
}

/// 设备上下文：instance/device/queues/allocator 的唯一所有者
///
/// 生命周期和渲染器进程一致。Gfx 只需要做到能够创建各种资源的程度就行了，
/// 帧循环的编排在上层的 renderer 中。
pub struct Gfx {
    pub vk_pf: ash::Entry,
    instance: GfxInstance,
    debug_messenger: GfxDebugMessenger,
    physical_device: GfxPhysicalDevice,
    pub device: Rc<GfxDevice>,

    pub allocator: Rc<GfxAllocator>,

    pub graphics_queue: Rc<GfxQueue>,
    pub compute_queue: Rc<GfxQueue>,

    /// 初始化阶段的一次性命令使用这个 pool
    init_command_pool: Rc<GfxCommandPool>,
}

// init 相关
impl Gfx {
    const ENGINE_NAME: &'static str = "caelum";

    pub fn new(app_name: &str, instance_extra_exts: Vec<&'static CStr>) -> Self {
        let vk_pf = unsafe { ash::Entry::load() }.expect("failed to load vulkan entry");

        let instance = GfxInstance::new(&vk_pf, app_name, Self::ENGINE_NAME, instance_extra_exts);
        let debug_messenger = GfxDebugMessenger::new(&vk_pf, &instance.handle);

        let physical_device = GfxPhysicalDevice::new_discrete_gpu(&instance.handle);
        let device = Rc::new(GfxDevice::new(&instance.handle, &physical_device));

        let graphics_queue = Rc::new(GfxQueue::new(device.clone(), physical_device.graphics_queue_family, 0));
        let compute_queue = if physical_device.has_dedicated_compute() {
            Rc::new(GfxQueue::new(device.clone(), physical_device.compute_queue_family, 0))
        } else {
            graphics_queue.clone()
        };

        device.set_object_debug_name(graphics_queue.handle(), "main-graphics-queue");
        if physical_device.has_dedicated_compute() {
            device.set_object_debug_name(compute_queue.handle(), "main-compute-queue");
        }

        let allocator =
            Rc::new(GfxAllocator::new(&instance.handle, physical_device.handle, &device.device));

        let init_command_pool = Rc::new(GfxCommandPool::new(
            device.clone(),
            physical_device.graphics_queue_family,
            vk::CommandPoolCreateFlags::empty(),
            "gfx-init-command-pool",
        ));

        Self {
            vk_pf,
            instance,
            debug_messenger,
            physical_device,
            device,
            allocator,
            graphics_queue,
            compute_queue,
            init_command_pool,
        }
    }
}

// destroy
impl Gfx {
    /// 销毁整个设备上下文，进程退出前最后调用
    ///
    /// 所有派生资源（buffer/image/pool/frame 等）必须已先销毁，
    /// 否则 device/allocator 的 Rc 解不开，这里直接 panic
    pub fn destroy(self) {
        let Self {
            instance,
            debug_messenger,
            device,
            allocator,
            graphics_queue,
            compute_queue,
            init_command_pool,
            ..
        } = self;

        drop(compute_queue);
        drop(graphics_queue);
        Rc::try_unwrap(init_command_pool).ok().unwrap().destroy();

        // vk_mem 的 Allocator 在 Drop 里释放底层对象，必须先于 device 销毁
        drop(Rc::try_unwrap(allocator).ok().unwrap());

        Rc::try_unwrap(device).ok().unwrap().destroy();
        debug_messenger.destroy();
        instance.destroy();
    }
}

// 属性访问
impl Gfx {
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance.handle
    }

    #[inline]
    pub fn device(&self) -> &GfxDevice {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.physical_device
    }

    #[inline]
    pub fn graphics_queue_family(&self) -> u32 {
        self.physical_device.graphics_queue_family
    }

    #[inline]
    pub fn compute_queue_family(&self) -> u32 {
        self.physical_device.compute_queue_family
    }
}

// 工具方法
impl Gfx {
    /// 同步执行一段一次性的 GPU 命令，阻塞到队列空闲
    ///
    /// 只用于初始化阶段（layout 转换、大块数据上传），帧循环内禁止使用
    pub fn one_time_exec(&self, f: impl FnOnce(&GfxCommandBuffer), name: &str) {
        let cmd = GfxCommandBuffer::new(self.device.clone(), self.init_command_pool.clone(), name);

        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        f(&cmd);
        cmd.end();

        self.graphics_queue.submit_cmds(std::slice::from_ref(&cmd), None);
        self.graphics_queue.wait_idle();
        cmd.free();
    }
}
