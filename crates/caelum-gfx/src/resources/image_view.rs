use std::rc::Rc;

use ash::vk;

use crate::{
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    gfx::Gfx,
    resources::image::GfxImage,
};

pub struct GfxImageView {
    handle: vk::ImageView,

    device: Rc<GfxDevice>,
}

impl DebugType for GfxImageView {
    fn debug_type_name() -> &'static str {
        "GfxImageView"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// new & destroy
impl GfxImageView {
    pub fn new_2d(gfx: &Gfx, image: &GfxImage, aspect: vk::ImageAspectFlags, debug_name: &str) -> Self {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let handle = unsafe { gfx.device.create_image_view(&view_ci, None).unwrap() };

        let view = Self { handle, device: gfx.device.clone() };
        gfx.device.set_debug_name(&view, debug_name);
        view
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}

// getter
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }
}
