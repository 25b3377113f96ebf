//! Off-screen render target
//!
//! A render target renders the scene from its own camera into a colour
//! texture that other materials can sample. It owns its framebuffer, colour
//! texture, depth renderbuffer and a private G-buffer; all of them are
//! reallocated together whenever the frame size changes.

use crate::foundation::collections::CameraId;
use crate::foundation::math::{Vec2, EPSILON};
use crate::render::camera::{Camera, CameraType};
use crate::render::camera_manager::CameraManager;
use crate::render::deferred::DeferredRenderingData;
use crate::render::device::{
    Attachment, FramebufferHandle, GraphicsDevice, RenderbufferFormat, RenderbufferHandle,
    TextureDescriptor, TextureFormat, TextureHandle,
};
use crate::render::RenderResult;

/// Frame size used when none is given
pub const DEFAULT_FRAME_SIZE: f32 = 1024.0;

/// Off-screen colour target with its own camera
#[derive(Debug)]
pub struct RenderTarget {
    camera: Option<CameraId>,
    framebuffer: Option<FramebufferHandle>,
    texture: Option<TextureHandle>,
    depth_renderbuffer: Option<RenderbufferHandle>,
    frame_size: Vec2,
    is_active: bool,
    rerender_shadow_maps: bool,
    deferred_rendering_data: DeferredRenderingData,
    is_initialized: bool,
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTarget {
    /// Render target that creates its own camera on `init`
    pub fn new() -> Self {
        Self {
            camera: None,
            framebuffer: None,
            texture: None,
            depth_renderbuffer: None,
            frame_size: Vec2::new(DEFAULT_FRAME_SIZE, DEFAULT_FRAME_SIZE),
            is_active: true,
            rerender_shadow_maps: false,
            deferred_rendering_data: DeferredRenderingData::default(),
            is_initialized: false,
        }
    }

    /// Render target viewing through an existing camera
    pub fn with_camera(camera: CameraId) -> Self {
        Self {
            camera: Some(camera),
            ..Self::new()
        }
    }

    /// Frame size in whole pixels
    pub fn pixel_size(&self) -> (u32, u32) {
        (to_pixels(self.frame_size.x), to_pixels(self.frame_size.y))
    }

    /// Create the camera if needed and allocate every GPU resource
    pub fn init(&mut self, device: &mut dyn GraphicsDevice, cameras: &mut CameraManager) -> RenderResult<()> {
        let (width, height) = self.pixel_size();

        let camera = match self.camera.filter(|id| cameras.does_camera_exist(*id)) {
            Some(camera) => camera,
            None => {
                let mut camera = Camera::new((width, height));
                camera.set_camera_type(CameraType::RenderTarget);
                let id = cameras.add_camera(camera);
                self.camera = Some(id);
                id
            }
        };
        self.apply_size_to_camera(cameras, camera);

        self.generate_buffers(device)?;

        self.deferred_rendering_data.geometry_buffer_mut().set_buffer_size(width, height);
        self.deferred_rendering_data.pre_init();
        self.deferred_rendering_data.init(device)?;

        self.is_initialized = true;
        log::debug!("Render target initialized at {}x{}", width, height);
        Ok(())
    }

    fn apply_size_to_camera(&self, cameras: &mut CameraManager, camera: CameraId) {
        let (width, height) = self.pixel_size();
        if let Some(camera) = cameras.camera_mut(camera) {
            camera.set_image_width(width);
            camera.set_image_height(height);
        }
    }

    /// Resize and reallocate; a no-op when the size is within epsilon
    ///
    /// On failure the previous size and buffers are restored and the error
    /// is returned.
    pub fn set_frame_size(&mut self, device: &mut dyn GraphicsDevice, cameras: &mut CameraManager, frame_size: Vec2) -> RenderResult<()> {
        if (self.frame_size - frame_size).magnitude() < EPSILON {
            return Ok(());
        }

        if self.is_initialized {
            let previous = self.frame_size;
            self.destroy_buffers(device);
            if let Err(e) = self.reallocate(device, frame_size) {
                log::warn!("Render target resize to {:?} failed, keeping {:?}: {}", frame_size, previous, e);
                self.destroy_buffers(device);
                self.reallocate(device, previous)?;
                return Err(e);
            }
        } else {
            self.frame_size = frame_size;
        }

        if let Some(camera) = self.camera {
            self.apply_size_to_camera(cameras, camera);
        }
        Ok(())
    }

    fn reallocate(&mut self, device: &mut dyn GraphicsDevice, frame_size: Vec2) -> RenderResult<()> {
        self.frame_size = frame_size;
        let (width, height) = self.pixel_size();
        self.deferred_rendering_data.on_viewport_size_changed(device, width, height)?;
        self.generate_buffers(device)
    }

    /// Create framebuffer, colour texture and depth renderbuffer
    ///
    /// The framebuffer is bound for configuration and unbound again on every
    /// path out of this function.
    pub fn generate_buffers(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let framebuffer = device.create_framebuffer()?;
        self.framebuffer = Some(framebuffer);

        device.bind_framebuffer(Some(framebuffer));
        let result = self.configure_attachments(device);
        device.bind_framebuffer(None);

        if let Err(e) = &result {
            log::error!("Render target buffer generation failed: {}", e);
            self.destroy_buffers(device);
        }
        result
    }

    fn configure_attachments(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let (width, height) = self.pixel_size();

        let texture = device.create_texture(&TextureDescriptor::render_target(
            "renderTargetTexture",
            width,
            height,
            TextureFormat::Rgb32F,
        ))?;
        self.texture = Some(texture);
        device.attach_texture(Attachment::Color(0), texture)?;
        device.set_draw_buffers(1)?;

        let depth = device.create_renderbuffer(RenderbufferFormat::Depth24Stencil8, width, height)?;
        self.depth_renderbuffer = Some(depth);
        device.attach_renderbuffer(Attachment::Depth, depth)?;

        device.check_framebuffer_status()
    }

    fn destroy_buffers(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(texture) = self.texture.take() {
            device.destroy_texture(texture);
        }
        if let Some(framebuffer) = self.framebuffer.take() {
            device.destroy_framebuffer(framebuffer);
        }
        if let Some(depth) = self.depth_renderbuffer.take() {
            device.destroy_renderbuffer(depth);
        }
    }

    /// Free texture, framebuffer, deferred data and depth buffer in that
    /// order, then the camera if it still exists
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice, cameras: &mut CameraManager) {
        if let Some(texture) = self.texture.take() {
            device.destroy_texture(texture);
        }
        if let Some(framebuffer) = self.framebuffer.take() {
            device.destroy_framebuffer(framebuffer);
        }
        self.deferred_rendering_data.destroy(device);
        if let Some(depth) = self.depth_renderbuffer.take() {
            device.destroy_renderbuffer(depth);
        }

        if let Some(camera) = self.camera.take() {
            if cameras.does_camera_exist(camera) {
                cameras.destroy_camera(camera);
            }
        }
        self.is_initialized = false;
    }

    /// Camera the target renders from
    pub fn camera(&self) -> Option<CameraId> {
        self.camera
    }

    /// Framebuffer, once generated
    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    /// Colour texture, once generated
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    /// Depth renderbuffer, once generated
    pub fn depth_renderbuffer(&self) -> Option<RenderbufferHandle> {
        self.depth_renderbuffer
    }

    /// Frame size
    pub fn frame_size(&self) -> Vec2 {
        self.frame_size
    }

    /// Whether the target renders each frame
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Enable or disable per-frame rendering
    pub fn set_is_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }

    /// Whether shadow maps are re-rendered from this target's camera
    pub fn rerender_shadow_maps(&self) -> bool {
        self.rerender_shadow_maps
    }

    /// Request shadow maps to be re-rendered for this target
    pub fn set_rerender_shadow_maps(&mut self, rerender: bool) {
        self.rerender_shadow_maps = rerender;
    }

    /// Private G-buffer and lighting data
    pub fn deferred_rendering_data(&self) -> &DeferredRenderingData {
        &self.deferred_rendering_data
    }

    /// Whether `init` has run
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_pixels(value: f32) -> u32 {
    value.round().max(0.0) as u32
}
