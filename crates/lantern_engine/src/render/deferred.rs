//! Geometry buffer and deferred lighting data
//!
//! The G-buffer is a framebuffer with five colour attachments (world
//! position, world normal, diffuse, specular, emissive) and a depth
//! renderbuffer. Opaque and masked geometry is rasterized into it; the
//! lighting composite then samples the five textures through their named
//! uniforms.

use crate::render::camera::CameraUniforms;
use crate::render::device::{
    Attachment, FramebufferHandle, GraphicsDevice, RenderbufferFormat, RenderbufferHandle,
    TextureDescriptor, TextureFormat, TextureHandle,
};
use crate::render::shader_names::geometry_buffer;
use crate::render::RenderResult;

/// Default G-buffer width
pub const DEFAULT_GBUFFER_WIDTH: u32 = 1920;

/// Default G-buffer height
pub const DEFAULT_GBUFFER_HEIGHT: u32 = 1080;

const ATTACHMENT_FORMATS: [TextureFormat; 5] = [
    TextureFormat::Rgb32F,
    TextureFormat::Rgb32F,
    TextureFormat::Rgba8,
    TextureFormat::Rgba8,
    TextureFormat::Rgb32F,
];

/// G-buffer framebuffer, textures and depth
#[derive(Debug)]
pub struct GeometryBufferData {
    framebuffer: Option<FramebufferHandle>,
    textures: Vec<TextureHandle>,
    depth_renderbuffer: Option<RenderbufferHandle>,
    width: u32,
    height: u32,
    is_initialized: bool,
}

impl Default for GeometryBufferData {
    fn default() -> Self {
        Self::new(DEFAULT_GBUFFER_WIDTH, DEFAULT_GBUFFER_HEIGHT)
    }
}

impl GeometryBufferData {
    /// Describe a G-buffer; nothing is allocated until [`init`](Self::init)
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            framebuffer: None,
            textures: Vec::new(),
            depth_renderbuffer: None,
            width,
            height,
            is_initialized: false,
        }
    }

    /// Set the size used by the next allocation
    pub fn set_buffer_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Allocate every GPU resource
    pub fn init(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.generate_buffers(device)?;
        self.is_initialized = true;
        Ok(())
    }

    /// Create framebuffer, textures and depth; the framebuffer is left unbound
    pub fn generate_buffers(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let framebuffer = device.create_framebuffer()?;
        self.framebuffer = Some(framebuffer);

        device.bind_framebuffer(Some(framebuffer));
        let result = self.configure_attachments(device);
        device.bind_framebuffer(None);

        match &result {
            Ok(()) => log::debug!("Geometry buffer generated at {}x{}", self.width, self.height),
            Err(e) => {
                log::error!("Geometry buffer generation failed: {}", e);
                self.destroy_buffers(device);
            }
        }
        result
    }

    fn configure_attachments(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        for (slot, (name, format)) in geometry_buffer::ALL.iter().zip(ATTACHMENT_FORMATS).enumerate() {
            let texture = device.create_texture(&TextureDescriptor::render_target(*name, self.width, self.height, format))?;
            self.textures.push(texture);
            device.attach_texture(Attachment::Color(u32::try_from(slot).unwrap_or(u32::MAX)), texture)?;
        }
        device.set_draw_buffers(u32::try_from(self.textures.len()).unwrap_or(u32::MAX))?;

        let depth = device.create_renderbuffer(RenderbufferFormat::Depth24Stencil8, self.width, self.height)?;
        self.depth_renderbuffer = Some(depth);
        device.attach_renderbuffer(Attachment::Depth, depth)?;

        device.check_framebuffer_status()
    }

    fn destroy_buffers(&mut self, device: &mut dyn GraphicsDevice) {
        for texture in self.textures.drain(..) {
            device.destroy_texture(texture);
        }
        if let Some(framebuffer) = self.framebuffer.take() {
            device.destroy_framebuffer(framebuffer);
        }
        if let Some(depth) = self.depth_renderbuffer.take() {
            device.destroy_renderbuffer(depth);
        }
    }

    /// Bind the G-buffer for geometry output
    pub fn bind(&self, device: &mut dyn GraphicsDevice) {
        if let Some(framebuffer) = self.framebuffer {
            device.bind_framebuffer(Some(framebuffer));
            device.set_viewport(self.width, self.height);
        }
    }

    /// Return output to the window
    pub fn unbind(&self, device: &mut dyn GraphicsDevice) {
        device.bind_framebuffer(None);
    }

    /// Copy G-buffer depth into `destination` and bind it, so forward
    /// geometry is depth-tested against the deferred scene
    pub fn bind_gbuffer_depth(&self, device: &mut dyn GraphicsDevice, destination: Option<FramebufferHandle>) {
        if let Some(framebuffer) = self.framebuffer {
            device.blit_depth(framebuffer, destination, self.width, self.height);
        }
        device.bind_framebuffer(destination);
    }

    /// Regenerate at a new size; a no-op when the size is unchanged
    pub fn on_viewport_size_changed(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        if self.width == width && self.height == height {
            return Ok(());
        }
        self.width = width;
        self.height = height;

        if self.is_initialized {
            self.destroy_buffers(device);
            self.generate_buffers(device)?;
        }
        Ok(())
    }

    /// Free every GPU resource
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.destroy_buffers(device);
        self.is_initialized = false;
    }

    /// Framebuffer, once generated
    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    /// Colour attachments in slot order
    pub fn textures(&self) -> &[TextureHandle] {
        &self.textures
    }

    /// Depth renderbuffer, once generated
    pub fn depth_renderbuffer(&self) -> Option<RenderbufferHandle> {
        self.depth_renderbuffer
    }

    /// Buffer width
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether `init` has run
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

/// G-buffer plus the lighting composite that consumes it
#[derive(Debug, Default)]
pub struct DeferredRenderingData {
    geometry_buffer: GeometryBufferData,
    is_pre_initialized: bool,
}

impl DeferredRenderingData {
    /// Deferred data with a G-buffer of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            geometry_buffer: GeometryBufferData::new(width, height),
            is_pre_initialized: false,
        }
    }

    /// First lifecycle stage; must precede [`init`](Self::init)
    pub fn pre_init(&mut self) {
        self.is_pre_initialized = true;
    }

    /// Allocate the G-buffer
    pub fn init(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        if !self.is_pre_initialized {
            self.pre_init();
        }
        self.geometry_buffer.init(device)
    }

    /// Route geometry output into the G-buffer
    pub fn bind_geometry_buffer(&self, device: &mut dyn GraphicsDevice) {
        self.geometry_buffer.bind(device);
    }

    /// Stop writing into the G-buffer
    pub fn unbind_geometry_buffer(&self, device: &mut dyn GraphicsDevice) {
        self.geometry_buffer.unbind(device);
    }

    /// Bind the five G-buffer textures to their sampler uniforms
    pub fn bind_geometry_buffer_textures(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        for (unit, (name, texture)) in geometry_buffer::ALL.iter().zip(self.geometry_buffer.textures()).enumerate() {
            device.bind_texture(u32::try_from(unit).unwrap_or(u32::MAX), name, *texture)?;
        }
        Ok(())
    }

    /// Lighting composite into the bound framebuffer
    pub fn render(&self, device: &mut dyn GraphicsDevice, camera: &CameraUniforms, light_count: usize) -> RenderResult<()> {
        self.bind_geometry_buffer_textures(device)?;
        device.draw_lighting_pass(camera, light_count)
    }

    /// Resize the G-buffer
    pub fn on_viewport_size_changed(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        self.geometry_buffer.on_viewport_size_changed(device, width, height)
    }

    /// Free the G-buffer
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.geometry_buffer.destroy(device);
    }

    /// The G-buffer
    pub fn geometry_buffer(&self) -> &GeometryBufferData {
        &self.geometry_buffer
    }

    /// Mutable G-buffer, for sizing before `init`
    pub fn geometry_buffer_mut(&mut self) -> &mut GeometryBufferData {
        &mut self.geometry_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::{DeviceCommand, HeadlessDevice};

    #[test]
    fn test_gbuffer_has_five_attachments_and_depth() {
        let mut device = HeadlessDevice::new();
        let mut gbuffer = GeometryBufferData::default();
        gbuffer.init(&mut device).unwrap();

        assert_eq!(gbuffer.textures().len(), 5);
        assert!(gbuffer.depth_renderbuffer().is_some());
        assert_eq!(device.texture(gbuffer.textures()[0]).unwrap().width, DEFAULT_GBUFFER_WIDTH);
        assert_eq!(device.texture(gbuffer.textures()[4]).unwrap().name, geometry_buffer::EMISSIVE);
        assert_eq!(device.bound_framebuffer(), None);
    }

    #[test]
    fn test_resize_regenerates_without_leaking() {
        let mut device = HeadlessDevice::new();
        let mut gbuffer = GeometryBufferData::new(64, 64);
        gbuffer.init(&mut device).unwrap();

        gbuffer.on_viewport_size_changed(&mut device, 64, 64).unwrap();
        assert_eq!(device.count_commands(|c| matches!(c, DeviceCommand::CreateFramebuffer(_))), 1);

        gbuffer.on_viewport_size_changed(&mut device, 128, 32).unwrap();
        assert_eq!(device.count_commands(|c| matches!(c, DeviceCommand::CreateFramebuffer(_))), 2);
        assert_eq!(device.live_texture_count(), 5);
        assert_eq!(device.live_framebuffer_count(), 1);
        assert_eq!(device.live_renderbuffer_count(), 1);
        assert_eq!(device.texture(gbuffer.textures()[2]).unwrap().height, 32);

        gbuffer.destroy(&mut device);
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_framebuffer_count(), 0);
        assert_eq!(device.live_renderbuffer_count(), 0);
    }

    #[test]
    fn test_lighting_binds_all_gbuffer_textures() {
        let mut device = HeadlessDevice::new();
        let mut deferred = DeferredRenderingData::new(32, 32);
        deferred.pre_init();
        deferred.init(&mut device).unwrap();
        device.clear_commands();

        let camera = crate::render::Camera::new((32, 32)).uniforms();
        deferred.render(&mut device, &camera, 2).unwrap();

        let bound: Vec<String> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::BindTexture(name, _) => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(bound, geometry_buffer::ALL.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        assert!(matches!(device.commands().last(), Some(DeviceCommand::LightingPass(None))));
    }
}
