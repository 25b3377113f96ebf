//! Graphics device abstraction
//!
//! [`GraphicsDevice`] is the synchronous GPU object API the renderer drives:
//! textures, framebuffers, renderbuffers, mesh buffers and draw submission.
//! GPU state is global: exactly one framebuffer is bound at a time and every
//! attach call targets it, so callers bracket configuration with
//! bind / unbind.
//!
//! [`HeadlessDevice`] implements the trait in memory. It tracks live
//! resources and records every call as a [`DeviceCommand`], which makes pass
//! ordering and resource lifetimes observable without a GPU.

use crate::foundation::collections::SlotMap;
use crate::foundation::math::Mat4;
use crate::render::camera::CameraUniforms;
use crate::render::mesh::Vertex;
use crate::render::{RenderError, RenderResult};

slotmap::new_key_type! {
    /// GPU texture
    pub struct TextureHandle;

    /// GPU framebuffer object
    pub struct FramebufferHandle;

    /// GPU renderbuffer object
    pub struct RenderbufferHandle;

    /// Uploaded vertex + index buffers
    pub struct MeshBufferHandle;
}

/// Texel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// Three 32-bit float channels
    Rgb32F,
    /// Four 32-bit float channels
    Rgba32F,
    /// Four 8-bit normalized channels
    Rgba8,
    /// 32-bit float depth
    Depth32F,
}

/// Sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
}

/// Renderbuffer storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderbufferFormat {
    /// 24-bit depth + 8-bit stencil
    Depth24Stencil8,
    /// 32-bit float depth
    Depth32F,
}

/// Framebuffer attachment point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Attachment {
    /// Colour attachment slot
    Color(u32),
    /// Depth attachment
    Depth,
    /// Combined depth-stencil attachment
    DepthStencil,
}

/// Texture creation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    /// Debug name, also the sampler uniform it is usually bound to
    pub name: String,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: TextureFormat,
    /// Min / mag filter
    pub filter: TextureFilter,
    /// Whether a mip chain is generated
    pub generate_mipmaps: bool,
}

impl TextureDescriptor {
    /// Render-target colour texture: nearest filtering, no mipmaps
    pub fn render_target(name: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
            filter: TextureFilter::Nearest,
            generate_mipmaps: false,
        }
    }
}

/// Synchronous GPU object API
pub trait GraphicsDevice {
    /// Allocate a texture
    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> RenderResult<TextureHandle>;

    /// Free a texture; stale handles are ignored
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Allocate an empty framebuffer
    fn create_framebuffer(&mut self) -> RenderResult<FramebufferHandle>;

    /// Free a framebuffer; unbinds it first if it is bound
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Allocate renderbuffer storage
    fn create_renderbuffer(&mut self, format: RenderbufferFormat, width: u32, height: u32) -> RenderResult<RenderbufferHandle>;

    /// Free a renderbuffer; stale handles are ignored
    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    /// Attach a texture to the bound framebuffer
    fn attach_texture(&mut self, attachment: Attachment, texture: TextureHandle) -> RenderResult<()>;

    /// Attach a renderbuffer to the bound framebuffer
    fn attach_renderbuffer(&mut self, attachment: Attachment, renderbuffer: RenderbufferHandle) -> RenderResult<()>;

    /// Enable colour attachments `0..count` of the bound framebuffer for writing
    fn set_draw_buffers(&mut self, count: u32) -> RenderResult<()>;

    /// Verify the bound framebuffer is complete
    fn check_framebuffer_status(&self) -> RenderResult<()>;

    /// Bind a framebuffer, `None` selects the window
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    /// Currently bound framebuffer, `None` for the window
    fn bound_framebuffer(&self) -> Option<FramebufferHandle>;

    /// Set the viewport size
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Clear colour and depth of the bound framebuffer
    fn clear(&mut self, color: [f32; 4]);

    /// Copy depth from `source` into `destination` (`None` = window)
    fn blit_depth(&mut self, source: FramebufferHandle, destination: Option<FramebufferHandle>, width: u32, height: u32);

    /// Bind a texture to a texture unit and the named sampler uniform
    fn bind_texture(&mut self, unit: u32, uniform: &str, texture: TextureHandle) -> RenderResult<()>;

    /// Upload mesh geometry
    fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> RenderResult<MeshBufferHandle>;

    /// Free uploaded geometry; stale handles are ignored
    fn destroy_mesh(&mut self, mesh: MeshBufferHandle);

    /// Draw uploaded geometry into the bound framebuffer
    fn draw_mesh(&mut self, mesh: MeshBufferHandle, world: &Mat4, camera: &CameraUniforms) -> RenderResult<()>;

    /// Run the full-screen lighting pass over the bound G-buffer textures
    fn draw_lighting_pass(&mut self, camera: &CameraUniforms, light_count: usize) -> RenderResult<()>;

    /// Apply a full-screen post-processing effect
    fn apply_post_process(&mut self, effect: &str) -> RenderResult<()>;

    /// Present the window framebuffer
    fn present(&mut self) -> RenderResult<()>;
}

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Texture allocated
    CreateTexture(TextureHandle),
    /// Texture freed
    DestroyTexture(TextureHandle),
    /// Framebuffer allocated
    CreateFramebuffer(FramebufferHandle),
    /// Framebuffer freed
    DestroyFramebuffer(FramebufferHandle),
    /// Renderbuffer allocated
    CreateRenderbuffer(RenderbufferHandle),
    /// Renderbuffer freed
    DestroyRenderbuffer(RenderbufferHandle),
    /// Texture attached to the bound framebuffer
    AttachTexture(Attachment, TextureHandle),
    /// Renderbuffer attached to the bound framebuffer
    AttachRenderbuffer(Attachment, RenderbufferHandle),
    /// Draw buffers enabled
    DrawBuffers(u32),
    /// Framebuffer bound (`None` = window)
    BindFramebuffer(Option<FramebufferHandle>),
    /// Viewport set
    Viewport(u32, u32),
    /// Bound framebuffer cleared
    Clear,
    /// Depth copied between framebuffers
    BlitDepth(FramebufferHandle, Option<FramebufferHandle>),
    /// Texture bound to a named sampler
    BindTexture(String, TextureHandle),
    /// Mesh uploaded
    UploadMesh(MeshBufferHandle),
    /// Mesh freed
    DestroyMesh(MeshBufferHandle),
    /// Mesh drawn into the given framebuffer
    DrawMesh(MeshBufferHandle, Option<FramebufferHandle>),
    /// Lighting composite drawn into the given framebuffer
    LightingPass(Option<FramebufferHandle>),
    /// Post-processing effect applied
    PostProcess(String),
    /// Frame presented
    Present,
}

#[derive(Debug, Default)]
struct FramebufferState {
    attachments: Vec<Attachment>,
    draw_buffers: u32,
}

#[derive(Debug, Clone, Copy)]
struct MeshBufferState {
    vertex_count: usize,
    index_count: usize,
}

/// In-memory graphics device
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    textures: SlotMap<TextureHandle, TextureDescriptor>,
    framebuffers: SlotMap<FramebufferHandle, FramebufferState>,
    renderbuffers: SlotMap<RenderbufferHandle, (RenderbufferFormat, u32, u32)>,
    meshes: SlotMap<MeshBufferHandle, MeshBufferState>,
    bound: Option<FramebufferHandle>,
    viewport: (u32, u32),
    commands: Vec<DeviceCommand>,
    draw_calls: usize,
    frames_presented: usize,
}

impl HeadlessDevice {
    /// Create a device with no resources
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, command: DeviceCommand) {
        log::trace!("{:?}", command);
        self.commands.push(command);
    }

    /// Every call recorded since creation or the last [`clear_commands`](Self::clear_commands)
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Forget recorded calls
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of recorded calls matching a predicate
    pub fn count_commands(&self, predicate: impl Fn(&DeviceCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    /// Descriptor of a live texture
    pub fn texture(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(texture)
    }

    /// Whether a framebuffer is live
    pub fn has_framebuffer(&self, framebuffer: FramebufferHandle) -> bool {
        self.framebuffers.contains_key(framebuffer)
    }

    /// Whether a renderbuffer is live
    pub fn has_renderbuffer(&self, renderbuffer: RenderbufferHandle) -> bool {
        self.renderbuffers.contains_key(renderbuffer)
    }

    /// Size of a live renderbuffer
    pub fn renderbuffer_size(&self, renderbuffer: RenderbufferHandle) -> Option<(u32, u32)> {
        self.renderbuffers.get(renderbuffer).map(|&(_, width, height)| (width, height))
    }

    /// Number of live textures
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of live framebuffers
    pub fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of live renderbuffers
    pub fn live_renderbuffer_count(&self) -> usize {
        self.renderbuffers.len()
    }

    /// Number of live mesh uploads
    pub fn live_mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Vertex and index counts of an upload
    pub fn mesh_sizes(&self, mesh: MeshBufferHandle) -> Option<(usize, usize)> {
        self.meshes.get(mesh).map(|m| (m.vertex_count, m.index_count))
    }

    /// Draw calls issued so far
    pub fn draw_call_count(&self) -> usize {
        self.draw_calls
    }

    /// Frames presented so far
    pub fn frames_presented(&self) -> usize {
        self.frames_presented
    }

    /// Current viewport
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn bound_state_mut(&mut self) -> RenderResult<&mut FramebufferState> {
        let bound = self
            .bound
            .ok_or_else(|| RenderError::RenderingFailed("No framebuffer bound".to_string()))?;
        self.framebuffers
            .get_mut(bound)
            .ok_or_else(|| RenderError::BackendError(format!("Bound framebuffer {bound:?} no longer exists")))
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> RenderResult<TextureHandle> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "Texture '{}' has zero size {}x{}",
                descriptor.name, descriptor.width, descriptor.height
            )));
        }
        let texture = self.textures.insert(descriptor.clone());
        self.record(DeviceCommand::CreateTexture(texture));
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(texture).is_some() {
            self.record(DeviceCommand::DestroyTexture(texture));
        }
    }

    fn create_framebuffer(&mut self) -> RenderResult<FramebufferHandle> {
        let framebuffer = self.framebuffers.insert(FramebufferState::default());
        self.record(DeviceCommand::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(framebuffer).is_some() {
            if self.bound == Some(framebuffer) {
                self.bound = None;
            }
            self.record(DeviceCommand::DestroyFramebuffer(framebuffer));
        }
    }

    fn create_renderbuffer(&mut self, format: RenderbufferFormat, width: u32, height: u32) -> RenderResult<RenderbufferHandle> {
        if width == 0 || height == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "Renderbuffer has zero size {width}x{height}"
            )));
        }
        let renderbuffer = self.renderbuffers.insert((format, width, height));
        self.record(DeviceCommand::CreateRenderbuffer(renderbuffer));
        Ok(renderbuffer)
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if self.renderbuffers.remove(renderbuffer).is_some() {
            self.record(DeviceCommand::DestroyRenderbuffer(renderbuffer));
        }
    }

    fn attach_texture(&mut self, attachment: Attachment, texture: TextureHandle) -> RenderResult<()> {
        if !self.textures.contains_key(texture) {
            return Err(RenderError::ResourceCreationFailed(format!("Unknown texture {texture:?}")));
        }
        let state = self.bound_state_mut()?;
        state.attachments.retain(|a| *a != attachment);
        state.attachments.push(attachment);
        self.record(DeviceCommand::AttachTexture(attachment, texture));
        Ok(())
    }

    fn attach_renderbuffer(&mut self, attachment: Attachment, renderbuffer: RenderbufferHandle) -> RenderResult<()> {
        if !self.renderbuffers.contains_key(renderbuffer) {
            return Err(RenderError::ResourceCreationFailed(format!("Unknown renderbuffer {renderbuffer:?}")));
        }
        let state = self.bound_state_mut()?;
        state.attachments.retain(|a| *a != attachment);
        state.attachments.push(attachment);
        self.record(DeviceCommand::AttachRenderbuffer(attachment, renderbuffer));
        Ok(())
    }

    fn set_draw_buffers(&mut self, count: u32) -> RenderResult<()> {
        let state = self.bound_state_mut()?;
        state.draw_buffers = count;
        self.record(DeviceCommand::DrawBuffers(count));
        Ok(())
    }

    fn check_framebuffer_status(&self) -> RenderResult<()> {
        let Some(bound) = self.bound else { return Ok(()) };
        let state = self
            .framebuffers
            .get(bound)
            .ok_or_else(|| RenderError::BackendError(format!("Bound framebuffer {bound:?} no longer exists")))?;

        let colors = state.attachments.iter().filter(|a| matches!(a, Attachment::Color(_))).count();
        let colors = u32::try_from(colors).unwrap_or(u32::MAX);
        if state.attachments.is_empty() || state.draw_buffers > colors {
            return Err(RenderError::ResourceCreationFailed(format!(
                "Framebuffer {bound:?} incomplete: {colors} colour attachments, {} draw buffers",
                state.draw_buffers
            )));
        }
        Ok(())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.bound = framebuffer;
        self.record(DeviceCommand::BindFramebuffer(framebuffer));
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.record(DeviceCommand::Viewport(width, height));
    }

    fn clear(&mut self, _color: [f32; 4]) {
        self.record(DeviceCommand::Clear);
    }

    fn blit_depth(&mut self, source: FramebufferHandle, destination: Option<FramebufferHandle>, _width: u32, _height: u32) {
        self.record(DeviceCommand::BlitDepth(source, destination));
    }

    fn bind_texture(&mut self, _unit: u32, uniform: &str, texture: TextureHandle) -> RenderResult<()> {
        if !self.textures.contains_key(texture) {
            return Err(RenderError::RenderingFailed(format!("Unknown texture {texture:?} for '{uniform}'")));
        }
        self.record(DeviceCommand::BindTexture(uniform.to_string(), texture));
        Ok(())
    }

    fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> RenderResult<MeshBufferHandle> {
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(RenderError::ResourceCreationFailed(format!(
                "Index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }
        let mesh = self.meshes.insert(MeshBufferState {
            vertex_count: vertices.len(),
            index_count: indices.len(),
        });
        self.record(DeviceCommand::UploadMesh(mesh));
        Ok(mesh)
    }

    fn destroy_mesh(&mut self, mesh: MeshBufferHandle) {
        if self.meshes.remove(mesh).is_some() {
            self.record(DeviceCommand::DestroyMesh(mesh));
        }
    }

    fn draw_mesh(&mut self, mesh: MeshBufferHandle, _world: &Mat4, _camera: &CameraUniforms) -> RenderResult<()> {
        if !self.meshes.contains_key(mesh) {
            return Err(RenderError::RenderingFailed(format!("Unknown mesh buffers {mesh:?}")));
        }
        self.draw_calls += 1;
        self.record(DeviceCommand::DrawMesh(mesh, self.bound));
        Ok(())
    }

    fn draw_lighting_pass(&mut self, _camera: &CameraUniforms, _light_count: usize) -> RenderResult<()> {
        self.draw_calls += 1;
        self.record(DeviceCommand::LightingPass(self.bound));
        Ok(())
    }

    fn apply_post_process(&mut self, effect: &str) -> RenderResult<()> {
        self.draw_calls += 1;
        self.record(DeviceCommand::PostProcess(effect.to_string()));
        Ok(())
    }

    fn present(&mut self) -> RenderResult<()> {
        self.frames_presented += 1;
        self.record(DeviceCommand::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_requires_bound_framebuffer() {
        let mut device = HeadlessDevice::new();
        let texture = device
            .create_texture(&TextureDescriptor::render_target("color", 4, 4, TextureFormat::Rgb32F))
            .unwrap();

        assert!(device.attach_texture(Attachment::Color(0), texture).is_err());

        let framebuffer = device.create_framebuffer().unwrap();
        device.bind_framebuffer(Some(framebuffer));
        device.attach_texture(Attachment::Color(0), texture).unwrap();
        device.set_draw_buffers(1).unwrap();
        assert!(device.check_framebuffer_status().is_ok());
    }

    #[test]
    fn test_incomplete_framebuffer_is_reported() {
        let mut device = HeadlessDevice::new();
        let framebuffer = device.create_framebuffer().unwrap();
        device.bind_framebuffer(Some(framebuffer));
        assert!(device.check_framebuffer_status().is_err());
    }

    #[test]
    fn test_destroying_bound_framebuffer_unbinds() {
        let mut device = HeadlessDevice::new();
        let framebuffer = device.create_framebuffer().unwrap();
        device.bind_framebuffer(Some(framebuffer));

        device.destroy_framebuffer(framebuffer);
        assert_eq!(device.bound_framebuffer(), None);
        assert_eq!(device.live_framebuffer_count(), 0);

        // Second destroy is ignored
        device.destroy_framebuffer(framebuffer);
        assert_eq!(device.count_commands(|c| matches!(c, DeviceCommand::DestroyFramebuffer(_))), 1);
    }

    #[test]
    fn test_zero_sized_resources_fail() {
        let mut device = HeadlessDevice::new();
        assert!(device
            .create_texture(&TextureDescriptor::render_target("empty", 0, 8, TextureFormat::Rgba8))
            .is_err());
        assert!(device.create_renderbuffer(RenderbufferFormat::Depth24Stencil8, 8, 0).is_err());
    }

    #[test]
    fn test_upload_validates_indices() {
        let mut device = HeadlessDevice::new();
        let vertices = [Vertex::new([0.0; 3], [0.0, 0.0, 1.0]); 3];
        assert!(device.upload_mesh(&vertices, &[0, 1, 3]).is_err());

        let mesh = device.upload_mesh(&vertices, &[0, 1, 2]).unwrap();
        assert_eq!(device.mesh_sizes(mesh), Some((3, 3)));
    }
}
