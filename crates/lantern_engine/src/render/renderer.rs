//! # Renderer
//!
//! Owns the mesh registry, every mesh instance, render targets, lights and
//! post-processing effects, and turns them into device commands each frame.
//!
//! Instances live in nine buckets, one per (mesh kind × blend model). An
//! instance id appears in exactly one bucket, the one matching its current
//! kind and blend model, for as long as it is registered.

use bytemuck::Zeroable;

use crate::core::config::RendererConfig;
use crate::foundation::collections::{CameraId, ComponentId, MeshId, MeshInstanceId, PostProcessId, RenderTargetId, SlotMap};
use crate::foundation::math::{Vec2, Vec3};
use crate::render::camera::{Camera, CameraUniforms};
use crate::render::camera_manager::CameraManager;
use crate::render::deferred::DeferredRenderingData;
use crate::render::device::{FramebufferHandle, GraphicsDevice};
use crate::render::light::LightManager;
use crate::render::mesh::{BlendModel, Mesh, MeshInstance, MeshKind, RegisteredMesh, Vertex};
use crate::render::render_target::RenderTarget;
use crate::render::shader_names::geometry_buffer;
use crate::render::{RenderError, RenderPassType, RenderResult};
use crate::scene::Scene;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Full-screen effect applied to the window image after the main pass
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessingEffect {
    /// Effect (and shader program) name
    pub name: String,

    /// Inactive effects keep their slot in the chain but are skipped
    pub is_active: bool,
}

impl PostProcessingEffect {
    /// Active effect with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_active: true,
        }
    }
}

/// Aggregate geometry size of one mesh kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshTotals {
    /// Registered meshes
    pub mesh_count: usize,
    /// Vertices across every registered mesh
    pub vertex_count: usize,
    /// Triangles across every registered mesh
    pub face_count: usize,
}

/// What a call to [`Renderer::render_current_frame`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// No active camera; nothing was drawn
    pub skipped: bool,
    /// Mesh draws issued across every pass
    pub draw_calls: usize,
    /// Shadow views rendered
    pub shadow_views: usize,
    /// Render targets rendered
    pub render_target_passes: usize,
    /// Instances drawn in the main pass, per blend model
    pub opaque_instances: usize,
    /// See `opaque_instances`
    pub masked_instances: usize,
    /// See `opaque_instances`
    pub transparent_instances: usize,
    /// Instances skipped because their component no longer exists
    pub stale_instances: usize,
    /// Post-processing effects applied
    pub post_processing_effects: usize,
}

impl FrameStats {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn count_main(&mut self, blend_model: BlendModel, drawn: usize) {
        match blend_model {
            BlendModel::Opaque => self.opaque_instances += drawn,
            BlendModel::Masked => self.masked_instances += drawn,
            BlendModel::Transparent => self.transparent_instances += drawn,
        }
    }
}

/// Where a pass draws and from which point of view
struct PassTarget<'a> {
    camera: &'a Camera,
    uniforms: CameraUniforms,
    framebuffer: Option<FramebufferHandle>,
    size: (u32, u32),
}

/// Deferred renderer
#[derive(Debug)]
pub struct Renderer {
    meshes: SlotMap<MeshId, RegisteredMesh>,
    mesh_totals: [MeshTotals; 3],
    needs_buffer_upload: bool,

    instances: SlotMap<MeshInstanceId, MeshInstance>,
    /// Indexed by `[MeshKind::index()][BlendModel::index()]`
    buckets: [[Vec<MeshInstanceId>; 3]; 3],

    deferred_rendering_data: DeferredRenderingData,

    render_targets: SlotMap<RenderTargetId, RenderTarget>,
    active_render_targets: Vec<RenderTargetId>,
    default_frame_size: Vec2,

    post_processing_effects: SlotMap<PostProcessId, PostProcessingEffect>,
    post_processing_order: Vec<PostProcessId>,

    main_render_type: RenderPassType,
    draw_on_window: bool,
    light_manager: LightManager,
    is_initialized: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(&RendererConfig::default())
    }
}

impl Renderer {
    /// Create a renderer; no GPU work happens until [`init`](Self::init)
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            meshes: SlotMap::with_key(),
            mesh_totals: [MeshTotals::default(); 3],
            needs_buffer_upload: false,
            instances: SlotMap::with_key(),
            buckets: Default::default(),
            deferred_rendering_data: DeferredRenderingData::default(),
            render_targets: SlotMap::with_key(),
            active_render_targets: Vec::new(),
            default_frame_size: Vec2::new(config.default_frame_size[0], config.default_frame_size[1]),
            post_processing_effects: SlotMap::with_key(),
            post_processing_order: Vec::new(),
            main_render_type: config.main_render_pass,
            draw_on_window: config.draw_on_window,
            light_manager: LightManager::with_default_shadow_map_size(config.shadow_map_size),
            is_initialized: false,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Size the shared G-buffer to the window
    pub fn pre_init(&mut self, window_size: (u32, u32)) {
        self.deferred_rendering_data
            .geometry_buffer_mut()
            .set_buffer_size(window_size.0, window_size.1);
        self.deferred_rendering_data.pre_init();
    }

    /// Upload registered meshes, allocate the G-buffer and shadow maps
    pub fn init(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.set_buffer_data(device)?;
        self.prepare_geometry_buffer(device, self.main_render_type)?;
        self.light_manager.prepare_shadow_maps(device)?;
        self.is_initialized = true;
        log::info!("Renderer initialized ({:?} main pass)", self.main_render_type);
        Ok(())
    }

    /// Initialize render targets created before the renderer was ready
    pub fn post_init(&mut self, device: &mut dyn GraphicsDevice, cameras: &mut CameraManager) -> RenderResult<()> {
        for target in self.render_targets.values_mut() {
            if !target.is_initialized() {
                target.init(device, cameras)?;
            }
        }
        Ok(())
    }

    /// Free every GPU resource the renderer owns
    pub fn shutdown(&mut self, device: &mut dyn GraphicsDevice, cameras: &mut CameraManager) {
        for (_, mut target) in self.render_targets.drain() {
            target.destroy(device, cameras);
        }
        self.active_render_targets.clear();
        self.deferred_rendering_data.destroy(device);
        self.light_manager.destroy(device);
        for mesh in self.meshes.values_mut() {
            if let Some(buffers) = mesh.buffers.take() {
                device.destroy_mesh(buffers);
            }
        }
        self.is_initialized = false;
        log::info!("Renderer shut down");
    }

    /// Whether `init` has completed
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    // ------------------------------------------------------------------
    // Mesh registry
    // ------------------------------------------------------------------

    fn add_mesh_to_renderer(&mut self, kind: MeshKind, mesh: Mesh) -> MeshId {
        let totals = &mut self.mesh_totals[kind.index()];
        totals.mesh_count += 1;
        totals.vertex_count += mesh.vertex_count();
        totals.face_count += mesh.face_count();

        self.needs_buffer_upload = true;
        let id = self.meshes.insert(RegisteredMesh {
            kind,
            mesh,
            buffers: None,
        });
        log::debug!("{:?} mesh {:?} registered", kind, id);
        id
    }

    /// Register immutable geometry
    pub fn add_static_mesh_to_renderer(&mut self, mesh: Mesh) -> MeshId {
        self.add_mesh_to_renderer(MeshKind::Static, mesh)
    }

    /// Register skinned geometry
    pub fn add_skeletal_mesh_to_renderer(&mut self, mesh: Mesh) -> MeshId {
        self.add_mesh_to_renderer(MeshKind::Skeletal, mesh)
    }

    /// Register CPU-updated geometry
    pub fn add_dynamic_mesh_to_renderer(&mut self, mesh: Mesh) -> MeshId {
        self.add_mesh_to_renderer(MeshKind::Dynamic, mesh)
    }

    /// Upload every registered mesh that has no GPU buffers yet
    pub fn set_buffer_data(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        for (id, registered) in self.meshes.iter_mut() {
            if registered.buffers.is_none() {
                registered.buffers = Some(device.upload_mesh(&registered.mesh.vertices, &registered.mesh.indices)?);
                log::trace!("Mesh {:?} uploaded", id);
            }
        }
        self.needs_buffer_upload = false;
        Ok(())
    }

    /// Overwrite one vertex of a dynamic mesh and re-upload it
    ///
    /// Static and skeletal meshes and out-of-range indices are ignored.
    pub fn update_dynamic_mesh_vertex(&mut self, device: &mut dyn GraphicsDevice, mesh: MeshId, index: usize, vertex: Vertex) -> RenderResult<()> {
        let Some(registered) = self.meshes.get_mut(mesh) else { return Ok(()) };
        if registered.kind != MeshKind::Dynamic {
            log::warn!("Vertex update on non-dynamic mesh {:?} ignored", mesh);
            return Ok(());
        }
        let Some(slot) = registered.mesh.vertices.get_mut(index) else { return Ok(()) };
        *slot = vertex;

        if let Some(buffers) = registered.buffers.take() {
            device.destroy_mesh(buffers);
            registered.buffers = Some(device.upload_mesh(&registered.mesh.vertices, &registered.mesh.indices)?);
        }
        Ok(())
    }

    /// Registered mesh by id
    pub fn mesh(&self, id: MeshId) -> Option<&RegisteredMesh> {
        self.meshes.get(id)
    }

    /// Aggregate counts of one mesh kind
    pub fn mesh_totals(&self, kind: MeshKind) -> MeshTotals {
        self.mesh_totals[kind.index()]
    }

    // ------------------------------------------------------------------
    // Mesh instances
    // ------------------------------------------------------------------

    fn add_mesh_instance(&mut self, kind: MeshKind, mesh: MeshId, component: ComponentId, blend_model: BlendModel) -> Option<MeshInstanceId> {
        let registered = self.meshes.get(mesh)?;
        if registered.kind != kind {
            log::warn!("Mesh {:?} is {:?}, not {:?}; instance not added", mesh, registered.kind, kind);
            return None;
        }

        let id = self.instances.insert(MeshInstance {
            mesh,
            kind,
            blend_model,
            component,
            casts_shadow: true,
        });
        self.buckets[kind.index()][blend_model.index()].push(id);
        log::trace!("{:?} mesh instance {:?} added to {:?} bucket", kind, id, blend_model);
        Some(id)
    }

    fn remove_mesh_instance(&mut self, kind: MeshKind, id: MeshInstanceId) -> Option<MeshInstance> {
        let instance = self.instances.get(id)?;
        if instance.kind != kind {
            return None;
        }

        let bucket = &mut self.buckets[kind.index()][instance.blend_model.index()];
        if let Some(position) = bucket.iter().position(|i| *i == id) {
            bucket.remove(position);
        }
        log::trace!("{:?} mesh instance {:?} removed", kind, id);
        self.instances.remove(id)
    }

    /// Place a static mesh at a component; `None` if the mesh is unknown or not static
    pub fn add_static_mesh_instance(&mut self, mesh: MeshId, component: ComponentId, blend_model: BlendModel) -> Option<MeshInstanceId> {
        self.add_mesh_instance(MeshKind::Static, mesh, component, blend_model)
    }

    /// Place a skeletal mesh at a component
    pub fn add_skeletal_mesh_instance(&mut self, mesh: MeshId, component: ComponentId, blend_model: BlendModel) -> Option<MeshInstanceId> {
        self.add_mesh_instance(MeshKind::Skeletal, mesh, component, blend_model)
    }

    /// Place a dynamic mesh at a component
    pub fn add_dynamic_mesh_instance(&mut self, mesh: MeshId, component: ComponentId, blend_model: BlendModel) -> Option<MeshInstanceId> {
        self.add_mesh_instance(MeshKind::Dynamic, mesh, component, blend_model)
    }

    /// Unregister a static instance; removing an absent instance does nothing
    pub fn remove_static_mesh_instance(&mut self, id: MeshInstanceId) -> Option<MeshInstance> {
        self.remove_mesh_instance(MeshKind::Static, id)
    }

    /// Unregister a skeletal instance
    pub fn remove_skeletal_mesh_instance(&mut self, id: MeshInstanceId) -> Option<MeshInstance> {
        self.remove_mesh_instance(MeshKind::Skeletal, id)
    }

    /// Unregister a dynamic instance
    pub fn remove_dynamic_mesh_instance(&mut self, id: MeshInstanceId) -> Option<MeshInstance> {
        self.remove_mesh_instance(MeshKind::Dynamic, id)
    }

    /// Unregister an instance of any kind
    pub fn remove_any_mesh_instance(&mut self, id: MeshInstanceId) -> Option<MeshInstance> {
        let kind = self.instances.get(id)?.kind;
        self.remove_mesh_instance(kind, id)
    }

    /// Move an instance to the bucket of another blend model
    pub fn set_mesh_instance_blend_model(&mut self, id: MeshInstanceId, blend_model: BlendModel) {
        let Some(instance) = self.instances.get_mut(id) else { return };
        if instance.blend_model == blend_model {
            return;
        }

        let kind = instance.kind.index();
        let previous = std::mem::replace(&mut instance.blend_model, blend_model);
        self.buckets[kind][previous.index()].retain(|i| *i != id);
        self.buckets[kind][blend_model.index()].push(id);
    }

    /// Include or exclude an instance from shadow passes
    pub fn set_mesh_instance_casts_shadow(&mut self, id: MeshInstanceId, casts_shadow: bool) {
        if let Some(instance) = self.instances.get_mut(id) {
            instance.casts_shadow = casts_shadow;
        }
    }

    /// Instance by id
    pub fn mesh_instance(&self, id: MeshInstanceId) -> Option<&MeshInstance> {
        self.instances.get(id)
    }

    /// Number of registered instances
    pub fn mesh_instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Instances filed under one (kind, blend model) bucket
    pub fn bucket(&self, kind: MeshKind, blend_model: BlendModel) -> &[MeshInstanceId] {
        &self.buckets[kind.index()][blend_model.index()]
    }

    // ------------------------------------------------------------------
    // Render targets
    // ------------------------------------------------------------------

    /// Create, initialize and activate a render target
    ///
    /// `camera` is used when given, otherwise the target creates its own.
    /// A `None` frame size uses the configured default.
    pub fn create_render_target(
        &mut self,
        device: &mut dyn GraphicsDevice,
        cameras: &mut CameraManager,
        frame_size: Option<Vec2>,
        camera: Option<CameraId>,
    ) -> RenderResult<RenderTargetId> {
        let mut target = match camera {
            Some(camera) => RenderTarget::with_camera(camera),
            None => RenderTarget::new(),
        };
        target.set_frame_size(device, cameras, frame_size.unwrap_or(self.default_frame_size))?;
        if self.is_initialized {
            target.init(device, cameras)?;
        }

        let id = self.render_targets.insert(target);
        self.add_render_target(id);
        Ok(id)
    }

    /// Add a render target to the per-frame list; already listed targets are ignored
    pub fn add_render_target(&mut self, id: RenderTargetId) {
        if self.render_targets.contains_key(id) && !self.active_render_targets.contains(&id) {
            self.active_render_targets.push(id);
        }
    }

    /// Stop rendering a target each frame; its resources stay allocated
    pub fn remove_render_target(&mut self, id: RenderTargetId) {
        self.active_render_targets.retain(|t| *t != id);
    }

    /// Free a render target and its camera
    pub fn destroy_render_target(&mut self, device: &mut dyn GraphicsDevice, cameras: &mut CameraManager, id: RenderTargetId) {
        self.remove_render_target(id);
        if let Some(mut target) = self.render_targets.remove(id) {
            target.destroy(device, cameras);
        }
    }

    /// Resize a render target
    pub fn set_render_target_frame_size(
        &mut self,
        device: &mut dyn GraphicsDevice,
        cameras: &mut CameraManager,
        id: RenderTargetId,
        frame_size: Vec2,
    ) -> RenderResult<()> {
        match self.render_targets.get_mut(id) {
            Some(target) => target.set_frame_size(device, cameras, frame_size),
            None => Ok(()),
        }
    }

    /// Render target by id
    pub fn render_target(&self, id: RenderTargetId) -> Option<&RenderTarget> {
        self.render_targets.get(id)
    }

    /// Mutable render target by id
    pub fn render_target_mut(&mut self, id: RenderTargetId) -> Option<&mut RenderTarget> {
        self.render_targets.get_mut(id)
    }

    /// Render targets drawn every frame, in order
    pub fn active_render_targets(&self) -> &[RenderTargetId] {
        &self.active_render_targets
    }

    // ------------------------------------------------------------------
    // Post-processing and settings
    // ------------------------------------------------------------------

    /// Append an effect to the post-processing chain
    pub fn add_post_processing_effect(&mut self, effect: PostProcessingEffect) -> PostProcessId {
        let id = self.post_processing_effects.insert(effect);
        self.post_processing_order.push(id);
        id
    }

    /// Remove an effect from the chain
    pub fn remove_post_processing_effect(&mut self, id: PostProcessId) -> Option<PostProcessingEffect> {
        self.post_processing_order.retain(|e| *e != id);
        self.post_processing_effects.remove(id)
    }

    /// Effect by id
    pub fn post_processing_effect_mut(&mut self, id: PostProcessId) -> Option<&mut PostProcessingEffect> {
        self.post_processing_effects.get_mut(id)
    }

    /// Names of the effects in application order
    pub fn post_processing_chain(&self) -> Vec<&str> {
        self.post_processing_order
            .iter()
            .filter_map(|id| self.post_processing_effects.get(*id))
            .map(|effect| effect.name.as_str())
            .collect()
    }

    /// Select the main pass type
    ///
    /// Switching to a G-buffer pass after `init` allocates the shared G-buffer.
    pub fn set_main_render_type(&mut self, device: &mut dyn GraphicsDevice, render_type: RenderPassType) -> RenderResult<()> {
        self.main_render_type = render_type;
        if self.is_initialized {
            self.prepare_geometry_buffer(device, render_type)?;
        }
        Ok(())
    }

    fn prepare_geometry_buffer(&mut self, device: &mut dyn GraphicsDevice, pass: RenderPassType) -> RenderResult<()> {
        let needs_gbuffer = matches!(pass, RenderPassType::Deferred | RenderPassType::GeometryBuffer);
        if needs_gbuffer && self.deferred_rendering_data.geometry_buffer().framebuffer().is_none() {
            self.deferred_rendering_data.init(device)?;
        }
        Ok(())
    }

    /// Main pass type
    pub fn main_render_type(&self) -> RenderPassType {
        self.main_render_type
    }

    /// Whether the main pass presents to the window
    pub fn set_draw_on_window(&mut self, draw_on_window: bool) {
        self.draw_on_window = draw_on_window;
    }

    /// See [`set_draw_on_window`](Self::set_draw_on_window)
    pub fn draw_on_window(&self) -> bool {
        self.draw_on_window
    }

    /// Lights and shadow maps
    pub fn light_manager(&self) -> &LightManager {
        &self.light_manager
    }

    /// Mutable lights and shadow maps
    pub fn light_manager_mut(&mut self) -> &mut LightManager {
        &mut self.light_manager
    }

    /// The window-sized G-buffer
    pub fn deferred_rendering_data(&self) -> &DeferredRenderingData {
        &self.deferred_rendering_data
    }

    /// Resize the shared G-buffer
    pub fn on_viewport_size_changed(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        self.deferred_rendering_data.on_viewport_size_changed(device, width, height)
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Render one frame from the active camera
    ///
    /// Shadow views first, then every active render target, then the main
    /// pass. Without an active camera the frame is skipped.
    pub fn render_current_frame(&mut self, device: &mut dyn GraphicsDevice, cameras: &CameraManager, scene: &Scene) -> RenderResult<FrameStats> {
        let Some(active_camera) = cameras.active_camera() else {
            log::trace!("No active camera; frame skipped");
            return Ok(FrameStats::skipped());
        };

        if self.needs_buffer_upload {
            self.set_buffer_data(device)?;
        }
        self.light_manager.prepare_shadow_maps(device)?;

        let mut stats = FrameStats::default();
        self.render_shadow_views(device, scene, &mut stats)?;

        for id in &self.active_render_targets {
            let Some(target) = self.render_targets.get(*id) else { continue };
            if !target.is_active() || !target.is_initialized() {
                continue;
            }
            let Some(camera) = target.camera().and_then(|c| cameras.camera(c)) else {
                log::warn!("Render target {:?} has no camera; skipped", id);
                continue;
            };

            let pass = PassTarget {
                camera,
                uniforms: camera.uniforms(),
                framebuffer: target.framebuffer(),
                size: target.pixel_size(),
            };
            self.render_deferred(device, scene, &pass, target.deferred_rendering_data(), &mut stats, false)?;
            stats.render_target_passes += 1;
        }

        let main = PassTarget {
            camera: active_camera,
            uniforms: active_camera.uniforms(),
            framebuffer: None,
            size: (active_camera.image_width(), active_camera.image_height()),
        };
        self.render_main(device, scene, &main, &mut stats)?;

        if self.draw_on_window {
            for id in &self.post_processing_order {
                let Some(effect) = self.post_processing_effects.get(*id) else { continue };
                if effect.is_active {
                    device.apply_post_process(&effect.name)?;
                    stats.post_processing_effects += 1;
                }
            }
            device.present()?;
        }

        Ok(stats)
    }

    /// Run one pass type from `camera` into the currently bound framebuffer
    ///
    /// Deferred and geometry-buffer passes go through the shared G-buffer.
    pub fn render(&mut self, device: &mut dyn GraphicsDevice, scene: &Scene, pass: RenderPassType, camera: &Camera) -> RenderResult<FrameStats> {
        let mut stats = FrameStats::default();
        match pass {
            RenderPassType::Shadow | RenderPassType::PointLightShadow => {
                self.light_manager.prepare_shadow_maps(device)?;
                self.render_shadow_views(device, scene, &mut stats)?;
            }
            _ => {
                self.prepare_geometry_buffer(device, pass)?;
                let target = PassTarget {
                    camera,
                    uniforms: camera.uniforms(),
                    framebuffer: device.bound_framebuffer(),
                    size: (camera.image_width(), camera.image_height()),
                };
                self.render_pass(device, scene, &target, pass, &mut stats)?;
            }
        }
        Ok(stats)
    }

    fn render_main(&self, device: &mut dyn GraphicsDevice, scene: &Scene, target: &PassTarget<'_>, stats: &mut FrameStats) -> RenderResult<()> {
        self.render_pass(device, scene, target, self.main_render_type, stats)
    }

    fn render_pass(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &Scene,
        target: &PassTarget<'_>,
        pass: RenderPassType,
        stats: &mut FrameStats,
    ) -> RenderResult<()> {
        match pass {
            RenderPassType::None | RenderPassType::Shadow | RenderPassType::PointLightShadow => Ok(()),
            RenderPassType::Forward => {
                device.bind_framebuffer(target.framebuffer);
                device.set_viewport(target.size.0, target.size.1);
                device.clear(CLEAR_COLOR);
                for blend_model in [BlendModel::Opaque, BlendModel::Masked] {
                    let drawn = self.draw_bucket_set(device, scene, blend_model, target.camera, &target.uniforms, stats)?;
                    stats.count_main(blend_model, drawn);
                }
                let drawn = self.draw_transparent(device, scene, target, stats)?;
                stats.count_main(BlendModel::Transparent, drawn);
                Ok(())
            }
            RenderPassType::GeometryBuffer => {
                self.fill_geometry_buffer(device, scene, target, &self.deferred_rendering_data, stats, true)?;
                self.deferred_rendering_data.unbind_geometry_buffer(device);
                Ok(())
            }
            RenderPassType::Deferred => self.render_deferred(device, scene, target, &self.deferred_rendering_data, stats, true),
        }
    }

    fn fill_geometry_buffer(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &Scene,
        target: &PassTarget<'_>,
        deferred: &DeferredRenderingData,
        stats: &mut FrameStats,
        is_main: bool,
    ) -> RenderResult<()> {
        if deferred.geometry_buffer().framebuffer().is_none() {
            return Err(RenderError::RenderingFailed("Geometry buffer is not allocated".to_string()));
        }
        deferred.bind_geometry_buffer(device);
        device.clear([0.0; 4]);
        for blend_model in [BlendModel::Opaque, BlendModel::Masked] {
            let drawn = self.draw_bucket_set(device, scene, blend_model, target.camera, &target.uniforms, stats)?;
            if is_main {
                stats.count_main(blend_model, drawn);
            }
        }
        Ok(())
    }

    /// G-buffer fill, lighting composite, depth copy, forward transparency
    fn render_deferred(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &Scene,
        target: &PassTarget<'_>,
        deferred: &DeferredRenderingData,
        stats: &mut FrameStats,
        is_main: bool,
    ) -> RenderResult<()> {
        self.fill_geometry_buffer(device, scene, target, deferred, stats, is_main)?;
        deferred.unbind_geometry_buffer(device);

        device.bind_framebuffer(target.framebuffer);
        device.set_viewport(target.size.0, target.size.1);
        device.clear(CLEAR_COLOR);

        let first_shadow_unit = u32::try_from(geometry_buffer::ALL.len()).unwrap_or(u32::MAX);
        self.light_manager.bind_shadow_textures(device, first_shadow_unit)?;
        deferred.render(device, &target.uniforms, self.light_manager.light_count())?;

        deferred.geometry_buffer().bind_gbuffer_depth(device, target.framebuffer);

        let drawn = self.draw_transparent(device, scene, target, stats)?;
        if is_main {
            stats.count_main(BlendModel::Transparent, drawn);
        }
        Ok(())
    }

    fn render_shadow_views(&self, device: &mut dyn GraphicsDevice, scene: &Scene, stats: &mut FrameStats) -> RenderResult<()> {
        for light_id in self.light_manager.shadow_casters() {
            let Some(light) = self.light_manager.light(light_id) else { continue };
            for (view, view_projection) in light.shadow_view_projections().into_iter().enumerate() {
                if !self.light_manager.bind_shadow_view(device, light_id, view)? {
                    continue;
                }
                let uniforms = CameraUniforms {
                    view_projection: view_projection.into(),
                    position: [light.position().x, light.position().y, light.position().z, 1.0],
                    ..CameraUniforms::zeroed()
                };
                for blend_model in [BlendModel::Opaque, BlendModel::Masked] {
                    self.draw_shadow_casters(device, scene, blend_model, &uniforms, stats)?;
                }
                stats.shadow_views += 1;
            }
        }
        device.bind_framebuffer(None);
        Ok(())
    }

    fn draw_shadow_casters(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &Scene,
        blend_model: BlendModel,
        uniforms: &CameraUniforms,
        stats: &mut FrameStats,
    ) -> RenderResult<()> {
        for kind in MeshKind::ALL {
            for id in &self.buckets[kind.index()][blend_model.index()] {
                let Some(instance) = self.instances.get(*id) else { continue };
                if !instance.casts_shadow {
                    continue;
                }
                self.draw_instance(device, scene, *id, instance, None, uniforms, stats)?;
            }
        }
        Ok(())
    }

    /// Draw one blend model across every mesh kind; returns the number drawn
    fn draw_bucket_set(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &Scene,
        blend_model: BlendModel,
        camera: &Camera,
        uniforms: &CameraUniforms,
        stats: &mut FrameStats,
    ) -> RenderResult<usize> {
        let mut drawn = 0;
        for kind in MeshKind::ALL {
            for id in &self.buckets[kind.index()][blend_model.index()] {
                let Some(instance) = self.instances.get(*id) else { continue };
                if self.draw_instance(device, scene, *id, instance, Some(camera), uniforms, stats)? {
                    drawn += 1;
                }
            }
        }
        Ok(drawn)
    }

    /// Transparent instances of every kind, farthest from the camera first
    fn draw_transparent(&self, device: &mut dyn GraphicsDevice, scene: &Scene, target: &PassTarget<'_>, stats: &mut FrameStats) -> RenderResult<usize> {
        let eye = target.camera.position();
        let mut sorted: Vec<(f32, MeshInstanceId)> = MeshKind::ALL
            .iter()
            .flat_map(|kind| self.buckets[kind.index()][BlendModel::Transparent.index()].iter())
            .filter_map(|id| {
                let instance = self.instances.get(*id)?;
                let position = scene.component(instance.component).map_or_else(Vec3::zeros, |c| c.world_position());
                Some(((position - eye).norm_squared(), *id))
            })
            .collect();
        sorted.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut drawn = 0;
        for (_, id) in sorted {
            let Some(instance) = self.instances.get(id) else { continue };
            if self.draw_instance(device, scene, id, instance, Some(target.camera), &target.uniforms, stats)? {
                drawn += 1;
            }
        }
        Ok(drawn)
    }

    /// Returns whether a draw was issued
    #[allow(clippy::too_many_arguments)]
    fn draw_instance(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &Scene,
        id: MeshInstanceId,
        instance: &MeshInstance,
        camera: Option<&Camera>,
        uniforms: &CameraUniforms,
        stats: &mut FrameStats,
    ) -> RenderResult<bool> {
        let Some(component) = scene.component(instance.component) else {
            log::warn!("Mesh instance {:?} refers to destroyed component {:?}; skipped", id, instance.component);
            stats.stale_instances += 1;
            return Ok(false);
        };
        if !component.is_active() {
            return Ok(false);
        }
        let Some(registered) = self.meshes.get(instance.mesh) else { return Ok(false) };
        let Some(buffers) = registered.buffers else { return Ok(false) };

        let world = component.component_to_world_matrix();
        if let Some(camera) = camera {
            if !camera.is_aabb_visible(&registered.mesh.aabb(), world) {
                return Ok(false);
            }
        }

        device.draw_mesh(buffers, world, uniforms)?;
        stats.draw_calls += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::device::{DeviceCommand, HeadlessDevice};
    use crate::render::light::Light;
    use crate::render::window::HeadlessWindow;
    use crate::scene::ComponentKind;

    fn assert_bucket_invariant(renderer: &Renderer) {
        let mut seen = 0;
        for kind in MeshKind::ALL {
            for blend_model in BlendModel::ALL {
                for id in renderer.bucket(kind, blend_model) {
                    let instance = renderer.mesh_instance(*id).unwrap();
                    assert_eq!(instance.kind, kind);
                    assert_eq!(instance.blend_model, blend_model);
                    seen += 1;
                }
            }
        }
        assert_eq!(seen, renderer.mesh_instance_count());
    }

    fn scene_with_components(count: usize) -> (Scene, Vec<ComponentId>) {
        let mut scene = Scene::new();
        let object = scene.create_object("props");
        let root = scene.object(object).unwrap().root_component();
        let mut components = vec![root];
        for i in 1..count {
            components.push(scene.add_component(object, format!("prop{i}"), ComponentKind::Scene).unwrap());
        }
        (scene, components)
    }

    fn position_of(commands: &[DeviceCommand], predicate: impl Fn(&DeviceCommand) -> bool) -> usize {
        commands.iter().position(predicate).unwrap()
    }

    fn active_camera(cameras: &mut CameraManager, position: Vec3) {
        let mut window = HeadlessWindow::new(320, 180);
        cameras.add_camera(Camera::with_basis((320, 180), position, Vec3::x(), Vec3::z()));
        cameras.handle_newly_added_cameras(&mut window);
    }

    #[test]
    fn test_bucket_invariant_through_adds_moves_and_removes() {
        let mut renderer = Renderer::default();
        let (_, components) = scene_with_components(3);
        let static_mesh = renderer.add_static_mesh_to_renderer(Mesh::cube());
        let dynamic_mesh = renderer.add_dynamic_mesh_to_renderer(Mesh::cube());

        let a = renderer.add_static_mesh_instance(static_mesh, components[0], BlendModel::Opaque).unwrap();
        let b = renderer.add_static_mesh_instance(static_mesh, components[1], BlendModel::Transparent).unwrap();
        let c = renderer.add_dynamic_mesh_instance(dynamic_mesh, components[2], BlendModel::Masked).unwrap();
        assert_bucket_invariant(&renderer);

        renderer.set_mesh_instance_blend_model(a, BlendModel::Masked);
        assert_eq!(renderer.bucket(MeshKind::Static, BlendModel::Masked), &[a]);
        assert!(renderer.bucket(MeshKind::Static, BlendModel::Opaque).is_empty());
        assert_bucket_invariant(&renderer);

        // Wrong-kind removal is a no-op, repeated removal is idempotent
        assert!(renderer.remove_static_mesh_instance(c).is_none());
        assert!(renderer.remove_static_mesh_instance(b).is_some());
        assert!(renderer.remove_static_mesh_instance(b).is_none());
        assert_bucket_invariant(&renderer);
        assert_eq!(renderer.mesh_instance_count(), 2);

        // Kind mismatch between mesh and instance is rejected
        assert!(renderer.add_skeletal_mesh_instance(static_mesh, components[0], BlendModel::Opaque).is_none());
    }

    #[test]
    fn test_mesh_totals_accumulate_per_kind() {
        let mut renderer = Renderer::default();
        renderer.add_static_mesh_to_renderer(Mesh::cube());
        renderer.add_static_mesh_to_renderer(Mesh::cube());
        renderer.add_skeletal_mesh_to_renderer(Mesh::cube());

        let totals = renderer.mesh_totals(MeshKind::Static);
        assert_eq!(totals.mesh_count, 2);
        assert_eq!(totals.vertex_count, 48);
        assert_eq!(totals.face_count, 24);
        assert_eq!(renderer.mesh_totals(MeshKind::Dynamic), MeshTotals::default());
    }

    #[test]
    fn test_frame_skipped_without_active_camera() {
        let mut device = HeadlessDevice::new();
        let cameras = CameraManager::new();
        let (scene, _) = scene_with_components(1);
        let mut renderer = Renderer::default();
        renderer.init(&mut device).unwrap();
        device.clear_commands();

        let stats = renderer.render_current_frame(&mut device, &cameras, &scene).unwrap();
        assert!(stats.skipped);
        assert!(device.commands().is_empty());
    }

    #[test]
    fn test_deferred_frame_order() {
        let mut device = HeadlessDevice::new();
        let mut cameras = CameraManager::new();
        active_camera(&mut cameras, Vec3::zeros());
        let (scene, components) = scene_with_components(2);

        let mut renderer = Renderer::default();
        renderer.pre_init((320, 180));
        let mesh = renderer.add_static_mesh_to_renderer(Mesh::cube());
        renderer.add_static_mesh_instance(mesh, components[0], BlendModel::Opaque).unwrap();
        renderer.add_static_mesh_instance(mesh, components[1], BlendModel::Transparent).unwrap();
        renderer.add_post_processing_effect(PostProcessingEffect::new("bloom"));
        renderer.add_post_processing_effect(PostProcessingEffect::new("tonemap"));
        renderer.init(&mut device).unwrap();
        device.clear_commands();

        let stats = renderer.render_current_frame(&mut device, &cameras, &scene).unwrap();
        assert_eq!(stats.opaque_instances, 1);
        assert_eq!(stats.transparent_instances, 1);
        assert_eq!(stats.post_processing_effects, 2);

        let gbuffer = renderer.deferred_rendering_data().geometry_buffer().framebuffer().unwrap();
        let commands = device.commands();

        let opaque_draw = position_of(commands, |c| matches!(c, DeviceCommand::DrawMesh(_, Some(fb)) if *fb == gbuffer));
        let lighting = position_of(commands, |c| matches!(c, DeviceCommand::LightingPass(None)));
        let blit = position_of(commands, |c| matches!(c, DeviceCommand::BlitDepth(src, None) if *src == gbuffer));
        let transparent_draw = position_of(commands, |c| matches!(c, DeviceCommand::DrawMesh(_, None)));
        let bloom = position_of(commands, |c| *c == DeviceCommand::PostProcess("bloom".to_string()));
        let tonemap = position_of(commands, |c| *c == DeviceCommand::PostProcess("tonemap".to_string()));
        let present = position_of(commands, |c| *c == DeviceCommand::Present);

        assert!(opaque_draw < lighting);
        assert!(lighting < blit);
        assert!(blit < transparent_draw);
        assert!(transparent_draw < bloom);
        assert!(bloom < tonemap);
        assert!(tonemap < present);
    }

    #[test]
    fn test_switching_to_deferred_allocates_geometry_buffer() {
        let mut device = HeadlessDevice::new();
        let mut cameras = CameraManager::new();
        active_camera(&mut cameras, Vec3::zeros());
        let (scene, components) = scene_with_components(1);

        let config = RendererConfig {
            main_render_pass: RenderPassType::Forward,
            ..RendererConfig::default()
        };
        let mut renderer = Renderer::new(&config);
        renderer.pre_init((320, 180));
        let mesh = renderer.add_static_mesh_to_renderer(Mesh::cube());
        renderer.add_static_mesh_instance(mesh, components[0], BlendModel::Opaque).unwrap();
        renderer.init(&mut device).unwrap();
        assert!(renderer.deferred_rendering_data().geometry_buffer().framebuffer().is_none());

        renderer.set_main_render_type(&mut device, RenderPassType::Deferred).unwrap();
        let gbuffer = renderer.deferred_rendering_data().geometry_buffer().framebuffer().unwrap();
        assert_eq!(renderer.deferred_rendering_data().geometry_buffer().width(), 320);

        device.clear_commands();
        let stats = renderer.render_current_frame(&mut device, &cameras, &scene).unwrap();
        assert_eq!(stats.opaque_instances, 1);

        let commands = device.commands();
        assert!(commands.iter().any(|c| matches!(c, DeviceCommand::DrawMesh(_, Some(fb)) if *fb == gbuffer)));
        assert!(!commands.iter().any(|c| matches!(c, DeviceCommand::DrawMesh(_, None))));
        assert_eq!(device.count_commands(|c| matches!(c, DeviceCommand::BindTexture(..))), 5);

        // Switching again reuses the buffer
        renderer.set_main_render_type(&mut device, RenderPassType::Forward).unwrap();
        renderer.set_main_render_type(&mut device, RenderPassType::Deferred).unwrap();
        assert_eq!(renderer.deferred_rendering_data().geometry_buffer().framebuffer(), Some(gbuffer));
    }

    #[test]
    fn test_transparent_instances_drawn_back_to_front() {
        let mut device = HeadlessDevice::new();
        let mut cameras = CameraManager::new();
        active_camera(&mut cameras, Vec3::zeros());
        let (mut scene, components) = scene_with_components(3);
        scene.set_relative_position(components[1], Vec3::new(5.0, 0.0, 0.0));
        scene.set_relative_position(components[2], Vec3::new(20.0, 0.0, 0.0));

        let mut renderer = Renderer::default();
        renderer.set_main_render_type(&mut device, RenderPassType::Forward).unwrap();
        let near_mesh = renderer.add_static_mesh_to_renderer(Mesh::cube());
        let far_mesh = renderer.add_dynamic_mesh_to_renderer(Mesh::cube());
        renderer.add_static_mesh_instance(near_mesh, components[1], BlendModel::Transparent).unwrap();
        renderer.add_dynamic_mesh_instance(far_mesh, components[2], BlendModel::Transparent).unwrap();
        renderer.init(&mut device).unwrap();
        device.clear_commands();

        renderer.render_current_frame(&mut device, &cameras, &scene).unwrap();

        let near_buffers = renderer.mesh(near_mesh).unwrap().buffers.unwrap();
        let far_buffers = renderer.mesh(far_mesh).unwrap().buffers.unwrap();
        let draws: Vec<_> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::DrawMesh(mesh, _) => Some(*mesh),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![far_buffers, near_buffers]);
    }

    #[test]
    fn test_stale_instances_are_skipped() {
        let mut device = HeadlessDevice::new();
        let mut cameras = CameraManager::new();
        active_camera(&mut cameras, Vec3::zeros());
        let (mut scene, components) = scene_with_components(2);

        let mut renderer = Renderer::default();
        let mesh = renderer.add_static_mesh_to_renderer(Mesh::cube());
        renderer.add_static_mesh_instance(mesh, components[1], BlendModel::Opaque).unwrap();
        renderer.init(&mut device).unwrap();

        scene.destroy_component(components[1]);
        let stats = renderer.render_current_frame(&mut device, &cameras, &scene).unwrap();
        assert_eq!(stats.stale_instances, 1);
        assert_eq!(stats.opaque_instances, 0);
    }

    #[test]
    fn test_shadow_and_render_target_passes() {
        let mut device = HeadlessDevice::new();
        let mut cameras = CameraManager::new();
        active_camera(&mut cameras, Vec3::zeros());
        let (scene, components) = scene_with_components(1);

        let mut renderer = Renderer::default();
        renderer.pre_init((320, 180));
        let mesh = renderer.add_static_mesh_to_renderer(Mesh::cube());
        let instance = renderer.add_static_mesh_instance(mesh, components[0], BlendModel::Opaque).unwrap();
        renderer.light_manager_mut().add_light(Light::point(Vec3::new(0.0, 0.0, 4.0), Vec3::new(1.0, 1.0, 1.0), 1.0).with_shadows(32));
        renderer.init(&mut device).unwrap();

        let target = renderer
            .create_render_target(&mut device, &mut cameras, Some(Vec2::new(64.0, 64.0)), None)
            .unwrap();
        let mut window = HeadlessWindow::new(320, 180);
        cameras.handle_newly_added_cameras(&mut window);

        let stats = renderer.render_current_frame(&mut device, &cameras, &scene).unwrap();
        assert_eq!(stats.shadow_views, 6);
        assert_eq!(stats.render_target_passes, 1);
        // 6 shadow draws, 1 render target draw, 1 main draw
        assert_eq!(stats.draw_calls, 8);

        renderer.set_mesh_instance_casts_shadow(instance, false);
        renderer.remove_render_target(target);
        let stats = renderer.render_current_frame(&mut device, &cameras, &scene).unwrap();
        assert_eq!(stats.render_target_passes, 0);
        assert_eq!(stats.draw_calls, 1);

        renderer.shutdown(&mut device, &mut cameras);
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_framebuffer_count(), 0);
        assert_eq!(device.live_renderbuffer_count(), 0);
        assert_eq!(device.live_mesh_count(), 0);
    }

    #[test]
    fn test_dynamic_vertex_update_reuploads() {
        let mut device = HeadlessDevice::new();
        let mut renderer = Renderer::default();
        let dynamic_mesh = renderer.add_dynamic_mesh_to_renderer(Mesh::cube());
        let static_mesh = renderer.add_static_mesh_to_renderer(Mesh::cube());
        renderer.set_buffer_data(&mut device).unwrap();
        let before = renderer.mesh(dynamic_mesh).unwrap().buffers;

        let vertex = Vertex::new([9.0, 9.0, 9.0], [0.0, 0.0, 1.0]);
        renderer.update_dynamic_mesh_vertex(&mut device, dynamic_mesh, 0, vertex).unwrap();
        renderer.update_dynamic_mesh_vertex(&mut device, static_mesh, 0, vertex).unwrap();

        assert_ne!(renderer.mesh(dynamic_mesh).unwrap().buffers, before);
        assert_eq!(renderer.mesh(dynamic_mesh).unwrap().mesh.vertices[0], vertex);
        assert_ne!(renderer.mesh(static_mesh).unwrap().mesh.vertices[0], vertex);
        assert_eq!(device.live_mesh_count(), 2);
    }
}
