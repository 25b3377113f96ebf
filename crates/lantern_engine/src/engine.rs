//! Core engine implementation

use thiserror::Error;

use crate::application::Application;
use crate::core::config::EngineConfig;
use crate::foundation::collections::{CameraId, ComponentId, MeshId, MeshInstanceId, ObjectId};
use crate::foundation::logging::{self, debug, info, warn};
use crate::foundation::time::Timer;
use crate::physics::{PhysicsError, PhysicsObject, PhysicsWorld};
use crate::render::{
    BlendModel, Camera, CameraManager, FrameStats, GraphicsDevice, HeadlessDevice, HeadlessWindow, MeshKind,
    RenderError, Renderer, WindowManager,
};
use crate::scene::{ComponentKind, DestroyedNodes, Scene, SceneError};

/// Main engine struct
///
/// Owns every registry and the two outside collaborators (GPU device and
/// window). Nothing is global; systems reach each other through the engine.
pub struct Engine {
    /// Objects and components
    pub scene: Scene,

    /// Cameras and the active camera
    pub cameras: CameraManager,

    /// Meshes, instances, render targets, lights
    pub renderer: Renderer,

    /// Physics objects and the simulation backend
    pub physics: PhysicsWorld,

    device: Box<dyn GraphicsDevice>,
    window: Box<dyn WindowManager>,
    timer: Timer,
    config: EngineConfig,
    last_frame: FrameStats,
    running: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("objects", &self.scene.object_count())
            .field("cameras", &self.cameras.camera_count())
            .field("physics", &self.physics)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine over the given device and window
    ///
    /// Installs the logger with the configured level unless one is already set.
    pub fn new(config: EngineConfig, device: Box<dyn GraphicsDevice>, window: Box<dyn WindowManager>) -> Result<Self, EngineError> {
        logging::init_with_level(&config.logging.level);
        info!("Initializing engine for '{}'...", window.title());

        let mut engine = Self {
            scene: Scene::new(),
            cameras: CameraManager::new(),
            renderer: Renderer::new(&config.renderer),
            physics: PhysicsWorld::new(&config.physics),
            device,
            window,
            timer: Timer::new(),
            config,
            last_frame: FrameStats::default(),
            running: true,
        };

        engine.renderer.pre_init(engine.window.window_size());
        engine
            .renderer
            .init(engine.device.as_mut())
            .map_err(|e| EngineError::InitializationFailed(format!("Renderer: {e}")))?;
        engine
            .renderer
            .post_init(engine.device.as_mut(), &mut engine.cameras)
            .map_err(|e| EngineError::InitializationFailed(format!("Renderer: {e}")))?;

        Ok(engine)
    }

    /// Engine without a GPU or OS window, sized and titled from the window config
    pub fn headless(config: EngineConfig) -> Result<Self, EngineError> {
        let window = HeadlessWindow::new(config.window.width, config.window.height).with_title(config.window.title.clone());
        Self::new(config, Box::new(HeadlessDevice::new()), Box::new(window))
    }

    /// Run the main loop until the window closes or [`Engine::quit`] is called
    pub fn run<T: Application>(&mut self, app: &mut T) -> Result<(), EngineError> {
        app.initialize(self)
            .map_err(|e| EngineError::ApplicationError(format!("App initialization: {e}")))?;

        info!("Starting main loop...");
        self.timer = Timer::new();

        while self.running {
            self.timer.update();
            let delta_time = self.timer.delta_time();

            app.update(self, delta_time)
                .map_err(|e| EngineError::ApplicationError(format!("App update: {e}")))?;

            self.tick_frame(delta_time)?;
        }

        app.cleanup(self);
        self.shutdown();

        info!("Engine shutdown complete");
        Ok(())
    }

    /// Run one frame
    ///
    /// Order: deferred camera and object additions, their lifecycle stages
    /// (physics bodies are created during init), component ticks and camera
    /// sync, physics, then rendering.
    pub fn tick_frame(&mut self, delta_time: f32) -> Result<FrameStats, EngineError> {
        self.window.poll_events();
        self.cameras.handle_newly_added_cameras(self.window.as_mut());

        self.initialize_pending_objects();
        self.renderer.post_init(self.device.as_mut(), &mut self.cameras)?;

        self.scene.tick(delta_time);
        self.sync_camera_components();

        self.physics.physics_tick(delta_time, &mut self.scene);

        let stats = self
            .renderer
            .render_current_frame(self.device.as_mut(), &self.cameras, &self.scene)?;
        self.last_frame = stats;

        if self.window.should_close() {
            self.running = false;
        }
        Ok(stats)
    }

    /// Run the lifecycle stages for objects created since the last frame
    ///
    /// Objects are processed in creation order and every stage completes
    /// for the whole batch before the next one starts.
    pub fn initialize_pending_objects(&mut self) {
        let batch = self.scene.take_pending();
        if batch.is_empty() {
            return;
        }
        self.scene.pre_init(&batch);
        self.scene.init(&batch);
        self.physics.init_objects(&self.scene, &batch.objects);
        self.scene.post_init(&batch);
        self.scene.begin_game(&batch);
        debug!("Initialized {} objects, {} components", batch.objects.len(), batch.components.len());
    }

    /// Copy camera components' world transforms into their cameras
    fn sync_camera_components(&mut self) {
        for (_, component) in self.scene.components() {
            let ComponentKind::Camera(camera_id) = component.kind() else { continue };
            if !component.is_active() {
                continue;
            }
            if let Some(camera) = self.cameras.camera_mut(*camera_id) {
                camera.set_transform(component.world_position(), component.world_forward_vector(), component.world_up_vector());
            }
        }
    }

    // ------------------------------------------------------------------
    // Component helpers
    // ------------------------------------------------------------------

    /// Attach a mesh instance to an object
    ///
    /// `None` if the object or mesh is unknown.
    pub fn add_mesh_component(
        &mut self,
        object: ObjectId,
        name: impl Into<String>,
        mesh: MeshId,
        blend_model: BlendModel,
    ) -> Option<(ComponentId, MeshInstanceId)> {
        let kind = self.renderer.mesh(mesh)?.kind;
        let component = self.scene.add_component(object, name, ComponentKind::Scene)?;

        let instance = match kind {
            MeshKind::Static => self.renderer.add_static_mesh_instance(mesh, component, blend_model),
            MeshKind::Skeletal => self.renderer.add_skeletal_mesh_instance(mesh, component, blend_model),
            MeshKind::Dynamic => self.renderer.add_dynamic_mesh_instance(mesh, component, blend_model),
        };
        let Some(instance) = instance else {
            self.scene.destroy_component(component);
            return None;
        };

        self.scene.set_component_kind(component, ComponentKind::Mesh(instance));
        Some((component, instance))
    }

    /// Attach a camera to an object; the camera follows the component
    pub fn add_camera_component(&mut self, object: ObjectId, name: impl Into<String>, camera: Camera) -> Option<(ComponentId, CameraId)> {
        self.scene.object(object)?;
        let camera = self.cameras.add_camera(camera);
        match self.scene.add_component(object, name, ComponentKind::Camera(camera)) {
            Some(component) => Some((component, camera)),
            None => {
                self.cameras.destroy_camera(camera);
                None
            }
        }
    }

    /// Register a physics object
    ///
    /// Objects that already went through init get their body immediately.
    pub fn add_physics_object(&mut self, physics_object: PhysicsObject) -> Result<(), EngineError> {
        let object = physics_object.object();
        self.physics.add_physics_object(physics_object);
        if self.scene.object(object).is_some_and(|o| o.is_initialized()) {
            self.physics.init_object(&self.scene, object)?;
        }
        Ok(())
    }

    /// Attach an object below another one; the child keeps its relative transform
    pub fn attach_object(&mut self, child: ObjectId, parent: ObjectId) -> Result<(), EngineError> {
        self.scene.set_object_parent(child, parent)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// Destroy an object, everything attached below it and every registry
    /// entry they own
    pub fn destroy_object(&mut self, object: ObjectId) -> DestroyedNodes {
        for dependent in self.scene.dependent_objects(object) {
            self.physics.destroy_object(dependent);
        }
        let destroyed = self.scene.destroy_object(object);
        self.unregister(&destroyed);
        destroyed
    }

    /// Destroy a component subtree and every registry entry it owns
    pub fn destroy_component(&mut self, component: ComponentId) -> DestroyedNodes {
        for dependent in self.scene.objects_rooted_under(component) {
            self.physics.destroy_object(dependent);
        }
        let destroyed = self.scene.destroy_component(component);
        self.unregister(&destroyed);
        destroyed
    }

    fn unregister(&mut self, destroyed: &DestroyedNodes) {
        for &object in &destroyed.objects {
            self.physics.destroy_object(object);
        }
        for (id, component) in &destroyed.components {
            self.physics.destroy_objects_using_component(*id);
            match component.kind() {
                ComponentKind::Mesh(instance) => {
                    self.renderer.remove_any_mesh_instance(*instance);
                }
                ComponentKind::Camera(camera) => {
                    self.cameras.destroy_camera(*camera);
                }
                ComponentKind::Scene | ComponentKind::Collision(_) => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Request engine shutdown
    pub fn quit(&mut self) {
        info!("Engine shutdown requested");
        self.running = false;
    }

    /// Whether the frame loop keeps going
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Statistics of the last rendered frame
    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    /// Configuration the engine was created with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Graphics device
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// Mutable graphics device
    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    /// Window collaborator
    pub fn window(&self) -> &dyn WindowManager {
        self.window.as_ref()
    }

    /// Make a live camera the active one
    pub fn set_active_camera(&mut self, camera: CameraId) {
        self.cameras.set_active_camera(camera, self.window.as_mut());
    }

    /// Resize the window-sized buffers
    pub fn on_viewport_size_changed(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        self.renderer.on_viewport_size_changed(self.device.as_mut(), width, height)?;
        Ok(())
    }

    /// Free every GPU and physics resource
    pub fn shutdown(&mut self) {
        self.physics.shutdown();
        self.renderer.shutdown(self.device.as_mut(), &mut self.cameras);
        if self.scene.object_count() > 0 {
            warn!("Engine shut down with {} live objects", self.scene.object_count());
        }
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Initialization error
    #[error("Engine initialization failed: {0}")]
    InitializationFailed(String),

    /// Rendering error
    #[error("Rendering error: {0}")]
    Render(#[from] RenderError),

    /// Physics error
    #[error("Physics error: {0}")]
    Physics(#[from] PhysicsError),

    /// Scene-graph error
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Application error
    #[error("Application error: {0}")]
    ApplicationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
