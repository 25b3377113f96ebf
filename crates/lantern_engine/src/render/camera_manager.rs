//! Camera registry
//!
//! Cameras created during a frame are queued and only become live at the next
//! frame boundary, when [`CameraManager::handle_newly_added_cameras`] runs.

use crate::foundation::collections::{CameraId, SlotMap};
use crate::render::camera::{Camera, CameraType};
use crate::render::window::WindowManager;

/// Owner of every camera plus the active-camera selection
#[derive(Debug, Default)]
pub struct CameraManager {
    cameras: SlotMap<CameraId, Camera>,
    live: Vec<CameraId>,
    pending: Vec<CameraId>,
    active_camera: Option<CameraId>,
}

impl CameraManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a camera; it becomes live at the next frame boundary
    pub fn add_camera(&mut self, camera: Camera) -> CameraId {
        let id = self.cameras.insert(camera);
        self.pending.push(id);
        log::trace!("Camera {:?} queued", id);
        id
    }

    /// Per-frame pre-initialization step
    pub fn pre_init(&mut self, window: &mut dyn WindowManager) {
        self.handle_newly_added_cameras(window);
    }

    /// Initialize queued cameras in insertion order and make them live
    ///
    /// The first Scene camera to arrive while no camera is active becomes the
    /// active camera.
    pub fn handle_newly_added_cameras(&mut self, window: &mut dyn WindowManager) {
        if self.pending.is_empty() {
            return;
        }

        for id in std::mem::take(&mut self.pending) {
            let Some(camera) = self.cameras.get_mut(id) else { continue };
            camera.init();
            let is_scene_camera = camera.camera_type() == CameraType::Scene;

            self.live.push(id);

            if self.active_camera.is_none() && is_scene_camera {
                self.set_active_camera(id, window);
            }
        }
    }

    /// Select the active camera and resize the viewport to its image
    pub fn set_active_camera(&mut self, id: CameraId, window: &mut dyn WindowManager) {
        let Some(camera) = self.cameras.get(id) else { return };
        window.update_viewport(camera.image_width(), camera.image_height());
        self.active_camera = Some(id);
        log::info!("Active camera set to {:?}", id);
    }

    /// Remove and free a camera
    ///
    /// Destroying the active camera leaves no active camera.
    pub fn destroy_camera(&mut self, id: CameraId) -> Option<Camera> {
        self.live.retain(|c| *c != id);
        self.pending.retain(|c| *c != id);
        if self.active_camera == Some(id) {
            self.active_camera = None;
            log::debug!("Active camera {:?} destroyed", id);
        }
        self.cameras.remove(id)
    }

    /// Whether the id refers to a camera owned by this manager
    pub fn does_camera_exist(&self, id: CameraId) -> bool {
        self.cameras.contains_key(id)
    }

    /// Whether the camera has been initialized and is live
    pub fn is_live(&self, id: CameraId) -> bool {
        self.live.contains(&id)
    }

    /// Camera by id
    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(id)
    }

    /// Mutable camera by id
    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.cameras.get_mut(id)
    }

    /// Active camera id
    pub fn active_camera_id(&self) -> Option<CameraId> {
        self.active_camera
    }

    /// Active camera
    pub fn active_camera(&self) -> Option<&Camera> {
        self.active_camera.and_then(|id| self.cameras.get(id))
    }

    /// Live cameras in the order they became live
    pub fn live_cameras(&self) -> &[CameraId] {
        &self.live
    }

    /// Number of cameras waiting for the next frame boundary
    pub fn pending_camera_count(&self) -> usize {
        self.pending.len()
    }

    /// Total number of cameras, live or pending
    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }
}
