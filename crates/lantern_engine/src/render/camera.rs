//! # Camera
//!
//! A camera stores an explicit orthonormal basis (forward, up and the
//! horizontal axis `left = forward × up`) together with a near-plane
//! rectangle. Projection is built as an orthographic matrix over that
//! rectangle, optionally multiplied by an orthographic-to-perspective
//! conversion matrix.
//!
//! ## Invariants
//! - The basis stays unit length and mutually orthogonal after every rotation
//! - Every mutator recomputes the matrices it affects before returning, so the
//!   view-projection matrix is never stale

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Mat4Ext, Quat, Unit, Vec2i, Vec3, Vec4};
use crate::scene::{Frustum, AABB};

/// Below this distance the look-at target would collapse onto the eye
const MIN_LOOK_DISTANCE: f32 = 0.001;

/// |forward · up| above this is treated as parallel during `init`
const PARALLEL_TOLERANCE: f32 = 1e-4;

/// Projection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraProjection {
    /// Orthographic projection over the near-plane rectangle
    #[default]
    Orthographic,
    /// Perspective projection through the near-plane rectangle
    Perspective,
}

/// What a camera renders for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraType {
    /// Main scene view; eligible to become the active camera
    #[default]
    Scene,
    /// Light-space camera for shadow maps
    Shadow,
    /// Camera owned by a render target
    RenderTarget,
}

/// Camera data laid out for a uniform buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniforms {
    /// View matrix (column-major)
    pub view: [[f32; 4]; 4],
    /// Projection matrix (column-major)
    pub projection: [[f32; 4]; 4],
    /// Projection · view (column-major)
    pub view_projection: [[f32; 4]; 4],
    /// Camera position, w = 1
    pub position: [f32; 4],
}

/// 3D camera with an explicit basis and a near-plane rectangle
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    left: Vec3,

    near_distance: f32,
    far_distance: f32,
    /// (left, right, bottom, top) of the near-plane rectangle
    near_plane: Vec4,

    projection: CameraProjection,
    camera_type: CameraType,

    projection_matrix: Mat4,
    view_matrix: Mat4,
    view_projection_matrix: Mat4,

    image_width: u32,
    image_height: u32,
}

fn rotate_vector(vector: Vec3, axis: Vec3, angle: f32) -> Vec3 {
    match Unit::try_new(axis, f32::EPSILON) {
        Some(axis) => Quat::from_axis_angle(&axis, angle) * vector,
        None => vector,
    }
}

fn normalize_or(vector: Vec3, fallback: Vec3) -> Vec3 {
    vector.try_normalize(f32::EPSILON).unwrap_or(fallback)
}

impl Camera {
    /// Create an orthographic camera sized to the window
    ///
    /// Looks down +X with +Z up.
    pub fn new(window_size: (u32, u32)) -> Self {
        let forward = Vec3::x();
        let up = Vec3::z();

        let mut camera = Self {
            position: Vec3::zeros(),
            forward,
            up,
            left: forward.cross(&up),
            near_distance: 1.0,
            far_distance: 1000.0,
            near_plane: Vec4::new(-0.5, 0.5, -0.28125, 0.28125),
            projection: CameraProjection::Orthographic,
            camera_type: CameraType::Scene,
            projection_matrix: Mat4::identity(),
            view_matrix: Mat4::identity(),
            view_projection_matrix: Mat4::identity(),
            image_width: window_size.0,
            image_height: window_size.1,
        };
        camera.update();
        camera
    }

    /// Create a perspective camera from an explicit basis
    ///
    /// `left` is derived as `forward × up`; the basis is orthonormalized by
    /// [`init`](Self::init).
    pub fn with_basis(window_size: (u32, u32), position: Vec3, forward: Vec3, up: Vec3) -> Self {
        let mut camera = Self::new(window_size);
        camera.position = position;
        camera.forward = forward;
        camera.up = up;
        camera.left = forward.cross(&up);
        camera.projection = CameraProjection::Perspective;
        camera.update();
        camera
    }

    /// Orthonormalize the basis by successive cross products and rebuild
    /// every matrix
    ///
    /// When forward and up are (nearly) parallel the world axis least aligned
    /// with forward stands in for up.
    pub fn init(&mut self) {
        self.rebuild_basis();
        self.update();
    }

    /// Forward keeps its direction; up and left are re-derived from it
    fn rebuild_basis(&mut self) {
        let forward = normalize_or(self.forward, Vec3::x());
        let mut up = normalize_or(self.up, Vec3::z());

        if forward.dot(&up).abs() >= 1.0 - PARALLEL_TOLERANCE {
            up = if forward.z.abs() < 0.9 { Vec3::z() } else { Vec3::x() };
            log::warn!("Camera forward {:?} is parallel to up; substituting {:?}", forward, up);
        }

        self.left = forward.cross(&up).normalize();
        self.up = self.left.cross(&forward).normalize();
        self.forward = self.up.cross(&self.left).normalize();
    }

    /// Recompute projection, view and view-projection
    pub fn update(&mut self) {
        self.update_projection_matrix();
        self.look_at();
    }

    fn orthonormalize(&mut self) {
        self.forward = normalize_or(self.forward, Vec3::x());
        self.left = normalize_or(self.forward.cross(&self.up), self.left);
        self.up = normalize_or(self.left.cross(&self.forward), self.up);
    }

    fn update_projection_matrix(&mut self) {
        let (l, r, b, t) = (self.near_plane.x, self.near_plane.y, self.near_plane.z, self.near_plane.w);
        self.projection_matrix = Mat4::orthographic(l, r, b, t, self.near_distance, self.far_distance);

        if self.projection == CameraProjection::Perspective {
            self.projection_matrix *= Mat4::orthographic_to_perspective(self.near_distance, self.far_distance);
        }

        self.update_view_projection_matrix();
    }

    fn look_at(&mut self) {
        let target = self.position + self.forward * self.near_distance.max(MIN_LOOK_DISTANCE);
        self.view_matrix = Mat4::look_at(self.position, target, self.up);
        self.update_view_projection_matrix();
    }

    fn update_view_projection_matrix(&mut self) {
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
    }

    // ------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------

    /// Move along the forward vector
    pub fn move_forward(&mut self, value: f32) {
        self.set_position(self.position + self.forward * value);
    }

    /// Move along the up vector
    pub fn move_upward(&mut self, value: f32) {
        self.set_position(self.position + self.up * value);
    }

    /// Move along the horizontal axis (`forward × up`, screen right)
    pub fn move_right(&mut self, value: f32) {
        self.set_position(self.position + self.left * value);
    }

    /// Rotate forward about up
    pub fn yaw(&mut self, angle: f32) {
        self.forward = rotate_vector(self.forward, self.up, angle);
        self.left = self.forward.cross(&self.up);
        self.orthonormalize();
        self.look_at();
    }

    /// Rotate forward about the horizontal axis
    pub fn pitch(&mut self, angle: f32) {
        self.forward = rotate_vector(self.forward, self.left, angle);
        self.up = self.left.cross(&self.forward);
        self.orthonormalize();
        self.look_at();
    }

    /// Rotate the horizontal axis about forward
    pub fn roll(&mut self, angle: f32) {
        self.left = rotate_vector(self.left, self.forward, angle);
        self.up = self.left.cross(&self.forward);
        self.orthonormalize();
        self.look_at();
    }

    /// Rotate the whole basis about an arbitrary axis
    pub fn rotate_about(&mut self, axis: Vec3, angle: f32) {
        if axis.magnitude_squared() <= f32::EPSILON {
            return;
        }
        let rotation = Mat4::rotation_about_axis(&axis, angle);
        self.left = rotation.transform_vector(&self.left);
        self.up = rotation.transform_vector(&self.up);
        self.forward = self.up.cross(&self.left);
        self.orthonormalize();
        self.look_at();
    }

    // ------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------

    /// Set the eye position
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
        self.look_at();
    }

    /// Set the forward vector; up and left are re-derived around it
    pub fn set_forward_vector(&mut self, forward: Vec3) {
        self.forward = normalize_or(forward, self.forward);
        self.rebuild_basis();
        self.look_at();
    }

    /// Set the up vector; it is projected off forward and left is re-derived
    pub fn set_up_vector(&mut self, up: Vec3) {
        self.up = normalize_or(up, self.up);
        self.rebuild_basis();
        self.look_at();
    }

    /// Place and orient the camera in one step, then orthonormalize
    pub fn set_transform(&mut self, position: Vec3, forward: Vec3, up: Vec3) {
        self.position = position;
        self.forward = forward;
        self.up = up;
        self.orthonormalize();
        self.look_at();
    }

    /// Set the near distance
    pub fn set_near_distance(&mut self, near: f32) {
        self.near_distance = near;
        self.update();
    }

    /// Set the far distance
    pub fn set_far_distance(&mut self, far: f32) {
        self.far_distance = far;
        self.update_projection_matrix();
    }

    /// Set the near-plane rectangle as (left, right, bottom, top)
    pub fn set_near_plane(&mut self, near_plane: Vec4) {
        self.near_plane = near_plane;
        self.update_projection_matrix();
    }

    /// Switch projection mode
    pub fn set_projection(&mut self, projection: CameraProjection) {
        self.projection = projection;
        self.update_projection_matrix();
    }

    /// Set the camera type
    pub fn set_camera_type(&mut self, camera_type: CameraType) {
        self.camera_type = camera_type;
    }

    /// Set the output image width in pixels
    pub fn set_image_width(&mut self, width: u32) {
        self.image_width = width;
    }

    /// Set the output image height in pixels
    pub fn set_image_height(&mut self, height: u32) {
        self.image_height = height;
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    /// Eye position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Forward vector
    pub fn forward_vector(&self) -> Vec3 {
        self.forward
    }

    /// Up vector
    pub fn up_vector(&self) -> Vec3 {
        self.up
    }

    /// Horizontal axis, `forward × up`
    pub fn left_vector(&self) -> Vec3 {
        self.left
    }

    /// Near distance
    pub fn near_distance(&self) -> f32 {
        self.near_distance
    }

    /// Far distance
    pub fn far_distance(&self) -> f32 {
        self.far_distance
    }

    /// Near-plane rectangle (left, right, bottom, top)
    pub fn near_plane(&self) -> Vec4 {
        self.near_plane
    }

    /// Projection mode
    pub fn projection(&self) -> CameraProjection {
        self.projection
    }

    /// Camera type
    pub fn camera_type(&self) -> CameraType {
        self.camera_type
    }

    /// Output image width
    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    /// Output image height
    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    /// Projection matrix
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    /// View matrix
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    /// Projection · view
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection_matrix
    }

    /// Matrices packed for upload
    pub fn uniforms(&self) -> CameraUniforms {
        CameraUniforms {
            view: self.view_matrix.into(),
            projection: self.projection_matrix.into(),
            view_projection: self.view_projection_matrix.into(),
            position: [self.position.x, self.position.y, self.position.z, 1.0],
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Project a world point to pixel coordinates (origin bottom-left)
    pub fn screen_position_of_world_position(&self, world_position: Vec3) -> Vec2i {
        let clip = self.view_projection_matrix * world_position.push(1.0);
        let ndc = if clip.w.abs() > f32::EPSILON { clip / clip.w } else { clip };
        let screen = ndc * 0.5 + Vec4::new(0.5, 0.5, 0.5, 0.0);

        Vec2i::new(
            (screen.x * self.image_width as f32) as i32,
            (screen.y * self.image_height as f32) as i32,
        )
    }

    /// World-space ray direction through the centre of a pixel
    ///
    /// Inverse of [`screen_position_of_world_position`](Self::screen_position_of_world_position):
    /// the pixel centre is located on the near-plane rectangle and the
    /// returned vector runs from the eye to that point (not normalized).
    pub fn world_direction_at_pixel(&self, pixel: Vec2i) -> Vec3 {
        let (l, r, b, t) = (self.near_plane.x, self.near_plane.y, self.near_plane.z, self.near_plane.w);
        let width = self.image_width.max(1) as f32;
        let height = self.image_height.max(1) as f32;

        let su = (r - l) * (pixel.x as f32 + 0.5) / width;
        let sv = (t - b) * (pixel.y as f32 + 0.5) / height;

        let near_center = self.position + self.forward * self.near_distance;
        let corner = near_center + self.left * l + self.up * b;
        let point = corner + self.left * su + self.up * sv;

        point - self.position
    }

    /// View frustum planes of the current view-projection
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&self.view_projection_matrix)
    }

    /// Whether a box (in local space, placed by `world_transformation`) is visible
    ///
    /// Culling is disabled: every box is reported visible.
    pub fn is_aabb_visible(&self, _aabb: &AABB, _world_transformation: &Mat4) -> bool {
        // TODO: test the transformed corners against self.frustum() once the
        // renderer tracks per-instance bounds
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Point3;
    use approx::assert_relative_eq;

    const WINDOW: (u32, u32) = (1600, 900);

    fn assert_orthonormal(camera: &Camera) {
        let (f, u, l) = (camera.forward_vector(), camera.up_vector(), camera.left_vector());
        assert_relative_eq!(f.magnitude(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(u.magnitude(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(l.magnitude(), 1.0, epsilon = 1e-4);
        assert!(f.dot(&u).abs() < 1e-4);
        assert!(f.dot(&l).abs() < 1e-4);
        assert!(u.dot(&l).abs() < 1e-4);
    }

    #[test]
    fn test_basis_setters_keep_basis_orthonormal() {
        let mut camera = Camera::with_basis(WINDOW, Vec3::zeros(), Vec3::x(), Vec3::z());

        camera.set_forward_vector(Vec3::new(1.0, 0.0, 1.0));
        assert_orthonormal(&camera);
        assert_relative_eq!(camera.forward_vector(), Vec3::new(1.0, 0.0, 1.0).normalize(), epsilon = 1e-5);
        assert_relative_eq!(camera.up_vector(), Vec3::new(-1.0, 0.0, 1.0).normalize(), epsilon = 1e-5);

        camera.set_up_vector(Vec3::z());
        assert_orthonormal(&camera);
        assert_relative_eq!(camera.forward_vector(), Vec3::new(1.0, 0.0, 1.0).normalize(), epsilon = 1e-5);

        // Up parallel to forward falls back to world up
        camera.set_up_vector(camera.forward_vector());
        assert_orthonormal(&camera);
        assert_relative_eq!(camera.up_vector(), Vec3::new(-1.0, 0.0, 1.0).normalize(), epsilon = 1e-5);

        let eye = camera.view_matrix().transform_vector(&camera.forward_vector());
        assert_relative_eq!(eye, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-4);
    }

    #[test]
    fn test_default_camera() {
        let camera = Camera::new(WINDOW);
        assert_eq!(camera.image_width(), 1600);
        assert_eq!(camera.image_height(), 900);
        assert_eq!(camera.projection(), CameraProjection::Orthographic);
        assert_eq!(camera.camera_type(), CameraType::Scene);
        assert_orthonormal(&camera);
    }

    #[test]
    fn test_look_at_scenario() {
        let mut camera = Camera::with_basis(
            WINDOW,
            Vec3::zeros(),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        camera.init();
        assert_eq!(camera.projection(), CameraProjection::Perspective);

        let near = camera.near_distance();
        let expected = Mat4::look_at_rh(
            &Point3::origin(),
            &Point3::new(0.0, 0.0, -near),
            &Vec3::new(0.0, 1.0, 0.0),
        );
        assert_relative_eq!(*camera.view_matrix(), expected, epsilon = 1e-5);
        assert_relative_eq!(
            *camera.view_projection_matrix(),
            camera.projection_matrix() * expected,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_init_orthonormalizes_skewed_basis() {
        let mut camera = Camera::with_basis(
            WINDOW,
            Vec3::zeros(),
            Vec3::new(1.0, 0.0, 0.3),
            Vec3::new(0.2, 0.0, 2.0),
        );
        camera.init();
        assert_orthonormal(&camera);
    }

    #[test]
    fn test_init_with_parallel_vectors() {
        let mut camera = Camera::with_basis(WINDOW, Vec3::zeros(), Vec3::z(), Vec3::z());
        camera.init();
        assert_orthonormal(&camera);
        assert!(camera.view_matrix().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_rotations_keep_basis_orthonormal() {
        let mut camera = Camera::with_basis(WINDOW, Vec3::zeros(), Vec3::x(), Vec3::z());
        camera.init();

        for step in 0..500 {
            let angle = 0.013 * (step % 7) as f32 + 0.001;
            match step % 4 {
                0 => camera.yaw(angle),
                1 => camera.pitch(-angle),
                2 => camera.roll(angle * 2.0),
                _ => camera.rotate_about(Vec3::new(1.0, 2.0, 3.0), angle),
            }
            assert_orthonormal(&camera);
        }
    }

    #[test]
    fn test_yaw_turns_about_up() {
        let mut camera = Camera::with_basis(WINDOW, Vec3::zeros(), Vec3::x(), Vec3::z());
        camera.init();

        camera.yaw(std::f32::consts::FRAC_PI_2);

        assert_relative_eq!(camera.forward_vector(), Vec3::y(), epsilon = 1e-5);
        assert_relative_eq!(camera.up_vector(), Vec3::z(), epsilon = 1e-5);
    }

    #[test]
    fn test_matrices_follow_every_mutation() {
        let mut camera = Camera::with_basis(WINDOW, Vec3::zeros(), Vec3::x(), Vec3::z());
        camera.init();

        camera.move_forward(2.0);
        let expected_view = Mat4::look_at(
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0 + camera.near_distance(), 0.0, 0.0),
            Vec3::z(),
        );
        assert_relative_eq!(*camera.view_matrix(), expected_view, epsilon = 1e-5);

        camera.set_far_distance(50.0);
        assert_relative_eq!(
            *camera.view_projection_matrix(),
            camera.projection_matrix() * camera.view_matrix(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_screen_position_of_point_ahead_is_centre() {
        let mut camera = Camera::with_basis(WINDOW, Vec3::zeros(), Vec3::x(), Vec3::z());
        camera.init();

        let screen = camera.screen_position_of_world_position(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(screen, Vec2i::new(800, 450));
    }

    #[test]
    fn test_direction_at_pixel_inverts_projection() {
        let mut camera = Camera::with_basis(WINDOW, Vec3::new(1.0, 2.0, 3.0), Vec3::x(), Vec3::z());
        camera.init();
        camera.yaw(0.3);

        let target = camera.position() + camera.forward_vector() * 20.0
            + camera.left_vector() * 3.0
            + camera.up_vector() * 1.5;
        let pixel = camera.screen_position_of_world_position(target);
        let direction = camera.world_direction_at_pixel(pixel).normalize();
        let expected = (target - camera.position()).normalize();

        assert!(direction.dot(&expected) > 0.999);
    }

    #[test]
    fn test_culling_is_disabled() {
        let camera = Camera::new(WINDOW);
        let far_away = AABB::from_center_extents(Vec3::new(-1.0e6, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(camera.is_aabb_visible(&far_away, &Mat4::identity()));
    }
}
