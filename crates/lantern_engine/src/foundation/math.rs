//! Math utilities and types
//!
//! Provides fundamental math types for the scene graph, cameras and renderer.
//! World space is right-handed and Z-up: a transform's local X axis is its
//! forward direction, Y is left and Z is up.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 2D integer vector type (pixel coordinates)
pub type Vec2i = Vector2<i32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Tolerance used for "did this value change" and near-parallel checks
pub const EPSILON: f32 = 1e-6;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Convert to a transformation matrix (T · R · S)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::transformation(&self.rotation, &self.position, &self.scale)
    }

    /// Create a transform from a transformation matrix
    ///
    /// Decomposes translation, per-axis scale and the remaining rotation.
    /// Degenerate (zero) scale axes fall back to the identity rotation.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let scale_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let scale_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let scale_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
        let scale = Vec3::new(scale_x, scale_y, scale_z);

        if scale_x < EPSILON || scale_y < EPSILON || scale_z < EPSILON {
            return Self {
                position,
                rotation: Quat::identity(),
                scale,
            };
        }

        let rotation_matrix = Matrix3::new(
            matrix.m11 / scale_x, matrix.m12 / scale_y, matrix.m13 / scale_z,
            matrix.m21 / scale_x, matrix.m22 / scale_y, matrix.m23 / scale_z,
            matrix.m31 / scale_x, matrix.m32 / scale_y, matrix.m33 / scale_z,
        );
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self {
            position,
            rotation,
            scale,
        }
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;
}

/// Math utility functions
pub mod utils {
    use super::{Mat4, Vec3};

    /// Column `index` of a 4x4 matrix as a 3D vector, normalized
    pub fn axis_of(matrix: &Mat4, index: usize) -> Vec3 {
        let column = Vec3::new(matrix[(0, index)], matrix[(1, index)], matrix[(2, index)]);
        let length = column.magnitude();
        if length > 0.0 {
            column / length
        } else {
            column
        }
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Translation matrix
    fn translation(offset: &Vec3) -> Mat4;

    /// T · R · S transformation matrix
    fn transformation(rotation: &Quat, position: &Vec3, scaling: &Vec3) -> Mat4;

    /// Rotation matrix about an arbitrary axis (the axis is normalized)
    fn rotation_about_axis(axis: &Vec3, angle: f32) -> Mat4;

    /// Orthographic projection from a near-plane rectangle and depth range
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Matrix converting an orthographic projection into a perspective one
    ///
    /// `orthographic(..) * orthographic_to_perspective(near, far)` equals the
    /// classic OpenGL frustum matrix.
    fn orthographic_to_perspective(near: f32, far: f32) -> Mat4;

    /// Create a look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn translation(offset: &Vec3) -> Mat4 {
        Mat4::new_translation(offset)
    }

    fn transformation(rotation: &Quat, position: &Vec3, scaling: &Vec3) -> Mat4 {
        Mat4::new_translation(position)
            * rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(scaling)
    }

    fn rotation_about_axis(axis: &Vec3, angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Unit::new_normalize(*axis), angle)
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new(
            2.0 / (right - left), 0.0, 0.0, -(right + left) / (right - left),
            0.0, 2.0 / (top - bottom), 0.0, -(top + bottom) / (top - bottom),
            0.0, 0.0, -2.0 / (far - near), -(far + near) / (far - near),
            0.0, 0.0, 0.0, 1.0,
        )
    }

    fn orthographic_to_perspective(near: f32, far: f32) -> Mat4 {
        Mat4::new(
            near, 0.0, 0.0, 0.0,
            0.0, near, 0.0, 0.0,
            0.0, 0.0, far + near, far * near,
            0.0, 0.0, -1.0, 0.0,
        )
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }
}
