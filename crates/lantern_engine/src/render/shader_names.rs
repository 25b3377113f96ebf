//! Shader attribute and uniform names the renderer binds against

/// Vertex attributes
pub mod vertex {
    /// Model-space position
    pub const POSITION: &str = "position";
    /// Normal
    pub const NORMAL: &str = "normal";
    /// Vertex colour
    pub const COLOR: &str = "color";
    /// Texture coordinates
    pub const UV: &str = "uv";
}

/// Transformation uniforms
pub mod positioning {
    /// Component-to-world matrix of the drawn instance
    pub const WORLD_TRANSFORMATION_MATRIX: &str = "worldTransformationMatrix";
    /// Projection · view of the rendering camera
    pub const VIEW_PROJECTION_MATRIX: &str = "viewProjectionMatrix";
    /// Eye position of the rendering camera
    pub const VIEW_POSITION: &str = "viewPosition";
}

/// G-buffer sampler uniforms, in attachment order
pub mod geometry_buffer {
    /// World-space position
    pub const WORLD_POSITION: &str = "worldPositionGBuffer";
    /// World-space normal
    pub const WORLD_NORMAL: &str = "worldNormalGBuffer";
    /// Diffuse colour
    pub const DIFFUSE: &str = "diffuseGBuffer";
    /// Specular colour and phong exponent
    pub const SPECULAR: &str = "specularPhongGBuffer";
    /// Emissive colour
    pub const EMISSIVE: &str = "emmisiveColorGBuffer";

    /// Every G-buffer sampler; index is the colour attachment slot
    pub const ALL: [&str; 5] = [WORLD_POSITION, WORLD_NORMAL, DIFFUSE, SPECULAR, EMISSIVE];
}

/// Light and shadow uniforms
pub mod light {
    /// Directional light shadow map sampler prefix
    pub const DIRECTIONAL_LIGHT_SHADOW_MAP: &str = "directionalLightShadowMap";
    /// Point light shadow map sampler prefix
    pub const POINT_LIGHT_SHADOW_MAP: &str = "pointLightShadowMap";
    /// Spot light shadow map sampler prefix
    pub const SPOT_LIGHT_SHADOW_MAP: &str = "spotLightShadowMap";
    /// Light view-projection matrix prefix
    pub const VIEW_MATRIX_PREFIX: &str = "viewMatrix";
}
