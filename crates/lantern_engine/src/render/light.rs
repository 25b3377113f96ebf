//! Scene lights and their shadow maps
//!
//! Shadow-casting lights own a depth-only framebuffer plus one depth texture
//! per shadow view (one for directional and spot lights, six cube faces for
//! point lights). Shadow resources are generated lazily the first frame a
//! light casts shadows and freed when it stops or is removed.

use crate::foundation::collections::{LightId, SlotMap};
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::render::device::{Attachment, FramebufferHandle, GraphicsDevice, TextureDescriptor, TextureFormat, TextureHandle};
use crate::render::shader_names;
use crate::render::RenderResult;

/// Default shadow map resolution
pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 1024;

const SHADOW_NEAR: f32 = 0.1;

/// Kind of light source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Parallel rays, e.g. the sun
    Directional,
    /// Omnidirectional point emitter
    Point,
    /// Cone-shaped emitter
    Spot,
}

impl LightType {
    /// Number of shadow views the light renders
    pub fn shadow_view_count(self) -> usize {
        match self {
            LightType::Directional | LightType::Spot => 1,
            LightType::Point => 6,
        }
    }

    fn shadow_map_uniform(self) -> &'static str {
        match self {
            LightType::Directional => shader_names::light::DIRECTIONAL_LIGHT_SHADOW_MAP,
            LightType::Point => shader_names::light::POINT_LIGHT_SHADOW_MAP,
            LightType::Spot => shader_names::light::SPOT_LIGHT_SHADOW_MAP,
        }
    }
}

#[derive(Debug)]
struct ShadowMap {
    framebuffer: FramebufferHandle,
    textures: Vec<TextureHandle>,
    size: u32,
}

/// A light source
#[derive(Debug)]
pub struct Light {
    light_type: LightType,
    position: Vec3,
    direction: Vec3,
    color: Vec3,
    intensity: f32,
    /// Radius of influence for point and spot lights, half extent of the
    /// shadow volume for directional lights
    range: f32,
    /// Half angle of a spot light cone in radians
    cone_angle: f32,
    is_casting_shadow: bool,
    /// `None` uses the manager's default resolution
    shadow_map_size: Option<u32>,
    shadow_map: Option<ShadowMap>,
}

impl Light {
    fn with_type(light_type: LightType, position: Vec3, direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            light_type,
            position,
            direction: direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::z()),
            color,
            intensity,
            range: 100.0,
            cone_angle: std::f32::consts::FRAC_PI_4,
            is_casting_shadow: false,
            shadow_map_size: None,
            shadow_map: None,
        }
    }

    /// Directional light shining along `direction`
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self::with_type(LightType::Directional, Vec3::zeros(), direction, color, intensity)
    }

    /// Point light at `position`
    pub fn point(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self::with_type(LightType::Point, position, -Vec3::z(), color, intensity)
    }

    /// Spot light at `position` pointing along `direction`
    pub fn spot(position: Vec3, direction: Vec3, cone_angle: f32, color: Vec3, intensity: f32) -> Self {
        let mut light = Self::with_type(LightType::Spot, position, direction, color, intensity);
        light.cone_angle = cone_angle;
        light
    }

    /// Enable shadow casting at the manager's default resolution
    pub fn casting_shadows(mut self) -> Self {
        self.is_casting_shadow = true;
        self
    }

    /// Enable shadow casting at the given resolution
    pub fn with_shadows(mut self, shadow_map_size: u32) -> Self {
        self.is_casting_shadow = true;
        self.shadow_map_size = Some(shadow_map_size);
        self
    }

    /// Builder variant of [`set_range`](Self::set_range)
    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self
    }

    /// Kind of light
    pub fn light_type(&self) -> LightType {
        self.light_type
    }

    /// World position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Move the light
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Unit direction the light shines along
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Set the direction; zero vectors are ignored
    pub fn set_direction(&mut self, direction: Vec3) {
        if let Some(direction) = direction.try_normalize(f32::EPSILON) {
            self.direction = direction;
        }
    }

    /// Linear RGB colour
    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Set the colour
    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
    }

    /// Brightness multiplier
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Set the brightness multiplier
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }

    /// Radius of influence
    pub fn range(&self) -> f32 {
        self.range
    }

    /// Set the radius of influence
    pub fn set_range(&mut self, range: f32) {
        self.range = range;
    }

    /// Spot cone half angle in radians
    pub fn cone_angle(&self) -> f32 {
        self.cone_angle
    }

    /// Whether the light renders shadow maps
    pub fn is_casting_shadow(&self) -> bool {
        self.is_casting_shadow
    }

    /// Toggle shadow casting; resources follow at the next
    /// [`LightManager::prepare_shadow_maps`]
    pub fn set_is_casting_shadow(&mut self, casting: bool) {
        self.is_casting_shadow = casting;
    }

    /// Shadow map resolution
    pub fn shadow_map_size(&self) -> Option<u32> {
        self.shadow_map_size
    }

    /// Change the shadow map resolution; takes effect at the next prepare
    pub fn set_shadow_map_size(&mut self, size: u32) {
        self.shadow_map_size = Some(size);
    }

    /// Whether shadow resources are currently allocated
    pub fn has_shadow_map(&self) -> bool {
        self.shadow_map.is_some()
    }

    /// Shadow depth textures, one per shadow view
    pub fn shadow_textures(&self) -> &[TextureHandle] {
        self.shadow_map.as_ref().map_or(&[], |shadow| shadow.textures.as_slice())
    }

    fn view_up(direction: Vec3) -> Vec3 {
        if direction.cross(&Vec3::z()).magnitude() < 1e-4 {
            Vec3::x()
        } else {
            Vec3::z()
        }
    }

    fn perspective(half_angle: f32, far: f32) -> Mat4 {
        let half = SHADOW_NEAR * half_angle.tan();
        Mat4::orthographic(-half, half, -half, half, SHADOW_NEAR, far)
            * Mat4::orthographic_to_perspective(SHADOW_NEAR, far)
    }

    /// View-projection matrices of every shadow view
    ///
    /// Directional lights look along their direction from `range` units
    /// behind the origin with an orthographic volume; spot lights use a
    /// perspective cone; point lights render the six axis-aligned cube faces
    /// in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn shadow_view_projections(&self) -> Vec<Mat4> {
        match self.light_type {
            LightType::Directional => {
                let eye = -self.direction * self.range;
                let view = Mat4::look_at(eye, eye + self.direction, Self::view_up(self.direction));
                let r = self.range;
                vec![Mat4::orthographic(-r, r, -r, r, SHADOW_NEAR, 2.0 * r) * view]
            }
            LightType::Spot => {
                let view = Mat4::look_at(self.position, self.position + self.direction, Self::view_up(self.direction));
                vec![Self::perspective(self.cone_angle, self.range) * view]
            }
            LightType::Point => {
                let projection = Self::perspective(std::f32::consts::FRAC_PI_4, self.range);
                [Vec3::x(), -Vec3::x(), Vec3::y(), -Vec3::y(), Vec3::z(), -Vec3::z()]
                    .into_iter()
                    .map(|face| projection * Mat4::look_at(self.position, self.position + face, Self::view_up(face)))
                    .collect()
            }
        }
    }
}

/// Owner of every light and its shadow resources
#[derive(Debug)]
pub struct LightManager {
    lights: SlotMap<LightId, Light>,
    default_shadow_map_size: u32,
}

impl Default for LightManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LightManager {
    /// Empty manager
    pub fn new() -> Self {
        Self::with_default_shadow_map_size(DEFAULT_SHADOW_MAP_SIZE)
    }

    /// Empty manager whose lights default to `size` shadow maps
    pub fn with_default_shadow_map_size(size: u32) -> Self {
        Self {
            lights: SlotMap::with_key(),
            default_shadow_map_size: size,
        }
    }

    /// Resolution used by lights without an explicit shadow map size
    pub fn default_shadow_map_size(&self) -> u32 {
        self.default_shadow_map_size
    }

    /// Register a light
    pub fn add_light(&mut self, light: Light) -> LightId {
        let id = self.lights.insert(light);
        log::debug!("Light {:?} added", id);
        id
    }

    /// Remove a light and free its shadow resources
    pub fn remove_light(&mut self, device: &mut dyn GraphicsDevice, id: LightId) -> Option<Light> {
        let mut light = self.lights.remove(id)?;
        Self::free_shadow_map(device, &mut light);
        Some(light)
    }

    /// Light by id
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    /// Mutable light by id
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id)
    }

    /// Every light
    pub fn lights(&self) -> impl Iterator<Item = (LightId, &Light)> {
        self.lights.iter()
    }

    /// Number of lights
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// Lights that currently own shadow maps
    pub fn shadow_casters(&self) -> Vec<LightId> {
        self.lights
            .iter()
            .filter(|(_, light)| light.is_casting_shadow && light.shadow_map.is_some())
            .map(|(id, _)| id)
            .collect()
    }

    /// Allocate shadow maps for new casters, reallocate resized ones and free
    /// those of lights that stopped casting
    pub fn prepare_shadow_maps(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        for (id, light) in self.lights.iter_mut() {
            let size = light.shadow_map_size.unwrap_or(self.default_shadow_map_size);
            let stale = light
                .shadow_map
                .as_ref()
                .is_some_and(|shadow| !light.is_casting_shadow || shadow.size != size);
            if stale {
                Self::free_shadow_map(device, light);
            }

            if light.is_casting_shadow && light.shadow_map.is_none() {
                light.shadow_map = Some(Self::generate_shadow_map(device, light, size)?);
                log::debug!("Shadow map generated for light {:?}", id);
            }
        }
        Ok(())
    }

    fn generate_shadow_map(device: &mut dyn GraphicsDevice, light: &Light, size: u32) -> RenderResult<ShadowMap> {
        let mut textures = Vec::with_capacity(light.light_type.shadow_view_count());
        for face in 0..light.light_type.shadow_view_count() {
            let name = format!("{}{}", light.light_type.shadow_map_uniform(), face);
            match device.create_texture(&TextureDescriptor::render_target(name, size, size, TextureFormat::Depth32F)) {
                Ok(texture) => textures.push(texture),
                Err(e) => {
                    for texture in textures {
                        device.destroy_texture(texture);
                    }
                    return Err(e);
                }
            }
        }

        let framebuffer = device.create_framebuffer()?;
        device.bind_framebuffer(Some(framebuffer));
        let result = device
            .attach_texture(Attachment::Depth, textures[0])
            .and_then(|()| device.set_draw_buffers(0))
            .and_then(|()| device.check_framebuffer_status());
        device.bind_framebuffer(None);

        match result {
            Ok(()) => Ok(ShadowMap { framebuffer, textures, size }),
            Err(e) => {
                device.destroy_framebuffer(framebuffer);
                for texture in textures {
                    device.destroy_texture(texture);
                }
                Err(e)
            }
        }
    }

    fn free_shadow_map(device: &mut dyn GraphicsDevice, light: &mut Light) {
        if let Some(shadow) = light.shadow_map.take() {
            device.destroy_framebuffer(shadow.framebuffer);
            for texture in shadow.textures {
                device.destroy_texture(texture);
            }
        }
    }

    /// Bind a light's shadow framebuffer for rendering shadow view `view`,
    /// clearing it; returns false when the light has no such view
    pub fn bind_shadow_view(&self, device: &mut dyn GraphicsDevice, id: LightId, view: usize) -> RenderResult<bool> {
        let Some(shadow) = self.lights.get(id).and_then(|light| light.shadow_map.as_ref()) else {
            return Ok(false);
        };
        let Some(&texture) = shadow.textures.get(view) else {
            return Ok(false);
        };

        device.bind_framebuffer(Some(shadow.framebuffer));
        device.attach_texture(Attachment::Depth, texture)?;
        device.set_viewport(shadow.size, shadow.size);
        device.clear([1.0; 4]);
        Ok(true)
    }

    /// Bind every shadow texture to its sampler uniform starting at texture
    /// unit `first_unit`; returns the next free unit
    ///
    /// Samplers are numbered per light type in registration order, so the
    /// second shadow-casting spot light binds `spotLightShadowMap1`. Point
    /// light faces occupy six consecutive indices.
    pub fn bind_shadow_textures(&self, device: &mut dyn GraphicsDevice, first_unit: u32) -> RenderResult<u32> {
        let mut unit = first_unit;
        let mut per_type = [0usize; 3];
        for light in self.lights.values() {
            let Some(shadow) = &light.shadow_map else { continue };
            let counter = &mut per_type[light.light_type as usize];
            for texture in &shadow.textures {
                let name = format!("{}{}", light.light_type.shadow_map_uniform(), counter);
                device.bind_texture(unit, &name, *texture)?;
                *counter += 1;
                unit += 1;
            }
        }
        Ok(unit)
    }

    /// Free every shadow map and forget all lights
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for light in self.lights.values_mut() {
            Self::free_shadow_map(device, light);
        }
        self.lights.clear();
    }
}
