//! Collision filtering and shapes
//!
//! A physics object's [`CollisionGroup`] classifies it; its [`CollisionMask`]
//! selects which groups it interacts with. Two objects interact only when
//! each one's group is in the other's mask.

use bitflags::bitflags;

use crate::foundation::math::Vec3;

bitflags! {
    /// Category a physics object belongs to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CollisionGroup: u32 {
        /// Untyped objects
        const DEFAULT = 1 << 0;
        /// Moving objects that block
        const WORLD_DYNAMIC_BLOCK = 1 << 1;
        /// Moving objects that only report overlaps
        const WORLD_DYNAMIC_OVERLAP = 1 << 2;
        /// Static geometry that blocks
        const WORLD_STATIC_BLOCK = 1 << 3;
        /// Static trigger volumes
        const WORLD_STATIC_OVERLAP = 1 << 4;
        /// Player and AI characters
        const CHARACTER = 1 << 5;

        /// Every blocking group
        const ALL_BLOCK = Self::DEFAULT.bits()
            | Self::WORLD_DYNAMIC_BLOCK.bits()
            | Self::WORLD_STATIC_BLOCK.bits()
            | Self::CHARACTER.bits();
        /// Every overlapping group
        const ALL_OVERLAP = Self::WORLD_DYNAMIC_OVERLAP.bits() | Self::WORLD_STATIC_OVERLAP.bits();
    }
}

bitflags! {
    /// Groups a physics object interacts with; bits mirror [`CollisionGroup`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CollisionMask: u32 {
        /// Untyped objects
        const DEFAULT = CollisionGroup::DEFAULT.bits();
        /// Moving blockers
        const BLOCK_WORLD_DYNAMIC = CollisionGroup::WORLD_DYNAMIC_BLOCK.bits();
        /// Moving overlap volumes
        const OVERLAP_WORLD_DYNAMIC = CollisionGroup::WORLD_DYNAMIC_OVERLAP.bits();
        /// Static blockers
        const BLOCK_WORLD_STATIC = CollisionGroup::WORLD_STATIC_BLOCK.bits();
        /// Static overlap volumes
        const OVERLAP_WORLD_STATIC = CollisionGroup::WORLD_STATIC_OVERLAP.bits();
        /// Characters
        const CHARACTER = CollisionGroup::CHARACTER.bits();

        /// Every blocking group
        const BLOCK_ALL = CollisionGroup::ALL_BLOCK.bits();
        /// Every overlapping group
        const OVERLAP_ALL = CollisionGroup::ALL_OVERLAP.bits();
        /// Everything
        const BLOCK_AND_OVERLAP_ALL = Self::BLOCK_ALL.bits() | Self::OVERLAP_ALL.bits();
    }
}

impl From<CollisionGroup> for CollisionMask {
    fn from(group: CollisionGroup) -> Self {
        Self::from_bits_truncate(group.bits())
    }
}

/// Whether two objects interact: each group must be selected by the other's mask
pub fn should_collide(group_a: CollisionGroup, mask_a: CollisionMask, group_b: CollisionGroup, mask_b: CollisionMask) -> bool {
    mask_b.contains(CollisionMask::from(group_a)) && mask_a.contains(CollisionMask::from(group_b))
}

bitflags! {
    /// Simulation behaviour overrides
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollisionFlag: u32 {
        /// Never moves; infinite mass
        const STATIC_OBJECT = 1 << 0;
        /// Moved by the scene, pushes dynamic bodies
        const KINEMATIC_OBJECT = 1 << 1;
        /// Detects contacts without resolving them
        const NO_CONTACT_RESPONSE = 1 << 2;
        /// Upright body whose rotation is not simulated
        const CHARACTER_OBJECT = 1 << 4;
    }
}

/// Sleep / simulation state of a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActivationState {
    /// Simulated and allowed to fall asleep
    #[default]
    Active,
    /// Put to sleep now
    IslandSleeping,
    /// Allowed to fall asleep once at rest
    WantsDeactivation,
    /// Never falls asleep
    DisableDeactivation,
    /// Removed from simulation but still queryable
    DisableSimulation,
}

/// Collision shape carried by a collision component, in local space
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionShape {
    /// Axis-aligned box
    Box {
        /// Half size along each axis
        half_extents: Vec3,
    },
    /// Sphere
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Capsule along the Z (up) axis
    Capsule {
        /// Half length of the cylindrical part
        half_height: f32,
        /// Radius
        radius: f32,
    },
    /// Convex hull of a point cloud
    ConvexMesh {
        /// Hull points
        points: Vec<Vec3>,
    },
}

impl CollisionShape {
    /// Box shape from half extents
    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::Box { half_extents }
    }

    /// Shape scaled by a component's world scaling
    ///
    /// Round shapes take the largest axis so they stay round.
    pub fn scaled(&self, scale: Vec3) -> Self {
        let uniform = scale.x.abs().max(scale.y.abs()).max(scale.z.abs());
        match self {
            Self::Box { half_extents } => Self::Box {
                half_extents: half_extents.component_mul(&scale).abs(),
            },
            Self::Sphere { radius } => Self::Sphere { radius: radius * uniform },
            Self::Capsule { half_height, radius } => Self::Capsule {
                half_height: half_height * scale.z.abs(),
                radius: radius * scale.x.abs().max(scale.y.abs()),
            },
            Self::ConvexMesh { points } => Self::ConvexMesh {
                points: points.iter().map(|p| p.component_mul(&scale)).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_should_collide_is_mutual() {
        let arrow = (CollisionGroup::WORLD_DYNAMIC_BLOCK, CollisionMask::BLOCK_ALL);
        let wall = (CollisionGroup::WORLD_STATIC_BLOCK, CollisionMask::BLOCK_WORLD_DYNAMIC);
        let trigger = (CollisionGroup::WORLD_STATIC_OVERLAP, CollisionMask::CHARACTER);

        assert!(should_collide(arrow.0, arrow.1, wall.0, wall.1));
        // Arrow's mask does not select overlap volumes
        assert!(!should_collide(arrow.0, arrow.1, trigger.0, trigger.1));
    }

    #[test]
    fn test_mask_bits_mirror_groups() {
        assert_eq!(CollisionMask::from(CollisionGroup::CHARACTER), CollisionMask::CHARACTER);
        assert!(CollisionMask::BLOCK_AND_OVERLAP_ALL.contains(CollisionMask::from(CollisionGroup::WORLD_DYNAMIC_OVERLAP)));
        assert!(!CollisionMask::BLOCK_ALL.contains(CollisionMask::OVERLAP_WORLD_STATIC));
    }

    #[test]
    fn test_scaled_shapes() {
        let scale = Vec3::new(2.0, 3.0, 4.0);
        match CollisionShape::cuboid(Vec3::new(1.0, 1.0, 1.0)).scaled(scale) {
            CollisionShape::Box { half_extents } => assert_relative_eq!(half_extents, scale),
            other => panic!("unexpected shape {other:?}"),
        }
        assert_eq!(CollisionShape::Sphere { radius: 1.0 }.scaled(scale), CollisionShape::Sphere { radius: 4.0 });
    }
}
