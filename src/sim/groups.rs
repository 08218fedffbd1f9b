//! Collision group registry
//!
//! Five group flags plus the static allow-table that decides which groups
//! may generate contacts with each other. Every body-creation call site goes
//! through [`BodyFilter::for_group`], so changing [`CollisionGroup::mask`] is
//! the only way to alter cross-type interaction.

use bitflags::bitflags;

bitflags! {
    /// Collision group bit flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct CollisionGroup: u32 {
        const VEHICLE = 1 << 0;
        const POWER_UP = 1 << 1;
        const MINE = 1 << 2;
        const ENVIRONMENT = 1 << 3;
        const PROJECTILE = 1 << 4;
    }
}

impl CollisionGroup {
    /// Groups a body of this group is allowed to touch
    ///
    /// For a combined set the masks of every member are unioned.
    pub const fn mask(self) -> CollisionGroup {
        let mut mask = CollisionGroup::empty();
        if self.contains(CollisionGroup::VEHICLE) {
            mask = mask.union(
                CollisionGroup::POWER_UP
                    .union(CollisionGroup::MINE)
                    .union(CollisionGroup::ENVIRONMENT)
                    .union(CollisionGroup::PROJECTILE),
            );
        }
        if self.contains(CollisionGroup::POWER_UP) {
            // Static triggers: only vehicles may collect them
            mask = mask.union(CollisionGroup::VEHICLE);
        }
        if self.contains(CollisionGroup::MINE) {
            mask = mask.union(CollisionGroup::VEHICLE.union(CollisionGroup::ENVIRONMENT));
        }
        if self.contains(CollisionGroup::ENVIRONMENT) {
            mask = mask.union(
                CollisionGroup::VEHICLE
                    .union(CollisionGroup::MINE)
                    .union(CollisionGroup::PROJECTILE),
            );
        }
        if self.contains(CollisionGroup::PROJECTILE) {
            mask = mask.union(CollisionGroup::VEHICLE.union(CollisionGroup::ENVIRONMENT));
        }
        mask
    }

    /// Human-readable name of a single-flag group
    pub fn name(self) -> &'static str {
        if self == CollisionGroup::VEHICLE {
            "vehicle"
        } else if self == CollisionGroup::POWER_UP {
            "power-up"
        } else if self == CollisionGroup::MINE {
            "mine"
        } else if self == CollisionGroup::ENVIRONMENT {
            "environment"
        } else if self == CollisionGroup::PROJECTILE {
            "projectile"
        } else {
            "mixed"
        }
    }
}

/// Group/mask pair assigned to a body at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyFilter {
    pub group: CollisionGroup,
    pub mask: CollisionGroup,
}

impl BodyFilter {
    /// Filter for a body in `group`, with the mask taken from the allow-table
    pub const fn for_group(group: CollisionGroup) -> Self {
        Self {
            group,
            mask: group.mask(),
        }
    }

    /// Mutual acceptance: each body's group must be in the other's mask
    pub fn accepts(&self, other: &BodyFilter) -> bool {
        should_collide(self.group, self.mask, other.group, other.mask)
    }
}

/// Check if two bodies should generate contacts based on their groups and masks
pub fn should_collide(
    group_a: CollisionGroup,
    mask_a: CollisionGroup,
    group_b: CollisionGroup,
    mask_b: CollisionGroup,
) -> bool {
    mask_b.intersects(group_a) && mask_a.intersects(group_b)
}
