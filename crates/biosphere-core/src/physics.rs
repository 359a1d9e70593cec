//! The physics seam.
//!
//! Grain motion, collisions, and cell behaviour live behind [`Integrator`].
//! The synchronizers only rely on its contract: it mutates the chunk's own
//! grains in place for one tick, may read the environment, and must treat
//! every walled edge as closed. Grains it moves past an open edge are
//! collected by [`crate::chunk::GrainChunk::step`] as escapees.

use biosphere_types::{ChunkWall, Grain};

use crate::config::PhysicsConfig;

/// Advances a chunk's grains by one tick.
pub trait Integrator: Send + Sync {
    /// Integrate `grains` in place.
    ///
    /// `environment` holds read-only grains of the surrounding chunks, already
    /// translated into this chunk's frame. `wall` marks the closed edges.
    fn integrate(&self, grains: &mut [Grain], environment: &[Grain], wall: ChunkWall);
}

/// Largest coordinate strictly inside the unit cell.
const UNIT_MAX: f32 = 1.0 - f32::EPSILON;

/// Reference integrator: gravity, a floor at `z = 0`, and reflecting walls.
///
/// Grains do not interact with each other or with the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct BallisticIntegrator {
    gravity: f32,
    dt: f32,
    restitution: f32,
}

impl BallisticIntegrator {
    /// Build an integrator from its configuration section.
    pub const fn new(config: &PhysicsConfig) -> Self {
        Self {
            gravity: config.gravity,
            dt: config.dt,
            restitution: config.restitution,
        }
    }

    /// Reflect one axis off whichever closed edge it crossed.
    fn bounce(&self, pos: f32, vel: f32, low_closed: bool, high_closed: bool) -> (f32, f32) {
        if low_closed && pos < 0.0 {
            ((-pos).clamp(0.0, UNIT_MAX), -vel * self.restitution)
        } else if high_closed && pos >= 1.0 {
            ((2.0 - pos).clamp(0.0, UNIT_MAX), -vel * self.restitution)
        } else {
            (pos, vel)
        }
    }
}

impl Default for BallisticIntegrator {
    fn default() -> Self {
        Self::new(&PhysicsConfig::default())
    }
}

impl Integrator for BallisticIntegrator {
    fn integrate(&self, grains: &mut [Grain], _environment: &[Grain], wall: ChunkWall) {
        for grain in grains {
            grain.velocity.z -= self.gravity * self.dt;
            grain.position = grain.position + grain.velocity.scaled(self.dt);

            if grain.position.z < 0.0 {
                grain.position.z = 0.0;
                grain.velocity.z = -grain.velocity.z * self.restitution;
            }

            (grain.position.x, grain.velocity.x) = self.bounce(
                grain.position.x,
                grain.velocity.x,
                wall.xm,
                wall.xp,
            );
            (grain.position.y, grain.velocity.y) = self.bounce(
                grain.position.y,
                grain.velocity.y,
                wall.ym,
                wall.yp,
            );
        }
    }
}
