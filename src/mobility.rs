//! Positions, position allocators and mobility models.
//!
//! Movement is discrete: a [`MobilityModel::ConstantVelocity`] entity gets a
//! self-rescheduling update event that shifts its position once per
//! `update_interval`. Between updates the position is constant, which is
//! what the propagation model sees.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::World;
use crate::error::{SimError, SimResult};
use crate::scheduler::Scheduler;
use crate::types::{EntityId, EventId, SimDuration, SimTime};

/// A point in 3D space, in metres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    /// Creates a position.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Returns the position after moving at `velocity` for `secs` seconds.
    pub fn advanced(&self, velocity: Velocity, secs: f64) -> Position {
        Position {
            x: self.x + velocity.x * secs,
            y: self.y + velocity.y * secs,
            z: self.z + velocity.z * secs,
        }
    }
}

/// A velocity vector, in metres per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Velocity {
    /// Creates a velocity.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Chooses initial positions for a group of entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionAllocator {
    /// Every entity at the same point.
    Fixed {
        x: f64,
        y: f64,
        #[serde(default)]
        z: f64,
    },
    /// Uniform angle around `(x, y)` and uniform radius in `[rho_min, rho_max]`.
    RandomDisc {
        x: f64,
        y: f64,
        #[serde(default)]
        z: f64,
        #[serde(default)]
        rho_min: f64,
        rho_max: f64,
    },
}

impl Default for PositionAllocator {
    fn default() -> Self {
        PositionAllocator::Fixed {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

impl PositionAllocator {
    /// Checks the allocator parameters.
    pub fn validate(&self) -> SimResult<()> {
        match *self {
            PositionAllocator::Fixed { x, y, z } => {
                if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                    return Err(SimError::InvalidMobility(
                        "fixed position must be finite".to_string(),
                    ));
                }
            }
            PositionAllocator::RandomDisc {
                rho_min, rho_max, ..
            } => {
                if !(rho_min >= 0.0 && rho_max >= rho_min && rho_max.is_finite()) {
                    return Err(SimError::InvalidMobility(format!(
                        "random disc needs 0 <= rho_min <= rho_max, got [{rho_min}, {rho_max}]"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Draws one position.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        match *self {
            PositionAllocator::Fixed { x, y, z } => Position::new(x, y, z),
            PositionAllocator::RandomDisc {
                x,
                y,
                z,
                rho_min,
                rho_max,
            } => {
                let theta = rng.gen_range(0.0..std::f64::consts::TAU);
                let rho = if rho_max > rho_min {
                    rng.gen_range(rho_min..=rho_max)
                } else {
                    rho_min
                };
                Position::new(x + rho * theta.cos(), y + rho * theta.sin(), z)
            }
        }
    }
}

/// How an entity moves once placed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum MobilityModel {
    /// Never moves.
    #[default]
    ConstantPosition,
    /// Moves in a straight line, position refreshed every `update_interval`.
    ConstantVelocity {
        velocity: Velocity,
        update_interval: SimTime,
    },
}

impl MobilityModel {
    /// Checks the model parameters.
    pub fn validate(&self) -> SimResult<()> {
        if let MobilityModel::ConstantVelocity {
            velocity,
            update_interval,
        } = self
        {
            if *update_interval == SimTime::ZERO {
                return Err(SimError::InvalidMobility(
                    "update_interval must be positive".to_string(),
                ));
            }
            if !(velocity.x.is_finite() && velocity.y.is_finite() && velocity.z.is_finite()) {
                return Err(SimError::InvalidMobility(
                    "velocity must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the update period for moving models.
    pub fn update_interval(&self) -> Option<SimTime> {
        match self {
            MobilityModel::ConstantPosition => None,
            MobilityModel::ConstantVelocity {
                update_interval, ..
            } => Some(*update_interval),
        }
    }
}

/// Schedules the next position update for `id`.
pub(crate) fn arm_update(
    sched: &mut Scheduler<World>,
    id: EntityId,
    interval: SimTime,
) -> SimResult<EventId> {
    sched.schedule_after(SimDuration::from(interval), move |sched, world| {
        apply_update(sched, world, id, interval)
    })
}

fn apply_update(sched: &mut Scheduler<World>, world: &mut World, id: EntityId, elapsed: SimTime) {
    let Ok(entity) = world.entities.get_mut(id) else {
        tracing::trace!(target: "aerosim::mobility", %id, "entity removed, updates end");
        return;
    };
    entity.mobility_update = None;

    let MobilityModel::ConstantVelocity {
        velocity,
        update_interval,
    } = entity.mobility
    else {
        return;
    };

    entity.position = entity.position.advanced(velocity, elapsed.as_secs_f64());
    tracing::trace!(
        target: "aerosim::mobility",
        %id,
        x = entity.position.x,
        y = entity.position.y,
        z = entity.position.z,
        "position updated"
    );

    // A zero interval would re-arm at the same instant forever.
    if let Err(err) = entity.mobility.validate() {
        tracing::warn!(target: "aerosim::mobility", %id, %err, "invalid mobility model, updates end");
        return;
    }
    match arm_update(sched, id, update_interval) {
        Ok(event) => entity.mobility_update = Some(event),
        Err(err) => {
            tracing::warn!(target: "aerosim::mobility", %id, %err, "could not re-arm mobility update")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_distance() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 0.0);
        assert_eq!(a.distance_to(&b), 5.0);
    }

    #[test]
    fn test_advanced() {
        let p = Position::new(1.0, 1.0, 10.0).advanced(Velocity::new(2.0, 0.0, -1.0), 0.5);
        assert_eq!(p, Position::new(2.0, 1.0, 9.5));
    }

    #[test]
    fn test_random_disc_stays_in_annulus() {
        let alloc = PositionAllocator::RandomDisc {
            x: 500.0,
            y: 500.0,
            z: 0.0,
            rho_min: 100.0,
            rho_max: 300.0,
        };
        let center = Position::new(500.0, 500.0, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..1000 {
            let d = alloc.sample(&mut rng).distance_to(&center);
            assert!((100.0 - 1e-9..=300.0 + 1e-9).contains(&d), "distance {d}");
        }
    }

    #[test]
    fn test_random_disc_is_seeded() {
        let alloc = PositionAllocator::RandomDisc {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            rho_min: 0.0,
            rho_max: 50.0,
        };
        let mut a = ChaCha8Rng::seed_from_u64(1);
        let mut b = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(alloc.sample(&mut a), alloc.sample(&mut b));
    }

    #[test]
    fn test_allocator_validation() {
        let bad = PositionAllocator::RandomDisc {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            rho_min: 10.0,
            rho_max: 5.0,
        };
        assert!(matches!(bad.validate(), Err(SimError::InvalidMobility(_))));
        assert!(PositionAllocator::default().validate().is_ok());
    }

    #[test]
    fn test_mobility_validation() {
        let bad = MobilityModel::ConstantVelocity {
            velocity: Velocity::new(1.0, 0.0, 0.0),
            update_interval: SimTime::ZERO,
        };
        assert!(bad.validate().is_err());
        assert!(MobilityModel::ConstantPosition.validate().is_ok());
        assert_eq!(MobilityModel::ConstantPosition.update_interval(), None);
    }
}
