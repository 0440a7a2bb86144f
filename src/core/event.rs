use glam::DVec3;

use crate::config::{EngineConfig, Tolerance};
use crate::core::boundary::{particle_boundary_conditions, BoundaryEvent};
use crate::core::geometry::{ObjectId, World};
use crate::core::particle::Particle;
use crate::core::process::ProcessId;

/// Mechanism that limits a sub-step.
///
/// Declaration order is the tie-break priority: when two candidates are
/// simultaneous within tolerance, the later variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepLimiter {
    Time,
    Boundary,
    Decay,
    Interaction,
}

impl StepLimiter {
    pub const ALL: [StepLimiter; 4] = [
        StepLimiter::Time,
        StepLimiter::Boundary,
        StepLimiter::Decay,
        StepLimiter::Interaction,
    ];

    #[inline]
    pub fn priority(self) -> u8 {
        match self {
            StepLimiter::Time => 0,
            StepLimiter::Boundary => 1,
            StepLimiter::Decay => 2,
            StepLimiter::Interaction => 3,
        }
    }
}

/// Kinematic state of a particle at one end of a sub-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSnapshot {
    pub position: DVec3,
    pub time: f64,
    pub energy: f64,
    pub momentum: DVec3,
    pub medium: Option<ObjectId>,
}

impl StepSnapshot {
    pub fn of(particle: &Particle, medium: Option<ObjectId>) -> Self {
        Self {
            position: particle.position(),
            time: particle.time(),
            energy: particle.energy(),
            momentum: particle.momentum(),
            medium,
        }
    }
}

/// The winning sub-step of one resolution cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    pub limiter: StepLimiter,
    pub dt: f64,
    /// World-space displacement over `dt`.
    pub displacement: DVec3,
    /// Present whenever a crossing was detected, even if another limiter won.
    pub boundary: Option<BoundaryEvent>,
    /// Process owning the interaction budget when `limiter` is `Interaction`.
    pub process: Option<ProcessId>,
    pub pre: StepSnapshot,
    pub post: StepSnapshot,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    limiter: StepLimiter,
    dt: f64,
    displacement: DVec3,
}

/// Whether a candidate sub-step replaces the current winner.
///
/// Strictly shorter by more than the tolerance band wins outright. Within the
/// band, only a strictly higher-priority limiter replaces.
pub fn should_replace_event(
    current: StepLimiter,
    current_dt: f64,
    candidate: StepLimiter,
    candidate_dt: f64,
    tolerance: Tolerance,
) -> bool {
    if !candidate_dt.is_finite() || candidate_dt < 0.0 {
        return false;
    }
    if !current_dt.is_finite() {
        return true;
    }
    let band = tolerance.band(current_dt.abs().max(candidate_dt.abs()));
    if candidate_dt < current_dt - band {
        return true;
    }
    if candidate_dt > current_dt + band {
        return false;
    }
    candidate.priority() > current.priority()
}

/// Resolve the next limiting event for `particle` with `remaining` seconds of budget.
///
/// The particle is not modified; the caller applies the displacement.
pub fn resolve_step_event(
    world: &World,
    config: &EngineConfig,
    particle: &Particle,
    medium: Option<ObjectId>,
    remaining: f64,
) -> StepEvent {
    let pre = StepSnapshot::of(particle, medium);
    if !remaining.is_finite() || remaining <= 0.0 {
        return StepEvent {
            limiter: StepLimiter::Time,
            dt: 0.0,
            displacement: DVec3::ZERO,
            boundary: None,
            process: None,
            pre,
            post: pre,
        };
    }

    let velocity = particle.velocity();
    let tolerance = config.time_tolerance();
    let mut best = Candidate {
        limiter: StepLimiter::Time,
        dt: remaining,
        displacement: velocity * remaining,
    };
    let offer = |best: &mut Candidate, c: Candidate| {
        if should_replace_event(best.limiter, best.dt, c.limiter, c.dt, tolerance) {
            *best = c;
        }
    };

    let mut boundary = None;
    if let Some(start_medium) = medium {
        let mut dt = remaining;
        let mut displacement = best.displacement;
        boundary = particle_boundary_conditions(
            world,
            config,
            start_medium,
            pre.position,
            &mut dt,
            &mut displacement,
        );
        if boundary.is_some() {
            offer(
                &mut best,
                Candidate {
                    limiter: StepLimiter::Boundary,
                    dt,
                    displacement,
                },
            );
        }
    }

    let moving = !particle.is_at_rest(config.rest_speed_threshold);
    if moving && particle.has_pending_interaction_length() {
        if let Some(length) = particle.interaction_length_remaining() {
            let dt = length / particle.speed();
            offer(
                &mut best,
                Candidate {
                    limiter: StepLimiter::Interaction,
                    dt,
                    displacement: velocity * dt,
                },
            );
        }
    }

    if let Some(clock) = particle.decay_time_remaining() {
        let dt = clock.max(0.0);
        offer(
            &mut best,
            Candidate {
                limiter: StepLimiter::Decay,
                dt,
                displacement: velocity * dt,
            },
        );
    }

    let position = pre.position + best.displacement;
    let post_medium = match (best.limiter, boundary) {
        (StepLimiter::Boundary, Some(ev)) => ev.medium_after,
        _ => world.find_object_containing(position),
    };
    let process = match best.limiter {
        StepLimiter::Interaction => particle.pending_interaction_process(),
        _ => None,
    };

    StepEvent {
        limiter: best.limiter,
        dt: best.dt,
        displacement: best.displacement,
        boundary,
        process,
        pre,
        post: StepSnapshot {
            position,
            time: pre.time + best.dt,
            medium: post_medium,
            ..pre
        },
    }
}
