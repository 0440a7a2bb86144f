//! Medium-crossing detection and the transmit/reflect response.

use glam::DVec3;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::core::geometry::{ObjectId, World};
use crate::core::particle::Particle;
use crate::error::Result;

/// A crossing from one medium into another within a proposed displacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryEvent {
    /// Object whose surface is crossed.
    pub surface: ObjectId,
    /// World-space crossing point.
    pub point: DVec3,
    /// Medium the particle was in when the sub-step started.
    pub medium_before: ObjectId,
    /// `None` when the crossing leaves the world.
    pub medium_after: Option<ObjectId>,
    /// World-space outward normal of `surface`, meaningful only when `normal_valid`.
    pub normal: DVec3,
    /// False when the crossing came from the degenerate fallback.
    pub normal_valid: bool,
}

/// Outcome of [`process_boundary_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryResponse {
    /// Nudged forward into the next medium.
    Transmitted,
    /// Specularly reflected and nudged back into the medium it came from.
    Reflected,
    /// No usable normal could be found; the particle was left as is.
    Unresolved,
}

#[derive(Debug, Clone, Copy)]
struct Crossing {
    surface: ObjectId,
    fraction: f64,
    normal: DVec3,
    normal_valid: bool,
}

fn surface_crossing(
    world: &World,
    surface: ObjectId,
    start: DVec3,
    displacement: DVec3,
) -> Result<Crossing> {
    let local_start = world.world_to_local(surface, start);
    let local_disp = world.world_direction_to_local(surface, displacement);
    let hit = world.local_intersection(surface, local_start, local_disp)?;
    let local_normal = world.local_normal(surface, hit.point);
    Ok(Crossing {
        surface,
        fraction: hit.fraction,
        normal: world.local_direction_to_world(surface, local_normal),
        normal_valid: local_normal != DVec3::ZERO,
    })
}

/// Surfaces a segment from `start_medium` to `end_medium` can cross: the start
/// medium itself plus every object strictly between either medium and their
/// common ancestor.
fn candidate_surfaces(
    world: &World,
    start_medium: ObjectId,
    end_medium: Option<ObjectId>,
) -> Vec<ObjectId> {
    let mut surfaces = vec![start_medium];
    match end_medium {
        Some(end) => {
            let leaving = world
                .ancestry(start_medium)
                .skip(1)
                .take_while(|&c| !world.is_within(end, c));
            surfaces.extend(leaving);
            let entering = world
                .ancestry(end)
                .take_while(|&c| !world.is_within(start_medium, c));
            surfaces.extend(entering);
        }
        None => surfaces.extend(world.ancestry(start_medium).skip(1)),
    }
    surfaces
}

/// Distance a particle is pushed off `surface` after a crossing. At least twice
/// the surface's containment band so the old medium no longer claims the point.
pub fn nudge_distance(
    world: &World,
    config: &EngineConfig,
    surface: ObjectId,
    travelled: f64,
) -> f64 {
    let scale = world
        .get(surface)
        .map_or(0.0, |o| o.half_extents().max_element());
    config
        .boundary_nudge(travelled)
        .max(2.0 * world.tolerance().band(scale))
}

/// Detect the first surface crossed by `start + displacement`.
///
/// On a crossing, `dt` and `displacement` are scaled in place to the crossing
/// fraction (floored at the geometric tolerance). Intermediate ancestors are
/// tested too, so a segment ending in a grandchild stops at the child's face.
/// If no candidate surface yields a crossing, the step is truncated to a small
/// multiple of the tolerance instead.
pub fn particle_boundary_conditions(
    world: &World,
    config: &EngineConfig,
    start_medium: ObjectId,
    start: DVec3,
    dt: &mut f64,
    displacement: &mut DVec3,
) -> Option<BoundaryEvent> {
    let disp = *displacement;
    let len = disp.length();
    if !disp.is_finite() || len <= 0.0 {
        return None;
    }
    let end_medium = world.find_object_containing(start + disp);
    if end_medium == Some(start_medium) {
        return None;
    }

    let mut best: Option<Crossing> = None;
    for surface in candidate_surfaces(world, start_medium, end_medium) {
        match surface_crossing(world, surface, start, disp) {
            Ok(c) => {
                if best.is_none_or(|b| c.fraction < b.fraction) {
                    best = Some(c);
                }
            }
            Err(e) => debug!(surface = surface.index(), error = %e, "no crossing from surface"),
        }
    }

    let tol = world.tolerance().abs;
    let resolved = best.is_some();
    let crossing = best.unwrap_or(Crossing {
        surface: start_medium,
        fraction: (config.fallback_step_factor * tol / len).min(1.0),
        normal: DVec3::ZERO,
        normal_valid: false,
    });
    let fraction = crossing.fraction.clamp((tol / len).min(1.0), 1.0);
    *dt *= fraction;
    *displacement = disp * fraction;
    let point = start + *displacement;

    let nudge = nudge_distance(world, config, crossing.surface, len * fraction);
    let beyond = world.find_object_containing(point + disp / len * nudge);
    let medium_after = if resolved && beyond == Some(start_medium) {
        end_medium
    } else {
        beyond
    };

    Some(BoundaryEvent {
        surface: crossing.surface,
        point,
        medium_before: start_medium,
        medium_after,
        normal: crossing.normal,
        normal_valid: crossing.normal_valid,
    })
}

fn resolve_normal(
    world: &World,
    particle: &Particle,
    event: &BoundaryEvent,
    displacement: DVec3,
) -> Option<DVec3> {
    if event.normal_valid {
        let n = event.normal.normalize_or_zero();
        if n != DVec3::ZERO {
            return Some(n);
        }
    }
    if world.get(event.surface).is_some() {
        let local = world.world_to_local(event.surface, event.point);
        let n_local = world.local_normal(event.surface, local);
        if n_local != DVec3::ZERO {
            warn!(
                surface = event.surface.index(),
                "boundary normal missing; recomputed from surface"
            );
            let n = world.local_direction_to_world(event.surface, n_local);
            return Some(n.normalize());
        }
    }
    let back = (-displacement).normalize_or_zero();
    if back != DVec3::ZERO {
        warn!(
            particle = particle.id(),
            "boundary normal unavailable; using reversed displacement"
        );
        return Some(back);
    }
    let forward = particle.momentum().normalize_or_zero();
    if forward != DVec3::ZERO {
        warn!(
            particle = particle.id(),
            "boundary normal unavailable; using momentum direction"
        );
        return Some(forward);
    }
    None
}

/// Reflect or transmit `particle` at the crossing, nudging it off the surface.
///
/// `displacement` is the world displacement travelled in the sub-step that
/// reached the boundary.
pub fn process_boundary_response(
    world: &World,
    config: &EngineConfig,
    particle: &mut Particle,
    event: &BoundaryEvent,
    displacement: DVec3,
) -> Result<BoundaryResponse> {
    let Some(mut normal) = resolve_normal(world, particle, event, displacement) else {
        warn!(
            particle = particle.id(),
            "no usable boundary normal; response skipped"
        );
        return Ok(BoundaryResponse::Unresolved);
    };
    // Orient the normal from medium-before towards medium-after.
    let travel = if displacement != DVec3::ZERO {
        displacement
    } else {
        particle.momentum()
    };
    if normal.dot(travel) < 0.0 {
        normal = -normal;
    }
    let eps = nudge_distance(world, config, event.surface, displacement.length());

    if particle.is_reflective() {
        let p = particle.momentum();
        particle.set_momentum(p - 2.0 * p.dot(normal) * normal)?;
        particle.advance(-normal * eps, 0.0);
        Ok(BoundaryResponse::Reflected)
    } else {
        particle.advance(normal * eps, 0.0);
        Ok(BoundaryResponse::Transmitted)
    }
}
