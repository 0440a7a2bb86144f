use glam::{DQuat, DVec3};

use crate::config::Tolerance;
use crate::error::{Error, Result};

/// Default object temperature (K).
pub const DEFAULT_TEMPERATURE: f64 = 293.15;

/// Index of an object inside the [`World`] arena that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Position of the object in its world's arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Rigid transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Orientation relative to the parent frame.
    pub rotation: DQuat,
    /// Origin offset in the parent frame (m).
    pub translation: DVec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// No rotation, no translation.
    pub const IDENTITY: Self = Self {
        rotation: DQuat::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Transform with `rotation` normalised.
    pub fn new(rotation: DQuat, translation: DVec3) -> Self {
        Self {
            rotation: rotation.normalize(),
            translation,
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            rotation: DQuat::IDENTITY,
            translation,
        }
    }

    /// Compose `self` (a parent's world transform) with a child's local transform.
    pub fn then_local(&self, child: &Transform) -> Transform {
        Transform {
            rotation: self.rotation * child.rotation,
            translation: self.rotation * child.translation + self.translation,
        }
    }

    /// Map a point from the local frame into the parent frame.
    #[inline]
    pub fn apply_point(&self, p: DVec3) -> DVec3 {
        self.rotation * p + self.translation
    }

    /// Rotate a direction from the local frame into the parent frame.
    #[inline]
    pub fn apply_vector(&self, v: DVec3) -> DVec3 {
        self.rotation * v
    }

    /// Inverse of [`Transform::apply_point`].
    #[inline]
    pub fn invert_point(&self, p: DVec3) -> DVec3 {
        self.rotation.inverse() * (p - self.translation)
    }

    /// Inverse of [`Transform::apply_vector`].
    #[inline]
    pub fn invert_vector(&self, v: DVec3) -> DVec3 {
        self.rotation.inverse() * v
    }
}

/// Construction parameters for an axis-aligned (in local space) box.
///
/// `size` holds full edge lengths; the box is centred on its local origin.
#[derive(Debug, Clone)]
pub struct BoxSpec {
    /// Unique object name.
    pub name: String,
    /// Full edge lengths (m).
    pub size: DVec3,
    /// Catalog material filling the box.
    pub material: Option<String>,
    /// Temperature (K).
    pub temperature: f64,
    /// Placement relative to the parent object.
    pub transform: Transform,
}

impl BoxSpec {
    /// Unplaced box at room temperature with no material.
    pub fn new(name: impl Into<String>, size: DVec3) -> Self {
        Self {
            name: name.into(),
            size,
            material: None,
            temperature: DEFAULT_TEMPERATURE,
            transform: Transform::IDENTITY,
        }
    }

    /// Set the catalog material.
    pub fn material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    /// Set the temperature (K).
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = kelvin;
        self
    }

    /// Place the box centre at `offset` in the parent frame.
    pub fn translated(mut self, offset: DVec3) -> Self {
        self.transform.translation = offset;
        self
    }

    /// Orient the box relative to its parent.
    pub fn rotated(mut self, rotation: DQuat) -> Self {
        self.transform.rotation = rotation;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidParam("object name must not be empty".into()));
        }
        if !self.size.is_finite() || self.size.min_element() < 0.0 {
            return Err(Error::InvalidParam(format!(
                "object `{}` size must be finite and >= 0",
                self.name
            )));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(Error::InvalidParam(format!(
                "object `{}` temperature must be finite and >= 0",
                self.name
            )));
        }
        let q = self.transform.rotation;
        if !q.is_finite() || q.length() <= f64::EPSILON {
            return Err(Error::InvalidParam(format!(
                "object `{}` rotation must be a finite non-zero quaternion",
                self.name
            )));
        }
        if !self.transform.translation.is_finite() {
            return Err(Error::InvalidParam(format!(
                "object `{}` translation must be finite",
                self.name
            )));
        }
        Ok(())
    }
}

/// A node of the geometry tree.
#[derive(Debug, Clone)]
pub struct Object {
    name: String,
    material: Option<String>,
    temperature: f64,
    half_extents: DVec3,
    local: Transform,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
}

impl Object {
    /// Unique object name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog material, if any.
    pub fn material(&self) -> Option<&str> {
        self.material.as_deref()
    }

    /// Temperature (K).
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Half edge lengths in the local frame (m).
    pub fn half_extents(&self) -> DVec3 {
        self.half_extents
    }

    /// Placement relative to the parent.
    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// Enclosing object; `None` for the world root.
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Direct children in insertion order.
    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// True when any extent is within the absolute tolerance of zero.
    pub fn is_volumeless(&self, tol: Tolerance) -> bool {
        self.half_extents.min_element() <= tol.abs
    }
}

/// Result of a local-space segment/box intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Crossing point in the object's local frame.
    pub point: DVec3,
    /// Parametric fraction along the queried displacement, in [0, 1].
    pub fraction: f64,
}

/// Arena-backed geometry tree rooted at a single world box.
///
/// Topology is fixed once stepping starts: objects can be added but never
/// re-parented or removed.
#[derive(Debug, Clone)]
pub struct World {
    objects: Vec<Object>,
    tolerance: Tolerance,
}

impl World {
    /// Create a world whose root box is described by `spec`.
    pub fn new(spec: BoxSpec, tolerance: Tolerance) -> Result<Self> {
        spec.validate()?;
        let root = Object {
            name: spec.name,
            material: spec.material,
            temperature: spec.temperature,
            half_extents: spec.size * 0.5,
            local: spec.transform,
            parent: None,
            children: Vec::new(),
        };
        Ok(Self {
            objects: vec![root],
            tolerance,
        })
    }

    /// Add a box as the last child of `parent`.
    pub fn add_child(&mut self, parent: ObjectId, spec: BoxSpec) -> Result<ObjectId> {
        spec.validate()?;
        if self.get(parent).is_none() {
            return Err(Error::InvalidParam(format!(
                "unknown parent object index {}",
                parent.0
            )));
        }
        if self.find_by_name(&spec.name).is_some() {
            return Err(Error::InvalidParam(format!(
                "duplicate object name `{}`",
                spec.name
            )));
        }
        let id = ObjectId(self.objects.len());
        self.objects.push(Object {
            name: spec.name,
            material: spec.material,
            temperature: spec.temperature,
            half_extents: spec.size * 0.5,
            local: spec.transform,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.objects[parent.0].children.push(id);
        Ok(id)
    }

    /// The world box itself.
    #[inline]
    pub fn root(&self) -> ObjectId {
        ObjectId(0)
    }

    /// Tolerance used by containment, intersection and normals.
    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Number of objects, root included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Always false: a world has at least its root.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Borrow an object; `None` for ids this world did not issue.
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id.0)
    }

    /// Borrow an object, failing for ids this world did not issue.
    pub fn object(&self, id: ObjectId) -> Result<&Object> {
        let index = id.0;
        self.get(id)
            .ok_or_else(|| Error::InvalidParam(format!("unknown object {index}")))
    }

    /// Id of the object called `name`.
    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .position(|o| o.name == name)
            .map(ObjectId)
    }

    /// `id` followed by each of its ancestors up to the root.
    ///
    /// Empty for an id this world did not issue.
    pub fn ancestry(&self, id: ObjectId) -> impl Iterator<Item = ObjectId> + '_ {
        let start = self.get(id).map(|_| id);
        std::iter::successors(start, move |c| self.get(*c).and_then(Object::parent))
    }

    /// Composition of every ancestor's local transform with this node's, root to leaf.
    ///
    /// Identity for an id this world did not issue.
    pub fn world_transform(&self, id: ObjectId) -> Transform {
        let chain: Vec<&Object> = self.ancestry(id).filter_map(|c| self.get(c)).collect();
        chain
            .iter()
            .rev()
            .fold(Transform::IDENTITY, |acc, o| acc.then_local(&o.local))
    }

    /// Map a point from `id`'s local frame to world space.
    pub fn local_to_world(&self, id: ObjectId, p: DVec3) -> DVec3 {
        self.world_transform(id).apply_point(p)
    }

    /// Map a world-space point into `id`'s local frame.
    pub fn world_to_local(&self, id: ObjectId, p: DVec3) -> DVec3 {
        self.world_transform(id).invert_point(p)
    }

    /// Rotate a direction from `id`'s local frame to world space.
    pub fn local_direction_to_world(&self, id: ObjectId, v: DVec3) -> DVec3 {
        self.world_transform(id).apply_vector(v)
    }

    /// Rotate a world-space direction into `id`'s local frame.
    pub fn world_direction_to_local(&self, id: ObjectId, v: DVec3) -> DVec3 {
        self.world_transform(id).invert_vector(v)
    }

    /// Containment test against the half-extents widened by the tolerance band.
    /// Volumeless objects and foreign ids never contain anything.
    pub fn contains(&self, id: ObjectId, world_point: DVec3) -> bool {
        let Some(obj) = self.get(id) else {
            return false;
        };
        if obj.is_volumeless(self.tolerance) {
            return false;
        }
        let local = self.world_to_local(id, world_point);
        self.within_slabs(obj.half_extents, local)
    }

    #[inline]
    fn within_slabs(&self, h: DVec3, local: DVec3) -> bool {
        (0..3).all(|k| local[k].abs() <= h[k] + self.tolerance.band(h[k]))
    }

    /// Slab-method intersection of the local-space segment `start + t * displacement`,
    /// `t` in [0, 1], with this object's box.
    ///
    /// Returns the exit crossing when `start` lies inside the box and the entry
    /// crossing otherwise.
    ///
    /// Errors: `Error::Geometry` when the segment misses the box, the crossing
    /// lies outside the segment, or `id` was not issued by this world.
    pub fn local_intersection(
        &self,
        id: ObjectId,
        start: DVec3,
        displacement: DVec3,
    ) -> Result<Intersection> {
        let obj = self
            .get(id)
            .ok_or_else(|| Error::Geometry(format!("unknown object index {}", id.0)))?;
        let tol = self.tolerance;
        let h = obj.half_extents;
        if !start.is_finite() || !displacement.is_finite() {
            return Err(Error::Geometry("non-finite segment".into()));
        }
        let len = displacement.length();
        if len <= tol.abs {
            return Err(Error::Geometry(format!(
                "zero-length displacement against `{}`",
                obj.name
            )));
        }
        let parallel_band = tol.band(len);
        let t_band = tol.rel + tol.abs / len;

        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;
        for k in 0..3 {
            let (s, d, hk) = (start[k], displacement[k], h[k]);
            if d.abs() <= parallel_band {
                if s.abs() > hk + tol.band(hk) {
                    return Err(Error::Geometry(format!(
                        "segment parallel to axis {k} lies outside `{}`",
                        obj.name
                    )));
                }
                continue;
            }
            let t1 = (-hk - s) / d;
            let t2 = (hk - s) / d;
            let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            t_enter = t_enter.max(lo);
            t_exit = t_exit.min(hi);
            if t_enter > t_exit + t_band {
                return Err(Error::Geometry(format!(
                    "segment misses `{}` (empty slab interval)",
                    obj.name
                )));
            }
        }

        let t = if self.within_slabs(h, start) {
            t_exit
        } else {
            t_enter
        };
        if !t.is_finite() || t < -t_band || t > 1.0 + t_band {
            return Err(Error::Geometry(format!(
                "crossing parameter {t} outside [0, 1] for `{}`",
                obj.name
            )));
        }
        let t = t.clamp(0.0, 1.0);
        Ok(Intersection {
            point: start + displacement * t,
            fraction: t,
        })
    }

    /// Outward unit normal of the face `local_point` lies on, or zero when the
    /// point is on no face or `id` is foreign.
    pub fn local_normal(&self, id: ObjectId, local_point: DVec3) -> DVec3 {
        let Some(obj) = self.get(id) else {
            return DVec3::ZERO;
        };
        let h = obj.half_extents;
        let eps = self.tolerance.band((2.0 * h).length());
        for (k, axis) in DVec3::AXES.iter().enumerate() {
            if (local_point[k] - h[k]).abs() <= eps {
                return *axis;
            }
            if (local_point[k] + h[k]).abs() <= eps {
                return -*axis;
            }
        }
        DVec3::ZERO
    }

    /// Deepest object containing `world_point`, or `None` outside the world.
    pub fn find_object_containing(&self, world_point: DVec3) -> Option<ObjectId> {
        self.descend(self.root(), world_point)
    }

    fn descend(&self, id: ObjectId, p: DVec3) -> Option<ObjectId> {
        if !self.contains(id, p) {
            return None;
        }
        self.get(id)?
            .children
            .iter()
            .find_map(|&child| self.descend(child, p))
            .or(Some(id))
    }

    /// True if `ancestor` is `id` or lies on the path from `id` to the root.
    pub fn is_within(&self, id: ObjectId, ancestor: ObjectId) -> bool {
        self.ancestry(id).any(|c| c == ancestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn tol() -> Tolerance {
        Tolerance::new(1e-9, 1e-12)
    }

    fn world_with_cell() -> Result<(World, ObjectId)> {
        let mut world = World::new(
            BoxSpec::new("World", DVec3::new(100.0, 100.0, 20.0))
                .material("vacuum"),
            tol(),
        )?;
        let cell = world.add_child(
            world.root(),
            BoxSpec::new("Cell", DVec3::splat(4.0)).material("vapor"),
        )?;
        Ok((world, cell))
    }

    fn close(a: DVec3, b: DVec3, eps: f64) -> bool {
        (a - b).length() <= eps
    }

    #[test]
    fn point_at_origin_resolves_to_cell() -> Result<()> {
        let (world, cell) = world_with_cell()?;
        assert_eq!(world.find_object_containing(DVec3::ZERO), Some(cell));
        assert_eq!(
            world.find_object_containing(DVec3::new(10.0, 0.0, 0.0)),
            Some(world.root())
        );
        let above = DVec3::new(0.0, 0.0, 11.0);
        assert_eq!(world.find_object_containing(above), None);
        Ok(())
    }

    #[test]
    fn nested_world_transform_composes() -> Result<()> {
        let mut world = World::new(BoxSpec::new("World", DVec3::splat(100.0)), tol())?;
        let outer = world.add_child(
            world.root(),
            BoxSpec::new("Outer", DVec3::splat(20.0))
                .translated(DVec3::new(10.0, 0.0, 0.0))
                .rotated(DQuat::from_rotation_z(FRAC_PI_2)),
        )?;
        let inner = world.add_child(
            outer,
            BoxSpec::new("Inner", DVec3::splat(2.0))
                .translated(DVec3::new(5.0, 0.0, 0.0)),
        )?;
        // Inner's local +x is the world +y after the parent's quarter turn.
        let centre = world.local_to_world(inner, DVec3::ZERO);
        assert!(close(centre, DVec3::new(10.0, 5.0, 0.0), 1e-12), "{centre}");
        assert_eq!(world.find_object_containing(centre), Some(inner));
        Ok(())
    }

    #[test]
    fn local_world_round_trip() -> Result<()> {
        let mut world = World::new(BoxSpec::new("World", DVec3::splat(50.0)), tol())?;
        let b = world.add_child(
            world.root(),
            BoxSpec::new("Tilted", DVec3::splat(3.0))
                .translated(DVec3::new(1.0, -2.0, 3.0))
                .rotated(DQuat::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 2.0)),
        )?;
        for p in [
            DVec3::ZERO,
            DVec3::new(4.0, 5.0, -6.0),
            DVec3::new(-20.0, 0.25, 13.0),
        ] {
            let back = world.local_to_world(b, world.world_to_local(b, p));
            assert!(close(back, p, 1e-12), "{p} -> {back}");
        }
        Ok(())
    }

    #[test]
    fn contains_uses_tolerance_band() -> Result<()> {
        let (world, cell) = world_with_cell()?;
        assert!(world.contains(cell, DVec3::new(2.0, 0.0, 0.0)));
        assert!(world.contains(cell, DVec3::new(2.0 + 1e-12, 0.0, 0.0)));
        assert!(!world.contains(cell, DVec3::new(2.0 + 1e-6, 0.0, 0.0)));
        Ok(())
    }

    #[test]
    fn volumeless_object_contains_nothing() -> Result<()> {
        let mut world = World::new(BoxSpec::new("World", DVec3::splat(10.0)), tol())?;
        let sheet = world.add_child(
            world.root(),
            BoxSpec::new("Sheet", DVec3::new(4.0, 4.0, 0.0)),
        )?;
        assert!(!world.contains(sheet, DVec3::ZERO));
        let root = Some(world.root());
        assert_eq!(world.find_object_containing(DVec3::ZERO), root);
        Ok(())
    }

    #[test]
    fn intersection_from_inside_returns_exit() -> Result<()> {
        let (world, cell) = world_with_cell()?;
        let displacement = DVec3::new(4.0, 0.0, 0.0);
        let hit = world.local_intersection(cell, DVec3::ZERO, displacement)?;
        assert!(close(hit.point, DVec3::new(2.0, 0.0, 0.0), 1e-12));
        assert!((hit.fraction - 0.5).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn intersection_from_outside_returns_entry() -> Result<()> {
        let (world, cell) = world_with_cell()?;
        let hit = world.local_intersection(
            cell,
            DVec3::new(-6.0, 0.5, 0.0),
            DVec3::new(6.0, 0.0, 0.0),
        )?;
        assert!(close(hit.point, DVec3::new(-2.0, 0.5, 0.0), 1e-12));
        assert!((hit.fraction - 4.0 / 6.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn parallel_segment_outside_slab_fails() -> Result<()> {
        let (world, cell) = world_with_cell()?;
        let err = world
            .local_intersection(cell, DVec3::new(-6.0, 3.0, 0.0), DVec3::new(12.0, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, Error::Geometry(_)));
        Ok(())
    }

    #[test]
    fn segment_short_of_box_fails() -> Result<()> {
        let (world, cell) = world_with_cell()?;
        let res = world.local_intersection(
            cell,
            DVec3::new(-6.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
        );
        assert!(res.is_err());
        Ok(())
    }

    #[test]
    fn normal_matches_face() -> Result<()> {
        let (world, cell) = world_with_cell()?;
        let faces = [
            (DVec3::new(2.0, 0.3, -0.1), DVec3::X),
            (DVec3::new(0.0, 0.0, -2.0), -DVec3::Z),
            (DVec3::new(0.5, 0.5, 0.5), DVec3::ZERO),
        ];
        for (point, normal) in faces {
            assert_eq!(world.local_normal(cell, point), normal, "at {point}");
        }
        Ok(())
    }

    #[test]
    fn duplicate_names_rejected() -> Result<()> {
        let (mut world, _) = world_with_cell()?;
        let err = world
            .add_child(world.root(), BoxSpec::new("Cell", DVec3::ONE))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
        Ok(())
    }

    #[test]
    fn is_within_follows_parent_chain() -> Result<()> {
        let (world, cell) = world_with_cell()?;
        assert!(world.is_within(cell, world.root()));
        assert!(world.is_within(cell, cell));
        assert!(!world.is_within(world.root(), cell));
        let chain: Vec<ObjectId> = world.ancestry(cell).collect();
        assert_eq!(chain, [cell, world.root()]);
        Ok(())
    }

    #[test]
    fn foreign_ids_do_not_panic() -> Result<()> {
        let (big, cell) = world_with_cell()?;
        let small = World::new(BoxSpec::new("Small", DVec3::ONE), tol())?;
        assert!(big.get(cell).is_some());
        assert!(small.get(cell).is_none());
        assert!(!small.contains(cell, DVec3::ZERO));
        let face = DVec3::new(2.0, 0.0, 0.0);
        assert_eq!(small.local_normal(cell, face), DVec3::ZERO);
        let err = small
            .local_intersection(cell, DVec3::ZERO, DVec3::X)
            .unwrap_err();
        assert!(matches!(err, Error::Geometry(_)));
        assert_eq!(small.world_transform(cell), Transform::IDENTITY);
        assert_eq!(small.ancestry(cell).count(), 0);
        Ok(())
    }
}
