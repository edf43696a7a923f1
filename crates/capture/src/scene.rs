//! Object and group arena shared by every pipeline stage.
//!
//! A [`Scene`] owns every [`GeometryObject`] and every [`ObjectGroup`]. Each
//! object belongs to exactly one group; the only way to change membership is
//! through [`Scene::move_object`] / [`Scene::move_all`], which re-own the
//! object rather than copying it.
//!
//! Mesh data lives behind a [`MeshRef`] so several objects may share one
//! mesh. Anything that mutates vertices in bulk (cleanup, joins) must treat
//! the shared mesh, not the object, as the unit of work.

use glam::{DAffine3, DVec3};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::SceneError;

/// Handle to an object stored in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

/// Handle to a group stored in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Mesh,
    PointCloud,
}

/// Raw geometry in object-local coordinates.
///
/// `faces` are polygons (three or more vertex indices). `edges` only holds
/// loose edges, i.e. edges that are not the side of any face.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<DVec3>,
    /// Per-vertex texture coordinates, parallel to `positions` when present.
    pub uvs: Option<Vec<[f32; 2]>>,
    pub faces: Vec<Vec<u32>>,
    pub edges: Vec<[u32; 2]>,
}

/// Reference-counted mesh shared by every object that points at it.
pub type MeshRef = Arc<RwLock<Mesh>>;

impl Mesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Check that every face and edge index addresses a vertex and that
    /// texture coordinates, when present, are parallel to `positions`.
    pub fn validate(&self) -> Result<(), SceneError> {
        let count = self.positions.len();

        if let Some(uvs) = &self.uvs {
            if uvs.len() != count {
                return Err(SceneError::MalformedMesh(format!(
                    "{} texture coordinates for {} vertices",
                    uvs.len(),
                    count
                )));
            }
        }

        for (n, face) in self.faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(SceneError::MalformedMesh(format!(
                    "face {n} has {} corner(s)",
                    face.len()
                )));
            }
            if let Some(&v) = face.iter().find(|&&v| v as usize >= count) {
                return Err(SceneError::MalformedMesh(format!(
                    "face {n} references vertex {v} of {count}"
                )));
            }
        }

        if let Some((n, edge)) = self
            .edges
            .iter()
            .enumerate()
            .find(|(_, e)| e.iter().any(|&v| v as usize >= count))
        {
            return Err(SceneError::MalformedMesh(format!(
                "edge {n} {edge:?} references a vertex past {count}"
            )));
        }

        Ok(())
    }

    /// Wrap the mesh so it can be attached to one or more objects.
    pub fn into_shared(self) -> MeshRef {
        Arc::new(RwLock::new(self))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Image the material samples, if any.
    pub texture: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GeometryObject {
    pub name: String,
    pub kind: ObjectKind,
    pub transform: DAffine3,
    pub mesh: MeshRef,
    pub material: Option<Arc<Material>>,
}

impl GeometryObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind, mesh: MeshRef) -> Self {
        Self {
            name: name.into(),
            kind,
            transform: DAffine3::IDENTITY,
            mesh,
            material: None,
        }
    }

    /// Vertex positions with the object transform applied.
    pub fn world_positions(&self) -> Vec<DVec3> {
        let mesh = self.mesh.read();
        mesh.positions
            .iter()
            .map(|&p| self.transform.transform_point3(p))
            .collect()
    }
}

/// A named, ordered container of objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectGroup {
    name: String,
    objects: Vec<ObjectId>,
}

impl ObjectGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(Debug)]
struct Slot {
    object: GeometryObject,
    group: GroupId,
}

#[derive(Debug, Default)]
pub struct Scene {
    objects: BTreeMap<ObjectId, Slot>,
    groups: BTreeMap<GroupId, ObjectGroup>,
    next_object: u64,
    next_group: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_group(&mut self, name: impl Into<String>) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        self.groups.insert(
            id,
            ObjectGroup {
                name: name.into(),
                objects: Vec::new(),
            },
        );
        id
    }

    pub fn group(&self, id: GroupId) -> Option<&ObjectGroup> {
        self.groups.get(&id)
    }

    /// First group carrying `name`, in creation order.
    pub fn group_by_name(&self, name: &str) -> Option<GroupId> {
        self.groups
            .iter()
            .find(|(_, g)| g.name == name)
            .map(|(&id, _)| id)
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &ObjectGroup)> + '_ {
        self.groups.iter().map(|(&id, g)| (id, g))
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Snapshot of a group's membership.
    pub fn members(&self, id: GroupId) -> Result<Vec<ObjectId>, SceneError> {
        self.groups
            .get(&id)
            .map(|g| g.objects.clone())
            .ok_or(SceneError::UnknownGroup(id))
    }

    pub fn add_object(
        &mut self,
        group: GroupId,
        object: GeometryObject,
    ) -> Result<ObjectId, SceneError> {
        let members = self
            .groups
            .get_mut(&group)
            .ok_or(SceneError::UnknownGroup(group))?;

        let id = ObjectId(self.next_object);
        self.next_object += 1;

        members.objects.push(id);
        self.objects.insert(id, Slot { object, group });
        Ok(id)
    }

    pub fn object(&self, id: ObjectId) -> Option<&GeometryObject> {
        self.objects.get(&id).map(|s| &s.object)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut GeometryObject> {
        self.objects.get_mut(&id).map(|s| &mut s.object)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Group currently owning `id`.
    pub fn owner(&self, id: ObjectId) -> Option<GroupId> {
        self.objects.get(&id).map(|s| s.group)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Re-own a single object. Moving into the current owner is a no-op.
    pub fn move_object(&mut self, id: ObjectId, to: GroupId) -> Result<(), SceneError> {
        if !self.groups.contains_key(&to) {
            return Err(SceneError::UnknownGroup(to));
        }

        let slot = self
            .objects
            .get_mut(&id)
            .ok_or(SceneError::UnknownObject(id))?;
        let from = slot.group;
        if from == to {
            return Ok(());
        }
        slot.group = to;

        if let Some(src) = self.groups.get_mut(&from) {
            src.objects.retain(|&o| o != id);
        }
        if let Some(dst) = self.groups.get_mut(&to) {
            dst.objects.push(id);
        }
        Ok(())
    }

    /// Re-own every member of `from` into `to`, preserving order.
    /// Returns the number of objects moved.
    pub fn move_all(&mut self, from: GroupId, to: GroupId) -> Result<usize, SceneError> {
        if from == to {
            return Ok(0);
        }
        if !self.groups.contains_key(&to) {
            return Err(SceneError::UnknownGroup(to));
        }

        let moved = {
            let src = self
                .groups
                .get_mut(&from)
                .ok_or(SceneError::UnknownGroup(from))?;
            std::mem::take(&mut src.objects)
        };

        for id in &moved {
            if let Some(slot) = self.objects.get_mut(id) {
                slot.group = to;
            }
        }

        let count = moved.len();
        if let Some(dst) = self.groups.get_mut(&to) {
            dst.objects.extend(moved);
        }
        Ok(count)
    }

    /// Delete an object from the scene. Its mesh lives on while other objects
    /// still reference it.
    pub fn remove_object(&mut self, id: ObjectId) -> Result<GeometryObject, SceneError> {
        let slot = self
            .objects
            .remove(&id)
            .ok_or(SceneError::UnknownObject(id))?;

        if let Some(group) = self.groups.get_mut(&slot.group) {
            group.objects.retain(|&o| o != id);
        }
        Ok(slot.object)
    }

    /// Delete an empty group. Groups that still own objects are refused.
    pub fn remove_group(&mut self, id: GroupId) -> Result<ObjectGroup, SceneError> {
        match self.groups.get(&id) {
            Some(group) if !group.objects.is_empty() => Err(SceneError::GroupNotEmpty {
                group: group.name.clone(),
                remaining: group.objects.len(),
            }),
            _ => self.groups.remove(&id).ok_or(SceneError::UnknownGroup(id)),
        }
    }

    /// Merge `others` into `target` in place.
    ///
    /// Every vertex is brought into `target`'s local frame. `target` receives
    /// a freshly allocated mesh, so meshes shared with objects outside the
    /// join are left untouched. The other objects are deleted.
    pub fn join_objects(&mut self, target: ObjectId, others: &[ObjectId]) -> Result<(), SceneError> {
        let head = self.object(target).ok_or(SceneError::UnknownObject(target))?;
        let to_local = head.transform.inverse();

        let mut parts: Vec<(DAffine3, MeshRef, ObjectKind)> =
            vec![(DAffine3::IDENTITY, head.mesh.clone(), head.kind)];
        for &id in others.iter().filter(|&&id| id != target) {
            let obj = self.object(id).ok_or(SceneError::UnknownObject(id))?;
            parts.push((to_local * obj.transform, obj.mesh.clone(), obj.kind));
        }

        let any_uvs = parts.iter().any(|(_, m, _)| m.read().uvs.is_some());
        let mut joined = Mesh {
            uvs: any_uvs.then(Vec::new),
            ..Mesh::default()
        };
        let mut kind = ObjectKind::PointCloud;

        for (xf, mesh, part_kind) in &parts {
            if *part_kind == ObjectKind::Mesh {
                kind = ObjectKind::Mesh;
            }

            let mesh = mesh.read();
            let offset = joined.positions.len() as u32;

            joined
                .positions
                .extend(mesh.positions.iter().map(|&p| xf.transform_point3(p)));

            if let Some(uvs) = joined.uvs.as_mut() {
                match mesh.uvs.as_ref() {
                    Some(src) => uvs.extend_from_slice(src),
                    None => uvs.resize(uvs.len() + mesh.positions.len(), [0.0, 0.0]),
                }
            }

            joined.faces.extend(
                mesh.faces
                    .iter()
                    .map(|f| f.iter().map(|&v| v + offset).collect::<Vec<_>>()),
            );
            joined
                .edges
                .extend(mesh.edges.iter().map(|&[a, b]| [a + offset, b + offset]));
        }

        for &id in others.iter().filter(|&&id| id != target) {
            self.remove_object(id)?;
        }

        let head = self
            .object_mut(target)
            .ok_or(SceneError::UnknownObject(target))?;
        head.mesh = joined.into_shared();
        head.kind = kind;
        Ok(())
    }
}
