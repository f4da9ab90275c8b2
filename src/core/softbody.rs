//! Deformable bodies made of mass nodes joined by distance links.
//!
//! Public accessors take and return world units; node state is stored in
//! backend units so the solver can use it directly.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use glam::Vec3;
use log::warn;

use crate::{
    config::SoftBodyConfig,
    core::{handle::ObjectHandle, mesh::Aabb, types::Transform},
    error::{CollisionError, CollisionResult},
    scene::AnchorAnimationControl,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftNode {
    pub position: Vec3,
    pub previous: Vec3,
    pub velocity: Vec3,
    pub force: Vec3,
    pub mass: f32,
    pub normal: Vec3,
}

impl SoftNode {
    fn at(position: Vec3, mass: f32) -> Self {
        Self {
            position,
            previous: position,
            velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            mass,
            normal: Vec3::Y,
        }
    }

    pub fn inverse_mass(&self) -> f32 {
        if self.mass > f32::EPSILON {
            1.0 / self.mass
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftLink {
    pub a: usize,
    pub b: usize,
    pub rest_length: f32,
    /// Bending links span two edges and use the angular stiffness.
    pub bending: bool,
}

/// What a pinned vertex follows.
#[derive(Clone)]
pub enum SoftAnchor {
    Fixed(Vec3),
    /// Follows a rigid body; the body-space offset is captured on first use.
    Rigid {
        body: ObjectHandle,
        local: Option<Vec3>,
    },
    Animated(Arc<dyn AnchorAnimationControl>),
}

impl std::fmt::Debug for SoftAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoftAnchor::Fixed(p) => f.debug_tuple("Fixed").field(p).finish(),
            SoftAnchor::Rigid { body, local } => f
                .debug_struct("Rigid")
                .field("body", body)
                .field("local", local)
                .finish(),
            SoftAnchor::Animated(_) => f.write_str("Animated"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AnchorSlot {
    pub anchor: SoftAnchor,
    /// Backend-unit target refreshed at the start of every step.
    pub target: Option<Vec3>,
}

#[derive(Debug, Clone)]
pub struct SoftBody {
    pub(crate) nodes: Vec<SoftNode>,
    pub(crate) links: Vec<SoftLink>,
    pub(crate) triangles: Vec<[usize; 3]>,
    pub(crate) anchors: BTreeMap<usize, AnchorSlot>,
    pub(crate) config: SoftBodyConfig,
    pub(crate) wind: Vec3,
    pub(crate) rest_volume: f32,
    pub(crate) unit_scale: f32,
    gravity_enabled: bool,
}

impl SoftBody {
    fn from_parts(
        positions: Vec<Vec3>,
        triangles: Vec<[usize; 3]>,
        links: Vec<(usize, usize)>,
        config: SoftBodyConfig,
    ) -> Self {
        let mass = 1.0 / positions.len().max(1) as f32;
        let nodes: Vec<SoftNode> = positions.iter().map(|&p| SoftNode::at(p, mass)).collect();
        let links = links
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| SoftLink {
                a,
                b,
                rest_length: nodes[a].position.distance(nodes[b].position),
                bending: false,
            })
            .collect();
        let mut body = Self {
            nodes,
            links,
            triangles,
            anchors: BTreeMap::new(),
            config,
            wind: Vec3::ZERO,
            rest_volume: 0.0,
            unit_scale: 1.0,
            gravity_enabled: true,
        };
        body.rest_volume = body.enclosed_volume();
        body.update_normals();
        body
    }

    /// Chain of `segments` links between `start` and `end`.
    pub fn rope(start: Vec3, end: Vec3, segments: usize) -> Self {
        let segments = segments.max(1);
        let positions = (0..=segments)
            .map(|i| start.lerp(end, i as f32 / segments as f32))
            .collect();
        Self::rope_with(positions)
    }

    /// Chain through the given points, in order.
    pub fn rope_from_vertices(vertices: &[Vec3]) -> CollisionResult<Self> {
        if vertices.len() < 2 {
            warn!("a rope needs at least two vertices, got {}", vertices.len());
            return Err(CollisionError::DegenerateGeometry("rope needs two vertices"));
        }
        Ok(Self::rope_with(vertices.to_vec()))
    }

    fn rope_with(positions: Vec<Vec3>) -> Self {
        let count = positions.len();
        let links = (1..count).map(|i| (i - 1, i)).collect();
        let mut body = Self::from_parts(positions, Vec::new(), links, SoftBodyConfig::rope());
        for i in 2..count {
            body.push_bending_link(i - 2, i);
        }
        body
    }

    /// Rectangular patch. Corners are ordered `(0,0)`, `(1,0)`, `(0,1)`, `(1,1)`.
    pub fn cloth(
        corners: [Vec3; 4],
        segments_u: usize,
        segments_v: usize,
        with_diagonals: bool,
    ) -> Self {
        let (nu, nv) = (segments_u.max(1) + 1, segments_v.max(1) + 1);
        let [c00, c10, c01, c11] = corners;
        let mut positions = Vec::with_capacity(nu * nv);
        for j in 0..nv {
            let v = j as f32 / (nv - 1) as f32;
            for i in 0..nu {
                let u = i as f32 / (nu - 1) as f32;
                positions.push(c00.lerp(c10, u).lerp(c01.lerp(c11, u), v));
            }
        }
        let index = |i: usize, j: usize| j * nu + i;
        let mut links = Vec::new();
        let mut triangles = Vec::new();
        for j in 0..nv {
            for i in 0..nu {
                if i + 1 < nu {
                    links.push((index(i, j), index(i + 1, j)));
                }
                if j + 1 < nv {
                    links.push((index(i, j), index(i, j + 1)));
                }
                if i + 1 < nu && j + 1 < nv {
                    let (a, b, c, d) = (
                        index(i, j),
                        index(i + 1, j),
                        index(i, j + 1),
                        index(i + 1, j + 1),
                    );
                    triangles.push([a, c, b]);
                    triangles.push([b, c, d]);
                    if with_diagonals {
                        links.push((a, d));
                        links.push((b, c));
                    }
                }
            }
        }
        let mut body = Self::from_parts(positions, triangles, links, SoftBodyConfig::cloth());
        for j in 0..nv {
            for i in 0..nu {
                if i + 2 < nu {
                    body.push_bending_link(index(i, j), index(i + 2, j));
                }
                if j + 2 < nv {
                    body.push_bending_link(index(i, j), index(i, j + 2));
                }
            }
        }
        body
    }

    /// Deformable copy of a triangle mesh placed by `transform`.
    pub fn from_mesh(
        vertices: &[Vec3],
        triangles: &[[u32; 3]],
        transform: &Transform,
    ) -> CollisionResult<Self> {
        let count = vertices.len();
        if count == 0 || triangles.is_empty() {
            warn!("soft body mesh has no triangles");
            return Err(CollisionError::DegenerateGeometry("soft body mesh is empty"));
        }
        if let Some(bad) = triangles.iter().flatten().find(|&&i| i as usize >= count) {
            warn!("soft body mesh references vertex {bad} of {count}");
            return Err(CollisionError::VertexOutOfRange {
                index: *bad as usize,
                count,
            });
        }
        let positions = vertices.iter().map(|&v| transform.transform_point(v)).collect();
        let tris: Vec<[usize; 3]> = triangles
            .iter()
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
            .collect();

        // Unique edges, remembering the vertex opposite each edge for bending links.
        let mut edges: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for t in &tris {
            for k in 0..3 {
                let (a, b, opposite) = (t[k], t[(k + 1) % 3], t[(k + 2) % 3]);
                edges.entry((a.min(b), a.max(b))).or_default().push(opposite);
            }
        }
        let mut keys: Vec<_> = edges.keys().copied().collect();
        keys.sort_unstable();
        let mut body = Self::from_parts(positions, tris, keys.clone(), SoftBodyConfig::default());
        for key in keys {
            if let Some(opposite) = edges.get(&key) {
                if let &[p, q] = opposite.as_slice() {
                    body.push_bending_link(p, q);
                }
            }
        }
        Ok(body)
    }

    fn push_bending_link(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.links.push(SoftLink {
            a,
            b,
            rest_length: self.nodes[a].position.distance(self.nodes[b].position),
            bending: true,
        });
    }

    fn check_index(&self, index: usize) -> CollisionResult<()> {
        if index < self.nodes.len() {
            Ok(())
        } else {
            warn!("soft body vertex {index} out of range ({} vertices)", self.nodes.len());
            Err(CollisionError::VertexOutOfRange {
                index,
                count: self.nodes.len(),
            })
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, index: usize) -> Option<[usize; 3]> {
        self.triangles.get(index).copied()
    }

    pub fn links(&self) -> &[SoftLink] {
        &self.links
    }

    pub fn vertex_position(&self, index: usize) -> CollisionResult<Vec3> {
        self.check_index(index)?;
        Ok(self.nodes[index].position / self.unit_scale)
    }

    pub fn vertex_normal(&self, index: usize) -> CollisionResult<Vec3> {
        self.check_index(index)?;
        Ok(self.nodes[index].normal)
    }

    pub fn vertex_velocity(&self, index: usize) -> CollisionResult<Vec3> {
        self.check_index(index)?;
        Ok(self.nodes[index].velocity / self.unit_scale)
    }

    pub fn vertex_mass(&self, index: usize) -> CollisionResult<f32> {
        self.check_index(index)?;
        Ok(self.nodes[index].mass)
    }

    pub fn set_vertex_mass(&mut self, index: usize, mass: f32) -> CollisionResult<()> {
        self.check_index(index)?;
        self.nodes[index].mass = mass.max(0.0);
        Ok(())
    }

    pub fn mass(&self) -> f32 {
        self.nodes.iter().map(|n| n.mass).sum()
    }

    /// Spreads `mass` evenly over every vertex.
    pub fn set_mass(&mut self, mass: f32) {
        let per_node = mass.max(0.0) / self.nodes.len().max(1) as f32;
        for node in &mut self.nodes {
            node.mass = per_node;
        }
    }

    /// Pins a vertex where it currently is.
    pub fn anchor_vertex(&mut self, index: usize) -> CollisionResult<()> {
        self.check_index(index)?;
        let position = self.nodes[index].position;
        self.anchors.insert(
            index,
            AnchorSlot {
                anchor: SoftAnchor::Fixed(position),
                target: Some(position),
            },
        );
        Ok(())
    }

    /// Pins a vertex to a rigid body of the same sector.
    pub fn anchor_vertex_to_body(&mut self, index: usize, body: ObjectHandle) -> CollisionResult<()> {
        self.check_index(index)?;
        self.anchors.insert(
            index,
            AnchorSlot {
                anchor: SoftAnchor::Rigid { body, local: None },
                target: None,
            },
        );
        Ok(())
    }

    /// Pins a vertex to a position supplied every step by `control`.
    pub fn anchor_vertex_animated(
        &mut self,
        index: usize,
        control: Arc<dyn AnchorAnimationControl>,
    ) -> CollisionResult<()> {
        self.check_index(index)?;
        self.anchors.insert(
            index,
            AnchorSlot {
                anchor: SoftAnchor::Animated(control),
                target: None,
            },
        );
        Ok(())
    }

    /// Moves the target of a fixed anchor to a new world position.
    pub fn update_anchor(&mut self, index: usize, position: Vec3) -> CollisionResult<()> {
        self.check_index(index)?;
        let scaled = position * self.unit_scale;
        match self.anchors.get_mut(&index) {
            Some(slot) => {
                if let SoftAnchor::Fixed(target) = &mut slot.anchor {
                    *target = scaled;
                }
                slot.target = Some(scaled);
                Ok(())
            }
            None => {
                warn!("soft body vertex {index} has no anchor to update");
                Err(CollisionError::InvalidHandle)
            }
        }
    }

    pub fn remove_anchor(&mut self, index: usize) -> CollisionResult<()> {
        self.check_index(index)?;
        self.anchors.remove(&index);
        Ok(())
    }

    pub fn is_anchored(&self, index: usize) -> bool {
        self.anchors.contains_key(&index)
    }

    pub fn anchor(&self, index: usize) -> Option<&SoftAnchor> {
        self.anchors.get(&index).map(|slot| &slot.anchor)
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        let scaled = velocity * self.unit_scale;
        for node in &mut self.nodes {
            node.velocity = scaled;
        }
    }

    pub fn set_vertex_linear_velocity(&mut self, index: usize, velocity: Vec3) -> CollisionResult<()> {
        self.check_index(index)?;
        self.nodes[index].velocity = velocity * self.unit_scale;
        Ok(())
    }

    /// Applies `force` to every vertex.
    pub fn add_force(&mut self, force: Vec3) {
        let scaled = force * self.unit_scale;
        for node in &mut self.nodes {
            node.force += scaled;
        }
    }

    pub fn add_vertex_force(&mut self, index: usize, force: Vec3) -> CollisionResult<()> {
        self.check_index(index)?;
        self.nodes[index].force += force * self.unit_scale;
        Ok(())
    }

    pub fn wind_velocity(&self) -> Vec3 {
        self.wind / self.unit_scale
    }

    pub fn set_wind_velocity(&mut self, wind: Vec3) {
        self.wind = wind * self.unit_scale;
    }

    pub fn gravity_enabled(&self) -> bool {
        self.gravity_enabled
    }

    pub fn set_gravity_enabled(&mut self, enabled: bool) {
        self.gravity_enabled = enabled;
    }

    pub fn config(&self) -> &SoftBodyConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SoftBodyConfig) {
        self.config = config;
    }

    /// Shorthand for the linear stiffness.
    pub fn set_rigidity(&mut self, rigidity: f32) {
        self.set_linear_stiffness(rigidity);
    }

    pub fn set_linear_stiffness(&mut self, stiffness: f32) {
        self.config.linear_stiffness = stiffness.clamp(0.0, 1.0);
    }

    pub fn set_angular_stiffness(&mut self, stiffness: f32) {
        self.config.angular_stiffness = stiffness.clamp(0.0, 1.0);
    }

    pub fn set_volume_stiffness(&mut self, stiffness: f32) {
        self.config.volume_stiffness = stiffness.clamp(0.0, 1.0);
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.config.damping = damping.clamp(0.0, 1.0);
    }

    pub fn set_pressure(&mut self, pressure: f32) {
        self.config.pressure = pressure;
    }

    pub fn set_drag(&mut self, drag: f32) {
        self.config.drag = drag.max(0.0);
    }

    pub fn set_lift(&mut self, lift: f32) {
        self.config.lift = lift.max(0.0);
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.config.friction = friction.clamp(0.0, 1.0);
    }

    pub fn set_position_iterations(&mut self, iterations: u32) {
        self.config.position_iterations = iterations.max(1);
    }

    pub fn set_velocity_iterations(&mut self, iterations: u32) {
        self.config.velocity_iterations = iterations;
    }

    pub fn set_soft_rigid_clusters(&mut self, enabled: bool) {
        self.config.soft_rigid_clusters = enabled;
    }

    pub fn set_soft_soft_clusters(&mut self, enabled: bool) {
        self.config.soft_soft_clusters = enabled;
    }

    /// Mean node position in world units.
    pub fn centroid(&self) -> Vec3 {
        self.backend_centroid() / self.unit_scale
    }

    pub(crate) fn backend_centroid(&self) -> Vec3 {
        if self.nodes.is_empty() {
            return Vec3::ZERO;
        }
        self.nodes.iter().map(|n| n.position).sum::<Vec3>() / self.nodes.len() as f32
    }

    /// Backend-unit bounds including the node radius.
    pub(crate) fn aabb(&self) -> Aabb {
        let points: Vec<Vec3> = self.nodes.iter().map(|n| n.position).collect();
        Aabb::from_points(&points).expanded(self.config.node_radius * self.unit_scale)
    }

    /// Volume enclosed by the triangles; zero for open surfaces.
    pub(crate) fn enclosed_volume(&self) -> f32 {
        let origin = self.backend_centroid();
        self.triangles
            .iter()
            .map(|t| {
                let a = self.nodes[t[0]].position - origin;
                let b = self.nodes[t[1]].position - origin;
                let c = self.nodes[t[2]].position - origin;
                a.dot(b.cross(c)) / 6.0
            })
            .sum()
    }

    pub(crate) fn update_normals(&mut self) {
        for node in &mut self.nodes {
            node.normal = Vec3::ZERO;
        }
        for t in &self.triangles {
            let (a, b, c) = (
                self.nodes[t[0]].position,
                self.nodes[t[1]].position,
                self.nodes[t[2]].position,
            );
            let n = (b - a).cross(c - a);
            for &i in t {
                self.nodes[i].normal += n;
            }
        }
        for node in &mut self.nodes {
            node.normal = node.normal.normalize_or(Vec3::Y);
        }
    }

    /// Moves every node by a backend-unit offset.
    pub(crate) fn translate(&mut self, delta: Vec3) {
        for node in &mut self.nodes {
            node.position += delta;
            node.previous += delta;
        }
        for slot in self.anchors.values_mut() {
            if let SoftAnchor::Fixed(target) = &mut slot.anchor {
                *target += delta;
            }
        }
    }

    pub(crate) fn rescale(&mut self, scale: f32) {
        let ratio = scale / self.unit_scale;
        for node in &mut self.nodes {
            node.position *= ratio;
            node.previous *= ratio;
            node.velocity *= ratio;
            node.force *= ratio;
        }
        for link in &mut self.links {
            link.rest_length *= ratio;
        }
        for slot in self.anchors.values_mut() {
            match &mut slot.anchor {
                SoftAnchor::Fixed(p) => *p *= ratio,
                SoftAnchor::Rigid { local, .. } => {
                    if let Some(l) = local {
                        *l *= ratio;
                    }
                }
                SoftAnchor::Animated(_) => {}
            }
            slot.target = slot.target.map(|t| t * ratio);
        }
        self.wind *= ratio;
        self.rest_volume *= ratio * ratio * ratio;
        self.unit_scale = scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rope_has_structural_and_bending_links() {
        let rope = SoftBody::rope(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), 4);
        assert_eq!(rope.vertex_count(), 5);
        assert_eq!(rope.links().iter().filter(|l| !l.bending).count(), 4);
        assert_eq!(rope.links().iter().filter(|l| l.bending).count(), 3);
        assert_relative_eq!(rope.links()[0].rest_length, 1.0);
        assert_relative_eq!(rope.mass(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn cloth_grid_layout() {
        let cloth = SoftBody::cloth(
            [
                Vec3::ZERO,
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 2.0),
                Vec3::new(2.0, 0.0, 2.0),
            ],
            2,
            2,
            true,
        );
        assert_eq!(cloth.vertex_count(), 9);
        assert_eq!(cloth.triangle_count(), 8);
        let structural = cloth.links().iter().filter(|l| !l.bending).count();
        assert_eq!(structural, 12 + 8);
        let n = cloth.vertex_normal(4).expect("center vertex");
        assert_relative_eq!(n.y.abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn out_of_range_vertex_is_rejected_without_effect() {
        let mut rope = SoftBody::rope(Vec3::ZERO, Vec3::X, 1);
        assert_eq!(
            rope.set_vertex_mass(7, 3.0),
            Err(CollisionError::VertexOutOfRange { index: 7, count: 2 })
        );
        assert!(rope.anchor_vertex(9).is_err());
        assert_eq!(rope.anchor_count(), 0);
    }

    #[test]
    fn mesh_rejects_bad_indices() {
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::Z];
        assert!(SoftBody::from_mesh(&vertices, &[[0, 1, 5]], &Transform::IDENTITY).is_err());
        let body = SoftBody::from_mesh(&vertices, &[[0, 1, 2]], &Transform::from_position(Vec3::Y))
            .expect("valid mesh");
        assert_relative_eq!(body.vertex_position(0).expect("vertex").y, 1.0);
    }

    #[test]
    fn rescale_preserves_world_positions() {
        let mut rope = SoftBody::rope(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), 2);
        rope.rescale(10.0);
        assert_relative_eq!(rope.vertex_position(2).expect("vertex").x, 2.0);
        assert_relative_eq!(rope.links()[0].rest_length, 10.0);
    }
}
