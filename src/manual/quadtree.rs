use nalgebra::Vector2;
use rayon::prelude::*;
use smallvec::{SmallVec, smallvec};

use crate::shared::{Bounds, Float};

/// Arena index of the root node.
pub const ROOT: usize = 0;

/// Depth at which an occupied leaf stops splitting and becomes a bucket.
pub const DEFAULT_MAX_DEPTH: usize = 48;

/// Snapshot of one particle as inserted into the tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body<F: Float> {
    pub position: Vector2<F>,
    pub mass: F,
    pub index: usize,
}

impl<F: Float> Body<F> {
    pub fn new(position: Vector2<F>, mass: F, index: usize) -> Self {
        Self {
            position,
            mass,
            index,
        }
    }
}

/// Shape of a node. Indices point into the tree's body list (`Leaf`,
/// `Bucket`) or node arena (`Internal`).
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Leaf(Option<usize>),
    Internal([usize; 4]),
    /// Bodies that could not be separated before the depth cutoff.
    Bucket(SmallVec<[usize; 4]>),
}

#[derive(Clone, Debug)]
pub struct Node<F: Float> {
    bounds: Bounds<F>,
    mass: F,
    center_of_mass: Vector2<F>,
    kind: NodeKind,
    depth: usize,
}

impl<F: Float> Node<F> {
    fn new(bounds: Bounds<F>, depth: usize) -> Self {
        Self {
            bounds,
            mass: F::zero(),
            center_of_mass: Vector2::zeros(),
            kind: NodeKind::Leaf(None),
            depth,
        }
    }

    pub fn bounds(&self) -> &Bounds<F> {
        &self.bounds
    }

    pub fn mass(&self) -> F {
        self.mass
    }

    pub fn center_of_mass(&self) -> &Vector2<F> {
        &self.center_of_mass
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn shifted(mut self, node_offset: usize, body_offset: usize) -> Self {
        self.kind = match self.kind {
            NodeKind::Leaf(body) => NodeKind::Leaf(body.map(|b| b + body_offset)),
            NodeKind::Internal(children) => NodeKind::Internal(children.map(|c| c + node_offset)),
            NodeKind::Bucket(bodies) => {
                NodeKind::Bucket(bodies.into_iter().map(|b| b + body_offset).collect())
            }
        };
        self
    }
}

/// Barnes-Hut quadtree for a single step.
///
/// Nodes live in one arena and are addressed by index; children are always
/// stored after their parent, which lets [`QuadTree::aggregate`] run as a
/// single reverse sweep.
#[derive(Clone, Debug)]
pub struct QuadTree<F: Float> {
    nodes: Vec<Node<F>>,
    bodies: Vec<Body<F>>,
    max_depth: usize,
    aggregated: bool,
}

impl<F: Float> QuadTree<F> {
    pub fn new(bounds: Bounds<F>) -> Self {
        Self::with_max_depth(bounds, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(bounds: Bounds<F>, max_depth: usize) -> Self {
        Self {
            nodes: vec![Node::new(bounds, 0)],
            bodies: Vec::new(),
            max_depth,
            aggregated: false,
        }
    }

    /// Inserts every body in order and aggregates. Returns the tree together
    /// with the stable indices of bodies that fell outside `bounds`.
    pub fn build(
        bounds: Bounds<F>,
        bodies: impl IntoIterator<Item = Body<F>>,
        max_depth: usize,
    ) -> (Self, Vec<usize>) {
        let mut tree = Self::with_max_depth(bounds, max_depth);
        let mut rejected = Vec::new();
        for body in bodies {
            if !tree.insert(body.position, body.mass, body.index) {
                rejected.push(body.index);
            }
        }
        tree.aggregate();
        (tree, rejected)
    }

    /// Same tree as [`QuadTree::build`], but the four root quadrants are
    /// populated independently on the rayon pool and merged afterwards.
    pub fn build_partitioned(
        bounds: Bounds<F>,
        bodies: &[Body<F>],
        max_depth: usize,
    ) -> (Self, Vec<usize>) {
        let (inside, outside): (Vec<Body<F>>, Vec<Body<F>>) = bodies
            .iter()
            .copied()
            .partition(|b| bounds.contains(&b.position));
        let rejected = outside.iter().map(|b| b.index).collect();

        if inside.len() < 2 || max_depth == 0 {
            let (tree, _) = Self::build(bounds, inside, max_depth);
            return (tree, rejected);
        }

        let mut quadrants: [Vec<Body<F>>; 4] = Default::default();
        for body in inside {
            quadrants[bounds.quadrant_of(&body.position)].push(body);
        }

        let subtrees: Vec<QuadTree<F>> = Vec::from(quadrants)
            .into_par_iter()
            .enumerate()
            .map(|(orthant, members)| {
                let mut subtree = QuadTree {
                    nodes: vec![Node::new(bounds.quadrant(orthant), 1)],
                    bodies: Vec::with_capacity(members.len()),
                    max_depth,
                    aggregated: false,
                };
                for body in members {
                    subtree.push_body(body);
                }
                subtree
            })
            .collect();

        let mut tree = Self::with_max_depth(bounds, max_depth);
        let mut children = [ROOT; 4];
        for (orthant, subtree) in subtrees.into_iter().enumerate() {
            let node_offset = tree.nodes.len();
            let body_offset = tree.bodies.len();
            children[orthant] = node_offset;
            tree.bodies.extend(subtree.bodies);
            tree.nodes.extend(
                subtree
                    .nodes
                    .into_iter()
                    .map(|node| node.shifted(node_offset, body_offset)),
            );
        }
        tree.nodes[ROOT].kind = NodeKind::Internal(children);
        tree.aggregate();
        (tree, rejected)
    }

    /// Inserts a body. Positions outside the root bounds are not stored and
    /// `false` is returned so the caller can report them.
    pub fn insert(&mut self, position: Vector2<F>, mass: F, index: usize) -> bool {
        if !self.nodes[ROOT].bounds.contains(&position) {
            return false;
        }
        self.push_body(Body::new(position, mass, index));
        true
    }

    // Descends with `quadrant_of` only, so a body accepted at the root always
    // reaches exactly one leaf.
    fn push_body(&mut self, body: Body<F>) {
        let body_idx = self.bodies.len();
        self.bodies.push(body);
        self.aggregated = false;

        let mut node_idx = ROOT;
        loop {
            let depth = self.nodes[node_idx].depth;
            match &self.nodes[node_idx].kind {
                NodeKind::Internal(children) => {
                    let orthant = self.nodes[node_idx].bounds.quadrant_of(&body.position);
                    node_idx = children[orthant];
                }
                NodeKind::Leaf(None) => {
                    self.nodes[node_idx].kind = NodeKind::Leaf(Some(body_idx));
                    return;
                }
                NodeKind::Leaf(Some(held)) => {
                    let held = *held;
                    if depth >= self.max_depth {
                        self.nodes[node_idx].kind = NodeKind::Bucket(smallvec![held, body_idx]);
                        return;
                    }
                    let children = self.subdivide(node_idx);
                    let orthant = self.nodes[node_idx]
                        .bounds
                        .quadrant_of(&self.bodies[held].position);
                    self.nodes[children[orthant]].kind = NodeKind::Leaf(Some(held));
                }
                NodeKind::Bucket(_) => {
                    if let NodeKind::Bucket(members) = &mut self.nodes[node_idx].kind {
                        members.push(body_idx);
                    }
                    return;
                }
            }
        }
    }

    fn subdivide(&mut self, node_idx: usize) -> [usize; 4] {
        let bounds = self.nodes[node_idx].bounds;
        let depth = self.nodes[node_idx].depth + 1;
        let first = self.nodes.len();
        self.nodes
            .extend((0..4).map(|orthant| Node::new(bounds.quadrant(orthant), depth)));
        let children = [first, first + 1, first + 2, first + 3];
        self.nodes[node_idx].kind = NodeKind::Internal(children);
        children
    }

    /// Bottom-up mass and center-of-mass pass. Must run before any force query.
    pub fn aggregate(&mut self) {
        for idx in (0..self.nodes.len()).rev() {
            let (mass, center) = match &self.nodes[idx].kind {
                NodeKind::Leaf(None) => (F::zero(), Vector2::zeros()),
                NodeKind::Leaf(Some(body)) => {
                    let body = &self.bodies[*body];
                    (body.mass, body.position)
                }
                NodeKind::Bucket(members) => weighted_center(
                    members
                        .iter()
                        .map(|&b| (self.bodies[b].mass, self.bodies[b].position)),
                ),
                NodeKind::Internal(children) => weighted_center(
                    children
                        .iter()
                        .map(|&c| (self.nodes[c].mass, self.nodes[c].center_of_mass)),
                ),
            };
            let node = &mut self.nodes[idx];
            node.mass = mass;
            node.center_of_mass = center;
        }
        self.aggregated = true;
    }

    /// Stable indices of all bodies inside `region`.
    pub fn query(&self, region: &Bounds<F>) -> Vec<usize> {
        let mut found = Vec::new();
        let mut stack: SmallVec<[usize; 64]> = smallvec![ROOT];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if !node.bounds.intersects(region) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(None) => {}
                NodeKind::Leaf(Some(body)) => {
                    let body = &self.bodies[*body];
                    if region.contains(&body.position) {
                        found.push(body.index);
                    }
                }
                NodeKind::Bucket(members) => found.extend(
                    members
                        .iter()
                        .map(|&b| &self.bodies[b])
                        .filter(|b| region.contains(&b.position))
                        .map(|b| b.index),
                ),
                NodeKind::Internal(children) => stack.extend(children.iter().rev().copied()),
            }
        }
        found
    }

    pub fn root(&self) -> &Node<F> {
        &self.nodes[ROOT]
    }

    pub fn node(&self, idx: usize) -> &Node<F> {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[Node<F>] {
        &self.nodes
    }

    pub fn body(&self, idx: usize) -> &Body<F> {
        &self.bodies[idx]
    }

    pub fn bodies(&self) -> &[Body<F>] {
        &self.bodies
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn has_no_bodies(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn is_aggregated(&self) -> bool {
        self.aggregated
    }

    pub fn mass(&self) -> F {
        self.nodes[ROOT].mass
    }

    pub fn center_of_mass(&self) -> &Vector2<F> {
        &self.nodes[ROOT].center_of_mass
    }
}

// Zero-mass parts are skipped so an empty subtree never ends up in a division.
fn weighted_center<F: Float>(parts: impl Iterator<Item = (F, Vector2<F>)>) -> (F, Vector2<F>) {
    let mut mass = F::zero();
    let mut weighted = Vector2::zeros();
    for (m, center) in parts {
        if m != F::zero() {
            mass += m;
            weighted += center * m;
        }
    }
    if mass > F::zero() {
        (mass, weighted / mass)
    } else {
        (mass, Vector2::zeros())
    }
}
