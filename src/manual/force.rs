use nalgebra::Vector2;
use smallvec::{SmallVec, smallvec};

use super::quadtree::{Body, NodeKind, QuadTree, ROOT};
use crate::shared::{Float, SimulationSettings};

/// Softened gravity with the Barnes-Hut opening criterion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BarnesHut<F: Float> {
    pub g: F,
    pub softening: F,
    pub theta: F,
}

impl<F: Float> BarnesHut<F> {
    pub fn new(g: F, softening: F, theta: F) -> Self {
        Self {
            g,
            softening,
            theta,
        }
    }

    pub fn from_settings(settings: &SimulationSettings<F>) -> Self {
        Self::new(settings.g, settings.g_soft, settings.theta)
    }

    /// Force on a body of mass `m1` at `p1` exerted by `m2` at `p2`.
    ///
    /// The magnitude is `G m1 m2 / (d^2 + eps^2)` and always points from `p1`
    /// toward `p2`. Coincident bodies exert nothing on each other.
    pub fn attraction(&self, p1: &Vector2<F>, m1: F, p2: &Vector2<F>, m2: F) -> Vector2<F> {
        let r = p2 - p1;
        let d2 = r.norm_squared();
        if d2 == F::zero() {
            return Vector2::zeros();
        }
        let magnitude = self.g * m1 * m2 / (d2 + self.softening * self.softening);
        r * (magnitude / d2.sqrt())
    }

    /// Net force on the body `index` at `position`, walking an aggregated tree.
    pub fn calc_force(
        &self,
        tree: &QuadTree<F>,
        position: &Vector2<F>,
        mass: F,
        index: usize,
    ) -> Vector2<F> {
        debug_assert!(tree.is_aggregated(), "force query on a tree that was not aggregated");

        let mut force = Vector2::zeros();
        let mut stack: SmallVec<[usize; 64]> = smallvec![ROOT];
        while let Some(node_idx) = stack.pop() {
            let node = tree.node(node_idx);
            match node.kind() {
                NodeKind::Leaf(None) => {}
                NodeKind::Leaf(Some(body)) => {
                    let body = tree.body(*body);
                    if body.index != index {
                        force += self.attraction(position, mass, &body.position, body.mass);
                    }
                }
                NodeKind::Bucket(members) => {
                    for body in members.iter().map(|&b| tree.body(b)) {
                        if body.index != index {
                            force += self.attraction(position, mass, &body.position, body.mass);
                        }
                    }
                }
                NodeKind::Internal(children) => {
                    let distance = (node.center_of_mass() - position).norm();
                    // distance == 0 gives an infinite ratio, so the node is opened
                    if node.bounds().width() / distance < self.theta {
                        force += self.attraction(position, mass, node.center_of_mass(), node.mass());
                    } else {
                        stack.extend(children.iter().rev().copied());
                    }
                }
            }
        }
        force
    }

    /// All-pairs reference sum over `bodies`, skipping `index`.
    pub fn brute_force(
        &self,
        bodies: &[Body<F>],
        position: &Vector2<F>,
        mass: F,
        index: usize,
    ) -> Vector2<F> {
        bodies
            .iter()
            .filter(|b| b.index != index)
            .fold(Vector2::zeros(), |acc, b| {
                acc + self.attraction(position, mass, &b.position, b.mass)
            })
    }
}
