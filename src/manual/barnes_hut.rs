use log::{debug, warn};
use nalgebra::Vector2;
use rayon::prelude::*;

use super::force::BarnesHut;
use super::quadtree::{Body, QuadTree};
use crate::shared::{
    BoundaryPolicy, Bounds, Float, Integrator, Particle, SemiImplicitEuler, Simulation,
    SimulationSettings, VelocityStats,
};

#[derive(Clone)]
pub struct BarnesHutSimulation<F: Float, P, I = SemiImplicitEuler>
where
    P: Particle<F>,
    I: Integrator<F, P>,
{
    points: Vec<P>,
    tree: Option<QuadTree<F>>,
    bounds: Bounds<F>,
    integrator: I,
    settings: SimulationSettings<F>,
    stats: VelocityStats<F>,
    forces: Vec<Vector2<F>>,
    dropped: Vec<usize>,
}

impl<F: Float, P, I> BarnesHutSimulation<F, P, I>
where
    P: Particle<F> + Send + Sync,
    I: Integrator<F, P>,
{
    fn bodies(&self) -> Vec<Body<F>> {
        self.points
            .iter()
            .map(|p| Body::new(*p.position(), p.get_mass(), p.index()))
            .collect()
    }

    fn apply_boundary(&mut self) {
        if self.settings.boundary != BoundaryPolicy::Clamp {
            return;
        }
        let bounds = self.bounds;
        for point in self.points.iter_mut() {
            if !bounds.contains(point.position()) {
                let clamped = bounds.clamp(point.position());
                debug!("clamping particle {} back into the domain", point.index());
                *point.position_mut() = clamped;
            }
        }
    }

    fn build_tree(&mut self) {
        self.apply_boundary();
        let bodies = self.bodies();
        let (tree, dropped) = if self.settings.parallel_build {
            QuadTree::build_partitioned(self.bounds, &bodies, self.settings.max_depth)
        } else {
            QuadTree::build(self.bounds, bodies, self.settings.max_depth)
        };

        self.report_dropped(&dropped);
        debug!(
            "built tree with {} nodes, depth {}, mass {}",
            tree.node_count(),
            tree.depth(),
            tree.mass()
        );
        self.tree = Some(tree);
        self.dropped = dropped;
    }

    // Warns with the full list only when it differs from the previous step's.
    fn report_dropped(&self, dropped: &[usize]) -> bool {
        if dropped.is_empty() {
            return false;
        }
        if dropped == self.dropped.as_slice() {
            debug!("{} particle(s) still outside the domain", dropped.len());
            return false;
        }
        warn!(
            "{} particle(s) outside the domain left out of the force field: {:?}",
            dropped.len(),
            dropped
        );
        true
    }

    /// Tree from the most recent force pass.
    pub fn tree(&self) -> Option<&QuadTree<F>> {
        self.tree.as_ref()
    }

    /// Stable indices of the particles left out of the latest tree.
    pub fn dropped(&self) -> &[usize] {
        &self.dropped
    }
}

impl<F: Float, P, I> Simulation<F, P, I> for BarnesHutSimulation<F, P, I>
where
    P: Particle<F> + Send + Sync,
    I: Integrator<F, P>,
{
    fn new(points: Vec<P>, integrator: I, bounds: Bounds<F>) -> Self {
        Self {
            forces: Vec::with_capacity(points.len()),
            points,
            tree: None,
            bounds,
            integrator,
            settings: SimulationSettings::default(),
            stats: VelocityStats::default(),
            dropped: Vec::new(),
        }
    }

    fn init(&mut self) {
        self.integrator.init();
        self.stats = VelocityStats::default();
        self.build_tree();
    }

    fn settings(&self) -> &SimulationSettings<F> {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut SimulationSettings<F> {
        &mut self.settings
    }

    fn bounds(&self) -> &Bounds<F> {
        &self.bounds
    }

    fn update_forces(&mut self) {
        for point in self.points.iter_mut() {
            *point.force_mut() = Vector2::zeros();
        }

        self.build_tree();
        let Some(tree) = self.tree.as_ref() else {
            return;
        };

        // every force is computed against the same frozen tree before any
        // particle moves
        let evaluator = BarnesHut::from_settings(&self.settings);
        let force_on = |p: &P| evaluator.calc_force(tree, p.position(), p.get_mass(), p.index());
        if self.settings.parallel_forces {
            self.points
                .par_iter()
                .map(force_on)
                .collect_into_vec(&mut self.forces);
        } else {
            self.forces.clear();
            self.forces.extend(self.points.iter().map(force_on));
        }

        for (point, force) in self.points.iter_mut().zip(&self.forces) {
            *point.force_mut() += force;
        }
    }

    fn step_by(&mut self, dt: F) -> VelocityStats<F> {
        self.update_forces();
        self.integrator.integrate(&mut self.points, dt);
        self.stats.update(&self.points);
        self.stats
    }

    fn stats(&self) -> VelocityStats<F> {
        self.stats
    }

    fn add_point(&mut self, point: P) {
        self.points.push(point);
    }

    fn get_points(&self) -> &[P] {
        &self.points
    }

    fn query(&self, region: &Bounds<F>) -> Vec<usize> {
        match self.tree {
            Some(ref tree) => tree.query(region),
            None => self
                .points
                .iter()
                .filter(|p| region.contains(p.position()))
                .map(|p| p.index())
                .collect(),
        }
    }
}
