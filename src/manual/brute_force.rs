use log::{debug, warn};
use nalgebra::Vector2;

use super::force::BarnesHut;
use crate::shared::{
    BoundaryPolicy, Bounds, Float, Integrator, Particle, SemiImplicitEuler, Simulation,
    SimulationSettings, VelocityStats,
};

/// All-pairs O(n^2) reference with the same softened force and boundary
/// handling as [`super::BarnesHutSimulation`].
#[derive(Clone)]
pub struct BruteForceSimulation<F: Float, P, I = SemiImplicitEuler>
where
    P: Particle<F>,
    I: Integrator<F, P>,
{
    points: Vec<P>,
    bounds: Bounds<F>,
    integrator: I,
    settings: SimulationSettings<F>,
    stats: VelocityStats<F>,
    outside: usize,
}

impl<F: Float, P, I> Simulation<F, P, I> for BruteForceSimulation<F, P, I>
where
    P: Particle<F>,
    I: Integrator<F, P>,
{
    fn new(points: Vec<P>, integrator: I, bounds: Bounds<F>) -> Self {
        Self {
            points,
            bounds,
            integrator,
            settings: SimulationSettings::default(),
            stats: VelocityStats::default(),
            outside: 0,
        }
    }

    fn init(&mut self) {
        self.integrator.init();
        self.stats = VelocityStats::default();
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
            if self.settings.boundary == BoundaryPolicy::Clamp
                && !self.bounds.contains(point.position())
            {
                *point.position_mut() = self.bounds.clamp(point.position());
            }
        }

        // particles outside the domain still feel gravity but exert none,
        // the same as being left out of the tree
        let inside: Vec<bool> = self
            .points
            .iter()
            .map(|p| self.bounds.contains(p.position()))
            .collect();
        let outside = inside.iter().filter(|&&i| !i).count();
        if outside > 0 && outside != self.outside {
            warn!("{outside} particle(s) outside the domain exert no force");
        } else if outside > 0 {
            debug!("{outside} particle(s) still outside the domain");
        }
        self.outside = outside;

        let evaluator = BarnesHut::from_settings(&self.settings);
        for i in 0..self.points.len() {
            for j in 0..i {
                let force = evaluator.attraction(
                    self.points[i].position(),
                    self.points[i].get_mass(),
                    self.points[j].position(),
                    self.points[j].get_mass(),
                );
                if inside[j] {
                    *self.points[i].force_mut() += force;
                }
                if inside[i] {
                    *self.points[j].force_mut() -= force;
                }
            }
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
        self.points
            .iter()
            .filter(|p| region.contains(p.position()))
            .map(|p| p.index())
            .collect()
    }
}
