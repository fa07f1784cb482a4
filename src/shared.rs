// This file defines shared behavior for the tree-based and brute force N-body simulations.

use anyhow::ensure;
use nalgebra::{RealField, Vector2};
use serde::Deserialize;

pub trait Float: RealField + Copy + Send + Sync + 'static {}

impl<T: RealField + Copy + Send + Sync + 'static> Float for T {}

pub trait Particle<F: Float>: Clone {
    fn new(position: Vector2<F>, velocity: Vector2<F>, mass: F, radius: F, index: usize) -> Self;
    fn position(&self) -> &Vector2<F>;
    fn velocity(&self) -> &Vector2<F>;
    fn force(&self) -> &Vector2<F>;
    fn position_mut(&mut self) -> &mut Vector2<F>;
    fn velocity_mut(&mut self) -> &mut Vector2<F>;
    fn force_mut(&mut self) -> &mut Vector2<F>;
    fn get_mass(&self) -> F;
    #[allow(unused)]
    fn get_radius(&self) -> F;
    /// Stable identifier, unique within a run. Only used to tell bodies apart.
    fn index(&self) -> usize;
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointParticle<F: Float> {
    position: Vector2<F>,
    velocity: Vector2<F>,
    force: Vector2<F>,
    mass: F,
    radius: F,
    index: usize,
}

impl<F: Float> Particle<F> for PointParticle<F> {
    fn new(position: Vector2<F>, velocity: Vector2<F>, mass: F, radius: F, index: usize) -> Self {
        Self {
            position,
            velocity,
            force: Vector2::zeros(),
            mass,
            radius,
            index,
        }
    }

    fn position(&self) -> &Vector2<F> {
        &self.position
    }

    fn velocity(&self) -> &Vector2<F> {
        &self.velocity
    }

    fn force(&self) -> &Vector2<F> {
        &self.force
    }

    fn position_mut(&mut self) -> &mut Vector2<F> {
        &mut self.position
    }

    fn velocity_mut(&mut self) -> &mut Vector2<F> {
        &mut self.velocity
    }

    fn force_mut(&mut self) -> &mut Vector2<F> {
        &mut self.force
    }

    fn get_mass(&self) -> F {
        self.mass
    }

    fn get_radius(&self) -> F {
        self.radius
    }

    fn index(&self) -> usize {
        self.index
    }
}

/// Axis-aligned rectangle anchored at its top-left corner.
///
/// `contains` is half-open: the left and top edges belong to the rectangle,
/// the right and bottom edges do not. Sibling quadrants therefore never share
/// a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds<F: Float> {
    anchor: Vector2<F>,
    width: F,
    height: F,
}

impl<F: Float> Bounds<F> {
    pub fn new(anchor: Vector2<F>, width: F, height: F) -> Self {
        Self {
            anchor,
            width,
            height,
        }
    }

    /// Rectangle spanning `[0, width) x [0, height)`.
    pub fn from_size(width: F, height: F) -> Self {
        Self::new(Vector2::zeros(), width, height)
    }

    pub fn anchor(&self) -> &Vector2<F> {
        &self.anchor
    }

    pub fn width(&self) -> F {
        self.width
    }

    pub fn height(&self) -> F {
        self.height
    }

    pub fn max(&self) -> Vector2<F> {
        self.anchor + Vector2::new(self.width, self.height)
    }

    pub fn center(&self) -> Vector2<F> {
        self.anchor + Vector2::new(self.width, self.height) * nalgebra::convert::<f64, F>(0.5)
    }

    pub fn contains(&self, point: &Vector2<F>) -> bool {
        self.anchor.x <= point.x
            && self.anchor.y <= point.y
            && self.anchor.x + self.width > point.x
            && self.anchor.y + self.height > point.y
    }

    /// Closed overlap test; rectangles that only touch on an edge intersect.
    pub fn intersects(&self, other: &Bounds<F>) -> bool {
        let up = other.anchor.y + other.height < self.anchor.y;
        let down = other.anchor.y > self.anchor.y + self.height;
        let left = other.anchor.x + other.width < self.anchor.x;
        let right = other.anchor.x > self.anchor.x + self.width;
        !(up || down || left || right)
    }

    fn midpoint(&self) -> Vector2<F> {
        let half: F = nalgebra::convert(0.5);
        Vector2::new(
            self.anchor.x + self.width * half,
            self.anchor.y + self.height * half,
        )
    }

    /// Quarter `orthant` of this rectangle, in the order top-left, top-right,
    /// bottom-left, bottom-right.
    pub fn quadrant(&self, orthant: usize) -> Bounds<F> {
        let half: F = nalgebra::convert(0.5);
        let mid = self.midpoint();
        let x = if orthant & 1 == 0 { self.anchor.x } else { mid.x };
        let y = if orthant & 2 == 0 { self.anchor.y } else { mid.y };
        Bounds::new(Vector2::new(x, y), self.width * half, self.height * half)
    }

    /// Index of the quadrant a point falls into. Points on the split lines go
    /// right and down, matching the half-open `contains` of the children.
    pub fn quadrant_of(&self, point: &Vector2<F>) -> usize {
        let mid = self.midpoint();
        let mut orthant = 0;
        if point.x >= mid.x {
            orthant |= 1;
        }
        if point.y >= mid.y {
            orthant |= 2;
        }
        orthant
    }

    /// Nearest point that `contains` accepts.
    pub fn clamp(&self, point: &Vector2<F>) -> Vector2<F> {
        let max = self.max();
        let eps = F::default_epsilon() * nalgebra::convert(4.0);
        let limit = |lo: F, hi: F, extent: F, v: F| -> F {
            let inner = hi - hi.abs().max(extent) * eps;
            v.max(lo).min(inner).max(lo)
        };
        Vector2::new(
            limit(self.anchor.x, max.x, self.width, point.x),
            limit(self.anchor.y, max.y, self.height, point.y),
        )
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.width > F::zero() && self.height > F::zero(),
            "bounds must have a positive extent, got {} x {}",
            self.width,
            self.height
        );
        ensure!(
            self.anchor.x.is_finite() && self.anchor.y.is_finite(),
            "bounds anchor must be finite"
        );
        Ok(())
    }
}

/// What a step does with a particle that has left the domain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryPolicy {
    /// Leave it out of this step's tree and report it.
    #[default]
    Drop,
    /// Move it back onto the nearest in-bounds position before building.
    Clamp,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationSettings<F: Float> {
    pub g: F,
    pub g_soft: F,
    pub theta: F,
    pub dt: F,
    pub max_depth: usize,
    pub boundary: BoundaryPolicy,
    pub parallel_forces: bool,
    pub parallel_build: bool,
}

impl<F: Float> Default for SimulationSettings<F> {
    fn default() -> Self {
        Self {
            g: nalgebra::convert(0.04),
            g_soft: nalgebra::convert(2.4),
            theta: nalgebra::convert(0.5),
            dt: F::one(),
            max_depth: crate::manual::DEFAULT_MAX_DEPTH,
            boundary: BoundaryPolicy::Drop,
            parallel_forces: true,
            parallel_build: false,
        }
    }
}

impl<F: Float> SimulationSettings<F> {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.g >= F::zero(), "g must not be negative, got {}", self.g);
        ensure!(
            self.g_soft >= F::zero(),
            "softening must not be negative, got {}",
            self.g_soft
        );
        ensure!(
            self.theta >= F::zero(),
            "theta must not be negative, got {}",
            self.theta
        );
        ensure!(self.dt > F::zero(), "dt must be positive, got {}", self.dt);
        ensure!(self.max_depth > 0, "max_depth must be at least 1");
        Ok(())
    }
}

/// Running averages of the slowest and fastest particle speed, one sample per
/// frame. Only meant for scaling a color map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VelocityStats<F: Float> {
    pub min_avg: F,
    pub max_avg: F,
    pub frames: usize,
}

impl<F: Float> Default for VelocityStats<F> {
    fn default() -> Self {
        Self {
            min_avg: F::zero(),
            max_avg: F::zero(),
            frames: 0,
        }
    }
}

impl<F: Float> VelocityStats<F> {
    pub fn update<P: Particle<F>>(&mut self, points: &[P]) {
        let mut speeds = points.iter().map(|p| p.velocity().norm());
        let Some(first) = speeds.next() else {
            return;
        };
        let (min, max) = speeds.fold((first, first), |(lo, hi), s| (lo.min(s), hi.max(s)));

        let n: F = nalgebra::convert(self.frames as f64);
        self.min_avg = (self.min_avg * n + min) / (n + F::one());
        self.max_avg = (self.max_avg * n + max) / (n + F::one());
        self.frames += 1;
    }
}

pub trait Simulation<F: Float, P, I: Integrator<F, P>>
where
    P: Particle<F>,
{
    fn new(points: Vec<P>, integrator: I, bounds: Bounds<F>) -> Self;
    fn init(&mut self);
    fn settings(&self) -> &SimulationSettings<F>;
    fn settings_mut(&mut self) -> &mut SimulationSettings<F>;
    fn bounds(&self) -> &Bounds<F>;
    fn update_forces(&mut self);
    fn step_by(&mut self, dt: F) -> VelocityStats<F>;
    fn step(&mut self) -> VelocityStats<F> {
        let dt = self.settings().dt;
        self.step_by(dt)
    }
    fn stats(&self) -> VelocityStats<F>;
    fn add_point(&mut self, point: P);
    fn get_points(&self) -> &[P];
    /// Stable indices of the particles inside `region`.
    fn query(&self, region: &Bounds<F>) -> Vec<usize>;
}

pub trait Integrator<F: Float, P: Particle<F>> {
    fn init(&mut self) {}
    fn integrate(&mut self, points: &mut [P], dt: F);
}

/// Symplectic Euler: the velocity is kicked first and the position drifts
/// with the new velocity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SemiImplicitEuler;

impl<F: Float, P: Particle<F>> Integrator<F, P> for SemiImplicitEuler {
    fn integrate(&mut self, points: &mut [P], dt: F) {
        for point in points.iter_mut() {
            let acceleration = *point.force() / point.get_mass();
            *point.velocity_mut() += acceleration * dt;
            let velocity = *point.velocity();
            *point.position_mut() += velocity * dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(position: [f64; 2], velocity: [f64; 2], index: usize) -> PointParticle<f64> {
        PointParticle::new(position.into(), velocity.into(), 1.0, 1.0, index)
    }

    #[test]
    fn contains_is_half_open() {
        let bounds = Bounds::from_size(800.0, 800.0);
        assert!(bounds.contains(&Vector2::new(0.0, 0.0)));
        assert!(bounds.contains(&Vector2::new(799.999, 0.0)));
        assert!(!bounds.contains(&Vector2::new(800.0, 10.0)));
        assert!(!bounds.contains(&Vector2::new(10.0, 800.0)));
        assert!(!bounds.contains(&Vector2::new(-0.001, 10.0)));
    }

    #[test]
    fn quadrants_tile_the_parent() {
        let bounds = Bounds::new(Vector2::new(-100.0, 50.0), 200.0, 100.0);
        let expected = [(-100.0, 50.0), (0.0, 50.0), (-100.0, 100.0), (0.0, 100.0)];
        for (i, (x, y)) in expected.into_iter().enumerate() {
            let q = bounds.quadrant(i);
            assert_eq!(*q.anchor(), Vector2::new(x, y));
            assert_eq!(q.width(), 100.0);
            assert_eq!(q.height(), 50.0);
        }
    }

    #[test]
    fn split_point_belongs_to_exactly_one_quadrant() {
        let bounds = Bounds::from_size(800.0, 800.0);
        let point = Vector2::new(400.0, 400.0);
        let hits: Vec<usize> = (0..4).filter(|&i| bounds.quadrant(i).contains(&point)).collect();
        assert_eq!(hits, vec![3]);
        assert_eq!(bounds.quadrant_of(&point), 3);
        assert_eq!(bounds.quadrant_of(&Vector2::new(399.0, 400.0)), 2);
        assert_eq!(bounds.quadrant_of(&Vector2::new(400.0, 399.0)), 1);
    }

    #[test]
    fn clamp_lands_inside() {
        let bounds = Bounds::from_size(800.0, 600.0);
        for p in [[900.0, 10.0], [-5.0, 700.0], [800.0, 600.0], [12.0, 34.0]] {
            let clamped = bounds.clamp(&p.into());
            assert!(bounds.contains(&clamped), "{clamped:?} escaped");
        }
        assert_eq!(bounds.clamp(&Vector2::new(12.0, 34.0)), Vector2::new(12.0, 34.0));
    }

    #[test]
    fn intersects_touching_edges() {
        let a = Bounds::from_size(10.0, 10.0);
        let b = Bounds::new(Vector2::new(10.0, 0.0), 5.0, 5.0);
        let c = Bounds::new(Vector2::new(10.5, 0.0), 5.0, 5.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn stats_follow_running_average() {
        let mut stats = VelocityStats::<f64>::default();
        stats.update(&[particle([0.0, 0.0], [1.0, 0.0], 0), particle([1.0, 1.0], [0.0, 3.0], 1)]);
        assert_eq!((stats.min_avg, stats.max_avg, stats.frames), (1.0, 3.0, 1));

        stats.update(&[particle([0.0, 0.0], [2.0, 0.0], 0), particle([1.0, 1.0], [0.0, 6.0], 1)]);
        assert!((stats.min_avg - 1.5).abs() < 1e-12);
        assert!((stats.max_avg - 4.5).abs() < 1e-12);

        stats.update::<PointParticle<f64>>(&[]);
        assert_eq!(stats.frames, 2);
    }

    #[test]
    fn euler_kicks_then_drifts() {
        let mut points = vec![particle([10.0, 10.0], [1.0, 0.0], 0)];
        *points[0].force_mut() = Vector2::new(2.0, -1.0);
        SemiImplicitEuler.integrate(&mut points, 1.0);
        assert_eq!(*points[0].velocity(), Vector2::new(3.0, -1.0));
        assert_eq!(*points[0].position(), Vector2::new(13.0, 9.0));
    }

    #[test]
    fn default_settings_validate() {
        assert!(SimulationSettings::<f64>::default().validate().is_ok());
        let bad = SimulationSettings::<f64> {
            theta: -1.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(Bounds::from_size(0.0, 10.0).validate().is_err());
    }
}
