//! Initial particle layouts.
//!
//! Every spawner numbers its particles `0..n` (the galaxy sun gets `n`) and
//! draws from the supplied generator, so a seeded `StdRng` reproduces a run.

use std::f64::consts::TAU;

use nalgebra::Vector2;
use rand::Rng;

use crate::shared::{Bounds, Float, Particle};

/// Radius given to spawned particles; only a renderer reads it.
pub const PARTICLE_RADIUS: f64 = 0.00001;

/// Mass the spinning circle's orbital speeds are tuned for.
pub const SPIN_CENTRAL_MASS: f64 = 900.0;

/// Gap kept around a galaxy's sun.
pub const GALAXY_PADDING: f64 = 5.0;

/// Uniformly random point in the ring `padding..radius` around `center`.
pub fn random_in_circle<F: Float, R: Rng + ?Sized>(
    rng: &mut R,
    radius: F,
    padding: F,
    center: &Vector2<F>,
) -> Vector2<F> {
    let angle: F = nalgebra::convert(rng.random::<f64>() * TAU);
    let t: F = nalgebra::convert(rng.random::<f64>());
    let distance = padding + t * (radius - padding);
    center + Vector2::new(angle.cos(), angle.sin()) * distance
}

/// Speed of a circular orbit at `distance` around `central_mass`.
fn orbital_velocity<F: Float>(g: F, central_mass: F, center: &Vector2<F>, position: &Vector2<F>) -> Vector2<F> {
    let offset = position - center;
    let distance = offset.norm();
    if distance == F::zero() {
        return Vector2::zeros();
    }
    let speed = (g * central_mass / distance).sqrt();
    Vector2::new(offset.y, -offset.x) * (speed / distance)
}

/// Particles at rest, uniform in a disc.
pub fn circle<F: Float, P: Particle<F>, R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    center: Vector2<F>,
    radius: F,
    mass: F,
) -> Vec<P> {
    (0..count)
        .map(|i| {
            let position = random_in_circle(rng, radius, F::zero(), &center);
            P::new(position, Vector2::zeros(), mass, nalgebra::convert(PARTICLE_RADIUS), i)
        })
        .collect()
}

/// A disc already rotating as if around [`SPIN_CENTRAL_MASS`] at its center.
pub fn spinning_circle<F: Float, P: Particle<F>, R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    center: Vector2<F>,
    radius: F,
    mass: F,
    g: F,
) -> Vec<P> {
    let central: F = nalgebra::convert(SPIN_CENTRAL_MASS);
    (0..count)
        .map(|i| {
            let position = random_in_circle(rng, radius, F::one(), &center);
            let velocity = orbital_velocity(g, central, &center, &position);
            P::new(position, velocity, mass, nalgebra::convert(PARTICLE_RADIUS), i)
        })
        .collect()
}

/// Stars on circular orbits around a heavy sun; the sun is the last particle.
#[allow(clippy::too_many_arguments)]
pub fn galaxy<F: Float, P: Particle<F>, R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    center: Vector2<F>,
    velocity: Vector2<F>,
    radius: F,
    sun_mass: F,
    mass: F,
    g: F,
) -> Vec<P> {
    let padding: F = nalgebra::convert(GALAXY_PADDING);
    let mut points: Vec<P> = (0..count)
        .map(|i| {
            let position = random_in_circle(rng, radius, padding, &center);
            let orbit = orbital_velocity(g, sun_mass, &center, &position);
            P::new(position, orbit, mass, nalgebra::convert(PARTICLE_RADIUS), i)
        })
        .collect();
    points.push(P::new(center, velocity, sun_mass, nalgebra::convert(1.5), count));
    points
}

/// Particles spread over the whole domain with small random velocities.
pub fn screen<F: Float, P: Particle<F>, R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    bounds: &Bounds<F>,
    mass: F,
    max_speed: F,
) -> Vec<P> {
    let unit = |rng: &mut R| -> F { nalgebra::convert(rng.random::<f64>()) };
    let two: F = nalgebra::convert(2.0);
    (0..count)
        .map(|i| {
            let position = bounds.anchor()
                + Vector2::new(unit(rng) * bounds.width(), unit(rng) * bounds.height());
            let velocity = Vector2::new(
                (unit(rng) * two - F::one()) * max_speed,
                (unit(rng) * two - F::one()) * max_speed,
            );
            P::new(
                bounds.clamp(&position),
                velocity,
                mass,
                nalgebra::convert(PARTICLE_RADIUS),
                i,
            )
        })
        .collect()
}
