use nalgebra::Vector2;
use rand::{Rng, SeedableRng, rngs::StdRng};

use nlib::manual::{BarnesHut, BarnesHutSimulation, Body, BruteForceSimulation, QuadTree};
use nlib::shared::{
    BoundaryPolicy, Bounds, Particle, PointParticle, SemiImplicitEuler, Simulation,
    SimulationSettings,
};
use nlib::spawn;

type Point = PointParticle<f64>;

/// 800 x 800 domain used by every scenario here
pub fn domain() -> Bounds<f64> {
    Bounds::from_size(800.0, 800.0)
}

/// Heavy body at the center and a light one 120 units to its right, both at rest
pub fn two_body_points() -> Vec<Point> {
    vec![
        Point::new([400.0, 400.0].into(), Vector2::zeros(), 1000.0, 1.5, 0),
        Point::new([520.0, 400.0].into(), Vector2::zeros(), 1.0, 1.0, 1),
    ]
}

/// Random uniform particles with random masses
pub fn uniform_points(n: usize, seed: u64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            Point::new(
                [rng.random_range(50.0..750.0), rng.random_range(50.0..750.0)].into(),
                [rng.random_range(-0.2..0.2), rng.random_range(-0.2..0.2)].into(),
                rng.random_range(0.5..2.0),
                1.0,
                i,
            )
        })
        .collect()
}

fn bodies_of(points: &[Point]) -> Vec<Body<f64>> {
    points
        .iter()
        .map(|p| Body::new(*p.position(), p.get_mass(), p.index()))
        .collect()
}

// ==================================================================================
// Reference scenario
// ==================================================================================

#[test]
fn reference_two_body_step() {
    let mut sim = BarnesHutSimulation::new(two_body_points(), SemiImplicitEuler, domain());
    sim.init();
    assert_eq!(sim.settings().g, 0.04);
    assert_eq!(sim.settings().g_soft, 2.4);
    assert_eq!(sim.settings().theta, 0.5);

    sim.step();

    let expected: f64 = 0.04 * 1000.0 / (120.0 * 120.0 + 2.4 * 2.4);
    assert!((expected - 2.776e-3).abs() < 1e-6);

    let b = &sim.get_points()[1];
    assert!((b.velocity().x + expected).abs() < 1e-12);
    assert!((b.position().x - (520.0 - expected)).abs() < 1e-9);
    assert_eq!(b.position().y, 400.0);

    let a = &sim.get_points()[0];
    let a_shift = (a.position() - Vector2::new(400.0, 400.0)).norm();
    assert!((a_shift - expected / 1000.0).abs() < 1e-12);
}

// ==================================================================================
// Tree vs brute force
// ==================================================================================

#[test]
fn exact_traversal_matches_brute_force_simulation() {
    let points = uniform_points(250, 8);

    let mut tree_sim = BarnesHutSimulation::new(points.clone(), SemiImplicitEuler, domain());
    tree_sim.settings_mut().theta = 0.0;
    let mut brute_sim = BruteForceSimulation::new(points, SemiImplicitEuler, domain());

    tree_sim.update_forces();
    brute_sim.update_forces();

    for (t, b) in tree_sim.get_points().iter().zip(brute_sim.get_points()) {
        assert_eq!(t.index(), b.index());
        assert!(
            (t.force() - b.force()).norm() <= 1e-9 * b.force().norm() + 1e-15,
            "particle {}: {:?} vs {:?}",
            t.index(),
            t.force(),
            b.force()
        );
    }
}

#[test]
fn self_force_is_zero_for_lone_particle() {
    let mut sim = BarnesHutSimulation::new(
        vec![Point::new([10.0, 20.0].into(), [0.5, 0.0].into(), 3.0, 1.0, 0)],
        SemiImplicitEuler,
        domain(),
    );
    sim.step();
    let p = &sim.get_points()[0];
    assert_eq!(*p.force(), Vector2::zeros());
    assert_eq!(*p.position(), Vector2::new(10.5, 20.0));
}

#[test]
fn approximate_forces_stay_close() {
    let points = uniform_points(1000, 99);
    let bodies = bodies_of(&points);
    let evaluator = BarnesHut::new(0.04, 2.4, 0.5);
    let (tree, _) = QuadTree::build(domain(), bodies.iter().copied(), 48);

    let (mut diff, mut total) = (0.0, 0.0);
    for b in &bodies {
        let approx = evaluator.calc_force(&tree, &b.position, b.mass, b.index);
        let exact = evaluator.brute_force(&bodies, &b.position, b.mass, b.index);
        diff += (approx - exact).norm_squared();
        total += exact.norm_squared();
    }
    let error = (diff / total).sqrt();
    assert!(error < 1e-2, "relative error {error}");
}

// ==================================================================================
// Tree invariants across a running simulation
// ==================================================================================

#[test]
fn tree_mass_tracks_particles_over_steps() {
    let points = uniform_points(300, 17);
    let total: f64 = points.iter().map(|p| p.get_mass()).sum();
    let mut sim = BarnesHutSimulation::new(points, SemiImplicitEuler, domain());
    sim.settings_mut().boundary = BoundaryPolicy::Clamp;

    for _ in 0..10 {
        sim.step();
        let tree = sim.tree().expect("step builds a tree");
        assert!((tree.mass() - total).abs() < 1e-9 * total);
        assert_eq!(tree.body_count(), 300);
        assert!(sim.dropped().is_empty());
    }
}

#[test]
fn identical_snapshots_build_identical_trees() {
    let bodies = bodies_of(&uniform_points(400, 5));
    let (a, _) = QuadTree::build(domain(), bodies.iter().copied(), 48);
    let (b, _) = QuadTree::build(domain(), bodies.iter().copied(), 48);
    let (c, _) = QuadTree::build_partitioned(domain(), &bodies, 48);
    assert_eq!(a.mass(), b.mass());
    assert_eq!(a.center_of_mass(), b.center_of_mass());
    assert_eq!(a.mass(), c.mass());
    assert_eq!(a.center_of_mass(), c.center_of_mass());
}

#[test]
fn query_reports_stable_indices() {
    let mut sim = BarnesHutSimulation::new(uniform_points(200, 3), SemiImplicitEuler, domain());
    sim.init();
    let region = Bounds::new(Vector2::new(100.0, 100.0), 300.0, 300.0);
    let mut found = sim.query(&region);
    found.sort_unstable();
    let expected: Vec<usize> = sim
        .get_points()
        .iter()
        .filter(|p| region.contains(p.position()))
        .map(|p| p.index())
        .collect();
    assert_eq!(found, expected);
}

// ==================================================================================
// Statistics and configuration
// ==================================================================================

#[test]
fn step_returns_running_speed_averages() {
    let mut sim = BarnesHutSimulation::new(uniform_points(100, 1), SemiImplicitEuler, domain());
    let mut samples = Vec::new();
    for _ in 0..4 {
        let before = sim.stats();
        let stats = sim.step();
        let speeds: Vec<f64> = sim.get_points().iter().map(|p| p.velocity().norm()).collect();
        let max = speeds.iter().cloned().fold(f64::MIN, f64::max);
        let n = before.frames as f64;
        assert!((stats.max_avg - (before.max_avg * n + max) / (n + 1.0)).abs() < 1e-12);
        samples.push(max);
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    assert!((sim.stats().max_avg - mean).abs() < 1e-12);
    assert_eq!(sim.stats().frames, 4);
}

#[test]
fn galaxy_run_stays_finite() {
    let mut rng = StdRng::seed_from_u64(12);
    let points: Vec<Point> = spawn::galaxy(
        &mut rng,
        300,
        Vector2::new(400.0, 400.0),
        Vector2::zeros(),
        120.0,
        1000.0,
        1.0,
        0.04,
    );
    let mut sim = BarnesHutSimulation::new(points, SemiImplicitEuler, domain());
    sim.init();
    for _ in 0..50 {
        sim.step();
    }
    assert!(sim.get_points().iter().all(|p| p.position().iter().all(|c| c.is_finite())));
    assert!(sim.stats().max_avg.is_finite());
}

#[test]
fn settings_file_parses() {
    let settings: SimulationSettings<f64> =
        serde_yaml::from_str(include_str!("../configs/galaxy.yaml")).expect("valid yaml");
    assert_eq!(settings, SimulationSettings::default());

    let partial: SimulationSettings<f64> =
        serde_yaml::from_str("theta: 0.0\nboundary: clamp\n").expect("valid yaml");
    assert_eq!(partial.theta, 0.0);
    assert_eq!(partial.boundary, BoundaryPolicy::Clamp);
    assert_eq!(partial.g, 0.04);
    assert!(partial.validate().is_ok());
}
