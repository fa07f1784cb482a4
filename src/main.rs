use std::{fs::File, io::BufReader, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use nalgebra::Vector2;
use rand::{SeedableRng, rngs::StdRng};
use web_time::Instant;

use nlib::{
    manual::{BarnesHutSimulation, BruteForceSimulation},
    shared::{
        BoundaryPolicy, Bounds, Particle, PointParticle, SemiImplicitEuler, Simulation,
        SimulationSettings,
    },
    spawn,
};

type Point = PointParticle<f64>;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    BarnesHut,
    BruteForce,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Layout {
    Circle,
    SpinningCircle,
    Galaxy,
    Screen,
}

/// Headless 2D Barnes-Hut gravity simulation.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, value_enum, default_value_t = Method::BarnesHut)]
    method: Method,

    #[arg(long, value_enum, default_value_t = Layout::Galaxy)]
    layout: Layout,

    /// Number of particles to spawn (the galaxy adds a sun on top).
    #[arg(short = 'n', long, default_value_t = 1000)]
    particles: usize,

    #[arg(short, long, default_value_t = 1000)]
    steps: usize,

    #[arg(long, default_value_t = 800.0)]
    width: f64,

    #[arg(long, default_value_t = 800.0)]
    height: f64,

    #[arg(long, default_value_t = 1.0)]
    mass: f64,

    #[arg(long)]
    seed: Option<u64>,

    /// YAML file with simulation settings; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    g: Option<f64>,

    #[arg(long)]
    softening: Option<f64>,

    #[arg(long)]
    theta: Option<f64>,

    #[arg(long)]
    dt: Option<f64>,

    #[arg(long, value_enum)]
    boundary: Option<BoundaryPolicy>,

    /// Populate the tree's root quadrants in parallel.
    #[arg(long)]
    parallel_build: bool,

    /// Evaluate forces on a single thread.
    #[arg(long)]
    sequential_forces: bool,

    /// Log statistics every this many steps.
    #[arg(long, default_value_t = 100)]
    log_every: usize,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn load_settings(args: &Args) -> Result<SimulationSettings<f64>> {
    let mut settings = match args.config {
        Some(ref path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open settings file {}", path.display()))?;
            serde_yaml::from_reader(BufReader::new(file))
                .with_context(|| format!("failed to parse settings file {}", path.display()))?
        }
        None => SimulationSettings::default(),
    };

    if let Some(g) = args.g {
        settings.g = g;
    }
    if let Some(softening) = args.softening {
        settings.g_soft = softening;
    }
    if let Some(theta) = args.theta {
        settings.theta = theta;
    }
    if let Some(dt) = args.dt {
        settings.dt = dt;
    }
    if let Some(boundary) = args.boundary {
        settings.boundary = boundary;
    }
    settings.parallel_build |= args.parallel_build;
    settings.parallel_forces &= !args.sequential_forces;

    settings.validate().context("invalid simulation settings")?;
    Ok(settings)
}

fn spawn_points(args: &Args, bounds: &Bounds<f64>, g: f64) -> Vec<Point> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let center = bounds.center();
    let radius = bounds.width().min(bounds.height()) * 0.15;
    match args.layout {
        Layout::Circle => spawn::circle(&mut rng, args.particles, center, radius, args.mass),
        Layout::SpinningCircle => {
            spawn::spinning_circle(&mut rng, args.particles, center, radius, args.mass, g)
        }
        Layout::Galaxy => spawn::galaxy(
            &mut rng,
            args.particles,
            center,
            Vector2::zeros(),
            radius,
            1000.0,
            args.mass,
            g,
        ),
        Layout::Screen => spawn::screen(&mut rng, args.particles, bounds, args.mass, 0.45),
    }
}

fn per_step(elapsed: Duration, steps: usize) -> Duration {
    elapsed.div_f64(steps.max(1) as f64)
}

fn run<S>(mut sim: S, steps: usize, log_every: usize)
where
    S: Simulation<f64, Point, SemiImplicitEuler>,
{
    sim.init();
    let start = Instant::now();

    for step in 1..=steps {
        let stats = sim.step();
        if log_every > 0 && step % log_every == 0 {
            let region = *sim.bounds();
            info!(
                "step {step}: speed avg min {:.5} max {:.5}, {} of {} particles in domain",
                stats.min_avg,
                stats.max_avg,
                sim.query(&region).len(),
                sim.get_points().len()
            );
        }
    }

    let elapsed = start.elapsed();
    let momentum = sim
        .get_points()
        .iter()
        .fold(Vector2::<f64>::zeros(), |acc, p| acc + p.velocity() * p.get_mass());
    info!(
        "{steps} steps in {elapsed:?} ({:?} per step), net momentum {:.3e}",
        per_step(elapsed, steps),
        momentum.norm()
    );
}

fn main() -> Result<()> {
    init_logger();

    let args = Args::parse();
    let settings = load_settings(&args)?;
    let bounds = Bounds::from_size(args.width, args.height);
    bounds.validate()?;

    let points = spawn_points(&args, &bounds, settings.g);
    info!(
        "{:?} layout with {} particles, {:?} method, g {} softening {} theta {}",
        args.layout,
        points.len(),
        args.method,
        settings.g,
        settings.g_soft,
        settings.theta
    );

    match args.method {
        Method::BarnesHut => {
            let mut sim = BarnesHutSimulation::new(points, SemiImplicitEuler, bounds);
            *sim.settings_mut() = settings;
            run(sim, args.steps, args.log_every);
        }
        Method::BruteForce => {
            let mut sim = BruteForceSimulation::new(points, SemiImplicitEuler, bounds);
            *sim.settings_mut() = settings;
            run(sim, args.steps, args.log_every);
        }
    }

    Ok(())
}
