use agedepth::{Move, Objective, RunOptions, Twalk};
use agedepth::trace::MemTrace;
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Independent standard normal coordinates.
struct Normal {
    dim: usize,
}

impl Objective for Normal {
    fn dim(&self) -> usize {
        self.dim
    }

    fn is_admissible(&mut self, _x: &[f64]) -> bool {
        true
    }

    fn energy(&mut self, x: &[f64], _prime: bool) -> f64 {
        0.5 * x.iter().map(|v| v * v).sum::<f64>()
    }
}

fn mean_var(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

#[test]
fn one_dimensional_normal_moments() {
    let mut model = Normal { dim: 1 };
    let mut sampler = Twalk::new(&mut model, &[2.0], &[-2.0]).unwrap();
    let mut rng = SmallRng::seed_from_u64(42);
    let mut trace = MemTrace::new();
    let summary = sampler
        .run(
            &mut rng,
            &mut trace,
            RunOptions {
                draws: 200_000,
                save_every: -1,
                silent: true,
            },
        )
        .unwrap();

    assert!(summary.accepted > 10_000, "chain barely moved: {summary:?}");
    let (mean, var) = mean_var(&trace.column(0));
    assert!(mean.abs() < 0.05, "sample mean {mean} too far from 0");
    assert!((var - 1.0).abs() < 0.1, "sample variance {var} too far from 1");
}

#[test]
fn five_dimensional_normal_moments() {
    let mut model = Normal { dim: 5 };
    let mut sampler = Twalk::new(&mut model, &[1.5; 5], &[-1.5; 5]).unwrap();
    let mut rng = SmallRng::seed_from_u64(7);
    let mut trace = MemTrace::new();
    sampler
        .run(
            &mut rng,
            &mut trace,
            RunOptions {
                draws: 400_000,
                save_every: -1,
                silent: true,
            },
        )
        .unwrap();

    for i in 0..5 {
        let (mean, var) = mean_var(&trace.column(i));
        assert!(mean.abs() < 0.08, "coordinate {i}: mean {mean}");
        assert!((var - 1.0).abs() < 0.15, "coordinate {i}: variance {var}");
    }
}

#[test]
fn negative_cadence_counts_accepted_moves_only() {
    let mut model = Normal { dim: 2 };
    let mut sampler = Twalk::new(&mut model, &[1.0, 1.0], &[-1.0, -1.0]).unwrap();
    let mut rng = SmallRng::seed_from_u64(5);
    let mut trace = MemTrace::new();
    let summary = sampler
        .run(
            &mut rng,
            &mut trace,
            RunOptions {
                draws: 50_000,
                save_every: -5,
                silent: true,
            },
        )
        .unwrap();

    assert_eq!(trace.len() as u64, summary.accepted / 5);
}

#[test]
fn step_reports_which_walker_moved() {
    let mut model = Normal { dim: 3 };
    let mut sampler = Twalk::new(&mut model, &[1.0; 3], &[-1.0; 3]).unwrap();
    let mut rng = SmallRng::seed_from_u64(17);
    let mut seen_x = false;
    let mut seen_xp = false;
    for _ in 0..2_000 {
        match sampler.step(&mut rng).result {
            Move::AcceptedX => seen_x = true,
            Move::AcceptedXp => seen_xp = true,
            Move::Rejected => {}
        }
    }
    assert!(seen_x && seen_xp, "both walkers should move over 2000 steps");
}
