// Solver and generator throughput
// Run with: cargo bench -p ostinato-core

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ostinato_core::{
    itersolve::{Direction, IterativeSolver, Search, SolverConfig},
    kinematics::{Axis, CartesianKin, CoupledKin, Sign},
    move_queue::{Coord, MoveQueue, MoveSegment},
    step_gen::{GeneratorConfig, Stepper},
};

fn accel_segment() -> MoveSegment {
    MoveSegment::new(
        0.0,
        1.0,
        Coord::ZERO,
        Coord::new(5.0, 2.0, 0.0),
        Coord::new(200.0, 80.0, 0.0),
    )
}

fn bench_solve(c: &mut Criterion) {
    let solver = IterativeSolver::new(SolverConfig::default());
    let kin = CartesianKin::new(Axis::X);
    let m = accel_segment();
    c.bench_function("solve one crossing under acceleration", |b| {
        b.iter(|| {
            solver.solve(
                &kin,
                &m,
                black_box(Search {
                    lo: 0.25,
                    hi: 1.0,
                    target: 8.5,
                    dir: Direction::Forward,
                    step_dist: 0.0125,
                    is_tail: false,
                }),
            )
        });
    });
}

fn bench_generate(c: &mut Criterion) {
    let solver = IterativeSolver::new(SolverConfig::default());
    let mut queue = MoveQueue::with_capacity(8);
    queue
        .append_trapezoid(
            0.0,
            0.1,
            0.8,
            0.1,
            Coord::ZERO,
            Coord::new(0.6, 0.8, 0.0),
            0.0,
            100.0,
            1000.0,
        )
        .unwrap();
    let config = GeneratorConfig {
        horizon: 2.0,
        step_buffer: 16_384,
    };

    c.bench_function("generate corexy trapezoid (~10k steps)", |b| {
        b.iter(|| {
            let mut stepper = Stepper::new("a", CoupledKin::corexy(Sign::Plus), 0.0125, &config);
            stepper.generate(&queue, &solver, 2.0, &mut ()).unwrap();
            black_box(stepper.buffer().len())
        });
    });
}

criterion_group!(benches, bench_solve, bench_generate);
criterion_main!(benches);
