//! Tests for elementwise and reduction operations on distributed vectors.
//!
//! Random data is generated identically on every rank from a fixed seed so
//! that each rank can check its reductions against the full serial answer.

use approx::assert_abs_diff_eq;
use ghostvec::{Comm, Context, NormType, ThreadComm, UniverseComm, VError, Vector};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;

fn seeded(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn filled(ctx: &Rc<Context>, values: &[f64]) -> Vector<f64> {
    let mut v = Vector::with_sizes(ctx, Some(values.len()), None, 1).unwrap();
    v.assign_slice(values).unwrap();
    v
}

#[test]
fn axpy_and_scale_identities() {
    let out = ThreadComm::run(3, |comm| {
        let ctx = Context::new(UniverseComm::Threads(comm));
        let x = filled(&ctx, &seeded(10, 1));
        let mut y = filled(&ctx, &seeded(10, 2));

        let mut z = y.copy().unwrap();
        z.axpy(1.0, &x).unwrap();
        let sum = (&x + &y).unwrap();

        let mut neg = x.duplicate().unwrap();
        x.copy_to(&mut neg).unwrap();
        neg.scale(-1.0).unwrap();
        let minus = (-&x).unwrap();
        (z == sum, neg == minus)
    });
    assert_eq!(out, vec![(true, true); 3]);
}

#[test]
fn norms_and_normalize() {
    let data = seeded(11, 3);
    let one: f64 = data.iter().map(|v| v.abs()).sum();
    let two = data.iter().map(|v| v * v).sum::<f64>().sqrt();
    let inf = data.iter().fold(0.0f64, |m, v| m.max(v.abs()));

    let out = ThreadComm::run(2, move |comm| {
        let ctx = Context::new(UniverseComm::Threads(comm));
        let mut x = filled(&ctx, &data);
        let norms = [
            x.norm(NormType::One).unwrap(),
            x.norm(NormType::Two).unwrap(),
            x.norm(NormType::Infinity).unwrap(),
        ];
        let returned = x.normalize().unwrap();
        (norms, returned, x.norm(NormType::Two).unwrap())
    });
    for (norms, returned, unit) in out {
        assert_abs_diff_eq!(norms[0], one, epsilon = 1e-12);
        assert_abs_diff_eq!(norms[1], two, epsilon = 1e-12);
        assert_abs_diff_eq!(norms[2], inf, epsilon = 1e-12);
        assert_abs_diff_eq!(returned, two, epsilon = 1e-12);
        assert_abs_diff_eq!(unit, 1.0, epsilon = 1e-12);
    }
}

#[test]
fn dot_and_sum_match_serial() {
    let (a, b) = (seeded(7, 4), seeded(7, 5));
    let expected: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
    let total: f64 = a.iter().sum();
    let out = ThreadComm::run(3, move |comm| {
        let ctx = Context::new(UniverseComm::Threads(comm));
        let (x, y) = (filled(&ctx, &a), filled(&ctx, &b));
        (x.dot(&y).unwrap(), x.tdot(&y).unwrap(), x.sum().unwrap())
    });
    for (dot, tdot, sum) in out {
        assert_abs_diff_eq!(dot, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(tdot, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(sum, total, epsilon = 1e-12);
    }
}

#[test]
fn complex_dot_conjugates() {
    let out = ThreadComm::run(2, |comm| {
        let ctx = Context::new(UniverseComm::Threads(comm));
        let mut x = Vector::<Complex64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
        let mut y = x.duplicate().unwrap();
        x.fill(Complex64::new(1.0, 1.0)).unwrap();
        y.fill(Complex64::new(0.0, 2.0)).unwrap();
        (x.dot(&y).unwrap(), x.tdot(&y).unwrap())
    });
    for (dot, tdot) in out {
        // conj(1 + i) * 2i = 2 + 2i; (1 + i) * 2i = -2 + 2i
        assert_eq!(dot, Complex64::new(8.0, 8.0));
        assert_eq!(tdot, Complex64::new(-8.0, 8.0));
    }
}

#[test]
fn extrema_report_one_based_first_index() {
    let out = ThreadComm::run(3, |comm| {
        let ctx = Context::new(UniverseComm::Threads(comm));
        let x = filled(&ctx, &[0.0, 4.0, -3.0, 1.0, 4.0, -3.0]);
        (x.max().unwrap(), x.min().unwrap())
    });
    for (max, min) in out {
        assert_eq!(max, (4.0, 2));
        assert_eq!(min, (-3.0, 3));
    }
}

#[test]
fn pointwise_ops_produce_new_vectors() {
    let ctx = Context::new(UniverseComm::Serial);
    let x = filled(&ctx, &[1.0, -4.0, 2.0]);
    let y = filled(&ctx, &[2.0, 2.0, -3.0]);
    assert_eq!(x.pointwise_max(&y).unwrap().to_global_vec().unwrap(), vec![2.0, 2.0, 2.0]);
    assert_eq!(x.pointwise_min(&y).unwrap().to_global_vec().unwrap(), vec![1.0, -4.0, -3.0]);
    assert_eq!(x.pointwise_max_abs(&y).unwrap().to_global_vec().unwrap(), vec![2.0, 4.0, 3.0]);
    assert_eq!(x.pointwise_mult(&y).unwrap().to_global_vec().unwrap(), vec![2.0, -8.0, -6.0]);
    assert_eq!(x.pointwise_divide(&y).unwrap().to_global_vec().unwrap(), vec![0.5, -2.0, -2.0 / 3.0]);
    assert_eq!(x.abs().unwrap().to_global_vec().unwrap(), vec![1.0, 4.0, 2.0]);
    assert_eq!(x.to_global_vec().unwrap(), vec![1.0, -4.0, 2.0]);
}

#[test]
fn swap_waxpy_and_incompatible_layouts() {
    let ctx = Context::new(UniverseComm::Serial);
    let mut x = filled(&ctx, &[1.0, 2.0]);
    let mut y = filled(&ctx, &[3.0, 4.0]);
    x.swap(&mut y).unwrap();
    assert_eq!(x.to_global_vec().unwrap(), vec![3.0, 4.0]);
    let mut w = x.duplicate().unwrap();
    w.waxpy(2.0, &x, &y).unwrap();
    assert_eq!(w.to_global_vec().unwrap(), vec![7.0, 10.0]);
    w.axpby(1.0, 0.5, &y).unwrap();
    assert_eq!(w.to_global_vec().unwrap(), vec![4.5, 7.0]);
    let short = filled(&ctx, &[1.0]);
    assert!(matches!(w.axpy(1.0, &short), Err(VError::Config(_))));
}

#[test]
fn mismatched_layouts_fail_on_every_rank() {
    let out = ThreadComm::run(3, |comm| {
        let rank = comm.rank();
        let ctx = Context::new(UniverseComm::Threads(comm));
        // same global length; rank 0 alone sees matching local lengths
        let a = Vector::<f64>::with_sizes(&ctx, None, Some([2, 3, 1][rank]), 1).unwrap();
        let b = Vector::<f64>::with_sizes(&ctx, None, Some([2, 1, 3][rank]), 1).unwrap();
        (
            matches!(a.dot(&b), Err(VError::Config(_))),
            matches!(a.tdot(&b), Err(VError::Config(_))),
            a.norm(NormType::Two).is_ok(),
        )
    });
    assert_eq!(out, vec![(true, true, true); 3]);
}

#[test]
fn unassembled_on_one_rank_fails_reductions_everywhere() {
    let out = ThreadComm::run(2, |comm| {
        let rank = comm.rank();
        let ctx = Context::new(UniverseComm::Threads(comm));
        let mut x = filled(&ctx, &[1.0, 2.0, 3.0, 4.0]);
        if rank == 0 {
            x.set(1, 9.0).unwrap();
        }
        let norm = x.norm(NormType::One);
        let gathered = x.to_global_vec();
        let max = x.max();
        x.assembly_begin().unwrap();
        x.assembly_end().unwrap();
        (
            matches!(norm, Err(VError::NotAssembled)),
            matches!(gathered, Err(VError::NotAssembled)),
            matches!(max, Err(VError::NotAssembled)),
            x.sum().unwrap(),
        )
    });
    assert_eq!(out, vec![(true, true, true, 18.0); 2]);
}

#[test]
fn equality_against_arrays_is_collective() {
    let out = ThreadComm::run(2, |comm| {
        let rank = comm.rank();
        let ctx = Context::new(UniverseComm::Threads(comm));
        let x = filled(&ctx, &[1.0, 2.0, 3.0, 4.0]);
        let mine = if rank == 0 { [1.0, 2.0] } else { [3.0, 4.0] };
        let wrong_on_one = if rank == 0 { [1.0, 2.0] } else { [3.0, 5.0] };
        (x.equals_array(&mine).unwrap(), x.equals_array(&wrong_on_one).unwrap())
    });
    assert_eq!(out, vec![(true, false), (true, false)]);
}

#[test]
fn sequential_vectors_reduce_locally() {
    let out = ThreadComm::run(2, |comm| {
        let rank = comm.rank();
        let ctx = Context::new(UniverseComm::Threads(comm));
        let mut s = Vector::<f64>::seq(&ctx, 3).unwrap();
        s.fill(rank as f64 + 1.0).unwrap();
        s.sum().unwrap()
    });
    assert_eq!(out, vec![3.0, 6.0]);
}

#[test]
fn teardown_after_finalize_is_a_no_op() {
    let ctx = Context::new(UniverseComm::Serial);
    let mut x = filled(&ctx, &[1.0, 2.0]);
    let null = ctx.null_vector::<f64>();
    assert!(null.is_finalized());
    ctx.finalize();
    assert!(matches!(x.norm(NormType::Two), Err(VError::RuntimeFinalized)));
    x.release().unwrap();
    x.release().unwrap();
    assert!(x.is_finalized());
}
