//! Tests for the staged-write / assembly protocol on 1-, 2- and 3-rank groups.
//!
//! Covers visibility of staged values after the bracket under Insert and Add,
//! idempotence of empty brackets, collective verification of the assembled
//! flag, and the index-based assignment helpers.

use approx::assert_abs_diff_eq;
use ghostvec::{
    Comm, Context, InsertMode, SharedBuffer, ThreadComm, UniverseComm, VError, VecOptions, Vector,
};
use std::cell::RefCell;
use std::rc::Rc;

fn threads(comm: ThreadComm) -> Rc<Context> {
    Context::new(UniverseComm::Threads(comm))
}

/// Set index 4 on its owner, commit, read it back everywhere.
#[test]
fn set_on_owner_is_visible_after_commit() {
    let out = ThreadComm::run(2, |comm| {
        let rank = comm.rank();
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(6), None, 1).unwrap();
        v.with_assembly(|v| if rank == 1 { v.set(4, 10.0) } else { Ok(()) })
            .unwrap();
        let local = if v.ownership_range().unwrap().contains(&4) { Some(v.get(4).unwrap()) } else { None };
        (local, v.to_global_vec().unwrap()[3])
    });
    assert_eq!(out, vec![(None, 10.0), (Some(10.0), 10.0)]);
}

#[test]
fn off_process_values_reach_their_owner() {
    let out = ThreadComm::run(3, |comm| {
        let rank = comm.rank();
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(6), None, 1).unwrap();
        // every rank writes index 6, owned by rank 2; insert keeps one of them
        v.with_assembly(|v| v.set(6, 2.0)).unwrap();
        // and rank r writes 1-based index r + 1
        v.with_assembly(|v| v.set(rank + 1, rank as f64 + 1.0)).unwrap();
        v.to_global_vec().unwrap()
    });
    for global in out {
        assert_eq!(global, vec![1.0, 2.0, 3.0, 0.0, 0.0, 2.0]);
    }
}

#[test]
fn add_mode_sums_contributions_from_every_rank() {
    let out = ThreadComm::run(3, |comm| {
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(3), None, 1).unwrap();
        v.fill(1.0).unwrap();
        v.set_insert_mode(InsertMode::Add);
        v.with_assembly(|v| {
            v.set(1, 0.5)?;
            v.set(3, 0.25)
        })
        .unwrap();
        v.to_global_vec().unwrap()
    });
    for global in out {
        assert_abs_diff_eq!(global[0], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(global[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(global[2], 1.75, epsilon = 1e-12);
    }
}

#[test]
fn empty_brackets_are_idempotent() {
    let out = ThreadComm::run(2, |comm| {
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
        v.assign_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let before = v.to_global_vec().unwrap();
        for _ in 0..2 {
            v.assembly_begin().unwrap();
            v.assembly_end().unwrap();
        }
        (before == v.to_global_vec().unwrap(), v.is_assembled().unwrap())
    });
    assert_eq!(out, vec![(true, true), (true, true)]);
}

/// Rank 0 stages a write and leaves it uncommitted.
fn assembled_flags(verify: bool) -> Vec<bool> {
    ThreadComm::run(2, move |comm| {
        let rank = comm.rank();
        let opts = VecOptions { verify_assembled: verify, ..VecOptions::default() };
        let ctx = Context::with_options(UniverseComm::Threads(comm), opts);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
        assert_eq!(v.verify_assembled(), verify);
        if rank == 0 {
            v.set(1, 3.0).unwrap();
        }
        let flag = v.is_assembled().unwrap();
        v.assembly_begin().unwrap();
        v.assembly_end().unwrap();
        assert!(v.is_assembled().unwrap());
        flag
    })
}

#[test]
fn verification_makes_the_flag_collective() {
    assert_eq!(assembled_flags(true), vec![false, false]);
    assert_eq!(assembled_flags(false), vec![false, true]);
}

#[test]
fn disagreeing_modes_fail_on_every_rank() {
    let out = ThreadComm::run(2, |comm| {
        let rank = comm.rank();
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
        let mode = if rank == 0 { InsertMode::Insert } else { InsertMode::Add };
        v.set_values(&[rank], &[1.0], mode).unwrap();
        matches!(v.assembly_begin(), Err(VError::Config(_)))
    });
    assert_eq!(out, vec![true, true]);
}

#[test]
fn failing_body_still_commits() {
    let out = ThreadComm::run(2, |comm| {
        let rank = comm.rank();
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
        let res = v.with_assembly(|v| {
            v.set(4 - rank, 1.0)?;
            if rank == 0 { v.set(0, 1.0) } else { Ok(()) }
        });
        (res.is_err(), v.is_assembled().unwrap(), v.to_global_vec().unwrap())
    });
    assert_eq!(out[0], (true, true, vec![0.0, 0.0, 1.0, 1.0]));
    assert_eq!(out[1], (false, true, vec![0.0, 0.0, 1.0, 1.0]));
}

#[test]
fn masked_read_after_sparse_writes() {
    let picked = [1usize, 4, 5];
    let out = ThreadComm::run(2, move |comm| {
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(6), None, 1).unwrap();
        v.fill(0.0).unwrap();
        v.with_assembly(|v| picked.iter().try_for_each(|&i| v.set(i, 1.0))).unwrap();
        let mask: Vec<bool> = (1..=6).map(|i| picked.contains(&i)).collect();
        let inverse: Vec<bool> = mask.iter().map(|m| !m).collect();
        (v.get_masked(&mask).unwrap(), v.get_masked(&inverse).unwrap())
    });
    for (on, off) in out {
        assert_eq!(on, vec![1.0; 3]);
        assert_eq!(off, vec![0.0; 3]);
    }
}

#[test]
fn range_assignment_paths_agree() {
    let out = ThreadComm::run(2, |comm| {
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(5), None, 1).unwrap();
        v.assign_range(1..=5, 2.0).unwrap();
        v.assign_range(2..=4, 9.0).unwrap();
        let mask = [false, true, false, false, true];
        v.assign_masked(&mask, -1.0).unwrap();
        v.to_global_vec().unwrap()
    });
    for global in out {
        assert_eq!(global, vec![2.0, -1.0, 9.0, 9.0, -1.0]);
    }
}

#[test]
fn whole_range_assignment_with_one_rank_staged() {
    let out = ThreadComm::run(2, |comm| {
        let rank = comm.rank();
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
        if rank == 1 {
            v.set(3, 5.0).unwrap();
        }
        v.assign_range(1..=4, 1.0).unwrap();
        (v.is_assembled().unwrap(), v.to_global_vec().unwrap())
    });
    for (assembled, global) in out {
        assert!(assembled);
        assert_eq!(global, vec![1.0; 4]);
    }
}

#[test]
fn range_assignment_in_add_mode_accumulates() {
    let out = ThreadComm::run(2, |comm| {
        let ctx = threads(comm);
        let mut v = Vector::<f64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
        v.fill(1.0).unwrap();
        v.set_insert_mode(InsertMode::Add);
        v.assign_range(1..=4, 2.0).unwrap();
        v.assign_range(2..=3, 0.5).unwrap();
        v.to_global_vec().unwrap()
    });
    for global in out {
        assert_eq!(global, vec![3.0, 3.5, 3.5, 3.0]);
    }
}

/// A busy buffer must not swallow values already sent by other ranks.
#[test]
fn busy_buffer_keeps_incoming_values_pending() {
    let out = ThreadComm::run(2, |comm| {
        let rank = comm.rank();
        let ctx = threads(comm);
        let buffer: SharedBuffer<f64> = Rc::new(RefCell::new(vec![0.0; 2]));
        let mut v = Vector::from_local_buffer(&ctx, Rc::clone(&buffer), None).unwrap();
        if rank == 0 {
            v.set(4, 7.0).unwrap();
        }
        v.assembly_begin().unwrap();
        let first = {
            let _held = buffer.borrow();
            v.assembly_end()
        };
        let busy = matches!(first, Err(VError::Busy(_))) && !v.is_assembled().unwrap();
        v.assembly_end().unwrap();
        let local = buffer.borrow().clone();
        (busy, local)
    });
    assert!(out.iter().all(|(busy, _)| *busy));
    assert_eq!(out[0].1, vec![0.0, 0.0]);
    assert_eq!(out[1].1, vec![0.0, 7.0]);
}

#[test]
fn bulk_blocked_and_local_writes() {
    let ctx = Context::new(UniverseComm::Serial);
    let mut v = Vector::<f64>::with_sizes(&ctx, Some(4), None, 2).unwrap();
    v.set_values_blocked(&[1], &[5.0, 6.0], InsertMode::Insert).unwrap();
    v.set_values_local(&[0], &[1.0], InsertMode::Insert).unwrap();
    assert!(matches!(
        v.set_values(&[0, 1], &[1.0], InsertMode::Insert),
        Err(VError::Config(_))
    ));
    v.assembly_begin().unwrap();
    v.assembly_end().unwrap();
    assert_eq!(v.get_values(&[0, 1, 2, 3]).unwrap(), vec![1.0, 0.0, 5.0, 6.0]);
}
