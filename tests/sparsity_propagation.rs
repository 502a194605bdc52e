use std::sync::Arc;

use gradfn::{Buffer, Function, GraphBuilder, NumericFn, SlotKind, Sparsity};

/// f : R^4 -> R^3 with a fixed sparsity structure:
/// y0 = x0 * x1, y1 = x2, y2 = x0 - x3.
fn structured_fn() -> Function<f64> {
    let mut b = GraphBuilder::new();
    let x = b.input(4, 1);
    let p = b.mul(x[0], x[1]);
    let d = b.sub(x[0], x[3]);
    b.output(3, 1, &[p, x[2], d]);
    Function::new(b.finish())
}

#[test]
fn propagated_pattern_matches_structure() {
    let mut f = structured_fn();
    f.init().unwrap();
    assert!(f.sp_can_evaluate(true));
    assert!(f.sp_can_evaluate(false));

    let sp = f.jac_sparsity(0, 0, false).unwrap();
    assert_eq!((sp.nrow(), sp.ncol()), (3, 4));
    let expect = [
        (0, 0, true),
        (0, 1, true),
        (0, 2, false),
        (0, 3, false),
        (1, 2, true),
        (1, 0, false),
        (2, 0, true),
        (2, 3, true),
        (2, 1, false),
    ];
    for (r, c, present) in expect {
        assert_eq!(sp.contains(r, c), present, "entry ({r}, {c})");
    }
}

#[test]
fn forward_and_backward_propagation_agree() {
    // Force each direction through the raw sp_* interface and compare.
    let mut f = structured_fn();
    f.init().unwrap();

    // Forward: seed input entry 0, expect bits on y0 and y2.
    f.sp_init(true);
    f.sp_seed(SlotKind::Input, 0, 0, 1).unwrap();
    f.sp_evaluate(true).unwrap();
    let out = f.sp_read(SlotKind::Output, 0).unwrap();
    assert_eq!(out[0], 1);
    assert_eq!(out[1], 0);
    assert_eq!(out[2], 1);

    // Backward: seed output entry 0, expect bits on x0 and x1.
    f.sp_init(false);
    f.sp_seed(SlotKind::Output, 0, 0, 1).unwrap();
    f.sp_evaluate(false).unwrap();
    let inp = f.sp_read(SlotKind::Input, 0).unwrap();
    assert_eq!(inp[0], 1);
    assert_eq!(inp[1], 1);
    assert_eq!(inp[2], 0);
    assert_eq!(inp[3], 0);
}

#[test]
fn pattern_is_sound_against_numeric_jacobian() {
    // Every numerically nonzero Jacobian entry must be in the
    // propagated pattern (the converse may fail: over-approximation is
    // allowed).
    let points = [[1.0, 2.0, -0.5, 0.3], [0.1, -1.0, 4.0, 2.2]];
    let mut f = structured_fn();
    f.set_num_directions(1, 0);
    f.init().unwrap();
    let sp = f.jac_sparsity(0, 0, false).unwrap();

    for x in points {
        f.set_input(0, &x).unwrap();
        for c in 0..4 {
            let mut seed = [0.0; 4];
            seed[c] = 1.0;
            f.set_fwd_seed(0, 0, &seed).unwrap();
            f.evaluate(1, 0).unwrap();
            let col = f.fwd_sens(0, 0).unwrap().as_slice().to_vec();
            for (r, &v) in col.iter().enumerate() {
                if v.abs() > 1e-12 {
                    assert!(sp.contains(r, c), "missing dependency at ({r}, {c})");
                }
            }
        }
    }
}

#[test]
fn pattern_is_cached_per_block() {
    let mut f = structured_fn();
    f.init().unwrap();
    let a = f.jac_sparsity(0, 0, false).unwrap();
    let b = f.jac_sparsity(0, 0, false).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    // Compact and non-compact coincide for dense buffers but are
    // distinct cache keys.
    let c = f.jac_sparsity(0, 0, true).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(*a, *c);
}

#[test]
fn preseeded_pattern_is_honored() {
    let mut f = structured_fn();
    f.init().unwrap();
    let custom = Sparsity::dense(3, 4).shared();
    f.set_jac_sparsity(0, 0, false, Arc::clone(&custom)).unwrap();
    let got = f.jac_sparsity(0, 0, false).unwrap();
    assert!(Arc::ptr_eq(&custom, &got));

    // Wrong shape is rejected.
    let bad = Sparsity::dense(2, 2).shared();
    assert!(f.set_jac_sparsity(0, 0, false, bad).is_err());
}

#[test]
fn numeric_representation_falls_back_to_dense() {
    let f: NumericFn<f64> = NumericFn::new(
        vec![(3, 1)],
        vec![(2, 1)],
        |ins: &[Buffer<f64>], outs: &mut [Buffer<f64>]| {
            let x = ins[0].as_slice();
            outs[0].as_mut_slice()[0] = x[0];
            outs[0].as_mut_slice()[1] = x[1] * x[2];
            Ok(())
        },
    );
    let mut f = Function::new(f);
    f.init().unwrap();
    assert!(!f.sp_can_evaluate(true));
    let sp = f.jac_sparsity(0, 0, false).unwrap();
    assert!(sp.is_dense());
}

#[test]
fn propagation_batches_beyond_64_entries() {
    // 70 inputs exercises the second 64-way seeding batch: a chained
    // bidiagonal structure y0 = x0, y_i = x_i * x_{i-1}.
    let n = 70;
    let mut b = GraphBuilder::new();
    let x = b.input(n, 1);
    let mut entries = vec![x[0]];
    for i in 1..n {
        entries.push(b.mul(x[i], x[i - 1]));
    }
    b.output(n, 1, &entries);
    let mut f: Function<f64> = Function::new(b.finish());
    f.init().unwrap();

    let sp = f.jac_sparsity(0, 0, false).unwrap();
    assert_eq!(sp.nnz(), 1 + 2 * (n - 1));
    for i in 1..n {
        assert!(sp.contains(i, i));
        assert!(sp.contains(i, i - 1));
        assert!(!sp.contains(i - 1, i));
    }
}
