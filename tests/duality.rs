use approx::assert_relative_eq;
use gradfn::{Function, GraphBuilder};

/// f : R^3 -> R^3, mildly nonlinear.
fn test_fn() -> Function<f64> {
    let mut b = GraphBuilder::new();
    let x = b.input(3, 1);
    let y0 = b.mul(x[0], x[1]);
    let e = b.exp(x[2]);
    let y1 = b.add(x[1], e);
    let q = b.div(x[0], x[2]);
    let y2 = b.sub(q, x[1]);
    b.output(3, 1, &[y0, y1, y2]);
    Function::new(b.finish())
}

#[test]
fn forward_adjoint_duality() {
    // dot(w, J v) == dot(J^T w, v) at the same evaluation point.
    let x = [1.3, -0.4, 0.9];
    let v = [0.2, 1.7, -1.1];
    let w = [-0.6, 0.5, 2.0];

    let mut f = test_fn();
    f.set_num_directions(1, 1);
    f.init().unwrap();
    f.set_input(0, &x).unwrap();
    f.set_fwd_seed(0, 0, &v).unwrap();
    f.set_adj_seed(0, 0, &w).unwrap();
    f.evaluate(1, 1).unwrap();

    let jv = f.fwd_sens(0, 0).unwrap().as_slice().to_vec();
    let jtw = f.adj_sens(0, 0).unwrap().as_slice().to_vec();

    let lhs: f64 = w.iter().zip(&jv).map(|(a, b)| a * b).sum();
    let rhs: f64 = jtw.iter().zip(&v).map(|(a, b)| a * b).sum();
    assert_relative_eq!(lhs, rhs, max_relative = 1e-12);
}

#[test]
fn adjoint_matches_transposed_jacobian() {
    let x = [0.7, 1.1, 2.3];
    let mut f = test_fn();
    f.set_num_directions(3, 3);
    f.init().unwrap();
    f.set_input(0, &x).unwrap();

    // Unit forward seeds give Jacobian columns; unit adjoint seeds
    // give Jacobian rows. Cross-check entry by entry.
    for d in 0..3 {
        let mut fseed = [0.0; 3];
        fseed[d] = 1.0;
        f.set_fwd_seed(0, d, &fseed).unwrap();
        let mut aseed = [0.0; 3];
        aseed[d] = 1.0;
        f.set_adj_seed(0, d, &aseed).unwrap();
    }
    f.evaluate(3, 3).unwrap();

    for r in 0..3 {
        for c in 0..3 {
            let from_fwd = f.fwd_sens(0, c).unwrap().as_slice()[r];
            let from_adj = f.adj_sens(0, r).unwrap().as_slice()[c];
            assert_relative_eq!(from_fwd, from_adj, max_relative = 1e-12);
        }
    }
}
