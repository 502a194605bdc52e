use gradfn::{Buffer, Error, Function, GraphBuilder, NumericFn};

/// f(x) = (x0 * x1, x0 + x1) over one 2-vector input, two scalar
/// outputs.
fn prod_sum_graph() -> Function<f64> {
    let mut b = GraphBuilder::new();
    let x = b.input(2, 1);
    let p = b.mul(x[0], x[1]);
    let s = b.add(x[0], x[1]);
    b.output(1, 1, &[p]);
    b.output(1, 1, &[s]);
    Function::new(b.finish())
}

/// Same function as numeric closures (forward sweep only).
fn prod_sum_numeric() -> Function<f64> {
    let f = NumericFn::new(
        vec![(2, 1)],
        vec![(1, 1), (1, 1)],
        |ins: &[Buffer<f64>], outs: &mut [Buffer<f64>]| {
            let x = ins[0].as_slice();
            outs[0].as_mut_slice()[0] = x[0] * x[1];
            outs[1].as_mut_slice()[0] = x[0] + x[1];
            Ok(())
        },
    )
    .with_forward(|ins, _outs, seeds, sens| {
        let x = ins[0].as_slice();
        let v = seeds[0].as_slice();
        sens[0].as_mut_slice()[0] = x[1] * v[0] + x[0] * v[1];
        sens[1].as_mut_slice()[0] = v[0] + v[1];
        Ok(())
    });
    Function::new(f)
}

#[test]
fn product_jacobian_from_graph() {
    let mut f = prod_sum_graph();
    f.init().unwrap();
    let mut j = f.jacobian(0, 0).unwrap();

    j.set_input(0, &[2.0, 5.0]).unwrap();
    j.evaluate(0, 0).unwrap();
    // d(x0 x1)/dx = [x1, x0] = [5, 2]
    let jac = j.output(0).unwrap();
    assert_eq!(jac.shape(), (1, 2));
    assert!((jac.get(0, 0) - 5.0).abs() < 1e-14);
    assert!((jac.get(0, 1) - 2.0).abs() < 1e-14);
}

#[test]
fn seeded_jacobian_matches_symbolic() {
    let x = [2.0, 5.0];

    let mut sym = prod_sum_graph();
    sym.init().unwrap();
    let mut js = sym.jacobian(0, 1).unwrap();
    js.set_input(0, &x).unwrap();
    js.evaluate(0, 0).unwrap();

    let mut num = prod_sum_numeric();
    num.init().unwrap();
    let mut jn = num.jacobian(0, 1).unwrap();
    jn.set_input(0, &x).unwrap();
    jn.evaluate(0, 0).unwrap();

    for c in 0..2 {
        assert!((js.output(0).unwrap().get(0, c) - jn.output(0).unwrap().get(0, c)).abs() < 1e-12);
    }
    // d(x0 + x1)/dx = [1, 1]
    assert!((jn.output(0).unwrap().get(0, 0) - 1.0).abs() < 1e-12);
    assert!((jn.output(0).unwrap().get(0, 1) - 1.0).abs() < 1e-12);
}

#[test]
fn adjoint_seeded_jacobian() {
    // Adjoint-only numeric representation: the builder must pick
    // row-wise adjoint sweeps.
    let f = NumericFn::new(
        vec![(3, 1)],
        vec![(2, 1)],
        |ins: &[Buffer<f64>], outs: &mut [Buffer<f64>]| {
            let x = ins[0].as_slice();
            let y = outs[0].as_mut_slice();
            y[0] = x[0] * x[1];
            y[1] = x[1] + 3.0 * x[2];
            Ok(())
        },
    )
    .with_adjoint(|ins, _outs, seeds, sens| {
        let x = ins[0].as_slice();
        let w = seeds[0].as_slice();
        let s = sens[0].as_mut_slice();
        s[0] = s[0] + x[1] * w[0];
        s[1] = s[1] + x[0] * w[0] + w[1];
        s[2] = s[2] + 3.0 * w[1];
        Ok(())
    });
    let mut f = Function::new(f);
    f.init().unwrap();
    let mut j = f.jacobian(0, 0).unwrap();
    j.set_input(0, &[2.0, 4.0, -1.0]).unwrap();
    j.evaluate(0, 0).unwrap();

    let expect = [[4.0, 2.0, 0.0], [0.0, 1.0, 3.0]];
    let jac = j.output(0).unwrap();
    assert_eq!(jac.shape(), (2, 3));
    for r in 0..2 {
        for c in 0..3 {
            assert!(
                (jac.get(r, c) - expect[r][c]).abs() < 1e-12,
                "mismatch at ({r}, {c}): {} vs {}",
                jac.get(r, c),
                expect[r][c]
            );
        }
    }
}

#[test]
fn non_column_pair_is_a_shape_error() {
    // Output slot shaped 1x2 (a row): jacobian must refuse it.
    let mut b = GraphBuilder::new();
    let x = b.input(2, 1);
    b.output(1, 2, &[x[0], x[1]]);
    let mut f: Function<f64> = Function::new(b.finish());
    f.init().unwrap();
    assert!(matches!(f.jacobian(0, 0), Err(Error::ShapeError(_))));

    // Row-shaped input likewise.
    let mut b = GraphBuilder::new();
    let x = b.input(1, 2);
    let s = b.add(x[0], x[1]);
    b.output(1, 1, &[s]);
    let mut g: Function<f64> = Function::new(b.finish());
    g.init().unwrap();
    assert!(matches!(g.jacobian(0, 0), Err(Error::ShapeError(_))));
}

#[test]
fn jacobian_before_init_fails() {
    let mut f = prod_sum_graph();
    assert!(matches!(f.jacobian(0, 0), Err(Error::NotInitialized)));
}

#[test]
fn block_batch_with_original_outputs() {
    let mut f = prod_sum_graph();
    f.init().unwrap();
    let mut j = f.jacobian_blocks(&[(0, 1), (0, 0)], true).unwrap();

    assert_eq!(j.num_outputs(), 4);
    j.set_input(0, &[2.0, 5.0]).unwrap();
    j.evaluate(0, 0).unwrap();

    // Output ordering follows the requested blocks, then originals.
    let j_sum = j.output(0).unwrap();
    assert!((j_sum.get(0, 0) - 1.0).abs() < 1e-14);
    assert!((j_sum.get(0, 1) - 1.0).abs() < 1e-14);
    let j_prod = j.output(1).unwrap();
    assert!((j_prod.get(0, 0) - 5.0).abs() < 1e-14);
    assert!((j_prod.get(0, 1) - 2.0).abs() < 1e-14);
    assert!((j.output(2).unwrap().as_slice()[0] - 10.0).abs() < 1e-14);
    assert!((j.output(3).unwrap().as_slice()[0] - 7.0).abs() < 1e-14);
}

#[test]
fn jacobian_of_sparse_function_skips_zero_columns() {
    // y0 = x0 * x1, y1 = x3: columns 2 is structurally zero.
    let mut b = GraphBuilder::new();
    let x = b.input(4, 1);
    let p = b.mul(x[0], x[1]);
    b.output(2, 1, &[p, x[3]]);
    let mut f: Function<f64> = Function::new(b.finish());
    f.init().unwrap();

    let sp = f.jac_sparsity(0, 0, false).unwrap();
    assert!(!sp.contains(0, 2));
    assert!(!sp.contains(1, 2));

    let mut j = f.jacobian(0, 0).unwrap();
    j.set_input(0, &[3.0, -2.0, 7.0, 1.5]).unwrap();
    j.evaluate(0, 0).unwrap();
    let jac = j.output(0).unwrap();
    let expect = [[-2.0, 3.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]];
    for r in 0..2 {
        for c in 0..4 {
            assert!((jac.get(r, c) - expect[r][c]).abs() < 1e-14);
        }
    }
}
