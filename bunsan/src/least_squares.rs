//! Least squares

use num_traits::{Float, Zero, One};
use bunsan_core::{LinAlg, DistError, DistMultiVec, DistSparseMatrix, DistOperator, Timer, multiply, nrm2, Orientation};
use crate::ctrl::LeastSquaresCtrl;
use crate::dist_qsd::{KktLayout, KktSegment, DistQsd};

/// Least squares solution of a distributed sparse system.
///
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
///
/// For \\(A \in \mathbb{R}^{m \times n}\\) with \\(m \ge n\\), solves
/// \\[
/// \begin{array}{ll}
/// {\rm minimize} & \\|A x - b\\|_2
/// \end{array}
/// \\]
/// through the augmented quasi-semidefinite system
/// \\[
/// \left[ \begin{array}{cc} \alpha I & A \\\\ A^T & 0 \end{array} \right]
/// \left[ \begin{array}{c} r / \alpha \\\\ x \end{array} \right]
/// =
/// \left[ \begin{array}{c} b \\\\ 0 \end{array} \right],
/// \\]
/// which never forms \\(A^T A\\).
/// With `ctrl.equilibrate`, the system is built for \\(A D\\) with \\(D = {\bf diag}(1 / \\|A_{:,j}\\|_1)\\)
/// and the solution is mapped back by \\(x = D \hat x\\).
///
/// For \\(m < n\\), returns the minimum norm solution of \\(A x = b\\) from
/// \\[
/// \left[ \begin{array}{cc} I & A^T \\\\ A & 0 \end{array} \right]
/// \left[ \begin{array}{c} x \\\\ -y \end{array} \right]
/// =
/// \left[ \begin{array}{c} 0 \\\\ b \end{array} \right].
/// \\]
///
/// Each column of `b` is solved independently.
/// This call is collective: every process of the group shall call it.
///
/// Returns `Ok` with \\(x\\) of `n x width(b)`, or `Err` with [`DistError`].
pub fn least_squares<L: LinAlg>(a: &DistSparseMatrix<L>, b: &DistMultiVec<L>, ctrl: &LeastSquaresCtrl<L::F>) -> Result<DistMultiVec<L>, DistError>
{
    let comm = a.comm();
    let (m, n) = (a.height(), a.width());
    let verbose = ctrl.progress && comm.rank() == 0;

    if b.height() != m || b.comm().size() != comm.size() {
        log::error!("Size mismatch: A({}, {}), b({}, {})", m, n, b.height(), b.width());
        return Err(DistError::DimensionMismatch);
    }
    if !(ctrl.alpha > L::F::zero()) {
        log::error!("alpha must be positive: {:?}", ctrl.alpha);
        return Err(DistError::InvalidParameter);
    }
    if !a.is_consistent() {
        log::warn!("rank {}: {} queued updates not committed, ignored", comm.rank(), a.num_queued());
    }

    let mut timer = Timer::new("least squares");
    timer.start();

    if verbose {
        log::info!("----- Initializing");
        log::debug!("{:?}", ctrl);
    }

    let overdetermined = m >= n;

    // column equilibration
    let d = if overdetermined && ctrl.equilibrate {
        let mut d = DistMultiVec::<L>::with_size(comm, n, 1)?;
        a.absadd_cols(&mut d)?;
        for v in d.local_buf_mut() {
            *v = if *v > L::F::zero() {v.recip()} else {L::F::one()};
        }
        Some(d)
    }
    else {
        None
    };
    let scaled;
    let a_hat = match &d {
        Some(d) => {
            let mut s = a.clone();
            s.scale_cols(d)?;
            scaled = s;
            &scaled
        },
        None => a,
    };

    // augmented system
    let (seg_m, seg_n) = if overdetermined {(0, 1)} else {(1, 0)};
    let layout = if overdetermined {
        KktLayout::new(&[
            KktSegment {height: m, comps: 1, positive: true},
            KktSegment {height: n, comps: 1, positive: false},
        ])
    }
    else {
        KktLayout::new(&[
            KktSegment {height: n, comps: 1, positive: true},
            KktSegment {height: m, comps: 1, positive: false},
        ])
    };

    let mut triples = Vec::with_capacity(a_hat.num_local_entries() + m.max(n));
    for r in 0.. a_hat.local_height() {
        let i = a_hat.global_row(r)?;
        let (cols, vals) = a_hat.row(r)?;
        for (j, v) in cols.iter().zip(vals) {
            triples.push((layout.index(seg_m, i, 0), layout.index(seg_n, *j, 0), *v));
        }
        if overdetermined {
            triples.push((layout.index(seg_m, i, 0), layout.index(seg_m, i, 0), ctrl.alpha));
        }
    }
    if !overdetermined {
        // identity of the x block, by the owners of rows of an n x 1 vector
        let x = DistMultiVec::<L>::with_size(comm, n, 1)?;
        for r in 0.. x.local_height() {
            let j = x.global_row(r)?;
            triples.push((layout.index(seg_n, j, 0), layout.index(seg_n, j, 0), L::F::one()));
        }
    }

    let qsd = DistQsd::new(comm, layout, triples, &ctrl.qsd)?;

    if verbose {
        log::info!("----- Started");
    }

    let zero_n = DistMultiVec::<L>::with_size(comm, n, 1)?;
    let mut x = DistMultiVec::<L>::with_size(comm, n, b.width())?;
    for k in 0.. b.width() {
        let b_k = b.column(k)?;
        let rhs = if overdetermined {[&b_k, &zero_n]} else {[&zero_n, &b_k]};
        let sol = qsd.solve(&rhs)?;

        let mut x_k = sol[seg_n].clone();
        if let Some(d) = &d {
            for r in 0.. x_k.local_height() {
                x_k[(r, 0)] = x_k[(r, 0)] * d[(r, 0)];
            }
        }
        x.set_column(k, &x_k)?;
    }

    let sec = timer.stop();

    if ctrl.progress {
        let mut e = b.clone();
        multiply(Orientation::Normal, -L::F::one(), a, &x, L::F::one(), &mut e)?;
        let res = nrm2(&e)?;
        if verbose {
            log::info!("----- Solved: residual {:.2e}", res);
        }
    }
    if ctrl.time && comm.rank() == 0 {
        log::info!("least squares of {}x{} in {:.3e} s", m, n, sec);
    }

    Ok(x)
}

//

#[test]
fn test_least_squares1()
{
    use float_eq::assert_float_eq;
    use bunsan_core::{FloatGeneric, launch};

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    // columns are orthogonal: A^T A = 3 I, A^T b = (8, 1)
    let a_dense = [[1., 0.], [0., 1.], [1., 1.], [1., -1.]];

    for np in 1..= 3 {
        for equilibrate in [false, true] {
            let rslt = launch(np, |comm| -> Result<Vec<f64>, DistError> {
                let mut a = DistSparseMatrix::<La>::with_size(comm, 4, 2)?;
                for r in 0.. a.local_height() {
                    let i = a.global_row(r)?;
                    for j in 0.. 2 {
                        if a_dense[i][j] != 0. {
                            a.queue_local_update(r, j, a_dense[i][j])?;
                        }
                    }
                }
                a.process_queues();

                let mut b = DistMultiVec::<La>::with_size(comm, 4, 1)?;
                b.set_by_fn(|i, _| (i + 1) as f64);

                let ctrl = LeastSquaresCtrl::new().par(|p| p.equilibrate = equilibrate);
                let x = least_squares(&a, &b, &ctrl)?;

                // optimality: A^T (A x - b) = 0
                let mut e = b.clone();
                multiply(Orientation::Normal, -1., &a, &x, 1., &mut e)?;
                let mut g = DistMultiVec::<La>::with_size(comm, 2, 1)?;
                multiply(Orientation::Transpose, 1., &a, &e, 0., &mut g)?;
                assert!(nrm2(&g)? < 1e-10);

                x.gather_all()
            }).unwrap();

            for r in rslt {
                assert_float_eq!(r.unwrap().as_slice(), [8. / 3., 1. / 3.].as_slice(), abs_all <= 1e-10);
            }
        }
    }
}

#[test]
fn test_least_squares2()
{
    use float_eq::assert_float_eq;
    use bunsan_core::{FloatGeneric, launch};

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    let rslt = launch(2, |comm| -> Result<Vec<f64>, DistError> {
        // x_0 + x_1 + 2 x_2 = b, minimum norm
        let mut a = DistSparseMatrix::<La>::with_size(comm, 1, 3)?;
        for r in 0.. a.local_height() {
            a.queue_local_update(r, 0, 1.)?;
            a.queue_local_update(r, 1, 1.)?;
            a.queue_local_update(r, 2, 2.)?;
        }
        a.process_queues();

        // two right-hand sides at once
        let mut b = DistMultiVec::<La>::with_size(comm, 1, 2)?;
        b.set_by_fn(|_, c| [6., -3.][c]);

        let x = least_squares(&a, &b, &LeastSquaresCtrl::new())?;
        assert_eq!((x.height(), x.width()), (3, 2));
        x.gather_all()
    }).unwrap();

    for r in rslt {
        assert_float_eq!(r.unwrap().as_slice(), [1., 1., 2., -0.5, -0.5, -1.].as_slice(), abs_all <= 1e-10);
    }
}

#[test]
fn test_least_squares3()
{
    use bunsan_core::{FloatGeneric, launch};

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    let rslt = launch(2, |comm| -> Result<(), DistError> {
        let a = DistSparseMatrix::<La>::with_size(comm, 3, 2)?;
        let b = DistMultiVec::<La>::with_size(comm, 2, 1)?;
        assert_eq!(least_squares(&a, &b, &LeastSquaresCtrl::new()).err(), Some(DistError::DimensionMismatch));

        let b = DistMultiVec::<La>::with_size(comm, 3, 1)?;
        let ctrl = LeastSquaresCtrl::new().par(|p| p.alpha = 0.);
        assert_eq!(least_squares(&a, &b, &ctrl).err(), Some(DistError::InvalidParameter));
        Ok(())
    }).unwrap();

    for r in rslt {
        r.unwrap();
    }
}
