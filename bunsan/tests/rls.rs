use float_eq::assert_float_eq;
use bunsan_core::{Grid, GridOrder, Dist};
use bunsan::prelude::*;
use bunsan::*;

type La = FloatGeneric<f64>;

type ADistSparseMatrix = DistSparseMatrix<La>;
type ADistMultiVec = DistMultiVec<La>;
type ADistMatrix = DistMatrix<La>;

// scattered pattern known to every process, no zero column
fn entry(i: usize, j: usize) -> f64
{
    if i == j {
        3.
    }
    else if (i * 7 + j * 3) % 5 == 0 {
        ((i + 2 * j) % 7) as f64 - 3.
    }
    else {
        0.
    }
}

fn sparse(comm: &Comm, m: usize, n: usize) -> Result<ADistSparseMatrix, DistError>
{
    let mut a = ADistSparseMatrix::with_size(comm, m, n)?;
    for r in 0.. a.local_height() {
        let i = a.global_row(r)?;
        for j in 0.. n {
            if entry(i, j) != 0. {
                a.queue_local_update(r, j, entry(i, j))?;
            }
        }
    }
    a.process_queues();
    Ok(a)
}

// [A; sqrt(rho) I]
fn stacked(comm: &Comm, m: usize, n: usize, rho: f64) -> Result<ADistSparseMatrix, DistError>
{
    let mut a = ADistSparseMatrix::with_size(comm, m + n, n)?;
    for r in 0.. a.local_height() {
        let i = a.global_row(r)?;
        if i < m {
            for j in 0.. n {
                if entry(i, j) != 0. {
                    a.queue_local_update(r, j, entry(i, j))?;
                }
            }
        }
        else {
            a.queue_local_update(r, i - m, rho.sqrt())?;
        }
    }
    a.process_queues();
    Ok(a)
}

fn rhs(comm: &Comm, height: usize, m: usize) -> Result<ADistMultiVec, DistError>
{
    let mut b = ADistMultiVec::with_size(comm, height, 1)?;
    b.set_by_fn(|i, _| if i < m {((i * 5) % 11) as f64 - 5.} else {0.});
    Ok(b)
}

//

#[test]
fn test_rls1()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let (m, n) = (30, 12);

    for rho in [0.1, 10.] {
        let rslt = launch(3, |comm| -> Result<(Vec<f64>, Vec<f64>), DistError> {
            let a = sparse(comm, m, n)?;
            let b = rhs(comm, m, m)?;
            let sol = rls(&a, &b, rho, &SocpAffineCtrl::new())?;
            assert_eq!(sol.status, SolveStatus::Converged);
            assert!(sol.dual_obj <= sol.primal_obj + 1e-6 * (1. + sol.primal_obj.abs()));

            // Tikhonov as plain least squares of the stacked system
            let a_st = stacked(comm, m, n, rho)?;
            let b_st = rhs(comm, m + n, m)?;
            let x_st = least_squares(&a_st, &b_st, &LeastSquaresCtrl::new())?;

            Ok((sol.x.gather_all()?, x_st.gather_all()?))
        }).unwrap();

        for r in rslt {
            let (x, x_st) = r.unwrap();
            assert_float_eq!(x.as_slice(), x_st.as_slice(), abs_all <= 5e-4);
        }
    }
}

#[test]
fn test_rls2()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let (m, n) = (16, 6);

    let rslt = launch(4, |comm| -> Result<(Vec<f64>, Vec<f64>), DistError> {
        // dense storage over a 2x2 grid, converted for the solver
        let grid = Grid::new(comm, GridOrder::ColumnMajor)?;
        let mut d = ADistMatrix::with_size(&grid, Dist::Mc, Dist::Mr, m, n)?;
        d.set_by_fn(entry);
        let a_dense = ADistSparseMatrix::from_dist_matrix(&d)?;
        let a = sparse(comm, m, n)?;
        assert_eq!(a_dense.num_local_entries(), a.num_local_entries());

        let b = rhs(comm, m, m)?;
        let x_dense = rls(&a_dense, &b, 1., &SocpAffineCtrl::new())?.into_converged()?;
        let x = rls(&a, &b, 1., &SocpAffineCtrl::new())?.into_converged()?;

        Ok((x_dense.gather_all()?, x.gather_all()?))
    }).unwrap();

    for r in rslt {
        let (x_dense, x) = r.unwrap();
        assert_eq!(x_dense, x);
    }
}

#[test]
fn test_rls3()
{
    let _ = env_logger::builder().is_test(true).try_init();

    // rows of no entries and a wide matrix
    let rslt = launch(2, |comm| -> Result<Vec<f64>, DistError> {
        let mut a = ADistSparseMatrix::with_size(comm, 3, 5)?;
        for r in 0.. a.local_height() {
            if a.global_row(r)? == 1 {
                a.queue_local_update(r, 4, 2.)?;
            }
        }
        a.process_queues();

        let mut b = ADistMultiVec::with_size(comm, 3, 1)?;
        b.fill(1.);

        let sol = rls(&a, &b, 4., &SocpAffineCtrl::new())?;
        assert_float_eq!(sol.residual_norm, (2_f64 + 1. / 4.).sqrt(), abs <= 1e-4);
        sol.x.gather_all()
    }).unwrap();

    // only x_4 = 2 / (4 + 4) is nonzero
    for r in rslt {
        assert_float_eq!(r.unwrap().as_slice(), [0., 0., 0., 0., 0.25].as_slice(), abs_all <= 1e-4);
    }
}
