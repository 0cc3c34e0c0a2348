use float_eq::assert_float_eq;
use bunsan_core::{copy, multiply, nrm2, gaussian};
use bunsan::prelude::*;
use bunsan::*;

type La = FloatGeneric<f64>;

type ADistSparseMatrix = DistSparseMatrix<La>;
type ADistMultiVec = DistMultiVec<La>;

// banded rectangle with a dense last column
fn rectang(comm: &Comm, height: usize, width: usize) -> Result<ADistSparseMatrix, DistError>
{
    let mut a = ADistSparseMatrix::with_size(comm, height, width)?;
    let local_height = a.local_height();
    a.reserve(5 * local_height);

    for r in 0.. local_height {
        let s = a.global_row(r)?;
        if s < width {
            a.queue_local_update(r, s, 11.)?;
        }
        if s >= 1 && s - 1 < width {
            a.queue_local_update(r, s - 1, -1.)?;
        }
        if s + 1 < width {
            a.queue_local_update(r, s + 1, 2.)?;
        }
        if s >= height && s - height < width {
            a.queue_local_update(r, s - height, -3.)?;
        }
        if s + height < width {
            a.queue_local_update(r, s + height, 4.)?;
        }
        a.queue_local_update(r, width - 1, -5. / height as f64)?;
    }
    a.process_queues();

    Ok(a)
}

struct Outcome
{
    norm_b: f64,
    rls_residual: f64,
    ls_residual: f64,
    x: Vec<f64>,
}

fn solve_both(comm: &Comm, height: usize, width: usize, rho: f64) -> Result<Outcome, DistError>
{
    let a = rectang(comm, height, width)?;

    let mut b = ADistMultiVec::new(comm)?;
    gaussian(&mut b, height, 1, 0., 1., 7)?;
    let norm_b = nrm2(&b)?;

    let ctrl = SocpAffineCtrl::new().par(|p| {
        p.mehrotra.progress = true;
    });
    let sol = rls(&a, &b, rho, &ctrl)?;
    assert_eq!(sol.status, SolveStatus::Converged);

    // residual recomputed the way a caller would
    let mut e = ADistMultiVec::new(comm)?;
    copy(&b, &mut e)?;
    multiply(Orientation::Normal, -1., &a, &sol.x, 1., &mut e)?;
    assert_eq!((e.height(), e.width()), (height, 1));
    let rls_residual = nrm2(&e)?;
    assert_float_eq!(rls_residual, sol.residual_norm, rmax <= 1e-12);

    let x_ls = least_squares(&a, &b, &LeastSquaresCtrl::new())?;
    copy(&b, &mut e)?;
    multiply(Orientation::Normal, -1., &a, &x_ls, 1., &mut e)?;
    let ls_residual = nrm2(&e)?;

    Ok(Outcome {
        norm_b,
        rls_residual,
        ls_residual,
        x: sol.x.gather_all()?,
    })
}

//

#[test]
fn test_e2e1()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let rslt = launch(2, |comm| solve_both(comm, 6000, 4000, 10.)).unwrap();

    for r in rslt {
        let o = r.unwrap();
        assert!(o.rls_residual.is_finite());
        assert!(o.rls_residual < o.norm_b);
        assert!(o.ls_residual <= o.rls_residual * (1. + 1e-9));
        assert_eq!(o.x.len(), 4000);
    }
}

#[test]
fn test_e2e2()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let mut xs = Vec::new();
    for np in [1, 2, 4] {
        let rslt = launch(np, |comm| solve_both(comm, 600, 400, 10.)).unwrap();

        let outcomes: Vec<_> = rslt.into_iter().map(|r| r.unwrap()).collect();
        for o in outcomes.iter() {
            // every process returns the same solution
            assert_eq!(o.x, outcomes[0].x);
            assert!(o.ls_residual <= o.rls_residual * (1. + 1e-9));
        }
        xs.push(outcomes[0].x.clone());
    }

    // independent of the number of processes up to rounding
    assert_float_eq!(xs[1].as_slice(), xs[0].as_slice(), abs_all <= 1e-4);
    assert_float_eq!(xs[2].as_slice(), xs[0].as_slice(), abs_all <= 1e-4);
}

#[test]
fn test_e2e3()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let (m, n) = (60, 12);
    // each column is the previous one plus a tiny perturbation
    let noise = |i: usize, k: usize| ((i * 13 + k * 29) % 17) as f64 / 8. - 1.;
    let entry = move |i: usize, j: usize| {
        let base = ((i * 7) % 11) as f64 - 4.5;
        base + (0.. j).map(|k| 1e-8 * noise(i, k)).sum::<f64>()
    };

    for np in [1, 3] {
        let rslt = launch(np, |comm| -> Result<(SolveStatus, usize, Vec<f64>), DistError> {
            let mut a = ADistSparseMatrix::with_size(comm, m, n)?;
            a.reserve(n * a.local_height());
            for r in 0.. a.local_height() {
                let i = a.global_row(r)?;
                for j in 0.. n {
                    a.queue_local_update(r, j, entry(i, j))?;
                }
            }
            a.process_queues();

            let mut b = ADistMultiVec::new(comm)?;
            gaussian(&mut b, m, 1, 0., 1., 7)?;

            let ctrl = SocpAffineCtrl::new().par(|p| p.mehrotra.max_iter = 1);
            let sol = rls(&a, &b, 1e-6, &ctrl)?;
            assert!(sol.residual_norm.is_finite());

            Ok((sol.status, sol.iterations, sol.x.gather_all()?))
        }).unwrap();

        for r in rslt {
            let (status, iterations, x) = r.unwrap();
            assert_eq!(status, SolveStatus::MaxIterExceeded);
            assert_eq!(iterations, 1);
            assert_eq!(x.len(), n);
            assert!(x.iter().all(|v| v.is_finite()));
        }
    }
}
