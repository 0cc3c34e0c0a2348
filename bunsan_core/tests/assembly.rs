use float_eq::assert_float_eq;
use bunsan_core::*;

type La = FloatGeneric<f64>;

type ADistSparseMatrix = DistSparseMatrix<La>;
type ADistMultiVec = DistMultiVec<La>;
type ADistMatrix = DistMatrix<La>;

fn tridiag(comm: &Comm, n: usize) -> Result<ADistSparseMatrix, DistError>
{
    let mut a = ADistSparseMatrix::with_size(comm, n, n)?;
    a.reserve(3 * a.local_height());
    for r in 0.. a.local_height() {
        let i = a.global_row(r)?;
        // diagonal queued in two halves, summed on commit
        a.queue_update(i, i, 1.)?;
        a.queue_update(i, i, 1.)?;
        if i > 0 {
            a.queue_local_update(r, i - 1, -1.)?;
        }
        if i + 1 < n {
            a.queue_local_update(r, i + 1, -1.)?;
        }
    }
    assert!(!a.is_consistent() || a.local_height() == 0);
    a.process_queues();
    assert!(a.is_consistent());
    Ok(a)
}

//

#[test]
fn test_assembly1()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let n = 7;

    for np in 1..= 4 {
        let rslt = launch(np, |comm| -> Result<(usize, Vec<f64>), DistError> {
            let mut a = tridiag(comm, n)?;
            let entries = a.num_local_entries();

            // committing an empty queue changes nothing
            a.process_queues();
            assert_eq!(a.num_local_entries(), entries);

            let mut x = ADistMultiVec::with_size(comm, n, 1)?;
            x.set_by_fn(|i, _| (i * i) as f64);
            let mut y = ADistMultiVec::with_size(comm, n, 1)?;
            multiply(Orientation::Normal, 1., &a, &x, 0., &mut y)?;

            let total = comm.allreduce(a.local_height(), |p, q| p + q)?;
            Ok((total, y.gather_all()?))
        }).unwrap();

        for r in rslt {
            let (total, y) = r.unwrap();
            assert_eq!(total, n);
            // second difference of i^2 is -2, except at the ends
            assert_float_eq!(y.as_slice(), [-1., -2., -2., -2., -2., -2., 36. * 2. - 25.].as_slice(), abs_all <= 1e-12);
        }
    }
}

#[test]
fn test_assembly2()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let (m, n) = (9, 5);
    let entry = |i: usize, j: usize| if (i + j) % 3 == 0 {(i as f64) - (j as f64) + 0.5} else {0.};

    let rslt = launch(4, |comm| -> Result<(), DistError> {
        let grid = Grid::new(comm, GridOrder::ColumnMajor)?;
        let mut d = ADistMatrix::with_size(&grid, Dist::Mc, Dist::Mr, m, n)?;
        d.set_by_fn(entry);
        let a = ADistSparseMatrix::from_dist_matrix(&d)?;
        assert_eq!((a.height(), a.width()), (m, n));

        for r in 0.. a.local_height() {
            let i = a.global_row(r)?;
            for j in 0.. n {
                assert_eq!(a.value(r, j)?, entry(i, j));
            }
        }

        // y^T (A x) = (A^T y)^T x
        let mut x = ADistMultiVec::new(comm)?;
        gaussian(&mut x, n, 1, 0., 1., 1)?;
        let mut y = ADistMultiVec::new(comm)?;
        uniform(&mut y, m, 1, 0., 1., 2)?;

        let mut ax = ADistMultiVec::with_size(comm, m, 1)?;
        multiply(Orientation::Normal, 1., &a, &x, 0., &mut ax)?;
        let mut aty = ADistMultiVec::with_size(comm, n, 1)?;
        multiply(Orientation::Transpose, 1., &a, &y, 0., &mut aty)?;
        assert_float_eq!(dot(&y, &ax)?, dot(&aty, &x)?, abs <= 1e-12);

        // copy resizes the destination, multiply keeps it
        let mut e = ADistMultiVec::with_size(comm, 2, 3)?;
        copy(&y, &mut e)?;
        multiply(Orientation::Normal, -1., &a, &x, 1., &mut e)?;
        assert_eq!((e.height(), e.width()), (m, 1));
        axpy(1., &ax, &mut e)?;
        assert_float_eq!(nrm2(&e)?, nrm2(&y)?, abs <= 1e-12);

        Ok(())
    }).unwrap();

    for r in rslt {
        r.unwrap();
    }
}

#[test]
fn test_assembly3()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let rslt = launch(3, |comm| -> Result<(), DistError> {
        let mut a = ADistSparseMatrix::with_size(comm, 4, 2)?;
        let first = a.first_local_row();
        let lh = a.local_height();

        assert_eq!(a.queue_local_update(lh, 0, 1.), Err(DistError::OutOfBounds));
        assert_eq!(a.queue_local_update(0, 2, 1.).err(), Some(DistError::OutOfBounds));
        if first > 0 {
            assert_eq!(a.queue_update(first - 1, 0, 1.), Err(DistError::OutOfBounds));
        }
        assert_eq!(a.num_queued(), 0);

        let x = ADistMultiVec::with_size(comm, 3, 1)?;
        let mut y = ADistMultiVec::with_size(comm, 4, 1)?;
        assert_eq!(multiply(Orientation::Normal, 1., &a, &x, 0., &mut y), Err(DistError::DimensionMismatch));

        a.process_queues();
        Ok(())
    }).unwrap();

    for r in rslt {
        r.unwrap();
    }
}

#[test]
fn test_assembly4()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let n = 4;

    let rslt = launch(2, |comm| -> Result<(Vec<f64>, Vec<f64>), DistError> {
        let mut a = tridiag(comm, n)?;

        let mut x = ADistMultiVec::with_size(comm, n, 1)?;
        x.fill(1.);
        let mut y = ADistMultiVec::with_size(comm, n, 1)?;
        multiply(Orientation::Normal, 1., &a, &x, 0., &mut y)?;
        let before = y.gather_all()?;

        // commit on one process only, then multiply on all
        if comm.rank() == 0 {
            a.queue_local_update(0, 3, 5.)?;
            a.process_queues();
        }
        multiply(Orientation::Normal, 1., &a, &x, 0., &mut y)?;

        Ok((before, y.gather_all()?))
    }).unwrap();

    for r in rslt {
        let (before, after) = r.unwrap();
        assert_float_eq!(before.as_slice(), [1., 0., 0., 1.].as_slice(), abs_all <= 1e-12);
        assert_float_eq!(after.as_slice(), [6., 0., 0., 1.].as_slice(), abs_all <= 1e-12);
    }
}
