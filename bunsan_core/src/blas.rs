//! Distributed linear algebra kernels

use num_traits::{Float, Zero, One};
use crate::{LinAlg, DistError, DistMultiVec, DistSparseMatrix, DistMatrix, DistOperator, Orientation, NormType};

/// Deep copy between distributed objects.
pub trait DistCopy
{
    /// Overwrites `self` with a deep copy of `src`, taking over its shape and distribution.
    /// 
    /// Returns `Err` with [`DistError::DimensionMismatch`] if `src` lives on a process group of another size.
    fn copy_from(&mut self, src: &Self) -> Result<(), DistError>;
}

fn check_same_group(dst_size: usize, src_size: usize) -> Result<(), DistError>
{
    if dst_size != src_size {
        log::error!("copy between groups of {} and {} processes", src_size, dst_size);
        Err(DistError::DimensionMismatch)
    }
    else {
        Ok(())
    }
}

impl<L: LinAlg> DistCopy for DistMultiVec<L>
{
    fn copy_from(&mut self, src: &Self) -> Result<(), DistError>
    {
        check_same_group(self.comm().size(), src.comm().size())?;
        *self = src.clone();
        Ok(())
    }
}

impl<L: LinAlg> DistCopy for DistSparseMatrix<L>
{
    fn copy_from(&mut self, src: &Self) -> Result<(), DistError>
    {
        check_same_group(self.comm().size(), src.comm().size())?;
        *self = src.clone();
        Ok(())
    }
}

impl<L: LinAlg> DistCopy for DistMatrix<L>
{
    fn copy_from(&mut self, src: &Self) -> Result<(), DistError>
    {
        check_same_group(self.comm().size(), src.comm().size())?;
        *self = src.clone();
        Ok(())
    }
}

/// Copies `src` into `dst`, resizing `dst` to the shape of `src`.
pub fn copy<T: DistCopy>(src: &T, dst: &mut T) -> Result<(), DistError>
{
    dst.copy_from(src)
}

//

/// Calculates \\(y := \alpha\ {\rm op}(A) x + \beta y\\); collective.
/// 
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
/// 
/// * `orientation` selects \\({\rm op}(A)\\) among \\(A\\), \\(A^T\\) and \\(A^H = A^T\\).
/// 
/// Returns `Err` with [`DistError::DimensionMismatch`] unless the operands conform.
pub fn multiply<L, O>(orientation: Orientation, alpha: L::F, a: &O, x: &DistMultiVec<L>, beta: L::F, y: &mut DistMultiVec<L>) -> Result<(), DistError>
where L: LinAlg, O: DistOperator<L> + ?Sized
{
    match orientation {
        Orientation::Normal => a.op(alpha, x, beta, y),
        Orientation::Transpose | Orientation::Adjoint => a.trans_op(alpha, x, beta, y),
    }
}

//

fn combine_ssq<F: Float>((s1, q1): (F, F), (s2, q2): (F, F)) -> (F, F)
{
    if s1.is_nan() || s2.is_nan() {
        (F::nan(), F::one())
    }
    else if s2 == F::zero() {
        (s1, q1)
    }
    else if s1 >= s2 {
        let r = s2 / s1;
        (s1, q1 + q2 * r * r)
    }
    else {
        let r = s1 / s2;
        (s2, q2 + q1 * r * r)
    }
}

fn max_or_nan<F: Float>(a: F, b: F) -> F
{
    if a.is_nan() || b.is_nan() {
        F::nan()
    }
    else {
        a.max(b)
    }
}

/// Euclidean (Frobenius) norm of `x` over every process; collective.
/// 
/// Each process contributes a scaled sum of squares, and the contributions are combined in rank order.
pub fn nrm2<L: LinAlg>(x: &DistMultiVec<L>) -> Result<L::F, DistError>
{
    let local = L::ssq(x.local_buf(), (L::F::zero(), L::F::one()));
    let (scale, ssq) = x.comm().allreduce(local, combine_ssq)?;
    Ok(scale * ssq.sqrt())
}

/// Norm of `x` of the given type; collective.
pub fn norm<L: LinAlg>(x: &DistMultiVec<L>, norm_type: NormType) -> Result<L::F, DistError>
{
    let comm = x.comm();

    match norm_type {
        NormType::Frobenius => nrm2(x),
        NormType::Two => {
            if x.width() != 1 {
                log::error!("two-norm supported only for a single column, not {}", x.width());
                return Err(DistError::DimensionMismatch);
            }
            nrm2(x)
        },
        NormType::Max => {
            comm.allreduce(L::absmax(x.local_buf()), max_or_nan)
        },
        NormType::EntrywiseOne => {
            comm.allreduce(L::abssum(x.local_buf(), 1), |a, b| a + b)
        },
        NormType::One => {
            let sums: Vec<_> = (0.. x.width()).map(|c| L::abssum(x.local_col(c), 1)).collect();
            let sums = comm.allreduce(sums, |mut a, b| {
                L::add(L::F::one(), &b, &mut a);
                a
            })?;
            Ok(sums.into_iter().fold(L::F::zero(), max_or_nan))
        },
        NormType::Infinity => {
            let mut m = L::F::zero();
            for r in 0.. x.local_height() {
                let mut s = L::F::zero();
                for c in 0.. x.width() {
                    s = s + x[(r, c)].abs();
                }
                m = max_or_nan(m, s);
            }
            comm.allreduce(m, max_or_nan)
        },
    }
}

fn check_layout<L: LinAlg>(x: &DistMultiVec<L>, y: &DistMultiVec<L>) -> Result<(), DistError>
{
    if x.same_layout(y) {
        Ok(())
    }
    else {
        log::error!("Size mismatch: x({}, {}), y({}, {})", x.height(), x.width(), y.height(), y.width());
        Err(DistError::DimensionMismatch)
    }
}

/// Inner product \\(x^T y\\) of all entries; collective.
pub fn dot<L: LinAlg>(x: &DistMultiVec<L>, y: &DistMultiVec<L>) -> Result<L::F, DistError>
{
    check_layout(x, y)?;
    x.comm().allreduce(L::dot(x.local_buf(), y.local_buf()), |a, b| a + b)
}

/// Calculates \\(y := \alpha x + y\\) locally.
pub fn axpy<L: LinAlg>(alpha: L::F, x: &DistMultiVec<L>, y: &mut DistMultiVec<L>) -> Result<(), DistError>
{
    check_layout(x, y)?;
    L::add(alpha, x.local_buf(), y.local_buf_mut());
    Ok(())
}

/// Calculates \\(x := \alpha x\\) locally.
pub fn scale<L: LinAlg>(alpha: L::F, x: &mut DistMultiVec<L>)
{
    L::scale(alpha, x.local_buf_mut());
}

//

#[test]
fn test_blas1()
{
    use float_eq::assert_float_eq;
    use crate::{launch, FloatGeneric};

    type AVec = DistMultiVec<FloatGeneric<f64>>;

    let r = launch(3, |c| {
        let mut x = AVec::with_size(c, 8, 2).unwrap();
        x.set_by_fn(|i, j| if j == 0 {i as f64 - 3.} else {1.});

        let mut y = AVec::new(c).unwrap();
        copy(&x, &mut y).unwrap();
        axpy(-1., &x, &mut y).unwrap();
        let zero = nrm2(&y).unwrap();

        let bad = dot(&x, &AVec::with_size(c, 8, 1).unwrap()).err();

        (
            nrm2(&x).unwrap(),
            norm(&x, NormType::One).unwrap(),
            norm(&x, NormType::Infinity).unwrap(),
            norm(&x, NormType::Max).unwrap(),
            norm(&x, NormType::EntrywiseOne).unwrap(),
            norm(&x, NormType::Two).err(),
            dot(&x, &x).unwrap(),
            zero,
            (y.height(), y.width()),
            bad,
        )
    }).unwrap();

    // column 0: -3..4, column 1: ones
    let ssq: f64 = (0.. 8).map(|i| ((i as f64 - 3.).powi(2)) + 1.).sum();
    for t in r {
        assert_float_eq!(t.0, ssq.sqrt(), abs <= 1e-12);
        assert_float_eq!(t.1, 3. + 2. + 1. + 0. + 1. + 2. + 3. + 4., abs <= 1e-12);
        assert_float_eq!(t.2, 5., abs <= 1e-12);
        assert_float_eq!(t.3, 4., abs <= 1e-12);
        assert_float_eq!(t.4, 16. + 8., abs <= 1e-12);
        assert_eq!(t.5, Some(DistError::DimensionMismatch));
        assert_float_eq!(t.6, ssq, abs <= 1e-9);
        assert_eq!(t.7, 0.);
        assert_eq!(t.8, (8, 2));
        assert_eq!(t.9, Some(DistError::DimensionMismatch));
    }
}

#[test]
fn test_blas2()
{
    use crate::{launch, FloatGeneric};

    type AVec = DistMultiVec<FloatGeneric<f64>>;

    // the result does not depend on the number of processes
    let norms: Vec<f64> = (1..= 4).map(|p| {
        launch(p, |c| {
            let mut x = AVec::with_size(c, 1000, 1).unwrap();
            x.set_by_fn(|i, _| (i as f64 * 0.37).sin() * 1e150);
            nrm2(&x).unwrap()
        }).unwrap()[0]
    }).collect();

    for n in norms.iter() {
        assert!(n.is_finite());
        assert!(((n - norms[0]) / norms[0]).abs() < 1e-13);
    }
}
