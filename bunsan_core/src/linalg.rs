//! Local linear algebra

use num_traits::Float;
use core::fmt::{Debug, LowerExp};

/// Linear algebra trait on process-local slices.
/// 
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
/// 
/// Every distributed kernel reduces to these routines applied to the local part of its operands,
/// followed by a collective combination.
pub trait LinAlg: Clone + Send + Sync + 'static
{
    /// Floating point data type used as scalars.
    type F: Float + Debug + LowerExp + Send + Sync + 'static;

    /// Calculate 2-norm (or euclidean norm) \\(\\|x\\|_2=\sqrt{\sum_i x_i^2}\\).
    /// 
    /// Returns the calculated norm.
    /// * `x` is a vector \\(x\\).
    fn norm(x: &[Self::F]) -> Self::F;

    /// Calculate a scaled sum of squares.
    /// 
    /// Returns \\((s', q')\\) such that \\(s'^2 q' = s^2 q + \sum_i x_i^2\\), where \\(s' \ge |x_i|\\).
    /// * `x` is a vector \\(x\\).
    /// * `scale_ssq` is the accumulation \\((s, q)\\) before entry.
    ///   Start with `(0, 1)`.
    fn ssq(x: &[Self::F], scale_ssq: (Self::F, Self::F)) -> (Self::F, Self::F);

    /// Copy from a vector to another vector.
    /// 
    /// * `x` is a slice to copy.
    /// * `y` is a slice being copied to.
    ///   `x` and `y` shall have the same length.
    fn copy(x: &[Self::F], y: &mut [Self::F]);

    /// Calculate \\(\alpha x\\).
    /// 
    /// * `alpha` is a scalar \\(\alpha\\).
    /// * `x` is a vector \\(x\\) before entry, \\(\alpha x\\) on exit.
    fn scale(alpha: Self::F, x: &mut [Self::F]);

    /// Calculate \\(\alpha x + y\\).
    /// 
    /// * `alpha` is a scalar \\(\alpha\\).
    /// * `x` is a vector \\(x\\).
    /// * `y` is a vector \\(y\\) before entry, \\(\alpha x + y\\) on exit.
    ///   `x` and `y` shall have the same length.
    fn add(alpha: Self::F, x: &[Self::F], y: &mut [Self::F]);

    /// Calculate 1-norm (or sum of absolute values) \\(\\|x\\|_1=\sum_i |x_i|\\).
    /// 
    /// Returns the calculated norm.
    /// * `x` is a vector \\(x\\).
    /// * `incx` is spacing between elements of `x`
    fn abssum(x: &[Self::F], incx: usize) -> Self::F;

    /// Calculate infinity-norm (or max of absolute values) \\(\\|x\\|_\infty=\max_i |x_i|\\).
    /// 
    /// Returns the calculated norm, zero for an empty `x`.
    fn absmax(x: &[Self::F]) -> Self::F;

    /// Calculate inner product \\(x^T y\\).
    /// 
    /// * `x` and `y` shall have the same length.
    fn dot(x: &[Self::F], y: &[Self::F]) -> Self::F;
}
