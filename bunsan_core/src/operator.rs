//! Distributed linear operator

use num_traits::Zero;
use crate::{LinAlg, Comm, DistError, DistMultiVec};

/// Distributed linear operator trait
/// 
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
/// 
/// Expresses a linear operator \\(K: \mathbb{R}^n \to \mathbb{R}^m\\) (or a matrix \\(K \in \mathbb{R}^{m \times n}\\))
/// whose entries are spread over the processes of a group.
/// Operand vectors are [`DistMultiVec`]s; a multi-vector of width \\(k\\) is treated as \\(k\\) vectors at once.
/// Every method is collective.
pub trait DistOperator<L: LinAlg>
{
    /// Size of \\(K\\).
    /// 
    /// Returns a tuple of \\(m\\) and \\(n\\).
    fn size(&self) -> (usize, usize);

    /// Communicator of the process group holding \\(K\\).
    fn comm(&self) -> &Comm;

    /// Calculate \\(\alpha K x + \beta y\\).
    /// 
    /// * `alpha` is a scalar \\(\alpha\\).
    /// * `x` is a vector \\(x\\).
    ///   The height of `x` shall be \\(n\\).
    /// * `beta` is a scalar \\(\beta\\).
    ///   When it is zero, `y` is overwritten without being read.
    /// * `y` is a vector \\(y\\) before entry,
    ///   \\(\alpha K x + \beta y\\) on exit.
    ///   The height of `y` shall be \\(m\\) and its width the same as `x`.
    fn op(&self, alpha: L::F, x: &DistMultiVec<L>, beta: L::F, y: &mut DistMultiVec<L>) -> Result<(), DistError>;

    /// Calculate \\(\alpha K^T x + \beta y\\).
    /// 
    /// * `alpha` is a scalar \\(\alpha\\).
    /// * `x` is a vector \\(x\\).
    ///   The height of `x` shall be \\(m\\).
    /// * `beta` is a scalar \\(\beta\\).
    /// * `y` is a vector \\(y\\) before entry,
    ///   \\(\alpha K^T x + \beta y\\) on exit.
    ///   The height of `y` shall be \\(n\\) and its width the same as `x`.
    fn trans_op(&self, alpha: L::F, x: &DistMultiVec<L>, beta: L::F, y: &mut DistMultiVec<L>) -> Result<(), DistError>;

    /// Calculate \\(\left[ \tau_j + \sum_{i=0}^{m-1}|K_{ij}| \right]_{j=0,...,n-1}\\).
    /// 
    /// * `tau` is a vector \\(\tau\\) before entry,
    ///   \\(\left[ \tau_j + \sum_{i=0}^{m-1}|K_{ij}| \right]_{j=0,...,n-1}\\) on exit.
    ///   `tau` shall be \\(n \times 1\\).
    fn absadd_cols(&self, tau: &mut DistMultiVec<L>) -> Result<(), DistError>;

    /// Calculate \\(\left[ \sigma_i + \sum_{j=0}^{n-1}|K_{ij}| \right]_{i=0,...,m-1}\\).
    /// 
    /// * `sigma` is a vector \\(\sigma\\) before entry,
    ///   \\(\left[ \sigma_i + \sum_{j=0}^{n-1}|K_{ij}| \right]_{i=0,...,m-1}\\) on exit.
    ///   `sigma` shall be \\(m \times 1\\).
    fn absadd_rows(&self, sigma: &mut DistMultiVec<L>) -> Result<(), DistError>;
}

/// Checks the operands of [`DistOperator::op`] (or of [`DistOperator::trans_op`] if `transpose`).
pub fn check_op_operands<L, O>(o: &O, transpose: bool, x: &DistMultiVec<L>, y: &DistMultiVec<L>) -> Result<(), DistError>
where L: LinAlg, O: DistOperator<L> + ?Sized
{
    let (m, n) = o.size();
    let (h_x, h_y) = if transpose {(m, n)} else {(n, m)};
    let size = o.comm().size();

    if x.height() != h_x || y.height() != h_y || x.width() != y.width()
    || x.comm().size() != size || y.comm().size() != size {
        log::error!("Size mismatch: op{:?}{}, x({}, {}), y({}, {})",
            o.size(), if transpose {"^T"} else {""}, x.height(), x.width(), y.height(), y.width());
        return Err(DistError::DimensionMismatch);
    }
    Ok(())
}

/// Scales `y` by `beta` in place, or zeroes it if `beta` is zero.
pub(crate) fn scale_or_zero<L: LinAlg>(beta: L::F, y: &mut DistMultiVec<L>)
{
    if beta == L::F::zero() {
        y.fill(beta);
    }
    else {
        L::scale(beta, y.local_buf_mut());
    }
}
