use crate::LinAlg;

/// Dense extension of [`LinAlg`], needed by [`crate::DistMatrix`].
/// 
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
pub trait LinAlgEx: LinAlg
{
    /// Calculate \\(\alpha A x + \beta y\\), or \\(\alpha A^T x + \beta y\\) if `transpose`,
    /// for a local block \\(A\\) of `lh x lw` stored in column-major `a`.
    /// 
    /// When `beta` is zero and not `transpose`, `y` is scaled rather than overwritten,
    /// so that it shall be finite.
    fn transform_ge(transpose: bool, lh: usize, lw: usize, alpha: Self::F, a: &[Self::F], x: &[Self::F], beta: Self::F, y: &mut [Self::F]);
}
