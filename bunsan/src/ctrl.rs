//! Solver controls

use num_traits::Float;

fn eps_pow<F: Float>(p: f64) -> F
{
    F::epsilon().powf(F::from(p).unwrap_or_else(F::one))
}

//

/// Controls of a regularized quasi-semidefinite (QSD) solve.
///
/// The system is factored with static diagonal regularization,
/// and its solution is then refined against the unregularized system.
#[derive(Debug, Clone, PartialEq)]
pub struct QsdCtrl<F: Float>
{
    /// Regularization added to the positive definite block.
    pub reg_primal: F,
    /// Regularization subtracted from the negative definite block.
    pub reg_dual: F,
    /// Relative residual accepted without a warning.
    pub rel_tol: F,
    /// Relative residual that stops the iterative refinement.
    pub rel_tol_refine: F,
    /// Max iteration number of the iterative refinement.
    pub max_refine_its: usize,
    /// Emits refinement diagnostics (info level, rank 0).
    pub progress: bool,
    /// Emits factorization time (info level, rank 0).
    pub time: bool,
}

impl<F: Float> Default for QsdCtrl<F>
{
    fn default() -> Self
    {
        QsdCtrl {
            reg_primal: eps_pow(0.5),
            reg_dual: eps_pow(0.5),
            rel_tol: eps_pow(0.5),
            rel_tol_refine: eps_pow(0.8),
            max_refine_its: 50,
            progress: false,
            time: false,
        }
    }
}

//

/// Controls of the Mehrotra predictor-corrector interior-point method.
#[derive(Debug, Clone, PartialEq)]
pub struct MehrotraCtrl<F: Float>
{
    /// Target of the relative residuals and the relative gap.
    pub tolerance: F,
    /// Accuracy still accepted, with a warning, when the iteration cannot progress any more.
    pub min_tolerance: F,
    /// Max iteration number. Reaching it returns the best iterate, not an error.
    pub max_iter: usize,
    /// Fraction of the step to the boundary of the cone actually taken.
    pub step_ratio: F,
    /// Emits per-iteration residuals (info level, rank 0).
    pub progress: bool,
    /// Emits the wall-clock time of the solve (info level, rank 0).
    pub time: bool,
    /// Controls of the inner QSD solves.
    pub qsd: QsdCtrl<F>,
}

impl<F: Float> Default for MehrotraCtrl<F>
{
    fn default() -> Self
    {
        MehrotraCtrl {
            tolerance: eps_pow(0.5),
            min_tolerance: eps_pow(0.3),
            max_iter: 100,
            step_ratio: F::from(0.99).unwrap_or_else(F::one),
            progress: false,
            time: false,
            qsd: QsdCtrl::default(),
        }
    }
}

//

/// Controls of an affine second-order cone program solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SocpAffineCtrl<F: Float>
{
    pub mehrotra: MehrotraCtrl<F>,
}

impl<F: Float> Default for SocpAffineCtrl<F>
{
    fn default() -> Self
    {
        SocpAffineCtrl {
            mehrotra: MehrotraCtrl::default(),
        }
    }
}

impl<F: Float> SocpAffineCtrl<F>
{
    /// Creates an instance with the default controls.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Changes controls.
    ///
    /// Returns [`SocpAffineCtrl`] with its controls changed.
    /// * `f` is a function to change controls given by its argument.
    pub fn par<P>(mut self, f: P) -> Self
    where P: FnOnce(&mut Self)
    {
        f(&mut self);
        self
    }
}

//

/// Controls of a least squares solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresCtrl<F: Float>
{
    /// Scaling of the identity block of the augmented system.
    pub alpha: F,
    /// Equilibrates the columns of the matrix before the solve.
    pub equilibrate: bool,
    /// Emits a summary of the solve (info level, rank 0).
    pub progress: bool,
    /// Emits the wall-clock time of the solve (info level, rank 0).
    pub time: bool,
    /// Controls of the QSD solve.
    pub qsd: QsdCtrl<F>,
}

impl<F: Float> Default for LeastSquaresCtrl<F>
{
    fn default() -> Self
    {
        LeastSquaresCtrl {
            alpha: F::one(),
            equilibrate: true,
            progress: false,
            time: false,
            qsd: QsdCtrl::default(),
        }
    }
}

impl<F: Float> LeastSquaresCtrl<F>
{
    /// Creates an instance with the default controls.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Changes controls.
    ///
    /// Returns [`LeastSquaresCtrl`] with its controls changed.
    /// * `f` is a function to change controls given by its argument.
    pub fn par<P>(mut self, f: P) -> Self
    where P: FnOnce(&mut Self)
    {
        f(&mut self);
        self
    }
}

//

#[test]
fn test_ctrl1()
{
    let c = SocpAffineCtrl::<f64>::new().par(|p| {
        p.mehrotra.progress = true;
        p.mehrotra.qsd.progress = true;
        p.mehrotra.max_iter = 7;
    });

    assert!(c.mehrotra.progress && c.mehrotra.qsd.progress && !c.mehrotra.time);
    assert_eq!(c.mehrotra.max_iter, 7);
    assert!((c.mehrotra.tolerance - f64::EPSILON.sqrt()).abs() < 1e-20);
    assert!(c.mehrotra.min_tolerance > c.mehrotra.tolerance);
    assert!(c.mehrotra.qsd.rel_tol_refine < c.mehrotra.qsd.rel_tol);

    let l = LeastSquaresCtrl::<f32>::new().par(|p| p.equilibrate = false);
    assert!(!l.equilibrate);
    assert_eq!(l.alpha, 1.);
}
