use num_traits::Float;

/// Product of many factors, kept as a sign and a mean log-magnitude.
/// 
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
/// 
/// Represents \\(\rho \exp(\kappa n)\\), which neither overflows nor underflows
/// while it is accumulated, e.g. for the determinant of a large factorized matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeProduct<F: Float>
{
    /// Sign (or unit magnitude) \\(\rho\\), zero if any factor is zero.
    pub rho: F,
    /// Mean of the log-magnitudes of the factors, \\(\kappa\\).
    pub kappa: F,
    /// Number of factors \\(n\\).
    pub n: usize,
}

impl<F: Float> SafeProduct<F>
{
    /// Creates the empty product of `n` factors, \\(\rho = 1, \kappa = 0\\).
    pub fn new(n: usize) -> Self
    {
        SafeProduct {
            rho: F::one(),
            kappa: F::zero(),
            n,
        }
    }

    /// Creates the product of `factors`.
    pub fn from_factors<I: IntoIterator<Item=F>>(factors: I) -> Self
    {
        let factors: Vec<F> = factors.into_iter().collect();
        let mut p = Self::new(factors.len());

        for f in factors.iter() {
            if *f == F::zero() {
                p.rho = F::zero();
                p.kappa = F::zero();
                break;
            }
            p.rho = p.rho * f.signum();
            p.kappa = p.kappa + f.abs().ln();
        }
        if p.rho != F::zero() && p.n > 0 {
            p.kappa = p.kappa / F::from(p.n).unwrap_or_else(F::one);
        }
        p
    }

    /// Natural logarithm of the magnitude, \\(\kappa n\\).
    pub fn ln_abs(&self) -> F
    {
        if self.rho == F::zero() {
            F::neg_infinity()
        }
        else {
            self.kappa * F::from(self.n).unwrap_or_else(F::zero)
        }
    }

    /// The product \\(\rho \exp(\kappa n)\\), which may overflow.
    pub fn value(&self) -> F
    {
        if self.rho == F::zero() {
            F::zero()
        }
        else {
            self.rho * self.ln_abs().exp()
        }
    }
}

//

#[test]
fn test_safe_product1()
{
    use float_eq::assert_float_eq;

    let p = SafeProduct::from_factors([2., -3., 0.5]);
    assert_eq!(p.rho, -1.);
    assert_eq!(p.n, 3);
    assert_float_eq!(p.value(), -3., abs <= 1e-12);

    let p = SafeProduct::from_factors([4., 0., 1.]);
    assert_eq!(p.value(), 0.);
    assert_eq!(p.ln_abs(), f64::NEG_INFINITY);

    // far beyond the range of f64 but its log is fine
    let p = SafeProduct::from_factors(vec![1e200_f64; 10]);
    assert!(p.value().is_infinite());
    assert_float_eq!(p.ln_abs(), 2000. * 10_f64.ln(), rel <= 1e-12);

    let p = SafeProduct::<f64>::new(5);
    assert_eq!(p.value(), 1.);
}
