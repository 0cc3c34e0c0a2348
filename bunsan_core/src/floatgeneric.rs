use num_traits::Float;
use core::fmt::{Debug, LowerExp};
use core::marker::PhantomData;
use crate::{LinAlg, LinAlgEx};

/// [`LinAlg`] and [`LinAlgEx`] for any `num_traits::Float`, in pure Rust.
/// 
/// The only implementation shipped; every distributed container takes it as `L`.
#[derive(Clone)]
pub struct FloatGeneric<F>
{
    ph_f: PhantomData<F>,
}

impl<F> LinAlg for FloatGeneric<F>
where F: Float + Debug + LowerExp + Send + Sync + 'static
{
    type F = F;

    fn norm(x: &[F]) -> F
    {
        let (scale, ssq) = Self::ssq(x, (F::zero(), F::one()));
        scale * ssq.sqrt()
    }

    fn ssq(x: &[F], (mut scale, mut ssq): (F, F)) -> (F, F)
    {
        for u in x {
            let a = u.abs();
            if a > F::zero() {
                if scale < a {
                    let r = scale / a;
                    ssq = F::one() + ssq * r * r;
                    scale = a;
                }
                else {
                    let r = a / scale;
                    ssq = ssq + r * r;
                }
            }
            else if a.is_nan() {
                return (F::nan(), F::one());
            }
        }
        (scale, ssq)
    }
    
    fn copy(x: &[F], y: &mut [F])
    {
        assert_eq!(x.len(), y.len());
    
        for (u, v) in x.iter().zip(y) {
            *v = *u;
        }
    }

    fn scale(alpha: F, x: &mut [F])
    {
        for u in x {
            *u = alpha * *u;
        }
    }
    
    fn add(alpha: F, x: &[F], y: &mut [F])
    {
        assert_eq!(x.len(), y.len());
    
        for (u, v) in x.iter().zip(y) {
            *v = *v + alpha * *u;
        }
    }

    fn abssum(x: &[F], incx: usize) -> F
    {
        if incx == 0 {
            F::zero()
        }
        else {
            let mut sum = F::zero();
            for u in x.chunks(incx) {
                sum = sum + u[0].abs();
            }
            sum
        }
    }

    fn absmax(x: &[F]) -> F
    {
        x.iter().fold(F::zero(), |m, u| m.max(u.abs()))
    }

    fn dot(x: &[F], y: &[F]) -> F
    {
        assert_eq!(x.len(), y.len());

        let mut sum = F::zero();
        for (u, v) in x.iter().zip(y) {
            sum = sum + *u * *v;
        }
        sum
    }
}

//

impl<F> LinAlgEx for FloatGeneric<F>
where F: Float + Debug + LowerExp + Send + Sync + 'static
{
    fn transform_ge(transpose: bool, lh: usize, lw: usize, alpha: F, a: &[F], x: &[F], beta: F, y: &mut [F])
    {
        assert_eq!(a.len(), lh * lw);

        if transpose {
            assert_eq!((x.len(), y.len()), (lh, lw));

            // one dot product per stored column
            for (c, v) in y.iter_mut().enumerate() {
                *v = alpha * Self::dot(&a[c * lh.. (c + 1) * lh], x) + beta * *v;
            }
        }
        else {
            assert_eq!((x.len(), y.len()), (lw, lh));

            Self::scale(beta, y);
            for (c, u) in x.iter().enumerate() {
                Self::add(alpha * *u, &a[c * lh.. (c + 1) * lh], y);
            }
        }
    }
}

//

#[test]
fn test_floatgeneric1()
{
    use float_eq::assert_float_eq;

    type L = FloatGeneric<f64>;

    let x = [3., -4., 0.];
    assert_float_eq!(L::norm(&x), 5., abs <= 1e-12);
    assert_float_eq!(L::abssum(&x, 1), 7., abs <= 1e-12);
    assert_float_eq!(L::absmax(&x), 4., abs <= 1e-12);

    // huge entries do not overflow the scaled sum of squares
    let big = [1e200, 1e200];
    assert_float_eq!(L::norm(&big) / 1e200, 2_f64.sqrt(), abs <= 1e-12);

    let (s, q) = L::ssq(&[1., 2.], (0., 1.));
    let (s, q) = L::ssq(&[2.], (s, q));
    assert_float_eq!(s * q.sqrt(), 3., abs <= 1e-12);
}

#[test]
fn test_floatgeneric2()
{
    use float_eq::assert_float_eq;

    type L = FloatGeneric<f64>;

    // [1 3]
    // [2 4]
    let mat = [1., 2., 3., 4.];
    let x = [1., 1.];
    let mut y = [1., 1.];
    L::transform_ge(false, 2, 2, 1., &mat, &x, 2., &mut y);
    assert_float_eq!(y, [6., 8.], abs_all <= 1e-12);

    L::transform_ge(true, 2, 2, 1., &mat, &x, 0., &mut y);
    assert_float_eq!(y, [3., 7.], abs_all <= 1e-12);

    assert_float_eq!(L::dot(&mat[0..2], &mat[2..4]), 11., abs <= 1e-12);
}
