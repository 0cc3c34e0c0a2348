use num_traits::{Float, Zero, One};
use core::marker::PhantomData;
use bunsan_core::{LinAlg, DistError, DistMultiVec};

//

/// Product of second-order (or quadratic) cones
///
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
///
/// \\[
/// \mathcal{Q}^k =
/// \left\lbrace u \in \mathbb{R}^k
/// \ \middle|\ \sqrt{u_1^2+\cdots+u_{k-1}^2} \le u_0
/// \right\rbrace
/// \\]
///
/// A `height x k` [`DistMultiVec`] is a member of the product of `height` cones \\(\mathcal{Q}^k\\),
/// one per row; writing \\(u = (u_0, \bar u)\\) for a row, the Jordan algebra operations are
/// \\(u \circ v = (u^T v, u_0 \bar v + v_0 \bar u)\\) with the identity \\(e = (1, 0)\\).
/// Every operation except [`ConeSoc::max_step`] and [`ConeSoc::max_violation`] is local.
pub struct ConeSoc<L: LinAlg>
{
    ph_l: PhantomData<L>,
}

fn check_same<L: LinAlg>(u: &DistMultiVec<L>, v: &DistMultiVec<L>) -> Result<(), DistError>
{
    if u.same_layout(v) && u.width() >= 2 {
        Ok(())
    }
    else {
        log::error!("Size mismatch: u({}, {}), v({}, {})", u.height(), u.width(), v.height(), v.width());
        Err(DistError::DimensionMismatch)
    }
}

fn row<L: LinAlg>(u: &DistMultiVec<L>, r: usize) -> Vec<L::F>
{
    (0.. u.width()).map(|c| u[(r, c)]).collect()
}

fn set_row<L: LinAlg>(u: &mut DistMultiVec<L>, r: usize, x: &[L::F])
{
    for (c, x_c) in x.iter().enumerate() {
        u[(r, c)] = *x_c;
    }
}

/// \\(u^T J v = u_0 v_0 - \bar u^T \bar v\\)
fn jdot<F: Float>(u: &[F], v: &[F]) -> F
{
    u.iter().zip(v).skip(1).fold(u[0] * v[0], |acc, (a, b)| acc - *a * *b)
}

impl<L: LinAlg> ConeSoc<L>
{
    /// Creates an instance.
    pub fn new() -> Self
    {
        ConeSoc {
            ph_l: PhantomData,
        }
    }

    /// Identity \\(e\\) of each cone, shaped like `like`.
    pub fn identity(&self, like: &DistMultiVec<L>) -> DistMultiVec<L>
    {
        let mut e = DistMultiVec::from_existing(like);
        e.set_by_fn(|_, c| if c == 0 {L::F::one()} else {L::F::zero()});
        e
    }

    /// Adds \\(\alpha e\\) to `u`.
    pub fn add_identity(&self, alpha: L::F, u: &mut DistMultiVec<L>)
    {
        for r in 0.. u.local_height() {
            u[(r, 0)] = u[(r, 0)] + alpha;
        }
    }

    /// Jordan product \\(u \circ v\\) of each cone.
    pub fn apply(&self, u: &DistMultiVec<L>, v: &DistMultiVec<L>) -> Result<DistMultiVec<L>, DistError>
    {
        check_same(u, v)?;

        let mut w = DistMultiVec::from_existing(u);
        for r in 0.. u.local_height() {
            let (u_r, v_r) = (row(u, r), row(v, r));
            w[(r, 0)] = L::dot(&u_r, &v_r);
            for c in 1.. u.width() {
                w[(r, c)] = u_r[0] * v_r[c] + v_r[0] * u_r[c];
            }
        }
        Ok(w)
    }

    /// Jordan division \\(u \backslash v\\) of each cone, i.e. \\(x\\) such that \\(u \circ x = v\\).
    ///
    /// `u` shall be in the interior.
    pub fn apply_inverse(&self, u: &DistMultiVec<L>, v: &DistMultiVec<L>) -> Result<DistMultiVec<L>, DistError>
    {
        check_same(u, v)?;

        let mut w = DistMultiVec::from_existing(u);
        for r in 0.. u.local_height() {
            let (u_r, v_r) = (row(u, r), row(v, r));
            let det = jdot(&u_r, &u_r);
            let x0 = jdot(&u_r, &v_r) / det;
            w[(r, 0)] = x0;
            for c in 1.. u.width() {
                w[(r, c)] = (v_r[c] - x0 * u_r[c]) / u_r[0];
            }
        }
        Ok(w)
    }

    /// Largest \\(\alpha \ge 0\\) keeping \\(u + \alpha d\\) in every cone, infinite if unbounded; collective.
    ///
    /// `u` shall be in the interior.
    pub fn max_step(&self, u: &DistMultiVec<L>, d: &DistMultiVec<L>) -> Result<L::F, DistError>
    {
        check_same(u, d)?;

        let mut alpha = L::F::infinity();
        for r in 0.. u.local_height() {
            let (u_r, d_r) = (row(u, r), row(d, r));

            // (u + a d)^T J (u + a d) = c + 2 b a + a a^2
            let a = jdot(&d_r, &d_r);
            let b = jdot(&u_r, &d_r);
            let c = jdot(&u_r, &u_r);
            let disc = b * b - a * c;

            if a < L::F::zero() || (b < L::F::zero() && disc >= L::F::zero()) {
                let step = c.max(L::F::zero()) / (disc.max(L::F::zero()).sqrt() - b);
                alpha = alpha.min(step);
            }
        }

        u.comm().allreduce(alpha, |a, b| a.min(b))
    }

    /// Largest \\(\\|\bar u\\| - u_0\\) over every cone, \\(-\infty\\) for no cones; collective.
    ///
    /// `u` is in the interior of the product cone if and only if the returned value is negative.
    pub fn max_violation(&self, u: &DistMultiVec<L>) -> Result<L::F, DistError>
    {
        let mut v = L::F::neg_infinity();
        for r in 0.. u.local_height() {
            let u_r = row(u, r);
            v = v.max(L::norm(&u_r[1..]) - u_r[0]);
        }

        u.comm().allreduce(v, |a, b| a.max(b))
    }

    /// Nesterov-Todd scaling of each cone of a pair of interior points.
    pub fn nt_scaling(&self, s: &DistMultiVec<L>, y: &DistMultiVec<L>) -> Result<NtScaling<L>, DistError>
    {
        check_same(s, y)?;

        let f1 = L::F::one();
        let f2 = f1 + f1;
        let f4 = f2 + f2;

        let mut v = DistMultiVec::from_existing(s);
        let mut beta = Vec::with_capacity(s.local_height());
        for r in 0.. s.local_height() {
            let (s_r, y_r) = (row(s, r), row(y, r));
            let s_det = jdot(&s_r, &s_r);
            let y_det = jdot(&y_r, &y_r);
            if !(s_det > L::F::zero() && y_det > L::F::zero()) {
                log::error!("row {}: not interior for scaling", s.global_row(r)?);
                return Err(DistError::NumericalFailure);
            }

            let s_bar: Vec<_> = s_r.iter().map(|x| *x / s_det.sqrt()).collect();
            let y_bar: Vec<_> = y_r.iter().map(|x| *x / y_det.sqrt()).collect();
            let gamma = ((f1 + L::dot(&s_bar, &y_bar)) / f2).sqrt();

            // w = (s_bar + J y_bar) / (2 gamma), then v = (w + e) / sqrt(2 (w_0 + 1))
            let mut w = s_bar;
            w[0] = w[0] + y_bar[0];
            for c in 1.. w.len() {
                w[c] = w[c] - y_bar[c];
            }
            L::scale((f2 * gamma).recip(), &mut w);
            w[0] = w[0] + f1;
            L::scale((f2 * w[0]).sqrt().recip(), &mut w);

            set_row(&mut v, r, &w);
            beta.push((s_det / y_det).powf(f4.recip()));
        }

        Ok(NtScaling {
            v,
            beta,
        })
    }
}

//

/// Nesterov-Todd scaling
///
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
///
/// Symmetric \\(W = \beta (2 v v^T - J)\\) of each cone with \\(J = {\bf diag}(1, -1, \ldots, -1)\\),
/// which satisfies \\(W y = W^{-1} s = \lambda\\) for the pair \\((s, y)\\) it was computed from.
pub struct NtScaling<L: LinAlg>
{
    v: DistMultiVec<L>,
    beta: Vec<L::F>,
}

impl<L: LinAlg> NtScaling<L>
{
    fn check(&self, x: &DistMultiVec<L>) -> Result<(), DistError>
    {
        check_same(&self.v, x)
    }

    /// Calculates \\(W x\\).
    pub fn apply(&self, x: &DistMultiVec<L>) -> Result<DistMultiVec<L>, DistError>
    {
        self.check(x)?;

        let f2 = L::F::one() + L::F::one();
        let mut w = DistMultiVec::from_existing(x);
        for r in 0.. x.local_height() {
            let (v_r, mut x_r) = (row(&self.v, r), row(x, r));
            let vx = L::dot(&v_r, &x_r);
            // -J x
            x_r[0] = -x_r[0];
            L::add(f2 * vx, &v_r, &mut x_r);
            L::scale(self.beta[r], &mut x_r);
            set_row(&mut w, r, &x_r);
        }
        Ok(w)
    }

    /// Calculates \\(W^{-1} x = \beta^{-1} (2 J v v^T J - J) x\\).
    pub fn apply_inverse(&self, x: &DistMultiVec<L>) -> Result<DistMultiVec<L>, DistError>
    {
        self.check(x)?;

        let f2 = L::F::one() + L::F::one();
        let mut w = DistMultiVec::from_existing(x);
        for r in 0.. x.local_height() {
            let (mut jv, mut x_r) = (row(&self.v, r), row(x, r));
            for c in 1.. jv.len() {
                jv[c] = -jv[c];
            }
            let jvx = L::dot(&jv, &x_r);
            x_r[0] = -x_r[0];
            L::add(f2 * jvx, &jv, &mut x_r);
            L::scale(self.beta[r].recip(), &mut x_r);
            set_row(&mut w, r, &x_r);
        }
        Ok(w)
    }

    /// Dense \\(W^2\\) of the local row `local_row`, row-major.
    pub fn squared_block(&self, local_row: usize) -> Vec<L::F>
    {
        let f2 = L::F::one() + L::F::one();
        let v_r = row(&self.v, local_row);
        let k = v_r.len();
        let beta = self.beta[local_row];

        let w: Vec<_> = (0.. k * k).map(|e| {
            let (i, j) = (e / k, e % k);
            let jd = if i != j {L::F::zero()} else if i == 0 {L::F::one()} else {-L::F::one()};
            beta * (f2 * v_r[i] * v_r[j] - jd)
        }).collect();

        (0.. k * k).map(|e| {
            let (i, j) = (e / k, e % k);
            (0.. k).fold(L::F::zero(), |acc, l| acc + w[i * k + l] * w[l * k + j])
        }).collect()
    }
}

//

#[test]
fn test_cone_soc1()
{
    use float_eq::assert_float_eq;
    use bunsan_core::{FloatGeneric, launch};

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    let rslt = launch(2, |comm| -> Result<(), DistError> {
        let cone = ConeSoc::<La>::new();

        let mut u = DistMultiVec::<La>::with_size(comm, 2, 3)?;
        u.set_by_fn(|r, c| [[3., 1., 2.], [2., 0., -1.]][r][c]);
        let mut v = DistMultiVec::<La>::with_size(comm, 2, 3)?;
        v.set_by_fn(|r, c| [[1., -1., 0.5], [4., 2., 1.]][r][c]);

        let uv = cone.apply(&u, &v)?;
        assert_float_eq!(uv.gather_all()?.as_slice(), [3., 7., -2., 4., 3.5, -2.].as_slice(), abs_all <= 1e-12);

        let x = cone.apply_inverse(&u, &uv)?;
        assert_float_eq!(x.gather_all()?.as_slice(), v.gather_all()?.as_slice(), abs_all <= 1e-12);

        let e = cone.identity(&u);
        let ue = cone.apply(&u, &e)?;
        assert_float_eq!(ue.gather_all()?.as_slice(), u.gather_all()?.as_slice(), abs_all <= 1e-12);

        // max of ||(1, 2)|| - 3 and ||(0, -1)|| - 2
        assert_float_eq!(cone.max_violation(&u)?, 5_f64.sqrt() - 3., abs <= 1e-12);
        Ok(())
    }).unwrap();

    for r in rslt {
        r.unwrap();
    }
}

#[test]
fn test_cone_soc2()
{
    use float_eq::assert_float_eq;
    use bunsan_core::{FloatGeneric, launch};

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    let rslt = launch(1, |comm| -> Result<(), DistError> {
        let cone = ConeSoc::<La>::new();

        let mut u = DistMultiVec::<La>::with_size(comm, 1, 3)?;
        u.set_by_fn(|_, c| [2., 1., 0.][c]);
        let mut d = DistMultiVec::<La>::with_size(comm, 1, 3)?;

        // toward the boundary along -e: (2 - a)^2 = 1
        d.set_by_fn(|_, c| [-1., 0., 0.][c]);
        assert_float_eq!(cone.max_step(&u, &d)?, 1., abs <= 1e-12);

        // inside the cone: unbounded
        d.set_by_fn(|_, c| [1., 0.5, 0.][c]);
        assert!(cone.max_step(&u, &d)?.is_infinite());

        // crossing along x_2: 4 = 1 + a^2
        d.set_by_fn(|_, c| [0., 0., 1.][c]);
        assert_float_eq!(cone.max_step(&u, &d)?, 3_f64.sqrt(), abs <= 1e-12);

        // -cone direction: stops at the apex side
        d.set_by_fn(|_, c| [-2., -1., 0.][c]);
        assert_float_eq!(cone.max_step(&u, &d)?, 1., abs <= 1e-12);
        Ok(())
    }).unwrap();

    for r in rslt {
        r.unwrap();
    }
}

#[test]
fn test_cone_soc3()
{
    use float_eq::assert_float_eq;
    use bunsan_core::{FloatGeneric, launch};

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    let rslt = launch(2, |comm| -> Result<(), DistError> {
        let cone = ConeSoc::<La>::new();

        let mut s = DistMultiVec::<La>::with_size(comm, 3, 3)?;
        s.set_by_fn(|r, c| [[3., 1., 2.], [2., 0., -1.], [1., 0., 0.]][r][c]);
        let mut y = DistMultiVec::<La>::with_size(comm, 3, 3)?;
        y.set_by_fn(|r, c| [[1., -0.5, 0.5], [5., 2., 1.], [1., 0., 0.]][r][c]);

        let nt = cone.nt_scaling(&s, &y)?;
        let wy = nt.apply(&y)?;
        let winv_s = nt.apply_inverse(&s)?;
        assert_float_eq!(wy.gather_all()?.as_slice(), winv_s.gather_all()?.as_slice(), abs_all <= 1e-12);

        let x = nt.apply_inverse(&nt.apply(&s)?)?;
        assert_float_eq!(x.gather_all()?.as_slice(), s.gather_all()?.as_slice(), abs_all <= 1e-12);

        // W^2 y = s
        for r in 0.. s.local_height() {
            let w2 = nt.squared_block(r);
            for i in 0.. 3 {
                let w2y = (0.. 3).fold(0., |acc, j| acc + w2[i * 3 + j] * y[(r, j)]);
                assert_float_eq!(w2y, s[(r, i)], abs <= 1e-12);
            }
        }

        // identical pair scales by the identity
        if s.first_local_row() + s.local_height() == 3 {
            let r = s.local_height() - 1;
            assert_float_eq!(nt.squared_block(r).as_slice(), [1., 0., 0., 0., 1., 0., 0., 0., 1.].as_slice(), abs_all <= 1e-12);
        }
        Ok(())
    }).unwrap();

    for r in rslt {
        r.unwrap();
    }
}
