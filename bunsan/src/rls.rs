//! Regularized least squares

use num_traits::{Float, NumCast, Zero, One};
use bunsan_core::{LinAlg, Comm, DistError, DistMultiVec, DistSparseMatrix, Timer, Orientation};
use bunsan_core::{multiply, nrm2, dot, axpy, scale};
use crate::ctrl::{SocpAffineCtrl, MehrotraCtrl};
use crate::cone_soc::{ConeSoc, NtScaling};
use crate::dist_qsd::{KktLayout, KktSegment, DistQsd};

/// Termination status of [`rls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus
{
    /// Residuals and gap are within the tolerance.
    Converged,
    /// The iteration budget ran out; the best iterate seen is returned.
    MaxIterExceeded,
}

/// Result of [`rls`].
pub struct RlsSolution<L: LinAlg>
{
    /// Solution \\(x\\), `width(A) x 1`.
    pub x: DistMultiVec<L>,
    pub status: SolveStatus,
    /// Number of interior-point iterations taken.
    pub iterations: usize,
    /// Primal objective \\(\\|A x - b\\|_2^2 + \rho \\|x\\|_2^2\\) as bounded by the epigraph variables.
    pub primal_obj: L::F,
    /// Dual objective, a lower bound of the optimal value.
    pub dual_obj: L::F,
    /// \\(\\|A x - b\\|_2\\) of the returned \\(x\\).
    pub residual_norm: L::F,
}

impl<L: LinAlg> RlsSolution<L>
{
    /// Returns `Ok` with \\(x\\) only if converged, otherwise `Err` with [`DistError::MaxIterExceeded`].
    pub fn into_converged(self) -> Result<DistMultiVec<L>, DistError>
    {
        match self.status {
            SolveStatus::Converged => Ok(self.x),
            SolveStatus::MaxIterExceeded => Err(DistError::MaxIterExceeded),
        }
    }
}

//

fn hypot_all<F: Float>(norms: &[F]) -> F
{
    norms.iter().fold(F::zero(), |acc, n| acc.hypot(*n))
}

/// Primal variable \\(z = (u, v, x)\\).
#[derive(Clone)]
struct Primal<L: LinAlg>
{
    u: DistMultiVec<L>,
    v: DistMultiVec<L>,
    x: DistMultiVec<L>,
}

impl<L: LinAlg> Primal<L>
{
    fn zeros(comm: &Comm, m: usize, n: usize) -> Result<Self, DistError>
    {
        Ok(Primal {
            u: DistMultiVec::with_size(comm, m, 1)?,
            v: DistMultiVec::with_size(comm, n, 1)?,
            x: DistMultiVec::with_size(comm, n, 1)?,
        })
    }

    fn axpy(&mut self, alpha: L::F, o: &Self) -> Result<(), DistError>
    {
        axpy(alpha, &o.u, &mut self.u)?;
        axpy(alpha, &o.v, &mut self.v)?;
        axpy(alpha, &o.x, &mut self.x)
    }

    fn scale(&mut self, alpha: L::F)
    {
        scale(alpha, &mut self.u);
        scale(alpha, &mut self.v);
        scale(alpha, &mut self.x);
    }

    fn dot(&self, o: &Self) -> Result<L::F, DistError>
    {
        Ok(dot(&self.u, &o.u)? + dot(&self.v, &o.v)? + dot(&self.x, &o.x)?)
    }

    fn nrm2(&self) -> Result<L::F, DistError>
    {
        Ok(hypot_all(&[nrm2(&self.u)?, nrm2(&self.v)?, nrm2(&self.x)?]))
    }
}

/// Member of the product cone: `m` row cones and `n` regularization cones, each \\(\mathcal{Q}^3\\).
#[derive(Clone)]
struct Cones<L: LinAlg>
{
    row: DistMultiVec<L>,
    reg: DistMultiVec<L>,
}

impl<L: LinAlg> Cones<L>
{
    fn zeros(comm: &Comm, m: usize, n: usize) -> Result<Self, DistError>
    {
        Ok(Cones {
            row: DistMultiVec::with_size(comm, m, 3)?,
            reg: DistMultiVec::with_size(comm, n, 3)?,
        })
    }

    fn map<M>(&self, o: &Self, f: M) -> Result<Self, DistError>
    where M: Fn(&DistMultiVec<L>, &DistMultiVec<L>) -> Result<DistMultiVec<L>, DistError>
    {
        Ok(Cones {
            row: f(&self.row, &o.row)?,
            reg: f(&self.reg, &o.reg)?,
        })
    }

    fn axpy(&mut self, alpha: L::F, o: &Self) -> Result<(), DistError>
    {
        axpy(alpha, &o.row, &mut self.row)?;
        axpy(alpha, &o.reg, &mut self.reg)
    }

    fn scale(&mut self, alpha: L::F)
    {
        scale(alpha, &mut self.row);
        scale(alpha, &mut self.reg);
    }

    fn dot(&self, o: &Self) -> Result<L::F, DistError>
    {
        Ok(dot(&self.row, &o.row)? + dot(&self.reg, &o.reg)?)
    }

    fn nrm2(&self) -> Result<L::F, DistError>
    {
        Ok(hypot_all(&[nrm2(&self.row)?, nrm2(&self.reg)?]))
    }

    fn add_identity(&mut self, cone: &ConeSoc<L>, alpha: L::F)
    {
        cone.add_identity(alpha, &mut self.row);
        cone.add_identity(alpha, &mut self.reg);
    }

    fn max_step(&self, cone: &ConeSoc<L>, d: &Self) -> Result<L::F, DistError>
    {
        Ok(cone.max_step(&self.row, &d.row)?.min(cone.max_step(&self.reg, &d.reg)?))
    }

    fn max_violation(&self, cone: &ConeSoc<L>) -> Result<L::F, DistError>
    {
        Ok(cone.max_violation(&self.row)?.max(cone.max_violation(&self.reg)?))
    }
}

struct Scaling<L: LinAlg>
{
    row: NtScaling<L>,
    reg: NtScaling<L>,
}

impl<L: LinAlg> Scaling<L>
{
    fn apply(&self, x: &Cones<L>) -> Result<Cones<L>, DistError>
    {
        Ok(Cones {
            row: self.row.apply(&x.row)?,
            reg: self.reg.apply(&x.reg)?,
        })
    }

    fn apply_inverse(&self, x: &Cones<L>) -> Result<Cones<L>, DistError>
    {
        Ok(Cones {
            row: self.row.apply_inverse(&x.row)?,
            reg: self.reg.apply_inverse(&x.reg)?,
        })
    }
}

#[derive(Clone)]
struct Iterate<L: LinAlg>
{
    z: Primal<L>,
    s: Cones<L>,
    y: Cones<L>,
}

//

const SEG_ROW: usize = 0;
const SEG_REG: usize = 1;
const SEG_U: usize = 2;
const SEG_V: usize = 3;
const SEG_X: usize = 4;

/// Second-order cone program of the regularized least squares
///
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
///
/// \\[
/// \begin{array}{ll}
/// {\rm minimize} & c^T z \\\\
/// {\rm subject \ to} & G z + s = h, \ s \in \mathcal{K}
/// \end{array}
/// \\]
/// with \\(z = (u, v, x)\\), \\(c = (1, \rho 1, 0)\\), and \\(h - G z\\) stacking
/// \\(((1 + u_i) / 2, (u_i - 1) / 2, (A x - b)_i)\\) and \\(((1 + v_j) / 2, (v_j - 1) / 2, x_j)\\),
/// so that each cone constraint reads \\(u_i \ge (A x - b)_i^2\\) or \\(v_j \ge x_j^2\\).
struct RlsSocp<'a, L: LinAlg>
{
    comm: &'a Comm,
    a: &'a DistSparseMatrix<L>,
    b: &'a DistMultiVec<L>,
    rho: L::F,
    m: usize,
    n: usize,
    cone: ConeSoc<L>,
    layout: KktLayout,
}

impl<'a, L: LinAlg> RlsSocp<'a, L>
{
    fn new(a: &'a DistSparseMatrix<L>, b: &'a DistMultiVec<L>, rho: L::F) -> Self
    {
        let (m, n) = (a.height(), a.width());

        let layout = KktLayout::new(&[
            KktSegment {height: m, comps: 3, positive: false},
            KktSegment {height: n, comps: 3, positive: false},
            KktSegment {height: m, comps: 1, positive: true},
            KktSegment {height: n, comps: 1, positive: true},
            KktSegment {height: n, comps: 1, positive: true},
        ]);

        RlsSocp {
            comm: a.comm(),
            a, b, rho, m, n,
            cone: ConeSoc::new(),
            layout,
        }
    }

    fn half() -> L::F
    {
        (L::F::one() + L::F::one()).recip()
    }

    fn c(&self) -> Result<Primal<L>, DistError>
    {
        let mut c = Primal::zeros(self.comm, self.m, self.n)?;
        c.u.fill(L::F::one());
        c.v.fill(self.rho);
        Ok(c)
    }

    fn h(&self) -> Result<Cones<L>, DistError>
    {
        let half = Self::half();
        let mut h = Cones::zeros(self.comm, self.m, self.n)?;
        for r in 0.. h.row.local_height() {
            h.row[(r, 0)] = half;
            h.row[(r, 1)] = -half;
            h.row[(r, 2)] = -self.b[(r, 0)];
        }
        for r in 0.. h.reg.local_height() {
            h.reg[(r, 0)] = half;
            h.reg[(r, 1)] = -half;
        }
        Ok(h)
    }

    /// \\(G z\\)
    fn g(&self, z: &Primal<L>) -> Result<Cones<L>, DistError>
    {
        let half = Self::half();

        let mut ax = DistMultiVec::with_size(self.comm, self.m, 1)?;
        multiply(Orientation::Normal, L::F::one(), self.a, &z.x, L::F::zero(), &mut ax)?;

        let mut g = Cones::zeros(self.comm, self.m, self.n)?;
        for r in 0.. g.row.local_height() {
            g.row[(r, 0)] = -half * z.u[(r, 0)];
            g.row[(r, 1)] = -half * z.u[(r, 0)];
            g.row[(r, 2)] = -ax[(r, 0)];
        }
        for r in 0.. g.reg.local_height() {
            g.reg[(r, 0)] = -half * z.v[(r, 0)];
            g.reg[(r, 1)] = -half * z.v[(r, 0)];
            g.reg[(r, 2)] = -z.x[(r, 0)];
        }
        Ok(g)
    }

    /// \\(G^T y\\)
    fn gt(&self, y: &Cones<L>) -> Result<Primal<L>, DistError>
    {
        let half = Self::half();

        let mut p = Primal::zeros(self.comm, self.m, self.n)?;
        for r in 0.. p.u.local_height() {
            p.u[(r, 0)] = -half * (y.row[(r, 0)] + y.row[(r, 1)]);
        }
        for r in 0.. p.v.local_height() {
            p.v[(r, 0)] = -half * (y.reg[(r, 0)] + y.reg[(r, 1)]);
            p.x[(r, 0)] = -y.reg[(r, 2)];
        }

        let y_2 = y.row.column(2)?;
        multiply(Orientation::Transpose, -L::F::one(), self.a, &y_2, L::F::one(), &mut p.x)?;
        Ok(p)
    }

    /// Factors \\(\left[ \begin{array}{cc} -W^2 & G \\\\ G^T & 0 \end{array} \right]\\),
    /// with \\(W = I\\) if `w` is `None`.
    fn kkt(&self, w: Option<&Scaling<L>>, ctrl: &MehrotraCtrl<L::F>) -> Result<DistQsd<L>, DistError>
    {
        let half = Self::half();
        let l = &self.layout;
        let identity: Vec<_> = (0.. 9).map(|e| if e % 4 == 0 {L::F::one()} else {L::F::zero()}).collect();

        let mut triples = Vec::with_capacity(self.a.num_local_entries() + 9 * (self.m + self.n));

        let mut push_cone = |seg: usize, i: usize, w2: &[L::F]| {
            for c1 in 0.. 3 {
                for c2 in c1.. 3 {
                    triples.push((l.index(seg, i, c1), l.index(seg, i, c2), -w2[c1 * 3 + c2]));
                }
            }
        };

        let row_height = self.a.local_height();
        let reg_blocks = DistMultiVec::<L>::with_size(self.comm, self.n, 1)?;

        for r in 0.. row_height {
            let i = self.a.global_row(r)?;
            match w {
                Some(w) => push_cone(SEG_ROW, i, &w.row.squared_block(r)),
                None => push_cone(SEG_ROW, i, &identity),
            }
        }
        for r in 0.. reg_blocks.local_height() {
            let j = reg_blocks.global_row(r)?;
            match w {
                Some(w) => push_cone(SEG_REG, j, &w.reg.squared_block(r)),
                None => push_cone(SEG_REG, j, &identity),
            }
        }

        for r in 0.. row_height {
            let i = self.a.global_row(r)?;
            triples.push((l.index(SEG_ROW, i, 0), l.index(SEG_U, i, 0), -half));
            triples.push((l.index(SEG_ROW, i, 1), l.index(SEG_U, i, 0), -half));

            let (cols, vals) = self.a.row(r)?;
            for (j, v) in cols.iter().zip(vals) {
                triples.push((l.index(SEG_ROW, i, 2), l.index(SEG_X, *j, 0), -*v));
            }
        }
        for r in 0.. reg_blocks.local_height() {
            let j = reg_blocks.global_row(r)?;
            triples.push((l.index(SEG_REG, j, 0), l.index(SEG_V, j, 0), -half));
            triples.push((l.index(SEG_REG, j, 1), l.index(SEG_V, j, 0), -half));
            triples.push((l.index(SEG_REG, j, 2), l.index(SEG_X, j, 0), -L::F::one()));
        }

        DistQsd::new(self.comm, self.layout.clone(), triples, &ctrl.qsd)
    }

    /// Solves \\(G^T \Delta y = r_z,\ G \Delta z - W^2 \Delta y = r_y\\) with the factored system.
    fn newton(&self, qsd: &DistQsd<L>, r_z: &Primal<L>, r_y: &Cones<L>) -> Result<(Primal<L>, Cones<L>), DistError>
    {
        let sol = qsd.solve(&[&r_y.row, &r_y.reg, &r_z.u, &r_z.v, &r_z.x])?;
        let [row, reg, u, v, x]: [DistMultiVec<L>; 5] = sol.try_into().map_err(|_| DistError::DimensionMismatch)?;

        Ok((Primal {u, v, x}, Cones {row, reg}))
    }

    /// Scaling of `(s, y)`, failing on every process if it fails on any.
    fn scaling(&self, s: &Cones<L>, y: &Cones<L>) -> Result<Scaling<L>, DistError>
    {
        let row = self.cone.nt_scaling(&s.row, &y.row);
        let reg = self.cone.nt_scaling(&s.reg, &y.reg);

        let ok = self.comm.allreduce(row.is_ok() && reg.is_ok(), |a, b| a && b)?;
        match (ok, row, reg) {
            (true, Ok(row), Ok(reg)) => Ok(Scaling {row, reg}),
            _ => Err(DistError::NumericalFailure),
        }
    }

    fn initial(&self, c: &Primal<L>, h: &Cones<L>, ctrl: &MehrotraCtrl<L::F>) -> Result<Iterate<L>, DistError>
    {
        let qsd = self.kkt(None, ctrl)?;

        // primal: minimize ||s||^2 / 2 subject to G z + s = h
        let zero_z = Primal::zeros(self.comm, self.m, self.n)?;
        let (z, _) = self.newton(&qsd, &zero_z, h)?;
        let mut s = h.clone();
        s.axpy(-L::F::one(), &self.g(&z)?)?;

        // dual: minimize ||y||^2 / 2 subject to G^T y + c = 0
        let mut neg_c = c.clone();
        neg_c.scale(-L::F::one());
        let zero_y = Cones::zeros(self.comm, self.m, self.n)?;
        let (_, mut y) = self.newton(&qsd, &neg_c, &zero_y)?;

        let thr = ctrl.tolerance;
        let alpha_p = s.max_violation(&self.cone)?;
        if alpha_p >= -thr * s.nrm2()?.max(L::F::one()) {
            s.add_identity(&self.cone, L::F::one() + alpha_p);
        }
        let alpha_d = y.max_violation(&self.cone)?;
        if alpha_d >= -thr * y.nrm2()?.max(L::F::one()) {
            y.add_identity(&self.cone, L::F::one() + alpha_d);
        }

        Ok(Iterate {z, s, y})
    }

    /// One predictor-corrector step.
    ///
    /// Returns `Ok` with the step length taken.
    fn step(&self, it: &mut Iterate<L>, r_p: &Cones<L>, r_d: &Primal<L>, ctrl: &MehrotraCtrl<L::F>) -> Result<L::F, DistError>
    {
        let f0 = L::F::zero();
        let f1 = L::F::one();
        let cone = &self.cone;
        let nu = <L::F as NumCast>::from(self.m + self.n).unwrap_or_else(L::F::one);

        let w = self.scaling(&it.s, &it.y)?;
        let lambda = w.apply(&it.y)?;
        let qsd = self.kkt(Some(&w), ctrl)?;

        let sy = it.s.dot(&it.y)?;
        let mu = sy / nu;

        let mut r_z = r_d.clone();
        r_z.scale(-f1);

        // affine scaling direction: W q = -s
        let mut r_y = r_p.clone();
        r_y.scale(-f1);
        r_y.axpy(f1, &it.s)?;
        let (_, dy_a) = self.newton(&qsd, &r_z, &r_y)?;
        let mut ds_a = w.apply(&w.apply(&dy_a)?)?;
        ds_a.scale(-f1);
        ds_a.axpy(-f1, &it.s)?;

        let alpha_a = f1.min(it.s.max_step(cone, &ds_a)?).min(it.y.max_step(cone, &dy_a)?);

        let mut s_a = it.s.clone();
        s_a.axpy(alpha_a, &ds_a)?;
        let mut y_a = it.y.clone();
        y_a.axpy(alpha_a, &dy_a)?;
        let sigma = (s_a.dot(&y_a)? / sy).powi(3).max(f0).min(f1);

        // combined direction
        let mut d_s = lambda.map(&lambda, |u, v| cone.apply(u, v))?;
        let corr = w.apply_inverse(&ds_a)?.map(&w.apply(&dy_a)?, |u, v| cone.apply(u, v))?;
        d_s.axpy(f1, &corr)?;
        d_s.scale(-f1);
        d_s.add_identity(cone, sigma * mu);

        let q = lambda.map(&d_s, |u, v| cone.apply_inverse(u, v))?;
        let wq = w.apply(&q)?;

        let mut r_y = r_p.clone();
        r_y.scale(-f1);
        r_y.axpy(-f1, &wq)?;
        let (dz, dy) = self.newton(&qsd, &r_z, &r_y)?;
        let mut ds = w.apply(&w.apply(&dy)?)?;
        ds.scale(-f1);
        ds.axpy(f1, &wq)?;

        let alpha_max = it.s.max_step(cone, &ds)?.min(it.y.max_step(cone, &dy)?);
        let alpha = f1.min(ctrl.step_ratio * alpha_max);

        log::trace!("sigma {:.2e}, alpha_aff {:.2e}, alpha {:.2e}", sigma, alpha_a, alpha);

        it.z.axpy(alpha, &dz)?;
        it.s.axpy(alpha, &ds)?;
        it.y.axpy(alpha, &dy)?;

        Ok(alpha)
    }
}

//

struct Criteria<F>
{
    pres: F,
    dres: F,
    gap: F,
    pobj: F,
    dobj: F,
}

impl<F: Float> Criteria<F>
{
    fn error(&self) -> F
    {
        let obj_gap = (self.pobj - self.dobj).abs() / (F::one() + self.pobj.abs());
        // NaN propagates
        [self.pres, self.dres, self.gap, obj_gap].iter().fold(F::zero(), |acc, e| {
            if acc.is_nan() || e.is_nan() {F::nan()} else {acc.max(*e)}
        })
    }
}

/// Regularized (Tikhonov) least squares of a distributed sparse system.
///
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
///
/// Solves
/// \\[
/// \begin{array}{ll}
/// {\rm minimize} & \\|A x - b\\|_2^2 + \rho \\|x\\|_2^2
/// \end{array}
/// \\]
/// as a second-order cone program, by the Mehrotra predictor-corrector primal-dual interior-point method
/// with Nesterov-Todd scaling.
/// Each Newton direction comes from a regularized quasi-semidefinite KKT system
/// solved with iterative refinement.
/// The iteration terminates when the relative primal residual, the relative dual residual
/// and the relative gaps all fall within `ctrl.mehrotra.tolerance`.
///
/// This call is collective: every process of the group shall call it.
///
/// Returns `Ok` with [`RlsSolution`]:
/// its status is [`SolveStatus::MaxIterExceeded`] with the best iterate when `ctrl.mehrotra.max_iter` runs out.
/// Returns `Err` with
/// * [`DistError::InvalidParameter`] unless \\(\rho > 0\\),
/// * [`DistError::DimensionMismatch`] unless `b` is `height(A) x 1`,
/// * [`DistError::NumericalFailure`] when the iteration stalls (singular or non-finite system, vanishing step)
///   before reaching `ctrl.mehrotra.min_tolerance`.
pub fn rls<L: LinAlg>(a: &DistSparseMatrix<L>, b: &DistMultiVec<L>, rho: L::F, ctrl: &SocpAffineCtrl<L::F>) -> Result<RlsSolution<L>, DistError>
{
    let comm = a.comm();
    let ctrl = &ctrl.mehrotra;
    let verbose = ctrl.progress && comm.rank() == 0;

    if b.height() != a.height() || b.width() != 1 || b.comm().size() != comm.size() {
        log::error!("Size mismatch: A({}, {}), b({}, {})", a.height(), a.width(), b.height(), b.width());
        return Err(DistError::DimensionMismatch);
    }
    if !(rho > L::F::zero() && rho.is_finite()) {
        log::error!("rho must be positive: {:?}", rho);
        return Err(DistError::InvalidParameter);
    }
    if !a.is_consistent() {
        log::warn!("rank {}: {} queued updates not committed, ignored", comm.rank(), a.num_queued());
    }

    let mut timer = Timer::new("rls");
    timer.start();

    if verbose {
        log::info!("----- Initializing");
        log::debug!("{:?}", ctrl);
    }

    let prob = RlsSocp::new(a, b, rho);
    let c = prob.c()?;
    let h = prob.h()?;
    let norm_c = c.nrm2()?;
    let norm_h = h.nrm2()?;

    let mut it = prob.initial(&c, &h, ctrl)?;
    let mut best: Option<(L::F, Criteria<L::F>, Iterate<L>)> = None;

    if verbose {
        log::info!("----- Started");
    }

    let mut i = 0;
    let status = loop {
        let mut r_p = prob.g(&it.z)?;
        r_p.axpy(L::F::one(), &it.s)?;
        r_p.axpy(-L::F::one(), &h)?;

        let mut r_d = prob.gt(&it.y)?;
        r_d.axpy(L::F::one(), &c)?;

        let pobj = c.dot(&it.z)?;
        let crit = Criteria {
            pres: r_p.nrm2()? / (L::F::one() + norm_h),
            dres: r_d.nrm2()? / (L::F::one() + norm_c),
            gap: it.s.dot(&it.y)? / (L::F::one() + pobj.abs()),
            pobj,
            dobj: -h.dot(&it.y)?,
        };
        let err = crit.error();

        if verbose {
            log::info!("{}: pres dres gap {:.2e} {:.2e} {:.2e}, obj {:.3e} {:.3e}", i, crit.pres, crit.dres, crit.gap, crit.pobj, crit.dobj);
        }
        else {
            log::trace!("{}: pres dres gap {:.2e} {:.2e} {:.2e}", i, crit.pres, crit.dres, crit.gap);
        }

        let improved = match &best {
            Some((e, _, _)) => err < *e,
            None => err.is_finite(),
        };
        if improved {
            best = Some((err, crit, it.clone()));
        }

        if err <= ctrl.tolerance {
            if verbose {
                log::info!("----- Converged");
            }
            break Ok(SolveStatus::Converged);
        }
        if i >= ctrl.max_iter {
            if comm.rank() == 0 {
                log::warn!("----- ExcessIter");
            }
            break Ok(SolveStatus::MaxIterExceeded);
        }

        let stalled = if err.is_finite() {
            match prob.step(&mut it, &r_p, &r_d, ctrl) {
                Ok(alpha) => !(alpha > L::F::epsilon()),
                Err(DistError::NumericalFailure) => true,
                Err(e) => return Err(e),
            }
        }
        else {
            true
        };

        if stalled {
            match &best {
                Some((e, _, _)) if *e <= ctrl.min_tolerance => {
                    if comm.rank() == 0 {
                        log::warn!("----- Stalled: accepted at {:.2e}", e);
                    }
                    break Ok(SolveStatus::Converged);
                },
                _ => {
                    if comm.rank() == 0 {
                        log::error!("----- Stalled");
                    }
                    break Err(DistError::NumericalFailure);
                },
            }
        }

        i += 1;
    }?;

    // best iterate seen, within the tolerance when converged
    let (_, crit, it) = match best {
        Some(b) => b,
        None => {
            log::error!("no finite iterate");
            return Err(DistError::NumericalFailure);
        },
    };

    let mut e = b.clone();
    multiply(Orientation::Normal, -L::F::one(), a, &it.z.x, L::F::one(), &mut e)?;
    let residual_norm = nrm2(&e)?;

    let sec = timer.stop();
    if ctrl.time && comm.rank() == 0 {
        log::info!("rls of {}x{} in {} iterations, {:.3e} s", a.height(), a.width(), i, sec);
    }

    Ok(RlsSolution {
        x: it.z.x,
        status,
        iterations: i,
        primal_obj: crit.pobj,
        dual_obj: crit.dobj,
        residual_norm,
    })
}

//

#[cfg(test)]
fn test_problem(comm: &Comm) -> Result<(DistSparseMatrix<bunsan_core::FloatGeneric<f64>>, DistMultiVec<bunsan_core::FloatGeneric<f64>>), DistError>
{
    // columns are orthogonal: A^T A = 3 I, A^T b = (8, 1)
    let a_dense = [[1., 0.], [0., 1.], [1., 1.], [1., -1.]];

    let mut a = DistSparseMatrix::with_size(comm, 4, 2)?;
    for r in 0.. a.local_height() {
        let i = a.global_row(r)?;
        for j in 0.. 2 {
            if a_dense[i][j] != 0. {
                a.queue_local_update(r, j, a_dense[i][j])?;
            }
        }
    }
    a.process_queues();

    let mut b = DistMultiVec::with_size(comm, 4, 1)?;
    b.set_by_fn(|i, _| (i + 1) as f64);

    Ok((a, b))
}

#[test]
fn test_rls1()
{
    use float_eq::assert_float_eq;
    use bunsan_core::launch;

    let _ = env_logger::builder().is_test(true).try_init();

    for np in 1..= 3 {
        let rslt = launch(np, |comm| -> Result<(Vec<f64>, f64, f64), DistError> {
            let (a, b) = test_problem(comm)?;

            // (A^T A + rho I) x = A^T b
            let sol = rls(&a, &b, 1., &SocpAffineCtrl::new())?;
            assert_eq!(sol.status, SolveStatus::Converged);
            assert!(sol.iterations > 0);

            Ok((sol.x.gather_all()?, sol.primal_obj, sol.residual_norm))
        }).unwrap();

        for r in rslt {
            let (x, pobj, res) = r.unwrap();
            assert_float_eq!(x.as_slice(), [2., 0.25].as_slice(), abs_all <= 1e-4);

            // ||A x - b||^2 + ||x||^2
            let r2 = 1. + 3.0625 + 0.5625 + 5.0625;
            assert_float_eq!(res, r2.sqrt(), abs <= 1e-4);
            assert_float_eq!(pobj, r2 + 4.0625, abs <= 1e-4);
        }
    }
}

#[test]
fn test_rls2()
{
    use bunsan_core::{FloatGeneric, launch};

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    let rslt = launch(2, |comm| -> Result<(), DistError> {
        let (a, b) = test_problem(comm)?;

        let ctrl = SocpAffineCtrl::new().par(|p| p.mehrotra.max_iter = 1);
        let sol = rls(&a, &b, 1., &ctrl)?;
        assert_eq!(sol.status, SolveStatus::MaxIterExceeded);
        assert_eq!(sol.iterations, 1);
        assert_eq!(sol.x.height(), 2);
        assert!(sol.residual_norm.is_finite());
        assert_eq!(sol.into_converged().err(), Some(DistError::MaxIterExceeded));

        assert_eq!(rls(&a, &b, 0., &SocpAffineCtrl::new()).err(), Some(DistError::InvalidParameter));
        assert_eq!(rls(&a, &b, -1., &SocpAffineCtrl::new()).err(), Some(DistError::InvalidParameter));

        let b2 = DistMultiVec::<La>::with_size(comm, 4, 2)?;
        assert_eq!(rls(&a, &b2, 1., &SocpAffineCtrl::new()).err(), Some(DistError::DimensionMismatch));
        Ok(())
    }).unwrap();

    for r in rslt {
        r.unwrap();
    }
}

#[test]
fn test_rls3()
{
    use bunsan_core::launch;

    let _ = env_logger::builder().is_test(true).try_init();

    let rslt = launch(2, |comm| -> Result<Option<DistError>, DistError> {
        let (a, mut b) = test_problem(comm)?;
        b.set_by_fn(|i, _| if i == 0 {f64::NAN} else {(i + 1) as f64});

        Ok(rls(&a, &b, 1., &SocpAffineCtrl::new()).err())
    }).unwrap();

    // every process fails alike, none hangs
    for r in rslt {
        assert_eq!(r.unwrap(), Some(DistError::NumericalFailure));
    }
}
