//! Sparse quasi-semidefinite LDLᵀ

use num_traits::{Float, Zero, One};
use bunsan_core::{LinAlg, DistError, SafeProduct};
use crate::ctrl::QsdCtrl;

const NONE: usize = usize::MAX;

/// Sparse \\(LDL^T\\) factorization of a regularized quasi-semidefinite matrix.
///
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
///
/// Factors \\(K + {\bf diag}(r) = L D L^T\\) in the natural ordering by an up-looking elimination
/// over the elimination tree, where \\(K\\) is symmetric and \\(r\\) is a static regularization.
/// When \\(K\\) is quasi-definite (a positive definite block followed by a negative definite block
/// after symmetric permutation) and \\(r\\) follows its signs, no pivoting is needed.
/// The unregularized \\(K\\) is kept for iterative refinement.
pub struct QsdLdl<L: LinAlg>
{
    n: usize,

    // upper triangle of K, compressed sparse columns
    a_ptr: Vec<usize>,
    a_ind: Vec<usize>,
    a_val: Vec<L::F>,
    reg: Vec<L::F>,

    etree: Vec<usize>,

    // strictly lower L, compressed sparse columns
    l_ptr: Vec<usize>,
    l_ind: Vec<usize>,
    l_val: Vec<L::F>,
    d: Vec<L::F>,
    d_inv: Vec<L::F>,
}

impl<L: LinAlg> QsdLdl<L>
{
    /// Assembles and factors an `n x n` symmetric matrix.
    ///
    /// Returns `Err` with [`DistError::NumericalFailure`] on a zero or non-finite pivot.
    /// * `triples` are `(row, col, value)` entries.
    ///   Duplicates are summed, and an entry below the diagonal is taken as its mirror above the diagonal,
    ///   so each off-diagonal pair shall be given once.
    /// * `reg` is the regularization \\(r\\) of length `n`.
    pub fn new(n: usize, triples: &[(usize, usize, L::F)], reg: &[L::F]) -> Result<Self, DistError>
    {
        if reg.len() != n {
            log::error!("Size mismatch: n {}, reg {}", n, reg.len());
            return Err(DistError::DimensionMismatch);
        }

        let (a_ptr, a_ind, a_val) = Self::upper_csc(n, triples)?;

        let mut ldl = QsdLdl {
            n,
            a_ptr, a_ind, a_val,
            reg: reg.to_vec(),
            etree: Vec::new(),
            l_ptr: Vec::new(),
            l_ind: Vec::new(),
            l_val: Vec::new(),
            d: vec![L::F::zero(); n],
            d_inv: vec![L::F::zero(); n],
        };

        ldl.symbolic();
        ldl.numeric()?;

        Ok(ldl)
    }

    fn upper_csc(n: usize, triples: &[(usize, usize, L::F)]) -> Result<(Vec<usize>, Vec<usize>, Vec<L::F>), DistError>
    {
        let mut cnt = vec![0; n + 1];
        for &(r, c, _) in triples {
            if r >= n || c >= n {
                log::error!("entry ({}, {}) out of {}x{}", r, c, n, n);
                return Err(DistError::OutOfBounds);
            }
            cnt[r.max(c) + 1] += 1;
        }
        for j in 0.. n {
            cnt[j + 1] += cnt[j];
        }

        let mut next = cnt.clone();
        let mut ent = vec![(0, L::F::zero()); triples.len()];
        for &(r, c, v) in triples {
            let (i, j) = (r.min(c), r.max(c));
            ent[next[j]] = (i, v);
            next[j] += 1;
        }

        let mut a_ptr = Vec::with_capacity(n + 1);
        let mut a_ind = Vec::with_capacity(triples.len());
        let mut a_val = Vec::with_capacity(triples.len());
        a_ptr.push(0);
        for j in 0.. n {
            let col = &mut ent[cnt[j].. cnt[j + 1]];
            col.sort_by_key(|e| e.0);

            let mut last = NONE;
            for &(i, v) in col.iter() {
                if i == last {
                    let e = a_val.len() - 1;
                    a_val[e] = a_val[e] + v;
                }
                else {
                    a_ind.push(i);
                    a_val.push(v);
                    last = i;
                }
            }
            a_ptr.push(a_ind.len());
        }

        Ok((a_ptr, a_ind, a_val))
    }

    fn symbolic(&mut self)
    {
        let n = self.n;
        let mut work = vec![NONE; n];
        let mut l_nz = vec![0; n];
        self.etree = vec![NONE; n];

        for j in 0.. n {
            work[j] = j;
            for p in self.a_ptr[j].. self.a_ptr[j + 1] {
                let mut i = self.a_ind[p];
                while work[i] != j {
                    if self.etree[i] == NONE {
                        self.etree[i] = j;
                    }
                    l_nz[i] += 1;
                    work[i] = j;
                    i = self.etree[i];
                }
            }
        }

        self.l_ptr = Vec::with_capacity(n + 1);
        self.l_ptr.push(0);
        for i in 0.. n {
            let p = self.l_ptr[i] + l_nz[i];
            self.l_ptr.push(p);
        }

        let l_nnz = self.l_ptr[n];
        self.l_ind = vec![0; l_nnz];
        self.l_val = vec![L::F::zero(); l_nnz];
    }

    fn numeric(&mut self) -> Result<(), DistError>
    {
        let n = self.n;
        let f0 = L::F::zero();

        let mut y_vals = vec![f0; n];
        let mut y_used = vec![false; n];
        let mut y_idx = Vec::with_capacity(n);
        let mut elim = Vec::with_capacity(n);
        let mut l_next: Vec<usize> = self.l_ptr[.. n].to_vec();

        for k in 0.. n {
            let mut d_k = self.reg[k];

            // nonzero pattern of row k of L, in topological order
            y_idx.clear();
            for p in self.a_ptr[k].. self.a_ptr[k + 1] {
                let i = self.a_ind[p];
                if i == k {
                    d_k = d_k + self.a_val[p];
                    continue;
                }

                y_vals[i] = self.a_val[p];
                if !y_used[i] {
                    y_used[i] = true;
                    elim.clear();
                    elim.push(i);

                    let mut e = self.etree[i];
                    while e != NONE && e < k {
                        if y_used[e] {
                            break;
                        }
                        y_used[e] = true;
                        elim.push(e);
                        e = self.etree[e];
                    }
                    while let Some(e) = elim.pop() {
                        y_idx.push(e);
                    }
                }
            }

            for &c in y_idx.iter().rev() {
                let y_c = y_vals[c];
                for p in self.l_ptr[c].. l_next[c] {
                    let i = self.l_ind[p];
                    y_vals[i] = y_vals[i] - self.l_val[p] * y_c;
                }

                let l_kc = y_c * self.d_inv[c];
                let p = l_next[c];
                self.l_ind[p] = k;
                self.l_val[p] = l_kc;
                l_next[c] += 1;

                d_k = d_k - y_c * l_kc;

                y_vals[c] = f0;
                y_used[c] = false;
            }

            if d_k == f0 || !d_k.is_finite() {
                log::error!("pivot {} of {}: {:.2e}", k, n, d_k);
                return Err(DistError::NumericalFailure);
            }
            self.d[k] = d_k;
            self.d_inv[k] = d_k.recip();
        }

        Ok(())
    }

    /// Order of the matrix.
    pub fn size(&self) -> usize
    {
        self.n
    }

    /// Number of nonzeros of the strictly lower \\(L\\).
    pub fn l_nnz(&self) -> usize
    {
        self.l_ptr[self.n]
    }

    /// Diagonal \\(D\\).
    pub fn d(&self) -> &[L::F]
    {
        &self.d
    }

    /// Numbers of positive, negative and zero entries of \\(D\\).
    pub fn inertia(&self) -> (usize, usize, usize)
    {
        let f0 = L::F::zero();
        self.d.iter().fold((0, 0, 0), |(p, m, z), d| {
            if *d > f0 {(p + 1, m, z)}
            else if *d < f0 {(p, m + 1, z)}
            else {(p, m, z + 1)}
        })
    }

    /// Determinant of the regularized matrix, without overflow.
    pub fn safe_determinant(&self) -> SafeProduct<L::F>
    {
        SafeProduct::from_factors(self.d.iter().copied())
    }

    /// Solves \\((K + {\bf diag}(r)) x = b\\) with the factors.
    ///
    /// * `x` is \\(b\\) on entry, \\(x\\) on exit.
    pub fn solve_in_place(&self, x: &mut [L::F])
    {
        assert_eq!(x.len(), self.n);

        for i in 0.. self.n {
            let x_i = x[i];
            for p in self.l_ptr[i].. self.l_ptr[i + 1] {
                let k = self.l_ind[p];
                x[k] = x[k] - self.l_val[p] * x_i;
            }
        }

        for i in 0.. self.n {
            x[i] = x[i] * self.d_inv[i];
        }

        for i in (0.. self.n).rev() {
            let mut x_i = x[i];
            for p in self.l_ptr[i].. self.l_ptr[i + 1] {
                x_i = x_i - self.l_val[p] * x[self.l_ind[p]];
            }
            x[i] = x_i;
        }
    }

    /// Calculates \\(y = K x\\) with the unregularized matrix.
    pub fn apply(&self, x: &[L::F], y: &mut [L::F])
    {
        assert_eq!(x.len(), self.n);
        assert_eq!(y.len(), self.n);

        y.fill(L::F::zero());
        for j in 0.. self.n {
            for p in self.a_ptr[j].. self.a_ptr[j + 1] {
                let i = self.a_ind[p];
                let v = self.a_val[p];
                y[i] = y[i] + v * x[j];
                if i != j {
                    y[j] = y[j] + v * x[i];
                }
            }
        }
    }

    fn residual(&self, b: &[L::F], x: &[L::F], r: &mut [L::F])
    {
        self.apply(x, r);
        L::scale(-L::F::one(), r);
        L::add(L::F::one(), b, r);
    }

    /// Solves \\(K x = b\\) by the factors followed by iterative refinement against the unregularized \\(K\\).
    ///
    /// Refinement stops at `ctrl.rel_tol_refine`, after `ctrl.max_refine_its`,
    /// or as soon as the residual stops decreasing.
    /// A final relative residual above `ctrl.rel_tol` is only warned.
    ///
    /// Returns `Ok` with \\(x\\), or `Err` with [`DistError::NumericalFailure`] if the residual is not finite.
    /// * `verbose` emits the refinement diagnostics at info level.
    pub fn solve_refined(&self, b: &[L::F], ctrl: &QsdCtrl<L::F>, verbose: bool) -> Result<Vec<L::F>, DistError>
    {
        if b.len() != self.n {
            log::error!("Size mismatch: n {}, b {}", self.n, b.len());
            return Err(DistError::DimensionMismatch);
        }

        let norm_b = L::norm(b);
        if norm_b == L::F::zero() {
            return Ok(vec![L::F::zero(); self.n]);
        }

        let mut x = b.to_vec();
        self.solve_in_place(&mut x);

        let mut r = vec![L::F::zero(); self.n];
        self.residual(b, &x, &mut r);
        let mut rel = L::norm(&r) / norm_b;

        let mut x_new = vec![L::F::zero(); self.n];
        let mut r_new = vec![L::F::zero(); self.n];
        let mut its = 0;
        while its < ctrl.max_refine_its && rel > ctrl.rel_tol_refine {
            L::copy(&r, &mut x_new);
            self.solve_in_place(&mut x_new);
            L::add(L::F::one(), &x, &mut x_new);

            self.residual(b, &x_new, &mut r_new);
            let rel_new = L::norm(&r_new) / norm_b;
            if !(rel_new < rel) {
                break;
            }

            std::mem::swap(&mut x, &mut x_new);
            std::mem::swap(&mut r, &mut r_new);
            rel = rel_new;
            its += 1;
        }

        if verbose {
            log::info!("refined {} times: rel residual {:.2e}", its, rel);
        }
        else {
            log::trace!("refined {} times: rel residual {:.2e}", its, rel);
        }

        if !rel.is_finite() {
            log::error!("non-finite residual after refinement");
            return Err(DistError::NumericalFailure);
        }
        if rel > ctrl.rel_tol {
            log::warn!("rel residual {:.2e} exceeds {:.2e}", rel, ctrl.rel_tol);
        }

        Ok(x)
    }
}

//

#[cfg(test)]
fn test_kkt() -> Vec<(usize, usize, f64)>
{
    // [ 4  1  0  2  ]
    // [ 1  3  1  0  ]
    // [ 0  1 -2  .5 ]
    // [ 2  0  .5 -3 ]
    vec![
        (0, 0, 4.), (1, 1, 3.), (2, 2, -2.), (3, 3, -3.),
        (1, 0, 1.), (0, 3, 1.), (3, 0, 1.), (1, 2, 1.), (2, 3, 0.5),
    ]
}

#[test]
fn test_qsd1()
{
    use float_eq::assert_float_eq;
    use bunsan_core::FloatGeneric;

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    let ldl = QsdLdl::<La>::new(4, &test_kkt(), &[0.; 4]).unwrap();

    assert_eq!(ldl.size(), 4);
    assert_eq!(ldl.inertia(), (2, 2, 0));
    assert_float_eq!(ldl.d(), [4., 2.75, -26. / 11., -405. / 104.].as_slice(), abs_all <= 1e-12);
    assert_float_eq!(ldl.safe_determinant().value(), 101.25, abs <= 1e-9);

    let mut x = [14., 10., -2., -8.5];
    ldl.solve_in_place(&mut x);
    assert_float_eq!(x.as_slice(), [1., 2., 3., 4.].as_slice(), abs_all <= 1e-12);

    let mut y = [0.; 4];
    ldl.apply(&x, &mut y);
    assert_float_eq!(y.as_slice(), [14., 10., -2., -8.5].as_slice(), abs_all <= 1e-12);
}

#[test]
fn test_qsd2()
{
    use float_eq::assert_float_eq;
    use bunsan_core::FloatGeneric;

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    // heavy regularization, removed by refinement
    let reg = [1e-3, 1e-3, -1e-3, -1e-3];
    let ldl = QsdLdl::<La>::new(4, &test_kkt(), &reg).unwrap();

    let mut x0 = [14., 10., -2., -8.5];
    ldl.solve_in_place(&mut x0);
    assert!((x0[3] - 4.).abs() > 1e-6);

    let x = ldl.solve_refined(&[14., 10., -2., -8.5], &QsdCtrl::default(), false).unwrap();
    assert_float_eq!(x.as_slice(), [1., 2., 3., 4.].as_slice(), abs_all <= 1e-10);

    let z = ldl.solve_refined(&[0.; 4], &QsdCtrl::default(), false).unwrap();
    assert_eq!(z, vec![0.; 4]);
}

#[test]
fn test_qsd3()
{
    use bunsan_core::FloatGeneric;

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    // zero leading pivot
    let r = QsdLdl::<La>::new(2, &[(0, 1, 1.)], &[0.; 2]);
    assert_eq!(r.err(), Some(DistError::NumericalFailure));

    let r = QsdLdl::<La>::new(2, &[(0, 1, 1.)], &[1e-8, -1e-8]);
    assert!(r.is_ok());

    let r = QsdLdl::<La>::new(2, &[(0, 2, 1.)], &[1.; 2]);
    assert_eq!(r.err(), Some(DistError::OutOfBounds));

    let r = QsdLdl::<La>::new(2, &[], &[1.; 3]);
    assert_eq!(r.err(), Some(DistError::DimensionMismatch));
}
