//! Distributed quasi-semidefinite solve

use num_traits::Zero;
use bunsan_core::{LinAlg, Comm, DistError, DistMultiVec, Timer};
use crate::ctrl::QsdCtrl;
use crate::qsd::QsdLdl;

/// Block of unknowns of a KKT system, held as a distributed multi-vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KktSegment
{
    /// Height of the multi-vector.
    pub height: usize,
    /// Width of the multi-vector, i.e. unknowns per row.
    pub comps: usize,
    /// Sign of the regularization of this block.
    pub positive: bool,
}

/// Ordering of the unknowns of a KKT system.
///
/// Segments are laid out one after another;
/// within a segment the unknowns of a row are contiguous.
#[derive(Debug, Clone)]
pub struct KktLayout
{
    segs: Vec<KktSegment>,
    offsets: Vec<usize>,
}

impl KktLayout
{
    pub fn new(segs: &[KktSegment]) -> Self
    {
        let mut offsets = Vec::with_capacity(segs.len() + 1);
        offsets.push(0);
        for s in segs {
            let o = offsets[offsets.len() - 1] + s.height * s.comps;
            offsets.push(o);
        }

        KktLayout {
            segs: segs.to_vec(),
            offsets,
        }
    }

    /// Order of the KKT system.
    pub fn dim(&self) -> usize
    {
        self.offsets[self.segs.len()]
    }

    pub fn segments(&self) -> &[KktSegment]
    {
        &self.segs
    }

    /// Index of the unknown of segment `seg`, global row `row` and component `comp`.
    pub fn index(&self, seg: usize, row: usize, comp: usize) -> usize
    {
        let s = &self.segs[seg];
        debug_assert!(row < s.height && comp < s.comps);

        self.offsets[seg] + row * s.comps + comp
    }

    /// Static regularization: `reg_primal` on positive segments, `-reg_dual` on the others.
    pub fn regularization<F: num_traits::Float>(&self, ctrl: &QsdCtrl<F>) -> Vec<F>
    {
        let mut reg = Vec::with_capacity(self.dim());
        for s in self.segs.iter() {
            let r = if s.positive {ctrl.reg_primal} else {-ctrl.reg_dual};
            reg.resize(reg.len() + s.height * s.comps, r);
        }
        reg
    }
}

//

/// Distributed KKT solver.
///
/// Each process contributes the entries of its own rows;
/// the assembled system is factored redundantly on every process, so that every process
/// reaches the same factors and the same refined solution without further communication.
pub struct DistQsd<L: LinAlg>
{
    comm: Comm,
    layout: KktLayout,
    ldl: QsdLdl<L>,
    ctrl: QsdCtrl<L::F>,
}

impl<L: LinAlg> DistQsd<L>
{
    /// Assembles and factors the KKT system; collective.
    ///
    /// * `local_triples` are the `(row, col, value)` entries contributed by this process,
    ///   indexed by [`KktLayout::index`].
    pub fn new(comm: &Comm, layout: KktLayout, local_triples: Vec<(usize, usize, L::F)>, ctrl: &QsdCtrl<L::F>) -> Result<Self, DistError>
    {
        let mut timer = Timer::new("qsd factor");
        timer.start();

        let triples = comm.allgatherv(local_triples)?;
        let reg = layout.regularization(ctrl);
        let ldl = QsdLdl::new(layout.dim(), &triples, &reg)?;

        let sec = timer.stop();
        if ctrl.time && comm.rank() == 0 {
            log::info!("factored {}x{} with {} entries into {} in {:.3e} s", layout.dim(), layout.dim(), triples.len(), ldl.l_nnz(), sec);
        }
        else {
            log::trace!("factored {}x{} in {:.3e} s", layout.dim(), layout.dim(), sec);
        }

        Ok(DistQsd {
            comm: comm.clone(),
            layout,
            ldl,
            ctrl: ctrl.clone(),
        })
    }

    pub fn layout(&self) -> &KktLayout
    {
        &self.layout
    }

    pub fn ldl(&self) -> &QsdLdl<L>
    {
        &self.ldl
    }

    /// Solves the KKT system; collective.
    ///
    /// Returns `Ok` with the solution, one multi-vector per segment.
    /// * `rhs` holds the right-hand side, one multi-vector per segment,
    ///   each `height x comps` of its segment.
    pub fn solve(&self, rhs: &[&DistMultiVec<L>]) -> Result<Vec<DistMultiVec<L>>, DistError>
    {
        let segs = self.layout.segments();
        if rhs.len() != segs.len() {
            log::error!("Size mismatch: {} segments, {} right-hand sides", segs.len(), rhs.len());
            return Err(DistError::DimensionMismatch);
        }

        let mut b = vec![L::F::zero(); self.layout.dim()];
        for (k, (s, v)) in segs.iter().zip(rhs.iter()).enumerate() {
            if v.height() != s.height || v.width() != s.comps {
                log::error!("Size mismatch: segment {} {}x{}, rhs {}x{}", k, s.height, s.comps, v.height(), v.width());
                return Err(DistError::DimensionMismatch);
            }

            let all = v.gather_all()?;
            for c in 0.. s.comps {
                for r in 0.. s.height {
                    b[self.layout.index(k, r, c)] = all[c * s.height + r];
                }
            }
        }

        let verbose = self.ctrl.progress && self.comm.rank() == 0;
        let x = self.ldl.solve_refined(&b, &self.ctrl, verbose)?;

        let mut sol = Vec::with_capacity(segs.len());
        for (k, s) in segs.iter().enumerate() {
            let mut v = DistMultiVec::with_size(&self.comm, s.height, s.comps)?;
            v.set_by_fn(|r, c| x[self.layout.index(k, r, c)]);
            sol.push(v);
        }
        Ok(sol)
    }
}

//

#[test]
fn test_dist_qsd1()
{
    use float_eq::assert_float_eq;
    use bunsan_core::{FloatGeneric, launch};

    type La = FloatGeneric<f64>;

    let _ = env_logger::builder().is_test(true).try_init();

    // [ 2I  B^T ]   B = [ 1 1 0 ]
    // [ B   -I  ]       [ 0 1 1 ]
    let layout = KktLayout::new(&[
        KktSegment {height: 3, comps: 1, positive: true},
        KktSegment {height: 1, comps: 2, positive: false},
    ]);
    assert_eq!(layout.dim(), 5);
    assert_eq!(layout.index(1, 0, 1), 4);

    for np in 1..= 3 {
        let rslt = launch(np, |comm| -> Result<(Vec<f64>, Vec<f64>), DistError> {
            let p = DistMultiVec::<La>::with_size(comm, 3, 1)?;
            let mut triples = Vec::new();
            for r in 0.. p.local_height() {
                let i = p.global_row(r)?;
                triples.push((i, i, 2.));
            }
            if comm.rank() == 0 {
                for (row, col) in [(0, 0), (0, 1), (1, 1), (1, 2)] {
                    triples.push((layout.index(1, 0, row), col, 1.));
                }
                triples.push((3, 3, -1.));
                triples.push((4, 4, -1.));
            }

            let qsd = DistQsd::<La>::new(comm, layout.clone(), triples, &QsdCtrl::default())?;
            assert_eq!(qsd.ldl().inertia(), (3, 2, 0));

            // solution x = (1, 1, 1), y = (1, -1)
            let mut b0 = DistMultiVec::<La>::with_size(comm, 3, 1)?;
            b0.set_by_fn(|i, _| [3., 2., 1.][i]);
            let mut b1 = DistMultiVec::<La>::with_size(comm, 1, 2)?;
            b1.set_by_fn(|_, c| [1., 3.][c]);

            let sol = qsd.solve(&[&b0, &b1])?;
            Ok((sol[0].gather_all()?, sol[1].gather_all()?))
        }).unwrap();

        for r in rslt {
            let (x, y) = r.unwrap();
            assert_float_eq!(x.as_slice(), [1., 1., 1.].as_slice(), abs_all <= 1e-10);
            assert_float_eq!(y.as_slice(), [1., -1.].as_slice(), abs_all <= 1e-10);
        }
    }
}
