use num_traits::{Zero, One};
use crate::{LinAlg, LinAlgEx, Comm, DistError, Grid, Dist, DistPair, DistMultiVec, DistSparseMatrix, DistOperator, check_op_operands};
use crate::{shift, length};
use crate::operator::scale_or_zero;

/// Distributed dense matrix
///
/// Entries are spread element-cyclically over a [`Grid`] by a [`DistPair`]:
/// the process of cyclic rank `s` under the column distribution (of stride `t`)
/// stores the rows `s, s + t, s + 2t, ...`, and likewise for columns under the row distribution.
/// Alignments are zero. The local part is stored in column-major.
#[derive(Clone)]
pub struct DistMatrix<L: LinAlg>
{
    grid: Grid,
    dists: DistPair,
    height: usize,
    width: usize,
    buf: Vec<L::F>,
}

impl<L: LinAlg> DistMatrix<L>
{
    /// Creates an empty `0 x 0` instance.
    ///
    /// Returns `Err` with [`DistError::InvalidDistribution`] for an unsupported pair of distributions.
    pub fn new(grid: &Grid, col_dist: Dist, row_dist: Dist) -> Result<Self, DistError>
    {
        Self::with_size(grid, col_dist, row_dist, 0, 0)
    }

    /// Creates a zero-filled `height x width` instance.
    pub fn with_size(grid: &Grid, col_dist: Dist, row_dist: Dist, height: usize, width: usize) -> Result<Self, DistError>
    {
        grid.comm().check_initialized()?;
        let dists = DistPair::new(col_dist, row_dist)?;

        let mut a = DistMatrix {
            grid: grid.clone(),
            dists,
            height: 0,
            width: 0,
            buf: Vec::new(),
        };
        a.resize(height, width);
        Ok(a)
    }

    /// Creates a deep copy of `other`.
    pub fn from_existing(other: &Self) -> Self
    {
        other.clone()
    }

    /// Reallocates as a zero-filled `height x width` instance.
    pub fn resize(&mut self, height: usize, width: usize)
    {
        self.height = height;
        self.width = width;
        self.buf.clear();
        self.buf.resize(self.local_height() * self.local_width(), L::F::zero());
    }

    pub fn grid(&self) -> &Grid
    {
        &self.grid
    }

    pub fn comm(&self) -> &Comm
    {
        self.grid.comm()
    }

    pub fn dists(&self) -> DistPair
    {
        self.dists
    }

    pub fn height(&self) -> usize
    {
        self.height
    }

    pub fn width(&self) -> usize
    {
        self.width
    }

    pub fn col_stride(&self) -> usize
    {
        self.dists.col().stride(&self.grid)
    }

    pub fn row_stride(&self) -> usize
    {
        self.dists.row().stride(&self.grid)
    }

    /// Global index of the first local row, or `None` if this process holds no rows.
    pub fn col_shift(&self) -> Option<usize>
    {
        let stride = self.col_stride();
        self.dists.col().dist_rank(&self.grid).map(|r| shift(r, 0, stride))
    }

    /// Global index of the first local column, or `None` if this process holds no columns.
    pub fn row_shift(&self) -> Option<usize>
    {
        let stride = self.row_stride();
        self.dists.row().dist_rank(&self.grid).map(|r| shift(r, 0, stride))
    }

    pub fn local_height(&self) -> usize
    {
        self.col_shift().map_or(0, |s| length(self.height, s, self.col_stride()))
    }

    pub fn local_width(&self) -> usize
    {
        self.row_shift().map_or(0, |s| length(self.width, s, self.row_stride()))
    }

    /// Global row of the local row `local_row`.
    pub fn global_row(&self, local_row: usize) -> Result<usize, DistError>
    {
        match self.col_shift() {
            Some(s) if local_row < self.local_height() => Ok(s + local_row * self.col_stride()),
            _ => {
                log::error!("local row {} out of {}", local_row, self.local_height());
                Err(DistError::OutOfBounds)
            },
        }
    }

    /// Global column of the local column `local_col`.
    pub fn global_col(&self, local_col: usize) -> Result<usize, DistError>
    {
        match self.row_shift() {
            Some(s) if local_col < self.local_width() => Ok(s + local_col * self.row_stride()),
            _ => {
                log::error!("local column {} out of {}", local_col, self.local_width());
                Err(DistError::OutOfBounds)
            },
        }
    }

    /// Local row of the global row `row`, or `None` if this process does not hold it.
    pub fn local_row(&self, row: usize) -> Option<usize>
    {
        let stride = self.col_stride();
        self.col_shift().and_then(|s| {
            if row < self.height && row % stride == s {Some(row / stride)} else {None}
        })
    }

    /// Local column of the global column `col`, or `None` if this process does not hold it.
    pub fn local_col(&self, col: usize) -> Option<usize>
    {
        let stride = self.row_stride();
        self.row_shift().and_then(|s| {
            if col < self.width && col % stride == s {Some(col / stride)} else {None}
        })
    }

    fn check_local(&self, local_row: usize, local_col: usize) -> Result<usize, DistError>
    {
        if local_row < self.local_height() && local_col < self.local_width() {
            Ok(local_col * self.local_height() + local_row)
        }
        else {
            log::error!("local index ({}, {}) out of {}x{}", local_row, local_col, self.local_height(), self.local_width());
            Err(DistError::OutOfBounds)
        }
    }

    pub fn get_local(&self, local_row: usize, local_col: usize) -> Result<L::F, DistError>
    {
        let i = self.check_local(local_row, local_col)?;
        Ok(self.buf[i])
    }

    pub fn set_local(&mut self, local_row: usize, local_col: usize, value: L::F) -> Result<(), DistError>
    {
        let i = self.check_local(local_row, local_col)?;
        self.buf[i] = value;
        Ok(())
    }

    pub fn update_local(&mut self, local_row: usize, local_col: usize, value: L::F) -> Result<(), DistError>
    {
        let i = self.check_local(local_row, local_col)?;
        self.buf[i] = self.buf[i] + value;
        Ok(())
    }

    /// Sets every local entry by a function of its global index `(row, col)`.
    pub fn set_by_fn<M>(&mut self, mut func: M)
    where M: FnMut(usize, usize) -> L::F
    {
        if let (Some(rs), Some(cs)) = (self.col_shift(), self.row_shift()) {
            let (lh, lw) = (self.local_height(), self.local_width());
            let (rt, ct) = (self.col_stride(), self.row_stride());
            for c in 0.. lw {
                for r in 0.. lh {
                    self.buf[c * lh + r] = func(rs + r * rt, cs + c * ct);
                }
            }
        }
    }

    /// Local part, column-major.
    pub fn local_buf(&self) -> &[L::F]
    {
        &self.buf
    }

    pub fn local_buf_mut(&mut self) -> &mut [L::F]
    {
        &mut self.buf
    }

    // Local entries for which this process is the representative among its replicas,
    // as (global row, global column, value).
    fn primary_entries(&self) -> Vec<(usize, usize, L::F)>
    {
        let mut entries = Vec::new();

        if let (Some(rs), Some(cs)) = (self.col_shift(), self.row_shift()) {
            if self.dists.redundant_rank(&self.grid) == 0 {
                let (lh, lw) = (self.local_height(), self.local_width());
                let (rt, ct) = (self.col_stride(), self.row_stride());
                entries.reserve(lh * lw);
                for c in 0.. lw {
                    for r in 0.. lh {
                        entries.push((rs + r * rt, cs + c * ct, self.buf[c * lh + r]));
                    }
                }
            }
        }
        entries
    }

    /// Reads an entry by its global index; collective.
    ///
    /// Returns the same value on every process.
    pub fn get_global(&self, row: usize, col: usize) -> Result<L::F, DistError>
    {
        if row >= self.height || col >= self.width {
            log::error!("index ({}, {}) out of {}x{}", row, col, self.height, self.width);
            return Err(DistError::OutOfBounds);
        }

        let f0 = L::F::zero();
        let local = match (self.local_row(row), self.local_col(col)) {
            (Some(r), Some(c)) if self.dists.redundant_rank(&self.grid) == 0 => self.buf[c * self.local_height() + r],
            _ => f0,
        };
        self.comm().allreduce(local, |a, b| a + b)
    }

    /// Gathers the whole matrix to every process; collective.
    ///
    /// Returns the global content in column-major.
    pub fn gather_all(&self) -> Result<Vec<L::F>, DistError>
    {
        let parts = self.comm().allgather(self.primary_entries())?;

        let mut all = vec![L::F::zero(); self.height * self.width];
        for (r, c, v) in parts.into_iter().flatten() {
            all[c * self.height + r] = v;
        }
        Ok(all)
    }

    // Sends (global index, column of the multi-vector, value) triples to the owners of the indices in `y`,
    // which add them in rank order.
    fn push_to_owners(&self, alpha: L::F, partial: Vec<(usize, usize, L::F)>, y: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        let mut sends = vec![Vec::new(); self.comm().size()];
        for (g, c, v) in partial {
            sends[y.blocks().owner(g)].push((g, c, v));
        }

        let recvs = self.comm().alltoallv(sends)?;

        let first = y.first_local_row();
        for (g, c, v) in recvs.into_iter().flatten() {
            y[(g - first, c)] = y[(g - first, c)] + alpha * v;
        }
        Ok(())
    }

    fn primary_shifts(&self) -> Option<(usize, usize)>
    {
        match (self.col_shift(), self.row_shift()) {
            (Some(rs), Some(cs)) if self.dists.redundant_rank(&self.grid) == 0 => Some((rs, cs)),
            _ => None,
        }
    }
}

impl<L: LinAlgEx> DistMatrix<L>
{
    fn local_product(&self, transpose: bool, x: &DistMultiVec<L>) -> Result<Vec<(usize, usize, L::F)>, DistError>
    {
        let f0 = L::F::zero();
        let f1 = L::F::one();

        let x_all = x.gather_all()?;
        let (lh, lw) = (self.local_height(), self.local_width());
        let (rt, ct) = (self.col_stride(), self.row_stride());
        let xh = x.height();

        let mut partial = Vec::new();
        if let Some((rs, cs)) = self.primary_shifts() {
            let (n_in, in_shift, in_stride, n_out, out_shift, out_stride) = if transpose {
                (lh, rs, rt, lw, cs, ct)
            }
            else {
                (lw, cs, ct, lh, rs, rt)
            };

            let mut x_loc = vec![f0; n_in];
            let mut y_loc = vec![f0; n_out];
            for c in 0.. x.width() {
                for (i, u) in x_loc.iter_mut().enumerate() {
                    *u = x_all[c * xh + in_shift + i * in_stride];
                }
                L::transform_ge(transpose, lh, lw, f1, &self.buf, &x_loc, f0, &mut y_loc);
                for (i, v) in y_loc.iter().enumerate() {
                    partial.push((out_shift + i * out_stride, c, *v));
                }
            }
        }
        Ok(partial)
    }
}

impl<L: LinAlgEx> DistOperator<L> for DistMatrix<L>
{
    fn size(&self) -> (usize, usize)
    {
        (self.height, self.width)
    }

    fn comm(&self) -> &Comm
    {
        self.grid.comm()
    }

    fn op(&self, alpha: L::F, x: &DistMultiVec<L>, beta: L::F, y: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        check_op_operands(self, false, x, y)?;

        let partial = self.local_product(false, x)?;
        scale_or_zero(beta, y);
        self.push_to_owners(alpha, partial, y)
    }

    fn trans_op(&self, alpha: L::F, x: &DistMultiVec<L>, beta: L::F, y: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        check_op_operands(self, true, x, y)?;

        let partial = self.local_product(true, x)?;
        scale_or_zero(beta, y);
        self.push_to_owners(alpha, partial, y)
    }

    fn absadd_cols(&self, tau: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        if tau.height() != self.width || tau.width() != 1 {
            log::error!("Size mismatch: tau({}, {}) for width {}", tau.height(), tau.width(), self.width);
            return Err(DistError::DimensionMismatch);
        }

        let mut partial = Vec::new();
        if let Some((_, cs)) = self.primary_shifts() {
            let lh = self.local_height();
            for c in 0.. self.local_width() {
                let sum = L::abssum(&self.buf[c * lh.. (c + 1) * lh], 1);
                partial.push((cs + c * self.row_stride(), 0, sum));
            }
        }
        self.push_to_owners(L::F::one(), partial, tau)
    }

    fn absadd_rows(&self, sigma: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        if sigma.height() != self.height || sigma.width() != 1 {
            log::error!("Size mismatch: sigma({}, {}) for height {}", sigma.height(), sigma.width(), self.height);
            return Err(DistError::DimensionMismatch);
        }

        let mut partial = Vec::new();
        if let Some((rs, _)) = self.primary_shifts() {
            let lh = self.local_height();
            for r in 0.. lh {
                let sum = L::abssum(&self.buf[r..], lh);
                partial.push((rs + r * self.col_stride(), 0, sum));
            }
        }
        self.push_to_owners(L::F::one(), partial, sigma)
    }
}

impl<L: LinAlg> DistSparseMatrix<L>
{
    /// Creates a sparse matrix holding the nonzero entries of `a`; collective.
    pub fn from_dist_matrix(a: &DistMatrix<L>) -> Result<Self, DistError>
    {
        let comm = a.comm();
        let mut sp = DistSparseMatrix::with_size(comm, a.height(), a.width())?;

        let mut sends = vec![Vec::new(); comm.size()];
        for (r, c, v) in a.primary_entries() {
            if v != L::F::zero() {
                sends[sp.blocks().owner(r)].push((r, c, v));
            }
        }

        let recvs = comm.alltoallv(sends)?;

        sp.reserve(recvs.iter().map(|v| v.len()).sum());
        for (r, c, v) in recvs.into_iter().flatten() {
            sp.queue_update(r, c, v)?;
        }
        sp.process_queues();
        Ok(sp)
    }
}

impl<L: LinAlg> core::fmt::Display for DistMatrix<L>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result
    {
        writeln!(f, "DistMatrix {}x{} [{:?},{:?}] rank {}: local {}x{}",
            self.height, self.width, self.dists.col(), self.dists.row(), self.comm().rank(),
            self.local_height(), self.local_width())?;

        let lh = self.local_height();
        for r in 0.. lh {
            write!(f, " ")?;
            for c in 0.. self.local_width() {
                write!(f, " {:.3e}", self.buf[c * lh + r])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

//

#[test]
fn test_dist_matrix1()
{
    use crate::{launch, FloatGeneric, GridOrder};

    type AMat = DistMatrix<FloatGeneric<f64>>;

    let dists = [
        (Dist::Mc, Dist::Mr), (Dist::Mr, Dist::Mc),
        (Dist::Vc, Dist::Star), (Dist::Star, Dist::Vr),
        (Dist::Mc, Dist::Star), (Dist::Star, Dist::Star),
        (Dist::Md, Dist::Star), (Dist::Circ, Dist::Circ),
    ];

    for (cd, rd) in dists {
        let r = launch(6, |c| {
            let g = Grid::new(c, GridOrder::ColumnMajor).unwrap();
            let mut a = AMat::with_size(&g, cd, rd, 7, 5).unwrap();
            a.set_by_fn(|i, j| (i * 5 + j) as f64);

            let primary = a.primary_entries().len();
            let all = a.gather_all().unwrap();
            let v = a.get_global(6, 4).unwrap();
            (primary, all, v)
        }).unwrap();

        // each entry has exactly one representative
        assert_eq!(r.iter().map(|t| t.0).sum::<usize>(), 35, "[{:?},{:?}]", cd, rd);
        for (_, all, v) in r {
            assert_eq!(all[3 * 7 + 2], 13.);
            assert_eq!(v, 34.);
        }
    }
}

#[test]
fn test_dist_matrix2()
{
    use float_eq::assert_float_eq;
    use crate::{launch, FloatGeneric, GridOrder};

    type AMat = DistMatrix<FloatGeneric<f64>>;
    type AVec = DistMultiVec<FloatGeneric<f64>>;

    let a_ij = |i: usize, j: usize| if (i + j) % 3 == 0 {0.} else {i as f64 - 2. * j as f64};

    let r = launch(4, |c| {
        let g = Grid::new(c, GridOrder::RowMajor).unwrap();
        let mut a = AMat::with_size(&g, Dist::Mc, Dist::Mr, 6, 4).unwrap();
        a.set_by_fn(a_ij);

        let mut x = AVec::with_size(c, 4, 2).unwrap();
        x.set_by_fn(|j, k| (j + k) as f64);
        let mut y = AVec::with_size(c, 6, 2).unwrap();
        a.op(1., &x, 0., &mut y).unwrap();

        let mut z = AVec::with_size(c, 4, 2).unwrap();
        a.trans_op(1., &y, 0., &mut z).unwrap();

        let mut sigma = AVec::with_size(c, 6, 1).unwrap();
        a.absadd_rows(&mut sigma).unwrap();

        let sp = DistSparseMatrix::from_dist_matrix(&a).unwrap();
        let mut y_sp = AVec::with_size(c, 6, 2).unwrap();
        sp.op(1., &x, 0., &mut y_sp).unwrap();

        (y.gather_all().unwrap(), z.gather_all().unwrap(), sigma.gather_all().unwrap(), y_sp.gather_all().unwrap())
    }).unwrap();

    let mut y_ref = vec![0.; 12];
    let mut sigma_ref = vec![0.; 6];
    for k in 0.. 2 {
        for i in 0.. 6 {
            for j in 0.. 4 {
                y_ref[k * 6 + i] += a_ij(i, j) * (j + k) as f64;
            }
        }
    }
    let mut z_ref = vec![0.; 8];
    for k in 0.. 2 {
        for j in 0.. 4 {
            for i in 0.. 6 {
                z_ref[k * 4 + j] += a_ij(i, j) * y_ref[k * 6 + i];
            }
        }
    }
    for i in 0.. 6 {
        for j in 0.. 4 {
            sigma_ref[i] += a_ij(i, j).abs();
        }
    }

    for (y, z, sigma, y_sp) in r {
        assert_float_eq!(y, y_ref, abs_all <= 1e-9);
        assert_float_eq!(z, z_ref, abs_all <= 1e-9);
        assert_float_eq!(sigma, sigma_ref, abs_all <= 1e-9);
        assert_float_eq!(y_sp, y_ref, abs_all <= 1e-9);
    }
}
