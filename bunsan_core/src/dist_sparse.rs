use num_traits::{Float, Zero, One};
use std::cell::RefCell;
use std::sync::Arc;
use crate::{LinAlg, Comm, DistError, RowBlocks, DistMultiVec, DistOperator, check_op_operands};
use crate::operator::scale_or_zero;

// Communication pattern of a multiply, fixed by the committed structure.
#[derive(Clone)]
struct MultMeta
{
    // sorted distinct global columns referenced by the local rows
    ghost_cols: Vec<usize>,
    // index into ghost_cols of each committed entry
    entry_ghost: Vec<usize>,
    // number of ghost columns owned by each rank
    recv_counts: Vec<usize>,
    // local rows of the x-space that each rank asked this process for
    send_rows: Vec<Vec<usize>>,
}

//

/// Distributed sparse matrix
///
/// Rows are split into contiguous blocks over the processes (see [`RowBlocks`]),
/// and each process keeps its rows in compressed sparse row form with global column indices.
///
/// Entries are assembled through a staging queue:
/// [`DistSparseMatrix::resize`] → [`DistSparseMatrix::reserve`] (optional)
/// → [`DistSparseMatrix::queue_local_update`] (any number of times)
/// → [`DistSparseMatrix::process_queues`].
/// Committing merges the queue into the structure, sorting columns within each row and summing duplicates.
/// It is local to each process; the communication pattern of multiplies is rebuilt by every process
/// at the next multiply after any process has committed or resized.
#[derive(Clone)]
pub struct DistSparseMatrix<L: LinAlg>
{
    comm: Comm,
    blocks: RowBlocks,
    width: usize,

    queue: Vec<(usize, usize, L::F)>,

    row_ptr: Vec<usize>,
    col_ind: Vec<usize>,
    vals: Vec<L::F>,

    meta: RefCell<Option<Arc<MultMeta>>>,
}

impl<L: LinAlg> DistSparseMatrix<L>
{
    /// Creates an empty `0 x 0` instance.
    ///
    /// Returns `Err` with [`DistError::NotInitialized`] outside of an initialized environment.
    pub fn new(comm: &Comm) -> Result<Self, DistError>
    {
        Self::with_size(comm, 0, 0)
    }

    /// Creates a `height x width` instance without entries.
    pub fn with_size(comm: &Comm, height: usize, width: usize) -> Result<Self, DistError>
    {
        comm.check_initialized()?;

        let mut a = DistSparseMatrix {
            comm: comm.clone(),
            blocks: RowBlocks::new(0, comm.size()),
            width: 0,
            queue: Vec::new(),
            row_ptr: Vec::new(),
            col_ind: Vec::new(),
            vals: Vec::new(),
            meta: RefCell::new(None),
        };
        a.resize(height, width);
        Ok(a)
    }

    /// Reallocates as a `height x width` instance without entries.
    ///
    /// Committed entries and pending queue entries are all discarded.
    pub fn resize(&mut self, height: usize, width: usize)
    {
        self.blocks = RowBlocks::new(height, self.comm.size());
        self.width = width;

        self.queue.clear();
        self.row_ptr.clear();
        self.row_ptr.resize(self.local_height() + 1, 0);
        self.col_ind.clear();
        self.vals.clear();
        self.meta = RefCell::new(None);
    }

    /// Reserves room for `capacity` queued updates; a hint only.
    pub fn reserve(&mut self, capacity: usize)
    {
        self.queue.reserve(capacity);
    }

    /// Queues `value` to be added to the entry at local row `local_row` and global column `col`.
    ///
    /// Returns `Err` with [`DistError::OutOfBounds`] if either index is out of range.
    pub fn queue_local_update(&mut self, local_row: usize, col: usize, value: L::F) -> Result<(), DistError>
    {
        if local_row >= self.local_height() || col >= self.width {
            log::error!("queued update ({}, {}) out of local {}x{}", local_row, col, self.local_height(), self.width);
            return Err(DistError::OutOfBounds);
        }

        self.queue.push((local_row, col, value));
        Ok(())
    }

    /// Queues an update by global row, which must be owned by this process.
    pub fn queue_update(&mut self, row: usize, col: usize, value: L::F) -> Result<(), DistError>
    {
        let first = self.first_local_row();
        if row < first || row >= first + self.local_height() {
            log::error!("row {} is not owned by rank {}", row, self.comm.rank());
            return Err(DistError::OutOfBounds);
        }

        self.queue_local_update(row - first, col, value)
    }

    /// Commits the queued updates.
    ///
    /// Entries sharing a position, queued or already committed, are summed.
    /// An empty queue leaves the structure as it is.
    pub fn process_queues(&mut self)
    {
        self.meta = RefCell::new(None);

        if self.queue.is_empty() {
            return;
        }

        let lh = self.local_height();
        let mut entries = Vec::with_capacity(self.vals.len() + self.queue.len());
        for r in 0.. lh {
            for e in self.row_ptr[r].. self.row_ptr[r + 1] {
                entries.push((r, self.col_ind[e], self.vals[e]));
            }
        }
        entries.append(&mut self.queue);

        // stable, so that duplicates are summed in the order they were queued
        entries.sort_by_key(|&(r, c, _)| (r, c));

        self.col_ind.clear();
        self.vals.clear();
        self.row_ptr.clear();
        self.row_ptr.resize(lh + 1, 0);

        let mut last = None;
        for (r, c, v) in entries {
            if last == Some((r, c)) {
                if let Some(u) = self.vals.last_mut() {
                    *u = *u + v;
                }
            }
            else {
                self.col_ind.push(c);
                self.vals.push(v);
                self.row_ptr[r + 1] += 1;
                last = Some((r, c));
            }
        }
        for r in 0.. lh {
            self.row_ptr[r + 1] += self.row_ptr[r];
        }

        log::trace!("rank {}: committed {} local entries", self.comm.rank(), self.vals.len());
    }

    /// Returns `true` if no update is waiting in the queue.
    pub fn is_consistent(&self) -> bool
    {
        self.queue.is_empty()
    }

    pub fn num_queued(&self) -> usize
    {
        self.queue.len()
    }

    /// Number of committed entries of this process.
    pub fn num_local_entries(&self) -> usize
    {
        self.vals.len()
    }

    pub fn comm(&self) -> &Comm
    {
        &self.comm
    }

    pub fn blocks(&self) -> &RowBlocks
    {
        &self.blocks
    }

    pub fn height(&self) -> usize
    {
        self.blocks.height()
    }

    pub fn width(&self) -> usize
    {
        self.width
    }

    /// Number of rows owned by this process.
    pub fn local_height(&self) -> usize
    {
        self.blocks.local_height(self.comm.rank())
    }

    /// Global index of the first row owned by this process.
    pub fn first_local_row(&self) -> usize
    {
        self.blocks.first(self.comm.rank())
    }

    /// Global row of the local row `local_row`.
    pub fn global_row(&self, local_row: usize) -> Result<usize, DistError>
    {
        if local_row < self.local_height() {
            Ok(self.first_local_row() + local_row)
        }
        else {
            log::error!("local row {} out of {}", local_row, self.local_height());
            Err(DistError::OutOfBounds)
        }
    }

    /// Rank owning the global row `row`.
    pub fn row_owner(&self, row: usize) -> Result<usize, DistError>
    {
        if row < self.height() {
            Ok(self.blocks.owner(row))
        }
        else {
            log::error!("row {} out of {}", row, self.height());
            Err(DistError::OutOfBounds)
        }
    }

    /// Committed entries of the local row `local_row`.
    ///
    /// Returns global column indices in ascending order and their values.
    pub fn row(&self, local_row: usize) -> Result<(&[usize], &[L::F]), DistError>
    {
        if local_row >= self.local_height() {
            log::error!("local row {} out of {}", local_row, self.local_height());
            return Err(DistError::OutOfBounds);
        }

        let rng = self.row_ptr[local_row].. self.row_ptr[local_row + 1];
        Ok((&self.col_ind[rng.clone()], &self.vals[rng]))
    }

    /// Committed value at local row `local_row` and global column `col`, zero if not stored.
    pub fn value(&self, local_row: usize, col: usize) -> Result<L::F, DistError>
    {
        let (cols, vals) = self.row(local_row)?;
        if col >= self.width {
            log::error!("column {} out of {}", col, self.width);
            return Err(DistError::OutOfBounds);
        }

        Ok(match cols.binary_search(&col) {
            Ok(e) => vals[e],
            Err(_) => L::F::zero(),
        })
    }

    /// Multiplies column `j` by `d_j` for every `j`; collective.
    ///
    /// * `d` is a `width x 1` vector.
    pub fn scale_cols(&mut self, d: &DistMultiVec<L>) -> Result<(), DistError>
    {
        if d.height() != self.width || d.width() != 1 || d.comm().size() != self.comm.size() {
            log::error!("column scaling of {}x{} does not fit width {}", d.height(), d.width(), self.width);
            return Err(DistError::DimensionMismatch);
        }

        let meta = self.mult_meta()?;
        let ghosts = self.exchange(&meta, d)?;
        let scaled: Vec<_> = self.vals.iter().zip(meta.entry_ghost.iter())
            .map(|(v, g)| *v * ghosts[*g])
            .collect();
        self.vals = scaled;
        Ok(())
    }

    /// Multiplies row `i` by `d_i` for every `i`.
    ///
    /// * `d` is a `height x 1` vector.
    pub fn scale_rows(&mut self, d: &DistMultiVec<L>) -> Result<(), DistError>
    {
        if d.height() != self.height() || d.width() != 1 || d.comm().size() != self.comm.size() {
            log::error!("row scaling of {}x{} does not fit height {}", d.height(), d.width(), self.height());
            return Err(DistError::DimensionMismatch);
        }

        for r in 0.. self.local_height() {
            let s = d[(r, 0)];
            for v in self.vals[self.row_ptr[r].. self.row_ptr[r + 1]].iter_mut() {
                *v = *v * s;
            }
        }
        Ok(())
    }

    // Collective: the cached pattern is reused only if no process has invalidated its own.
    fn mult_meta(&self) -> Result<Arc<MultMeta>, DistError>
    {
        let cached = self.meta.borrow().clone();
        let all_cached = self.comm.allreduce(cached.is_some(), |a, b| a && b)?;

        match cached {
            Some(meta) if all_cached => Ok(meta),
            _ => {
                let meta = Arc::new(self.build_mult_meta()?);
                *self.meta.borrow_mut() = Some(meta.clone());
                Ok(meta)
            },
        }
    }

    fn build_mult_meta(&self) -> Result<MultMeta, DistError>
    {
        let size = self.comm.size();
        let x_blocks = RowBlocks::new(self.width, size);

        let mut ghost_cols = self.col_ind.clone();
        ghost_cols.sort_unstable();
        ghost_cols.dedup();

        let entry_ghost = self.col_ind.iter().map(|c| {
            match ghost_cols.binary_search(c) {
                Ok(g) | Err(g) => g,
            }
        }).collect();

        let mut requests = vec![Vec::new(); size];
        for &c in ghost_cols.iter() {
            requests[x_blocks.owner(c)].push(c);
        }
        let recv_counts = requests.iter().map(|r| r.len()).collect();

        let asked = self.comm.alltoallv(requests)?;
        let first = x_blocks.first(self.comm.rank());
        let send_rows = asked.into_iter()
            .map(|cols| cols.into_iter().map(|c| c - first).collect())
            .collect();

        log::trace!("rank {}: {} ghost columns", self.comm.rank(), ghost_cols.len());

        Ok(MultMeta {
            ghost_cols,
            entry_ghost,
            recv_counts,
            send_rows,
        })
    }

    /// Entries of `x` (a `width x k` multi-vector) at the columns referenced by the local rows; collective.
    ///
    /// Returns the values row by row, `k` per referenced column, in ascending column order.
    pub fn ghost_values(&self, x: &DistMultiVec<L>) -> Result<Vec<L::F>, DistError>
    {
        let meta = self.mult_meta()?;
        self.exchange(&meta, x)
    }

    fn exchange(&self, meta: &MultMeta, x: &DistMultiVec<L>) -> Result<Vec<L::F>, DistError>
    {
        let k = x.width();

        let sends = meta.send_rows.iter().map(|rows| {
            let mut v = Vec::with_capacity(rows.len() * k);
            for &r in rows.iter() {
                for c in 0.. k {
                    v.push(x[(r, c)]);
                }
            }
            v
        }).collect();

        let recvs = self.comm.alltoallv(sends)?;
        let ghosts = recvs.concat();
        if ghosts.len() != meta.ghost_cols.len() * k {
            log::error!("rank {}: received {} ghost values for {} columns of width {}",
                self.comm.rank(), ghosts.len(), meta.ghost_cols.len(), k);
            return Err(DistError::DimensionMismatch);
        }

        Ok(ghosts)
    }

    // Sends per-ghost-column partial sums back to the owners of the columns,
    // which add them to `y` in rank order.
    fn reverse_exchange(&self, meta: &MultMeta, alpha: L::F, contrib: Vec<L::F>, k: usize, y: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        let mut sends = Vec::with_capacity(meta.recv_counts.len());
        let mut offset = 0;
        for &n in meta.recv_counts.iter() {
            sends.push(contrib[offset.. offset + n * k].to_vec());
            offset += n * k;
        }

        let recvs = self.comm.alltoallv(sends)?;

        for (rows, recv) in meta.send_rows.iter().zip(recvs.iter()) {
            for (idx, &r) in rows.iter().enumerate() {
                for c in 0.. k {
                    y[(r, c)] = y[(r, c)] + alpha * recv[idx * k + c];
                }
            }
        }
        Ok(())
    }
}

impl<L: LinAlg> DistOperator<L> for DistSparseMatrix<L>
{
    fn size(&self) -> (usize, usize)
    {
        (self.height(), self.width)
    }

    fn comm(&self) -> &Comm
    {
        &self.comm
    }

    fn op(&self, alpha: L::F, x: &DistMultiVec<L>, beta: L::F, y: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        check_op_operands(self, false, x, y)?;

        let meta = self.mult_meta()?;
        let ghosts = self.exchange(&meta, x)?;
        let k = x.width();

        scale_or_zero(beta, y);

        for r in 0.. self.local_height() {
            for e in self.row_ptr[r].. self.row_ptr[r + 1] {
                let a = alpha * self.vals[e];
                let g = meta.entry_ghost[e] * k;
                for c in 0.. k {
                    y[(r, c)] = y[(r, c)] + a * ghosts[g + c];
                }
            }
        }
        Ok(())
    }

    fn trans_op(&self, alpha: L::F, x: &DistMultiVec<L>, beta: L::F, y: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        check_op_operands(self, true, x, y)?;

        let meta = self.mult_meta()?;
        let k = x.width();

        let mut contrib = vec![L::F::zero(); meta.ghost_cols.len() * k];
        for r in 0.. self.local_height() {
            for e in self.row_ptr[r].. self.row_ptr[r + 1] {
                let g = meta.entry_ghost[e] * k;
                for c in 0.. k {
                    contrib[g + c] = contrib[g + c] + self.vals[e] * x[(r, c)];
                }
            }
        }

        scale_or_zero(beta, y);
        self.reverse_exchange(&meta, alpha, contrib, k, y)
    }

    fn absadd_cols(&self, tau: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        if tau.height() != self.width || tau.width() != 1 || tau.comm().size() != self.comm.size() {
            log::error!("Size mismatch: tau({}, {}) for width {}", tau.height(), tau.width(), self.width);
            return Err(DistError::DimensionMismatch);
        }

        let meta = self.mult_meta()?;

        let mut contrib = vec![L::F::zero(); meta.ghost_cols.len()];
        for (v, g) in self.vals.iter().zip(meta.entry_ghost.iter()) {
            contrib[*g] = contrib[*g] + v.abs();
        }

        self.reverse_exchange(&meta, L::F::one(), contrib, 1, tau)
    }

    fn absadd_rows(&self, sigma: &mut DistMultiVec<L>) -> Result<(), DistError>
    {
        if sigma.height() != self.height() || sigma.width() != 1 || sigma.comm().size() != self.comm.size() {
            log::error!("Size mismatch: sigma({}, {}) for height {}", sigma.height(), sigma.width(), self.height());
            return Err(DistError::DimensionMismatch);
        }

        for r in 0.. self.local_height() {
            let rng = self.row_ptr[r].. self.row_ptr[r + 1];
            sigma[(r, 0)] = sigma[(r, 0)] + L::abssum(&self.vals[rng], 1);
        }
        Ok(())
    }
}

impl<L: LinAlg> core::fmt::Display for DistSparseMatrix<L>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result
    {
        writeln!(f, "DistSparseMatrix {}x{} rank {}: rows {}..{}, {} entries, {} queued",
            self.height(), self.width, self.comm.rank(),
            self.first_local_row(), self.first_local_row() + self.local_height(),
            self.vals.len(), self.queue.len())?;

        for r in 0.. self.local_height() {
            for e in self.row_ptr[r].. self.row_ptr[r + 1] {
                writeln!(f, "  ({}, {}) {:.3e}", self.first_local_row() + r, self.col_ind[e], self.vals[e])?;
            }
        }
        Ok(())
    }
}

//

#[test]
fn test_dist_sparse1()
{
    use crate::{launch, FloatGeneric};

    type ASpMat = DistSparseMatrix<FloatGeneric<f64>>;

    let r = launch(2, |c| {
        let mut a = ASpMat::with_size(c, 4, 3).unwrap();
        a.reserve(4);
        a.queue_local_update(0, 2, 1.).unwrap();
        a.queue_local_update(0, 0, 2.).unwrap();
        a.queue_local_update(0, 2, 3.).unwrap();
        a.queue_local_update(1, 1, 4.).unwrap();
        assert!(!a.is_consistent());

        let oob_row = a.queue_local_update(2, 0, 1.).err();
        let oob_col = a.queue_local_update(0, 3, 1.).err();

        a.process_queues();
        let first = (a.row(0).unwrap().0.to_vec(), a.row(0).unwrap().1.to_vec());

        // idempotent
        a.process_queues();
        let second = (a.row(0).unwrap().0.to_vec(), a.row(0).unwrap().1.to_vec());

        // merging with committed entries
        a.queue_local_update(1, 1, 0.5).unwrap();
        a.process_queues();

        (oob_row, oob_col, first, second, a.value(1, 1).unwrap(), a.value(1, 0).unwrap(), a.num_local_entries())
    }).unwrap();

    for (oob_row, oob_col, first, second, v11, v10, nnz) in r {
        assert_eq!(oob_row, Some(DistError::OutOfBounds));
        assert_eq!(oob_col, Some(DistError::OutOfBounds));
        assert_eq!(first, (vec![0, 2], vec![2., 4.]));
        assert_eq!(first, second);
        assert_eq!(v11, 4.5);
        assert_eq!(v10, 0.);
        assert_eq!(nnz, 3);
    }
}

#[test]
fn test_dist_sparse2()
{
    use float_eq::assert_float_eq;
    use crate::{launch, FloatGeneric};

    type ASpMat = DistSparseMatrix<FloatGeneric<f64>>;
    type AVec = DistMultiVec<FloatGeneric<f64>>;

    // A(i, j) = i + 2j + 1 on a 7x5 matrix, dense
    let a_ij = |i: usize, j: usize| (i + 2 * j + 1) as f64;

    let r = launch(3, |c| {
        let mut a = ASpMat::with_size(c, 7, 5).unwrap();
        for r in 0.. a.local_height() {
            let i = a.global_row(r).unwrap();
            for j in 0.. 5 {
                a.queue_local_update(r, j, a_ij(i, j)).unwrap();
            }
        }
        a.process_queues();

        let mut x = AVec::with_size(c, 5, 1).unwrap();
        x.set_by_fn(|j, _| 1. + j as f64);
        let mut y = AVec::with_size(c, 7, 1).unwrap();
        y.fill(1.);
        a.op(2., &x, -1., &mut y).unwrap();

        let mut u = AVec::with_size(c, 7, 1).unwrap();
        u.set_by_fn(|i, _| 1. - i as f64);
        let mut v = AVec::with_size(c, 5, 1).unwrap();
        a.trans_op(1., &u, 0., &mut v).unwrap();

        let mut tau = AVec::with_size(c, 5, 1).unwrap();
        a.absadd_cols(&mut tau).unwrap();

        let bad = a.op(1., &u, 0., &mut v).err();

        (y.gather_all().unwrap(), v.gather_all().unwrap(), tau.gather_all().unwrap(), bad)
    }).unwrap();

    let mut y_ref = vec![0.; 7];
    let mut v_ref = vec![0.; 5];
    let mut tau_ref = vec![0.; 5];
    for i in 0.. 7 {
        let mut s = 0.;
        for j in 0.. 5 {
            s += a_ij(i, j) * (1. + j as f64);
            v_ref[j] += a_ij(i, j) * (1. - i as f64);
            tau_ref[j] += a_ij(i, j);
        }
        y_ref[i] = 2. * s - 1.;
    }

    for (y, v, tau, bad) in r {
        assert_float_eq!(y, y_ref, abs_all <= 1e-9);
        assert_float_eq!(v, v_ref, abs_all <= 1e-9);
        assert_float_eq!(tau, tau_ref, abs_all <= 1e-9);
        assert_eq!(bad, Some(DistError::DimensionMismatch));
    }
}

#[test]
fn test_dist_sparse3()
{
    use crate::{launch, FloatGeneric};

    type ASpMat = DistSparseMatrix<FloatGeneric<f64>>;

    let r = launch(2, |c| {
        let mut a = ASpMat::with_size(c, 6, 6).unwrap();
        a.queue_local_update(0, 0, 1.).unwrap();
        // resizing discards the pending queue
        a.resize(6, 6);
        a.process_queues();
        (a.num_local_entries(), a.is_consistent(), a.local_height(), a.to_string())
    }).unwrap();

    assert_eq!(r[0].0 + r[1].0, 0);
    assert!(r[0].1 && r[1].1);
    assert_eq!(r[0].2 + r[1].2, 6);
    assert!(r[1].3.starts_with("DistSparseMatrix 6x6 rank 1: rows 3..6, 0 entries"));
}
