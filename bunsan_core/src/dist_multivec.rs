use num_traits::Zero;
use core::ops::{Index, IndexMut};
use crate::{LinAlg, Comm, DistError, RowBlocks};

/// Distributed multi-vector
/// 
/// A `height x width` matrix whose rows are split into contiguous blocks over the processes
/// of a group (see [`RowBlocks`]); each process stores its rows in column-major.
/// The row blocks are the same as those of a [`crate::DistSparseMatrix`] of equal height,
/// so a sparse matrix and a multi-vector of its height are aligned row by row.
#[derive(Clone)]
pub struct DistMultiVec<L: LinAlg>
{
    comm: Comm,
    blocks: RowBlocks,
    width: usize,
    buf: Vec<L::F>,
}

impl<L: LinAlg> DistMultiVec<L>
{
    /// Creates an empty `0 x 0` instance.
    /// 
    /// Returns `Err` with [`DistError::NotInitialized`] outside of an initialized environment.
    pub fn new(comm: &Comm) -> Result<Self, DistError>
    {
        Self::with_size(comm, 0, 0)
    }

    /// Creates a zero-filled `height x width` instance.
    pub fn with_size(comm: &Comm, height: usize, width: usize) -> Result<Self, DistError>
    {
        comm.check_initialized()?;

        let blocks = RowBlocks::new(height, comm.size());
        let local_height = blocks.local_height(comm.rank());

        Ok(DistMultiVec {
            comm: comm.clone(),
            blocks,
            width,
            buf: vec![L::F::zero(); local_height * width],
        })
    }

    /// Creates an instance from the local part of each process.
    /// 
    /// * `local` is the column-major local part, of length `local_height * width`.
    pub fn from_parts(comm: &Comm, height: usize, width: usize, local: Vec<L::F>) -> Result<Self, DistError>
    {
        let mut v = Self::new(comm)?;
        v.blocks = RowBlocks::new(height, comm.size());

        if local.len() != v.blocks.local_height(comm.rank()) * width {
            log::error!("local part length {} does not match {}x{}", local.len(), v.blocks.local_height(comm.rank()), width);
            return Err(DistError::DimensionMismatch);
        }

        v.width = width;
        v.buf = local;
        Ok(v)
    }

    /// Creates a deep copy of `other`.
    pub fn from_existing(other: &Self) -> Self
    {
        other.clone()
    }

    /// Reallocates as a zero-filled `height x width` instance.
    pub fn resize(&mut self, height: usize, width: usize)
    {
        self.blocks = RowBlocks::new(height, self.comm.size());
        self.width = width;
        self.buf.clear();
        self.buf.resize(self.local_height() * width, L::F::zero());
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

    /// Number of rows stored by this process.
    pub fn local_height(&self) -> usize
    {
        self.blocks.local_height(self.comm.rank())
    }

    /// Global index of the first row stored by this process.
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

    /// Local row of the global row `row`, or `None` if another process owns it.
    pub fn local_row(&self, row: usize) -> Option<usize>
    {
        let first = self.first_local_row();
        if row >= first && row < first + self.local_height() {
            Some(row - first)
        }
        else {
            None
        }
    }

    /// Returns `true` if `other` has the same shape over a group of the same size.
    pub fn same_layout(&self, other: &Self) -> bool
    {
        self.comm.size() == other.comm.size() && self.height() == other.height() && self.width == other.width
    }

    fn check_local(&self, local_row: usize, col: usize) -> Result<usize, DistError>
    {
        if local_row < self.local_height() && col < self.width {
            Ok(col * self.local_height() + local_row)
        }
        else {
            log::error!("local index ({}, {}) out of {}x{}", local_row, col, self.local_height(), self.width);
            Err(DistError::OutOfBounds)
        }
    }

    pub fn get_local(&self, local_row: usize, col: usize) -> Result<L::F, DistError>
    {
        let i = self.check_local(local_row, col)?;
        Ok(self.buf[i])
    }

    pub fn set_local(&mut self, local_row: usize, col: usize, value: L::F) -> Result<(), DistError>
    {
        let i = self.check_local(local_row, col)?;
        self.buf[i] = value;
        Ok(())
    }

    pub fn update_local(&mut self, local_row: usize, col: usize, value: L::F) -> Result<(), DistError>
    {
        let i = self.check_local(local_row, col)?;
        self.buf[i] = self.buf[i] + value;
        Ok(())
    }

    /// Reads an entry by its global index; collective.
    /// 
    /// Returns the same value on every process.
    pub fn get_global(&self, row: usize, col: usize) -> Result<L::F, DistError>
    {
        let owner = self.row_owner(row)?;
        if col >= self.width {
            log::error!("column {} out of {}", col, self.width);
            return Err(DistError::OutOfBounds);
        }

        let mut value = match self.local_row(row) {
            Some(r) => self[(r, col)],
            None => L::F::zero(),
        };
        self.comm.broadcast(owner, &mut value)?;
        Ok(value)
    }

    /// Sets every local entry by a function of its global index `(row, col)`.
    pub fn set_by_fn<M>(&mut self, mut func: M)
    where M: FnMut(usize, usize) -> L::F
    {
        let first = self.first_local_row();
        let lh = self.local_height();
        for c in 0.. self.width {
            for r in 0.. lh {
                self.buf[c * lh + r] = func(first + r, c);
            }
        }
    }

    /// Sets every local entry to `value`.
    pub fn fill(&mut self, value: L::F)
    {
        for u in self.buf.iter_mut() {
            *u = value;
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

    /// Local part of the column `col`.
    pub fn local_col(&self, col: usize) -> &[L::F]
    {
        let lh = self.local_height();
        &self.buf[col * lh.. (col + 1) * lh]
    }

    pub fn local_col_mut(&mut self, col: usize) -> &mut [L::F]
    {
        let lh = self.local_height();
        &mut self.buf[col * lh.. (col + 1) * lh]
    }

    /// Extracts the column `col` as a `height x 1` instance.
    pub fn column(&self, col: usize) -> Result<Self, DistError>
    {
        if col >= self.width {
            log::error!("column {} out of {}", col, self.width);
            return Err(DistError::OutOfBounds);
        }

        Self::from_parts(&self.comm, self.height(), 1, self.local_col(col).to_vec())
    }

    /// Overwrites the column `col` with a `height x 1` instance `v`.
    pub fn set_column(&mut self, col: usize, v: &Self) -> Result<(), DistError>
    {
        if col >= self.width {
            log::error!("column {} out of {}", col, self.width);
            return Err(DistError::OutOfBounds);
        }
        if v.width != 1 || v.height() != self.height() || v.comm.size() != self.comm.size() {
            log::error!("column of {}x{} does not fit {}x{}", v.height(), v.width, self.height(), self.width);
            return Err(DistError::DimensionMismatch);
        }

        L::copy(v.local_buf(), self.local_col_mut(col));
        Ok(())
    }

    /// Gathers the whole multi-vector to every process; collective.
    /// 
    /// Returns the global content in column-major.
    pub fn gather_all(&self) -> Result<Vec<L::F>, DistError>
    {
        let parts = self.comm.allgather(self.buf.clone())?;

        let h = self.height();
        let mut all = vec![L::F::zero(); h * self.width];
        for (q, part) in parts.iter().enumerate() {
            let first = self.blocks.first(q);
            let lh = self.blocks.local_height(q);
            for c in 0.. self.width {
                all[c * h + first.. c * h + first + lh].copy_from_slice(&part[c * lh.. (c + 1) * lh]);
            }
        }
        Ok(all)
    }
}

impl<L: LinAlg> Index<(usize, usize)> for DistMultiVec<L>
{
    type Output = L::F;

    /// Local entry `(local_row, col)`.
    fn index(&self, (r, c): (usize, usize)) -> &Self::Output
    {
        assert!(r < self.local_height() && c < self.width);

        &self.buf[c * self.local_height() + r]
    }
}

impl<L: LinAlg> IndexMut<(usize, usize)> for DistMultiVec<L>
{
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut Self::Output
    {
        assert!(r < self.local_height() && c < self.width);

        let lh = self.local_height();
        &mut self.buf[c * lh + r]
    }
}

impl<L: LinAlg> core::fmt::Display for DistMultiVec<L>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result
    {
        writeln!(f, "DistMultiVec {}x{} rank {}: rows {}..{}",
            self.height(), self.width, self.comm.rank(),
            self.first_local_row(), self.first_local_row() + self.local_height())?;

        for r in 0.. self.local_height() {
            write!(f, "  {}:", self.first_local_row() + r)?;
            for c in 0.. self.width {
                write!(f, " {:.3e}", self[(r, c)])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

//

#[test]
fn test_dist_multivec1()
{
    use crate::{launch, FloatGeneric};

    type AVec = DistMultiVec<FloatGeneric<f64>>;

    let r = launch(3, |c| {
        let mut v = AVec::with_size(c, 10, 2).unwrap();
        v.set_by_fn(|r, c| (r * 10 + c) as f64);

        let all = v.gather_all().unwrap();
        let g = v.get_global(7, 1).unwrap();
        let col = v.column(1).unwrap();

        (v.local_height(), v.first_local_row(), all, g, col.local_buf().to_vec(), v.get_local(v.local_height(), 0).err())
    }).unwrap();

    let total: usize = r.iter().map(|t| t.0).sum();
    assert_eq!(total, 10);
    assert_eq!((r[0].0, r[0].1), (3, 0));
    assert_eq!((r[2].0, r[2].1), (4, 6));

    for (_, first, all, g, col, oob) in r.iter() {
        assert_eq!(all[3], 30.);
        assert_eq!(all[10 + 9], 91.);
        assert_eq!(*g, 71.);
        assert_eq!(col[0], (first * 10 + 1) as f64);
        assert_eq!(*oob, Some(DistError::OutOfBounds));
    }
}

#[test]
fn test_dist_multivec2()
{
    use crate::{launch, FloatGeneric};

    type AVec = DistMultiVec<FloatGeneric<f64>>;

    let r = launch(2, |c| {
        let bad = AVec::from_parts(c, 5, 1, vec![0.; 9]).err();

        let lh = if c.rank() == 0 {2} else {3};
        let mut v = AVec::from_parts(c, 5, 1, vec![1.; lh]).unwrap();
        v.update_local(0, 0, 1.).unwrap();
        let s = v.to_string();

        v.resize(4, 3);
        (bad, s, v.local_height(), v.local_buf().iter().all(|u| *u == 0.))
    }).unwrap();

    assert_eq!(r[0].0, Some(DistError::DimensionMismatch));
    assert!(r[1].1.starts_with("DistMultiVec 5x1 rank 1: rows 2..5"));
    assert_eq!(r[0].2 + r[1].2, 4);
    assert!(r[0].3 && r[1].3);
}
