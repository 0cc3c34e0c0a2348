//! Distributions

use crate::{DistError, Grid};

/// How the rows (or the columns) of a matrix are spread over a [`Grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dist
{
    /// Cyclic over the rows of the grid (matrix column).
    Mc,
    /// Cyclic over the wrapped diagonal of the grid (matrix diagonal).
    Md,
    /// Cyclic over the columns of the grid (matrix row).
    Mr,
    /// Cyclic over the grid enumerated column by column.
    Vc,
    /// Cyclic over the grid enumerated row by row.
    Vr,
    /// Replicated on every process.
    Star,
    /// Held by a single root process only.
    Circ,
}

impl Dist
{
    /// Cyclic stride of the distribution over `grid`.
    pub fn stride(self, grid: &Grid) -> usize
    {
        match self {
            Dist::Mc => grid.height(),
            Dist::Mr => grid.width(),
            Dist::Vc | Dist::Vr => grid.size(),
            Dist::Md => grid.lcm(),
            Dist::Star | Dist::Circ => 1,
        }
    }

    /// Position of this process in the distribution.
    /// 
    /// Returns `None` if this process holds no index under the distribution.
    pub fn dist_rank(self, grid: &Grid) -> Option<usize>
    {
        match self {
            Dist::Mc => Some(grid.row()),
            Dist::Mr => Some(grid.col()),
            Dist::Vc => Some(grid.vc_rank()),
            Dist::Vr => Some(grid.vr_rank()),
            Dist::Md => if grid.md_path() == 0 {Some(grid.md_path_rank())} else {None},
            Dist::Star => Some(0),
            Dist::Circ => if grid.rank() == 0 {Some(0)} else {None},
        }
    }
}

//

/// Validated pair of column and row distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistPair
{
    col: Dist,
    row: Dist,
}

impl DistPair
{
    /// Creates an instance.
    /// 
    /// Returns `Err` with [`DistError::InvalidDistribution`] for an unsupported combination.
    pub fn new(col: Dist, row: Dist) -> Result<Self, DistError>
    {
        use Dist::*;

        let valid = matches!((col, row),
            (Mc, Mr) | (Mr, Mc) |
            (Mc, Star) | (Star, Mc) |
            (Mr, Star) | (Star, Mr) |
            (Vc, Star) | (Star, Vc) |
            (Vr, Star) | (Star, Vr) |
            (Md, Star) | (Star, Md) |
            (Star, Star) | (Circ, Circ)
        );

        if valid {
            Ok(DistPair {col, row})
        }
        else {
            log::error!("unsupported distribution [{:?},{:?}]", col, row);
            Err(DistError::InvalidDistribution)
        }
    }

    pub fn col(&self) -> Dist
    {
        self.col
    }

    pub fn row(&self) -> Dist
    {
        self.row
    }

    /// Column distribution of the diagonal of a matrix distributed as this pair.
    pub fn diag_col_dist(&self) -> Dist
    {
        match (self.col, self.row) {
            (Dist::Mc, Dist::Mr) | (Dist::Mr, Dist::Mc) => Dist::Md,
            (Dist::Star, row) => row,
            (col, _) => col,
        }
    }

    /// Row distribution of the diagonal of a matrix distributed as this pair.
    pub fn diag_row_dist(&self) -> Dist
    {
        match (self.col, self.row) {
            (Dist::Mc, Dist::Mr) | (Dist::Mr, Dist::Mc) => Dist::Star,
            (Dist::Star, _) => Dist::Star,
            (_, row) => row,
        }
    }

    /// Position among the processes holding identical copies of the same local entries.
    /// 
    /// Exactly one process (redundant rank 0) of each group of replicas
    /// contributes the entries to a reduction.
    pub fn redundant_rank(&self, grid: &Grid) -> usize
    {
        let uses = |d: Dist| match d {
            Dist::Mc => (true, false),
            Dist::Mr => (false, true),
            Dist::Vc | Dist::Vr | Dist::Md | Dist::Circ => (true, true),
            Dist::Star => (false, false),
        };
        let (col_r, col_c) = uses(self.col);
        let (row_r, row_c) = uses(self.row);

        match (col_r || row_r, col_c || row_c) {
            (true, true) => 0,
            (true, false) => grid.col(),
            (false, true) => grid.row(),
            (false, false) => grid.vc_rank(),
        }
    }
}

/// Distribution after gathering (`Circ` stays, everything else becomes `Star`).
pub fn gathered_dist(dist: Dist) -> Dist
{
    match dist {
        Dist::Circ => Dist::Circ,
        _ => Dist::Star,
    }
}

/// First cyclic index owned by the process at `rank` when the distribution starts at `align`.
pub fn shift(rank: usize, align: usize, stride: usize) -> usize
{
    (rank + stride - align) % stride
}

/// Number of indices out of `n` owned by a process of cyclic `shift` with `stride`.
pub fn length(n: usize, shift: usize, stride: usize) -> usize
{
    if n > shift {
        (n - shift - 1) / stride + 1
    }
    else {
        0
    }
}

//

/// Contiguous row blocks: process `q` owns rows `[q * blocksize, (q + 1) * blocksize)`,
/// and the last process additionally takes the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBlocks
{
    height: usize,
    size: usize,
}

impl RowBlocks
{
    pub fn new(height: usize, size: usize) -> Self
    {
        assert!(size > 0);

        RowBlocks {height, size}
    }

    pub fn height(&self) -> usize
    {
        self.height
    }

    pub fn blocksize(&self) -> usize
    {
        self.height / self.size
    }

    /// First global row of `rank`.
    pub fn first(&self, rank: usize) -> usize
    {
        (rank * self.blocksize()).min(self.height)
    }

    /// Number of rows of `rank`.
    pub fn local_height(&self, rank: usize) -> usize
    {
        if rank + 1 < self.size {
            self.blocksize()
        }
        else {
            self.height - self.first(rank)
        }
    }

    /// Rank owning global row `row`.
    pub fn owner(&self, row: usize) -> usize
    {
        let bs = self.blocksize();
        if bs == 0 {
            self.size - 1
        }
        else {
            (row / bs).min(self.size - 1)
        }
    }
}

//

/// Orientation of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation
{
    Normal,
    Transpose,
    /// Same as `Transpose` over real scalars.
    Adjoint,
}

/// Norms of distributed vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormType
{
    /// Max column 1-norm.
    One,
    /// Max row 1-norm.
    Infinity,
    /// Sum of absolute values of all entries.
    EntrywiseOne,
    /// Max absolute value.
    Max,
    Frobenius,
    /// Spectral norm, supported for single columns.
    Two,
}

//

#[test]
fn test_dist1()
{
    assert_eq!(length(10, 0, 3), 4);
    assert_eq!(length(10, 1, 3), 3);
    assert_eq!(length(10, 2, 3), 3);
    assert_eq!(length(2, 2, 3), 0);
    assert_eq!(shift(0, 1, 3), 2);
    assert_eq!(shift(2, 1, 3), 1);

    for n in 0.. 20 {
        let total: usize = (0.. 4).map(|r| length(n, shift(r, 0, 4), 4)).sum();
        assert_eq!(total, n);
    }
}

#[test]
fn test_dist2()
{
    let b = RowBlocks::new(10, 3);
    assert_eq!(b.blocksize(), 3);
    assert_eq!((b.first(0), b.local_height(0)), (0, 3));
    assert_eq!((b.first(2), b.local_height(2)), (6, 4));
    assert_eq!(b.owner(9), 2);
    assert_eq!(b.owner(5), 1);

    // fewer rows than processes: all on the last one
    let b = RowBlocks::new(2, 4);
    assert_eq!(b.local_height(0), 0);
    assert_eq!(b.local_height(3), 2);
    assert_eq!(b.owner(1), 3);
    assert_eq!((0.. 4).map(|r| b.local_height(r)).sum::<usize>(), 2);
}

#[test]
fn test_dist3()
{
    use Dist::*;

    assert!(DistPair::new(Mc, Mr).is_ok());
    assert!(DistPair::new(Circ, Circ).is_ok());
    assert_eq!(DistPair::new(Mc, Mc), Err(DistError::InvalidDistribution));
    assert_eq!(DistPair::new(Vc, Vr), Err(DistError::InvalidDistribution));

    let p = DistPair::new(Mc, Mr).unwrap();
    assert_eq!((p.diag_col_dist(), p.diag_row_dist()), (Md, Star));
    let p = DistPair::new(Star, Vc).unwrap();
    assert_eq!((p.diag_col_dist(), p.diag_row_dist()), (Vc, Star));
    let p = DistPair::new(Vr, Star).unwrap();
    assert_eq!((p.diag_col_dist(), p.diag_row_dist()), (Vr, Star));

    assert_eq!(gathered_dist(Circ), Circ);
    assert_eq!(gathered_dist(Md), Star);
}
