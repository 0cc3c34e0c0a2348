//! Process grid

use crate::{Comm, DistError};

/// Ordering of ranks over a [`Grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridOrder
{
    /// Rank runs along a grid row first.
    RowMajor,
    /// Rank runs along a grid column first.
    ColumnMajor,
}

//

fn gcd(a: usize, b: usize) -> usize
{
    if b == 0 {a} else {gcd(b, a % b)}
}

/// 2-D arrangement of the processes of a group.
/// 
/// Each process owns exactly one coordinate `(row, col)`, `0 <= row < height`, `0 <= col < width`.
/// Besides the grid coordinates, each process has
/// * a VC rank, its index when the grid is enumerated column by column,
/// * a VR rank, its index when the grid is enumerated row by row,
/// * an MD path and an MD path rank, its place on the wrapped diagonals of the grid.
#[derive(Debug, Clone)]
pub struct Grid
{
    comm: Comm,
    height: usize,
    width: usize,
    order: GridOrder,
}

impl Grid
{
    /// Creates a grid of the default shape.
    /// 
    /// The height is the largest divisor of the group size not exceeding its square root.
    pub fn new(comm: &Comm, order: GridOrder) -> Result<Self, DistError>
    {
        let size = comm.size();
        let mut height = (size as f64).sqrt() as usize;
        while height > 1 && size % height != 0 {
            height -= 1;
        }

        Grid::with_height(comm, height.max(1), order)
    }

    /// Creates a grid of the given height.
    /// 
    /// Returns `Err` with [`DistError::DimensionMismatch`] unless `height` divides the group size.
    pub fn with_height(comm: &Comm, height: usize, order: GridOrder) -> Result<Self, DistError>
    {
        comm.check_initialized()?;

        let size = comm.size();
        if height == 0 || size % height != 0 {
            log::error!("grid height {} does not divide {} processes", height, size);
            return Err(DistError::DimensionMismatch);
        }

        Ok(Grid {
            comm: comm.clone(),
            height,
            width: size / height,
            order,
        })
    }

    /// Communicator of the whole grid.
    pub fn comm(&self) -> &Comm
    {
        &self.comm
    }

    pub fn order(&self) -> GridOrder
    {
        self.order
    }

    pub fn height(&self) -> usize
    {
        self.height
    }

    pub fn width(&self) -> usize
    {
        self.width
    }

    pub fn size(&self) -> usize
    {
        self.height * self.width
    }

    pub fn rank(&self) -> usize
    {
        self.comm.rank()
    }

    /// Grid coordinate of the process of rank `rank`.
    pub fn coord_of(&self, rank: usize) -> (usize, usize)
    {
        match self.order {
            GridOrder::ColumnMajor => (rank % self.height, rank / self.height),
            GridOrder::RowMajor => (rank / self.width, rank % self.width),
        }
    }

    /// Grid row of this process.
    pub fn row(&self) -> usize
    {
        self.coord_of(self.rank()).0
    }

    /// Grid column of this process.
    pub fn col(&self) -> usize
    {
        self.coord_of(self.rank()).1
    }

    pub fn vc_rank(&self) -> usize
    {
        self.row() + self.col() * self.height
    }

    pub fn vr_rank(&self) -> usize
    {
        self.col() + self.row() * self.width
    }

    pub fn gcd(&self) -> usize
    {
        gcd(self.height, self.width)
    }

    pub fn lcm(&self) -> usize
    {
        self.size() / self.gcd()
    }

    /// Index of the wrapped diagonal that this process lies on, in `0..gcd`.
    pub fn md_path(&self) -> usize
    {
        let g = self.gcd();
        (self.col() + self.height * g - self.row() % g) % g
    }

    /// Position of this process along its wrapped diagonal, in `0..lcm`.
    /// 
    /// The `k`-th process of path `p` sits at `(k mod height, (k + p) mod width)`.
    pub fn md_path_rank(&self) -> usize
    {
        let (row, col) = (self.row(), self.col());
        let path = self.md_path();

        let mut k = row;
        while (k + path) % self.width != col {
            k += self.height;
        }
        k
    }
}

//

#[test]
fn test_grid1()
{
    use crate::launch;

    let r = launch(6, |c| {
        let g = Grid::new(c, GridOrder::ColumnMajor).unwrap();
        (g.height(), g.width(), g.row(), g.col(), g.vc_rank(), g.vr_rank())
    }).unwrap();

    for (rank, (h, w, row, col, vc, vr)) in r.into_iter().enumerate() {
        assert_eq!((h, w), (2, 3));
        assert_eq!((row, col), (rank % 2, rank / 2));
        assert_eq!(vc, rank);
        assert_eq!(vr, col + row * 3);
    }
}

#[test]
fn test_grid2()
{
    use crate::launch;

    let r = launch(4, |c| {
        let g = Grid::with_height(c, 2, GridOrder::RowMajor).unwrap();
        let bad = Grid::with_height(c, 3, GridOrder::RowMajor).err();
        (g.row(), g.col(), g.md_path(), g.md_path_rank(), bad)
    }).unwrap();

    // 2x2 grid: path 0 visits (0, 0) then (1, 1)
    assert_eq!(r[0], (0, 0, 0, 0, Some(DistError::DimensionMismatch)));
    assert_eq!(r[1].0, 0);
    assert_eq!(r[1].1, 1);
    assert_eq!(r[3].2, 0);
    assert_eq!(r[3].3, 1);
}
