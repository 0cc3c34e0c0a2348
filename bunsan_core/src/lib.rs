/*!
Process group, process grid and distributed matrix store for the `bunsan` solver.

A group of cooperating processes is an [`Environment`]; each process works with a [`Comm`] handle
and owns a part of every distributed object:
* [`DistSparseMatrix`] - sparse rows in contiguous blocks, assembled through a staging queue,
* [`DistMultiVec`] - dense vectors (or several of them) in the same row blocks,
* [`DistMatrix`] - dense matrices spread element-cyclically over a [`Grid`].

The kernels [`copy`], [`multiply`], [`nrm2`] and their relatives are collective:
every process of the group calls them in the same order.

```
use bunsan_core::*;

type La = FloatGeneric<f64>;

let norms = launch(2, |comm| -> Result<f64, DistError> {
    let mut a = DistSparseMatrix::<La>::with_size(comm, 4, 4)?;
    for r in 0.. a.local_height() {
        let i = a.global_row(r)?;
        a.queue_local_update(r, i, 2.)?;
    }
    a.process_queues();

    let mut x = DistMultiVec::<La>::with_size(comm, 4, 1)?;
    x.fill(1.);
    let mut y = DistMultiVec::<La>::new(comm)?;
    copy(&x, &mut y)?;
    multiply(Orientation::Normal, 1., &a, &x, -1., &mut y)?;

    nrm2(&y)
}).unwrap();

assert_eq!(norms, vec![Ok(2.), Ok(2.)]);
```
*/

mod dist_error;

pub use dist_error::*;

//

mod linalg;
mod linalg_ex;
mod floatgeneric;

pub use linalg::*;
pub use linalg_ex::*;
pub use floatgeneric::*;

//

mod environment;
mod comm;
mod grid;
mod dist;

pub use environment::*;
pub use comm::*;
pub use grid::*;
pub use dist::*;

//

mod operator;
mod dist_multivec;
mod dist_sparse;
mod dist_matrix;

pub use operator::{DistOperator, check_op_operands};
pub use dist_multivec::*;
pub use dist_sparse::*;
pub use dist_matrix::*;

//

mod blas;
mod safe_product;
mod timer;
mod random;

pub use blas::*;
pub use safe_product::*;
pub use timer::*;
pub use random::*;
