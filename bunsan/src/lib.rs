/*!
Bunsan ([分散](https://www.decodeunicode.org/en/u+5206) in Japanese) means distributed.

<script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
<script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>

This crate for Rust provides **least squares and regularized least squares** of a sparse matrix
whose rows are distributed over a group of processes by [`bunsan_core`].

# General usage

1. Start a process group by [`bunsan_core::launch`] (or [`bunsan_core::Environment`]);
   the rest runs on every process with its [`bunsan_core::Comm`].
1. Assemble \\(A\\) as a [`bunsan_core::DistSparseMatrix`]:
   each process queues entries of its own rows and commits them by `process_queues`.
1. Put \\(b\\) into a [`bunsan_core::DistMultiVec`] of the same height.
1. Call [`least_squares`] for \\(\min \\|A x - b\\|_2\\)
   or [`rls`] for \\(\min \\|A x - b\\|_2^2 + \rho \\|x\\|_2^2\\), optionally changing the controls.
   Both are collective: every process calls them with its own parts.

# Examples

```
use float_eq::assert_float_eq;
use bunsan::prelude::*;
use bunsan::*;

//env_logger::init(); // Use any logger crate as `bunsan` uses `log` crate.

type La = FloatGeneric<f64>;

let rslt = launch(2, |comm| -> Result<Vec<f64>, DistError> {
    // A = [[1, 0], [0, 1], [1, 1]], b = (1, 1, 1)
    let mut a = DistSparseMatrix::<La>::with_size(comm, 3, 2)?;
    for r in 0.. a.local_height() {
        let i = a.global_row(r)?;
        if i < 2 {
            a.queue_local_update(r, i, 1.)?;
        }
        else {
            a.queue_local_update(r, 0, 1.)?;
            a.queue_local_update(r, 1, 1.)?;
        }
    }
    a.process_queues();

    let mut b = DistMultiVec::<La>::with_size(comm, 3, 1)?;
    b.fill(1.);

    let ctrl = SocpAffineCtrl::new().par(|p| {
        p.mehrotra.max_iter = 50;
    });
    // (A^T A + I) x = A^T b
    let sol = rls(&a, &b, 1., &ctrl)?;
    sol.into_converged()?.gather_all()
}).unwrap();

for x in rslt {
    assert_float_eq!(x.unwrap().as_slice(), [0.5, 0.5].as_slice(), abs_all <= 1e-4);
}
```
*/

mod ctrl;

pub use ctrl::*;

//

mod qsd;
mod dist_qsd;
mod cone_soc;

pub use qsd::*;
pub use dist_qsd::*;
pub use cone_soc::*;

//

mod least_squares;
mod rls;

pub use least_squares::*;
pub use rls::*;

//

/// Prelude
pub mod prelude
{
    pub use bunsan_core::{launch, Environment, Comm, DistError, FloatGeneric};
    pub use bunsan_core::{DistSparseMatrix, DistMultiVec, DistMatrix, Orientation};
}
