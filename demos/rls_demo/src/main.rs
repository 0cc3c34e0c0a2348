use num_traits::Num;
use bunsan::prelude::*;
use bunsan::{rls, least_squares, SocpAffineCtrl, LeastSquaresCtrl, SolveStatus};
use bunsan_core::{copy, multiply, nrm2, gaussian, Timer};

use anyhow::Result;

type La = FloatGeneric<f64>;
type ADistSparseMatrix = DistSparseMatrix<La>;
type ADistMultiVec = DistMultiVec<La>;

fn num_by_env<N: Num + std::fmt::Display>(e: &str) -> Option<N>
{
    if let Some(v) = std::env::var(e).ok()
                     .and_then(|s| {N::from_str_radix(&s, 10).ok()}) {
        log::info!("{}: {}", e, v);
        Some(v)
    }
    else {
        None
    }
}

/// problem size and parameters
#[derive(Debug, Clone)]
struct DemoParam
{
    num_procs: usize,
    height: usize,
    width: usize,
    rho: f64,
    max_iter: Option<usize>,
    tolerance: Option<f64>,
}

impl Default for DemoParam
{
    fn default() -> Self
    {
        DemoParam {
            num_procs: 2,
            height: 6000,
            width: 4000,
            rho: 10.,
            max_iter: None,
            tolerance: None,
        }
    }
}

fn set_par_by_env(p: &mut DemoParam)
{
    p.num_procs = num_by_env("NUM_PROCS").unwrap_or(p.num_procs);
    p.height = num_by_env("HEIGHT").unwrap_or(p.height);
    p.width = num_by_env("WIDTH").unwrap_or(p.width);
    p.rho = num_by_env("RHO").unwrap_or(p.rho);
    p.max_iter = num_by_env("MAX_ITER").or(p.max_iter);
    p.tolerance = num_by_env("TOLERANCE").or(p.tolerance);
}

/// banded rectangle with a dense last column
fn rectang(comm: &Comm, height: usize, width: usize) -> Result<ADistSparseMatrix, DistError>
{
    let mut a = ADistSparseMatrix::with_size(comm, height, width)?;
    let local_height = a.local_height();
    a.reserve(5 * local_height);

    for r in 0.. local_height {
        let s = a.global_row(r)?;
        if s < width {
            a.queue_local_update(r, s, 11.)?;
        }
        if s >= 1 && s - 1 < width {
            a.queue_local_update(r, s - 1, -1.)?;
        }
        if s + 1 < width {
            a.queue_local_update(r, s + 1, 2.)?;
        }
        if s >= height && s - height < width {
            a.queue_local_update(r, s - height, -3.)?;
        }
        if s + height < width {
            a.queue_local_update(r, s + height, 4.)?;
        }
        a.queue_local_update(r, width - 1, -5. / height as f64)?;
    }
    a.process_queues();

    Ok(a)
}

/// residual norm ||b - A x||
fn residual(a: &ADistSparseMatrix, x: &ADistMultiVec, b: &ADistMultiVec) -> Result<f64, DistError>
{
    let mut e = ADistMultiVec::new(b.comm())?;
    copy(b, &mut e)?;
    multiply(Orientation::Normal, -1., a, x, 1., &mut e)?;
    nrm2(&e)
}

fn run(comm: &Comm, par: &DemoParam) -> Result<(), DistError>
{
    let root = comm.rank() == 0;

    //----- make problem

    let a = rectang(comm, par.height, par.width)?;

    let mut b = ADistMultiVec::new(comm)?;
    gaussian(&mut b, par.height, 1, 0., 1., 10000)?;
    let norm_b = nrm2(&b)?;
    if root {
        println!("|| b ||_2 = {:.6e}", norm_b);
    }

    //----- solve RLS

    let ctrl = SocpAffineCtrl::new().par(|p| {
        p.mehrotra.progress = true;
        p.mehrotra.time = true;
        if let Some(max_iter) = par.max_iter {
            p.mehrotra.max_iter = max_iter;
        }
        if let Some(tolerance) = par.tolerance {
            p.mehrotra.tolerance = tolerance;
        }
    });

    let mut timer = Timer::new("rls");
    timer.start();
    let sol = rls(&a, &b, par.rho, &ctrl)?;
    let sec = timer.stop();

    let rls_res = residual(&a, &sol.x, &b)?;
    if root {
        if sol.status == SolveStatus::MaxIterExceeded {
            println!("RLS stopped at max iterations {}", sol.iterations);
        }
        println!("RLS time: {:.3e} s, {} iterations", sec, sol.iterations);
        println!("|| b - A x ||_2 = {:.6e}", rls_res);
        println!("|| b - A x ||_2 / || b ||_2 = {:.6e}", rls_res / norm_b);
    }

    //----- solve LS

    let ls_ctrl = LeastSquaresCtrl::new().par(|p| {
        p.progress = true;
        p.time = true;
    });
    let x_ls = least_squares(&a, &b, &ls_ctrl)?;

    let ls_res = residual(&a, &x_ls, &b)?;
    if root {
        println!("|| b - A x_ls ||_2 = {:.6e}", ls_res);
        println!("|| b - A x_ls ||_2 / || b ||_2 = {:.6e}", ls_res / norm_b);
    }

    Ok(())
}

/// main
fn main() -> Result<()> {
    env_logger::init();

    let mut par = DemoParam::default();
    set_par_by_env(&mut par);
    log::debug!("{:?}", par);

    let rslt = launch(par.num_procs, |comm| run(comm, &par))?;
    for r in rslt {
        r?;
    }

    Ok(())
}
