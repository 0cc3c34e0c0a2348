//! Random fills

use num_traits::NumCast;
use rand::prelude::*;
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256StarStar;
use crate::{LinAlg, DistError, DistMultiVec};

// Draws the whole global sequence on every process and keeps the local rows,
// so that the content does not depend on the number of processes.
fn fill_by_rng<L, G>(v: &mut DistMultiVec<L>, height: usize, width: usize, seed: u64, mut sample: G) -> Result<(), DistError>
where L: LinAlg, G: FnMut(&mut Xoshiro256StarStar) -> f64
{
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);

    v.resize(height, width);
    let first = v.first_local_row();
    let lh = v.local_height();

    for c in 0.. width {
        for r in 0.. height {
            let s = sample(&mut rng);
            if r >= first && r < first + lh {
                v[(r - first, c)] = <L::F as NumCast>::from(s).ok_or(DistError::NumericalFailure)?;
            }
        }
    }
    Ok(())
}

/// Resizes `v` to `height x width` and fills it with normally distributed entries.
/// 
/// * `mean` and `stddev` are of the normal distribution.
/// * `seed` determines the content independently of the number of processes.
pub fn gaussian<L: LinAlg>(v: &mut DistMultiVec<L>, height: usize, width: usize, mean: f64, stddev: f64, seed: u64) -> Result<(), DistError>
{
    if !(stddev >= 0.) {
        log::error!("negative standard deviation {}", stddev);
        return Err(DistError::InvalidParameter);
    }

    fill_by_rng(v, height, width, seed, |rng| {
        let z: f64 = rng.sample(StandardNormal);
        mean + stddev * z
    })
}

/// Resizes `v` to `height x width` and fills it with entries uniformly distributed
/// over `[center - radius, center + radius)`.
pub fn uniform<L: LinAlg>(v: &mut DistMultiVec<L>, height: usize, width: usize, center: f64, radius: f64, seed: u64) -> Result<(), DistError>
{
    if !(radius >= 0.) {
        log::error!("negative radius {}", radius);
        return Err(DistError::InvalidParameter);
    }

    fill_by_rng(v, height, width, seed, |rng| {
        let u: f64 = rng.gen();
        center + radius * (2. * u - 1.)
    })
}

//

#[test]
fn test_random1()
{
    use crate::{launch, FloatGeneric};

    type AVec = DistMultiVec<FloatGeneric<f64>>;

    let gathered: Vec<Vec<f64>> = [1, 3].iter().map(|&p| {
        launch(p, |c| {
            let mut b = AVec::new(c).unwrap();
            gaussian(&mut b, 50, 2, 0., 1., 1).unwrap();
            b.gather_all().unwrap()
        }).unwrap().remove(0)
    }).collect();

    assert_eq!(gathered[0], gathered[1]);
    assert_eq!(gathered[0].len(), 100);
    let mean = gathered[0].iter().sum::<f64>() / 100.;
    assert!(mean.abs() < 0.5);

    let u = launch(2, |c| {
        let mut u = AVec::new(c).unwrap();
        uniform(&mut u, 30, 1, 5., 1., 7).unwrap();
        let bad = uniform(&mut u, 30, 1, 5., -1., 7).err();
        (u.gather_all().unwrap(), bad)
    }).unwrap();

    assert!(u[0].0.iter().all(|x| *x >= 4. && *x < 6.));
    assert_eq!(u[0].1, Some(DistError::InvalidParameter));
}
