//! Process group environment

use std::any::Any;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use crate::{Comm, DistError};

const STATE_NEW: u8 = 0;
const STATE_INITIALIZED: u8 = 1;
const STATE_FINALIZED: u8 = 2;

//

pub(crate) struct SyncState
{
    pub(crate) arrived: usize,
    pub(crate) generation: u64,
    pub(crate) departed: usize,
    pub(crate) aborted: bool,
}

pub(crate) struct Shared
{
    pub(crate) size: usize,
    pub(crate) timeout: Option<Duration>,
    pub(crate) epoch: Instant,
    state: AtomicU8,
    pub(crate) sync: Mutex<SyncState>,
    pub(crate) cond: Condvar,
    pub(crate) slots: Vec<Mutex<Option<Box<dyn Any + Send>>>>,
}

impl Shared
{
    pub(crate) fn initialized(&self) -> bool
    {
        self.state.load(Ordering::Acquire) == STATE_INITIALIZED
    }

    pub(crate) fn lock_sync(&self) -> Result<MutexGuard<'_, SyncState>, DistError>
    {
        self.sync.lock().map_err(|_| DistError::CollectiveDeadlock)
    }

    fn reset(&self) -> Result<(), DistError>
    {
        let mut st = self.lock_sync()?;
        st.arrived = 0;
        st.departed = 0;
        st.aborted = false;
        for slot in self.slots.iter() {
            *slot.lock().map_err(|_| DistError::CollectiveDeadlock)? = None;
        }
        Ok(())
    }
}

// Marks the owning process as gone from the group when its closure returns or unwinds.
struct Departure<'a>(&'a Shared);

impl<'a> Drop for Departure<'a>
{
    fn drop(&mut self)
    {
        let mut st = match self.0.sync.lock() {
            Ok(st) => st,
            Err(poisoned) => poisoned.into_inner(),
        };
        st.departed += 1;
        if std::thread::panicking() {
            st.aborted = true;
        }
        self.0.cond.notify_all();
    }
}

//

/// Process group environment.
/// 
/// A group of `size` cooperating processes, each of which runs as an OS thread
/// and talks to its peers only through the collectives of [`Comm`].
/// 
/// The lifecycle is `new` → [`Environment::initialize`] → [`Environment::run`] (any number of times)
/// → [`Environment::finalize`].
/// Both `initialize` and `finalize` are idempotent, and dropping the environment finalizes it.
pub struct Environment
{
    shared: Arc<Shared>,
    running: Mutex<()>,
}

impl Environment
{
    /// Creates an instance.
    /// 
    /// Returns [`Environment`] instance, or `Err` with [`DistError::InvalidParameter`] if `size` is zero.
    /// * `size` is the number of processes.
    pub fn new(size: usize) -> Result<Self, DistError>
    {
        if size == 0 {
            log::error!("Process group size must be positive");
            return Err(DistError::InvalidParameter);
        }

        let shared = Shared {
            size,
            timeout: None,
            epoch: Instant::now(),
            state: AtomicU8::new(STATE_NEW),
            sync: Mutex::new(SyncState {
                arrived: 0,
                generation: 0,
                departed: 0,
                aborted: false,
            }),
            cond: Condvar::new(),
            slots: (0.. size).map(|_| Mutex::new(None)).collect(),
        };

        Ok(Environment {
            shared: Arc::new(shared),
            running: Mutex::new(()),
        })
    }

    /// Sets a time limit for every wait inside a collective.
    /// 
    /// Returns [`Environment`] whose collectives fail with [`DistError::CollectiveDeadlock`]
    /// instead of blocking longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self
    {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.timeout = Some(timeout),
            None => log::warn!("timeout ignored: environment is in use"),
        }
        self
    }

    /// Initializes the environment.
    /// 
    /// Calling this on an initialized environment does nothing.
    /// Returns `Err` with [`DistError::NotInitialized`] if the environment was already finalized.
    pub fn initialize(&self) -> Result<(), DistError>
    {
        match self.shared.state.compare_exchange(STATE_NEW, STATE_INITIALIZED, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                log::debug!("environment of {} processes initialized", self.shared.size);
                Ok(())
            },
            Err(STATE_INITIALIZED) => Ok(()),
            Err(_) => {
                log::error!("environment cannot be initialized after finalized");
                Err(DistError::NotInitialized)
            },
        }
    }

    /// Finalizes the environment.
    /// 
    /// Calling this more than once does nothing.
    pub fn finalize(&self)
    {
        if self.shared.state.swap(STATE_FINALIZED, Ordering::AcqRel) == STATE_INITIALIZED {
            log::debug!("environment finalized");
        }
    }

    /// Returns `true` if initialized and not yet finalized.
    pub fn initialized(&self) -> bool
    {
        self.shared.initialized()
    }

    /// Returns `true` if finalized.
    pub fn finalized(&self) -> bool
    {
        self.shared.state.load(Ordering::Acquire) == STATE_FINALIZED
    }

    /// Number of processes.
    pub fn size(&self) -> usize
    {
        self.shared.size
    }

    /// Runs `f` on every process of the group and waits for all of them.
    /// 
    /// Returns `Ok` with the results ordered by rank,
    /// or `Err` with [`DistError::NotInitialized`] if the environment is not initialized.
    /// A panic in any process is resumed on the caller after every process has finished;
    /// the peers observe [`DistError::CollectiveDeadlock`] from their pending collectives meanwhile.
    pub fn run<R, F>(&self, f: F) -> Result<Vec<R>, DistError>
    where R: Send, F: Fn(&Comm) -> R + Sync
    {
        if !self.initialized() {
            log::error!("run on an environment that is not initialized");
            return Err(DistError::NotInitialized);
        }

        let _running = self.running.lock().map_err(|_| DistError::CollectiveDeadlock)?;
        self.shared.reset()?;

        let f = &f;
        let joined = std::thread::scope(|s| {
            let handles: Vec<_> = (0.. self.shared.size).map(|rank| {
                let comm = Comm::new(rank, Arc::clone(&self.shared));
                s.spawn(move || {
                    let _departure = Departure(comm.shared());
                    f(&comm)
                })
            }).collect();

            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        });

        let mut results = Vec::with_capacity(joined.len());
        for r in joined {
            match r {
                Ok(v) => results.push(v),
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
        Ok(results)
    }
}

impl Drop for Environment
{
    fn drop(&mut self)
    {
        self.finalize();
    }
}

//

/// Creates, initializes, runs and finalizes an [`Environment`] of `size` processes.
/// 
/// Returns `Ok` with the results of `f` ordered by rank.
pub fn launch<R, F>(size: usize, f: F) -> Result<Vec<R>, DistError>
where R: Send, F: Fn(&Comm) -> R + Sync
{
    let env = Environment::new(size)?;
    env.initialize()?;
    let results = env.run(f);
    env.finalize();
    results
}

//

#[test]
fn test_environment1()
{
    let env = Environment::new(3).unwrap();
    assert!(!env.initialized());
    assert_eq!(env.run(|c| c.rank()), Err(DistError::NotInitialized));

    env.initialize().unwrap();
    env.initialize().unwrap();
    assert!(env.initialized());

    let ranks = env.run(|c| (c.world_rank(), c.world_size())).unwrap();
    assert_eq!(ranks, vec![(0, 3), (1, 3), (2, 3)]);

    env.finalize();
    env.finalize();
    assert!(!env.initialized());
    assert!(env.finalized());
    assert_eq!(env.initialize(), Err(DistError::NotInitialized));
    assert_eq!(env.run(|c| c.rank()), Err(DistError::NotInitialized));
}

#[test]
fn test_environment2()
{
    assert_eq!(Environment::new(0).err(), Some(DistError::InvalidParameter));

    let r = launch(1, |c| c.barrier()).unwrap();
    assert_eq!(r, vec![Ok(())]);
}

#[test]
fn test_environment3()
{
    use crate::{DistMultiVec, FloatGeneric};

    type AVec = DistMultiVec<FloatGeneric<f64>>;

    let _ = env_logger::builder().is_test(true).try_init();

    let env = Environment::new(2).unwrap();
    env.initialize().unwrap();

    // handles kept beyond the lifetime of the group
    let comms = env.run(|c| c.clone()).unwrap();
    assert!(AVec::with_size(&comms[0], 2, 1).is_ok());

    env.finalize();
    for c in comms.iter() {
        assert!(!c.initialized());
        assert_eq!(AVec::with_size(c, 2, 1).err(), Some(DistError::NotInitialized));
    }
}
