//! Communicator

use std::sync::Arc;
use std::time::Instant;
use crate::DistError;
use crate::environment::{Shared, SyncState};

/// Handle of one process in its process group.
/// 
/// Every collective must be called by all processes of the group in the same order,
/// otherwise the group deadlocks.
/// Here the group detects that a peer has left (returned or panicked) or that a wait exceeded
/// the environment timeout, and fails the collective with [`DistError::CollectiveDeadlock`].
/// Results of collectives are combined in rank order so that they do not depend on timing.
#[derive(Clone)]
pub struct Comm
{
    rank: usize,
    shared: Arc<Shared>,
}

impl Comm
{
    pub(crate) fn new(rank: usize, shared: Arc<Shared>) -> Self
    {
        Comm {
            rank, shared,
        }
    }

    pub(crate) fn shared(&self) -> &Shared
    {
        &self.shared
    }

    /// Rank of this process in the group.
    pub fn rank(&self) -> usize
    {
        self.rank
    }

    /// Number of processes in the group.
    pub fn size(&self) -> usize
    {
        self.shared.size
    }

    /// Rank of this process in the whole environment.
    pub fn world_rank(&self) -> usize
    {
        self.rank
    }

    /// Number of processes in the whole environment.
    pub fn world_size(&self) -> usize
    {
        self.shared.size
    }

    /// Returns `true` if the environment is initialized and not yet finalized.
    pub fn initialized(&self) -> bool
    {
        self.shared.initialized()
    }

    /// Returns `Err` with [`DistError::NotInitialized`] unless [`Comm::initialized`].
    pub fn check_initialized(&self) -> Result<(), DistError>
    {
        if self.initialized() {
            Ok(())
        }
        else {
            log::error!("rank {}: environment is not initialized", self.rank);
            Err(DistError::NotInitialized)
        }
    }

    /// Monotonic wall-clock time in seconds since the environment was created.
    pub fn time(&self) -> f64
    {
        self.shared.epoch.elapsed().as_secs_f64()
    }

    fn deadlock(&self, st: &mut SyncState) -> DistError
    {
        st.aborted = true;
        self.shared.cond.notify_all();
        log::error!("rank {}: collective deadlock", self.rank);
        DistError::CollectiveDeadlock
    }

    /// Blocks until every process of the group has reached the barrier.
    pub fn barrier(&self) -> Result<(), DistError>
    {
        let sh = &self.shared;
        let mut st = sh.lock_sync()?;

        if st.aborted || st.departed > 0 {
            return Err(self.deadlock(&mut st));
        }

        st.arrived += 1;
        if st.arrived == sh.size {
            st.arrived = 0;
            st.generation = st.generation.wrapping_add(1);
            sh.cond.notify_all();
            return Ok(());
        }

        let generation = st.generation;
        let deadline = sh.timeout.map(|t| Instant::now() + t);
        loop {
            st = match deadline {
                None => {
                    sh.cond.wait(st).map_err(|_| DistError::CollectiveDeadlock)?
                },
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(self.deadlock(&mut st));
                    }
                    sh.cond.wait_timeout(st, deadline - now).map_err(|_| DistError::CollectiveDeadlock)?.0
                },
            };

            if st.generation != generation {
                return Ok(());
            }
            if st.aborted || st.departed > 0 {
                return Err(self.deadlock(&mut st));
            }
        }
    }

    fn put<T: Send + 'static>(&self, value: T) -> Result<(), DistError>
    {
        let mut slot = self.shared.slots[self.rank].lock().map_err(|_| DistError::CollectiveDeadlock)?;
        *slot = Some(Box::new(value));
        Ok(())
    }

    fn peek<T: 'static, R, G>(&self, rank: usize, g: G) -> Result<R, DistError>
    where G: FnOnce(&T) -> R
    {
        let slot = self.shared.slots[rank].lock().map_err(|_| DistError::CollectiveDeadlock)?;
        match slot.as_ref().and_then(|b| b.downcast_ref::<T>()) {
            Some(v) => Ok(g(v)),
            None => {
                // peers are inside a different collective
                log::error!("rank {}: mismatched collective with rank {}", self.rank, rank);
                Err(DistError::CollectiveDeadlock)
            },
        }
    }

    /// Gathers a value from every process to every process.
    /// 
    /// Returns `Ok` with the values ordered by rank.
    pub fn allgather<T: Clone + Send + 'static>(&self, local: T) -> Result<Vec<T>, DistError>
    {
        self.put(local)?;
        self.barrier()?;

        let mut all = Vec::with_capacity(self.size());
        for q in 0.. self.size() {
            all.push(self.peek(q, |v: &T| v.clone())?);
        }

        self.barrier()?;
        Ok(all)
    }

    /// Gathers variable-length vectors from every process and concatenates them in rank order.
    pub fn allgatherv<T: Clone + Send + 'static>(&self, local: Vec<T>) -> Result<Vec<T>, DistError>
    {
        self.put(local)?;
        self.barrier()?;

        let mut all = Vec::new();
        for q in 0.. self.size() {
            self.peek(q, |v: &Vec<T>| all.extend_from_slice(v))?;
        }

        self.barrier()?;
        Ok(all)
    }

    /// Personalized all-to-all exchange.
    /// 
    /// Returns `Ok` with the vectors received from each rank, ordered by rank.
    /// * `sends` holds one vector for each destination rank.
    pub fn alltoallv<T: Clone + Send + 'static>(&self, sends: Vec<Vec<T>>) -> Result<Vec<Vec<T>>, DistError>
    {
        if sends.len() != self.size() {
            log::error!("rank {}: alltoallv with {} destinations in a group of {}", self.rank, sends.len(), self.size());
            return Err(DistError::DimensionMismatch);
        }

        self.put(sends)?;
        self.barrier()?;

        let mut recvs = Vec::with_capacity(self.size());
        for q in 0.. self.size() {
            recvs.push(self.peek(q, |v: &Vec<Vec<T>>| v[self.rank].clone())?);
        }

        self.barrier()?;
        Ok(recvs)
    }

    /// Reduces a value over every process with `op`, folded in rank order.
    /// 
    /// Returns `Ok` with the same reduced value on every process.
    pub fn allreduce<T, O>(&self, local: T, op: O) -> Result<T, DistError>
    where T: Clone + Send + 'static, O: Fn(T, T) -> T
    {
        let mut all = self.allgather(local)?.into_iter();
        let first = all.next().ok_or(DistError::CollectiveDeadlock)?;
        Ok(all.fold(first, op))
    }

    /// Broadcasts `value` of the process `root` to every process.
    pub fn broadcast<T: Clone + Send + 'static>(&self, root: usize, value: &mut T) -> Result<(), DistError>
    {
        if root >= self.size() {
            log::error!("rank {}: broadcast root {} out of range", self.rank, root);
            return Err(DistError::OutOfBounds);
        }

        if self.rank == root {
            self.put(value.clone())?;
        }
        self.barrier()?;

        if self.rank != root {
            *value = self.peek(root, |v: &T| v.clone())?;
        }

        self.barrier()?;
        Ok(())
    }
}

impl core::fmt::Debug for Comm
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result
    {
        f.debug_struct("Comm")
         .field("rank", &self.rank)
         .field("size", &self.shared.size)
         .finish()
    }
}

//

#[test]
fn test_comm1()
{
    use crate::launch;

    let r = launch(4, |c| {
        let all = c.allgather(c.rank() * 10).unwrap();
        let sum = c.allreduce(c.rank() as f64, |a, b| a + b).unwrap();
        let cat = c.allgatherv(vec![c.rank(); c.rank()]).unwrap();

        let mut v = if c.rank() == 2 {7} else {0};
        c.broadcast(2, &mut v).unwrap();

        (all, sum, cat, v)
    }).unwrap();

    for (all, sum, cat, v) in r {
        assert_eq!(all, vec![0, 10, 20, 30]);
        assert_eq!(sum, 6.);
        assert_eq!(cat, vec![1, 2, 2, 3, 3, 3]);
        assert_eq!(v, 7);
    }
}

#[test]
fn test_comm2()
{
    use crate::launch;

    let r = launch(3, |c| {
        let sends = (0.. c.size()).map(|q| vec![(c.rank(), q)]).collect();
        c.alltoallv(sends).unwrap()
    }).unwrap();

    for (rank, recvs) in r.into_iter().enumerate() {
        for (q, recv) in recvs.into_iter().enumerate() {
            assert_eq!(recv, vec![(q, rank)]);
        }
    }
}

#[test]
fn test_comm3()
{
    use crate::launch;

    // rank 0 leaves without joining the barrier
    let r = launch(3, |c| {
        if c.rank() == 0 {
            Ok(())
        }
        else {
            c.barrier()
        }
    }).unwrap();

    assert_eq!(r[0], Ok(()));
    assert_eq!(r[1], Err(DistError::CollectiveDeadlock));
    assert_eq!(r[2], Err(DistError::CollectiveDeadlock));
}

#[test]
fn test_comm4()
{
    use std::time::Duration;
    use crate::Environment;

    let env = Environment::new(2).unwrap().with_timeout(Duration::from_millis(50));
    env.initialize().unwrap();

    // rank 1 stays in the group but never reaches the barrier in time
    let r = env.run(|c| {
        if c.rank() == 0 {
            c.barrier()
        }
        else {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        }
    }).unwrap();

    assert_eq!(r[0], Err(DistError::CollectiveDeadlock));
}
