use lazy_static::lazy_static;
use parking_lot::Mutex;

use super::{local_ledger::LocalIndex, stats::Stats};

/// A free account left behind by an exited thread.
struct Orphan(LocalIndex);

// Orphans have a count of zero and no object, and the thread that used them
// has finished with its ledger. The only state another thread may still read
// is the generation, which is atomic.
unsafe impl Send for Orphan {}

struct GlobalPool
{
    free_list: Vec<Orphan>,
    stats: Stats,
}

lazy_static! {
    static ref GLOBAL_POOL: Mutex<GlobalPool> = Mutex::new(GlobalPool {
        free_list: Vec::new(),
        stats: Stats::default(),
    });
}

/// Fold an exiting thread's ledger into the process-wide totals and hand its
/// free accounts over for reuse.
pub(crate) fn settle(stats: &Stats, free_list: Vec<LocalIndex>)
{
    let mut pool = GLOBAL_POOL.lock();
    pool.stats.absorb(stats);
    pool.free_list.extend(free_list.into_iter().map(Orphan));
}

/// Take a free account left behind by an exited thread, if there is one.
///
/// The account moves from the process-wide totals to the calling thread's.
pub(crate) fn recycle() -> Option<LocalIndex>
{
    let mut pool = GLOBAL_POOL.lock();
    let Orphan(index) = pool.free_list.pop()?;
    pool.stats.accounts -= 1;
    Some(index)
}

/// Totals of every thread that has exited so far.
///
/// Live threads are not included; see `thread_local_stats` for those. The
/// accounts are those still held here: free ones waiting to be picked up by
/// another thread, plus any that were attached to an object when their
/// thread exited.
pub fn global_stats() -> Stats
{
    let pool = GLOBAL_POOL.lock();
    let mut res = pool.stats.clone();
    res.free_accounts = pool.free_list.len();
    res
}
