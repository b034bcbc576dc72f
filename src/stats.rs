/// Ledger usage statistics, for diagnosing leaks and the like.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats
{
    /// Counter blocks held. These are recycled, never returned to the
    /// allocator; a thread also picks up the free blocks of exited threads.
    pub accounts: usize,

    /// Counter blocks waiting on the free list.
    pub free_accounts: usize,

    /// Objects handed over to a `SharedHandle`.
    pub adopted: usize,

    /// Objects destroyed because their last handle went away.
    pub destroyed: usize,
}

impl Stats
{
    /// Objects adopted but not yet destroyed.
    pub fn live_objects(&self) -> usize { self.adopted.saturating_sub(self.destroyed) }

    /// Counter blocks currently attached to an object.
    pub fn live_accounts(&self) -> usize { self.accounts.saturating_sub(self.free_accounts) }

    #[cfg(feature = "global")]
    pub(crate) fn absorb(&mut self, other: &Stats)
    {
        self.accounts += other.accounts;
        self.adopted += other.adopted;
        self.destroyed += other.destroyed;
    }
}
