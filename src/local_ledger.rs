use super::{error::HandleError, object::Object, stats::Stats};
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    ptr::{self, NonNull},
    sync::atomic::{AtomicU64, Ordering},
};

/// Index of a shared counter block.
///
/// Accounts are leaked and recycled, never deallocated, so an index stays
/// dereferenceable for the life of the process. This is what lets a `Weak`
/// validate itself after its object is gone.
///
/// With the `global` feature, the free accounts of an exited thread are
/// handed to other threads. A `Weak` left over from the exited thread may
/// still read the generation, hence the atomic.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LocalIndex(&'static Account);

#[derive(Debug)]
pub(crate) struct Account
{
    count: Cell<usize>,
    generation: AtomicU64,
    object: Cell<Option<NonNull<dyn Object>>>,
}

impl LocalIndex
{
    pub(crate) fn count(&self) -> usize { self.0.count.get() }

    pub(crate) fn generation(&self) -> u64 { self.0.generation.load(Ordering::Relaxed) }

    /// The owned object, present while the count is nonzero.
    pub(crate) fn object(&self) -> Option<NonNull<dyn Object>> { self.0.object.get() }

    pub(crate) fn retain(&self)
    {
        match self.0.count.get().checked_add(1) {
            Some(count) => self.0.count.set(count),
            None => panic!("shared handle count overflow"),
        }
    }

    /// Drop one reference. Hands back the object when this was the last one;
    /// the caller must then `free` the account and destroy the object.
    pub(crate) fn release(&self) -> Option<NonNull<dyn Object>>
    {
        let count = self.0.count.get();
        if count == 0 {
            panic!("release of an account with no references");
        }
        self.0.count.set(count - 1);
        if count == 1 {
            self.0.generation.fetch_add(1, Ordering::Relaxed);
            self.0.object.take()
        } else {
            None
        }
    }

    pub(crate) fn same(&self, other: &LocalIndex) -> bool { ptr::eq(self.0, other.0) }

    pub(crate) fn addr(&self) -> usize { self.0 as *const Account as usize }

    fn attach(&self, object: NonNull<dyn Object>)
    {
        self.0.count.set(1);
        self.0.object.set(Some(object));
    }

    fn fresh() -> Self
    {
        LocalIndex(Box::leak(Box::new(Account {
            count: Cell::new(0),
            generation: AtomicU64::new(1),
            object: Cell::new(None),
        })))
    }
}

fn address_of(object: NonNull<dyn Object>) -> usize { object.cast::<u8>().as_ptr() as usize }

struct Ledger
{
    free_list: Vec<LocalIndex>,
    owners: HashMap<usize, LocalIndex>,
    stats: Stats,
}

thread_local! {
    static LEDGER: RefCell<Ledger> = RefCell::new(Ledger::new());
}

impl Ledger
{
    fn new() -> Self
    {
        Ledger {
            free_list: Vec::with_capacity(32),
            owners: HashMap::new(),
            stats: Stats::default(),
        }
    }

    fn allocate(&mut self) -> LocalIndex
    {
        if let Some(index) = self.free_list.pop() {
            return index;
        }
        self.stats.accounts += 1;
        Self::orphaned().unwrap_or_else(LocalIndex::fresh)
    }

    #[cfg(feature = "global")]
    fn orphaned() -> Option<LocalIndex> { super::global_ledger::recycle() }

    #[cfg(not(feature = "global"))]
    fn orphaned() -> Option<LocalIndex> { None }

    /// Zero-sized objects all live at the same dangling address and are not
    /// registered.
    fn adopt(&mut self, object: NonNull<dyn Object>, size: usize) -> LocalIndex
    {
        let index = self.allocate();
        index.attach(object);
        if size != 0 {
            self.owners.insert(address_of(object), index);
        }
        self.stats.adopted += 1;
        index
    }

    fn try_adopt(&mut self, object: NonNull<dyn Object>, size: usize)
        -> Result<LocalIndex, HandleError>
    {
        let address = address_of(object);
        if size != 0 && self.owners.contains_key(&address) {
            return Err(HandleError::AlreadyOwned { address });
        }
        Ok(self.adopt(object, size))
    }

    fn free(&mut self, index: LocalIndex, object: NonNull<dyn Object>)
    {
        let address = address_of(object);
        if self.owners.get(&address).map_or(false, |owner| owner.same(&index)) {
            self.owners.remove(&address);
        }
        self.free_list.push(index);
        self.stats.destroyed += 1;
    }

    fn stats(&self) -> Stats
    {
        let mut res = self.stats.clone();
        res.free_accounts = self.free_list.len();
        res
    }
}

#[cfg(feature = "global")]
impl Drop for Ledger
{
    fn drop(&mut self)
    {
        let stats = self.stats();
        super::global_ledger::settle(&stats, std::mem::take(&mut self.free_list))
    }
}

/// Attach a fresh account to an object whose ownership is known to be unique,
/// such as a just-leaked `Box`.
///
/// Once the ledger has been torn down at thread exit, the object gets an
/// account of its own that is neither recorded nor ever reused.
pub(crate) fn adopt(object: NonNull<dyn Object>, size: usize) -> LocalIndex
{
    LEDGER
        .try_with(|ledger| ledger.borrow_mut().adopt(object, size))
        .unwrap_or_else(|_| unrecorded(object))
}

/// Attach a fresh account unless the address is already owned on this thread.
///
/// After teardown the registry is gone and nothing is refused.
pub(crate) fn try_adopt(object: NonNull<dyn Object>, size: usize)
    -> Result<LocalIndex, HandleError>
{
    LEDGER
        .try_with(|ledger| ledger.borrow_mut().try_adopt(object, size))
        .unwrap_or_else(|_| Ok(unrecorded(object)))
}

fn unrecorded(object: NonNull<dyn Object>) -> LocalIndex
{
    let index = LocalIndex::fresh();
    index.attach(object);
    index
}

/// Return an account whose count reached zero to the free list.
///
/// Silently leaks the account if the ledger has already been torn down at
/// thread exit.
pub(crate) fn free(index: LocalIndex, object: NonNull<dyn Object>)
{
    let _ = LEDGER.try_with(|ledger| ledger.borrow_mut().free(index, object));
}

/// Whether the object at `ptr` is currently owned by a handle on this thread.
///
/// Always false for zero-sized objects, and from thread-local destructors
/// that run after the ledger has been torn down.
pub fn is_owned<T: ?Sized>(ptr: *const T) -> bool
{
    let address = ptr.cast::<u8>() as usize;
    LEDGER
        .try_with(|ledger| ledger.borrow().owners.contains_key(&address))
        .unwrap_or(false)
}

/// Statistics of the calling thread's ledger.
///
/// All zero once the ledger has been torn down at thread exit.
pub fn thread_local_stats() -> Stats
{
    LEDGER
        .try_with(|ledger| ledger.borrow().stats())
        .unwrap_or_default()
}
