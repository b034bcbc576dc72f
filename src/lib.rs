//! Reference counted shared handles for object hierarchies.
//!
//! Long-lived object graphs (windows owning menus owning widgets, say) are
//! awkward to express with plain borrows, and `Rc` alone cannot answer "is
//! this widget a button?". This crate provides `SharedHandle<T>`, a nullable
//! reference counted handle whose counter is shared by every handle to the
//! same object whatever their type parameter, together with a runtime checked
//! `cast` across the object's type family.
//!
//! Types join a family by registering with [`object!`] and naming the
//! interfaces they can be viewed as; interfaces become cast targets with
//! [`interface!`].
//!
//! ```
//! use sharedref::{interface, object, SharedHandle, Weak};
//!
//! trait Widget { fn label(&self) -> String; }
//! interface!(Widget);
//!
//! struct Button { text: String, parent: Weak<Window> }
//! impl Widget for Button { fn label(&self) -> String { self.text.clone() } }
//! object!(Button: Widget);
//!
//! struct Window { children: std::cell::RefCell<Vec<SharedHandle<dyn Widget>>> }
//! object!(Window);
//!
//! let window = SharedHandle::new(Window { children: Default::default() });
//! let ok = SharedHandle::new(Button { text: "OK".into(), parent: window.alias() });
//! window.children.borrow_mut().push(ok.upcast());
//!
//! let widget = window.children.borrow()[0].clone();
//! assert_eq!(widget.label(), "OK");
//! assert_eq!(widget.cast::<Button>(), ok);
//! assert!(widget.cast::<Window>().is_null());
//! assert_eq!(ok.count(), 3);
//! assert_eq!(ok.parent.upgrade(), window);
//! ```
//!
//! Ownership is released deterministically when the last handle goes away,
//! cascading through whatever handles the object itself held. Cycles are not
//! collected: back references must be [`Weak`] observations, as the parent
//! pointer above is.
//!
//! Everything is single threaded. Counters live in a thread-local ledger,
//! which is also used to reject adopting the same raw allocation twice and to
//! report [`Stats`]. With the `global` feature, the ledgers of exiting
//! threads are summed up in [`global_stats`], and their free counter blocks
//! are handed to the threads that remain.

mod error;
#[cfg(feature = "global")]
mod global_ledger;
mod local_ledger;
mod object;
pub mod pointers;
mod stats;


pub use error::HandleError;
#[cfg(feature = "global")]
pub use global_ledger::global_stats;
pub use local_ledger::{is_owned, thread_local_stats};
pub use object::{Object, Target, TypeInfo, Upcast};
pub use pointers::{SharedHandle, Weak};
pub use stats::Stats;
