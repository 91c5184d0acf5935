//! Adapt any unit of work into the per-item function of an async batch driver.
//!
//! Batch utilities such as a series `map`, a concurrent ordered `map` or a
//! `Pipeline::map` stage all expect a single shape: a function that takes an item and eventually
//! reports `Ok(result)` or `Err(error)`. Real work rarely comes in one shape. Some functions return
//! a value, some complete through a callback later on, some return a future and some fail or
//! panic half way. This crate turns each of them into that one shape.
//!
//! Main features:
//!
//! - One [`WorkItem`] type for sync, callback and future based work
//! - Errors and panics are normalized into one [`Error`], never unwinding into the driver
//! - Settle mode collects failures into the results instead of aborting the batch
//! - Shared state between work items via a [`Context`]
//! - `beforeEach`, `afterEach` and `error` notifications
//! - No scheduler of its own, the driver decides about order and concurrency
//!
//! Example:
//!
//! ```rust
//! use batch_adapter::{Adapter, Error, Options, Slot, WorkItem};
//! use futures::{stream, StreamExt, TryStreamExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let adapter: Adapter<(), (), i32> = Adapter::default();
//! let iterator = adapter.make_iterator(Options::new().settle(true));
//!
//! let items: Vec<WorkItem<(), (), i32>> = vec![
//!     WorkItem::sync("one", |_, _| Ok(1)),
//!     WorkItem::sync("two", |_, _| Err(Error::msg("two err"))),
//!     WorkItem::callback("three", |_, _, done| done.ok(3)),
//! ];
//!
//! let slots: Vec<Slot<i32>> = stream::iter(items)
//!     .then(|item| iterator.iterate(item))
//!     .try_collect()
//!     .await
//!     .unwrap();
//!
//! assert_eq!(slots[0].value(), Some(&1));
//! assert_eq!(slots[1].error().unwrap().to_string(), "two err");
//! assert_eq!(slots[2].value(), Some(&3));
//! # });
//! ```
//!
//! ## Work items
//!
//! A [`WorkItem`] is a named function invoked with a [`Call`]: the locked context, the positional
//! params and a completion handle. What its synchronous part produced is reported as a [`Step`]:
//!
//! - `Step::Value(v)` - done, `v` is the result
//! - `Step::Pending` - the result arrives through the [`Completion`] handle, now or later
//! - `Step::Future(f)` - the result arrives when `f` resolves
//! - `Step::Chain(next)` - invoke `next` with the same context and params
//!
//! Returning `Err` or panicking counts as a throw. The constructors [`WorkItem::sync`],
//! [`WorkItem::callback`] and [`WorkItem::future`] cover the common shapes:
//!
//! ```rust
//! use batch_adapter::{Context, WorkItem};
//!
//! // returns synchronously, mutating the shared context
//! let one = WorkItem::sync("one", |ctx: &mut Vec<String>, _params: &[u32]| {
//!     ctx.push("one".to_string());
//!     Ok(1)
//! });
//!
//! // completes later from another task
//! let two = WorkItem::callback("two", |_ctx: &mut Vec<String>, params: &[u32], done| {
//!     let first = params[0];
//!     tokio::spawn(async move { done.ok(first + 1) });
//! });
//!
//! // returns a future, which gets a handle to the context instead of a borrow
//! let three = WorkItem::future("three", |ctx: Context<Vec<String>>, _params: Vec<u32>| async move {
//!     Ok(ctx.with(|ctx| ctx.len() as u32))
//! });
//! # let _ = (one, two, three);
//! ```
//!
//! ## Settle mode
//!
//! By default a failing work item yields `Err(error)`, which a driver such as `try_collect` treats
//! as the end of the batch. With `Options::settle(true)` the error is stored in the item's
//! [`Slot`] instead and every item runs. Notifications fire the same way in both modes.
//!
//! ## Notifications
//!
//! ```rust
//! use batch_adapter::{Adapter, Options};
//!
//! let adapter: Adapter<(), (), i32> = Adapter::default();
//!
//! adapter.on_before_each(|item, _ctx, _adapter| println!("before {}", item.name()));
//! adapter.on_after_each(|item, result| println!("after {}: {:?}", item.name(), result));
//! adapter.on_error(|error, item| println!("{} failed: {error}", item.name()));
//!
//! // or as options, subscribed when the iterator is created
//! let iterator = adapter.make_iterator(Options::new().after_each(|item, _| println!("{}", item.name())));
//! # let _ = iterator;
//! ```
//!
//! ### Limitations
//! There is no timeout: a work item that holds on to its completion handle and never completes
//! stalls its slot forever. Chains of [`Step::Chain`] are followed without a depth limit, a work
//! item that keeps handing off to itself never settles.
mod adapter;
mod context;
mod error;
mod events;
mod iterator;
mod options;
mod outcome;
mod work_item;

#[cfg(test)]
mod test_utils;

pub use adapter::Adapter;
pub use context::Context;
pub use error::{Error, Result};
pub use events::{AfterEach, BeforeEach, EventKind, ListenerId, OnError};
pub use iterator::ItemIterator;
pub use options::{configure, Invoker, Options, Settings};
pub use outcome::{Outcome, Slot};
pub use work_item::{Call, Completion, Step, WorkItem};
