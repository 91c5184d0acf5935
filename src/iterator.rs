use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use futures::{future::BoxFuture, FutureExt};
use tokio::{
    sync::oneshot::{self, error::TryRecvError},
    task::JoinHandle,
};
use tracing::{debug, debug_span, trace, Instrument};

use crate::{
    adapter::Adapter,
    context::Context,
    error::Error,
    options::Settings,
    outcome::{Outcome, Slot},
    work_item::{Call, Completion, Step, WorkItem},
};

/// The per-item function handed to a batch driver, created by [`Adapter::make_iterator`].
///
/// Each call invokes one work item with the shared context and params, normalizes how it finished
/// into one result and emits the adapter's notifications around it. The iterator keeps no state
/// between calls apart from the context the work items mutate, so a driver may run several calls
/// at once.
///
/// With settle mode off a failing work item yields `Err` and a series driver stops there:
///
/// ```rust
/// use batch_adapter::{Adapter, Error, Options, WorkItem};
/// use futures::{stream, StreamExt, TryStreamExt};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let iterator = Adapter::<(), (), i32>::default().make_iterator(Options::new());
///
/// let items: Vec<WorkItem<(), (), i32>> = vec![
///     WorkItem::sync("one", |_, _| Ok(1)),
///     WorkItem::sync("two", |_, _| Err(Error::msg("two err"))),
///     WorkItem::sync("three", |_, _| Ok(3)),
/// ];
///
/// let result: Result<Vec<_>, Error> = stream::iter(items)
///     .then(|item| iterator.iterate(item))
///     .try_collect()
///     .await;
///
/// assert_eq!(result.unwrap_err().to_string(), "two err");
/// # });
/// ```
pub struct ItemIterator<C, P, T> {
    adapter: Adapter<C, P, T>,
    settings: Arc<Settings<C, P, T>>,
}

impl<C, P, T> ItemIterator<C, P, T>
where
    C: Send + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    pub(crate) fn new(adapter: Adapter<C, P, T>, settings: Settings<C, P, T>) -> Self {
        Self {
            adapter,
            settings: Arc::new(settings),
        }
    }

    /// Run one work item. The future resolves once its outcome has settled and the notifications
    /// have been emitted.
    pub fn iterate(&self, item: WorkItem<C, P, T>) -> BoxFuture<'static, Result<Slot<T>, Error>> {
        let this = self.clone();
        let span = debug_span!("work_item", name = %item.name());

        async move { this.run(item).await }.instrument(span).boxed()
    }

    /// Run one work item on the tokio runtime and hand its result to `continuation`, for drivers
    /// built around callbacks. The continuation is called exactly once, the returned handle
    /// reports a panic in it.
    pub fn call<F>(&self, item: WorkItem<C, P, T>, continuation: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Slot<T>, Error>) + Send + 'static,
    {
        let fut = self.iterate(item);

        tokio::spawn(async move {
            continuation(fut.await);
        })
    }

    /// The iterator as a plain function, for drivers that take `Fn(In) -> Future`.
    pub fn into_fn(
        self,
    ) -> impl Fn(WorkItem<C, P, T>) -> BoxFuture<'static, Result<Slot<T>, Error>>
           + Clone
           + Send
           + Sync
           + 'static {
        move |item| self.iterate(item)
    }

    async fn run(&self, item: WorkItem<C, P, T>) -> Result<Slot<T>, Error> {
        let events = self.adapter.events();

        events.emit_before_each(&item, &self.settings.context, &self.adapter);
        debug!("invoking work item");

        let result = self.invoke(&item).await.settle();

        events.emit_after_each(&item, result.as_ref());

        match result {
            Ok(value) => {
                debug!("work item completed");
                Ok(Slot::Value(value))
            }
            Err(error) => {
                events.emit_error(&error, &item);

                if self.settings.settle {
                    debug!(%error, "work item failed, settled into its slot");
                    Ok(Slot::Error(error))
                } else {
                    debug!(%error, "work item failed");
                    Err(error)
                }
            }
        }
    }

    /// Invoke the work item and follow what its synchronous part produced until one outcome is
    /// reached.
    ///
    /// Chained work items are followed without a depth limit: a chain that keeps handing off never
    /// settles.
    async fn invoke(&self, item: &WorkItem<C, P, T>) -> Outcome<T> {
        let (sender, mut receiver) = oneshot::channel();
        let mut completion = Some(Completion::new(sender));
        let mut abandoned = false;
        let mut depth = 0_usize;

        let mut step = self.call_sync(&mut completion, |call| match &self.settings.invoke {
            Some(invoke) => invoke(item, call),
            None => item.call(call),
        });

        loop {
            // a completion fired during the synchronous part wins over what it returned
            match receiver.try_recv() {
                Ok(result) => return Outcome::Completed(result),
                Err(TryRecvError::Closed) => abandoned = true,
                Err(TryRecvError::Empty) => {}
            }

            match step {
                Err(error) => return Outcome::Threw(error),
                Ok(Step::Value(value)) => return Outcome::Returned(value),
                Ok(Step::Chain(next)) => {
                    depth += 1;
                    trace!(next = next.name(), depth, "following chained work item");

                    step = self.call_sync(&mut completion, |call| next.call(call));
                }
                Ok(Step::Pending) if abandoned => {
                    return Outcome::Completed(Err(Error::Abandoned));
                }
                Ok(Step::Pending) => {
                    // release our handle, only the work item may complete now
                    drop(completion.take());

                    return match receiver.await {
                        Ok(result) => Outcome::Completed(result),
                        Err(_) => Outcome::Completed(Err(Error::Abandoned)),
                    };
                }
                Ok(Step::Future(fut)) => {
                    return match AssertUnwindSafe(fut).catch_unwind().await {
                        Ok(result) => Outcome::Completed(result),
                        Err(payload) => Outcome::Threw(Error::from_panic(payload)),
                    };
                }
            }
        }
    }

    /// Run the synchronous part of an invocation with the context locked. A panic becomes an
    /// error.
    fn call_sync<F>(
        &self,
        completion: &mut Option<Completion<T>>,
        f: F,
    ) -> Result<Step<C, P, T>, Error>
    where
        F: FnOnce(Call<'_, C, P, T>) -> Result<Step<C, P, T>, Error>,
    {
        let shared = &self.settings.context;
        let mut context = shared.lock();

        let call = Call {
            context: &mut *context,
            shared,
            params: &self.settings.params,
            completion,
        };

        panic::catch_unwind(AssertUnwindSafe(move || f(call)))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
    }
}

impl<C, P, T> ItemIterator<C, P, T> {
    pub fn settings(&self) -> &Settings<C, P, T> {
        &self.settings
    }

    pub fn context(&self) -> &Context<C> {
        &self.settings.context
    }

    /// The adapter this iterator was created from.
    pub fn adapter(&self) -> &Adapter<C, P, T> {
        &self.adapter
    }
}

impl<C, P, T> Clone for ItemIterator<C, P, T> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<C, P, T> fmt::Debug for ItemIterator<C, P, T>
where
    C: fmt::Debug,
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemIterator")
            .field("settings", &self.settings)
            .finish()
    }
}
