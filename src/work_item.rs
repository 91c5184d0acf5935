use std::{borrow::Cow, fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use tokio::sync::oneshot;

use crate::{context::Context, error::Error};

type WorkFn<C, P, T> = dyn Fn(Call<'_, C, P, T>) -> Result<Step<C, P, T>, Error> + Send + Sync;

/// A named unit of work.
///
/// A work item is invoked with a [`Call`] and reports what its synchronous part produced as a
/// [`Step`]. Returning `Err` or panicking is treated as a throw. Work items are cheap to clone and
/// compare equal only to clones of themselves.
///
/// ```rust
/// use batch_adapter::{Error, WorkItem};
///
/// let one: WorkItem<(), (), i32> = WorkItem::sync("one", |_ctx, _params| Ok(1));
/// let two: WorkItem<(), (), i32> = WorkItem::sync("two", |_ctx, _params| Err(Error::msg("two err")));
/// let three: WorkItem<(), (), i32> = WorkItem::callback("three", |_ctx, _params, done| done.ok(3));
///
/// assert_eq!(one.name(), "one");
/// assert_eq!(one, one.clone());
/// assert_ne!(one, two);
/// # let _ = three;
/// ```
pub struct WorkItem<C, P, T> {
    name: Cow<'static, str>,
    func: Arc<WorkFn<C, P, T>>,
}

impl<C, P, T> WorkItem<C, P, T>
where
    C: 'static,
    P: 'static,
    T: 'static,
{
    /// A work item from its raw form. The function decides which [`Step`] it produces, including
    /// [`Step::Chain`] to hand off to another work item.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(Call<'_, C, P, T>) -> Result<Step<C, P, T>, Error> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// A work item that returns its value synchronously.
    pub fn sync<F>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(&mut C, &[P]) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self::new(name, move |mut call: Call<'_, C, P, T>| {
            let (context, params) = call.parts();
            func(context, params).map(Step::Value)
        })
    }

    /// A work item that reports its result through a [`Completion`], now or later.
    ///
    /// Inside a chain whose earlier link already took the completion, `func` still runs but its
    /// handle is detached: completing it has no effect, the earlier link decides the result.
    pub fn callback<F>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(&mut C, &[P], Completion<T>) + Send + Sync + 'static,
    {
        Self::new(name, move |mut call: Call<'_, C, P, T>| {
            let done = call.completion().unwrap_or_else(Completion::detached);
            let (context, params) = call.parts();
            func(context, params, done);

            Ok(Step::Pending)
        })
    }

    /// A work item that returns a future. The future is awaited after the context lock has been
    /// released, so it receives a handle to the context rather than a borrow.
    ///
    /// `func` itself runs while the context is locked: locking the handle in its body, outside the
    /// returned future, deadlocks.
    pub fn future<F, Fut>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(Context<C>, Vec<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
        P: Clone,
    {
        Self::new(name, move |call: Call<'_, C, P, T>| {
            let fut = func(call.shared_context(), call.params().to_vec());
            Ok(Step::Future(fut.boxed()))
        })
    }
}

impl<C, P, T> WorkItem<C, P, T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the synchronous part of the work item.
    pub fn call(&self, call: Call<'_, C, P, T>) -> Result<Step<C, P, T>, Error> {
        (self.func)(call)
    }
}

impl<C, P, T> Clone for WorkItem<C, P, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<C, P, T> PartialEq for WorkItem<C, P, T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl<C, P, T> Eq for WorkItem<C, P, T> {}

impl<C, P, T> fmt::Debug for WorkItem<C, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WorkItem").field(&self.name).finish()
    }
}

/// What the synchronous part of an invocation produced.
pub enum Step<C, P, T> {
    /// A plain value.
    Value(T),
    /// Another work item to invoke with the same context and params.
    Chain(WorkItem<C, P, T>),
    /// The result arrives through the [`Completion`] handle.
    Pending,
    /// The result arrives when the future resolves.
    Future(BoxFuture<'static, Result<T, Error>>),
}

impl<C, P, T: fmt::Debug> fmt::Debug for Step<C, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Chain(next) => f.debug_tuple("Chain").field(next).finish(),
            Self::Pending => f.write_str("Pending"),
            Self::Future(_) => f.write_str("Future"),
        }
    }
}

/// The arguments of one synchronous invocation: the locked context, the positional params and
/// the completion handle, if no earlier link of a chain has taken it.
pub struct Call<'a, C, P, T> {
    pub(crate) context: &'a mut C,
    pub(crate) shared: &'a Context<C>,
    pub(crate) params: &'a [P],
    pub(crate) completion: &'a mut Option<Completion<T>>,
}

impl<'a, C, P, T> Call<'a, C, P, T> {
    pub fn context(&mut self) -> &mut C {
        &mut *self.context
    }

    pub fn params(&self) -> &'a [P] {
        self.params
    }

    pub fn param(&self, index: usize) -> Option<&'a P> {
        self.params.get(index)
    }

    /// Both the context and the params, for callers that need them at once.
    pub fn parts(&mut self) -> (&mut C, &'a [P]) {
        (&mut *self.context, self.params)
    }

    /// A handle to the context for work that outlives this call. Locking it before the call
    /// returns deadlocks.
    pub fn shared_context(&self) -> Context<C> {
        self.shared.clone()
    }

    /// Take the completion handle. Returns `None` once taken.
    pub fn completion(&mut self) -> Option<Completion<T>> {
        self.completion.take()
    }
}

/// Completes a work item that returned [`Step::Pending`].
///
/// Completing consumes the handle, so a work item completes at most once. Dropping it without
/// completing settles the work item with [`Error::Abandoned`].
#[derive(Debug)]
pub struct Completion<T> {
    sender: oneshot::Sender<Result<T, Error>>,
}

impl<T> Completion<T> {
    pub(crate) fn new(sender: oneshot::Sender<Result<T, Error>>) -> Self {
        Self { sender }
    }

    /// A handle nobody listens to.
    pub(crate) fn detached() -> Self {
        let (sender, _) = oneshot::channel();
        Self::new(sender)
    }

    pub fn complete(self, result: Result<T, Error>) {
        // The receiver is gone only when the outcome was already settled by another path.
        let _ = self.sender.send(result);
    }

    pub fn ok(self, value: T) {
        self.complete(Ok(value))
    }

    pub fn fail(self, error: Error) {
        self.complete(Err(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_with<C, P, T>(
        item: &WorkItem<C, P, T>,
        context: &Context<C>,
        params: &[P],
        completion: &mut Option<Completion<T>>,
    ) -> Result<Step<C, P, T>, Error> {
        let mut guard = context.lock();
        item.call(Call {
            context: &mut *guard,
            shared: context,
            params,
            completion,
        })
    }

    #[test]
    fn sync_item_mutates_context_and_reads_params() {
        let item = WorkItem::sync("push", |ctx: &mut Vec<i32>, params: &[i32]| {
            ctx.extend_from_slice(params);
            Ok(ctx.len())
        });
        let context = Context::new(vec![0]);

        let step = call_with(&item, &context, &[1, 2], &mut None).unwrap();

        assert!(matches!(step, Step::Value(3)));
        assert_eq!(context.snapshot(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn callback_item_takes_completion() {
        let item: WorkItem<(), (), i32> =
            WorkItem::callback("three", |_ctx, _params, done| done.ok(3));
        let (sender, receiver) = oneshot::channel();
        let mut completion = Some(Completion::new(sender));

        let step = call_with(&item, &Context::new(()), &[], &mut completion).unwrap();

        assert!(matches!(step, Step::Pending));
        assert!(completion.is_none());
        assert_eq!(receiver.await.unwrap().unwrap(), 3);
    }

    #[test]
    fn callback_item_runs_after_completion_was_taken() {
        let item: WorkItem<Vec<&str>, (), i32> =
            WorkItem::callback("second", |ctx: &mut Vec<&'static str>, _params, done| {
                ctx.push("second ran");
                done.ok(2);
            });
        let context = Context::new(vec![]);

        let step = call_with(&item, &context, &[], &mut None).unwrap();

        assert!(matches!(step, Step::Pending));
        assert_eq!(context.snapshot(), vec!["second ran"]);
    }

    #[tokio::test]
    async fn future_item_receives_handle_and_owned_params() {
        let item = WorkItem::future("fut", |ctx: Context<i32>, params: Vec<i32>| async move {
            let sum: i32 = params.iter().sum();
            ctx.with(|c| *c += sum);
            Ok(sum)
        });
        let context = Context::new(10);

        let step = call_with(&item, &context, &[1, 2, 3], &mut None).unwrap();

        match step {
            Step::Future(fut) => assert_eq!(fut.await.unwrap(), 6),
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(context.snapshot(), 16);
    }

    #[test]
    fn equality_is_identity() {
        let a: WorkItem<(), (), ()> = WorkItem::sync("same", |_, _| Ok(()));
        let b: WorkItem<(), (), ()> = WorkItem::sync("same", |_, _| Ok(()));

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(format!("{a:?}"), "WorkItem(\"same\")");
    }
}
