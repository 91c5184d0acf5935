use std::{fmt, sync::Arc};

use crate::{
    adapter::Adapter,
    context::Context,
    error::Error,
    events::{AfterEach, BeforeEach, OnError},
    work_item::{Call, Step, WorkItem},
};

/// A custom invocation strategy. It replaces calling the work item directly and receives the work
/// item together with the call.
pub type Invoker<C, P, T> =
    Arc<dyn Fn(&WorkItem<C, P, T>, Call<'_, C, P, T>) -> Result<Step<C, P, T>, Error> + Send + Sync>;

/// User supplied options. Unset fields fall back to the value they are merged over.
///
/// Example:
///
/// ```rust
/// use batch_adapter::Options;
///
/// // collect errors into the results, share a counter between work items
/// let options: Options<u32, &str, ()> = Options::new().settle(true).context(0).params(vec!["a", "b"]);
/// ```
pub struct Options<C, P, T> {
    /// Store errors in the result slot instead of failing the batch
    pub settle: Option<bool>,
    /// State shared by all work items of an iterator
    pub context: Option<Context<C>>,
    /// Positional params passed to every work item
    pub params: Option<Arc<[P]>>,
    /// Replaces direct invocation of the work item
    pub invoke: Option<Invoker<C, P, T>>,
    pub before_each: Option<BeforeEach<C, P, T>>,
    pub after_each: Option<AfterEach<C, P, T>>,
    pub on_error: Option<OnError<C, P, T>>,
}

impl<C, P, T> Options<C, P, T> {
    pub fn new() -> Self {
        Self {
            settle: None,
            context: None,
            params: None,
            invoke: None,
            before_each: None,
            after_each: None,
            on_error: None,
        }
    }

    pub fn settle(self, settle: bool) -> Self {
        Self {
            settle: Some(settle),
            ..self
        }
    }

    /// Use `context` as fresh shared state.
    pub fn context(self, context: C) -> Self {
        self.shared_context(Context::new(context))
    }

    /// Use an existing context handle, sharing its state with whoever else holds it.
    pub fn shared_context(self, context: Context<C>) -> Self {
        Self {
            context: Some(context),
            ..self
        }
    }

    pub fn params(self, params: impl Into<Arc<[P]>>) -> Self {
        Self {
            params: Some(params.into()),
            ..self
        }
    }

    pub fn invoke<F>(self, invoke: F) -> Self
    where
        F: Fn(&WorkItem<C, P, T>, Call<'_, C, P, T>) -> Result<Step<C, P, T>, Error>
            + Send
            + Sync
            + 'static,
    {
        Self {
            invoke: Some(Arc::new(invoke)),
            ..self
        }
    }

    pub fn before_each<F>(self, listener: F) -> Self
    where
        F: Fn(&WorkItem<C, P, T>, &Context<C>, &Adapter<C, P, T>) + Send + Sync + 'static,
    {
        Self {
            before_each: Some(Arc::new(listener)),
            ..self
        }
    }

    pub fn after_each<F>(self, listener: F) -> Self
    where
        F: Fn(&WorkItem<C, P, T>, Result<&T, &Error>) + Send + Sync + 'static,
    {
        Self {
            after_each: Some(Arc::new(listener)),
            ..self
        }
    }

    pub fn on_error<F>(self, listener: F) -> Self
    where
        F: Fn(&Error, &WorkItem<C, P, T>) + Send + Sync + 'static,
    {
        Self {
            on_error: Some(Arc::new(listener)),
            ..self
        }
    }

    /// Shallow merge: every field set in `overrides` replaces the field in `self`.
    pub fn merge(self, overrides: Self) -> Self {
        Self {
            settle: overrides.settle.or(self.settle),
            context: overrides.context.or(self.context),
            params: overrides.params.or(self.params),
            invoke: overrides.invoke.or(self.invoke),
            before_each: overrides.before_each.or(self.before_each),
            after_each: overrides.after_each.or(self.after_each),
            on_error: overrides.on_error.or(self.on_error),
        }
    }
}

impl<C, P, T> Default for Options<C, P, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, P, T> Clone for Options<C, P, T> {
    fn clone(&self) -> Self {
        Self {
            settle: self.settle,
            context: self.context.clone(),
            params: self.params.clone(),
            invoke: self.invoke.clone(),
            before_each: self.before_each.clone(),
            after_each: self.after_each.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<C, P, T> fmt::Debug for Options<C, P, T>
where
    C: fmt::Debug,
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("settle", &self.settle)
            .field("context", &self.context)
            .field("params", &self.params)
            .field("invoke", &self.invoke.is_some())
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Resolved configuration an iterator runs with.
pub struct Settings<C, P, T> {
    pub settle: bool,
    pub context: Context<C>,
    pub params: Arc<[P]>,
    pub invoke: Option<Invoker<C, P, T>>,
}

impl<C, P, T> Clone for Settings<C, P, T> {
    fn clone(&self) -> Self {
        Self {
            settle: self.settle,
            context: self.context.clone(),
            params: self.params.clone(),
            invoke: self.invoke.clone(),
        }
    }
}

impl<C, P, T> fmt::Debug for Settings<C, P, T>
where
    C: fmt::Debug,
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("settle", &self.settle)
            .field("context", &self.context)
            .field("params", &self.params)
            .field("invoke", &self.invoke.is_some())
            .finish()
    }
}

impl<C, P, T> From<Settings<C, P, T>> for Options<C, P, T> {
    fn from(settings: Settings<C, P, T>) -> Self {
        Self {
            settle: Some(settings.settle),
            context: Some(settings.context),
            params: Some(settings.params),
            invoke: settings.invoke,
            ..Self::new()
        }
    }
}

/// Merge `existing` and then `overrides` over `defaults` and resolve what is still unset.
///
/// `settle` resolves to `false`, `context` to `C::default()` and `params` to an empty list.
/// Listener fields are not part of [`Settings`], the adapter subscribes them.
pub fn configure<C, P, T>(
    defaults: Options<C, P, T>,
    existing: Options<C, P, T>,
    overrides: Options<C, P, T>,
) -> Settings<C, P, T>
where
    C: Default,
{
    let merged = defaults.merge(existing).merge(overrides);

    Settings {
        settle: merged.settle.unwrap_or(false),
        context: merged.context.unwrap_or_default(),
        params: merged.params.unwrap_or_else(|| Arc::from(Vec::new())),
        invoke: merged.invoke,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Opts = Options<Vec<i32>, i32, i32>;

    #[test]
    fn configure_resolves_defaults() {
        let settings = configure(Opts::new(), Opts::new(), Opts::new());

        assert!(!settings.settle);
        assert!(settings.context.snapshot().is_empty());
        assert!(settings.params.is_empty());
        assert!(settings.invoke.is_none());
    }

    #[test]
    fn later_options_win() {
        let defaults = Opts::new().settle(false).params(vec![1]);
        let existing = Opts::new().settle(true).context(vec![7]);
        let overrides = Opts::new().params(vec![2, 3]);

        let settings = configure(defaults, existing, overrides);

        assert!(settings.settle);
        assert_eq!(settings.context.snapshot(), vec![7]);
        assert_eq!(&*settings.params, &[2, 3]);
    }

    #[test]
    fn merge_replaces_context_wholesale() {
        let first = Opts::new().context(vec![1, 2]);
        let second = Opts::new().context(vec![3]);

        let merged = first.merge(second);

        assert_eq!(merged.context.unwrap().snapshot(), vec![3]);
    }

    #[test]
    fn settings_round_trip_keeps_context_identity() {
        let settings = configure(Opts::new(), Opts::new(), Opts::new().settle(true));
        let context = settings.context.clone();

        let again = configure(Opts::new(), settings.into(), Opts::new().params(vec![1]));

        assert!(again.settle);
        assert!(again.context.ptr_eq(&context));
        assert_eq!(&*again.params, &[1]);
    }

    #[test]
    fn merge_keeps_hooks_and_invoke() {
        let merged = Opts::new()
            .after_each(|_, _| {})
            .merge(Opts::new().invoke(|item, call| item.call(call)).on_error(|_, _| {}));

        assert!(merged.after_each.is_some());
        assert!(merged.on_error.is_some());
        assert!(merged.invoke.is_some());
        assert!(merged.before_each.is_none());
    }
}
