use std::{sync::Arc, time::Duration};

use futures::{stream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{Context, Error, ItemIterator, Slot, WorkItem};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A series driver: runs items one after another and stops at the first error.
pub async fn map_series<C, P, T>(
    items: Vec<WorkItem<C, P, T>>,
    iterator: &ItemIterator<C, P, T>,
) -> Result<Vec<Slot<T>>, Error>
where
    C: Send + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        results.push(iterator.iterate(item).await?);
    }

    Ok(results)
}

/// A concurrent driver: runs up to `concurrency` items at once and keeps the input order.
pub async fn map_concurrent<C, P, T>(
    items: Vec<WorkItem<C, P, T>>,
    iterator: &ItemIterator<C, P, T>,
    concurrency: usize,
) -> Result<Vec<Slot<T>>, Error>
where
    C: Send + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    stream::iter(items)
        .map(|item| iterator.iterate(item))
        .buffered(concurrency)
        .try_collect()
        .await
}

/// A series driver built on the callback form of the iterator.
pub async fn map_series_callback<C, P, T>(
    items: Vec<WorkItem<C, P, T>>,
    iterator: &ItemIterator<C, P, T>,
) -> Result<Vec<Slot<T>>, Error>
where
    C: Send + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let (sender, receiver) = oneshot::channel();
        iterator.call(item, move |result| {
            sender.send(result).ok();
        });

        results.push(receiver.await.expect("continuation was not called")?);
    }

    Ok(results)
}

/// A work item that sleeps for `millis` before returning `id`, recording when it starts and ends.
pub fn delayed<C>(id: i32, millis: u64, recorder: &Recorder) -> WorkItem<C, (), i32>
where
    C: Send + 'static,
{
    let recorder = recorder.clone();

    WorkItem::future(format!("delayed {id}"), move |_ctx: Context<C>, _params| {
        let recorder = recorder.clone();
        async move {
            recorder.push(format!("start {id}"));
            tokio::time::sleep(Duration::from_millis(millis)).await;
            recorder.push(format!("end {id}"));
            Ok(id)
        }
    })
}

/// Collects what happened, in order, across work items and listeners.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }
}
