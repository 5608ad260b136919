use std::future::Future;

use futures::StreamExt;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::error::Result;

/// Run `task` over `items` with at most `workers` futures in flight.
///
/// Results arrive in completion order. The first `Err` stops the pool and
/// drops the tasks still running; an in-flight task never holds a
/// half-written file, since dataset writes complete without awaiting.
pub async fn run_bounded<I, T, F, Fut, R>(items: I, workers: usize, task: F) -> Result<Vec<R>>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let mut stream = futures::stream::iter(items)
        .map(task)
        .buffer_unordered(workers.max(1));

    let mut results = Vec::new();
    while let Some(result) = stream.next().await {
        results.push(result?);
    }
    Ok(results)
}

/// Run a synchronous dataset write. On a multi-threaded runtime the worker
/// thread hands its other tasks off first, so a large CSV rewrite does not
/// stall them; elsewhere the write runs inline.
pub fn store_blocking<R>(write: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(write)
        }
        _ => write(),
    }
}
