// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bounded worker pool.
//!
//! Package queries, package installs, and font downloads are independent of
//! each other, and mostly spend their time waiting on a subprocess or the
//! network. The pool drives at most `limit` of them at once, and only hands
//! results back after every item finished. Results come back in completion
//! order, not input order.

use futures::{stream, StreamExt};
use std::future::Future;
use tracing::debug;

/// Run task over every item with at most `limit` in flight.
///
/// Spins up a dedicated runtime, so this must not be called from within an
/// async context.
///
/// # Errors
///
/// - Return [`PoolError::Runtime`] if runtime cannot be created.
pub fn run_bounded<I, T, F, Fut, R>(items: I, limit: usize, task: F) -> Result<Vec<R>>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let limit = limit.max(1);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(PoolError::Runtime)?;

    debug!("start worker pool with limit {limit}");
    let results = runtime.block_on(
        stream::iter(items)
            .map(task)
            .buffer_unordered(limit)
            .collect::<Vec<_>>(),
    );
    debug!("worker pool drained {} item(s)", results.len());

    Ok(results)
}

/// Worker pool error types.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Async runtime could not be built.
    #[error("failed to start worker pool runtime")]
    Runtime(#[source] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = PoolError> = std::result::Result<T, E>;
