//! Debounced, cancel-on-supersede fetching for time scrubbing.
//!
//! Dragging the scrub bar produces a burst of as-of requests. A
//! [`ScrubFeed`] coalesces them: a fetch starts only once no newer request
//! has arrived for the debounce window, and a fetch still in flight when a
//! newer request arrives is dropped. Results are published in request order,
//! so a slow response for an old instant can never overwrite a newer one.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rollout_core::source::EventSource;
use tokio::{
  sync::watch,
  task::JoinHandle,
  time,
};
use tracing::debug;

use crate::{
  Error, Result,
  engine::{Engine, SharedEngine, TransitionFilter, TransitionView},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScrubRequest {
  generation: u64,
  as_of:      DateTime<Utc>,
}

/// The outcome of one settled request.
#[derive(Debug, Clone)]
pub struct Scrubbed<T> {
  /// The value [`ScrubFeed::request`] returned for the request.
  pub generation: u64,
  pub as_of:      DateTime<Utc>,
  pub outcome:    Result<T, Arc<Error>>,
}

/// A background worker turning as-of requests into fetched results.
///
/// Dropping the feed aborts the worker along with any fetch in flight.
pub struct ScrubFeed<T> {
  requests: watch::Sender<Option<ScrubRequest>>,
  results:  watch::Receiver<Option<Scrubbed<T>>>,
  worker:   JoinHandle<()>,
}

impl<T> ScrubFeed<T>
where
  T: Clone + Send + Sync + 'static,
{
  /// Spawn the worker on the current runtime. `fetch` is called once per
  /// settled request.
  pub fn spawn<F, Fut>(debounce: Duration, fetch: F) -> Self
  where
    F: Fn(DateTime<Utc>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let (requests, request_rx) = watch::channel(None);
    let (result_tx, results) = watch::channel(None);
    let worker = tokio::spawn(run(request_rx, result_tx, debounce, fetch));
    Self { requests, results, worker }
  }

  /// Ask for the state at `as_of`, superseding every earlier request.
  /// Returns the request's generation.
  pub fn request(&self, as_of: DateTime<Utc>) -> u64 {
    let mut generation = 0;
    self.requests.send_modify(|slot| {
      generation = slot.map_or(1, |r| r.generation + 1);
      *slot = Some(ScrubRequest { generation, as_of });
    });
    generation
  }

  /// The most recently published result, if any.
  pub fn latest(&self) -> Option<Scrubbed<T>> { self.results.borrow().clone() }

  /// Wait for the next published result.
  pub async fn next(&mut self) -> Result<Scrubbed<T>> {
    self.results.changed().await.map_err(|_| Error::FeedClosed)?;
    self.results.borrow_and_update().clone().ok_or(Error::FeedClosed)
  }

  /// Wait until a result for `generation` or a later request is published.
  pub async fn settled(&mut self, generation: u64) -> Result<Scrubbed<T>> {
    let published = self
      .results
      .wait_for(|r| r.as_ref().is_some_and(|s| s.generation >= generation))
      .await
      .map_err(|_| Error::FeedClosed)?;
    published.clone().ok_or(Error::FeedClosed)
  }
}

impl<T> Drop for ScrubFeed<T> {
  fn drop(&mut self) { self.worker.abort(); }
}

async fn run<T, F, Fut>(
  mut requests: watch::Receiver<Option<ScrubRequest>>,
  results: watch::Sender<Option<Scrubbed<T>>>,
  debounce: Duration,
  fetch: F,
) where
  F: Fn(DateTime<Utc>) -> Fut,
  Fut: Future<Output = Result<T>>,
{
  // Set when a request arrived while a fetch was in flight and has not been
  // handled yet.
  let mut pending = false;

  loop {
    if !pending && requests.changed().await.is_err() {
      return;
    }
    pending = false;

    // Trailing debounce: restart the window on every new request.
    loop {
      match time::timeout(debounce, requests.changed()).await {
        Ok(Ok(())) => continue,
        Ok(Err(_)) => return,
        Err(_) => break,
      }
    }

    let request = *requests.borrow_and_update();
    let Some(request) = request else { continue };
    debug!(generation = request.generation, as_of = %request.as_of, "scrub fetch started");

    tokio::select! {
      outcome = fetch(request.as_of) => {
        let latest = requests.borrow().map(|r| r.generation);
        if latest == Some(request.generation) {
          results.send_replace(Some(Scrubbed {
            generation: request.generation,
            as_of:      request.as_of,
            outcome:    outcome.map_err(Arc::new),
          }));
        } else {
          debug!(generation = request.generation, "scrub result discarded as stale");
        }
      }
      changed = requests.changed() => {
        if changed.is_err() {
          return;
        }
        debug!(generation = request.generation, "scrub fetch superseded");
        pending = true;
      }
    }
  }
}

/// A feed of transition views: each settled request refreshes `engine` from
/// `source`, reusing cached geometry, and resolves the transitions at the
/// requested instant.
pub fn transition_feed<S>(
  engine: SharedEngine,
  source: Arc<S>,
  filter: TransitionFilter,
  debounce: Duration,
) -> ScrubFeed<Arc<TransitionView>>
where
  S: EventSource + 'static,
  Error: From<S::Error>,
{
  ScrubFeed::spawn(debounce, move |as_of| {
    let engine = Arc::clone(&engine);
    let source = Arc::clone(&source);
    let filter = filter.clone();
    async move {
      Engine::refresh_shared(&engine, source.as_ref()).await?;
      Ok(Arc::new(engine.read().await.transitions(as_of, &filter)))
    }
  })
}
