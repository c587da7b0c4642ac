//! Bounded fan-out with a hard deadline.

use std::{future::Future, sync::Arc};

use tokio::{
  sync::Semaphore,
  task::JoinSet,
  time::{Instant, timeout_at},
};
use tracing::warn;

/// Run `f` over `items` with at most `concurrency` calls in flight.
///
/// Returns every item in input order, paired with its result, or `None` if
/// it did not finish before `deadline` (or its task panicked). Work still in
/// flight at the deadline is aborted.
pub async fn fan_out<T, R, F, Fut>(
  items: Vec<T>,
  concurrency: usize,
  deadline: Instant,
  f: F,
) -> Vec<(T, Option<R>)>
where
  T: Clone + Send + 'static,
  R: Send + 'static,
  F: Fn(T) -> Fut,
  Fut: Future<Output = R> + Send + 'static,
{
  let permits = Arc::new(Semaphore::new(concurrency.max(1)));
  let mut set = JoinSet::new();

  for (idx, item) in items.iter().cloned().enumerate() {
    let permits = permits.clone();
    let work = f(item);
    set.spawn(async move {
      let _permit = permits.acquire_owned().await.ok();
      (idx, work.await)
    });
  }

  let mut results: Vec<Option<R>> = items.iter().map(|_| None).collect();
  loop {
    match timeout_at(deadline, set.join_next()).await {
      Ok(Some(Ok((idx, result)))) => results[idx] = Some(result),
      Ok(Some(Err(e))) => warn!("worker task failed: {e}"),
      Ok(None) => break,
      Err(_) => {
        warn!(in_flight = set.len(), "deadline reached; aborting remaining work");
        set.abort_all();
        break;
      }
    }
  }

  items.into_iter().zip(results).collect()
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
  };

  use super::*;

  #[tokio::test]
  async fn results_keep_input_order() {
    let deadline = Instant::now() + Duration::from_secs(5);
    let out = fan_out(vec![30u64, 10, 20], 3, deadline, |ms| async move {
      tokio::time::sleep(Duration::from_millis(ms)).await;
      ms * 2
    })
    .await;

    assert_eq!(out, vec![(30, Some(60)), (10, Some(20)), (20, Some(40))]);
  }

  #[tokio::test]
  async fn concurrency_is_bounded() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let deadline = Instant::now() + Duration::from_secs(5);

    fan_out((0..12).collect::<Vec<u32>>(), 3, deadline, |_| {
      let running = running.clone();
      let peak = peak.clone();
      async move {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        running.fetch_sub(1, Ordering::SeqCst);
      }
    })
    .await;

    assert!(peak.load(Ordering::SeqCst) <= 3);
  }

  #[tokio::test]
  async fn deadline_reports_unfinished_items() {
    let deadline = Instant::now() + Duration::from_millis(200);
    let out = fan_out(vec![1u64, 10_000], 2, deadline, |ms| async move {
      tokio::time::sleep(Duration::from_millis(ms)).await;
      ms
    })
    .await;

    assert_eq!(out[0], (1, Some(1)));
    assert_eq!(out[1], (10_000, None));
  }
}
