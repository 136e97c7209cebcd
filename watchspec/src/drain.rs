use serde_json::Value;

use crate::{ChangeStream, StoreResult};

/// Read exactly `expected_count` change documents from `stream`, then close it.
///
/// Reads are strictly sequential; no read is issued when `expected_count` is
/// zero. The stream is closed exactly once whatever the outcome. A failed
/// read is reported in preference to a failed close; a failed close after
/// successful reads is reported on its own.
pub async fn drain<S: ChangeStream>(mut stream: S, expected_count: usize) -> StoreResult<Vec<Value>> {
    let mut changes = Vec::with_capacity(expected_count);
    let mut read_error = None;

    for idx in 0..expected_count {
        match stream.read_next().await {
            Ok(change) => {
                tracing::trace!(index = idx, "change received");
                changes.push(change);
            }
            Err(e) => {
                tracing::debug!(index = idx, error = %e, "change stream read failed");
                read_error = Some(e);
                break;
            }
        }
    }

    let closed = stream.close().await;

    match (read_error, closed) {
        (Some(e), _) => Err(e),
        (None, Err(e)) => {
            tracing::debug!(error = %e, "change stream close failed");
            Err(e)
        }
        (None, Ok(())) => Ok(changes),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use serde_json::json;

    use super::*;
    use crate::StoreError;

    #[derive(Default)]
    struct Counters {
        reads: AtomicUsize,
        closes: AtomicUsize,
    }

    /// Scripted stream: replies are popped in order, close result is fixed.
    struct ScriptedStream {
        replies: VecDeque<StoreResult<Value>>,
        close_result: StoreResult<()>,
        counters: Arc<Counters>,
    }

    impl ScriptedStream {
        fn new(replies: Vec<StoreResult<Value>>) -> (Self, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            let stream = Self {
                replies: replies.into(),
                close_result: Ok(()),
                counters: counters.clone(),
            };
            (stream, counters)
        }

        fn failing_close(mut self, err: StoreError) -> Self {
            self.close_result = Err(err);
            self
        }
    }

    impl ChangeStream for ScriptedStream {
        async fn read_next(&mut self) -> StoreResult<Value> {
            self.counters.reads.fetch_add(1, Ordering::SeqCst);
            self.replies
                .pop_front()
                .unwrap_or_else(|| Err(StoreError::new("no more scripted replies")))
        }

        async fn close(self) -> StoreResult<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            self.close_result
        }
    }

    #[tokio::test]
    async fn zero_count_closes_without_reading() {
        let (stream, counters) = ScriptedStream::new(vec![Ok(json!({ "x": 1 }))]);
        let changes = drain(stream, 0).await.unwrap();

        assert!(changes.is_empty());
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reads_exactly_n_in_arrival_order() {
        let (stream, counters) = ScriptedStream::new(vec![
            Ok(json!({ "n": 1 })),
            Ok(json!({ "n": 2 })),
            Ok(json!({ "n": 3 })),
        ]);
        let changes = drain(stream, 2).await.unwrap();

        assert_eq!(changes, vec![json!({ "n": 1 }), json!({ "n": 2 })]);
        assert_eq!(counters.reads.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_read_still_closes_once() {
        let err = StoreError::server(40573, "Location40573", "not a replica set");
        let (stream, counters) = ScriptedStream::new(vec![Ok(json!({ "n": 1 })), Err(err.clone())]);

        assert_eq!(drain(stream, 2).await.unwrap_err(), err);
        assert_eq!(counters.reads.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_error_wins_over_close_error() {
        let read_err = StoreError::new("read failed");
        let (stream, _) = ScriptedStream::new(vec![Err(read_err.clone())]);
        let stream = stream.failing_close(StoreError::new("close failed"));

        assert_eq!(drain(stream, 1).await.unwrap_err(), read_err);
    }

    #[tokio::test]
    async fn close_error_after_successful_reads_is_reported() {
        let close_err = StoreError::new("close failed");
        let (stream, counters) = ScriptedStream::new(vec![Ok(json!({}))]);
        let stream = stream.failing_close(close_err.clone());

        assert_eq!(drain(stream, 1).await.unwrap_err(), close_err);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_reads_after_first_failure() {
        let (stream, counters) = ScriptedStream::new(vec![
            Err(StoreError::new("boom")),
            Ok(json!({ "n": 2 })),
        ]);

        assert!(drain(stream, 2).await.is_err());
        assert_eq!(counters.reads.load(Ordering::SeqCst), 1);
    }
}
