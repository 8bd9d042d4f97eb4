//! Request sequencing and completion delivery.
//!
//! Every request is tagged with a monotonically increasing sequence number
//! per request kind. Older requests are never cancelled; instead a response
//! is accepted only if its sequence is the latest one issued, so whatever
//! order responses arrive in, the visible state reflects the newest filter.
//!
//! `FetchDispatcher` runs blocking fetches on worker threads and hands
//! completions back over a channel, to be drained on the UI thread.

use crate::ingest::api::{CatalogQuery, MeasurementQuery};
use crate::ingest::{MeasurementBatch, MeasurementSource};
use crate::model::{FetchError, Site};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sequence(pub u64);

/// Issues sequence numbers and decides which responses are authoritative.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    issued: u64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> Sequence {
        self.issued += 1;
        Sequence(self.issued)
    }

    pub fn latest(&self) -> Option<Sequence> {
        (self.issued > 0).then_some(Sequence(self.issued))
    }

    /// `true` only for the most recently issued sequence.
    pub fn is_current(&self, seq: Sequence) -> bool {
        self.issued > 0 && seq.0 == self.issued
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRequest {
    pub seq: Sequence,
    pub query: CatalogQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRequest {
    pub seq: Sequence,
    pub query: MeasurementQuery,
}

/// A finished request, tagged with the sequence it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Catalog {
        seq: Sequence,
        result: Result<Vec<Site>, FetchError>,
    },
    Measurements {
        seq: Sequence,
        result: Result<MeasurementBatch, FetchError>,
    },
}

impl Completion {
    pub fn seq(&self) -> Sequence {
        match self {
            Completion::Catalog { seq, .. } | Completion::Measurements { seq, .. } => *seq,
        }
    }
}

/// Runs fetches on worker threads; completions come back through `poll`.
pub struct FetchDispatcher<S: MeasurementSource> {
    source: Arc<S>,
    send: Sender<Completion>,
    recv: Receiver<Completion>,
}

impl<S: MeasurementSource> FetchDispatcher<S> {
    pub fn new(source: S) -> Self {
        let (send, recv) = mpsc::channel();
        Self {
            source: Arc::new(source),
            send,
            recv,
        }
    }

    pub fn submit_catalog(&self, request: CatalogRequest) {
        let source = Arc::clone(&self.source);
        let send = self.send.clone();
        thread::spawn(move || {
            let result = source.fetch_site_catalog(&request.query);
            // The receiver only goes away when the dispatcher is dropped.
            let _ = send.send(Completion::Catalog {
                seq: request.seq,
                result,
            });
        });
    }

    pub fn submit_measurements(&self, request: MeasurementRequest) {
        let source = Arc::clone(&self.source);
        let send = self.send.clone();
        thread::spawn(move || {
            let result = source.fetch_measurements(&request.query);
            let _ = send.send(Completion::Measurements {
                seq: request.seq,
                result,
            });
        });
    }

    /// Completions that have arrived so far, without blocking.
    pub fn poll(&self) -> Vec<Completion> {
        self.recv.try_iter().collect()
    }

    /// Waits up to `timeout` for the next completion.
    pub fn wait(&self, timeout: Duration) -> Option<Completion> {
        match self.recv.recv_timeout(timeout) {
            Ok(c) => Some(c),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FilterState;

    #[test]
    fn test_only_latest_sequence_is_current() {
        let mut tracker = RequestTracker::new();
        assert_eq!(tracker.latest(), None);
        assert!(!tracker.is_current(Sequence(0)));

        let first = tracker.issue();
        assert!(tracker.is_current(first));
        let second = tracker.issue();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
        assert!(second > first);
    }

    struct FixedSource;

    impl MeasurementSource for FixedSource {
        fn fetch_site_catalog(&self, _query: &CatalogQuery) -> Result<Vec<Site>, FetchError> {
            Ok(vec![Site { name: "A".into(), span: None }])
        }

        fn fetch_measurements(&self, _query: &MeasurementQuery) -> Result<MeasurementBatch, FetchError> {
            Err(FetchError::Http(503))
        }
    }

    #[test]
    fn test_dispatcher_delivers_tagged_completions() {
        let dispatcher = FetchDispatcher::new(FixedSource);
        let filter = FilterState::default();
        dispatcher.submit_catalog(CatalogRequest {
            seq: Sequence(7),
            query: CatalogQuery::from_filter(&filter),
        });
        dispatcher.submit_measurements(MeasurementRequest {
            seq: Sequence(3),
            query: MeasurementQuery::from_filter(&filter),
        });

        let mut got = Vec::new();
        while got.len() < 2 {
            let c = dispatcher
                .wait(Duration::from_secs(5))
                .expect("worker should complete");
            got.push(c);
        }
        got.sort_by_key(|c| c.seq());
        assert!(matches!(
            &got[0],
            Completion::Measurements { seq: Sequence(3), result: Err(FetchError::Http(503)) }
        ));
        assert!(matches!(&got[1], Completion::Catalog { seq: Sequence(7), result: Ok(_) }));
    }
}
