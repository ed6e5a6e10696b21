//! Per-bucket FIFO dispatch with a shared global limit.
//!
//! Every bucket key gets its own worker task draining an unbounded queue, so
//! requests in one bucket run strictly one after another in submission order
//! while different buckets make progress independently.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::action::ActionTicket;
use super::transport::{RateLimitInfo, Request, Transport};
use crate::error::{ClientError, Result};

/// A validated request waiting in its bucket
pub struct QueuedRequest {
    pub request: Request,
    pub deadline: Option<Instant>,
    pub ticket: Arc<ActionTicket>,
    pub responder: oneshot::Sender<Result<Value>>,
}

#[derive(Debug, Default)]
struct BucketState {
    remaining: Option<u32>,
    reset_at: Option<Instant>,
    /// Remote bucket hash, if reported
    hash: Option<String>,
}

impl BucketState {
    /// Instant to sleep until before the next dispatch, if exhausted
    fn blocked_until(&mut self, now: Instant) -> Option<Instant> {
        match (self.remaining, self.reset_at) {
            (Some(0), Some(reset_at)) if reset_at > now => Some(reset_at),
            (Some(0), _) => {
                // window elapsed: quota is unknown until the next response
                self.remaining = None;
                self.reset_at = None;
                None
            }
            _ => None,
        }
    }

    fn update(&mut self, key: &str, info: &RateLimitInfo, now: Instant) {
        if let Some(remaining) = info.remaining {
            self.remaining = Some(remaining);
        }
        if let Some(reset_after) = info.reset_after {
            self.reset_at = Some(now + reset_after);
        }
        if let Some(hash) = &info.bucket {
            if self.hash.as_deref() != Some(hash.as_str()) {
                debug!("Bucket '{}' mapped to remote bucket {}", key, hash);
                self.hash = Some(hash.clone());
            }
        }
    }

    fn exhaust_for(&mut self, retry_after: Duration, now: Instant) {
        self.remaining = Some(0);
        self.reset_at = Some(now + retry_after);
    }
}

/// Global limit shared by every bucket
#[derive(Debug, Default)]
pub struct GlobalLimit {
    until: Mutex<Option<Instant>>,
}

impl GlobalLimit {
    pub fn block_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut current = self.until.lock();
        if current.map_or(true, |c| c < until) {
            warn!("Global rate limit hit, suspending all buckets for {:?}", duration);
            *current = Some(until);
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.until.lock().map_or(false, |until| until > Instant::now())
    }

    async fn wait(&self) {
        loop {
            let until = *self.until.lock();
            match until {
                Some(until) if until > Instant::now() => sleep_until(until).await,
                _ => return,
            }
        }
    }
}

struct BucketHandle {
    tx: mpsc::UnboundedSender<QueuedRequest>,
    state: Arc<Mutex<BucketState>>,
}

/// Dispatcher shared by a worker task
struct Dispatcher {
    key: String,
    transport: Arc<dyn Transport>,
    global: Arc<GlobalLimit>,
    state: Arc<Mutex<BucketState>>,
    max_retries: u32,
    fallback_backoff: Duration,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<QueuedRequest>) {
        debug!("Worker for bucket '{}' started", self.key);
        while let Some(queued) = rx.recv().await {
            let result = self.dispatch(&queued).await;
            match &result {
                Ok(_) => queued.ticket.finish(true),
                Err(ClientError::Cancelled) => {}
                Err(err) => {
                    debug!("[{}] {} failed: {}", queued.request.id, queued.request.route, err);
                    queued.ticket.finish(false);
                }
            }
            // the receiver may have given up waiting
            let _ = queued.responder.send(result);
        }
        debug!("Worker for bucket '{}' stopped", self.key);
    }

    async fn wait_for_bucket(&self) {
        loop {
            let blocked = self.state.lock().blocked_until(Instant::now());
            match blocked {
                Some(until) => {
                    debug!("Bucket '{}' exhausted, waiting", self.key);
                    sleep_until(until).await;
                }
                None => return,
            }
        }
    }

    async fn dispatch(&self, queued: &QueuedRequest) -> Result<Value> {
        let mut attempts = 0u32;
        loop {
            if queued.ticket.state().is_terminal() {
                return Err(ClientError::Cancelled);
            }

            self.global.wait().await;
            self.wait_for_bucket().await;

            if attempts == 0 {
                if let Some(deadline) = queued.deadline {
                    if Instant::now() >= deadline {
                        queued.ticket.expire();
                        return Err(ClientError::Timeout {
                            message: format!("deadline passed before {} was dispatched", queued.request.route),
                        });
                    }
                }
            }

            if !queued.ticket.begin_dispatch() {
                return Err(ClientError::Cancelled);
            }

            let response = self.transport.execute(&queued.request).await?;
            let now = Instant::now();
            self.state.lock().update(&self.key, &response.rate_limit, now);

            if !response.is_rate_limited() {
                return response.into_result();
            }

            let retry_after = response.retry_after().unwrap_or(self.fallback_backoff);
            if response.is_global() {
                self.global.block_for(retry_after);
            } else {
                self.state.lock().exhaust_for(retry_after, now);
            }

            attempts += 1;
            if attempts > self.max_retries {
                warn!(
                    "[{}] {} still rate limited after {} retries",
                    queued.request.id, queued.request.route, self.max_retries
                );
                return response.into_result();
            }
            info!(
                "[{}] {} rate limited, retrying in {:?} ({}/{})",
                queued.request.id, queued.request.route, retry_after, attempts, self.max_retries
            );
        }
    }
}

pub struct RateLimiter {
    transport: Arc<dyn Transport>,
    buckets: DashMap<String, BucketHandle>,
    global: Arc<GlobalLimit>,
    max_retries: u32,
    /// Backoff used when a 429 carries no retry hint
    fallback_backoff: Duration,
}

impl RateLimiter {
    pub fn new(transport: Arc<dyn Transport>, max_retries: u32, fallback_backoff: Duration) -> Self {
        Self {
            transport,
            buckets: DashMap::new(),
            global: Arc::new(GlobalLimit::default()),
            max_retries,
            fallback_backoff,
        }
    }

    pub fn global(&self) -> &Arc<GlobalLimit> {
        &self.global
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Remaining quota last reported for a bucket
    pub fn remaining(&self, bucket_key: &str) -> Option<u32> {
        self.buckets
            .get(bucket_key)
            .and_then(|handle| handle.state.lock().remaining)
    }

    /// Append to the bucket's queue, starting its worker on first use.
    /// Must be called within a tokio runtime.
    pub fn enqueue(&self, queued: QueuedRequest) -> Result<()> {
        let key = queued.request.route.bucket_key().to_string();
        let handle = self.buckets.entry(key.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let state = Arc::new(Mutex::new(BucketState::default()));
            let dispatcher = Dispatcher {
                key: key.clone(),
                transport: Arc::clone(&self.transport),
                global: Arc::clone(&self.global),
                state: Arc::clone(&state),
                max_retries: self.max_retries,
                fallback_backoff: self.fallback_backoff,
            };
            tokio::spawn(dispatcher.run(rx));
            BucketHandle { tx, state }
        });

        handle.tx.send(queued).map_err(|_| ClientError::Transport {
            message: format!("worker for bucket '{}' is gone", key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::route::channels;
    use crate::requests::{Action, RateLimitInfo, Response};
    use crate::testing::*;
    use serde_json::json;

    fn crosspost(requester: &crate::requests::SharedRequester, channel: u64, message: u64) -> Action<Value> {
        let route = channels::CROSSPOST_MESSAGE
            .compile(&[
                ("channel_id", channel.to_string().as_str()),
                ("message_id", message.to_string().as_str()),
            ])
            .unwrap();
        Action::new(Arc::clone(requester), route, Ok)
    }

    fn limited(retry_after: f64, global: bool) -> Response {
        Response::new(429, json!({ "retry_after": retry_after, "global": global }))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bucket_is_fifo_across_tasks() {
        let (requester, transport) = mock_requester(fixture_registry());
        transport.set_delay(Duration::from_millis(5));

        // each task submits once its predecessor has submitted, then hands on
        let (first_tx, mut prev_rx) = oneshot::channel::<()>();
        let mut tasks = Vec::new();
        for message in 1..=8u64 {
            let (next_tx, next_rx) = oneshot::channel::<()>();
            let turn = std::mem::replace(&mut prev_rx, next_rx);
            let requester = Arc::clone(&requester);
            tasks.push(tokio::spawn(async move {
                turn.await.unwrap();
                let pending = crosspost(&requester, 100, message).submit().unwrap();
                let _ = next_tx.send(());
                pending.await
            }));
        }
        first_tx.send(()).unwrap();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let paths = transport.paths();
        let expected: Vec<String> = (1..=8)
            .map(|m| format!("/channels/100/messages/{}/crosspost", m))
            .collect();
        assert_eq!(paths, expected);
        assert_eq!(transport.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_buckets_run_concurrently() {
        let (requester, transport) = mock_requester(fixture_registry());
        transport.set_delay(Duration::from_millis(30));

        let a = crosspost(&requester, 100, 1).submit().unwrap();
        let b = crosspost(&requester, 200, 1).submit().unwrap();
        let (a, b) = tokio::join!(a.wait(), b.wait());
        a.unwrap();
        b.unwrap();

        assert_eq!(requester.limiter().bucket_count(), 2);
        assert_eq!(transport.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_retry_after_rate_limit() {
        let (requester, transport) = mock_requester(fixture_registry());
        transport.push_response(limited(0.02, false));
        transport.push_response(Response::ok(json!({ "id": "1" })));

        let started = Instant::now();
        let value = crosspost(&requester, 100, 1).complete().await.unwrap();
        assert_eq!(value, json!({ "id": "1" }));
        assert_eq!(transport.call_count(), 2);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_retries_exhausted_surface_rate_limited() {
        let (requester, transport) = mock_requester_with_retries(fixture_registry(), 2);
        for _ in 0..3 {
            transport.push_response(limited(0.001, false));
        }

        let err = crosspost(&requester, 100, 1).complete().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Remote(crate::error::RemoteError::RateLimited { global: false, .. })
        ));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_bucket_delays_next_request() {
        let (requester, transport) = mock_requester(fixture_registry());
        transport.push_response(Response::ok(json!({})).with_rate_limit(RateLimitInfo {
            remaining: Some(0),
            reset_after: Some(Duration::from_millis(40)),
            ..Default::default()
        }));

        let started = Instant::now();
        crosspost(&requester, 100, 1).complete().await.unwrap();
        assert_eq!(requester.limiter().remaining("POST /channels/100/messages/{message_id}/crosspost"), Some(0));
        crosspost(&requester, 100, 2).complete().await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_global_limit_suspends_other_buckets() {
        let (requester, transport) = mock_requester(fixture_registry());
        requester.limiter().global().block_for(Duration::from_millis(50));
        assert!(requester.limiter().global().is_blocked());

        let started = Instant::now();
        let a = crosspost(&requester, 100, 1).submit().unwrap();
        let b = crosspost(&requester, 200, 1).submit().unwrap();
        let (a, b) = tokio::join!(a.wait(), b.wait());
        a.unwrap();
        b.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(45));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_global_rate_limit_response_is_retried() {
        let (requester, transport) = mock_requester(fixture_registry());
        transport.push_response(limited(0.03, true));

        let started = Instant::now();
        crosspost(&requester, 100, 1).complete().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(transport.call_count(), 2);
        assert!(!requester.limiter().global().is_blocked());
    }

    #[test]
    fn test_bucket_state_window() {
        let now = Instant::now();
        let mut state = BucketState::default();
        assert!(state.blocked_until(now).is_none());

        state.exhaust_for(Duration::from_secs(1), now);
        assert_eq!(state.blocked_until(now), Some(now + Duration::from_secs(1)));
        assert!(state.blocked_until(now + Duration::from_secs(2)).is_none());
        assert_eq!(state.remaining, None);
    }
}
