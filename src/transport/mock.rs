//! Scripted in-memory transport for tests.
//!
//! Outcomes are queued per URL (or for any URL) and replayed in order; once a
//! queue is drained the optional fallback outcome repeats forever.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::BoxFuture;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

const ANY_URL: &str = "*";

#[derive(Debug, Clone)]
struct Step {
    outcome: Result<HttpResponse, TransportError>,
    delay: Duration,
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<Step>,
    fallback: Option<Step>,
}

impl Script {
    fn next(&mut self) -> Option<Step> {
        self.queue.pop_front().or_else(|| self.fallback.clone())
    }
}

/// Transport replaying pre-programmed outcomes and recording every request.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one outcome for any URL.
    pub fn push(&self, outcome: Result<HttpResponse, TransportError>) -> &Self {
        self.push_for(ANY_URL, outcome)
    }

    /// Queue one outcome for an exact URL.
    pub fn push_for(&self, url: &str, outcome: Result<HttpResponse, TransportError>) -> &Self {
        self.with_script(url, |script| {
            script.queue.push_back(Step {
                outcome,
                delay: Duration::ZERO,
            })
        });
        self
    }

    /// Outcome returned for any URL once its queue is empty.
    pub fn always(&self, outcome: Result<HttpResponse, TransportError>) -> &Self {
        self.always_for(ANY_URL, outcome)
    }

    pub fn always_for(&self, url: &str, outcome: Result<HttpResponse, TransportError>) -> &Self {
        self.always_delayed_for(url, outcome, Duration::ZERO)
    }

    /// Like [`always_for`](Self::always_for) but each reply is held back by `delay`.
    pub fn always_delayed_for(
        &self,
        url: &str,
        outcome: Result<HttpResponse, TransportError>,
        delay: Duration,
    ) -> &Self {
        self.with_script(url, |script| script.fallback = Some(Step { outcome, delay }));
        self
    }

    /// Total number of `send` invocations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn with_script(&self, url: &str, f: impl FnOnce(&mut Script)) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        f(scripts.entry(url.to_string()).or_default());
    }

    fn next_step(&self, url: &str) -> Option<Step> {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(step) = scripts.get_mut(url).and_then(Script::next) {
            return Some(step);
        }
        scripts.get_mut(ANY_URL).and_then(Script::next)
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.next_step(&request.url);
            self.requests
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(request.clone());

            let Some(step) = step else {
                return Err(TransportError::Other(format!("no scripted response for {}", request.url)));
            };
            if !step.delay.is_zero() {
                // Honour the caller's timeout the way a real client would
                if step.delay >= request.timeout {
                    tokio::time::sleep(request.timeout).await;
                    return Err(TransportError::Timeout(request.timeout));
                }
                tokio::time::sleep(step.delay).await;
            }
            step.outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let transport = ScriptedTransport::new();
        transport
            .push(Ok(HttpResponse::new(503)))
            .always(Ok(HttpResponse::new(200)));

        let req = || HttpRequest::new("GET", "http://svc/a", Duration::from_secs(1));
        assert_eq!(transport.send(req()).await.unwrap().status, 503);
        assert_eq!(transport.send(req()).await.unwrap().status, 200);
        assert_eq!(transport.send(req()).await.unwrap().status, 200);
        assert_eq!(transport.calls(), 3);
        assert_eq!(transport.calls_for("http://svc/a"), 3);
    }

    #[tokio::test]
    async fn test_url_specific_script_wins() {
        let transport = ScriptedTransport::new();
        transport
            .always(Ok(HttpResponse::new(200)))
            .always_for("http://svc/down", Err(TransportError::Connect("refused".into())));

        let down = HttpRequest::new("GET", "http://svc/down", Duration::from_secs(1));
        let up = HttpRequest::new("GET", "http://svc/up", Duration::from_secs(1));
        assert!(transport.send(down).await.is_err());
        assert_eq!(transport.send(up).await.unwrap().status, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_beyond_timeout_times_out() {
        let transport = ScriptedTransport::new();
        transport.always_delayed_for("http://slow", Ok(HttpResponse::new(200)), Duration::from_secs(30));

        let req = HttpRequest::new("GET", "http://slow", Duration::from_secs(2));
        let err = transport.send(req).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_secs(2)));
    }
}
