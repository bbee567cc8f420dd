use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::anyhow;
use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::config::RemoteConfig;
use crate::core::lock::{lock_mutex, wait_until};
use crate::core::{ComponentLogger, LogContext, SinkError, SinkResult};
use crate::sink::Sink;
use crate::sink::http::{HttpAuth, build_agent, put_bytes, resource_url};

const DRAIN_POLL: Duration = Duration::from_millis(20);

struct PutJob {
    id: u64,
    url: String,
    body: Vec<u8>,
}

/// Requests accepted by one sink but not yet answered.
#[derive(Default)]
struct InFlight {
    next_id: AtomicU64,
    pending: Mutex<HashSet<u64>>,
}

impl InFlight {
    fn register(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_mutex(&self.pending, "in-flight register").insert(id);
        id
    }

    fn complete(&self, id: u64) {
        lock_mutex(&self.pending, "in-flight complete").remove(&id);
    }

    fn len(&self) -> usize {
        lock_mutex(&self.pending, "in-flight len").len()
    }
}

/// HTTP PUT sink backed by a fixed pool of worker threads.
///
/// `write` only queues the request; delivery failures are logged by the
/// workers. All workers share one `ureq::Agent`, which keeps connections alive
/// between requests.
pub struct PooledHttpSink {
    host: String,
    queue: Option<Sender<PutJob>>,
    in_flight: Arc<InFlight>,
    workers: Vec<JoinHandle<()>>,
}

impl PooledHttpSink {
    pub fn new(
        host: &str,
        auth: Option<HttpAuth>,
        workers: usize,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        if workers == 0 {
            return Err(anyhow!("pooled http sink needs at least one worker"));
        }

        let host = host.trim_end_matches('/').to_string();
        let auth = auth.map(|a| a.header());
        let agent = build_agent(timeout);
        let in_flight = Arc::new(InFlight::default());
        let (tx, rx) = unbounded::<PutJob>();

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx: Receiver<PutJob> = rx.clone();
            let agent = agent.clone();
            let auth = auth.clone();
            let in_flight = in_flight.clone();
            let handle = std::thread::Builder::new()
                .name(format!("http-put-{}", i))
                .spawn(move || {
                    for job in rx.iter() {
                        if let Err(e) = put_bytes(&agent, &job.url, auth.as_deref(), &job.body) {
                            log::warn!("[http_pool] {}", e);
                        }
                        in_flight.complete(job.id);
                    }
                })?;
            handles.push(handle);
        }

        Ok(Self {
            host,
            queue: Some(tx),
            in_flight,
            workers: handles,
        })
    }

    pub fn from_config(cfg: &RemoteConfig) -> anyhow::Result<Self> {
        Self::new(
            &cfg.host,
            HttpAuth::from_remote(cfg),
            cfg.workers,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }
}

impl ComponentLogger for PooledHttpSink {
    fn log_context(&self) -> LogContext {
        LogContext::new("PooledHttpSink", &self.host)
    }
}

impl Sink for PooledHttpSink {
    fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> SinkResult {
        let queue = match &self.queue {
            Some(q) => q,
            None => {
                return Err(SinkError::unavailable(
                    "queue PUT",
                    anyhow!("sink is shut down"),
                ));
            }
        };

        let id = self.in_flight.register();
        let job = PutJob {
            id,
            url: resource_url(&self.host, dir, name),
            body: bytes.to_vec(),
        };
        if queue.send(job).is_err() {
            self.in_flight.complete(id);
            return Err(SinkError::unavailable(
                "queue PUT",
                anyhow!("all workers exited"),
            ));
        }
        Ok(())
    }

    fn drain(&self, timeout: Duration) -> bool {
        let done = wait_until(timeout, DRAIN_POLL, || self.in_flight.len() == 0);
        if !done {
            self.warn(&format!(
                "{} requests still in flight after {:?}",
                self.in_flight.len(),
                timeout
            ));
        }
        done
    }
}

impl Drop for PooledHttpSink {
    fn drop(&mut self) {
        // closing the queue lets the workers finish what is queued and exit
        self.queue.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("[http_pool] worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_rejected() {
        assert!(PooledHttpSink::new("http://127.0.0.1:1", None, 0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn unreachable_host_does_not_fail_write() {
        // port 1 on loopback refuses connections immediately
        let sink =
            PooledHttpSink::new("http://127.0.0.1:1", None, 2, Duration::from_secs(1)).unwrap();
        sink.write("data/1/0/", "a.csv", b"1,").unwrap();
        assert!(sink.drain(Duration::from_secs(10)));
        assert_eq!(sink.pending(), 0);
    }
}
