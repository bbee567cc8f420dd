use std::time::Duration;

use anyhow::anyhow;
use base64::{Engine as _, engine::general_purpose};

use crate::config::RemoteConfig;
use crate::core::{ComponentLogger, LogContext, SinkError, SinkResult};
use crate::sink::Sink;

/// Basic credentials for the remote endpoint.
#[derive(Debug, Clone)]
pub struct HttpAuth {
    pub user: String,
    pub password: String,
}

impl HttpAuth {
    pub fn header(&self) -> String {
        let raw = format!("{}:{}", self.user, self.password);
        format!("Basic {}", general_purpose::STANDARD.encode(raw))
    }

    pub fn from_remote(cfg: &RemoteConfig) -> Option<Self> {
        cfg.user.as_ref().map(|user| HttpAuth {
            user: user.clone(),
            password: cfg.password.clone().unwrap_or_default(),
        })
    }
}

/// `host/dir/name` with forward slashes only.
pub fn resource_url(host: &str, dir: &str, name: &str) -> String {
    let path = format!("{}{}", dir, name).replace('\\', "/");
    format!("{}/{}", host.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5).min(timeout))
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

pub(crate) fn put_bytes(
    agent: &ureq::Agent,
    url: &str,
    auth: Option<&str>,
    body: &[u8],
) -> SinkResult {
    let mut request = agent.put(url).set("Content-Type", "application/octet-stream");
    if let Some(auth) = auth {
        request = request.set("Authorization", auth);
    }

    match request.send_bytes(body) {
        Ok(_) => Ok(()),
        Err(ureq::Error::Status(status, resp)) => Err(SinkError::write(
            format!("PUT {}", url),
            anyhow!("http status {} {}", status, resp.status_text()),
        )),
        Err(e) => Err(SinkError::write(format!("PUT {}", url), e)),
    }
}

/// Sends every output unit as one blocking HTTP PUT.
pub struct HttpSink {
    host: String,
    auth: Option<String>,
    agent: ureq::Agent,
}

impl HttpSink {
    pub fn new(host: &str, auth: Option<HttpAuth>, timeout: Duration) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            auth: auth.map(|a| a.header()),
            agent: build_agent(timeout),
        }
    }

    pub fn from_config(cfg: &RemoteConfig) -> Self {
        Self::new(
            &cfg.host,
            HttpAuth::from_remote(cfg),
            Duration::from_secs(cfg.timeout_secs),
        )
    }
}

impl ComponentLogger for HttpSink {
    fn log_context(&self) -> LogContext {
        LogContext::new("HttpSink", &self.host)
    }
}

impl Sink for HttpSink {
    fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> SinkResult {
        let url = resource_url(&self.host, dir, name);
        put_bytes(&self.agent, &url, self.auth.as_deref(), bytes)?;
        self.debug(&format!("PUT {} ({} bytes)", url, bytes.len()));
        Ok(())
    }
}
