use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::app::error::{FetchError, WebDriverError};
use crate::app::fetch::{FETCH_TIMEOUT, FetchBackend, FetchPurpose, USER_AGENT};
use crate::app::scope::CanonicalUrl;
use crate::app::types::{EventSink, send_status};

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

const DRIVER_BINARY: &str = "chromedriver";
const DRIVER_START_TIMEOUT: Duration = Duration::from_secs(12);
const BODY_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const BODY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DISCOVERY_SETTLE: Duration = Duration::from_secs(2);
const EXTRACTION_SETTLE: Duration = Duration::from_secs(3);
const WINDOW_SIZE: &str = "1920,1080";

struct DriverProcess(Child);

impl Drop for DriverProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// One headless Chrome session driven over the WebDriver wire protocol.
/// Call [`WebDriverBackend::release`] when done; the spawned driver is killed
/// on drop regardless.
pub struct WebDriverBackend {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
    driver: Option<DriverProcess>,
    session_lock: Mutex<()>,
    settle_discovery: Duration,
    settle_extraction: Duration,
}

impl WebDriverBackend {
    pub async fn start(endpoint: &str, tx: &EventSink) -> Result<Self, WebDriverError> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let driver = ensure_webdriver_ready(&endpoint, tx).await?;

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT + Duration::from_secs(10))
            .build()?;
        let session_id = webdriver_create_session(&client, &endpoint)
            .await
            .map_err(WebDriverError::Session)?;
        send_status(tx, format!("headless Chrome session {session_id} ready at {endpoint}"));

        Ok(Self {
            client,
            endpoint,
            session_id,
            driver,
            session_lock: Mutex::new(()),
            settle_discovery: DISCOVERY_SETTLE,
            settle_extraction: EXTRACTION_SETTLE,
        })
    }

    pub async fn release(mut self, tx: &EventSink) {
        if let Err(err) =
            webdriver_delete_session(&self.client, &self.endpoint, &self.session_id).await
        {
            send_status(tx, format!("webdriver session cleanup failed: {err}"));
        }
        if let Some(driver) = self.driver.take() {
            drop(driver);
        }
        send_status(tx, "headless Chrome session closed");
    }

    async fn wait_for_body(&self) -> Result<(), FetchError> {
        let deadline = Instant::now() + BODY_WAIT_TIMEOUT;
        loop {
            let check = execute_script(
                &self.client,
                &self.endpoint,
                &self.session_id,
                "return document.body !== null;",
            )
            .await;
            let last_error = match check {
                Ok(ready) if ready.as_bool().unwrap_or(false) => return Ok(()),
                Ok(_) => None,
                Err(err) => {
                    debug!("body check failed, polling again: {err}");
                    Some(err)
                }
            };
            if Instant::now() >= deadline {
                return Err(last_error.map_or(FetchError::Timeout, FetchError::Browser));
            }
            tokio::time::sleep(BODY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl FetchBackend for WebDriverBackend {
    async fn fetch(&self, url: &CanonicalUrl, purpose: FetchPurpose) -> Result<String, FetchError> {
        let _session = self.session_lock.lock().await;
        webdriver_navigate(&self.client, &self.endpoint, &self.session_id, url.as_str()).await?;
        self.wait_for_body().await?;
        let settle = match purpose {
            FetchPurpose::Discovery => self.settle_discovery,
            FetchPurpose::Extraction => self.settle_extraction,
        };
        tokio::time::sleep(settle).await;
        let html = webdriver_rendered_html(&self.client, &self.endpoint, &self.session_id)
            .await
            .map_err(FetchError::Browser)?;
        debug!("rendered {} bytes for {}", html.len(), url);
        Ok(html)
    }

    fn renders_scripts(&self) -> bool {
        true
    }

    fn max_in_flight(&self) -> usize {
        1
    }

    fn label(&self) -> &'static str {
        "headless-chrome"
    }
}

fn webdriver_reachable(endpoint: &str) -> bool {
    let Ok(parsed) = Url::parse(endpoint) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let port = parsed.port_or_known_default().unwrap_or(9515);
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok())
}

async fn ensure_webdriver_ready(
    endpoint: &str,
    tx: &EventSink,
) -> Result<Option<DriverProcess>, WebDriverError> {
    if webdriver_reachable(endpoint) {
        send_status(tx, format!("using running WebDriver at {endpoint}"));
        return Ok(None);
    }
    send_status(tx, format!("WebDriver not reachable at {endpoint}, starting {DRIVER_BINARY}"));
    start_webdriver(endpoint).await.map(Some)
}

async fn start_webdriver(endpoint: &str) -> Result<DriverProcess, WebDriverError> {
    let parsed =
        Url::parse(endpoint).map_err(|e| WebDriverError::InvalidEndpoint(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| WebDriverError::InvalidEndpoint("webdriver url has no host".to_string()))?
        .to_ascii_lowercase();
    let unavailable = |reason: String| WebDriverError::Unavailable {
        endpoint: endpoint.to_string(),
        reason,
    };
    if host != "localhost" && host != "127.0.0.1" {
        return Err(unavailable(
            "autostart only supports localhost endpoints".to_string(),
        ));
    }
    let port = parsed.port_or_known_default().unwrap_or(9515);

    let child = Command::new(DRIVER_BINARY)
        .arg(format!("--port={port}"))
        .arg("--log-level=SEVERE")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| unavailable(format!("failed to spawn {DRIVER_BINARY}: {e}")))?;
    let mut driver = DriverProcess(child);

    let steps = (DRIVER_START_TIMEOUT.as_millis() / 200).max(1);
    for _ in 0..steps {
        if webdriver_reachable(endpoint) {
            return Ok(driver);
        }
        if let Ok(Some(status)) = driver.0.try_wait() {
            return Err(unavailable(format!(
                "{DRIVER_BINARY} exited early with status {status}"
            )));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    Err(unavailable(format!(
        "{DRIVER_BINARY} did not become ready within {}s",
        DRIVER_START_TIMEOUT.as_secs()
    )))
}

fn webdriver_capabilities() -> Value {
    let timeout_ms = u64::try_from(FETCH_TIMEOUT.as_millis()).unwrap_or(u64::MAX);
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "acceptInsecureCerts": true,
                "timeouts": {
                    "pageLoad": timeout_ms,
                    "script": timeout_ms
                },
                "goog:chromeOptions": {
                    "args": [
                        "--headless",
                        "--no-sandbox",
                        "--disable-dev-shm-usage",
                        "--disable-gpu",
                        format!("--window-size={WINDOW_SIZE}"),
                        format!("--user-agent={USER_AGENT}")
                    ]
                }
            }
        }
    })
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "..."
}

fn protocol_error(value: &Value) -> Option<(String, String)> {
    let err = value.pointer("/value/error").and_then(|v| v.as_str())?;
    let message = value
        .pointer("/value/message")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown webdriver error");
    Some((err.to_string(), message.to_string()))
}

async fn webdriver_create_session(
    client: &reqwest::Client,
    endpoint: &str,
) -> Result<String, String> {
    let res = client
        .post(format!("{endpoint}/session"))
        .json(&webdriver_capabilities())
        .send()
        .await
        .map_err(|e| format!("session create request failed: {e}"))?;
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| format!("session create response read failed: {e}"))?;
    if !status.is_success() {
        return Err(format!(
            "session create HTTP {}: {}",
            status.as_u16(),
            truncate_for_log(&body, 260)
        ));
    }

    let value: Value =
        serde_json::from_str(&body).map_err(|e| format!("session create parse failed: {e}"))?;
    if let Some((err, message)) = protocol_error(&value) {
        return Err(format!("{err}: {message}"));
    }
    value
        .pointer("/value/sessionId")
        .and_then(|v| v.as_str())
        .or_else(|| value.pointer("/sessionId").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
        .ok_or_else(|| {
            format!(
                "session id missing in response: {}",
                truncate_for_log(&body, 220)
            )
        })
}

async fn webdriver_navigate(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
    url: &str,
) -> Result<(), FetchError> {
    let res = client
        .post(format!("{endpoint}/session/{session_id}/url"))
        .json(&json!({ "url": url }))
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Browser(format!("navigate request failed: {e}"))
            }
        })?;
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| FetchError::Browser(format!("navigate response read failed: {e}")))?;
    let value: Value = serde_json::from_str(&body).unwrap_or_default();
    if let Some((err, message)) = protocol_error(&value) {
        if err == "timeout" {
            return Err(FetchError::Timeout);
        }
        return Err(FetchError::Browser(format!("{err}: {message}")));
    }
    if !status.is_success() {
        return Err(FetchError::Browser(format!(
            "navigate HTTP {}: {}",
            status.as_u16(),
            truncate_for_log(&body, 240)
        )));
    }
    Ok(())
}

async fn execute_script(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
    script: &str,
) -> Result<Value, String> {
    let res = client
        .post(format!("{endpoint}/session/{session_id}/execute/sync"))
        .json(&json!({ "script": script, "args": [] }))
        .send()
        .await
        .map_err(|e| format!("execute script request failed: {e}"))?;
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| format!("execute script response read failed: {e}"))?;
    if !status.is_success() {
        return Err(format!(
            "execute script HTTP {}: {}",
            status.as_u16(),
            truncate_for_log(&body, 240)
        ));
    }
    let value: Value =
        serde_json::from_str(&body).map_err(|e| format!("execute parse failed: {e}"))?;
    if let Some((err, message)) = protocol_error(&value) {
        return Err(format!("{err}: {message}"));
    }
    Ok(value.get("value").cloned().unwrap_or(Value::Null))
}

async fn webdriver_rendered_html(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
) -> Result<String, String> {
    let script = r#"
        return document.documentElement ? document.documentElement.outerHTML : "";
    "#;
    let value = execute_script(client, endpoint, session_id, script).await?;
    let html = value.as_str().unwrap_or_default().to_string();
    if html.is_empty() {
        return Err("empty rendered snapshot".to_string());
    }
    Ok(html)
}

async fn webdriver_delete_session(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: &str,
) -> Result<(), String> {
    client
        .delete(format!("{endpoint}/session/{session_id}"))
        .send()
        .await
        .map_err(|e| format!("delete session failed: {e}"))?;
    Ok(())
}
