//! Browser session driver for the monitored web client.
//!
//! The monitor drives a single automation-controlled browser through the
//! `SessionDriver` capability trait. The production implementation,
//! `WebDriverSession`, speaks the W3C WebDriver wire protocol against a
//! local chromedriver over blocking HTTP. Tests substitute fakes.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

/// W3C WebDriver element identifier key in element responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Step between retries while waiting for a selector to appear.
const WAIT_POLL_STEP: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webdriver protocol error: {0}")]
    Protocol(String),
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("timed out after {1:?} waiting for {0}")]
    WaitTimeout(String, Duration),
    #[error("no active browser session")]
    NoSession,
}

impl DriverError {
    /// Whether the underlying session is unlikely to recover without a
    /// reconnect (transport failures, dead session), as opposed to a
    /// single missing element.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Http(_) | DriverError::NoSession)
    }
}

/// Opaque reference to a DOM element held by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Capability interface over one automation-controlled browser session.
///
/// The session is exclusively owned by the connection manager; everything
/// else reaches the DOM through these primitives.
pub trait SessionDriver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;
    fn find_element(&mut self, selector: &str) -> Result<ElementHandle, DriverError>;
    fn find_elements(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError>;
    fn find_child_element(
        &mut self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<ElementHandle, DriverError>;
    fn find_child_elements(
        &mut self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError>;
    fn element_text(&mut self, element: &ElementHandle) -> Result<String, DriverError>;
    fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Poll for `selector` until it appears or `timeout` elapses.
    fn wait_for(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find_element(selector) {
                Ok(element) => return Ok(element),
                Err(DriverError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
            if Instant::now() >= deadline {
                return Err(DriverError::WaitTimeout(selector.to_string(), timeout));
            }
            std::thread::sleep(WAIT_POLL_STEP);
        }
    }

    /// Tear down the session. Further calls fail with `NoSession`.
    fn quit(&mut self) -> Result<(), DriverError>;
}

/// Options for opening a chromedriver-backed session.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Base URL of the WebDriver endpoint (chromedriver).
    pub webdriver_url: String,
    /// Persistent browser profile directory, so authentication survives
    /// restarts. `None` runs with a throwaway profile.
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
    pub window_size: (u32, u32),
    /// Timeout applied to every wire-protocol HTTP call.
    pub http_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            profile_dir: None,
            headless: true,
            window_size: (1280, 720),
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// A live W3C WebDriver session.
pub struct WebDriverSession {
    http: reqwest::blocking::Client,
    base_url: String,
    session_id: Option<String>,
}

enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl WebDriverSession {
    /// Open a new browser session with the configured Chrome options.
    pub fn new(config: &DriverConfig) -> Result<Self, DriverError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();

        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--disable-extensions".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!(
                "--window-size={},{}",
                config.window_size.0, config.window_size.1
            ),
        ];
        if config.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(profile_dir) = &config.profile_dir {
            args.push(format!("--user-data-dir={}", profile_dir.display()));
        }

        let payload = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let mut session = Self {
            http,
            base_url,
            session_id: None,
        };
        let value = session.execute(HttpMethod::Post, "/session", Some(payload))?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| DriverError::Protocol("missing sessionId in response".to_string()))?
            .to_string();
        session.session_id = Some(session_id);
        Ok(session)
    }

    fn session_path(&self, suffix: &str) -> Result<String, DriverError> {
        let session_id = self.session_id.as_deref().ok_or(DriverError::NoSession)?;
        Ok(format!("/session/{}{}", session_id, suffix))
    }

    fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}{}", self.base_url, path);
        let request = match method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self
                .http
                .post(&url)
                .json(&body.unwrap_or_else(|| json!({}))),
            HttpMethod::Delete => self.http.delete(&url),
        };

        let response = request.send()?;
        let status = response.status();
        let body: Value = response.json()?;

        if !status.is_success() {
            let error = body["value"]["error"].as_str().unwrap_or("unknown error");
            let message = body["value"]["message"]
                .as_str()
                .unwrap_or("")
                .lines()
                .next()
                .unwrap_or("");
            if error == "no such element" || error == "stale element reference" {
                return Err(DriverError::NotFound(format!("{}: {}", error, message)));
            }
            return Err(DriverError::Protocol(format!("{}: {}", error, message)));
        }

        Ok(body["value"].clone())
    }

    fn parse_element(value: &Value) -> Result<ElementHandle, DriverError> {
        value[ELEMENT_KEY]
            .as_str()
            .map(ElementHandle::new)
            .ok_or_else(|| DriverError::Protocol("missing element reference".to_string()))
    }

    fn parse_elements(value: &Value) -> Result<Vec<ElementHandle>, DriverError> {
        let items = value
            .as_array()
            .ok_or_else(|| DriverError::Protocol("expected element array".to_string()))?;
        items.iter().map(Self::parse_element).collect()
    }

    fn locator(selector: &str) -> Value {
        json!({ "using": "css selector", "value": selector })
    }
}

impl SessionDriver for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let path = self.session_path("/url")?;
        self.execute(HttpMethod::Post, &path, Some(json!({ "url": url })))?;
        Ok(())
    }

    fn find_element(&mut self, selector: &str) -> Result<ElementHandle, DriverError> {
        let path = self.session_path("/element")?;
        let value = self.execute(HttpMethod::Post, &path, Some(Self::locator(selector)))?;
        Self::parse_element(&value)
    }

    fn find_elements(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let path = self.session_path("/elements")?;
        let value = self.execute(HttpMethod::Post, &path, Some(Self::locator(selector)))?;
        Self::parse_elements(&value)
    }

    fn find_child_element(
        &mut self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<ElementHandle, DriverError> {
        let path = self.session_path(&format!("/element/{}/element", parent.id()))?;
        let value = self.execute(HttpMethod::Post, &path, Some(Self::locator(selector)))?;
        Self::parse_element(&value)
    }

    fn find_child_elements(
        &mut self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let path = self.session_path(&format!("/element/{}/elements", parent.id()))?;
        let value = self.execute(HttpMethod::Post, &path, Some(Self::locator(selector)))?;
        Self::parse_elements(&value)
    }

    fn element_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let path = self.session_path(&format!("/element/{}/text", element.id()))?;
        let value = self.execute(HttpMethod::Get, &path, None)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("expected text value".to_string()))
    }

    fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        let path = self.session_path(&format!("/element/{}/click", element.id()))?;
        self.execute(HttpMethod::Post, &path, Some(json!({})))?;
        Ok(())
    }

    fn quit(&mut self) -> Result<(), DriverError> {
        let path = self.session_path("")?;
        self.execute(HttpMethod::Delete, &path, None)?;
        self.session_id = None;
        Ok(())
    }
}
