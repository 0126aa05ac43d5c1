// WebDriver browser - W3C WebDriver over HTTP, one shared session
//
// WebDriver has a single focused window per session, so every call that
// switches windows runs inside the session lock.

use apbatch_core::domain::BrowserActionKind;
use apbatch_core::port::{ActionReport, BrowserDriver, BrowserError, Credential, TabId};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

// AP web-interface locators
const CONTINUE_BUTTON: &str = "//button[contains(text(), 'Continue')]";
const LOGIN_BUTTON: &str = "//input[@type='submit']";
const SSH_LINK: &str = "//a[contains(text(), 'SSH') or contains(text(), 'Services')]";
const SSH_CHECKBOX: &str = "//input[@type='checkbox' and contains(@name, 'ssh')]";
const APPLY_BUTTON: &str = "//input[@type='submit' and (@value='Apply' or @value='Save')]";
const REBOOT_LINK: &str = "//a[contains(text(), 'Reboot') or contains(text(), 'System')]";
const REBOOT_BUTTON: &str = "//input[@type='submit' and contains(@value, 'Reboot')]";
const CONFIRM_BUTTON: &str = "//input[@type='submit' and @value='OK']";

#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// e.g. `http://localhost:9515` for chromedriver
    pub url: String,
    pub browser_name: String,
    pub headless: bool,
    /// How long element lookups wait for the element to appear
    pub implicit_wait: Duration,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".to_string(),
            browser_name: "chrome".to_string(),
            headless: true,
            implicit_wait: Duration::from_secs(5),
        }
    }
}

#[derive(Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

fn map_wire_error(error: &str, message: &str) -> BrowserError {
    match error {
        "no such element" | "stale element reference" => {
            BrowserError::ElementNotFound(message.to_string())
        }
        "timeout" | "script timeout" => BrowserError::PageTimeout(0),
        "invalid session id" | "session not created" => {
            BrowserError::SessionUnavailable(message.to_string())
        }
        _ => BrowserError::Driver(format!("{}: {}", error, message)),
    }
}

fn element_id(value: &Value) -> Result<String, BrowserError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Driver("malformed element reference".to_string()))
}

pub struct WebDriverBrowser {
    http: reqwest::Client,
    config: WebDriverConfig,
    session: Mutex<Option<String>>,
}

impl WebDriverBrowser {
    pub fn new(config: WebDriverConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            session: Mutex::new(None),
        }
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--ignore-certificate-errors"];
        if self.config.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": self.config.browser_name,
                    "acceptInsecureCerts": true,
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }

    /// One wire call; returns the response's `value`
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let url = format!("{}/{}", self.config.url.trim_end_matches('/'), path);
        let mut request = self.http.request(method.clone(), &url);
        if method == Method::POST {
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                BrowserError::SessionUnavailable(e.to_string())
            } else {
                BrowserError::Driver(e.to_string())
            }
        })?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| BrowserError::Driver(format!("invalid response: {}", e)))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() {
            let wire: WireError = serde_json::from_value(value)
                .map_err(|_| BrowserError::Driver(format!("HTTP {}", status)))?;
            return Err(map_wire_error(&wire.error, &wire.message));
        }
        Ok(value)
    }

    /// Lock the session, creating it on first use
    async fn session(&self) -> Result<(MutexGuard<'_, Option<String>>, String), BrowserError> {
        let mut guard = self.session.lock().await;
        if let Some(id) = guard.clone() {
            return Ok((guard, id));
        }

        let value = self.send(Method::POST, "session", Some(self.capabilities())).await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BrowserError::SessionUnavailable("no sessionId in response".to_string()))?;
        self.send(
            Method::POST,
            &format!("session/{}/timeouts", id),
            Some(json!({ "implicit": self.config.implicit_wait.as_millis() as u64 })),
        )
        .await?;

        info!(session_id = %id, "Browser session created");
        *guard = Some(id.clone());
        Ok((guard, id))
    }

    async fn switch_to(&self, sid: &str, tab: &TabId) -> Result<(), BrowserError> {
        self.send(
            Method::POST,
            &format!("session/{}/window", sid),
            Some(json!({ "handle": tab.0 })),
        )
        .await
        .map(|_| ())
    }

    async fn find(&self, sid: &str, using: &str, selector: &str) -> Result<String, BrowserError> {
        let value = self
            .send(
                Method::POST,
                &format!("session/{}/element", sid),
                Some(json!({ "using": using, "value": selector })),
            )
            .await?;
        element_id(&value)
    }

    async fn click(&self, sid: &str, xpath: &str) -> Result<(), BrowserError> {
        let element = self.find(sid, "xpath", xpath).await?;
        self.send(Method::POST, &format!("session/{}/element/{}/click", sid, element), None)
            .await
            .map(|_| ())
    }

    async fn fill(&self, sid: &str, field_name: &str, text: &str) -> Result<(), BrowserError> {
        let selector = format!("[name=\"{}\"]", field_name);
        let element = self.find(sid, "css selector", &selector).await?;
        self.send(Method::POST, &format!("session/{}/element/{}/clear", sid, element), None)
            .await?;
        self.send(
            Method::POST,
            &format!("session/{}/element/{}/value", sid, element),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn page_source(&self, sid: &str) -> Result<String, BrowserError> {
        let value = self.send(Method::GET, &format!("session/{}/source", sid), None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Click through the network-filter warning page when it is shown
    async fn dismiss_interstitial(&self, sid: &str) -> Result<(), BrowserError> {
        if self.page_source(sid).await?.to_lowercase().contains("cato") {
            debug!("Dismissing interstitial warning page");
            if let Err(e) = self.click(sid, CONTINUE_BUTTON).await {
                warn!(error = %e, "Interstitial without a Continue button");
            }
        }
        Ok(())
    }

    async fn login(&self, sid: &str, credential: &Credential) -> Result<(), BrowserError> {
        let step = async {
            self.fill(sid, "username", &credential.username).await?;
            self.fill(sid, "password", &credential.secret).await?;
            self.click(sid, LOGIN_BUTTON).await
        };
        step.await.map_err(|e| match e {
            BrowserError::ElementNotFound(_) => {
                BrowserError::LoginFailed("Login elements not found".to_string())
            }
            other => other,
        })
    }

    async fn set_ssh(&self, sid: &str, enabled: bool) -> Result<ActionReport, BrowserError> {
        let state = if enabled { "enabled" } else { "disabled" };
        self.click(sid, SSH_LINK).await?;
        let checkbox = self.find(sid, "xpath", SSH_CHECKBOX).await?;
        let selected = self
            .send(
                Method::GET,
                &format!("session/{}/element/{}/selected", sid, checkbox),
                None,
            )
            .await?
            .as_bool()
            .unwrap_or(false);

        if selected == enabled {
            return Ok(ActionReport::ok(format!("SSH server already {}", state)));
        }
        self.send(Method::POST, &format!("session/{}/element/{}/click", sid, checkbox), None)
            .await?;
        self.click(sid, APPLY_BUTTON).await?;
        Ok(ActionReport::ok(format!("SSH server {}", state)))
    }

    async fn reboot(&self, sid: &str) -> Result<ActionReport, BrowserError> {
        self.click(sid, REBOOT_LINK).await?;
        self.click(sid, REBOOT_BUTTON).await?;
        // Some firmware asks for confirmation
        if let Err(e) = self.click(sid, CONFIRM_BUTTON).await {
            debug!(error = %e, "No reboot confirmation prompt");
        }
        Ok(ActionReport::ok("Reboot initiated"))
    }

    async fn check_status(&self, sid: &str) -> Result<ActionReport, BrowserError> {
        let source = self.page_source(sid).await?;
        if source.contains("Online") || source.contains("Connected") {
            Ok(ActionReport::ok("AP is online and responding"))
        } else {
            Ok(ActionReport::ok("AP responded but status unclear"))
        }
    }

    async fn read_config(&self, sid: &str) -> Result<ActionReport, BrowserError> {
        let title = self.send(Method::GET, &format!("session/{}/title", sid), None).await?;
        let url = self.send(Method::GET, &format!("session/{}/url", sid), None).await?;
        Ok(ActionReport::ok("Configuration read").with_details(json!({
            "title": title,
            "url": url,
        })))
    }

    async fn run_action(
        &self,
        sid: &str,
        tab: &TabId,
        action: BrowserActionKind,
        credential: &Credential,
    ) -> Result<ActionReport, BrowserError> {
        self.switch_to(sid, tab).await?;
        self.dismiss_interstitial(sid).await?;
        self.login(sid, credential).await?;

        let outcome = match action {
            BrowserActionKind::EnableSsh => self.set_ssh(sid, true).await,
            BrowserActionKind::DisableSsh => self.set_ssh(sid, false).await,
            BrowserActionKind::Reboot => self.reboot(sid).await,
            BrowserActionKind::CheckStatus => self.check_status(sid).await,
            BrowserActionKind::ReadConfig => self.read_config(sid).await,
        };
        // A missing control is a per-target failure, not a driver fault
        match outcome {
            Err(BrowserError::ElementNotFound(what)) => Ok(ActionReport::failed(format!(
                "Failed to {}: element not found ({})",
                action.as_str().replace('_', " "),
                what
            ))),
            other => other,
        }
    }

    /// End the browser session
    pub async fn quit(&self) -> Result<(), BrowserError> {
        let mut guard = self.session.lock().await;
        if let Some(id) = guard.take() {
            self.send(Method::DELETE, &format!("session/{}", id), None).await?;
            info!(session_id = %id, "Browser session closed");
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn open_tab(&self, url: &str, timeout: Duration) -> Result<TabId, BrowserError> {
        let (_guard, sid) = self.session().await?;
        let value = self
            .send(
                Method::POST,
                &format!("session/{}/window/new", sid),
                Some(json!({ "type": "tab" })),
            )
            .await?;
        let handle = value
            .get("handle")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Driver("no window handle in response".to_string()))?;
        let tab = TabId(handle);
        self.switch_to(&sid, &tab).await?;

        let url_path = format!("session/{}/url", sid);
        let navigate = self.send(Method::POST, &url_path, Some(json!({ "url": url })));
        match tokio::time::timeout(timeout, navigate).await {
            Ok(result) => {
                result?;
            }
            Err(_) => return Err(BrowserError::PageTimeout(timeout.as_millis() as u64)),
        }
        debug!(tab = %tab, url, "Tab opened");
        Ok(tab)
    }

    async fn perform(
        &self,
        tab: &TabId,
        action: BrowserActionKind,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<ActionReport, BrowserError> {
        let (_guard, sid) = self.session().await?;
        tokio::time::timeout(timeout, self.run_action(&sid, tab, action, credential))
            .await
            .map_err(|_| BrowserError::PageTimeout(timeout.as_millis() as u64))?
    }

    async fn close_tab(&self, tab: &TabId) -> Result<(), BrowserError> {
        let guard = self.session.lock().await;
        let Some(sid) = guard.as_ref() else {
            return Ok(());
        };
        self.switch_to(sid, tab).await?;
        self.send(Method::DELETE, &format!("session/{}/window", sid), None)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok(value: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "value": value }))
    }

    fn element(id: &str) -> Value {
        json!({ ELEMENT_KEY: id })
    }

    async fn server_with_session() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ok(json!({ "sessionId": "S1", "capabilities": {} })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/S1/timeouts"))
            .respond_with(ok(Value::Null))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/S1/window/new"))
            .respond_with(ok(json!({ "handle": "W1", "type": "tab" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/S1/window"))
            .respond_with(ok(Value::Null))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/S1/url"))
            .respond_with(ok(Value::Null))
            .mount(&server)
            .await;
        server
    }

    fn browser(server: &MockServer) -> WebDriverBrowser {
        WebDriverBrowser::new(WebDriverConfig {
            url: server.uri(),
            ..WebDriverConfig::default()
        })
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/session/S1/element"))
            .and(body_partial_json(json!({ "using": "css selector" })))
            .respond_with(ok(element("F1")))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/S1/element"))
            .and(body_partial_json(json!({ "value": LOGIN_BUTTON })))
            .respond_with(ok(element("B1")))
            .mount(server)
            .await;
        for endpoint in ["/session/S1/element/F1/clear", "/session/S1/element/F1/value", "/session/S1/element/B1/click"] {
            Mock::given(method("POST"))
                .and(path(endpoint))
                .respond_with(ok(Value::Null))
                .mount(server)
                .await;
        }
    }

    #[test]
    fn test_wire_error_mapping() {
        assert!(matches!(
            map_wire_error("no such element", "xpath"),
            BrowserError::ElementNotFound(_)
        ));
        assert!(matches!(
            map_wire_error("invalid session id", "gone"),
            BrowserError::SessionUnavailable(_)
        ));
        assert!(matches!(
            map_wire_error("unknown error", "boom"),
            BrowserError::Driver(ref m) if m == "unknown error: boom"
        ));
    }

    #[test]
    fn test_headless_capabilities() {
        let caps = WebDriverBrowser::new(WebDriverConfig::default()).capabilities();
        let args = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert!(args.as_array().unwrap().contains(&json!("--headless=new")));
        assert_eq!(caps["capabilities"]["alwaysMatch"]["acceptInsecureCerts"], true);
    }

    #[tokio::test]
    async fn test_open_tab_reuses_one_session() {
        let server = server_with_session().await;
        let browser = browser(&server);

        let first = browser
            .open_tab("https://10.0.0.1", Duration::from_secs(5))
            .await
            .unwrap();
        let second = browser
            .open_tab("https://10.0.0.2", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(first, TabId("W1".to_string()));
        assert_eq!(second, TabId("W1".to_string()));
        // `expect(1)` on POST /session is verified when the server drops
    }

    #[tokio::test]
    async fn test_check_status_after_login() {
        let server = server_with_session().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/session/S1/source"))
            .respond_with(ok(json!("<html>Status: Online</html>")))
            .mount(&server)
            .await;

        let browser = browser(&server);
        let tab = browser
            .open_tab("https://10.0.0.1", Duration::from_secs(5))
            .await
            .unwrap();
        let report = browser
            .perform(
                &tab,
                BrowserActionKind::CheckStatus,
                &Credential::new("admin", "pw"),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(report.message, "AP is online and responding");
    }

    #[tokio::test]
    async fn test_missing_login_form_is_login_failure() {
        let server = server_with_session().await;
        Mock::given(method("GET"))
            .and(path("/session/S1/source"))
            .respond_with(ok(json!("<html></html>")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/S1/element"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "no such element", "message": "not found" }
            })))
            .mount(&server)
            .await;

        let browser = browser(&server);
        let tab = browser
            .open_tab("https://10.0.0.1", Duration::from_secs(5))
            .await
            .unwrap();
        let err = browser
            .perform(
                &tab,
                BrowserActionKind::EnableSsh,
                &Credential::new("admin", "pw"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::LoginFailed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_driver_is_session_unavailable() {
        let browser = WebDriverBrowser::new(WebDriverConfig {
            url: "http://127.0.0.1:1".to_string(),
            ..WebDriverConfig::default()
        });
        let err = browser
            .open_tab("https://10.0.0.1", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::SessionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_close_without_session_is_noop() {
        let browser = WebDriverBrowser::new(WebDriverConfig::default());
        assert!(browser.close_tab(&TabId("W9".into())).await.is_ok());
    }
}
