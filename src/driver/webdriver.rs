//! W3C WebDriver client (chromedriver) implementing [`Driver`].

use std::time::Duration;

use base64::Engine as _;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Driver, DriverError, Launcher, SelectOption, Target, Using};
use crate::config::BrowserConfig;

/// Key under which W3C element references are serialized.
const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4a4e6d7c0e4d";

/// How often presence/readiness conditions are re-checked.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Starts chromedriver sessions with the configured browser options.
pub struct WebDriverLauncher {
    client: Client,
    endpoint: String,
    capabilities: Value,
}

impl WebDriverLauncher {
    pub fn new(browser: &BrowserConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(browser.command_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: browser.webdriver_url.trim_end_matches('/').to_string(),
            capabilities: chrome_capabilities(browser),
        })
    }
}

#[async_trait::async_trait]
impl Launcher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn Driver>, DriverError> {
        let resp = self
            .client
            .post(format!("{}/session", self.endpoint))
            .json(&self.capabilities)
            .send()
            .await?;
        let ok = resp.status().is_success();
        let payload: Value = resp.json().await?;
        let value = unwrap_value(ok, payload)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Malformed("new session without sessionId".into()))?
            .to_string();

        info!(endpoint = %self.endpoint, session = %session_id, "Browser session started");
        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
        }))
    }
}

/// Chrome capabilities: automation banners off, optional headless mode.
fn chrome_capabilities(browser: &BrowserConfig) -> Value {
    let mut args: Vec<String> = vec![
        "--disable-blink-features=AutomationControlled".into(),
        "--no-sandbox".into(),
        "--disable-dev-shm-usage".into(),
        "--disable-extensions".into(),
        "--log-level=3".into(),
        format!("--window-size={}", browser.window_size),
    ];
    if browser.headless {
        args.push("--headless=new".into());
        args.push("--disable-gpu".into());
    }
    if let Some(ua) = &browser.user_agent {
        args.push(format!("--user-agent={ua}"));
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "pageLoadStrategy": "normal",
                "timeouts": { "pageLoad": browser.page_load_timeout_secs * 1000 },
                "goog:chromeOptions": {
                    "args": args,
                    "excludeSwitches": ["enable-automation"],
                    "prefs": {
                        "profile.default_content_setting_values.notifications": 2,
                        "profile.managed_default_content_settings.images": 2
                    }
                }
            }
        }
    })
}

/// Translate a locator into the W3C `(using, value)` pair.
fn w3c_locator(using: Using, selector: &str) -> (&'static str, String) {
    match using {
        Using::Id => ("css selector", format!("[id=\"{}\"]", css_string(selector))),
        Using::ClassName => ("css selector", format!("[class~=\"{}\"]", css_string(selector))),
        Using::Name => ("css selector", format!("[name=\"{}\"]", css_string(selector))),
        Using::TagName => ("tag name", selector.to_string()),
        Using::Css => ("css selector", selector.to_string()),
        Using::XPath => ("xpath", selector.to_string()),
    }
}

fn css_string(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Split a WebDriver response into its `value` or a typed error.
fn unwrap_value(ok: bool, payload: Value) -> Result<Value, DriverError> {
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if ok {
        return Ok(value);
    }
    Err(map_error(&value))
}

fn map_error(value: &Value) -> DriverError {
    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match code.as_str() {
        "no such element" => DriverError::NoSuchElement,
        "stale element reference" | "detached shadow root" => DriverError::StaleElement(message),
        "element not interactable" | "element click intercepted" | "invalid element state" => {
            DriverError::NotInteractable(message)
        }
        "timeout" | "script timeout" => DriverError::Timeout(message),
        _ => DriverError::Protocol { code, message },
    }
}

fn element_from(value: &Value) -> Result<Target, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(Target::new)
        .ok_or_else(|| DriverError::Malformed(format!("not an element reference: {value}")))
}

fn element_ref(target: &Target) -> Value {
    json!({ ELEMENT_KEY: target.id() })
}

/// One live chromedriver session.
pub struct WebDriverSession {
    client: Client,
    base: String,
}

impl WebDriverSession {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}{}", self.base, path);
        let mut req = self.client.request(method.clone(), &url);
        if method == Method::POST {
            req = req.json(&body.unwrap_or_else(|| json!({})));
        }
        let resp = req.send().await?;
        let ok = resp.status().is_success();
        let payload: Value = resp.json().await?;
        unwrap_value(ok, payload)
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn element_bool(&self, target: &Target, property: &str) -> Result<bool, DriverError> {
        let v = self
            .command(Method::GET, &format!("/element/{}/{}", target.id(), property), None)
            .await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    async fn option_elements(&self, select: &Target) -> Result<Vec<(Target, SelectOption)>, DriverError> {
        let found = self
            .command(
                Method::POST,
                &format!("/element/{}/elements", select.id()),
                Some(json!({ "using": "tag name", "value": "option" })),
            )
            .await?;
        let items = found
            .as_array()
            .ok_or_else(|| DriverError::Malformed("option list is not an array".into()))?;

        let mut options = Vec::with_capacity(items.len());
        for item in items {
            let handle = element_from(item)?;
            let label = self.text(&handle).await?.trim().to_string();
            let value = self
                .attribute(&handle, "value")
                .await?
                .unwrap_or_else(|| label.clone());
            options.push((handle, SelectOption { label, value }));
        }
        Ok(options)
    }
}

#[async_trait::async_trait]
impl Driver for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        debug!(%url, "Navigating");
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn wait_until_ready(&self, timeout: Duration) -> Result<bool, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.execute("return document.readyState;", vec![]).await?;
            if state.as_str() == Some("complete") {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn find(
        &self,
        using: Using,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<Target>, DriverError> {
        let (strategy, value) = w3c_locator(using, selector);
        let body = json!({ "using": strategy, "value": value });
        let deadline = Instant::now() + timeout;
        loop {
            match self.command(Method::POST, "/element", Some(body.clone())).await {
                Ok(v) => return element_from(&v).map(Some),
                Err(DriverError::NoSuchElement) => {}
                Err(e) => return Err(e),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn find_all(&self, using: Using, selector: &str) -> Result<Vec<Target>, DriverError> {
        let (strategy, value) = w3c_locator(using, selector);
        let found = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": strategy, "value": value })),
            )
            .await?;
        found
            .as_array()
            .map(|items| items.iter().map(element_from).collect::<Result<Vec<_>, _>>())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn clear(&self, target: &Target) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/element/{}/clear", target.id()), None)
            .await
            .map(|_| ())
    }

    async fn type_text(&self, target: &Target, text: &str) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", target.id()),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn assign_value(&self, target: &Target, text: &str) -> Result<(), DriverError> {
        // Passed as an argument, never spliced into the script source.
        self.execute(
            "arguments[0].value = arguments[1];\
             arguments[0].dispatchEvent(new Event('input', { bubbles: true }));\
             arguments[0].dispatchEvent(new Event('change', { bubbles: true }));",
            vec![element_ref(target), json!(text)],
        )
        .await
        .map(|_| ())
    }

    async fn wait_actionable(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.element_bool(target, "displayed").await?
                && self.element_bool(target, "enabled").await?
            {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn click(&self, target: &Target) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/element/{}/click", target.id()), None)
            .await
            .map(|_| ())
    }

    async fn force_click(&self, target: &Target) -> Result<(), DriverError> {
        self.execute("arguments[0].click();", vec![element_ref(target)])
            .await
            .map(|_| ())
    }

    async fn scroll_into_view(&self, target: &Target) -> Result<(), DriverError> {
        self.execute("arguments[0].scrollIntoView(true);", vec![element_ref(target)])
            .await
            .map(|_| ())
    }

    async fn text(&self, target: &Target) -> Result<String, DriverError> {
        let v = self
            .command(Method::GET, &format!("/element/{}/text", target.id()), None)
            .await?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, target: &Target, name: &str) -> Result<Option<String>, DriverError> {
        let v = self
            .command(
                Method::GET,
                &format!("/element/{}/attribute/{}", target.id(), name),
                None,
            )
            .await?;
        Ok(v.as_str().map(str::to_string))
    }

    async fn is_selected(&self, target: &Target) -> Result<bool, DriverError> {
        self.element_bool(target, "selected").await
    }

    async fn is_displayed(&self, target: &Target) -> Result<bool, DriverError> {
        self.element_bool(target, "displayed").await
    }

    async fn options(&self, select: &Target) -> Result<Vec<SelectOption>, DriverError> {
        Ok(self
            .option_elements(select)
            .await?
            .into_iter()
            .map(|(_, option)| option)
            .collect())
    }

    async fn choose_option(
        &self,
        select: &Target,
        option: &SelectOption,
    ) -> Result<(), DriverError> {
        let handle = self
            .option_elements(select)
            .await?
            .into_iter()
            .find(|(_, o)| o == option)
            .map(|(h, _)| h)
            .ok_or(DriverError::NoSuchElement)?;
        self.click(&handle).await
    }

    async fn visible_content(&self) -> Result<String, DriverError> {
        let v = self
            .execute("return document.body ? document.body.innerText : '';", vec![])
            .await?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    async fn current_address(&self) -> Result<String, DriverError> {
        let v = self.command(Method::GET, "/url", None).await?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    async fn snapshot(&self) -> Result<Vec<u8>, DriverError> {
        let v = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = v
            .as_str()
            .ok_or_else(|| DriverError::Malformed("screenshot is not a string".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Malformed(format!("screenshot is not base64: {e}")))
    }

    async fn quit(&self) -> Result<(), DriverError> {
        match self.command(Method::DELETE, "", None).await {
            Ok(_) => {
                debug!("Browser session closed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to close browser session");
                Err(e)
            }
        }
    }
}
