//! Shared fixtures: an in-memory storefront behind the `Page` trait and policy builders
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shopcheck_common::env::{API_BASE_URL, HEADLESS, STANDARD_PASSWORD, STANDARD_USER, UI_BASE_URL, WORKERS};
use shopcheck_common::{EnvSnapshot, EnvironmentConfig, Validator};
use shopcheck_e2e::{E2eError, E2eResult, ExecutionPolicy, Page, PageFactory, RunMode};

pub const UI_URL: &str = "https://www.saucedemo.com";
pub const API_URL: &str = "https://reqres.in/api";

pub fn snapshot(api_url: &str, ui_url: &str) -> EnvSnapshot {
    EnvSnapshot::from_pairs([
        (STANDARD_USER, "standard_user"),
        (STANDARD_PASSWORD, "secret_sauce"),
        (API_BASE_URL, api_url),
        (UI_BASE_URL, ui_url),
        (HEADLESS, "true"),
        (WORKERS, "4"),
    ])
}

pub fn env() -> Arc<EnvironmentConfig> {
    Arc::new(Validator::default().validate(&snapshot(API_URL, UI_URL)).unwrap())
}

/// Environment pointing the api project at a local fixture server
pub fn local_api_env(api_url: &str) -> Arc<EnvironmentConfig> {
    let validator = Validator::with_host_fragments("saucedemo.com", "127.0.0.1");
    Arc::new(validator.validate(&snapshot(api_url, UI_URL)).unwrap())
}

pub fn policy(workers: usize, retries: u32, scenario_timeout: Duration) -> ExecutionPolicy {
    ExecutionPolicy {
        mode: RunMode::Local,
        workers,
        retries,
        step_timeout: Duration::from_secs(2),
        scenario_timeout,
        expect_timeout: Duration::from_millis(300),
        trace_on_first_retry: true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Blank,
    Login,
    Inventory,
    Cart,
    CheckoutInfo,
}

/// Scripted stand-in for the Swag Labs storefront
#[derive(Debug)]
pub struct FakeStorefront {
    screen: Screen,
    username: String,
    password: String,
    error: Option<String>,
    cart: BTreeSet<String>,
    /// Never render the cart badge, to force assertion failures
    pub hide_badge: bool,
    pub fail_navigation: bool,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl FakeStorefront {
    pub fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            screen: Screen::Blank,
            username: String::new(),
            password: String::new(),
            error: None,
            cart: BTreeSet::new(),
            hide_badge: false,
            fail_navigation: false,
            events,
        }
    }

    fn record(&self, event: String) {
        self.events.lock().push(event);
    }

    fn login(&mut self) {
        let error = match (self.username.as_str(), self.password.as_str()) {
            ("", _) => Some("Epic sadface: Username is required"),
            (_, "") => Some("Epic sadface: Password is required"),
            ("locked_out_user", "secret_sauce") => Some("Epic sadface: Sorry, this user has been locked out."),
            ("standard_user", "secret_sauce") => None,
            _ => Some("Epic sadface: Username and password do not match any user in this service"),
        };
        match error {
            Some(message) => self.error = Some(message.to_string()),
            None => {
                self.error = None;
                self.screen = Screen::Inventory;
            }
        }
    }

    fn product_name(slug: &str) -> &'static str {
        match slug {
            "sauce-labs-backpack" => "Sauce Labs Backpack",
            "sauce-labs-bike-light" => "Sauce Labs Bike Light",
            "sauce-labs-bolt-t-shirt" => "Sauce Labs Bolt T-Shirt",
            _ => "Unknown Product",
        }
    }

    fn texts(&self, selector: &str) -> Vec<String> {
        match selector {
            r#"[data-test="error"]"# => self.error.iter().cloned().collect(),
            r#"[data-test="shopping-cart-badge"]"# if !self.cart.is_empty() && !self.hide_badge => {
                vec![self.cart.len().to_string()]
            }
            r#"[data-test="inventory-item-name"]"# if self.screen == Screen::Cart => {
                self.cart.iter().map(|slug| Self::product_name(slug).to_string()).collect()
            }
            _ => vec![],
        }
    }
}

fn data_test(selector: &str) -> Option<&str> {
    selector.strip_prefix(r#"[data-test=""#)?.strip_suffix(r#""]"#)
}

#[async_trait]
impl Page for FakeStorefront {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        self.record(format!("goto {}", url));
        if self.fail_navigation {
            return Err(E2eError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()));
        }
        self.screen = Screen::Login;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        match data_test(selector) {
            Some("username") => self.username = value.to_string(),
            Some("password") => self.password = value.to_string(),
            _ => return Err(E2eError::Interaction(format!("no input {}", selector))),
        }
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> E2eResult<()> {
        self.record(format!("click {}", selector));
        match data_test(selector) {
            Some("login-button") if self.screen == Screen::Login => self.login(),
            Some("shopping-cart-link") if self.screen != Screen::Login => self.screen = Screen::Cart,
            Some("checkout") if self.screen == Screen::Cart => self.screen = Screen::CheckoutInfo,
            Some("continue") if self.screen == Screen::CheckoutInfo => {
                self.error = Some("Error: First Name is required".to_string());
            }
            Some(id) if self.screen == Screen::Inventory && id.starts_with("add-to-cart-") => {
                self.cart.insert(id["add-to-cart-".len()..].to_string());
            }
            Some(id) if self.screen == Screen::Inventory && id.starts_with("remove-") => {
                self.cart.remove(&id["remove-".len()..]);
            }
            _ => return Err(E2eError::timeout("Click", selector, Duration::from_secs(2))),
        }
        Ok(())
    }

    async fn url(&mut self) -> E2eResult<String> {
        let path = match self.screen {
            Screen::Blank => return Ok("about:blank".to_string()),
            Screen::Login => "/",
            Screen::Inventory => "/inventory.html",
            Screen::Cart => "/cart.html",
            Screen::CheckoutInfo => "/checkout-step-one.html",
        };
        Ok(format!("{}{}", UI_URL, path))
    }

    async fn text_contents(&mut self, selector: &str) -> E2eResult<Vec<String>> {
        Ok(self.texts(selector))
    }

    async fn is_visible(&mut self, selector: &str) -> E2eResult<bool> {
        Ok(match data_test(selector) {
            Some("shopping-cart-link") => self.screen != Screen::Login && self.screen != Screen::Blank,
            _ => !self.texts(selector).is_empty(),
        })
    }

    async fn count(&mut self, selector: &str) -> E2eResult<usize> {
        Ok(self.texts(selector).len())
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> E2eResult<()> {
        self.record(format!("screenshot full_page={}", full_page));
        std::fs::write(path, format!("{:?}", self.screen))?;
        Ok(())
    }

    async fn start_trace(&mut self) -> E2eResult<()> {
        self.record("trace start".to_string());
        Ok(())
    }

    async fn stop_trace(&mut self, path: Option<&Path>) -> E2eResult<()> {
        self.record(format!("trace stop saved={}", path.is_some()));
        if let Some(path) = path {
            std::fs::write(path, b"zip")?;
        }
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        self.record("close".to_string());
        Ok(())
    }
}

/// Opens a fresh [`FakeStorefront`] per attempt
#[derive(Default)]
pub struct FakeBrowser {
    pub opened: AtomicUsize,
    pub events: Arc<Mutex<Vec<String>>>,
    pub hide_badge: bool,
    pub fail_navigation: bool,
    pub fail_launch: bool,
}

impl FakeBrowser {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl PageFactory for FakeBrowser {
    async fn open(&self, _base_url: &str, _step_timeout: Duration) -> E2eResult<Box<dyn Page>> {
        if self.fail_launch {
            return Err(E2eError::Playwright("browser closed unexpectedly".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let mut page = FakeStorefront::new(self.events.clone());
        page.hide_badge = self.hide_badge;
        page.fail_navigation = self.fail_navigation;
        Ok(Box::new(page))
    }
}

/// Factory for runs that must never open a page
pub struct NoBrowser;

#[async_trait]
impl PageFactory for NoBrowser {
    async fn open(&self, _base_url: &str, _step_timeout: Duration) -> E2eResult<Box<dyn Page>> {
        Err(E2eError::PlaywrightNotFound)
    }
}

/// Files in `dir` whose name starts with `prefix`
pub fn artifacts_with_prefix(dir: &Path, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with(prefix))
        .collect();
    names.sort();
    names
}
