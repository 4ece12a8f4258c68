//! Expected-outcome checks
//!
//! Every failed check surfaces as [`E2eError::AssertionFailed`]; nothing here panics.
//! Page expectations poll until they hold or the expectation timeout elapses, since
//! rendered state settles asynchronously after an interaction.

use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::api::ApiResponse;
use crate::error::{E2eError, E2eResult};
use crate::playwright::Page;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Return an assertion failure from the enclosing function unless `cond` holds
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::E2eError::AssertionFailed(format!($($arg)+)));
        }
    };
}

/// Like [`ensure!`] for equality, reporting both sides
#[macro_export]
macro_rules! ensure_eq {
    ($actual:expr, $expected:expr, $what:expr) => {{
        let (actual, expected) = (&$actual, &$expected);
        if actual != expected {
            return Err($crate::error::E2eError::AssertionFailed(format!(
                "{}: expected {:?}, got {:?}",
                $what, expected, actual
            )));
        }
    }};
}

fn fail(message: String) -> E2eError {
    E2eError::AssertionFailed(message)
}

pub fn field<'a>(value: &'a Value, key: &str) -> E2eResult<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| fail(format!("missing field `{}` in {}", key, value)))
}

pub fn string_field<'a>(value: &'a Value, key: &str) -> E2eResult<&'a str> {
    let v = field(value, key)?;
    v.as_str()
        .ok_or_else(|| fail(format!("field `{}` should be a string, got {}", key, v)))
}

pub fn number_field(value: &Value, key: &str) -> E2eResult<f64> {
    let v = field(value, key)?;
    v.as_f64()
        .ok_or_else(|| fail(format!("field `{}` should be a number, got {}", key, v)))
}

pub fn array_field<'a>(value: &'a Value, key: &str) -> E2eResult<&'a Vec<Value>> {
    let v = field(value, key)?;
    v.as_array()
        .ok_or_else(|| fail(format!("field `{}` should be an array, got {}", key, v)))
}

pub fn is_email(s: &str) -> bool {
    EMAIL.is_match(s)
}

pub fn status(response: &ApiResponse, expected: u16) -> E2eResult<()> {
    if response.status != expected {
        return Err(fail(format!(
            "expected status {}, got {} (body: {})",
            expected, response.status, response.body
        )));
    }
    Ok(())
}

pub fn latency_within(response: &ApiResponse, budget: Duration) -> E2eResult<()> {
    if response.elapsed > budget {
        return Err(fail(format!(
            "round trip took {}ms, budget is {}ms",
            response.elapsed.as_millis(),
            budget.as_millis()
        )));
    }
    Ok(())
}

/// Parse an RFC 3339 timestamp that must lie after the Unix epoch
pub fn timestamp(s: &str) -> E2eResult<DateTime<FixedOffset>> {
    let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| fail(format!("invalid timestamp {:?}: {}", s, e)))?;
    if parsed.timestamp_millis() <= 0 {
        return Err(fail(format!("timestamp {:?} is not after the epoch", s)));
    }
    Ok(parsed)
}

enum Probe<'s> {
    Url,
    Visible(&'s str),
    Texts(&'s str),
    Count(&'s str),
}

#[derive(Debug)]
enum Observed {
    Url(String),
    Visible(bool),
    Texts(Vec<String>),
    Count(usize),
}

/// Polling assertions over rendered page state
pub struct PageExpect<'a> {
    page: &'a mut dyn Page,
    timeout: Duration,
}

impl<'a> PageExpect<'a> {
    pub fn new(page: &'a mut dyn Page, timeout: Duration) -> Self {
        Self { page, timeout }
    }

    pub async fn to_have_url(&mut self, pattern: &Regex) -> E2eResult<()> {
        self.poll(Probe::Url, &format!("url to match /{}/", pattern), |o| {
            matches!(o, Observed::Url(url) if pattern.is_match(url))
        })
        .await
    }

    pub async fn to_be_visible(&mut self, selector: &str) -> E2eResult<()> {
        self.poll(Probe::Visible(selector), &format!("{} to be visible", selector), |o| {
            matches!(o, Observed::Visible(true))
        })
        .await
    }

    /// Exactly one element matches and its trimmed text equals `expected`
    pub async fn to_have_text(&mut self, selector: &str, expected: &str) -> E2eResult<()> {
        self.poll(Probe::Texts(selector), &format!("{} to have text {:?}", selector, expected), |o| {
            matches!(o, Observed::Texts(texts) if texts.len() == 1 && texts[0].trim() == expected)
        })
        .await
    }

    pub async fn to_contain_text(&mut self, selector: &str, expected: &str) -> E2eResult<()> {
        self.poll(Probe::Texts(selector), &format!("{} to contain text {:?}", selector, expected), |o| {
            matches!(o, Observed::Texts(texts) if texts.iter().any(|t| t.contains(expected)))
        })
        .await
    }

    pub async fn to_have_count(&mut self, selector: &str, expected: usize) -> E2eResult<()> {
        self.poll(Probe::Count(selector), &format!("{} to match {} element(s)", selector, expected), |o| {
            matches!(o, Observed::Count(n) if *n == expected)
        })
        .await
    }

    async fn observe(&mut self, probe: &Probe<'_>) -> E2eResult<Observed> {
        Ok(match probe {
            Probe::Url => Observed::Url(self.page.url().await?),
            Probe::Visible(selector) => Observed::Visible(self.page.is_visible(selector).await?),
            Probe::Texts(selector) => Observed::Texts(self.page.text_contents(selector).await?),
            Probe::Count(selector) => Observed::Count(self.page.count(selector).await?),
        })
    }

    async fn poll<F>(&mut self, probe: Probe<'_>, expectation: &str, accept: F) -> E2eResult<()>
    where
        F: Fn(&Observed) -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            let observed = self.observe(&probe).await?;
            if accept(&observed) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(fail(format!(
                    "expected {} within {}ms, last observed {:?}",
                    expectation,
                    self.timeout.as_millis(),
                    observed
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
