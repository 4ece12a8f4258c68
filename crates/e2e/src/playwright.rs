//! Playwright browser automation
//!
//! Each [`PlaywrightPage`] owns one `node` process running [`DRIVER_SCRIPT`], which
//! launches a browser with a fresh context and then serves newline-delimited JSON
//! commands on stdin, answering each on stdout with the same request id. Commands are
//! strictly sequential; a reply whose id does not match the pending request (left over
//! from a cancelled step) is discarded.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::settings::HarnessSettings;

/// Slack added on top of a step bound so Playwright reports its own timeout first
const REPLY_GRACE: Duration = Duration::from_millis(2_000);

const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// The page-driving primitive set available to interactive scenarios
#[async_trait]
pub trait Page: Send {
    /// Navigate to `url`, resolved against the project's base address
    async fn goto(&mut self, url: &str) -> E2eResult<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()>;

    async fn click(&mut self, selector: &str) -> E2eResult<()>;

    async fn url(&mut self) -> E2eResult<String>;

    /// Text content of every element matching `selector`
    async fn text_contents(&mut self, selector: &str) -> E2eResult<Vec<String>>;

    async fn is_visible(&mut self, selector: &str) -> E2eResult<bool>;

    async fn count(&mut self, selector: &str) -> E2eResult<usize>;

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> E2eResult<()>;

    async fn start_trace(&mut self) -> E2eResult<()> {
        Ok(())
    }

    /// Stop tracing, writing the trace to `path` when given
    async fn stop_trace(&mut self, _path: Option<&Path>) -> E2eResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()>;
}

/// Opens a fresh page session for every attempt
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn open(&self, base_url: &str, step_timeout: Duration) -> E2eResult<Box<dyn Page>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

impl PlaywrightConfig {
    pub fn from_settings(settings: &HarnessSettings, headless: bool) -> Self {
        Self {
            browser: settings.browser,
            headless,
            viewport_width: settings.viewport.width,
            viewport_height: settings.viewport.height,
        }
    }
}

/// [`PageFactory`] backed by a real Playwright installation
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    /// Check if Playwright is installed
    pub fn check_installed(&self) -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl PageFactory for PlaywrightLauncher {
    async fn open(&self, base_url: &str, step_timeout: Duration) -> E2eResult<Box<dyn Page>> {
        let page = PlaywrightPage::launch(&self.config, base_url, step_timeout).await?;
        Ok(Box::new(page))
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverCommand<'a> {
    Goto { url: &'a str, timeout: u64 },
    Fill { selector: &'a str, value: &'a str, timeout: u64 },
    Click { selector: &'a str, timeout: u64 },
    Url,
    Texts { selector: &'a str },
    Visible { selector: &'a str },
    Count { selector: &'a str },
    Screenshot { path: String, full_page: bool, timeout: u64 },
    TraceStart,
    TraceStop { path: Option<String> },
    Close,
}

impl DriverCommand<'_> {
    /// Operation name and subject used in error messages
    fn describe(&self) -> (&'static str, String) {
        match self {
            DriverCommand::Goto { url, .. } => ("Navigation", url.to_string()),
            DriverCommand::Fill { selector, .. } => ("Fill", selector.to_string()),
            DriverCommand::Click { selector, .. } => ("Click", selector.to_string()),
            DriverCommand::Url => ("Read url", String::new()),
            DriverCommand::Texts { selector } => ("Read text", selector.to_string()),
            DriverCommand::Visible { selector } => ("Read visibility", selector.to_string()),
            DriverCommand::Count { selector } => ("Count", selector.to_string()),
            DriverCommand::Screenshot { path, .. } => ("Screenshot", path.clone()),
            DriverCommand::TraceStart => ("Trace start", String::new()),
            DriverCommand::TraceStop { .. } => ("Trace stop", String::new()),
            DriverCommand::Close => ("Close", String::new()),
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a DriverCommand<'a>,
}

#[derive(Debug, Clone, Deserialize)]
struct DriverReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl DriverReply {
    /// Map a failed reply onto the error taxonomy
    fn into_error(self, operation: &str, target: &str, bound: Duration) -> E2eError {
        let message = self.error.unwrap_or_else(|| "unknown driver error".to_string());
        if self.name.as_deref() == Some("TimeoutError") {
            return E2eError::timeout(operation, target, bound);
        }
        match operation {
            "Navigation" => E2eError::Navigation(format!("{}: {}", target, message)),
            "Fill" | "Click" => E2eError::Interaction(format!("{} {}: {}", operation, target, message)),
            _ => E2eError::Playwright(format!("{} {}: {}", operation, target, message)),
        }
    }
}

/// Playwright browser handle, one per scenario attempt
pub struct PlaywrightPage {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    step_timeout: Duration,
    // Keeps the driver script alive for the process lifetime
    _script_dir: tempfile::TempDir,
}

impl PlaywrightPage {
    /// Spawn the driver and wait until its browser context is ready
    pub async fn launch(config: &PlaywrightConfig, base_url: &str, step_timeout: Duration) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        let options = serde_json::json!({
            "browser": config.browser.as_str(),
            "headless": config.headless,
            "baseUrl": base_url,
            "width": config.viewport_width,
            "height": config.viewport_height,
        });

        debug!("Launching Playwright driver: {}", script_path.display());

        let cwd = std::env::current_dir()?;
        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .arg(options.to_string())
            .current_dir(&cwd)
            .env("NODE_PATH", node_path(&cwd))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("Failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdout unavailable".to_string()))?;

        let mut page = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            step_timeout,
            _script_dir: script_dir,
        };

        let ready =
            await_reply(&mut page.stdout, 0, STARTUP_TIMEOUT, Duration::ZERO, "Browser launch", base_url).await?;
        if !ready.ok {
            return Err(E2eError::Playwright(format!(
                "Browser launch failed: {}",
                ready.error.unwrap_or_default()
            )));
        }

        Ok(page)
    }

    async fn send(&mut self, command: DriverCommand<'_>, bound: Duration) -> E2eResult<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_string(&Envelope { id, command: &command })?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let (operation, target) = command.describe();
        let reply = await_reply(&mut self.stdout, id, bound, REPLY_GRACE, operation, &target).await?;
        if reply.ok {
            Ok(reply.value)
        } else {
            Err(reply.into_error(operation, &target, bound))
        }
    }

    fn step_bound(&self) -> u64 {
        self.step_timeout.as_millis() as u64
    }
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        let timeout = self.step_bound();
        self.send(DriverCommand::Goto { url, timeout }, self.step_timeout).await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        let timeout = self.step_bound();
        self.send(DriverCommand::Fill { selector, value, timeout }, self.step_timeout).await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> E2eResult<()> {
        let timeout = self.step_bound();
        self.send(DriverCommand::Click { selector, timeout }, self.step_timeout).await?;
        Ok(())
    }

    async fn url(&mut self) -> E2eResult<String> {
        let value = self.send(DriverCommand::Url, self.step_timeout).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn text_contents(&mut self, selector: &str) -> E2eResult<Vec<String>> {
        let value = self.send(DriverCommand::Texts { selector }, self.step_timeout).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn is_visible(&mut self, selector: &str) -> E2eResult<bool> {
        let value = self.send(DriverCommand::Visible { selector }, self.step_timeout).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn count(&mut self, selector: &str) -> E2eResult<usize> {
        let value = self.send(DriverCommand::Count { selector }, self.step_timeout).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> E2eResult<()> {
        let command = DriverCommand::Screenshot {
            path: path.to_string_lossy().to_string(),
            full_page,
            timeout: self.step_bound(),
        };
        self.send(command, self.step_timeout).await?;
        Ok(())
    }

    async fn start_trace(&mut self) -> E2eResult<()> {
        self.send(DriverCommand::TraceStart, self.step_timeout).await?;
        Ok(())
    }

    async fn stop_trace(&mut self, path: Option<&Path>) -> E2eResult<()> {
        let path = path.map(|p| p.to_string_lossy().to_string());
        self.send(DriverCommand::TraceStop { path }, self.step_timeout).await?;
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if let Err(e) = self.send(DriverCommand::Close, self.step_timeout).await {
            warn!("Driver did not acknowledge close: {}", e);
        }

        if tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await.is_ok() {
            return Ok(());
        }

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && tokio::time::timeout(Duration::from_millis(500), self.child.wait()).await.is_ok()
                {
                    return Ok(());
                }
            }
        }

        self.child.kill().await?;
        Ok(())
    }
}

/// Wait for reply `id`. The driver enforces `bound` itself, so the wait allows `grace` on
/// top of it; a timeout is reported against `bound`.
async fn await_reply<R>(
    stdout: &mut Lines<R>,
    id: u64,
    bound: Duration,
    grace: Duration,
    operation: &str,
    target: &str,
) -> E2eResult<DriverReply>
where
    R: AsyncBufRead + Unpin,
{
    match tokio::time::timeout(bound + grace, next_reply(stdout, id)).await {
        Ok(result) => result,
        Err(_) => Err(E2eError::timeout(operation, target, bound)),
    }
}

async fn next_reply<R>(stdout: &mut Lines<R>, id: u64) -> E2eResult<DriverReply>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = stdout
            .next_line()
            .await?
            .ok_or_else(|| E2eError::Playwright("driver exited unexpectedly".to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let reply: DriverReply = serde_json::from_str(&line)?;
        if reply.id == id {
            return Ok(reply);
        }
        debug!("Discarding stale driver reply {}", reply.id);
    }
}

/// `NODE_PATH` that lets the temp-dir script resolve the project's Playwright install
fn node_path(cwd: &Path) -> String {
    let local: PathBuf = cwd.join("node_modules");
    match std::env::var("NODE_PATH") {
        Ok(existing) if !existing.is_empty() => format!("{}:{}", local.display(), existing),
        _ => local.display().to_string(),
    }
}

/// Driver run by `node`. argv[2] carries the launch options as JSON.
pub const DRIVER_SCRIPT: &str = r#"
const readline = require('readline');
let pw;
try { pw = require('playwright'); } catch (_) { pw = require('@playwright/test'); }

(async () => {
  const opts = JSON.parse(process.argv[2]);
  const reply = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

  let browser;
  try {
    browser = await pw[opts.browser].launch({ headless: opts.headless });
  } catch (error) {
    reply({ id: 0, ok: false, name: error.name, error: error.message });
    process.exit(1);
  }
  const context = await browser.newContext({
    baseURL: opts.baseUrl,
    viewport: { width: opts.width, height: opts.height },
  });
  const page = await context.newPage();
  reply({ id: 0, ok: true, value: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    const cmd = JSON.parse(line);
    try {
      let value = null;
      switch (cmd.op) {
        case 'goto':
          await page.goto(cmd.url, { timeout: cmd.timeout });
          break;
        case 'fill':
          await page.fill(cmd.selector, cmd.value, { timeout: cmd.timeout });
          break;
        case 'click':
          await page.click(cmd.selector, { timeout: cmd.timeout });
          break;
        case 'url':
          value = page.url();
          break;
        case 'texts':
          value = await page.locator(cmd.selector).allTextContents();
          break;
        case 'visible':
          value = await page.locator(cmd.selector).first().isVisible();
          break;
        case 'count':
          value = await page.locator(cmd.selector).count();
          break;
        case 'screenshot':
          await page.screenshot({ path: cmd.path, fullPage: cmd.full_page, timeout: cmd.timeout });
          break;
        case 'trace_start':
          await context.tracing.start({ screenshots: true, snapshots: true });
          break;
        case 'trace_stop':
          await context.tracing.stop(cmd.path ? { path: cmd.path } : {});
          break;
        case 'close':
          reply({ id: cmd.id, ok: true, value: null });
          await browser.close();
          process.exit(0);
        default:
          throw new Error(`unknown op ${cmd.op}`);
      }
      reply({ id: cmd.id, ok: true, value });
    } catch (error) {
      reply({ id: cmd.id, ok: false, name: error.name, error: error.message });
    }
  }
  await browser.close();
})();
"#;
