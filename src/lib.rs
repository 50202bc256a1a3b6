//! webverify - headless browser UI verification harness
//!
//! This crate drives a Chromium browser over CDP to verify a running web
//! application end to end:
//! - Intercepts network requests and serves JSON fixtures in their place
//! - Walks the UI through declarative YAML scenarios
//! - Auto-resolves native dialogs (alert/confirm/prompt) and records them
//! - Captures PNG screenshots as evidence
//!
//! The application under test is expected to already be running; the
//! harness only probes it for reachability.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Scenario Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Runner                                                     │
//! │    ├── wait_until_ready(base_url)                           │
//! │    ├── run_scenario(scenario) -> ScenarioResult             │
//! │    │     ├── Session::launch() ── CDP via chromiumoxide     │
//! │    │     ├── routes::install()  ── Fetch interception       │
//! │    │     └── DialogWatcher::install()                       │
//! │    └── write_results() -> results.json                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, tags, viewport                                 │
//! │    ├── routes: [{ pattern, method, fulfill | passthrough }] │
//! │    ├── dialogs: { accept, prompt_text }                     │
//! │    └── steps: [Step]                                        │
//! │          ├── navigate { url }                               │
//! │          ├── click / fill / scroll_into_view { target }     │
//! │          ├── assert_visible { target, timeout_ms }          │
//! │          ├── expect_dialogs { contains, within_ms }         │
//! │          └── screenshot { name, target?, full_page }        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod dialogs;
pub mod error;
pub mod routes;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod target;

pub use actions::Locator;
pub use dialogs::{DialogEvent, DialogKind, DialogPolicy, DialogWatcher};
pub use error::{Error, Result};
pub use routes::{Fixture, InterceptedRequest, Responder, RouteAction, RouteTable};
pub use runner::{Runner, RunnerConfig, ScenarioResult, StepResult, SuiteResult};
pub use scenario::{Scenario, Step, TargetSpec};
pub use session::{Session, SessionConfig};
