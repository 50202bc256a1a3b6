//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::actions::Locator;
use crate::dialogs::DialogPolicy;
use crate::error::{Error, Result};
use crate::routes::{Fixture, Responder, RouteTable};

/// A complete verification scenario parsed from YAML.
///
/// One scenario runs against one fresh browser session; scenarios never
/// share state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size for the browser
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Route interception rules, registered before navigation in the order
    /// written here (first match wins)
    #[serde(default)]
    pub routes: Vec<RouteSpec>,

    /// How native dialogs are resolved
    #[serde(default)]
    pub dialogs: DialogPolicySpec,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

fn default_viewport() -> Viewport {
    Viewport {
        width: 1280,
        height: 720,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Declarative form of a route rule.
///
/// Exactly one of `fulfill` / `passthrough` must be given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Glob-style URL pattern (`**/api/routers`)
    pub pattern: String,

    /// HTTP method filter; absent = any method
    #[serde(default)]
    pub method: Option<String>,

    /// Canned response
    #[serde(default)]
    pub fulfill: Option<FulfillSpec>,

    /// Forward the request unmodified
    #[serde(default)]
    pub passthrough: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillSpec {
    #[serde(default = "default_status")]
    pub status: u16,
    pub json: serde_json::Value,
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogPolicySpec {
    #[serde(default = "default_true")]
    pub accept: bool,
    #[serde(default)]
    pub prompt_text: Option<String>,
}

impl Default for DialogPolicySpec {
    fn default() -> Self {
        Self {
            accept: true,
            prompt_text: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl DialogPolicySpec {
    pub fn to_policy(&self) -> DialogPolicy {
        DialogPolicy {
            accept: self.accept,
            prompt_text: self.prompt_text.clone(),
        }
    }
}

/// A target locator in step specs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSpec {
    /// Visible text content
    Text(String),
    /// CSS selector
    Css(String),
    /// Element id
    Id(String),
    /// Accessibility role + accessible name
    Role { role: String, name: String },
}

impl TargetSpec {
    pub fn to_locator(&self) -> Locator {
        match self {
            Self::Text(t) => Locator::Text(t.clone()),
            Self::Css(s) => Locator::Css(s.clone()),
            Self::Id(id) => Locator::Id(id.clone()),
            Self::Role { role, name } => Locator::Role {
                role: role.clone(),
                name: name.clone(),
            },
        }
    }
}

/// A single step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to the base URL) and wait for network
    /// idleness
    Navigate { url: String },

    /// Fill an input field
    Fill {
        target: TargetSpec,
        value: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Click an element
    Click {
        target: TargetSpec,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Scroll an element into the viewport
    ScrollIntoView { target: TargetSpec },

    /// Assert that the target is visible within the bound
    AssertVisible {
        target: TargetSpec,
        #[serde(default = "default_assert_timeout")]
        timeout_ms: u64,
    },

    /// Wait for the dialog log to contain these messages (ordered substring
    /// match), bounded
    ExpectDialogs {
        contains: Vec<String>,
        #[serde(default = "default_dialog_timeout")]
        within_ms: u64,
    },

    /// Capture a screenshot (element-scoped when `target` is given)
    Screenshot {
        name: String,
        #[serde(default)]
        target: Option<TargetSpec>,
        #[serde(default)]
        full_page: bool,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_assert_timeout() -> u64 {
    5000
}

fn default_dialog_timeout() -> u64 {
    3000
}

impl Step {
    /// Short descriptor used in step results and logs.
    pub fn name(&self) -> String {
        match self {
            Self::Navigate { url } => format!("navigate:{}", url),
            Self::Fill { target, .. } => format!("fill:{}", target.to_locator()),
            Self::Click { target, .. } => format!("click:{}", target.to_locator()),
            Self::ScrollIntoView { target } => {
                format!("scroll_into_view:{}", target.to_locator())
            }
            Self::AssertVisible { target, .. } => {
                format!("assert_visible:{}", target.to_locator())
            }
            Self::ExpectDialogs { contains, .. } => {
                format!("expect_dialogs:{}", contains.len())
            }
            Self::Screenshot { name, .. } => format!("screenshot:{}", name),
            Self::Sleep { ms } => format!("sleep:{}ms", ms),
            Self::Log { message } => {
                // Truncate on char boundaries; messages may be non-ASCII
                let prefix: String = message.chars().take(30).collect();
                format!("log:{}", prefix)
            }
        }
    }
}

impl Scenario {
    /// Parse a scenario from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load all scenarios from a directory (recursively).
    pub fn load_all(dir: &Path) -> Result<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }

    /// Filter scenarios by tag.
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Lower the route specs into an ordered table.
    pub fn route_table(&self) -> Result<RouteTable> {
        let mut table = RouteTable::new();
        for spec in &self.routes {
            let responder = match (&spec.fulfill, spec.passthrough) {
                (Some(fulfill), false) => Responder::Fulfill(Fixture {
                    status: fulfill.status,
                    body: fulfill.json.clone(),
                }),
                (None, true) => Responder::PassThrough,
                // validate() rejects the remaining combinations
                _ => {
                    return Err(Error::ScenarioParse(format!(
                        "route '{}' needs exactly one of fulfill/passthrough",
                        spec.pattern
                    )))
                }
            };
            table.register(&spec.pattern, spec.method.as_deref(), responder)?;
        }
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::ScenarioParse("scenario name is empty".to_string()));
        }
        for spec in &self.routes {
            if spec.fulfill.is_some() == spec.passthrough {
                return Err(Error::ScenarioParse(format!(
                    "route '{}' needs exactly one of fulfill/passthrough",
                    spec.pattern
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_scenario() {
        let yaml = r#"
name: status-empty-state
description: Verify the empty search state on the status card
tags:
  - smoke
steps:
  - action: navigate
    url: /
  - action: scroll_into_view
    target: { id: status }
  - action: assert_visible
    target: { text: "No Active Search" }
  - action: screenshot
    name: status_empty_state
    target: { id: status }
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "status-empty-state");
        assert_eq!(scenario.steps.len(), 4);
        assert_eq!(scenario.viewport.width, 1280);
        assert!(scenario.routes.is_empty());
    }

    #[test]
    fn test_parse_routes_and_dialogs() {
        let yaml = r#"
name: push-config
routes:
  - pattern: "**/api/auth/login"
    fulfill:
      json: { token: fake-token, role: admin }
  - pattern: "**/api/routers"
    method: GET
    fulfill:
      json: []
  - pattern: "**/api/routers"
    passthrough: true
dialogs:
  accept: true
  prompt_text: bojex.online
steps:
  - action: navigate
    url: /team
  - action: expect_dialogs
    contains:
      - "Enter Server Address"
      - "This will apply the following settings"
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.routes.len(), 3);
        assert_eq!(scenario.routes[1].method.as_deref(), Some("GET"));
        assert_eq!(scenario.dialogs.prompt_text.as_deref(), Some("bojex.online"));

        let table = scenario.route_table().unwrap();
        assert_eq!(table.len(), 3);

        match &scenario.steps[1] {
            Step::ExpectDialogs { contains, within_ms } => {
                assert_eq!(contains.len(), 2);
                assert_eq!(*within_ms, 3000);
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_route_with_both_responders_is_rejected() {
        let yaml = r#"
name: bad-route
routes:
  - pattern: "**/api/settings"
    passthrough: true
    fulfill:
      json: {}
steps:
  - action: navigate
    url: /
"#;
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_route_with_no_responder_is_rejected() {
        let yaml = r#"
name: bad-route
routes:
  - pattern: "**/api/settings"
steps:
  - action: navigate
    url: /
"#;
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_role_target_lowers_to_locator() {
        let yaml = r#"
name: troubleshoot
steps:
  - action: click
    target:
      role: { role: link, name: "No Connection?" }
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        match &scenario.steps[0] {
            Step::Click { target, .. } => {
                assert_eq!(
                    target.to_locator(),
                    Locator::Role {
                        role: "link".into(),
                        name: "No Connection?".into()
                    }
                );
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_filter_by_tag() {
        let yaml_a = "name: a\ntags: [smoke]\nsteps: [{action: navigate, url: /}]";
        let yaml_b = "name: b\ntags: [full]\nsteps: [{action: navigate, url: /}]";
        let scenarios = vec![
            Scenario::from_yaml(yaml_a).unwrap(),
            Scenario::from_yaml(yaml_b).unwrap(),
        ];

        let smoke = Scenario::filter_by_tag(&scenarios, "smoke");
        assert_eq!(smoke.len(), 1);
        assert_eq!(smoke[0].name, "a");
    }

    #[test]
    fn test_step_names() {
        assert_eq!(
            Step::Navigate { url: "/team".into() }.name(),
            "navigate:/team"
        );
        assert_eq!(
            Step::Screenshot {
                name: "full_automation_verified".into(),
                target: None,
                full_page: false
            }
            .name(),
            "screenshot:full_automation_verified"
        );
        assert_eq!(Step::Sleep { ms: 250 }.name(), "sleep:250ms");
    }

    #[test]
    fn test_log_step_name_truncates_on_char_boundary() {
        // Byte 30 lands inside the em-dash; slicing by bytes would panic.
        let step = Step::Log {
            message: "I-click ang Push Config icons—pagkatapos kumpirmahin agad".into(),
        };
        let name = step.name();
        assert!(name.starts_with("log:I-click ang Push Config"));
        assert_eq!(name.chars().count(), "log:".len() + 30);

        let short = Step::Log {
            message: "done".into(),
        };
        assert_eq!(short.name(), "log:done");
    }
}
