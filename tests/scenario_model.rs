//! Scenario model integration tests
//!
//! Runs without a browser: parses the bundled scenario files and exercises
//! route lowering and matching against them.

use std::path::Path;
use std::time::Duration;

use test_case::test_case;

use webverify::dialogs::ObservationLog;
use webverify::routes::InterceptedRequest;
use webverify::{DialogEvent, DialogKind, RouteAction, Scenario, Step};

fn req(method: &str, url: &str) -> InterceptedRequest {
    InterceptedRequest {
        url: url.to_string(),
        method: method.to_string(),
    }
}

#[test]
fn test_bundled_scenarios_parse() {
    let scenarios = Scenario::load_all(Path::new("scenarios")).unwrap();
    assert_eq!(scenarios.len(), 4);

    let names: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"full-automation"));
    assert!(names.contains(&"status-empty-state"));
    assert!(names.contains(&"status-empty-state-corrected"));
    assert!(names.contains(&"troubleshoot-section"));

    for scenario in &scenarios {
        assert!(!scenario.steps.is_empty(), "{} has no steps", scenario.name);
        // Lowering must succeed for every bundled file.
        scenario.route_table().unwrap();
    }
}

#[test]
fn test_full_automation_dialog_policy() {
    let scenario = load("full-automation");
    let policy = scenario.dialogs.to_policy();
    assert!(policy.accept);
    assert_eq!(policy.prompt_text.as_deref(), Some("bojex.online"));
}

#[test_case("GET", "http://localhost:3000/api/auth/login", true ; "login fulfilled")]
#[test_case("POST", "http://localhost:3000/api/auth/login", true ; "login post fulfilled")]
#[test_case("GET", "http://localhost:3000/api/routers", true ; "routers get fulfilled")]
#[test_case("GET", "http://localhost:3000/api/routers?page=2", true ; "query string ignored")]
#[test_case("GET", "http://localhost:3000/api/routers/abc/push-config", true ; "push config fulfilled")]
#[test_case("GET", "http://localhost:3000/api/mikrotik/health", true ; "health fulfilled")]
#[test_case("GET", "http://localhost:3000/assets/logo.png", false ; "static asset untouched")]
fn test_full_automation_route_matching(method: &str, url: &str, fulfilled: bool) {
    let table = load("full-automation").route_table().unwrap();
    let action = table.matching(&req(method, url));
    match (action, fulfilled) {
        (Some(RouteAction::Fulfill(_)), true) => {}
        (None, false) => {}
        (other, _) => panic!("unexpected action for {} {}: {:?}", method, url, other),
    }
}

#[test]
fn test_full_automation_router_mutation_passes_through() {
    let table = load("full-automation").route_table().unwrap();
    // GET hits the fixture rule, POST falls through to the explicit
    // pass-through rule behind it.
    assert!(matches!(
        table.matching(&req("GET", "http://localhost:3000/api/routers")),
        Some(RouteAction::Fulfill(_))
    ));
    assert!(matches!(
        table.matching(&req("POST", "http://localhost:3000/api/routers")),
        Some(RouteAction::PassThrough)
    ));
}

#[test]
fn test_full_automation_login_fixture_shape() {
    let table = load("full-automation").route_table().unwrap();
    let action = table.matching(&req("POST", "http://localhost:3000/api/auth/login"));
    let fixture = match action {
        Some(RouteAction::Fulfill(fx)) => fx,
        other => panic!("login not fulfilled: {:?}", other),
    };

    assert_eq!(fixture.status, 200);
    assert_eq!(fixture.body["token"], "fake-token");
    assert_eq!(fixture.body["user"]["role"], "admin");
    assert!(fixture.body["user"]["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p == "manage_settings"));
}

#[test]
fn test_status_scenarios_have_no_routes() {
    for name in ["status-empty-state", "status-empty-state-corrected"] {
        let scenario = load(name);
        assert!(scenario.routes.is_empty());
        assert!(scenario.route_table().unwrap().is_empty());
    }
}

#[test]
fn test_step_names_are_descriptive() {
    let scenario = load("full-automation");
    let names: Vec<String> = scenario.steps.iter().map(Step::name).collect();
    assert_eq!(names[0], "navigate:/team");
    assert!(names.iter().any(|n| n.starts_with("expect_dialogs")));
    assert!(names.iter().any(|n| n.starts_with("screenshot:")));
}

#[test]
fn test_tag_filter_selects_public_scenarios() {
    let scenarios = Scenario::load_all(Path::new("scenarios")).unwrap();
    let public = Scenario::filter_by_tag(&scenarios, "public");
    assert_eq!(public.len(), 3);
    let admin = Scenario::filter_by_tag(&scenarios, "admin");
    assert_eq!(admin.len(), 1);
}

#[tokio::test]
async fn test_observation_log_wait_resolves_on_push() {
    let log = ObservationLog::default();

    let waiter = {
        let log = log.clone();
        tokio::spawn(async move { log.wait_for(2, Duration::from_secs(5)).await })
    };

    log.push(DialogEvent {
        kind: DialogKind::Prompt,
        message: "Enter Server Address (IP or Domain) for this network:".into(),
    });
    log.push(DialogEvent {
        kind: DialogKind::Confirm,
        message: "This will apply the following settings to the router.".into(),
    });

    let observed = waiter.await.unwrap();
    assert_eq!(observed.len(), 2);
    assert_eq!(observed[0].kind, DialogKind::Prompt);
    assert!(observed[0].message.contains("Enter Server Address"));
    assert!(observed[1]
        .message
        .contains("This will apply the following settings"));
}

fn load(name: &str) -> Scenario {
    let scenarios = Scenario::load_all(Path::new("scenarios")).unwrap();
    scenarios
        .into_iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("scenario {} not bundled", name))
}
