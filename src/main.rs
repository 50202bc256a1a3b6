//! webverify binary entry point
//!
//! Runs YAML scenarios against an already-running web application.
//! Run with: webverify --scenarios scenarios/

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use webverify::runner::RunnerConfig;
use webverify::session::SessionConfig;
use webverify::{Result, Runner};

#[derive(Parser, Debug)]
#[command(name = "webverify")]
#[command(about = "Headless browser UI verification harness")]
struct Args {
    /// Path to the scenario YAML directory
    #[arg(short, long, default_value = "scenarios")]
    scenarios: PathBuf,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    name: Option<String>,

    /// Base URL of the application under test
    #[arg(long, default_value = "http://localhost:3000")]
    base_url: String,

    /// Run the browser headless (pass `--headless false` for a headed run)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    headless: bool,

    /// Path to the Chromium/Chrome executable (auto-detected when omitted)
    #[arg(long)]
    chrome: Option<String>,

    /// Default viewport width
    #[arg(long, default_value = "1280")]
    viewport_width: u32,

    /// Default viewport height
    #[arg(long, default_value = "720")]
    viewport_height: u32,

    /// Navigation timeout in seconds
    #[arg(long, default_value = "15")]
    nav_timeout: u64,

    /// How long to wait for the target to become reachable, in seconds
    #[arg(long, default_value = "30")]
    startup_timeout: u64,

    /// Directory screenshots are written to
    #[arg(long, default_value = "verification")]
    screenshot_dir: PathBuf,

    /// Output directory for the JSON results file
    #[arg(short, long, default_value = "verification")]
    output: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };
    let result = rt.block_on(async_main(args));

    match result {
        Ok(success) => {
            if success {
                std::process::exit(0);
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> Result<bool> {
    let config = RunnerConfig {
        session: SessionConfig {
            base_url: args.base_url,
            viewport_width: args.viewport_width,
            viewport_height: args.viewport_height,
            headless: args.headless,
            chrome_path: args.chrome,
            nav_timeout: Duration::from_secs(args.nav_timeout),
            ..Default::default()
        },
        scenarios_dir: args.scenarios,
        screenshot_dir: args.screenshot_dir.clone(),
        output_dir: args.output,
        startup_timeout: Duration::from_secs(args.startup_timeout),
    };

    std::fs::create_dir_all(&args.screenshot_dir)?;

    let runner = Runner::with_config(config);

    let results = if let Some(name) = args.name {
        runner.run_named(&name).await?
    } else if let Some(tag) = args.tag {
        runner.run_tagged(&tag).await?
    } else {
        runner.run_all().await?
    };

    runner.write_results(&results)?;

    Ok(results.failed == 0)
}
