// Hardware wallet conformance harness and supporting software libraries
//
// Copyright (C) 2024 Alekos Filini
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use env_logger::Env;

use clap::{Args, Parser};

use harness::report::{render_report, HtmlReport};
use harness::{load_dir, Harness, HarnessConfig, RunLog, SpeculosClient};
use sdk::{DeviceSdk, TcpTransport};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    #[clap(flatten)]
    global_opts: GlobalOpts,
}

#[derive(Debug, Args)]
struct GlobalOpts {
    /// Base address of the emulator's REST control API.
    #[clap(long, short = 'u', default_value = "http://127.0.0.1:5000")]
    api_url: String,

    /// Address of the emulator's APDU socket.
    #[clap(long, short = 'a', default_value = "127.0.0.1:9999")]
    apdu_addr: String,

    /// Directory containing the scenario files
    ///
    /// Every `*.json` file in the directory is loaded as one scenario and
    /// run in file name order.
    #[clap(long, short = 's', default_value = "./scenarios")]
    scenarios_dir: PathBuf,

    /// Per-scenario timeout, in seconds.
    #[clap(long, default_value = "30")]
    scenario_timeout: u64,

    /// Whether to render an HTML report of the run
    #[clap(long, value_enum, default_value = "only-failing")]
    html_report: HtmlReport,

    /// Directory the HTML report is written to
    #[clap(long, default_value = "./reports")]
    report_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), harness::Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    let args = CliArgs::parse();
    let opts = args.global_opts;

    let scenarios = load_dir(&opts.scenarios_dir).await?;
    log::info!(
        "Loaded {} scenarios from {}",
        scenarios.len(),
        opts.scenarios_dir.display()
    );

    let config = HarnessConfig {
        scenario_timeout: Duration::from_secs(opts.scenario_timeout),
        ..Default::default()
    };

    {
        // Log the app identity once before the run
        let transport = TcpTransport::connect(opts.apdu_addr.as_str()).await?;
        let session = DeviceSdk::new(transport);
        match session.get_version().await {
            Ok(version) => log::info!("Device app: {}", version),
            Err(e) => log::warn!("Could not fetch the app version: {}", e),
        }
    }

    let mut cases = Vec::new();
    for scenario in &scenarios {
        if !running.load(Ordering::SeqCst) {
            log::warn!("Interrupted, stopping after {} scenarios", cases.len());
            break;
        }

        // One scenario at a time, on a fresh session each: the event log
        // has no per-scenario partitioning, and a timed out case leaves
        // the device in an unknown state.
        let transport = TcpTransport::connect(opts.apdu_addr.as_str()).await?;
        let device = DeviceSdk::new(transport);
        let events = SpeculosClient::new(opts.api_url.clone());

        let mut harness = Harness::new(device, events, config.clone());
        let verdict = harness.run(scenario).await;

        if verdict.pass {
            log::info!("PASS {}", verdict.name);
        } else {
            log::error!("FAIL {}", verdict.name);
        }
        cases.push(verdict);
    }

    let run = RunLog::new(cases);

    let render = match opts.html_report {
        HtmlReport::All => true,
        HtmlReport::OnlyFailing => !run.result,
        HtmlReport::None => false,
    };
    if render {
        if !opts.report_dir.exists() {
            std::fs::create_dir_all(&opts.report_dir)?;
        }
        render_report(&opts.report_dir.join("report.html"), &run)?;
    }

    let passed = run.cases.iter().filter(|case| case.pass).count();
    log::info!("{}/{} scenarios passed", passed, run.cases.len());

    if !run.result {
        std::process::exit(1);
    }

    Ok(())
}
