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

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use model::{Button, DeviceError, Prompt, SIGNATURE_LEN};

use crate::approver::{ApproverConfig, AutoApprover, Terminal};
use crate::device::Device;
use crate::error::{Failure, Stage};
use crate::scenario::{Mode, OptionRecipe, Scenario};
use crate::speculos::EventLog;
use crate::verify;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub approver: ApproverConfig,
    /// Bound on the identity fetch.
    pub command_timeout: Duration,
    /// Bound on a whole scenario. A session that trips it is tainted: the
    /// device state is unknown and the session must not be reused.
    pub scenario_timeout: Duration,
    pub option_recipes: Vec<OptionRecipe>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            approver: ApproverConfig::default(),
            command_timeout: Duration::from_secs(5),
            scenario_timeout: Duration::from_secs(30),
            option_recipes: vec![
                // Settings layout of the reference app: two rights to reach
                // the settings entry, "both" to open it, "both" again to
                // flip blind signing, then back out the same way.
                OptionRecipe {
                    name: "blind_signing".to_string(),
                    enter: vec![Button::Right, Button::Right, Button::Both],
                    toggle: vec![Button::Both],
                    leave: vec![Button::Right, Button::Right, Button::Both],
                },
            ],
        }
    }
}

/// Outcome of one scenario. Atomically pass or fail: there is no partial
/// success.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub name: String,
    pub pass: bool,
    pub failure: Option<String>,
    /// Screens matched before the outcome, for the report.
    pub screens: Vec<String>,
    pub duration_ms: u64,
}

/// Aggregated outcome of a run.
#[derive(Debug, Serialize)]
pub struct RunLog {
    pub result: bool, // used in the Handlebars template
    pub cases: Vec<Verdict>,
}

impl RunLog {
    pub fn new(cases: Vec<Verdict>) -> Self {
        RunLog {
            result: cases.iter().all(|case| case.pass),
            cases,
        }
    }
}

/// Runs scenarios against one device session and its event log.
///
/// The event log has no per-scenario partitioning, so a harness owns its
/// session exclusively and runs one scenario at a time.
pub struct Harness<D, E> {
    device: D,
    events: E,
    config: HarnessConfig,
    options: HashMap<String, bool>,
    tainted: bool,
}

impl<D: Device, E: EventLog> Harness<D, E> {
    pub fn new(device: D, events: E, config: HarnessConfig) -> Self {
        Harness {
            device,
            events,
            config,
            options: HashMap::new(),
            tainted: false,
        }
    }

    /// Whether a previous scenario timed out, leaving the device state
    /// unknown.
    pub fn tainted(&self) -> bool {
        self.tainted
    }

    pub async fn run(&mut self, scenario: &Scenario) -> Verdict {
        log::info!("Running scenario '{}'", scenario.name);
        let started = Instant::now();

        let mut screens = Vec::new();
        let result = self.run_inner(scenario, &mut screens).await;

        let (pass, failure) = match result {
            Ok(()) => (true, None),
            Err(failure) => {
                if matches!(failure, Failure::Timeout { .. }) {
                    self.tainted = true;
                }
                log::warn!("Scenario '{}' failed: {}", scenario.name, failure);
                (false, Some(failure.to_string()))
            }
        };

        Verdict {
            name: scenario.name.clone(),
            pass,
            failure,
            screens: screens.iter().map(|screen| screen.to_string()).collect(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn run_inner(
        &mut self,
        scenario: &Scenario,
        screens: &mut Vec<Prompt>,
    ) -> Result<(), Failure> {
        let transaction = scenario
            .transaction_bytes()
            .map_err(|e| Failure::InvalidScenario(format!("bad transaction hex: {}", e)))?;

        self.apply_options(scenario).await?;

        // Fetch the key first, clearing around it: key retrieval may prompt
        // on some devices and those screens must never leak into the
        // expected sequence.
        self.events.clear().await?;
        let public_key = match tokio::time::timeout(
            self.config.command_timeout,
            self.device.get_public_key(&scenario.path),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Failure::Timeout {
                    stage: Stage::Identity,
                })
            }
        };
        log::debug!("Device key for {}: {}", scenario.path, public_key);
        self.events.clear().await?;

        let terminal = match scenario.mode {
            Mode::Approve => Terminal::Approve,
            Mode::ExpectFail => Terminal::Reject,
        };
        let mut approver = AutoApprover::new(
            &self.events,
            &scenario.prompts,
            &self.config.approver,
            terminal,
        );

        let signing = self.device.sign_transaction(&scenario.path, &transaction);
        tokio::pin!(signing);

        // The pending command and the approval loop progress concurrently
        // within this one task. The command resolving first (an early
        // rejection) short-circuits the navigation.
        let signed: Result<Result<Vec<u8>, DeviceError>, Failure> =
            tokio::time::timeout(self.config.scenario_timeout, async {
                tokio::select! {
                    signed = &mut signing => Ok(signed),
                    drove = approver.run() => match drove {
                        Ok(()) => Ok(signing.await),
                        Err(failure) => Err(failure),
                    },
                }
            })
            .await
            .map_err(|_| Failure::Timeout {
                stage: Stage::Signing,
            })
            .and_then(|outcome| outcome);

        screens.extend_from_slice(approver.matched());
        let signed = signed?;

        match scenario.mode {
            Mode::Approve => {
                // A rejection here, despite every prompt having matched, is
                // a policy violation and stays a hard failure.
                let signature = signed.map_err(Failure::from)?;

                if signature.len() != SIGNATURE_LEN {
                    return Err(Failure::WrongSignatureLength {
                        got: signature.len(),
                    });
                }

                let digest = verify::hash(&transaction);
                if !verify::verify(&signature, &digest, &public_key.0) {
                    return Err(Failure::VerificationFailed {
                        digest: hex::encode(digest),
                        public_key: public_key.to_string(),
                        signature: hex::encode(&signature),
                    });
                }

                log::debug!("Signature verified ({})", verify::digest_b64(&digest));
                Ok(())
            }
            Mode::ExpectFail => match signed {
                Err(DeviceError::Rejected { .. }) => Ok(()),
                Err(other) => Err(other.into()),
                Ok(_) => Err(Failure::UnexpectedSuccess),
            },
        }
    }

    async fn apply_options(&mut self, scenario: &Scenario) -> Result<(), Failure> {
        for (name, &value) in &scenario.options {
            let current = self.options.get(name).copied().unwrap_or(false);
            if current == value {
                continue;
            }

            let recipe = self
                .config
                .option_recipes
                .iter()
                .find(|recipe| &recipe.name == name)
                .cloned()
                .ok_or_else(|| {
                    Failure::InvalidScenario(format!("no recipe for option '{}'", name))
                })?;

            log::debug!("Toggling option '{}' -> {}", name, value);
            for button in recipe
                .enter
                .iter()
                .chain(&recipe.toggle)
                .chain(&recipe.leave)
            {
                self.events.press(*button).await?;
            }

            self.options.insert(name.clone(), value);
        }

        if !scenario.options.is_empty() {
            // Settings navigation draws its own screens
            self.events.clear().await?;
        }

        Ok(())
    }
}
