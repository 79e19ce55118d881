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

use std::time::Duration;

use model::{collate, Button, Prompt, ScreenLayout};

use crate::error::{Failure, Stage};
use crate::speculos::EventLog;

/// Navigation semantics, fixed as explicit configuration. The defaults fit
/// two-button devices where "right" pages forward, "both" confirms and
/// "left" backs out; other layouts must override them rather than rely on
/// inference.
#[derive(Debug, Clone)]
pub struct ApproverConfig {
    pub poll_interval: Duration,
    /// Consecutive polls without a new event before the flow is declared
    /// stalled.
    pub max_stalled_polls: usize,
    pub next: Button,
    pub approve: Button,
    pub reject: Button,
    pub layout: ScreenLayout,
}

impl Default for ApproverConfig {
    fn default() -> Self {
        ApproverConfig {
            poll_interval: Duration::from_millis(100),
            max_stalled_polls: 50,
            next: Button::Right,
            approve: Button::Both,
            reject: Button::Left,
            layout: ScreenLayout::default(),
        }
    }
}

/// Terminal action once every expected prompt has matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Approve,
    Reject,
}

/// Walks the device's approval flow: polls the event log, matches every
/// newly settled screen against the expected sequence in order, and
/// presses buttons to advance. Runs concurrently with the pending signing
/// command.
pub struct AutoApprover<'a, E> {
    log: &'a E,
    expected: &'a [Prompt],
    config: &'a ApproverConfig,
    terminal: Terminal,

    position: usize,
    consumed: usize,
    seen_events: usize,
    stalled: usize,
    matched: Vec<Prompt>,
}

impl<'a, E: EventLog> AutoApprover<'a, E> {
    pub fn new(
        log: &'a E,
        expected: &'a [Prompt],
        config: &'a ApproverConfig,
        terminal: Terminal,
    ) -> Self {
        AutoApprover {
            log,
            expected,
            config,
            terminal,
            position: 0,
            consumed: 0,
            seen_events: 0,
            stalled: 0,
            matched: Vec::new(),
        }
    }

    /// Screens matched so far, for reporting.
    pub fn matched(&self) -> &[Prompt] {
        &self.matched
    }

    /// Drives the flow up to the terminal button press.
    ///
    /// Returns once the terminal action has been issued; the caller is
    /// expected to be awaiting the device command concurrently and to
    /// collect its resolution afterwards. The terminal button is never
    /// pressed before every expected prompt has matched, in order, with
    /// nothing extra in between.
    pub async fn run(&mut self) -> Result<(), Failure> {
        loop {
            let events = self.log.events().await?;

            if events.len() > self.seen_events {
                self.seen_events = events.len();
                self.stalled = 0;
            } else {
                self.stalled += 1;
                if self.stalled > self.config.max_stalled_polls {
                    return Err(Failure::Timeout {
                        stage: Stage::Navigation,
                    });
                }
            }

            let screens = collate(&events, &self.config.layout);
            for screen in screens.iter().skip(self.consumed) {
                self.consumed += 1;
                self.advance(screen)?;
            }

            if self.position == self.expected.len() {
                let button = match self.terminal {
                    Terminal::Approve => self.config.approve,
                    Terminal::Reject => self.config.reject,
                };
                log::debug!("All prompts matched, pressing terminal {:?}", button);
                self.log.press(button).await?;
                return Ok(());
            }

            // Advance even when nothing new arrived: the current screen may
            // be a pagination page waiting for a press.
            self.log.press(self.config.next).await?;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn advance(&mut self, observed: &Prompt) -> Result<(), Failure> {
        match self.expected.get(self.position) {
            Some(expected) if expected == observed => {
                log::debug!("Matched prompt #{}: {}", self.position, observed);
                self.position += 1;
                self.matched.push(observed.clone());
                Ok(())
            }
            Some(expected) => Err(Failure::Mismatch {
                position: self.position,
                expected: Some(expected.clone()),
                observed: observed.clone(),
            }),
            None => Err(Failure::Mismatch {
                position: self.position,
                expected: None,
                observed: observed.clone(),
            }),
        }
    }
}
