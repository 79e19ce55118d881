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

use serde::Serialize;

use model::{Button, EventList, RawEvent};

use crate::error::Failure;

/// Ordered log of screen events plus the button actuation channel, as
/// exposed by the emulator's control API.
///
/// Factored as a trait so the approver state machine can run against
/// synthetic event streams in tests. `events` is a non-destructive
/// snapshot; `clear` resets the log to empty. No ordering is guaranteed
/// across unrelated concurrent operations, so call sites clear before
/// every isolated phase.
#[allow(async_fn_in_trait)]
pub trait EventLog {
    async fn events(&self) -> Result<Vec<RawEvent>, Failure>;
    async fn clear(&self) -> Result<(), Failure>;
    async fn press(&self, button: Button) -> Result<(), Failure>;
}

/// Client for the speculos emulator control API.
pub struct SpeculosClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ButtonAction<'a> {
    action: &'a str,
}

fn http_err(e: reqwest::Error) -> Failure {
    Failure::Emulator(e.to_string())
}

impl SpeculosClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        SpeculosClient {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

impl EventLog for SpeculosClient {
    async fn events(&self) -> Result<Vec<RawEvent>, Failure> {
        let list: EventList = self
            .client
            .get(format!("{}/events", self.base_url))
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?
            .json()
            .await
            .map_err(http_err)?;

        Ok(list.events)
    }

    async fn clear(&self) -> Result<(), Failure> {
        self.client
            .delete(format!("{}/events", self.base_url))
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?;

        Ok(())
    }

    async fn press(&self, button: Button) -> Result<(), Failure> {
        log::debug!("Pressing {:?}", button);

        self.client
            .post(format!("{}/button/{}", self.base_url, button.name()))
            .json(&ButtonAction {
                action: "press-and-release",
            })
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?;

        Ok(())
    }
}
