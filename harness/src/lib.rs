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

//! Conformance harness for a hardware wallet's transaction-signing flow.
//!
//! A scenario issues a signing command against a device session, walks the
//! device's on-screen approval sequence by matching every displayed screen
//! against a declared expected sequence, and checks the returned signature
//! against the transaction digest and the device's own public key.

pub mod approver;
pub mod device;
pub mod error;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod speculos;
pub mod verify;

#[cfg(test)]
mod tests;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

pub use approver::{ApproverConfig, AutoApprover, Terminal};
pub use device::Device;
pub use error::{Failure, Stage};
pub use runner::{Harness, HarnessConfig, RunLog, Verdict};
pub use scenario::{load_dir, Mode, OptionRecipe, Scenario};
pub use speculos::{EventLog, SpeculosClient};
