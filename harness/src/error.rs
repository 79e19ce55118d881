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

use core::fmt;

use model::{sw, DeviceError, Prompt};

/// Stage of a scenario a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Identity,
    Navigation,
    Signing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Identity => write!(f, "identity fetch"),
            Stage::Navigation => write!(f, "navigation"),
            Stage::Signing => write!(f, "signing"),
        }
    }
}

/// Everything that can sink a scenario.
///
/// No variant is ever retried or suppressed; each one renders a distinct
/// message so a failed run points at the exact stage that broke.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The device showed a screen out of line with the expected sequence.
    /// `expected` is `None` when the device kept drawing past the end of
    /// the sequence.
    Mismatch {
        position: usize,
        expected: Option<Prompt>,
        observed: Prompt,
    },
    /// The device declined an operation the scenario required to succeed.
    DeviceRejected { sw: u16 },
    /// An expect-fail scenario got a signature instead of a refusal.
    UnexpectedSuccess,
    /// The returned signature is not exactly the fixed signature size.
    WrongSignatureLength { got: usize },
    /// The signature does not verify against the transaction digest and
    /// the device's own public key.
    VerificationFailed {
        digest: String,
        public_key: String,
        signature: String,
    },
    /// The event stream or the pending command stalled past the bound.
    /// The session is tainted afterwards and must not be reused.
    Timeout { stage: Stage },
    /// The scenario declaration itself is unusable.
    InvalidScenario(String),
    /// The device session broke down below the protocol level.
    Device(String),
    /// The emulator control endpoint broke down.
    Emulator(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Mismatch {
                position,
                expected: Some(expected),
                observed,
            } => write!(
                f,
                "screen mismatch at position {}: expected {}, device showed {}",
                position, expected, observed
            ),
            Failure::Mismatch {
                position,
                expected: None,
                observed,
            } => write!(
                f,
                "unexpected screen after position {}: device showed {}",
                position, observed
            ),
            Failure::DeviceRejected { sw } => write!(
                f,
                "device rejected the operation: 0x{:04X} ({})",
                sw,
                sw::describe(*sw)
            ),
            Failure::UnexpectedSuccess => {
                write!(f, "device signed a transaction it was expected to refuse")
            }
            Failure::WrongSignatureLength { got } => {
                write!(f, "expected a {} byte signature, got {} bytes", model::SIGNATURE_LEN, got)
            }
            Failure::VerificationFailed {
                digest,
                public_key,
                signature,
            } => write!(
                f,
                "signature verification failed: sig={} digest={} pubkey={}",
                signature, digest, public_key
            ),
            Failure::Timeout { stage } => write!(f, "timed out during {}", stage),
            Failure::InvalidScenario(e) => write!(f, "invalid scenario: {}", e),
            Failure::Device(e) => write!(f, "device session error: {}", e),
            Failure::Emulator(e) => write!(f, "emulator control error: {}", e),
        }
    }
}

impl std::error::Error for Failure {}

impl From<DeviceError> for Failure {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Rejected { sw } => Failure::DeviceRejected { sw },
            other => Failure::Device(other.to_string()),
        }
    }
}
