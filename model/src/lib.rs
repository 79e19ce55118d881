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

pub mod path;
pub mod screen;

pub use path::{DerivationPath, PathError, HARDENED_FLAG};
pub use screen::{collate, Button, EventList, Prompt, RawEvent, ScreenLayout};

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// Status words reported by the device at the end of every exchange.
pub mod sw {
    pub const OK: u16 = 0x9000;
    pub const DENY: u16 = 0x6985;
    pub const WRONG_P1P2: u16 = 0x6A86;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;
    pub const WRONG_APDU_LENGTH: u16 = 0x6E03;
    pub const WRONG_RESPONSE_LENGTH: u16 = 0xB000;
    pub const DISPLAY_BIP32_PATH_FAIL: u16 = 0xB001;
    pub const DISPLAY_ADDRESS_FAIL: u16 = 0xB002;
    pub const DISPLAY_AMOUNT_FAIL: u16 = 0xB003;
    pub const WRONG_TX_LENGTH: u16 = 0xB004;
    pub const TX_PARSING_FAIL: u16 = 0xB005;
    pub const TX_HASH_FAIL: u16 = 0xB006;
    pub const BAD_STATE: u16 = 0xB007;
    pub const SIGNATURE_FAIL: u16 = 0xB008;

    pub fn describe(sw: u16) -> &'static str {
        match sw {
            OK => "ok",
            DENY => "denied by user",
            WRONG_P1P2 => "wrong p1/p2",
            INS_NOT_SUPPORTED => "instruction not supported",
            CLA_NOT_SUPPORTED => "class not supported",
            WRONG_APDU_LENGTH => "wrong apdu length",
            WRONG_RESPONSE_LENGTH => "wrong response length",
            DISPLAY_BIP32_PATH_FAIL => "failed displaying bip32 path",
            DISPLAY_ADDRESS_FAIL => "failed displaying address",
            DISPLAY_AMOUNT_FAIL => "failed displaying amount",
            WRONG_TX_LENGTH => "wrong transaction length",
            TX_PARSING_FAIL => "transaction parsing failed",
            TX_HASH_FAIL => "transaction hashing failed",
            BAD_STATE => "bad state",
            SIGNATURE_FAIL => "signing failed",
            _ => "unknown status word",
        }
    }
}

/// Verification material returned by the device for a derivation path.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Errors surfaced by a device session.
///
/// `Rejected` is kept distinct from the generic variants: an explicit
/// decline by the device is the *required* outcome of expect-fail
/// scenarios and must never be folded into a transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    Rejected { sw: u16 },
    Transport(String),
    Protocol(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Rejected { sw } => write!(
                f,
                "device rejected the operation (sw=0x{:04X}, {})",
                sw,
                sw::describe(*sw)
            ),
            DeviceError::Transport(e) => write!(f, "transport error: {}", e),
            DeviceError::Protocol(e) => write!(f, "protocol error: {}", e),
        }
    }
}

impl std::error::Error for DeviceError {}
