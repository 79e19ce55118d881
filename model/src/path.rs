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
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const HARDENED_FLAG: u32 = 0x80000000;

/// Hierarchical key derivation path, e.g. `44'/535348'/0'`.
///
/// Hardened components carry [`HARDENED_FLAG`]. Scenarios declare paths as
/// strings; an optional leading `m/` is accepted and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Wire encoding consumed by the device: component count, then each
    /// component as a little-endian u32.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.0.len() * 4);
        out.push(self.0.len() as u8);
        for component in &self.0 {
            out.extend_from_slice(&component.to_le_bytes());
        }
        out
    }
}

impl FromStr for DerivationPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("m/").unwrap_or(s);
        if s.is_empty() {
            return Err(PathError::Empty);
        }

        let mut components = Vec::new();
        for segment in s.split('/') {
            if segment.is_empty() {
                return Err(PathError::EmptySegment);
            }

            let (index, hardened) = match segment.strip_suffix('\'') {
                Some(stripped) => (stripped, true),
                None => (segment, false),
            };
            let index = index
                .parse::<u32>()
                .map_err(|_| PathError::InvalidSegment(segment.to_string()))?;
            if index >= HARDENED_FLAG {
                return Err(PathError::IndexOutOfRange(index));
            }

            components.push(if hardened { index | HARDENED_FLAG } else { index });
        }

        if components.len() > u8::MAX as usize {
            return Err(PathError::TooManyComponents);
        }

        Ok(DerivationPath(components))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            if component & HARDENED_FLAG != 0 {
                write!(f, "{}'", component & !HARDENED_FLAG)?;
            } else {
                write!(f, "{}", component)?;
            }
        }
        Ok(())
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    EmptySegment,
    InvalidSegment(String),
    IndexOutOfRange(u32),
    TooManyComponents,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "empty derivation path"),
            PathError::EmptySegment => write!(f, "empty path segment"),
            PathError::InvalidSegment(s) => write!(f, "invalid path segment {:?}", s),
            PathError::IndexOutOfRange(i) => write!(f, "path index {} out of range", i),
            PathError::TooManyComponents => write!(f, "too many path components"),
        }
    }
}

impl std::error::Error for PathError {}
