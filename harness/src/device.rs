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

use model::{DerivationPath, DeviceError, PublicKey};

/// Capability surface of one connected device.
///
/// Everything below this trait (command encoding, transport framing) is an
/// external collaborator; the harness only consumes the two operations.
/// Implemented by [`sdk::DeviceSdk`] for real or emulated hardware and by
/// the scripted fixture in the test suite.
#[allow(async_fn_in_trait)]
pub trait Device {
    async fn get_public_key(&self, path: &DerivationPath) -> Result<PublicKey, DeviceError>;

    /// Pending until the on-screen approval flow completes; resolves with
    /// the raw signature bytes or [`DeviceError::Rejected`].
    async fn sign_transaction(
        &self,
        path: &DerivationPath,
        transaction: &[u8],
    ) -> Result<Vec<u8>, DeviceError>;
}

impl<T: sdk::Transport> Device for sdk::DeviceSdk<T> {
    async fn get_public_key(&self, path: &DerivationPath) -> Result<PublicKey, DeviceError> {
        sdk::DeviceSdk::get_public_key(self, path).await
    }

    async fn sign_transaction(
        &self,
        path: &DerivationPath,
        transaction: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        sdk::DeviceSdk::sign_transaction(self, path, transaction).await
    }
}
