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

//! Fixed digest and signature scheme of the signing path: the device signs
//! the Blake2b-256 digest of the transaction bytes with Ed25519.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use ed25519_dalek::{Signature, VerifyingKey};

type Blake2b256 = Blake2b<U32>;

pub const DIGEST_LEN: usize = 32;

/// Content digest of the transaction bytes.
pub fn hash(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Blake2b256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Checks `signature` over `digest` against `public_key`.
///
/// Malformed input (wrong lengths, non-canonical key or signature) yields
/// `false` rather than an error: callers assert on the boolean.
pub fn verify(signature: &[u8], digest: &[u8], public_key: &[u8]) -> bool {
    let public_key: &[u8; 32] = match public_key.try_into() {
        Ok(key) => key,
        Err(_) => return false,
    };
    let public_key = match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(signature) {
        Ok(signature) => signature,
        Err(_) => return false,
    };

    public_key.verify_strict(digest, &signature).is_ok()
}

/// Unpadded url-safe base64 of a digest, the encoding the device uses when
/// showing a transaction hash on screen.
pub fn digest_b64(digest: &[u8]) -> String {
    base64::encode_config(digest, base64::URL_SAFE_NO_PAD)
}

#[cfg(test)]
mod tests {
    use super::*;

    use ed25519_dalek::{Signer, SigningKey};

    // Transaction pattern and digest from the reference signing flow
    fn reference_transaction() -> Vec<u8> {
        let mut transaction = Vec::new();
        for _ in 0..52 {
            transaction.extend_from_slice(&hex::decode("0123456789abcdef").unwrap());
        }
        transaction
    }

    #[test]
    fn test_hash_reference_transaction() {
        let digest = hash(&reference_transaction());
        assert_eq!(
            digest_b64(&digest),
            "yC9c_Zn3cjRXV89tJaT4WjCjXsFF4UQWn2Aq2sHjY-4"
        );
    }

    #[test]
    fn test_verify_roundtrip() {
        let key = SigningKey::from_bytes(&[0x42; 32]);
        let digest = hash(b"some transaction");
        let signature = key.sign(&digest).to_bytes();

        assert!(verify(
            &signature,
            &digest,
            &key.verifying_key().to_bytes()
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_digest() {
        let key = SigningKey::from_bytes(&[0x42; 32]);
        let signature = key.sign(&hash(b"some transaction")).to_bytes();

        assert!(!verify(
            &signature,
            &hash(b"another transaction"),
            &key.verifying_key().to_bytes()
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let key = SigningKey::from_bytes(&[0x42; 32]);
        let other = SigningKey::from_bytes(&[0x43; 32]);
        let digest = hash(b"some transaction");
        let signature = key.sign(&digest).to_bytes();

        assert!(!verify(
            &signature,
            &digest,
            &other.verifying_key().to_bytes()
        ));
    }

    #[test]
    fn test_verify_is_false_on_malformed_input() {
        let key = SigningKey::from_bytes(&[0x42; 32]);
        let digest = hash(b"some transaction");
        let signature = key.sign(&digest).to_bytes();
        let public_key = key.verifying_key().to_bytes();

        assert!(!verify(&signature[..32], &digest, &public_key));
        assert!(!verify(&[], &digest, &public_key));
        assert!(!verify(&signature, &digest, &public_key[..16]));
        assert!(!verify(&signature, &digest, &[0xFF; 33]));
    }

    #[test]
    fn test_digest_b64_is_unpadded() {
        let encoded = digest_b64(&hash(b""));
        assert_eq!(encoded.len(), 43);
        assert!(!encoded.ends_with('='));
    }
}
