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

use std::collections::BTreeMap;
use std::sync::Once;
use std::time::Duration;

use model::Prompt;

use crate::runner::{Harness, HarnessConfig};
use crate::scenario::{Mode, Scenario};
use crate::verify;

use fixture::FakeWallet;


pub static INIT_LOG: Once = Once::new();

/// One scripted wallet wired up as both the device session and the event
/// log of a harness, with test-friendly timings.
pub struct TestEnv {
    pub wallet: FakeWallet,
    pub harness: Harness<FakeWallet, FakeWallet>,
}

impl TestEnv {
    pub fn new(wallet: FakeWallet) -> Self {
        let mut config = HarnessConfig::default();
        config.approver.poll_interval = Duration::from_millis(1);
        config.approver.max_stalled_polls = 25;
        config.command_timeout = Duration::from_secs(1);
        config.scenario_timeout = Duration::from_secs(5);

        TestEnv {
            wallet: wallet.clone(),
            harness: Harness::new(wallet.clone(), wallet, config),
        }
    }

    /// The screens of the fixture's honest signing flow for `transaction`.
    pub async fn expected_prompts(&self, transaction: &[u8]) -> Vec<Prompt> {
        let digest = verify::hash(transaction);

        vec![
            Prompt::Labeled {
                header: "Transaction hash".to_string(),
                prompt: verify::digest_b64(&digest),
            },
            Prompt::Labeled {
                header: "Sign for Address".to_string(),
                prompt: self.wallet.public_key().await.to_string(),
            },
            Prompt::Screen {
                text: "Sign Transaction?".to_string(),
                x: 19,
                y: 11,
            },
            Prompt::Screen {
                text: "Confirm".to_string(),
                x: 43,
                y: 11,
            },
        ]
    }

    pub async fn scenario(&self, name: &str, transaction: &[u8]) -> Scenario {
        Scenario {
            name: name.to_string(),
            path: "44'/535348'/0'".parse().expect("Valid test path"),
            transaction: hex::encode(transaction),
            prompts: self.expected_prompts(transaction).await,
            mode: Mode::Approve,
            options: BTreeMap::new(),
        }
    }
}

/// The reference transaction of the end-to-end signing flow: the
/// `0123456789abcdef` byte pattern repeated to 416 bytes.
pub fn reference_transaction() -> Vec<u8> {
    let mut transaction = Vec::new();
    for _ in 0..52 {
        transaction.extend_from_slice(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]);
    }
    transaction
}
