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
use std::path::Path;

use serde::{Deserialize, Serialize};

use model::{Button, DerivationPath, Prompt};

/// Required outcome of a scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Walk the approval flow to the end and require a valid signature.
    #[default]
    Approve,
    /// Walk the flow, reject at the end, and require the device to refuse.
    ExpectFail,
}

/// One conformance case: a signing command, the screens it must produce,
/// and the required outcome. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub path: DerivationPath,
    /// Hex encoded transaction bytes.
    pub transaction: String,
    /// Expected screens, in order, with no gaps and nothing extra.
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub mode: Mode,
    /// Device options that must hold before the command is issued.
    #[serde(default)]
    pub options: BTreeMap<String, bool>,
}

impl Scenario {
    pub fn transaction_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.transaction)
    }

    pub async fn load(path: &Path) -> Result<Self, crate::Error> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Collects the `*.json` scenario files of a directory, sorted by file
/// name.
pub async fn load_dir(dir: &Path) -> Result<Vec<Scenario>, crate::Error> {
    if !dir.is_dir() {
        return Err("Invalid scenarios dir".into());
    }

    let mut files = Vec::new();
    let mut stream = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = stream.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    let mut scenarios = Vec::new();
    for file in &files {
        scenarios.push(Scenario::load(file).await?);
    }

    Ok(scenarios)
}

/// Button recipe toggling one named device option through its settings
/// screens. The harness tracks each option's value per session (devices
/// boot with everything off) and replays the recipe only on an actual
/// change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionRecipe {
    pub name: String,
    /// Presses that reach the option's settings screen from idle.
    pub enter: Vec<Button>,
    /// Presses that flip the value once there.
    pub toggle: Vec<Button>,
    /// Presses that return to the idle screen.
    pub leave: Vec<Button>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    const SIGN_SCENARIO: &str = r#"{
        "name": "sign_transaction",
        "path": "44'/535348'/0'",
        "transaction": "01234567",
        "prompts": [
            {"header": "Transaction hash", "prompt": "abcd"},
            {"text": "Confirm", "x": 43, "y": 11}
        ]
    }"#;

    #[test]
    fn test_scenario_from_json() {
        let scenario: Scenario = serde_json::from_str(SIGN_SCENARIO).unwrap();

        assert_eq!(scenario.name, "sign_transaction");
        assert_eq!(scenario.path.to_string(), "44'/535348'/0'");
        assert_eq!(scenario.transaction_bytes().unwrap(), vec![0x01, 0x23, 0x45, 0x67]);
        assert_eq!(scenario.prompts.len(), 2);
        assert_eq!(scenario.mode, Mode::Approve);
        assert!(scenario.options.is_empty());

        assert!(matches!(
            scenario.prompts[0],
            Prompt::Labeled { ref header, .. } if header == "Transaction hash"
        ));
        assert!(matches!(
            scenario.prompts[1],
            Prompt::Screen { ref text, x: 43, y: 11 } if text == "Confirm"
        ));
    }

    #[test]
    fn test_scenario_expect_fail_mode() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "name": "refuse",
                "path": "44'/1'/0'/0/0",
                "transaction": "ff",
                "prompts": [],
                "mode": "expect-fail",
                "options": {"blind_signing": true}
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.mode, Mode::ExpectFail);
        assert_eq!(scenario.options.get("blind_signing"), Some(&true));
    }

    #[test]
    fn test_invalid_transaction_hex() {
        let scenario: Scenario = serde_json::from_str(
            r#"{"name": "bad", "path": "0", "transaction": "xyz", "prompts": []}"#,
        )
        .unwrap();
        assert!(scenario.transaction_bytes().is_err());
    }

    #[tokio::test]
    async fn test_load_dir_sorted() {
        let dir = tempdir::TempDir::new("scenarios").unwrap();

        for (file, name) in [("20_b.json", "b"), ("10_a.json", "a")] {
            let mut f = std::fs::File::create(dir.path().join(file)).unwrap();
            write!(
                f,
                r#"{{"name": "{}", "path": "0", "transaction": "", "prompts": []}}"#,
                name
            )
            .unwrap();
        }
        std::fs::File::create(dir.path().join("notes.txt")).unwrap();

        let scenarios = load_dir(dir.path()).await.unwrap();
        assert_eq!(
            scenarios.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        assert!(load_dir(&dir.path().join("missing")).await.is_err());
    }
}
