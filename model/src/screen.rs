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

use serde::{Deserialize, Serialize};

/// One unit of on-screen output, either observed live or declared as part
/// of a scenario's expected sequence.
///
/// `Labeled` is a paginated text screen identified by its header;
/// `Screen` is a literal screen tied to fixed button coordinates, used for
/// the final confirm/reject screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Labeled { header: String, prompt: String },
    Screen { text: String, x: i32, y: i32 },
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::Labeled { header, prompt } => write!(f, "[{}] {:?}", header, prompt),
            Prompt::Screen { text, x, y } => write!(f, "{:?} at ({}, {})", text, x, y),
        }
    }
}

/// A single screen emission as reported by the emulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub text: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

/// Wire shape of the emulator's `GET /events` response.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EventList {
    pub events: Vec<RawEvent>,
}

/// Named physical buttons actuated through the emulator control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Left,
    Right,
    Both,
}

impl Button {
    pub fn name(&self) -> &'static str {
        match self {
            Button::Left => "left",
            Button::Right => "right",
            Button::Both => "both",
        }
    }
}

/// Text layout of the device screen, fixed as explicit configuration: the
/// rows holding the header and body of paginated screens differ between
/// device models and cannot be inferred from the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenLayout {
    pub header_y: i32,
    pub body_y: i32,
    /// Screens dropped entirely (boot screens, idle animations).
    pub ignore: Vec<String>,
}

impl Default for ScreenLayout {
    fn default() -> Self {
        ScreenLayout {
            header_y: 3,
            body_y: 17,
            ignore: vec!["W e l c o m e".to_string()],
        }
    }
}

/// Strips a trailing ` (i/n)` pagination marker from a header line.
fn strip_pagination(text: &str) -> &str {
    let Some(open) = text.rfind(" (") else {
        return text;
    };
    let Some(inner) = text[open + 2..].strip_suffix(')') else {
        return text;
    };

    let mut parts = inner.splitn(2, '/');
    match (parts.next(), parts.next()) {
        (Some(page), Some(total))
            if !page.is_empty()
                && !total.is_empty()
                && page.bytes().all(|b| b.is_ascii_digit())
                && total.bytes().all(|b| b.is_ascii_digit()) =>
        {
            &text[..open]
        }
        _ => text,
    }
}

fn push_dedup(closed: &mut Vec<Prompt>, screen: Prompt) {
    // Devices re-emit the current screen after a button press; collapsing
    // consecutive duplicates keeps the matcher in step.
    if closed.last() != Some(&screen) {
        closed.push(screen);
    }
}

/// Folds a raw event log into the sequence of screens the user saw.
///
/// Events on the header row open a labeled screen; further pages of the
/// same header (pagination markers stripped) keep accumulating body text.
/// Any event outside the header/body rows closes the open screen and
/// passes through verbatim as a positional screen. A trailing labeled
/// screen that nothing closed yet is withheld: it may still be paginating.
pub fn collate(events: &[RawEvent], layout: &ScreenLayout) -> Vec<Prompt> {
    let mut closed = Vec::new();
    let mut open: Option<(String, String)> = None;

    for event in events {
        if layout.ignore.iter().any(|ignored| ignored == &event.text) {
            continue;
        }

        if event.y == layout.header_y {
            let header = strip_pagination(&event.text);
            match &open {
                Some((current, _)) if current == header => {}
                _ => {
                    if let Some((header, prompt)) = open.take() {
                        push_dedup(&mut closed, Prompt::Labeled { header, prompt });
                    }
                    open = Some((header.to_string(), String::new()));
                }
            }
        } else if event.y == layout.body_y {
            match &mut open {
                Some((_, prompt)) => prompt.push_str(&event.text),
                None => open = Some((String::new(), event.text.clone())),
            }
        } else {
            if let Some((header, prompt)) = open.take() {
                push_dedup(&mut closed, Prompt::Labeled { header, prompt });
            }
            push_dedup(
                &mut closed,
                Prompt::Screen {
                    text: event.text.clone(),
                    x: event.x,
                    y: event.y,
                },
            );
        }
    }

    closed
}
