//! Update instructions document.
//!
//! A package may ship an `upstage.xml` describing the shortcuts it wants:
//!
//! ```xml
//! <Instructions>
//!   <Shortcuts>
//!     <Shortcut>
//!       <Title>Ledger</Title>
//!       <TargetPath>Ledger.exe</TargetPath>
//!       <Arguments>--restore</Arguments>
//!       <IconPath>ledger.ico</IconPath>
//!       <IconIndex>0</IconIndex>
//!     </Shortcut>
//!   </Shortcuts>
//! </Instructions>
//! ```
//!
//! `Shortcut` elements are collected at any depth. Loading never fails: a
//! missing or malformed document is logged and reported as `None`.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::UpdateError;

/// File name of the instructions document, in the app directory and under
/// `content/` in a package.
pub const INSTRUCTIONS_FILE_NAME: &str = "upstage.xml";

/// One desired shell shortcut.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShortcutSpec {
    pub title: String,
    pub description: Option<String>,
    /// Target, relative to the application directory
    pub target_path: String,
    pub arguments: Option<String>,
    pub icon_path: Option<String>,
    pub icon_index: i32,
}

impl ShortcutSpec {
    pub fn new(title: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            target_path: target_path.into(),
            ..Self::default()
        }
    }
}

/// Parsed instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateInstructions {
    pub shortcuts: Vec<ShortcutSpec>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Description,
    TargetPath,
    Arguments,
    IconPath,
    IconIndex,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Title" => Some(Self::Title),
            b"Description" => Some(Self::Description),
            b"TargetPath" => Some(Self::TargetPath),
            b"Arguments" => Some(Self::Arguments),
            b"IconPath" => Some(Self::IconPath),
            b"IconIndex" => Some(Self::IconIndex),
            _ => None,
        }
    }
}

fn optional(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

impl UpdateInstructions {
    /// Load the document at `path`; `None` if it is absent or malformed.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No update instructions at {}", path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read update instructions {}: {}", path.display(), e);
                return None;
            }
        };
        match Self::parse(&content) {
            Ok(instructions) => Some(instructions),
            Err(e) => {
                warn!("Ignoring malformed update instructions {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Parse an instructions document.
    pub fn parse(xml: &str) -> Result<Self, UpdateError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut shortcuts = Vec::new();
        let mut current: Option<ShortcutSpec> = None;
        let mut field: Option<Field> = None;
        let mut text = String::new();
        let mut depth = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    depth += 1;
                    let name = e.local_name();
                    if name.as_ref() == b"Shortcut" {
                        if current.is_none() {
                            current = Some(ShortcutSpec::default());
                        }
                    } else if current.is_some() && field.is_none() {
                        field = Field::from_name(name.as_ref());
                        text.clear();
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    if e.local_name().as_ref() == b"Shortcut" && current.is_none() {
                        shortcuts.push(ShortcutSpec::default());
                    }
                }
                Ok(Event::Text(ref e)) => {
                    if field.is_some() {
                        let unescaped = e
                            .unescape()
                            .map_err(|e| UpdateError::PackageFormat(e.to_string()))?;
                        text.push_str(&unescaped);
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if field.is_some() {
                        text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Ok(Event::End(ref e)) => {
                    depth = depth.saturating_sub(1);
                    let name = e.local_name();
                    if let (Some(f), Some(spec)) = (field, current.as_mut()) {
                        if Field::from_name(name.as_ref()).is_some() {
                            apply_field(spec, f, std::mem::take(&mut text));
                            field = None;
                            continue;
                        }
                    }
                    if name.as_ref() == b"Shortcut" {
                        if let Some(spec) = current.take() {
                            shortcuts.push(spec);
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(UpdateError::PackageFormat(format!(
                        "at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
            }
        }

        if depth != 0 {
            return Err(UpdateError::PackageFormat("unexpected end of document".to_string()));
        }
        Ok(Self { shortcuts })
    }

    pub fn has_shortcuts(&self) -> bool {
        !self.shortcuts.is_empty()
    }
}

fn apply_field(spec: &mut ShortcutSpec, field: Field, text: String) {
    match field {
        Field::Title => spec.title = text,
        Field::Description => spec.description = optional(text),
        Field::TargetPath => spec.target_path = text,
        Field::Arguments => spec.arguments = optional(text),
        Field::IconPath => spec.icon_path = optional(text),
        Field::IconIndex => {
            spec.icon_index = match text.trim().parse() {
                Ok(index) => index,
                Err(_) => {
                    if !text.trim().is_empty() {
                        warn!("Invalid IconIndex {:?}, using 0", text);
                    }
                    0
                }
            }
        }
    }
}
