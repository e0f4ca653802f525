//! freedesktop.org desktop entries.

use std::path::Path;

use super::{ShellLink, ShortcutWriter};
use crate::error::UpdateError;

/// Writes `.desktop` launcher files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopEntryWriter;

impl DesktopEntryWriter {
    /// Render the desktop entry for `link` titled `name`.
    pub fn render(name: &str, link: &ShellLink) -> String {
        let mut exec = quote_exec_arg(&link.target.to_string_lossy());
        if let Some(arguments) = link.arguments.as_deref().filter(|a| !a.is_empty()) {
            exec.push(' ');
            exec.push_str(arguments);
        }

        let mut entry = String::from("[Desktop Entry]\nType=Application\n");
        entry.push_str(&format!("Name={}\n", escape_value(name)));
        if let Some(description) = link.description.as_deref() {
            entry.push_str(&format!("Comment={}\n", escape_value(description)));
        }
        entry.push_str(&format!("Exec={}\n", escape_value(&exec)));
        if let Some(icon) = &link.icon_path {
            entry.push_str(&format!("Icon={}\n", escape_value(&icon.to_string_lossy())));
        }
        if let Some(dir) = &link.working_directory {
            entry.push_str(&format!("Path={}\n", escape_value(&dir.to_string_lossy())));
        }
        entry
    }
}

impl ShortcutWriter for DesktopEntryWriter {
    fn link_extension(&self) -> &str {
        "desktop"
    }

    fn write(&self, link_path: &Path, link: &ShellLink) -> Result<(), UpdateError> {
        let name = link_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        std::fs::write(link_path, Self::render(&name, link)).map_err(|e| {
            UpdateError::ShortcutCreationFailure(format!("failed to write {}: {}", link_path.display(), e))
        })
    }
}

/// Quote one `Exec` argument.
fn quote_exec_arg(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Escape a value for the key file format.
fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}
