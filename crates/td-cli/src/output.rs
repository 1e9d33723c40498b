//! Human and JSON rendering shared by every subcommand.

use serde::Serialize;
use std::io::{self, Write};

/// Shared width for separators in human output.
pub const RULE_WIDTH: usize = 60;

pub fn rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = RULE_WIDTH)
}

pub fn section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    rule(w)
}

/// Left-aligned key/value line.
pub fn kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<16} {}", format!("{key}:"), value.as_ref())
}

/// Print `value` as pretty JSON when `json` is set, otherwise hand stdout to
/// `human`.
pub fn render<T: Serialize>(
    json: bool,
    value: &T,
    human: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
    } else {
        human(value, &mut out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_pads_the_key() {
        let mut buf = Vec::new();
        kv(&mut buf, "schema", "14").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "schema:          14\n");
    }

    #[test]
    fn section_is_followed_by_a_rule() {
        let mut buf = Vec::new();
        section(&mut buf, "Stats").unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Stats"));
        assert_eq!(lines.next().map(str::len), Some(RULE_WIDTH));
    }
}
