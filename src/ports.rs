use crate::error::{ParseError, ParseResult};
use anyhow::Context;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// A deduplicated set of TCP ports, iterated in ascending order.
pub type PortSet = BTreeSet<u16>;

/// Parse a port specification into a set of ports (1..=65535).
///
/// Supported forms, freely mixed with commas:
/// - single port: `80`
/// - inclusive range: `8000-8010`
///
/// Whitespace around items is ignored and duplicates collapse. Any bad item
/// fails the whole spec.
pub fn parse_port_spec(s: &str) -> ParseResult<PortSet> {
    let mut out = PortSet::new();
    add_port_spec(&mut out, s)?;
    if out.is_empty() {
        return Err(ParseError::InvalidPortSpec(format!("no ports in {s:?}")));
    }
    Ok(out)
}

fn add_port_spec(out: &mut PortSet, s: &str) -> ParseResult<()> {
    for item in s.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(ParseError::InvalidPortSpec(format!("empty item in {s:?}")));
        }

        if let Some((a, b)) = item.split_once('-') {
            let start = parse_port_str(a.trim())?;
            let end = parse_port_str(b.trim())?;
            if start > end {
                return Err(ParseError::InvalidPortSpec(format!(
                    "invalid range {start}-{end} (start > end)"
                )));
            }
            out.extend(start..=end);
            continue;
        }

        out.insert(parse_port_str(item)?);
    }
    Ok(())
}

/// Parse a ports file: one spec per line, `#` starts a comment, blank lines
/// are skipped. All lines are merged into one set.
pub fn parse_ports_file_str(s: &str) -> anyhow::Result<PortSet> {
    let mut out = PortSet::new();
    for (idx, raw_line) in s.lines().enumerate() {
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        add_port_spec(&mut out, line).with_context(|| format!("line {}", idx + 1))?;
    }
    if out.is_empty() {
        anyhow::bail!("ports file contains no ports");
    }
    Ok(out)
}

/// Load a ports file from disk.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> anyhow::Result<PortSet> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_file_str(&content)
}

fn parse_port_str(s: &str) -> ParseResult<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPortSpec(format!("not a number: {s:?}")));
    }
    match s.parse::<u32>() {
        Ok(val @ 1..=65535) => Ok(val as u16),
        _ => Err(ParseError::InvalidPortSpec(format!("port out of range: {s}"))),
    }
}
