//! Rendering of a [`ScanResult`] to JSON and HTML files.

use crate::error::ReportError;
use crate::types::{HostReport, ScanResult};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Write the report as 2-space indented JSON (array of hosts).
pub fn write_json(path: &Path, result: &ScanResult) -> Result<(), ReportError> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, result)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Write the report as a standalone HTML page, one table per host.
pub fn write_html(path: &Path, result: &ScanResult) -> Result<(), ReportError> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(render_html(result).as_bytes())?;
    out.flush()?;
    Ok(())
}

const STYLE: &str = "\
body { font-family: Arial, sans-serif; background: #f2f2f2; padding: 20px; }
table { width: 100%; border-collapse: collapse; margin-top: 12px; }
th, td { border: 1px solid #ccc; padding: 6px 8px; text-align: left; }
th { background: #555; color: white; }
tr:nth-child(even) { background: #eee; }
.open { color: green; font-weight: bold; }
.closed { color: #a00; }
";

pub fn render_html(result: &ScanResult) -> String {
    let generated = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("unknown"));

    let mut html = String::with_capacity(1024 + result.len() * 512);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>netrecon report</title>\n<style>\n");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n<h1>netrecon report</h1>\n");
    let _ = writeln!(html, "<p>Generated: {generated}</p>");
    for host in result {
        render_host(&mut html, host);
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn render_host(html: &mut String, host: &HostReport) {
    let _ = writeln!(html, "<h2>Host: {}</h2>", escape(&host.ip));
    html.push_str("<table>\n<tr><th>Port</th><th>State</th><th>Banner</th><th>TLS version</th><th>TLS cipher</th></tr>\n");
    for p in &host.ports {
        let (class, label) = if p.open {
            ("open", "open")
        } else {
            ("closed", "closed")
        };
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td class=\"{class}\">{label}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            p.port,
            escape(p.banner.as_deref().unwrap_or("")),
            escape(p.tls_version.as_deref().unwrap_or("")),
            escape(p.tls_cipher.as_deref().unwrap_or("")),
        );
    }
    html.push_str("</table>\n");
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
