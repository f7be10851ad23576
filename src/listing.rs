//! Plain HTML directory listing of unclaimed entries.
//!
//! The input comes from [`PoolStore::list`](crate::storage::pool_store::PoolStore::list),
//! which has already hidden claimed entries and the marker directory.

use std::fmt::Write as FmtWrite;

use crate::storage::logical_path::{encode_segment, LogicalPath};
use crate::storage::pool_store::Entry;

/// Render `entries` of `dir` as a `<pre>` list of relative links.
pub fn render(dir: &LogicalPath, entries: &[Entry]) -> String {
    let title = escape_html(&dir.to_string());
    let mut html = String::with_capacity(256 + entries.len() * 64);
    writeln!(html, "<!doctype html>").unwrap();
    writeln!(html, "<meta name=\"viewport\" content=\"width=device-width\">").unwrap();
    writeln!(html, "<title>{title}</title>").unwrap();
    writeln!(html, "<h1>{title}</h1>").unwrap();
    writeln!(html, "<pre>").unwrap();
    if !dir.is_root() {
        writeln!(html, "<a href=\"../\">../</a>").unwrap();
    }
    for entry in entries {
        let slash = if entry.is_dir { "/" } else { "" };
        writeln!(
            html,
            "<a href=\"{}{slash}\">{}{slash}</a>",
            escape_html(&encode_segment(&entry.name)),
            escape_html(&entry.name),
        )
        .unwrap();
    }
    writeln!(html, "</pre>").unwrap();
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
