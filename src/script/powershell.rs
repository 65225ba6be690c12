// ABOUTME: PowerShell literal quoting and -EncodedCommand packing
// ABOUTME: Keeps interpolated paths from terminating the surrounding string

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Code points PowerShell accepts as a single-quote delimiter.
const SINGLE_QUOTES: [char; 5] = ['\'', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

/// Wraps `value` in a single-quoted literal.
///
/// Inside single quotes PowerShell performs no expansion, and a quote is
/// escaped by doubling it. Every quote-like code point is doubled, since
/// the parser ends the string on any of them.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if SINGLE_QUOTES.contains(&c) {
            out.push(c);
        }
        out.push(c);
    }
    out.push('\'');
    out
}

pub fn bool_literal(value: bool) -> &'static str {
    if value {
        "$true"
    } else {
        "$false"
    }
}

/// Base64 of the UTF-16LE script, the form `-EncodedCommand` expects.
pub fn encode_command(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    STANDARD.encode(bytes)
}
