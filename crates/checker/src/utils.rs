// SPDX-FileCopyrightText: 2026 Aaron Dewes
//
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Splits a command line into words, the way a shell would for simple cases.
///
/// Words are separated by whitespace unless quoted with `"` or `'`. Quotes are
/// removed from the output; a backslash escapes the next character.
///
/// # Examples
///
/// `python3 -X "utf8=1"` becomes `["python3", "-X", "utf8=1"]`.
pub fn split_command_line(input: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    // Tracks `""` so an explicitly empty word is kept
    let mut has_word = false;
    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match (c, quote) {
            ('\\', _) => {
                escaped = true;
                has_word = true;
            }
            ('"' | '\'', None) => {
                quote = Some(c);
                has_word = true;
            }
            (c, Some(q)) if c == q => quote = None,
            (c, None) if c.is_whitespace() => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            (c, _) => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if has_word {
        words.push(current);
    }
    words
}

/// Fills `{{PORT}}`, `{{IP}}` and `{{HOST}}` in a connection string template.
pub fn substitute_placeholders(template: &str, host: &str, port: Option<u16>) -> String {
    let with_host = template.replace("{{IP}}", host).replace("{{HOST}}", host);
    match port {
        Some(port) => with_host.replace("{{PORT}}", &port.to_string()),
        None => with_host,
    }
}

/// Address to connect to for a service bound to `interface`.
pub fn connect_host(interface: &str) -> &str {
    match interface {
        "0.0.0.0" | "::" | "[::]" | "" => "127.0.0.1",
        other => other,
    }
}
