//! Email text helpers: sender parsing, quote and HTML stripping.

use serde::{Deserialize, Serialize};

/// A parsed From header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderAddress {
    pub name: Option<String>,
    pub address: String,
}

/// Split `"Jane Doe <jane@example.com>"` into name and bare address.
///
/// A header without angle brackets is taken as the address itself.
/// Returns `None` when no address can be found.
pub fn parse_sender(header: &str) -> Option<SenderAddress> {
    let header = header.trim();
    if let (Some(open), Some(close)) = (header.find('<'), header.rfind('>'))
        && open < close
    {
        let address = header[open + 1..close].trim();
        if address.is_empty() {
            return None;
        }
        let name = header[..open].trim().trim_matches('"').trim();
        return Some(SenderAddress {
            name: (!name.is_empty()).then(|| name.to_string()),
            address: address.to_string(),
        });
    }

    (!header.is_empty() && header.contains('@')).then(|| SenderAddress {
        name: None,
        address: header.to_string(),
    })
}

/// Strip quoted history from a reply.
///
/// Drops `>` lines and everything after an `On ... wrote:` attribution or
/// an "Original Message" separator.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }

        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

/// Reduce HTML to readable text. Block-level tags become line breaks and
/// the common entities are decoded.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                if matches!(name.as_str(), "br" | "p" | "div" | "li" | "tr") {
                    text.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => text.push(ch),
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
