// src/source/html.rs
//! Minimal tag-level HTML helpers for pulling text out of air-quality pages.
//!
//! Not a parser: it finds opening tags, reads their attributes, and walks to
//! the matching close tag of the same name. That is enough for the handful
//! of class and attribute selectors the live extractor uses.

/// An opening tag as it appears in the document.
#[derive(Debug, Clone, Copy)]
pub struct OpenTag<'a> {
    pub name: &'a str,
    raw: &'a str,
}

impl<'a> OpenTag<'a> {
    /// Value of attribute `name`, quoted with `"` or `'`.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        let bytes = self.raw.as_bytes();
        let mut from = 0;
        while let Some(rel) = find_ci(&self.raw[from..], name) {
            let at = from + rel;
            let before_ok = at > 0 && bytes[at - 1].is_ascii_whitespace();
            let rest = self.raw[at + name.len()..].trim_start();
            if before_ok {
                if let Some(rest) = rest.strip_prefix('=') {
                    let rest = rest.trim_start();
                    let quote = rest.chars().next()?;
                    if quote == '"' || quote == '\'' {
                        let body = &rest[1..];
                        let end = body.find(quote)?;
                        return Some(&body[..end]);
                    }
                    let end = rest
                        .find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
                        .unwrap_or(rest.len());
                    return Some(&rest[..end]);
                }
            }
            from = at + name.len();
        }
        None
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|v| v.split_ascii_whitespace().any(|c| c.eq_ignore_ascii_case(class)))
    }

    pub fn attr_is(&self, name: &str, value: &str) -> bool {
        self.attr(name).is_some_and(|v| v.eq_ignore_ascii_case(value))
    }
}

/// Text content of every element whose opening tag satisfies `pred`, in
/// document order. Nested matches are returned as well.
pub fn select_text<F>(html: &str, pred: F) -> Vec<String>
where
    F: Fn(&OpenTag<'_>) -> bool,
{
    let lower = html.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut pos = 0;

    while let Some(rel) = html[pos..].find('<') {
        let start = pos + rel;
        let Some(tag) = parse_open_tag(html, start) else {
            pos = start + 1;
            continue;
        };
        let (open, open_end) = tag;

        if pred(&open) {
            let inner = if open.raw.ends_with('/') {
                ""
            } else {
                let close = find_matching_close(&lower, open.name, open_end);
                &html[open_end..close]
            };
            out.push(strip_tags(inner));
        }
        pos = open_end;
    }

    out
}

/// Parses the opening tag starting at `start` (which must point at `<`).
/// Returns the tag and the byte offset just past its `>`.
fn parse_open_tag(html: &str, start: usize) -> Option<(OpenTag<'_>, usize)> {
    let after = &html[start + 1..];
    let name_len = after
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '-')
        .unwrap_or(after.len());
    if name_len == 0 || !after.as_bytes()[0].is_ascii_alphabetic() {
        return None;
    }
    let gt = after.find('>')?;
    let name = &after[..name_len];
    let raw = after[..gt].trim_end();
    Some((OpenTag { name, raw }, start + 1 + gt + 1))
}

/// Offset of the `</name>` closing the element whose content starts at
/// `from`, accounting for nested elements of the same name. Falls back to
/// the end of the document. `lc` is the whole document lowercased; ASCII
/// lowercasing keeps every byte offset valid for the original.
fn find_matching_close(lc: &str, name: &str, from: usize) -> usize {
    let name = name.to_ascii_lowercase();
    let open_pat = format!("<{}", name);
    let close_pat = format!("</{}", name);
    let mut depth = 0usize;
    let mut pos = from;

    loop {
        let next_open = find_tag_boundary(lc, &open_pat, pos);
        let Some(next_close) = find_tag_boundary(lc, &close_pat, pos) else {
            return lc.len();
        };
        match next_open {
            Some(o) if o < next_close => {
                depth += 1;
                pos = o + open_pat.len();
            }
            _ => {
                if depth == 0 {
                    return next_close;
                }
                depth -= 1;
                pos = next_close + close_pat.len();
            }
        }
    }
}

/// Finds `pat` at or after `from` where the following byte ends the tag name.
fn find_tag_boundary(lc: &str, pat: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(rel) = lc.get(pos..)?.find(pat) {
        let at = pos + rel;
        let next = lc.as_bytes().get(at + pat.len()).copied();
        if next.is_none_or(|b| !b.is_ascii_alphanumeric() && b != b'-') {
            return Some(at);
        }
        pos = at + pat.len();
    }
    None
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(&needle.to_ascii_lowercase())
}

/// Removes tags, decodes the common entities and collapses whitespace.
pub fn strip_tags<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();

    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&#8322;", "₂")
        .replace("&#8323;", "₃")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Leading integer of `text` after trimming, like `parseInt`.
pub fn leading_integer(text: &str) -> Option<u32> {
    let t = text.trim_start();
    let digits: String = t.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// First decimal number in `text` (`12`, `12.5`, `12,5`).
pub fn first_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|b| b.is_ascii_digit())?;
    let mut end = start;
    let mut seen_sep = false;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_digit() {
            end += 1;
        } else if (b == b'.' || b == b',')
            && !seen_sep
            && bytes.get(end + 1).is_some_and(|n| n.is_ascii_digit())
        {
            seen_sep = true;
            end += 1;
        } else {
            break;
        }
    }
    text[start..end].replace(',', ".").parse().ok()
}
