//! Reference extraction from formula strings.
//!
//! Scans formula text for every cell reference it reads (e.g., `A1`, `B2:C5`,
//! `B:B`, `Sheet2!A1`). The result is the formula's declared dependency list,
//! which feeds the dependency index and cycle detection.
//!
//! Handles:
//! - Simple cell references: `A1`, `$B$2`
//! - Rectangles and whole columns: `A1:B5`, `C:C`
//! - Sheet qualifiers: `Sheet2!A1`, `'My Sheet'!A1:B2`
//! - Ignores references inside string literals
//! - Ignores identifiers immediately followed by `(` (function calls like `LOG10(`)

use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::OnceLock;

use super::cell_ref::{CellRef, RangeRef, letters_to_col};

/// A reference found in formula text, with its byte span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceMatch {
    pub span: Range<usize>,
    pub reference: RangeRef,
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?:(?<sheet>'(?:[^']|'')+'|[A-Za-z_][A-Za-z0-9_.]*)!)?
            (?:
                \$?(?<c1>[A-Za-z]{1,3})\$?(?<r1>[0-9]+)
                (?::\$?(?<c2>[A-Za-z]{1,3})\$?(?<r2>[0-9]+))?
              |
                \$?(?<cc1>[A-Za-z]{1,3}):\$?(?<cc2>[A-Za-z]{1,3})\b
            )",
        )
        .expect("reference regex must compile")
    })
}

/// Extract all references from a formula as dependencies.
///
/// References are returned in order of appearance; duplicates are kept.
pub fn extract_dependencies(script: &str) -> Vec<RangeRef> {
    scan_references(script)
        .into_iter()
        .map(|m| m.reference)
        .collect()
}

/// Find every reference in `script` together with the byte span it occupies.
pub fn scan_references(script: &str) -> Vec<ReferenceMatch> {
    // Ignore references inside string literals.
    let masked = strip_string_literals(script);
    let bytes = masked.as_bytes();

    let mut found = Vec::new();
    for caps in reference_re().captures_iter(&masked) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let (start, end) = (whole.start(), whole.end());

        if start > 0 && is_ident_byte(bytes[start - 1]) {
            continue;
        }
        if let Some(&next) = bytes.get(end)
            && (is_ident_byte(next) || next == b'(' || next == b'!')
        {
            continue;
        }

        if let Some(reference) = reference_from_captures(&caps) {
            found.push(ReferenceMatch {
                span: start..end,
                reference,
            });
        }
    }
    found
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'.' || b == b'\''
}

fn reference_from_captures(caps: &Captures<'_>) -> Option<RangeRef> {
    let sheet = caps.name("sheet").map(|m| unquote_sheet(m.as_str()));

    if let (Some(c1), Some(r1)) = (caps.name("c1"), caps.name("r1")) {
        let first = CellRef::from_str(&format!("{}{}", c1.as_str(), r1.as_str()))?;
        return match (caps.name("c2"), caps.name("r2")) {
            (Some(c2), Some(r2)) => {
                let second = CellRef::from_str(&format!("{}{}", c2.as_str(), r2.as_str()))?;
                Some(RangeRef::range(sheet, first, second))
            }
            _ => Some(RangeRef::cell(sheet, first)),
        };
    }

    let a = letters_to_col(caps.name("cc1")?.as_str())?;
    let b = letters_to_col(caps.name("cc2")?.as_str())?;
    Some(RangeRef::columns(sheet, a, b))
}

fn unquote_sheet(raw: &str) -> String {
    match raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => raw.to_string(),
    }
}

/// Replace the contents of string literals with spaces, keeping byte offsets intact.
pub(crate) fn strip_string_literals(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in script.chars() {
        if in_string {
            if escaped {
                escaped = false;
                push_blank(&mut out, ch);
                continue;
            }
            if ch == '\\' {
                escaped = true;
                out.push(' ');
                continue;
            }
            if ch == '"' {
                in_string = false;
                out.push('"');
            } else {
                push_blank(&mut out, ch);
            }
        } else if ch == '"' {
            in_string = true;
            out.push('"');
        } else {
            out.push(ch);
        }
    }

    out
}

fn push_blank(out: &mut String, ch: char) {
    for _ in 0..ch.len_utf8() {
        out.push(' ');
    }
}
