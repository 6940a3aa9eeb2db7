//! File name utilities
//!
//! Sanitisation of user-visible names into portable file names, and the
//! case-insensitive natural ordering used everywhere pages are listed from
//! disk or from an archive.

use std::cmp::Ordering;

use crate::constants::files;

/// Build a file name that is valid on FAT and ext filesystems
///
/// Leading and trailing dots and spaces are removed, control characters and
/// `"*/:<>?\|` become `_`, and the result is cut to
/// [`files::MAX_FILENAME_LENGTH`] bytes on a character boundary. A name
/// with nothing left after trimming becomes `(invalid)`.
pub fn sanitize_filename(name: &str) -> String {
    let trimmed = name.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        return files::INVALID_FILENAME.to_string();
    }

    let mut sanitized = String::with_capacity(trimmed.len().min(files::MAX_FILENAME_LENGTH));
    for c in trimmed.chars() {
        let c = if is_valid_filename_char(c) { c } else { '_' };
        if sanitized.len() + c.len_utf8() > files::MAX_FILENAME_LENGTH {
            break;
        }
        sanitized.push(c);
    }
    sanitized
}

fn is_valid_filename_char(c: char) -> bool {
    !matches!(
        c,
        '\u{0}'..='\u{1f}' | '\u{7f}' | '"' | '*' | '/' | ':' | '<' | '>' | '?' | '\\' | '|'
    )
}

/// Compare two names in case-insensitive natural order
///
/// Runs of ASCII digits compare by numeric value, so `2.jpg` sorts before
/// `10.jpg`. Everything else compares by lowercase character. Names that are
/// equal under this ordering fall back to a plain comparison so the result
/// is total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ln = take_digits(&mut left);
                let rn = take_digits(&mut right);
                match compare_digit_runs(&ln, &rn) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.to_lowercase().cmp(r.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Last path component of an archive entry name
pub fn entry_file_name(entry: &str) -> &str {
    entry
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(entry)
}
