//! Renaming recorded event keys into the fixture naming convention.

use crate::Document;

/// Rewrite every top-level key of `raw` into lowerCamelCase.
///
/// Nested values are copied untouched. If two keys collapse onto the same
/// camelCase name, the later one wins.
pub fn normalize(raw: &Document) -> Document {
    raw.iter()
        .map(|(key, value)| (camel_case(key), value.clone()))
        .collect()
}

/// Convert any key into lowerCamelCase.
///
/// Words are split on non-alphanumeric characters, on lower-to-upper case
/// transitions (`commandName`), before the last capital of an acronym run
/// (`XMLHttp` -> `XML`, `Http`) and between letters and digits. The first
/// word is lowercased and the rest capitalized. Input without any
/// alphanumeric character yields an empty string.
pub fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (idx, word) in words(key).into_iter().enumerate() {
        let lower = word.to_lowercase();
        if idx == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

fn words(key: &str) -> Vec<String> {
    let chars: Vec<char> = key.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some(prev) = current.chars().last() {
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_uppercase()
                    && c.is_uppercase()
                    && next.is_some_and(|n| n.is_lowercase()))
                || (prev.is_numeric() != c.is_numeric());
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
