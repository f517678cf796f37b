/*
 * string.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Provenance-tagged strings.
//!
//! A [`JinjaString`] remembers which pieces of its text came from caller
//! input (conversation content) and which came from the template itself.
//! Consumers use this to avoid interpreting special tokens that a user typed.
//!
//! Transformations keep the flags as follows:
//! - one-to-one (upper, lower, title): each part keeps its flag
//! - one-to-many (split, slice, strip): produced pieces keep the flags of
//!   the parts they overlap
//! - many-to-one (concat, join): parts are appended, so the result is input
//!   exactly when every contributing part was

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

/// A run of text with a single provenance flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringPart {
    pub is_input: bool,
    pub text: String,
}

/// A string made of provenance-tagged parts.
#[derive(Debug, Clone, Default)]
pub struct JinjaString {
    parts: Vec<StringPart>,
}

impl JinjaString {
    /// A string that originates from the template.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            parts: vec![StringPart {
                is_input: false,
                text: text.into(),
            }],
        }
    }

    /// A string that originates from caller input.
    pub fn input(text: impl Into<String>) -> Self {
        Self {
            parts: vec![StringPart {
                is_input: true,
                text: text.into(),
            }],
        }
    }

    pub fn from_parts(parts: Vec<StringPart>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[StringPart] {
        &self.parts
    }

    pub fn into_parts(self) -> Vec<StringPart> {
        self.parts
    }

    /// The logical text. Borrows when there is a single part.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self.parts.as_slice() {
            [] => Cow::Borrowed(""),
            [only] => Cow::Borrowed(&only.text),
            parts => Cow::Owned(parts.iter().map(|p| p.text.as_str()).collect()),
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.parts.iter().map(|p| p.text.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| p.text.is_empty())
    }

    /// Length in characters.
    pub fn char_count(&self) -> usize {
        self.parts.iter().map(|p| p.text.chars().count()).sum()
    }

    /// True when there is at least one part and every part came from
    /// caller input.
    pub fn is_input(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(|p| p.is_input)
    }

    pub fn mark_input(&mut self) {
        for part in &mut self.parts {
            part.is_input = true;
        }
    }

    /// Append `other`'s parts, keeping their flags.
    pub fn append(&mut self, other: &JinjaString) {
        self.parts
            .extend(other.parts.iter().filter(|p| !p.text.is_empty()).cloned());
    }

    pub fn push_template(&mut self, text: &str) {
        if !text.is_empty() {
            self.parts.push(StringPart {
                is_input: false,
                text: text.to_string(),
            });
        }
    }

    pub fn concat(&self, other: &JinjaString) -> JinjaString {
        let mut out = self.clone();
        out.append(other);
        out
    }

    fn map_parts(&self, mut f: impl FnMut(&str) -> String) -> JinjaString {
        JinjaString {
            parts: self
                .parts
                .iter()
                .map(|p| StringPart {
                    is_input: p.is_input,
                    text: f(&p.text),
                })
                .collect(),
        }
    }

    pub fn to_uppercase(&self) -> JinjaString {
        self.map_parts(|s| s.to_uppercase())
    }

    pub fn to_lowercase(&self) -> JinjaString {
        self.map_parts(|s| s.to_lowercase())
    }

    /// Uppercase the first letter of every whitespace-separated word and
    /// lowercase the rest. Word boundaries carry across part boundaries.
    pub fn title(&self) -> JinjaString {
        let mut capitalize_next = true;
        self.map_parts(|s| {
            let mut out = String::with_capacity(s.len());
            for c in s.chars() {
                if c.is_whitespace() {
                    capitalize_next = true;
                    out.push(c);
                } else if capitalize_next {
                    out.extend(c.to_uppercase());
                    capitalize_next = false;
                } else {
                    out.extend(c.to_lowercase());
                }
            }
            out
        })
    }

    /// Uppercase the first character of the string and lowercase the rest.
    pub fn capitalize(&self) -> JinjaString {
        let mut first = true;
        self.map_parts(|s| {
            let mut out = String::with_capacity(s.len());
            for c in s.chars() {
                if first {
                    out.extend(c.to_uppercase());
                    first = false;
                } else {
                    out.extend(c.to_lowercase());
                }
            }
            out
        })
    }

    /// The substring covering byte range `range` of the logical text.
    ///
    /// Range bounds must fall on character boundaries.
    pub fn substring(&self, range: Range<usize>) -> JinjaString {
        let mut parts = Vec::new();
        let mut base = 0;
        for part in &self.parts {
            let part_range = base..base + part.text.len();
            base = part_range.end;
            let start = range.start.max(part_range.start);
            let end = range.end.min(part_range.end);
            if start >= end {
                continue;
            }
            let local = (start - part_range.start)..(end - part_range.start);
            if let Some(text) = part.text.get(local) {
                parts.push(StringPart {
                    is_input: part.is_input,
                    text: text.to_string(),
                });
            }
        }
        if parts.is_empty() {
            // keep provenance of an empty slice of an input string
            return JinjaString {
                parts: vec![StringPart {
                    is_input: self.is_input(),
                    text: String::new(),
                }],
            };
        }
        JinjaString { parts }
    }

    /// Remove leading and/or trailing whitespace, or the characters in
    /// `chars` when given.
    pub fn strip(&self, left: bool, right: bool, chars: Option<&str>) -> JinjaString {
        let text = self.as_str();
        let matches = |c: char| match chars {
            Some(set) => set.contains(c),
            None => c.is_whitespace(),
        };
        let mut start = 0;
        let mut end = text.len();
        if left {
            start = text
                .char_indices()
                .find(|(_, c)| !matches(*c))
                .map(|(i, _)| i)
                .unwrap_or(text.len());
        }
        if right {
            end = text[start..]
                .char_indices()
                .rev()
                .find(|(_, c)| !matches(*c))
                .map(|(i, c)| start + i + c.len_utf8())
                .unwrap_or(start);
        }
        self.substring(start..end)
    }

    /// Split on `sep`, or on runs of whitespace when `sep` is `None`
    /// (Python semantics), making at most `max_split` splits.
    pub fn split(&self, sep: Option<&str>, max_split: Option<usize>) -> Vec<JinjaString> {
        let text = self.as_str();
        let ranges = match sep {
            Some(sep) => split_ranges(&text, sep, max_split),
            None => whitespace_ranges(&text, max_split),
        };
        ranges.into_iter().map(|r| self.substring(r)).collect()
    }

    /// Like [`JinjaString::split`] but counting splits from the right.
    pub fn rsplit(&self, sep: Option<&str>, max_split: Option<usize>) -> Vec<JinjaString> {
        let text = self.as_str();
        let ranges = match (sep, max_split) {
            (_, None) => return self.split(sep, None),
            (Some(sep), Some(max)) => rsplit_ranges(&text, sep, max),
            (None, Some(max)) => {
                let mut all = whitespace_ranges(&text, None);
                if all.len() > max + 1 {
                    let keep = all.split_off(all.len() - max);
                    let first_end = all.last().map(|r| r.end).unwrap_or(0);
                    let first_start = all.first().map(|r| r.start).unwrap_or(0);
                    let mut out = vec![first_start..first_end];
                    out.extend(keep);
                    out
                } else {
                    all
                }
            }
        };
        ranges.into_iter().map(|r| self.substring(r)).collect()
    }

    /// One single-character string per character.
    pub fn chars(&self) -> Vec<JinjaString> {
        let text = self.as_str();
        text.char_indices()
            .map(|(i, c)| self.substring(i..i + c.len_utf8()))
            .collect()
    }

    /// Replace occurrences of `from` with `to`.
    ///
    /// The result is a single part, input only if the whole source was.
    pub fn replace(&self, from: &str, to: &str, count: Option<usize>) -> JinjaString {
        let text = self.as_str();
        let replaced = match count {
            Some(n) => text.replacen(from, to, n),
            None => text.replace(from, to),
        };
        JinjaString {
            parts: vec![StringPart {
                is_input: self.is_input(),
                text: replaced,
            }],
        }
    }

    pub fn repeat(&self, n: usize) -> JinjaString {
        let mut out = JinjaString::default();
        for _ in 0..n {
            out.append(self);
        }
        if out.parts.is_empty() {
            return JinjaString::new("");
        }
        out
    }
}

fn split_ranges(text: &str, sep: &str, max_split: Option<usize>) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices(sep) {
        if max_split.is_some_and(|max| ranges.len() >= max) {
            break;
        }
        ranges.push(start..i);
        start = i + sep.len();
    }
    ranges.push(start..text.len());
    ranges
}

fn rsplit_ranges(text: &str, sep: &str, max_split: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut end = text.len();
    for (i, _) in text.rmatch_indices(sep) {
        if ranges.len() >= max_split {
            break;
        }
        ranges.push(i + sep.len()..end);
        end = i;
    }
    ranges.push(0..end);
    ranges.reverse();
    ranges
}

fn whitespace_ranges(text: &str, max_split: Option<usize>) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut word_start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = word_start.take() {
                ranges.push(start..i);
                if max_split.is_some_and(|max| ranges.len() >= max) {
                    let rest = text[i..].trim_start();
                    if !rest.is_empty() {
                        let rest_start = text.len() - rest.len();
                        ranges.push(rest_start..text.len());
                    }
                    return ranges;
                }
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        ranges.push(start..text.len());
    }
    ranges
}

impl fmt::Display for JinjaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            f.write_str(&part.text)?;
        }
        Ok(())
    }
}

/// Strings compare by logical text; provenance is ignored.
impl PartialEq for JinjaString {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl From<&str> for JinjaString {
    fn from(s: &str) -> Self {
        JinjaString::new(s)
    }
}

impl From<String> for JinjaString {
    fn from(s: String) -> Self {
        JinjaString::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mixed() -> JinjaString {
        let mut s = JinjaString::new("Hi ");
        s.append(&JinjaString::input("user text"));
        s
    }

    fn texts(v: &[JinjaString]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_concat_provenance() {
        let a = JinjaString::input("a");
        let b = JinjaString::input("b");
        assert!(a.concat(&b).is_input());
        assert!(!a.concat(&JinjaString::new("c")).is_input());
        assert_eq!(a.concat(&b).to_string(), "ab");
    }

    #[test]
    fn test_one_to_one_keeps_flags() {
        let upper = mixed().to_uppercase();
        assert_eq!(upper.to_string(), "HI USER TEXT");
        assert!(!upper.parts()[0].is_input);
        assert!(upper.parts()[1].is_input);
    }

    #[test]
    fn test_title_across_parts() {
        let mut s = JinjaString::new("hello wo");
        s.append(&JinjaString::input("RLD again"));
        assert_eq!(s.title().to_string(), "Hello World Again");
        assert_eq!(JinjaString::new("hello world").title().to_string(), "Hello World");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(JinjaString::new("hELLO World").capitalize().to_string(), "Hello world");
    }

    #[test]
    fn test_substring_keeps_overlapping_flags() {
        let sub = mixed().substring(1..6);
        assert_eq!(sub.to_string(), "i use");
        assert_eq!(sub.parts().len(), 2);
        assert!(!sub.parts()[0].is_input);
        assert!(sub.parts()[1].is_input);

        let inner = mixed().substring(3..7);
        assert_eq!(inner.to_string(), "user");
        assert!(inner.is_input());
    }

    #[test]
    fn test_strip() {
        let s = JinjaString::input("  padded \n");
        let stripped = s.strip(true, true, None);
        assert_eq!(stripped.to_string(), "padded");
        assert!(stripped.is_input());
        assert_eq!(s.strip(true, false, None).to_string(), "padded \n");
        assert_eq!(s.strip(false, true, None).to_string(), "  padded");
        assert_eq!(
            JinjaString::new("xxhixx").strip(true, true, Some("x")).to_string(),
            "hi"
        );
        assert_eq!(JinjaString::new("   ").strip(true, true, None).to_string(), "");
    }

    #[test]
    fn test_split_with_separator() {
        let s = JinjaString::input("a,b,,c");
        let parts = s.split(Some(","), None);
        assert_eq!(texts(&parts), vec!["a", "b", "", "c"]);
        assert!(parts.iter().all(|p| p.is_input()));
        assert_eq!(texts(&s.split(Some(","), Some(1))), vec!["a", "b,,c"]);
    }

    #[test]
    fn test_split_whitespace() {
        let s = JinjaString::new("  one two\tthree  ");
        assert_eq!(texts(&s.split(None, None)), vec!["one", "two", "three"]);
        assert_eq!(texts(&s.split(None, Some(1))), vec!["one", "two\tthree  "]);
    }

    #[test]
    fn test_rsplit() {
        let s = JinjaString::new("a.b.c");
        assert_eq!(texts(&s.rsplit(Some("."), Some(1))), vec!["a.b", "c"]);
        assert_eq!(texts(&s.rsplit(Some("."), None)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_chars_preserve_provenance() {
        let chars = mixed().chars();
        assert_eq!(chars.len(), 12);
        assert!(!chars[0].is_input());
        assert!(chars[3].is_input());
    }

    #[test]
    fn test_replace() {
        let s = JinjaString::input("a-b-c");
        let r = s.replace("-", "+", None);
        assert_eq!(r.to_string(), "a+b+c");
        assert!(r.is_input());
        assert_eq!(s.replace("-", "", Some(1)).to_string(), "ab-c");
        assert!(!mixed().replace("Hi", "Yo", None).is_input());
    }

    #[test]
    fn test_repeat() {
        assert_eq!(JinjaString::new("ab").repeat(3).to_string(), "ababab");
        assert_eq!(JinjaString::new("ab").repeat(0).to_string(), "");
    }

    #[test]
    fn test_equality_ignores_provenance() {
        assert_eq!(JinjaString::new("x"), JinjaString::input("x"));
    }
}
