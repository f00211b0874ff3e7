//! Paragraph-boundary text parser.
//!
//! Splits the payload on blank lines, normalizes whitespace, merges
//! runs of short paragraphs until they reach `min_paragraph_length`,
//! and splits paragraphs above `max_paragraph_length` on sentence
//! boundaries, packing sentences greedily into chunks.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;

use super::{ContentFragment, ParsedResource, Parser};

#[derive(Debug)]
pub struct TextParser {
    min_paragraph_length: usize,
    max_paragraph_length: usize,
}

impl TextParser {
    pub fn new(min_paragraph_length: usize, max_paragraph_length: usize) -> Self {
        Self {
            min_paragraph_length,
            max_paragraph_length,
        }
    }

    /// Paragraph = maximal run of non-blank lines, whitespace collapsed
    /// to single spaces.
    fn split_paragraphs(payload: &str) -> Vec<String> {
        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in payload.lines() {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    paragraphs.push(normalize(&current.join(" ")));
                    current.clear();
                }
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            paragraphs.push(normalize(&current.join(" ")));
        }
        paragraphs.retain(|p| !p.is_empty());
        paragraphs
    }

    /// Pack sentences greedily into chunks no longer than `max` (a
    /// single sentence longer than `max` stays whole).
    fn split_long(paragraph: &str, max: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in split_sentences(paragraph) {
            let projected = if current.is_empty() {
                sentence.len()
            } else {
                current.len() + 1 + sentence.len()
            };
            if projected > max && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if current.is_empty() {
                current = sentence;
            } else {
                current.push(' ');
                current.push_str(&sentence);
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split on `[.!?]` followed by whitespace, keeping the terminator with
/// its sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = iter.peek() {
                if next.is_whitespace() {
                    let end = i + c.len_utf8();
                    let sentence = text[start..end].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence.to_string());
                    }
                    start = end;
                }
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

impl Parser for TextParser {
    fn content_type(&self) -> &str {
        "text"
    }

    fn can_parse(&self, payload: &str) -> bool {
        !payload.is_empty() && payload.len() >= self.min_paragraph_length
    }

    fn parse(
        &self,
        payload: &str,
        resource_id: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ParsedResource> {
        let paragraphs = Self::split_paragraphs(payload);

        let mut texts: Vec<String> = Vec::new();
        let mut buffer: Vec<String> = Vec::new();

        for paragraph in paragraphs {
            if paragraph.len() < self.min_paragraph_length {
                buffer.push(paragraph);
                let joined: usize = buffer.iter().map(|p| p.len()).sum::<usize>()
                    + 2 * (buffer.len() - 1);
                if joined >= self.min_paragraph_length {
                    texts.push(buffer.join("\n\n"));
                    buffer.clear();
                }
            } else {
                if !buffer.is_empty() {
                    texts.push(buffer.join("\n\n"));
                    buffer.clear();
                }
                if paragraph.len() > self.max_paragraph_length {
                    texts.extend(Self::split_long(&paragraph, self.max_paragraph_length));
                } else {
                    texts.push(paragraph);
                }
            }
        }
        if !buffer.is_empty() {
            texts.push(buffer.join("\n\n"));
        }

        let fragments = texts
            .into_iter()
            .enumerate()
            .map(|(order, content)| {
                let mut meta = BTreeMap::new();
                meta.insert("length".to_string(), Value::from(content.len()));
                meta.insert(
                    "word_count".to_string(),
                    Value::from(content.split_whitespace().count()),
                );
                ContentFragment {
                    content,
                    fragment_type: "paragraph".to_string(),
                    order,
                    parent_key: None,
                    metadata: meta,
                }
            })
            .collect();

        let mut resource_metadata = metadata.clone();
        resource_metadata.insert("parser".to_string(), self.content_type().to_string());

        Ok(ParsedResource {
            resource_id: resource_id.to_string(),
            resource_type: self.content_type().to_string(),
            metadata: resource_metadata,
            fragments,
        })
    }
}
