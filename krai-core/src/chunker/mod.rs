//! Smart Chunker: contextual + hierarchical chunking, section
//! detection, error-code-aware sectioning, prev/next linking, fingerprinting.

mod sections;

pub use sections::{detect_sections, Section};

use crate::config::ChunkerConfig;
use crate::patterns;
use crate::types::{Chunk, ChunkMetadata, ChunkType};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Given `page_texts` (0-based page number → text) and a `document_id`,
/// produce the ordered sequence of chunks covering the document.
pub struct SmartChunker {
    config: ChunkerConfig,
}

impl SmartChunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn chunk_document(&self, document_id: Uuid, page_texts: &BTreeMap<u32, String>) -> Vec<Chunk> {
        let pages_with_markers = concatenate_with_markers(page_texts);
        let sections = detect_sections(&pages_with_markers, self.config.hierarchical);

        let mut chunks = Vec::new();
        let mut chunk_index = 0u32;

        for section in &sections {
            let packed = self.pack_section(&section.text, section.page_start, section.page_end);
            for (text, page_start, page_end) in packed {
                let mut chunk = Chunk::new(document_id, chunk_index, text, page_start, page_end);

                if self.config.hierarchical {
                    chunk.metadata.section_hierarchy = Some(section.hierarchy.clone());
                    chunk.metadata.section_level = Some(section.level);
                }

                if self.config.detect_error_code_sections {
                    if let Some(code) = patterns::first_error_code(leading_text(&chunk.text)) {
                        chunk.chunk_type = ChunkType::ErrorCodeSection;
                        chunk.metadata.error_code = Some(code);
                    }
                }

                chunks.push(chunk);
                chunk_index += 1;
            }
        }

        if self.config.link_chunks {
            link_chunks(&mut chunks);
        }

        chunks
    }

    /// Greedy-pack sentences up to `chunk_size`, carrying the last `overlap`
    /// characters forward as a prefix for the next chunk. A single sentence
    /// longer than `chunk_size` is never split mid-sentence — it becomes its
    /// own (oversized) chunk.
    fn pack_section(&self, text: &str, page_start: u32, page_end: u32) -> Vec<(String, u32, u32)> {
        let sentences = split_sentences(text);
        let mut packed = Vec::new();
        let mut current = String::new();

        for sentence in sentences {
            if !current.is_empty() && current.len() + sentence.len() > self.config.chunk_size {
                packed.push((std::mem::take(&mut current), page_start, page_end));
                current = overlap_prefix(&packed.last().expect("just pushed").0, self.config.overlap);
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence.trim());
        }

        if !current.trim().is_empty() {
            packed.push((current, page_start, page_end));
        }

        if packed.is_empty() {
            packed.push((text.to_string(), page_start, page_end));
        }

        packed
    }
}

/// Concatenate pages in order with an inline marker the section detector can
/// use to carry `page_start`/`page_end` forward onto sections.
fn concatenate_with_markers(page_texts: &BTreeMap<u32, String>) -> Vec<(u32, String)> {
    page_texts.iter().map(|(p, t)| (*p, t.clone())).collect()
}

fn leading_text(text: &str) -> &str {
    let end = text.char_indices().nth(80).map(|(i, _)| i).unwrap_or(text.len());
    &text[..end]
}

/// Split into sentence-ish units on `.`/`!`/`?` followed by whitespace,
/// falling back to the whole text if nothing matches (short sections,
/// bullet lists).
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, ch) in text.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            let next_is_boundary = bytes
                .get(i + ch.len_utf8())
                .map(|b| b.is_ascii_whitespace())
                .unwrap_or(true);
            if next_is_boundary {
                sentences.push(text[start..=i].trim());
                start = i + ch.len_utf8();
            }
        }
    }
    if start < text.len() {
        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
    }
    sentences.retain(|s| !s.is_empty());
    if sentences.is_empty() && !text.trim().is_empty() {
        sentences.push(text.trim());
    }
    sentences
}

fn overlap_prefix(previous: &str, overlap: usize) -> String {
    if overlap == 0 || previous.is_empty() {
        return String::new();
    }
    let start = previous.len().saturating_sub(overlap);
    // Land on a char boundary.
    let mut start = start;
    while start < previous.len() && !previous.is_char_boundary(start) {
        start += 1;
    }
    previous[start..].to_string()
}

/// Fill `previous_chunk_id`/`next_chunk_id` within the document: the first
/// chunk's `previous_chunk_id` and the last chunk's `next_chunk_id` are both
/// `None`.
fn link_chunks(chunks: &mut [Chunk]) {
    let ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.metadata.previous_chunk_id = if i == 0 { None } else { Some(ids[i - 1]) };
        chunk.metadata.next_chunk_id = ids.get(i + 1).copied();
    }
}
