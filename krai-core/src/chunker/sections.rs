//! Header-heuristic section detection for the Smart Chunker.

use regex::Regex;
use std::sync::LazyLock;

static NUMBERED_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)*)\.?\s+(\S.*)$").expect("valid regex"));

/// One detected section: its text, the header path leading to it, its
/// nesting level, and the page span it was pulled from.
#[derive(Debug, Clone)]
pub struct Section {
    pub text: String,
    pub hierarchy: Vec<String>,
    pub level: u32,
    pub page_start: u32,
    pub page_end: u32,
}

/// Break `pages` into sections using header heuristics: numbered headers
/// (`1.`, `2.1`), all-caps lines, and outline-style patterns. When
/// `hierarchical` is off, every page is a single flat section.
#[must_use]
pub fn detect_sections(pages: &[(u32, String)], hierarchical: bool) -> Vec<Section> {
    if !hierarchical {
        return pages
            .iter()
            .map(|(page, text)| Section {
                text: text.clone(),
                hierarchy: Vec::new(),
                level: 0,
                page_start: *page,
                page_end: *page,
            })
            .collect();
    }

    let mut sections = Vec::new();
    let mut header_stack: Vec<String> = Vec::new();
    let mut current_text = String::new();
    let mut current_page_start: Option<u32> = None;
    let mut current_page_end = 0u32;

    let flush = |sections: &mut Vec<Section>, text: &mut String, stack: &[String], start: Option<u32>, end: u32| {
        if !text.trim().is_empty() {
            sections.push(Section {
                text: std::mem::take(text),
                hierarchy: stack.to_vec(),
                level: stack.len() as u32,
                page_start: start.unwrap_or(end),
                page_end: end,
            });
        } else {
            text.clear();
        }
    };

    for (page, page_text) in pages {
        for line in page_text.lines() {
            if let Some(header) = detect_header(line) {
                flush(&mut sections, &mut current_text, &header_stack, current_page_start, current_page_end);
                current_page_start = None;

                let level = header.level;
                header_stack.truncate(level.saturating_sub(1) as usize);
                header_stack.push(header.title);
            } else if !line.trim().is_empty() {
                if current_page_start.is_none() {
                    current_page_start = Some(*page);
                }
                current_text.push_str(line);
                current_text.push('\n');
                current_page_end = *page;
            }
        }
    }
    flush(&mut sections, &mut current_text, &header_stack, current_page_start, current_page_end);

    if sections.is_empty() {
        return pages
            .iter()
            .map(|(page, text)| Section {
                text: text.clone(),
                hierarchy: Vec::new(),
                level: 0,
                page_start: *page,
                page_end: *page,
            })
            .collect();
    }

    sections
}

struct DetectedHeader {
    title: String,
    level: u32,
}

fn detect_header(line: &str) -> Option<DetectedHeader> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(caps) = NUMBERED_HEADER.captures(trimmed) {
        let number = caps.get(1)?.as_str();
        let level = number.matches('.').count() as u32 + 1;
        return Some(DetectedHeader {
            title: trimmed.to_string(),
            level,
        });
    }

    let is_all_caps = trimmed.chars().any(char::is_alphabetic)
        && trimmed.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase)
        && trimmed.len() < 80;
    if is_all_caps {
        return Some(DetectedHeader {
            title: trimmed.to_string(),
            level: 1,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_headers_build_hierarchy() {
        let pages = vec![(0u32, "1. Intro\nsome text\n2. Technical\nmore text\n2.1 Sub\neven more".to_string())];
        let sections = detect_sections(&pages, true);
        assert!(sections.iter().any(|s| s.hierarchy.iter().any(|h| h.starts_with("2.1"))));
    }

    #[test]
    fn flat_sections_when_not_hierarchical() {
        let pages = vec![(0u32, "anything at all".to_string())];
        let sections = detect_sections(&pages, false);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].hierarchy.is_empty());
    }
}
