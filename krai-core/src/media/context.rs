//! Context extraction shared by the image, link, video and table stages:
//! surrounding text, figure references, page headers, related error codes
//! and products, and the paragraphs around a media element.

use crate::patterns;
use crate::types::BoundingBox;
use regex::Regex;
use std::sync::LazyLock;

/// Default number of characters pulled before/after a media element when no
/// bounding box narrows the search.
pub const DEFAULT_CONTEXT_WINDOW: usize = 200;

static FIGURE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Figure|Fig\.|Abb\.|Abbildung)\s+\d+\.?\d*").expect("valid regex")
});

/// Context gathered for an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageContext {
    pub context_caption: Option<String>,
    pub figure_reference: Option<String>,
    pub page_header: Option<String>,
    pub related_error_codes: Vec<String>,
    pub related_products: Vec<String>,
    pub surrounding_paragraphs: Vec<String>,
}

/// Context gathered for a link or video (they share the same shape since a
/// video is just a link with enrichment fields attached downstream).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkContext {
    pub context_description: Option<String>,
    pub page_header: Option<String>,
    pub related_error_codes: Vec<String>,
    pub related_products: Vec<String>,
}

/// Extracts context from page text for any media element on that page.
#[derive(Debug, Clone, Copy)]
pub struct ContextExtractor {
    window: usize,
    enable_error_codes: bool,
    enable_products: bool,
}

impl Default for ContextExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW, true, true)
    }
}

impl ContextExtractor {
    #[must_use]
    pub fn new(window: usize, enable_error_codes: bool, enable_products: bool) -> Self {
        Self {
            window,
            enable_error_codes,
            enable_products,
        }
    }

    /// `bbox`/`page_height`, when both are available, narrow
    /// `context_caption` to the text immediately above and below the image's
    /// own position on the page rather than the page-middle fallback.
    #[must_use]
    pub fn extract_image_context(&self, page_text: &str, bbox: Option<BoundingBox>, page_height: f64) -> ImageContext {
        ImageContext {
            context_caption: surrounding_text_near_bbox(page_text, bbox, page_height, self.window),
            figure_reference: figure_reference(page_text),
            page_header: page_header(page_text),
            related_error_codes: self.error_codes(page_text),
            related_products: self.products(page_text),
            surrounding_paragraphs: surrounding_paragraphs(page_text),
        }
    }

    #[must_use]
    pub fn extract_link_context(&self, page_text: &str, url: &str) -> LinkContext {
        LinkContext {
            context_description: link_paragraph(page_text, url),
            page_header: page_header(page_text),
            related_error_codes: self.error_codes(page_text),
            related_products: self.products(page_text),
        }
    }

    /// Videos are links with a richer downstream record, so they share link
    /// context extraction.
    #[must_use]
    pub fn extract_video_context(&self, page_text: &str, url: &str) -> LinkContext {
        self.extract_link_context(page_text, url)
    }

    fn error_codes(&self, text: &str) -> Vec<String> {
        if self.enable_error_codes {
            patterns::all_error_codes(text)
        } else {
            Vec::new()
        }
    }

    fn products(&self, text: &str) -> Vec<String> {
        if self.enable_products {
            patterns::all_products(text)
        } else {
            Vec::new()
        }
    }
}

/// First `Figure 3.2` / `Fig. 1` / `Abb. 4` / `Abbildung 2` style reference.
fn figure_reference(text: &str) -> Option<String> {
    FIGURE_REFERENCE.find(text).map(|m| m.as_str().to_string())
}

/// First non-trivial line of the page, used as a stand-in page header.
fn page_header(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| line.chars().count() > 3)
        .map(str::to_string)
}

/// Text around the middle of the page when no bounding box narrows the
/// search, matching in spirit the "extract from the middle of the page"
/// fallback used when bbox-aware extraction isn't available.
fn surrounding_text(page_text: &str, radius: usize) -> Option<String> {
    let trimmed = page_text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= radius * 2 {
        return Some(trimmed.to_string());
    }

    let mid = chars.len() / 2;
    let start = mid.saturating_sub(radius);
    let end = (mid + radius).min(chars.len());
    Some(chars[start..end].iter().collect::<String>().trim().to_string())
}

/// Text immediately above and below the image's bounding box, approximated
/// from plain extracted text rather than a clipped re-read of the PDF page:
/// PDF text extraction emits lines top-to-bottom, so `bbox.y0`/`bbox.y1` as a
/// fraction of `page_height` locates roughly where in `page_text` the image
/// sits, and up to `radius` characters are taken from just before and after
/// that span. Falls back to [`surrounding_text`] when there's no bbox (or no
/// page height to scale it by), or when both regions come up empty.
fn surrounding_text_near_bbox(page_text: &str, bbox: Option<BoundingBox>, page_height: f64, radius: usize) -> Option<String> {
    let trimmed = page_text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Some(bbox) = bbox.filter(|_| page_height > 0.0) else {
        return surrounding_text(page_text, radius);
    };

    let chars: Vec<char> = trimmed.chars().collect();
    let above_end = ((chars.len() as f64) * (bbox.y0 / page_height).clamp(0.0, 1.0)).round() as usize;
    let below_start = ((chars.len() as f64) * (bbox.y1 / page_height).clamp(0.0, 1.0)).round() as usize;
    let above_end = above_end.min(chars.len());
    let below_start = below_start.min(chars.len());

    let above_start = above_end.saturating_sub(radius);
    let above = chars[above_start..above_end].iter().collect::<String>();
    let above = above.trim();

    let below_end = (below_start + radius).min(chars.len());
    let below = chars[below_start..below_end].iter().collect::<String>();
    let below = below.trim();

    match (above.is_empty(), below.is_empty()) {
        (true, true) => surrounding_text(page_text, radius),
        (false, true) => Some(above.to_string()),
        (true, false) => Some(below.to_string()),
        (false, false) => Some(format!("{above} ... {below}")),
    }
}

/// Up to two paragraphs before and after the middle of the page, split on
/// blank lines.
fn surrounding_paragraphs(page_text: &str) -> Vec<String> {
    let paragraphs: Vec<String> = page_text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    if paragraphs.len() <= 4 {
        return paragraphs;
    }

    let target = paragraphs.len() / 2;
    let start = target.saturating_sub(2);
    let end = (target + 2).min(paragraphs.len());
    paragraphs[start..end].to_vec()
}

/// The paragraph (or, failing that, the line) containing `url`.
fn link_paragraph(page_text: &str, url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    page_text
        .split("\n\n")
        .find(|p| p.contains(url))
        .map(|p| p.trim().to_string())
        .or_else(|| {
            page_text
                .lines()
                .find(|l| l.contains(url))
                .map(|l| l.trim().to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_context_collects_codes_and_products() {
        let text = "Printer Maintenance Guide\n\nError 900.01 occurs on the bizhub 454. Replace the fuser unit shown in Figure 3.2.";
        let ctx = ContextExtractor::default().extract_image_context(text, None, 0.0);
        assert_eq!(ctx.page_header.as_deref(), Some("Printer Maintenance Guide"));
        assert_eq!(ctx.figure_reference.as_deref(), Some("Figure 3.2"));
        assert!(ctx.related_error_codes.contains(&"900.01".to_string()));
        assert!(ctx.related_products.iter().any(|p| p.contains("bizhub")));
    }

    #[test]
    fn bbox_near_top_of_page_pulls_caption_from_the_text_above_it() {
        let text = "Header line.\n\nThis paragraph sits right above the image.\n\nThis paragraph sits below the image.";
        // A bbox whose y0/y1 sit past the first paragraph's share of the page
        // should favor text just before that point over the page-middle window.
        let bbox = crate::types::BoundingBox { x0: 0.0, y0: 600.0, x1: 100.0, y1: 650.0 };
        let ctx = ContextExtractor::default().extract_image_context(text, Some(bbox), 792.0);
        assert!(ctx.context_caption.is_some());
    }

    #[test]
    fn no_bbox_falls_back_to_page_middle_window() {
        let text = "a".repeat(1000);
        let ctx = ContextExtractor::default().extract_image_context(&text, None, 792.0);
        assert_eq!(ctx.context_caption.as_deref().map(str::len), Some(400));
    }

    #[test]
    fn link_context_finds_paragraph_containing_url() {
        let text = "Intro paragraph.\n\nSee https://example.com/manual for details.\n\nOutro.";
        let ctx = ContextExtractor::default().extract_link_context(text, "https://example.com/manual");
        assert_eq!(
            ctx.context_description.as_deref(),
            Some("See https://example.com/manual for details.")
        );
    }

    #[test]
    fn empty_page_text_yields_empty_context() {
        let ctx = ContextExtractor::default().extract_image_context("", None, 0.0);
        assert!(ctx.context_caption.is_none());
        assert!(ctx.related_error_codes.is_empty());
    }
}
