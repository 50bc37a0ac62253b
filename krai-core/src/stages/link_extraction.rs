//! Link Extraction (stage 6, spec numbering aside): scans page text for
//! `http(s)://` URLs and queues each as a link or, for recognized video
//! hosts, a video — both flow through the same Storage stage dedup path as
//! images and SVGs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::media::context::ContextExtractor;
use crate::patterns;
use crate::processor::Processor;
use crate::storage::ProcessingQueueStore;
use crate::types::{ProcessingContext, ProcessingResult, ProcessingQueueItem, QueuePayload, Stage, VideoMetadata};

pub struct LinkExtractionProcessor {
    context: ContextExtractor,
    queue: Arc<dyn ProcessingQueueStore>,
}

impl LinkExtractionProcessor {
    #[must_use]
    pub fn new(context: ContextExtractor, queue: Arc<dyn ProcessingQueueStore>) -> Self {
        Self { context, queue }
    }
}

/// The recognized video-hosting platform for `url`, if any. Everything else
/// is queued as a plain link.
fn video_platform(url: &str) -> Option<&'static str> {
    let host = url::Url::parse(url).ok()?.host_str()?.to_string();
    if host.ends_with("youtube.com") || host.ends_with("youtu.be") {
        Some("youtube")
    } else if host.ends_with("vimeo.com") {
        Some("vimeo")
    } else {
        None
    }
}

#[async_trait]
impl Processor for LinkExtractionProcessor {
    fn name(&self) -> &'static str {
        "link_extraction"
    }

    fn stage(&self) -> Stage {
        Stage::LinkExtraction
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["page_texts"]
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["processing_queue"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let page_texts = context
            .page_texts
            .as_ref()
            .ok_or_else(|| Error::MissingInput("page_texts".to_string()))?;
        let ordered: BTreeMap<u32, &String> = page_texts.iter().map(|(p, t)| (*p, t)).collect();

        let mut queued = 0u64;
        for (page_number, page_text) in ordered {
            for url in patterns::all_urls(page_text) {
                let item = if let Some(platform) = video_platform(&url) {
                    let ctx = self.context.extract_video_context(page_text, &url);
                    ProcessingQueueItem::new(
                        context.document_id,
                        QueuePayload::Video {
                            url,
                            page_number,
                            context_description: ctx.context_description,
                            related_error_codes: ctx.related_error_codes,
                            related_products: ctx.related_products,
                            platform: platform.to_string(),
                            metadata: VideoMetadata { needs_enrichment: true, credentials_missing: None },
                        },
                    )
                } else {
                    let ctx = self.context.extract_link_context(page_text, &url);
                    ProcessingQueueItem::new(
                        context.document_id,
                        QueuePayload::Link {
                            url,
                            page_number,
                            context_description: ctx.context_description,
                            related_error_codes: ctx.related_error_codes,
                            related_products: ctx.related_products,
                        },
                    )
                };
                self.queue.enqueue(item).await?;
                queued += 1;
            }
        }

        let mut data = HashMap::new();
        data.insert("links_queued".to_string(), serde_json::json!(queued));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct RecordingQueue(Mutex<Vec<ProcessingQueueItem>>);
    #[async_trait::async_trait]
    impl ProcessingQueueStore for RecordingQueue {
        async fn enqueue(&self, item: ProcessingQueueItem) -> Result<()> {
            self.0.lock().unwrap().push(item);
            Ok(())
        }
        async fn pending_for_document(&self, _document_id: Uuid) -> Result<Vec<ProcessingQueueItem>> {
            Ok(self.0.lock().unwrap().clone())
        }
        async fn mark_status(&self, _item_id: Uuid, _status: crate::types::QueueItemStatus) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn plain_links_and_youtube_links_are_classified_separately() {
        let queue = Arc::new(RecordingQueue(Mutex::new(Vec::new())));
        let processor = LinkExtractionProcessor::new(ContextExtractor::default(), queue.clone());
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::LinkExtraction);
        let mut pages = HashMap::new();
        pages.insert(
            0u32,
            "See https://example.com/manual.pdf and https://www.youtube.com/watch?v=abc123 for a walkthrough.".to_string(),
        );
        ctx.page_texts = Some(pages);

        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        let items = queue.0.lock().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().any(|i| matches!(i.payload, QueuePayload::Link { .. })));
        assert!(items.iter().any(|i| matches!(i.payload, QueuePayload::Video { .. })));
    }

    #[tokio::test]
    async fn no_urls_queues_nothing() {
        let queue = Arc::new(RecordingQueue(Mutex::new(Vec::new())));
        let processor = LinkExtractionProcessor::new(ContextExtractor::default(), queue.clone());
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::LinkExtraction);
        let mut pages = HashMap::new();
        pages.insert(0u32, "No links on this page.".to_string());
        ctx.page_texts = Some(pages);

        processor.process(&mut ctx).await.unwrap();
        assert!(queue.0.lock().unwrap().is_empty());
    }
}
