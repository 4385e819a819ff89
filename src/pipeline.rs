//! Request pipeline: admission control wrapped around upload and chat work.
//!
//! Every request passes two admission stages before any expensive work:
//! the process-wide [`ConcurrencyGate`], then the per-client
//! [`SlidingWindowLimiter`]. The gate permit is held for the request's whole
//! lifetime and released when it drops, independent of how the work ends.
//!
//! Per request the states are:
//!
//! ```text
//! Arrived → ConcurrencyAdmitted → RateAdmitted → Processing
//!                                                   → Completed | Failed
//!         → Rejected (either admission stage, no work performed)
//! ```
//!
//! Admission failures never reach business logic; business-logic failures
//! are caught here so the caller always gets a terminal
//! [`RequestOutcome`]. Nothing is retried at this layer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chunk::{rebalance_by_token_budget, split_text};
use crate::config::Config;
use crate::gate::ConcurrencyGate;
use crate::limiter::SlidingWindowLimiter;
use crate::llm::{build_prompt, LlmClient};
use crate::models::{ChatMode, ChatResult, DocumentRecord, UploadResult};
use crate::retriever::{IndexStats, KeywordRetriever};
use crate::store::{DocumentStore, StoreError};

/// Why a request was turned away before any work ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Per-client sliding window is full.
    RateLimited,
    /// Process-wide in-flight ceiling reached.
    ServerBusy,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::RateLimited => write!(f, "Rate limit exceeded"),
            RejectReason::ServerBusy => write!(f, "Server is busy"),
        }
    }
}

/// Failure after admission, classified per the error taxonomy.
#[derive(Debug)]
pub enum PipelineError {
    /// Bad request content; rejected before any processing.
    InvalidInput(String),
    /// Unknown document identifier.
    NotFound(String),
    /// A collaborator (PDF parser, LLM) failed.
    Upstream(String),
    /// Anything unanticipated.
    Internal(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::InvalidInput(m) => write!(f, "invalid input: {}", m),
            PipelineError::NotFound(m) => write!(f, "not found: {}", m),
            PipelineError::Upstream(m) => write!(f, "upstream failure: {}", m),
            PipelineError::Internal(e) => write!(f, "internal error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Terminal state of one request.
#[derive(Debug)]
pub enum RequestOutcome<T> {
    Completed(T),
    Rejected(RejectReason),
    Failed(PipelineError),
}

/// Composition root tying admission control to the chunking/retrieval
/// engine and the external collaborators.
pub struct RequestPipeline {
    config: Arc<Config>,
    limiter: SlidingWindowLimiter,
    gate: ConcurrencyGate,
    retriever: KeywordRetriever,
    store: DocumentStore,
    llm: Box<dyn LlmClient>,
}

impl RequestPipeline {
    /// Builds a pipeline from configuration and an LLM client.
    ///
    /// Opens (and creates if missing) the document data directory.
    pub fn new(config: Arc<Config>, llm: Box<dyn LlmClient>) -> anyhow::Result<Self> {
        let limiter = SlidingWindowLimiter::new(
            config.limits.rate_max_requests,
            Duration::from_secs(config.limits.rate_window_secs),
        );
        let gate = ConcurrencyGate::new(config.limits.max_concurrent_requests);
        let retriever = KeywordRetriever::new(config.retrieval.index_capacity);
        let store = DocumentStore::open(&config.storage.data_dir)?;
        Ok(Self {
            config,
            limiter,
            gate,
            retriever,
            store,
            llm,
        })
    }

    /// Runs `work` behind both admission stages.
    ///
    /// The gate slot is claimed first and released when this function
    /// returns, whatever the limiter or the work decided. A rejection at
    /// either stage is cheap: no work future is ever polled.
    pub async fn admit_and_run<T, F, Fut>(&self, client_id: &str, work: F) -> RequestOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let _permit = match self.gate.try_enter() {
            Some(permit) => permit,
            None => return RequestOutcome::Rejected(RejectReason::ServerBusy),
        };

        if !self.limiter.admit(client_id) {
            return RequestOutcome::Rejected(RejectReason::RateLimited);
        }

        match work().await {
            Ok(value) => RequestOutcome::Completed(value),
            Err(e) => {
                match &e {
                    PipelineError::Internal(inner) => error!(error = %inner, "request failed"),
                    other => warn!(error = %other, "request failed"),
                }
                RequestOutcome::Failed(e)
            }
        }
        // _permit drops here, releasing the concurrency slot.
    }

    /// Admission-controlled PDF upload: extract, persist, chunk, index.
    pub async fn upload(
        &self,
        client_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> RequestOutcome<UploadResult> {
        self.admit_and_run(client_id, || self.handle_upload(filename, bytes))
            .await
    }

    /// Admission-controlled chat against a previously uploaded document.
    pub async fn chat(
        &self,
        client_id: &str,
        doc_id: &str,
        message: &str,
        mode: ChatMode,
    ) -> RequestOutcome<ChatResult> {
        self.admit_and_run(client_id, || self.handle_chat(doc_id, message, mode))
            .await
    }

    /// Retrieval-index occupancy, for the stats endpoint.
    pub fn index_stats(&self) -> IndexStats {
        self.retriever.stats()
    }

    async fn handle_upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResult, PipelineError> {
        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(PipelineError::InvalidInput(
                "only PDF files are allowed".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(PipelineError::InvalidInput("empty file".to_string()));
        }
        let max = self.config.storage.max_pdf_bytes;
        if bytes.len() > max {
            return Err(PipelineError::InvalidInput(format!(
                "file size exceeds maximum of {} bytes",
                max
            )));
        }

        let size = bytes.len();
        let sha256 = format!("{:x}", Sha256::digest(&bytes));

        // PDF parsing is CPU-bound; keep it off the async workers.
        let extracted = tokio::task::spawn_blocking(move || crate::extract::extract_pdf(&bytes))
            .await
            .map_err(|e| PipelineError::Internal(anyhow::anyhow!("extraction task: {}", e)))?
            .map_err(|e| PipelineError::Upstream(e.to_string()))?;

        let doc_id = Uuid::new_v4().to_string();
        let record = DocumentRecord {
            doc_id: doc_id.clone(),
            filename: filename.to_string(),
            size,
            pages: extracted.pages,
            text: extracted.text,
            sha256,
            uploaded_at: Utc::now(),
        };
        self.store
            .persist(&record)
            .map_err(PipelineError::Internal)?;

        let chunks = split_text(&record.text, self.config.chunking.index_chunk_size);
        let chunk_count = self.retriever.index(&doc_id, chunks);

        info!(doc_id = %doc_id, pages = record.pages, chunk_count, "uploaded document");
        Ok(UploadResult {
            doc_id,
            filename: record.filename,
            size: record.size,
            pages: record.pages,
            chunk_count,
            uploaded_at: record.uploaded_at,
        })
    }

    async fn handle_chat(
        &self,
        doc_id: &str,
        message: &str,
        mode: ChatMode,
    ) -> Result<ChatResult, PipelineError> {
        if message.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        let context = match mode {
            ChatMode::Retrieval => {
                let top = self.config.retrieval.top_chunks;
                let chunks = self.retriever.query(doc_id, message, top);
                if chunks.is_empty() {
                    // Unindexed (e.g. restarted process) or no term matched:
                    // fall back to the stored full text.
                    self.load_text(doc_id)?
                } else {
                    chunks.join("\n\n")
                }
            }
            ChatMode::Direct => self.load_text(doc_id)?,
        };

        let context = self.bound_context(context);
        let prompt = build_prompt(&context, message);
        let response = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| PipelineError::Upstream(e.to_string()))?;

        Ok(ChatResult {
            response,
            timestamp: Utc::now(),
        })
    }

    fn load_text(&self, doc_id: &str) -> Result<String, PipelineError> {
        match self.store.load(doc_id) {
            Ok(record) => Ok(record.text),
            Err(StoreError::NotFound(id)) => Err(PipelineError::NotFound(id)),
            Err(StoreError::Io(e)) => Err(PipelineError::Internal(e)),
        }
    }

    /// Caps context at the configured token budget, keeping the leading
    /// budgeted group. The upstream model's input ceiling is an external
    /// constraint; this only guards against grossly oversized documents.
    fn bound_context(&self, context: String) -> String {
        let budget = self.config.retrieval.max_context_tokens;
        if context.split_whitespace().count() <= budget {
            return context;
        }
        let chunks = split_text(&context, self.config.chunking.chunk_size);
        rebalance_by_token_budget(&chunks, budget)
            .into_iter()
            .next()
            .unwrap_or(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use anyhow::Result;
    use async_trait::async_trait;

    struct EchoLlm;

    #[async_trait]
    impl LlmClient for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(format!("echo: {}", prompt))
        }
    }

    fn test_config(dir: &std::path::Path) -> Arc<Config> {
        let toml = format!(
            "[server]\nbind = \"127.0.0.1:0\"\n[storage]\ndata_dir = \"{}\"\n",
            dir.display()
        );
        Arc::new(toml::from_str(&toml).unwrap())
    }

    fn pipeline(dir: &std::path::Path) -> RequestPipeline {
        RequestPipeline::new(test_config(dir), Box::new(EchoLlm)).unwrap()
    }

    #[tokio::test]
    async fn rejected_work_is_never_polled() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut limits = (*config).clone();
        limits.limits.rate_max_requests = 1;
        let p = RequestPipeline::new(Arc::new(limits), Box::new(EchoLlm)).unwrap();

        let ok: RequestOutcome<u32> = p.admit_and_run("c", || async { Ok(1) }).await;
        assert!(matches!(ok, RequestOutcome::Completed(1)));

        let rejected: RequestOutcome<u32> = p
            .admit_and_run("c", || async {
                panic!("work must not run after rejection")
            })
            .await;
        assert!(matches!(
            rejected,
            RequestOutcome::Rejected(RejectReason::RateLimited)
        ));
    }

    #[tokio::test]
    async fn gate_slot_released_after_rate_rejection_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut limits = (*config).clone();
        limits.limits.rate_max_requests = 2;
        limits.limits.max_concurrent_requests = 1;
        let p = RequestPipeline::new(Arc::new(limits), Box::new(EchoLlm)).unwrap();

        // Failed work must still release the gate slot.
        let failed: RequestOutcome<u32> = p
            .admit_and_run("c", || async {
                Err(PipelineError::Upstream("boom".to_string()))
            })
            .await;
        assert!(matches!(failed, RequestOutcome::Failed(_)));

        // Rate rejection (second slot) must also release the gate slot...
        let _ = p.admit_and_run::<u32, _, _>("c", || async { Ok(1) }).await;
        let limited: RequestOutcome<u32> = p.admit_and_run("c", || async { Ok(2) }).await;
        assert!(matches!(
            limited,
            RequestOutcome::Rejected(RejectReason::RateLimited)
        ));

        // ...so a different client still finds the ceiling free.
        let other: RequestOutcome<u32> = p.admit_and_run("other", || async { Ok(3) }).await;
        assert!(matches!(other, RequestOutcome::Completed(3)));
    }

    #[tokio::test]
    async fn upload_rejects_non_pdf_filename() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let out = p.upload("c", "notes.txt", b"hello".to_vec()).await;
        assert!(matches!(
            out,
            RequestOutcome::Failed(PipelineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn upload_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut small = (*config).clone();
        small.storage.max_pdf_bytes = 4;
        let p = RequestPipeline::new(Arc::new(small), Box::new(EchoLlm)).unwrap();
        let out = p.upload("c", "big.pdf", vec![0u8; 10]).await;
        assert!(matches!(
            out,
            RequestOutcome::Failed(PipelineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn upload_surfaces_parse_failure_as_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let out = p.upload("c", "bad.pdf", b"not a pdf".to_vec()).await;
        assert!(matches!(
            out,
            RequestOutcome::Failed(PipelineError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn chat_unknown_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let out = p.chat("c", "missing_id", "question", ChatMode::Retrieval).await;
        assert!(matches!(
            out,
            RequestOutcome::Failed(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn chat_empty_message_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let out = p.chat("c", "any", "   ", ChatMode::Retrieval).await;
        assert!(matches!(
            out,
            RequestOutcome::Failed(PipelineError::InvalidInput(_))
        ));
    }
}
