use crate::classifier;
use crate::document::{Language, Provenance, UploadedFile};
use crate::error::ExtractionError;
use crate::ocr_engine::{OcrEngine, TesseractCli};
use crate::pipeline::DocumentPipeline;
use crate::preview::PreviewHandle;
use crate::progress::{ProgressReporter, UploadTicket};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of an upload session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub text: String,
    pub progress: u8,
    pub is_uploading: bool,
    pub show_preview: bool,
    pub file_name: String,
    pub file_type: String,
    pub provenance: Option<Provenance>,
    /// User-facing message from the last failed upload
    pub last_error: Option<String>,
    pub preview_url: Option<String>,
}

/// What gets handed to the analysis backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub content: String,
    pub pdf_url: Option<String>,
    pub mime: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    text: String,
    progress: u8,
    is_uploading: bool,
    show_preview: bool,
    file_name: String,
    file_type: String,
    provenance: Option<Provenance>,
    last_error: Option<String>,
}

/// One upload slot: at most one extraction commits at a time and at most one
/// preview handle is alive.
///
/// Starting an upload supersedes any upload still in flight; the stale one
/// stops at its next checkpoint and never touches the session state.
pub struct UploadSession<O = TesseractCli> {
    pipeline: Arc<DocumentPipeline<O>>,
    language: Mutex<Language>,
    generation: Arc<AtomicU64>,
    state: Mutex<SessionState>,
    preview: Mutex<Option<PreviewHandle>>,
}

impl<O: OcrEngine> UploadSession<O> {
    pub fn new(pipeline: Arc<DocumentPipeline<O>>, language: Language) -> Self {
        UploadSession {
            pipeline,
            language: Mutex::new(language),
            generation: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(SessionState::default()),
            preview: Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &DocumentPipeline<O> {
        &self.pipeline
    }

    pub fn language(&self) -> Language {
        *self.language.lock()
    }

    pub fn set_language(&self, language: Language) {
        *self.language.lock() = language;
    }

    /// Extract `file` into this session, superseding any upload in flight
    pub async fn upload<F>(&self, file: UploadedFile, mut on_progress: F) -> Result<SessionSnapshot, ExtractionError>
    where
        F: FnMut(u8),
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = UploadTicket::new(generation, Arc::clone(&self.generation));
        info!("Upload #{} started: {}", generation, file.name());

        // Release the previous handle before the pipeline can acquire a new one
        self.preview.lock().take();
        {
            let mut state = self.state.lock();
            state.text.clear();
            state.progress = 0;
            state.is_uploading = true;
            state.show_preview = false;
            state.file_name = file.name().to_string();
            state.file_type = classifier::file_type_label(file.name(), file.mime());
            state.provenance = None;
            state.last_error = None;
        }

        let mut in_flight = InFlight {
            ticket: ticket.clone(),
            state: &self.state,
            settled: false,
        };

        let language = self.language();
        let result = {
            let state = &self.state;
            let mut reporter = ProgressReporter::new(|percent| {
                state.lock().progress = percent;
                on_progress(percent);
            })
            .with_ticket(ticket.clone());
            self.pipeline
                .extract_with_reporter(&file, language, &mut reporter)
                .await
        };
        in_flight.settled = true;

        if !ticket.is_current() {
            debug!("Upload #{} superseded, discarding its result", generation);
            return Err(ExtractionError::Superseded);
        }

        match result {
            Ok(document) => {
                {
                    let mut state = self.state.lock();
                    state.text = document.text;
                    state.provenance = Some(document.provenance);
                    state.file_type = document.file_type;
                    state.progress = 100;
                    state.is_uploading = false;
                    state.show_preview = true;
                }
                *self.preview.lock() = document.preview;
                info!("Upload #{} complete", generation);
                Ok(self.snapshot())
            }
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    state.text.clear();
                    state.progress = 0;
                    state.is_uploading = false;
                    state.show_preview = false;
                    state.provenance = None;
                    state.last_error = Some(e.user_message().to_string());
                }
                self.preview.lock().take();
                if e.is_unreadable_input() {
                    warn!("Upload #{} rejected: {}", generation, e);
                } else {
                    error!("Upload #{} failed: {}", generation, e);
                }
                Err(e)
            }
        }
    }

    /// Abandon any upload in flight. Committed text is left alone.
    pub fn cancel(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        if state.is_uploading {
            info!("Upload cancelled (generation now {})", generation);
            state.is_uploading = false;
            state.progress = 0;
        }
    }

    /// Replace the staged text, e.g. pasted or edited by the user
    pub fn set_text(&self, text: impl Into<String>) {
        let mut state = self.state.lock();
        state.text = text.into();
        state.show_preview = true;
        if state.provenance.is_none() {
            state.provenance = Some(Provenance::Direct);
        }
    }

    /// Close the review step and drop the staged text
    pub fn dismiss(&self) {
        let mut state = self.state.lock();
        state.text.clear();
        state.show_preview = false;
    }

    /// Package the staged text for analysis; `None` when there is nothing to send
    pub fn submit(&self) -> Option<Submission> {
        let state = self.state.lock();
        if state.text.trim().is_empty() {
            return None;
        }
        Some(Submission {
            content: state.text.clone(),
            pdf_url: self.preview.lock().as_ref().map(|handle| handle.url().to_string()),
            mime: (!state.file_type.is_empty()).then(|| state.file_type.clone()),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            text: state.text.clone(),
            progress: state.progress,
            is_uploading: state.is_uploading,
            show_preview: state.show_preview,
            file_name: state.file_name.clone(),
            file_type: state.file_type.clone(),
            provenance: state.provenance,
            last_error: state.last_error.clone(),
            preview_url: self.preview.lock().as_ref().map(|handle| handle.url().to_string()),
        }
    }
}

/// Clears the uploading state if an `upload` future is dropped before it settles
struct InFlight<'s> {
    ticket: UploadTicket,
    state: &'s Mutex<SessionState>,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled || !self.ticket.retire() {
            return;
        }
        info!("Upload #{} dropped before it finished", self.ticket.generation());
        let mut state = self.state.lock();
        state.is_uploading = false;
        state.progress = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::test_support::{MockBackend, MockOcr};
    use std::cell::RefCell;

    const CLAUSE: &str = "The Licensee shall not sublet the premises without prior written consent.";

    fn session(backend: MockBackend, ocr: MockOcr) -> UploadSession<MockOcr> {
        let pipeline = DocumentPipeline::new(ExtractionConfig::default(), Box::new(backend), ocr);
        UploadSession::new(Arc::new(pipeline), Language::En)
    }

    fn pdf(name: &str) -> UploadedFile {
        UploadedFile::new(name, "application/pdf", b"%PDF-1.4".to_vec())
    }

    fn text(name: &str, body: &str) -> UploadedFile {
        UploadedFile::new(name, "text/plain", body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_pdf_upload_and_submit() {
        let session = session(MockBackend::with_pages(&[&[CLAUSE]]), MockOcr::default());

        let snapshot = session.upload(pdf("licence.pdf"), |_| {}).await.unwrap();
        assert_eq!(snapshot.text, CLAUSE);
        assert_eq!(snapshot.progress, 100);
        assert!(!snapshot.is_uploading);
        assert!(snapshot.show_preview);
        assert_eq!(snapshot.provenance, Some(Provenance::Structured));
        let url = snapshot.preview_url.clone().unwrap();
        assert!(session.pipeline().previews().resolve(&url).is_some());

        let submission = session.submit().unwrap();
        assert_eq!(submission.content, CLAUSE);
        assert_eq!(submission.pdf_url, Some(url));
        assert_eq!(submission.mime.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn test_new_upload_releases_previous_handle() {
        let session = session(MockBackend::with_pages(&[&[CLAUSE]]), MockOcr::default());
        let store = session.pipeline().previews().clone();

        let first = session.upload(pdf("a.pdf"), |_| {}).await.unwrap();
        let second = session.upload(pdf("b.pdf"), |_| {}).await.unwrap();

        assert!(store.resolve(first.preview_url.as_deref().unwrap()).is_none());
        assert!(store.resolve(second.preview_url.as_deref().unwrap()).is_some());
        assert_eq!(store.live_count(), 1);

        session.upload(text("notes.txt", "plain"), |_| {}).await.unwrap();
        assert_eq!(store.live_count(), 0);
        assert!(session.snapshot().preview_url.is_none());
    }

    #[tokio::test]
    async fn test_failure_resets_state() {
        let session = session(MockBackend::corrupt(), MockOcr::default());
        let store = session.pipeline().previews().clone();
        session.set_text("stale pasted text");
        let seen = RefCell::new(Vec::new());

        let err = session
            .upload(pdf("broken.pdf"), |p| seen.borrow_mut().push(p))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::PdfLoadError(_)));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.text, "");
        assert_eq!(snapshot.progress, 0);
        assert!(!snapshot.is_uploading);
        assert!(snapshot.preview_url.is_none());
        assert!(snapshot.last_error.unwrap().contains("Could not extract text from PDF"));
        assert_eq!(store.live_count(), 0);
        assert_eq!(seen.borrow().last(), Some(&0));
        assert!(session.submit().is_none());
    }

    #[tokio::test]
    async fn test_superseded_upload_never_commits() {
        let ocr = MockOcr::default();
        let session = session(MockBackend::scanned(3), ocr);
        let store = session.pipeline().previews().clone();
        let first_progress = RefCell::new(Vec::new());

        let (first, second) = tokio::join!(
            session.upload(pdf("scan.pdf"), |p| first_progress.borrow_mut().push(p)),
            async {
                tokio::task::yield_now().await;
                session.upload(text("reply.txt", "Hello world"), |_| {}).await
            }
        );

        assert!(matches!(first, Err(ExtractionError::Superseded)));
        let second = second.unwrap();
        assert_eq!(second.text, "Hello world");
        assert_eq!(second.provenance, Some(Provenance::Direct));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.text, "Hello world");
        assert_eq!(snapshot.file_name, "reply.txt");
        assert_eq!(snapshot.progress, 100);
        assert!(snapshot.last_error.is_none());

        let first_progress = first_progress.borrow();
        assert!(!first_progress.contains(&100));
        assert!(!first_progress.contains(&0));
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_discards_in_flight_upload() {
        let ocr = MockOcr::default();
        let session = session(MockBackend::scanned(3), ocr.clone());

        let (result, _) = tokio::join!(session.upload(pdf("scan.pdf"), |_| {}), async {
            tokio::task::yield_now().await;
            session.cancel();
        });

        assert!(matches!(result, Err(ExtractionError::Superseded)));
        let snapshot = session.snapshot();
        assert!(!snapshot.is_uploading);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(snapshot.text, "");
        assert!(ocr.call_count() < 3);
    }

    #[tokio::test]
    async fn test_dropped_upload_future_clears_uploading_state() {
        let ocr = MockOcr::default();
        let session = session(MockBackend::scanned(3), ocr.clone());
        let store = session.pipeline().previews().clone();

        let mut upload = Box::pin(session.upload(pdf("scan.pdf"), |_| {}));
        tokio::select! {
            biased;
            _ = &mut upload => panic!("upload should still be running"),
            _ = async {
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
            } => {}
        }

        let mid_flight = session.snapshot();
        assert!(mid_flight.is_uploading);
        assert!(mid_flight.progress > 0);

        drop(upload);
        let snapshot = session.snapshot();
        assert!(!snapshot.is_uploading);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(snapshot.text, "");
        assert_eq!(store.live_count(), 0);

        // The slot is usable again
        let next = session.upload(text("reply.txt", "Hello world"), |_| {}).await.unwrap();
        assert_eq!(next.text, "Hello world");
        assert_eq!(next.progress, 100);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_keeps_committed_result() {
        let session = session(MockBackend::default(), MockOcr::default());
        session.upload(text("notes.txt", "Hello world"), |_| {}).await.unwrap();

        session.cancel();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.text, "Hello world");
        assert_eq!(snapshot.progress, 100);
        assert!(snapshot.show_preview);
        assert!(!snapshot.is_uploading);
    }

    #[tokio::test]
    async fn test_paste_dismiss_and_submit() {
        let session = session(MockBackend::default(), MockOcr::default());
        assert!(session.submit().is_none());

        session.set_text("   ");
        assert!(session.submit().is_none());

        session.set_text("Clause 4: Termination with 30 days notice.");
        let submission = session.submit().unwrap();
        assert_eq!(submission.content, "Clause 4: Termination with 30 days notice.");
        assert!(submission.pdf_url.is_none());
        assert!(submission.mime.is_none());
        assert_eq!(session.snapshot().provenance, Some(Provenance::Direct));

        session.dismiss();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.text, "");
        assert!(!snapshot.show_preview);
    }

    #[tokio::test]
    async fn test_dropping_session_releases_preview() {
        let session = session(MockBackend::with_pages(&[&[CLAUSE]]), MockOcr::default());
        let store = session.pipeline().previews().clone();

        session.upload(pdf("a.pdf"), |_| {}).await.unwrap();
        assert_eq!(store.live_count(), 1);

        drop(session);
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn test_language_is_switchable() {
        let session = session(MockBackend::default(), MockOcr::default());
        assert_eq!(session.language(), Language::En);
        session.set_language(Language::Hi);
        assert_eq!(session.language(), Language::Hi);
    }
}
