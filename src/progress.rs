use crate::error::ExtractionError;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lowest value emitted while work is in flight
pub const PROGRESS_FLOOR: u8 = 10;
/// Highest value emitted before the caller accepts the result
pub const PROGRESS_CEILING: u8 = 99;
pub const PROGRESS_DONE: u8 = 100;

/// Checkpoint after the PDF bytes are in memory
pub const PDF_BYTES_LOADED: f64 = 20.0;
/// Structured extraction fills [30, 70]
pub const STRUCTURED_BASE: f64 = 30.0;
pub const STRUCTURED_SPAN: f64 = 40.0;
/// OCR fills [70, 100)
pub const OCR_BASE: f64 = 70.0;

/// Progress after `pages_done` of `page_count` pages of structured extraction
pub fn structured_page_progress(pages_done: usize, page_count: usize) -> f64 {
    if page_count == 0 {
        return STRUCTURED_BASE + STRUCTURED_SPAN;
    }
    STRUCTURED_BASE + (pages_done as f64 / page_count as f64 * STRUCTURED_SPAN).round()
}

/// Progress while recognizing 1-based `page` of `page_count` at `fraction` in [0, 1]
pub fn ocr_page_progress(page: usize, page_count: usize, fraction: f32) -> f64 {
    if page_count == 0 {
        return OCR_BASE;
    }
    let fraction = f64::from(fraction.clamp(0.0, 1.0));
    let per_page = (100.0 - OCR_BASE) / page_count as f64;
    let overall = (OCR_BASE + per_page * ((page - 1) as f64 + fraction)).floor();
    overall.min(f64::from(PROGRESS_CEILING))
}

/// Byte-read progress of a text-like file, as a percentage
pub fn read_progress(loaded: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (loaded as f64 / total as f64 * 100.0).round()
}

/// Identifies one upload attempt. Goes stale once a newer attempt starts.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl UploadTicket {
    pub fn new(generation: u64, current: Arc<AtomicU64>) -> Self {
        UploadTicket { generation, current }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Make this ticket stale unless a newer attempt already did. Returns
    /// whether this call was the one that retired it.
    pub fn retire(&self) -> bool {
        self.current
            .compare_exchange(self.generation, self.generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Single integer progress channel for one extraction attempt.
///
/// In-flight reports are floored and clamped to [10, 99]; only `complete`
/// emits 100 and only `reset` emits 0. The channel does not enforce
/// monotonicity, each stage keeps its own sequence non-decreasing.
pub struct ProgressReporter<'a> {
    sink: Box<dyn FnMut(u8) + 'a>,
    last: Option<u8>,
    ticket: Option<UploadTicket>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: impl FnMut(u8) + 'a) -> Self {
        ProgressReporter {
            sink: Box::new(sink),
            last: None,
            ticket: None,
        }
    }

    /// Reporter that discards everything
    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    pub fn with_ticket(mut self, ticket: UploadTicket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }

    pub fn is_live(&self) -> bool {
        self.ticket.as_ref().is_none_or(UploadTicket::is_current)
    }

    /// Fails with `Superseded` once a newer upload has taken over
    pub fn ensure_live(&self) -> Result<(), ExtractionError> {
        if self.is_live() {
            Ok(())
        } else {
            debug!("Dropping stale extraction continuation");
            Err(ExtractionError::Superseded)
        }
    }

    pub fn report(&mut self, percent: f64) {
        let clamped = if percent.is_nan() {
            PROGRESS_FLOOR
        } else {
            percent
                .floor()
                .clamp(f64::from(PROGRESS_FLOOR), f64::from(PROGRESS_CEILING)) as u8
        };
        self.emit(clamped);
    }

    pub fn complete(&mut self) {
        self.emit(PROGRESS_DONE);
    }

    pub fn reset(&mut self) {
        self.emit(0);
    }

    fn emit(&mut self, value: u8) {
        if !self.is_live() || self.last == Some(value) {
            return;
        }
        self.last = Some(value);
        (self.sink)(value);
    }
}
