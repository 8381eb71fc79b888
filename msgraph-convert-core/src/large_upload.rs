//! Upload-session path for files above the simple-PUT limit.
//!
//! Once a session exists the source is read sequentially in `slice_size` chunks
//! (the last one may be shorter) and each chunk is PUT to the session URL with
//! its byte range. A slice that fails is retried up to `max_attempts` times; if
//! it still fails the session is cancelled (best effort) and the whole upload
//! aborts. A source shorter or longer than the declared size is an input error
//! and is detected before the final slice is sent. The drive item only
//! materialises when the final slice completes, so a failed upload leaves
//! nothing to delete.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn};

use crate::contract::{FileTransferClient, SliceOutcome, UploadSession};
use crate::error::{ConversionError, TransportError};
use crate::job::ConversionJob;

/// Called with `(bytes_uploaded, total_bytes)` after every accepted slice.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Default progress reporting: one log line per slice.
pub fn log_progress() -> ProgressCallback {
    Arc::new(|current, max| {
        info!(
            uploaded = current,
            total = max,
            "[SLICE] uploaded {} bytes of {} total bytes",
            current,
            max
        )
    })
}

/// Byte ranges `[start, end)` a `total`-byte upload is split into.
pub fn slice_ranges(total: u64, slice_size: usize) -> Vec<(u64, u64)> {
    let step = slice_size as u64;
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + step).min(total);
        ranges.push((start, end));
        start = end;
    }
    ranges
}

pub struct SliceUpload<'a, T: ?Sized> {
    pub transfer: &'a T,
    pub session: &'a UploadSession,
    pub slice_size: usize,
    pub max_attempts: u32,
    pub progress: &'a ProgressCallback,
}

impl<'a, T> SliceUpload<'a, T>
where
    T: FileTransferClient + ?Sized,
{
    /// Streams `job.size` bytes from `reader` through the session.
    pub async fn run<R>(&self, job: &ConversionJob, reader: &mut R) -> Result<(), ConversionError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let total = job.size;
        let ranges = slice_ranges(total, self.slice_size);
        info!(
            temp_name = %job.temp_name,
            total,
            slices = ranges.len(),
            slice_size = self.slice_size,
            "[SLICE] Starting sliced upload"
        );

        let mut buf = vec![0u8; self.slice_size];
        let last_index = ranges.len().saturating_sub(1);

        for (index, (start, end)) in ranges.iter().copied().enumerate() {
            let len = (end - start) as usize;
            if let Err(e) = reader.read_exact(&mut buf[..len]).await {
                error!(error = ?e, offset = start, "[SLICE][ERROR] Source ended before declared size");
                self.cancel().await;
                return Err(ConversionError::Input(e));
            }
            // The final slice commits the item, so overlong input must be caught before it goes out.
            if index == last_index {
                if let Err(e) = self.expect_end(reader, total).await {
                    self.cancel().await;
                    return Err(ConversionError::Input(e));
                }
            }

            let outcome = self.upload_with_retry(job, start, total, &buf[..len]).await?;
            let is_last = index == last_index;
            match (outcome, is_last) {
                (SliceOutcome::Accepted { next_expected_ranges }, false) => {
                    debug!(?next_expected_ranges, offset = start, "[SLICE] Slice accepted");
                }
                (SliceOutcome::Completed, true) => {
                    debug!(offset = start, "[SLICE] Final slice completed the item");
                }
                (SliceOutcome::Completed, false) => {
                    return self
                        .abort(job, start, "service reported completion before the final slice")
                        .await;
                }
                (SliceOutcome::Accepted { next_expected_ranges }, true) => {
                    let detail = format!(
                        "service still expects ranges {next_expected_ranges:?} after the final slice"
                    );
                    return self.abort(job, start, &detail).await;
                }
            }
            (self.progress)(end, total);
        }

        info!(temp_name = %job.temp_name, total, "[SLICE] Sliced upload complete");
        Ok(())
    }

    async fn expect_end<R>(&self, reader: &mut R, total: u64) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut extra = [0u8; 1];
        let n = reader.read(&mut extra).await.map_err(|e| {
            error!(error = ?e, "[SLICE][ERROR] Could not confirm end of source");
            e
        })?;
        if n > 0 {
            error!(declared = total, "[SLICE][ERROR] Source is longer than declared size");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("source holds more than the declared {total} bytes"),
            ));
        }
        Ok(())
    }

    async fn upload_with_retry(
        &self,
        job: &ConversionJob,
        offset: u64,
        total: u64,
        content: &[u8],
    ) -> Result<SliceOutcome, ConversionError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .transfer
                .upload_slice(self.session, offset, total, content)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < self.max_attempts => {
                    warn!(error = %e, offset, attempt, "[SLICE] Slice upload failed, retrying");
                }
                Err(e) => {
                    error!(error = %e, offset, attempt, "[SLICE][ERROR] Slice retries exhausted");
                    self.cancel().await;
                    return Err(ConversionError::SliceUploadFailed {
                        temp_name: job.temp_name.clone(),
                        offset,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    async fn abort(
        &self,
        job: &ConversionJob,
        offset: u64,
        detail: &str,
    ) -> Result<(), ConversionError> {
        error!(offset, detail, "[SLICE][ERROR] Unexpected upload session state");
        self.cancel().await;
        Err(ConversionError::Upload {
            temp_name: job.temp_name.clone(),
            source: TransportError::MalformedResponse {
                operation: "upload slice",
                detail: detail.to_string(),
            },
        })
    }

    async fn cancel(&self) {
        if let Err(e) = self.transfer.cancel_upload_session(self.session).await {
            warn!(error = %e, "[SLICE] Could not cancel upload session");
        }
    }
}
