//! High-level pipeline: authenticate → upload → convert-download → delete.
//!
//! [`PdfConverter`] is the public entry point. It accepts any
//! [`ConversionSource`] (bytes, a file path, or an async byte stream), uploads it
//! to a uniquely named temporary item in the configured site drive, fetches that
//! item back with `format=pdf`, and removes the temporary item.
//!
//! # Responsibilities
//! - Strictly sequential: each step depends on the previous one having finished.
//! - The temporary item is a scoped resource: once the upload completed, a
//!   delete is attempted on every exit path. A failed delete is logged and never
//!   changes the result. If the upload did not complete, no delete is attempted.
//! - Files above `large_file_threshold` go through an upload session (see
//!   [`crate::large_upload`]); smaller ones use a single PUT.
//! - A drive call rejected with HTTP 401 triggers one token refresh and one retry
//!   of that call.
//!
//! # Error Handling
//! Every failure surfaces as one [`ConversionError`] carrying the original cause.

use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn};

use crate::config::ConverterSettings;
use crate::contract::{AccessToken, CredentialProvider, FileTransferClient, UploadSession};
use crate::error::{ConversionError, TransportError};
use crate::job::{resolve_extension, ConversionJob};
use crate::large_upload::{log_progress, ProgressCallback, SliceUpload};

/// Magic bytes every PDF starts with.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// What to convert.
pub enum ConversionSource {
    Bytes(Vec<u8>),
    /// Read from disk; the file name suffix supplies the extension when none is given.
    File(PathBuf),
    /// Any async reader. With `length` known, large inputs are sliced straight
    /// from the reader; otherwise the stream is buffered first.
    Stream {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        length: Option<u64>,
    },
}

impl ConversionSource {
    fn file_name(&self) -> Option<&Path> {
        match self {
            ConversionSource::File(path) => Some(path.as_path()),
            _ => None,
        }
    }
}

impl fmt::Debug for ConversionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionSource::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            ConversionSource::File(p) => f.debug_tuple("File").field(p).finish(),
            ConversionSource::Stream { length, .. } => {
                f.debug_struct("Stream").field("length", length).finish()
            }
        }
    }
}

/// Input after resolution: either fully in memory or a reader of known size.
enum Payload {
    InMemory(Vec<u8>),
    Reader {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        size: u64,
    },
}

impl Payload {
    fn size(&self) -> u64 {
        match self {
            Payload::InMemory(bytes) => bytes.len() as u64,
            Payload::Reader { size, .. } => *size,
        }
    }
}

pub struct PdfConverter<C, T> {
    credentials: C,
    transfer: T,
    settings: ConverterSettings,
    progress: ProgressCallback,
}

impl<C, T> PdfConverter<C, T>
where
    C: CredentialProvider,
    T: FileTransferClient,
{
    pub fn new(
        credentials: C,
        transfer: T,
        settings: ConverterSettings,
    ) -> Result<Self, ConversionError> {
        settings.validate()?;
        settings.trace_loaded();
        Ok(Self {
            credentials,
            transfer,
            settings,
            progress: log_progress(),
        })
    }

    /// Replace the per-slice progress callback used on the upload-session path.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &ConverterSettings {
        &self.settings
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    pub async fn convert_bytes(
        &self,
        bytes: Vec<u8>,
        extension: Option<&str>,
    ) -> Result<Vec<u8>, ConversionError> {
        self.convert(ConversionSource::Bytes(bytes), extension).await
    }

    pub async fn convert_file(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, ConversionError> {
        self.convert(ConversionSource::File(path.as_ref().to_path_buf()), None)
            .await
    }

    pub async fn convert_stream<R>(
        &self,
        reader: R,
        extension: Option<&str>,
    ) -> Result<Vec<u8>, ConversionError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let source = ConversionSource::Stream {
            reader: Box::new(reader),
            length: None,
        };
        self.convert(source, extension).await
    }

    /// Converts one document to PDF bytes.
    pub async fn convert(
        &self,
        source: ConversionSource,
        extension: Option<&str>,
    ) -> Result<Vec<u8>, ConversionError> {
        let extension = resolve_extension(extension, source.file_name());
        debug!(?source, %extension, "[CONVERT] Resolving input");
        let payload = self.load(source).await?;
        let job = ConversionJob::new(&extension, payload.size())?;

        info!(
            temp_name = %job.temp_name,
            size = job.size,
            media_type = job.media_type,
            "[CONVERT] Starting conversion"
        );

        let mut token = self.credentials.get_token().await.map_err(|e| {
            error!(error = %e, "[CONVERT][ERROR] Authentication failed");
            ConversionError::from(e)
        })?;

        self.upload(&mut token, &job, payload).await?;
        info!(temp_name = %job.temp_name, "[CONVERT] Upload complete");

        let result = self.download(&mut token, &job).await;
        self.cleanup(&mut token, &job).await;

        let pdf = result?;
        if !pdf.starts_with(PDF_MAGIC) {
            let magic = pdf.iter().take(8).copied().collect();
            error!(?magic, "[CONVERT][ERROR] Downloaded bytes are not a PDF");
            return Err(ConversionError::NotAPdf { magic });
        }
        info!(temp_name = %job.temp_name, bytes = pdf.len(), "[CONVERT] Conversion complete");
        Ok(pdf)
    }

    async fn load(&self, source: ConversionSource) -> Result<Payload, ConversionError> {
        match source {
            ConversionSource::Bytes(bytes) => Ok(Payload::InMemory(bytes)),
            ConversionSource::File(path) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    error!(error = ?e, path = %path.display(), "[CONVERT][ERROR] Cannot open input file");
                    e
                })?;
                let size = file.metadata().await?.len();
                if size > self.settings.large_file_threshold {
                    Ok(Payload::Reader {
                        reader: Box::new(file),
                        size,
                    })
                } else {
                    let mut bytes = Vec::with_capacity(size as usize);
                    let mut file = file;
                    file.read_to_end(&mut bytes).await?;
                    Ok(Payload::InMemory(bytes))
                }
            }
            ConversionSource::Stream {
                reader,
                length: Some(size),
            } if size > self.settings.large_file_threshold => {
                Ok(Payload::Reader { reader, size })
            }
            ConversionSource::Stream { mut reader, .. } => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes).await?;
                Ok(Payload::InMemory(bytes))
            }
        }
    }

    async fn upload(
        &self,
        token: &mut AccessToken,
        job: &ConversionJob,
        payload: Payload,
    ) -> Result<(), ConversionError> {
        if job.size <= self.settings.large_file_threshold {
            let bytes = match payload {
                Payload::InMemory(bytes) => bytes,
                Payload::Reader { mut reader, .. } => {
                    let mut bytes = Vec::with_capacity(job.size as usize);
                    reader.read_to_end(&mut bytes).await?;
                    bytes
                }
            };
            info!(temp_name = %job.temp_name, "[UPLOAD] Single PUT upload");
            let first = self
                .transfer
                .upload(token, &job.temp_name, job.media_type, &bytes)
                .await;
            let outcome = match first {
                Err(e) if e.is_unauthorized() => {
                    self.refresh(token).await?;
                    self.transfer
                        .upload(token, &job.temp_name, job.media_type, &bytes)
                        .await
                }
                other => other,
            };
            return outcome.map_err(|e| {
                error!(error = %e, temp_name = %job.temp_name, "[UPLOAD][ERROR] Upload failed");
                ConversionError::Upload {
                    temp_name: job.temp_name.clone(),
                    source: e,
                }
            });
        }

        info!(temp_name = %job.temp_name, "[UPLOAD] Creating upload session");
        let session = self.create_session(token, job).await?;
        let progress = self.progress.clone();
        let slices = SliceUpload {
            transfer: &self.transfer,
            session: &session,
            slice_size: self.settings.slice_size,
            max_attempts: self.settings.max_slice_attempts,
            progress: &progress,
        };
        match payload {
            Payload::InMemory(bytes) => {
                let mut reader = std::io::Cursor::new(bytes);
                slices.run(job, &mut reader).await
            }
            Payload::Reader { mut reader, .. } => slices.run(job, &mut reader).await,
        }
    }

    async fn create_session(
        &self,
        token: &mut AccessToken,
        job: &ConversionJob,
    ) -> Result<UploadSession, ConversionError> {
        let first = self
            .transfer
            .create_upload_session(token, &job.temp_name)
            .await;
        let outcome = match first {
            Err(e) if e.is_unauthorized() => {
                self.refresh(token).await?;
                self.transfer
                    .create_upload_session(token, &job.temp_name)
                    .await
            }
            other => other,
        };
        outcome.map_err(|e| {
            error!(error = %e, temp_name = %job.temp_name, "[UPLOAD][ERROR] Could not create upload session");
            ConversionError::Upload {
                temp_name: job.temp_name.clone(),
                source: e,
            }
        })
    }

    async fn download(
        &self,
        token: &mut AccessToken,
        job: &ConversionJob,
    ) -> Result<Vec<u8>, ConversionError> {
        info!(temp_name = %job.temp_name, "[CONVERT] Requesting PDF rendition");
        let first = self.transfer.download_converted(token, &job.temp_name).await;
        let outcome = match first {
            Err(e) if e.is_unauthorized() => {
                self.refresh(token).await?;
                self.transfer.download_converted(token, &job.temp_name).await
            }
            other => other,
        };
        outcome.map_err(|e| {
            error!(error = %e, temp_name = %job.temp_name, "[CONVERT][ERROR] Download failed");
            match e {
                TransportError::Status { status, body, .. } => ConversionError::Rejected {
                    temp_name: job.temp_name.clone(),
                    status,
                    body,
                },
                other => ConversionError::Download {
                    temp_name: job.temp_name.clone(),
                    source: other,
                },
            }
        })
    }

    /// Best effort: failures are logged, never returned.
    async fn cleanup(&self, token: &mut AccessToken, job: &ConversionJob) {
        let mut outcome = self.transfer.delete(token, &job.temp_name).await;
        if matches!(&outcome, Err(e) if e.is_unauthorized()) {
            match self.refresh(token).await {
                Ok(()) => outcome = self.transfer.delete(token, &job.temp_name).await,
                Err(e) => {
                    warn!(error = %e, temp_name = %job.temp_name, "[CONVERT] Token refresh for cleanup failed; temporary item left behind");
                    return;
                }
            }
        }
        match outcome {
            Ok(()) => debug!(temp_name = %job.temp_name, "[CONVERT] Temporary item deleted"),
            Err(e) => {
                warn!(error = %e, temp_name = %job.temp_name, "[CONVERT] Could not delete temporary item")
            }
        }
    }

    async fn refresh(&self, token: &mut AccessToken) -> Result<(), ConversionError> {
        warn!("[AUTH] Drive rejected token, refreshing");
        self.credentials.invalidate().await;
        *token = self.credentials.get_token().await?;
        Ok(())
    }
}
