#![doc = "msgraph-convert-core: core contracts and pipeline for msgraph-convert."]

//! This crate holds the transport-agnostic half of the converter: configuration
//! types, the credential and drive-transfer capabilities, token caching, the
//! large-file slice uploader and the [`convert::PdfConverter`] pipeline.
//! HTTP implementations of the capabilities live in the `msgraph-convert` crate.
//!
//! # Usage
//! Depend on this crate to drive conversions with your own transport, or to test
//! code against the `Mock*` capabilities exported under the default
//! `test-export-mocks` feature.

pub mod config;
pub mod contract;
pub mod convert;
pub mod error;
pub mod job;
pub mod large_upload;
pub mod token_cache;

pub use config::{AuthConfig, ConverterSettings, TokenEndpoint};
pub use contract::{AccessToken, CredentialProvider, FileTransferClient, SliceOutcome, UploadSession};
pub use convert::{ConversionSource, PdfConverter};
pub use error::{AuthenticationError, ConfigError, ConversionError, TransportError};
pub use token_cache::CachedCredential;
