//! getr Core - Download Engine
//!
//! This crate owns the download registry and its status state machine,
//! throttled progress estimation, per-start completion futures and
//! destination resolution. Network I/O sits behind the [`Transport`] trait;
//! [`HttpTransport`] is the reqwest-backed implementation.

mod completion;
pub mod config;
mod destination;
mod error;
mod estimator;
mod manager;
mod request;
mod transport;

pub use completion::*;
pub use destination::*;
pub use error::*;
pub use estimator::{Clock, ProgressEstimator, SystemClock};
pub use manager::*;
pub use request::*;
pub use transport::*;

pub use getr_types as types;
pub use getr_types::{
    CompletionEvent, DownloadInfo, DownloadRequest, DownloadStatus, KnownFolders, ManagerEvent,
    ProgressEvent, Query, Settings,
};
