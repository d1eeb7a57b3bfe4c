//! HTTP Archive (HAR 1.2) model and serialization
//!
//! The logical schema the capture engine fills in, plus file/stream I/O.

pub mod io;
pub mod types;

pub use types::{
    format_timestamp, header_value, Content, Creator, Entry, Har, Header, Log, Page, PageTimings,
    PostData, Request, Response, HAR_VERSION, STATUS_UNRESOLVED,
};
