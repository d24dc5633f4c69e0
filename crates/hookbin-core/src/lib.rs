//! Hookbin Core - request classification, parsing, and live event fanout.
//!
//! This crate holds the transport- and storage-independent pieces of the
//! request inspector:
//!
//! - [`content`] - content type lookup and binary detection
//! - [`raw_request`] - raw HTTP text parsing and rendering
//! - [`client_ip`] - client IP resolution through proxy headers
//! - [`events`] - typed live events and their JSON envelope
//! - [`fanout`] - session and token channel subscriber registries

pub mod client_ip;
pub mod content;
pub mod events;
pub mod fanout;
pub mod model;
pub mod raw_request;

pub use client_ip::determine_client_ip;
pub use content::{
    classify_binary, classify_binary_strict, extract_content_type, resolve_content_type,
    DEFAULT_CONTENT_TYPE,
};
pub use events::{Event, TokenCreatedInfo, TokenRef, TokenResponseInfo};
pub use fanout::{ChannelKind, DeliveryError, Fanout, PublishReport, Subscriber, Subscription};
pub use model::{CapturedRequest, HeaderList};
pub use raw_request::{
    normalize_line_endings, parse_raw_request, render_raw_request, MalformedRequest,
    ParsedRequest,
};
