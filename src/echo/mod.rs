//! HTTP echo implementation.
//!
//! Every request, on any path and with any method, is answered with a
//! plain rendering of itself:
//!
//! ```text
//! <METHOD> <URL> <PROTOCOL>
//! Host: <host>
//! <name>: <value>
//! ...
//!
//! <body bytes>
//! ```
//!
//! Header names are lower-case. A header with several values produces one
//! line per value. The order of distinct header names follows the
//! transport and is not guaranteed. The body is copied verbatim, with no
//! decoding based on content type.

pub mod format;
pub mod handler;

pub use handler::handle;
