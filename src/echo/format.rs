//! Echo response formatting.

use bytes::{BufMut, Bytes, BytesMut};
use hyper::header::HOST;
use hyper::http::request::Parts;

/// Render a request head and its body as the echo response body.
///
/// Pure function of its inputs: the same head and body always produce
/// the same bytes.
pub fn format_request(head: &Parts, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(256 + body.len());

    // `Version`'s Debug form is the protocol token, e.g. "HTTP/1.1"
    out.put_slice(format!("{} {} {:?}\n", head.method, head.uri, head.version).as_bytes());

    out.put_slice(b"Host: ");
    out.put_slice(host(head));
    out.put_u8(b'\n');

    // Names are stored lower-case by the header map
    for name in head.headers.keys() {
        if name == HOST {
            continue;
        }
        for value in head.headers.get_all(name) {
            out.put_slice(name.as_str().as_bytes());
            out.put_slice(b": ");
            out.put_slice(value.as_bytes());
            out.put_u8(b'\n');
        }
    }

    out.put_slice(b"\n\n");
    out.put_slice(body);

    out.freeze()
}

/// Host header value, falling back to the authority of an absolute URI.
fn host(head: &Parts) -> &[u8] {
    head.headers
        .get(HOST)
        .map(|value| value.as_bytes())
        .or_else(|| head.uri.authority().map(|auth| auth.as_str().as_bytes()))
        .unwrap_or_default()
}
