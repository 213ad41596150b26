//! Echo handler for the hyper service.

use bytes::{BufMut, Bytes, BytesMut};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Request, Response};
use std::convert::Infallible;
use std::fmt::Display;
use tracing::{debug, trace};

use super::format::format_request;

/// Handle a single HTTP request by echoing it back.
///
/// Always answers 200 with the formatted request as body. No content
/// type is set.
pub async fn handle<B>(req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body + Unpin,
    B::Error: Display,
{
    let (head, body) = req.into_parts();
    let body = read_body(body).await;

    debug!(
        method = %head.method,
        uri = %head.uri,
        body_len = body.len(),
        "Echoing request"
    );

    Ok(Response::new(Full::new(format_request(&head, &body))))
}

/// Read a request body to end of stream.
///
/// Trailers are skipped. A body error ends the read and whatever arrived
/// before it is returned.
pub async fn read_body<B>(mut body: B) -> Bytes
where
    B: Body + Unpin,
    B::Error: Display,
{
    let mut buffer = BytesMut::new();

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    buffer.put(data);
                }
            }
            Err(e) => {
                trace!(error = %e, "Body read stopped early");
                break;
            }
        }
    }

    buffer.freeze()
}
