//! Response recorder helpers.
//!
//! Bodies are drained into memory so status, headers and bytes can be
//! inspected before they are handed on; a fresh body is then rebuilt from the
//! same bytes, followed by the original error if the stream failed. Memory use
//! per in-flight request is therefore proportional to the body size.
//!
//! [`on_complete`] defers work until the client side has consumed a body,
//! failed on it, or dropped it.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::header::HOST;
use axum::http::request::Parts;
use futures::stream;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;

/// Reported when a body is dropped before it was fully written.
pub const BODY_NOT_WRITTEN: &str = "connection closed before the response body was written";

/// A drained body: every byte read, plus the error that ended the stream early.
#[derive(Debug)]
pub struct Captured {
    pub bytes: Bytes,
    pub error: Option<axum::Error>,
}

impl Captured {
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// A new body yielding the captured bytes, then the captured error.
    pub fn replay(self) -> Body {
        match self.error {
            None => Body::from(self.bytes),
            Some(err) => {
                let mut chunks = Vec::with_capacity(2);
                if !self.bytes.is_empty() {
                    chunks.push(Ok(self.bytes));
                }
                chunks.push(Err(err));
                Body::from_stream(stream::iter(chunks))
            }
        }
    }
}

/// Drain `body` frame by frame. Bytes read before an error are kept. Trailers
/// are not captured.
pub async fn buffer_body(mut body: Body) -> Captured {
    let mut buf = Vec::new();
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    buf.extend_from_slice(data);
                }
            }
            Err(err) => {
                return Captured {
                    bytes: Bytes::from(buf),
                    error: Some(err),
                };
            }
        }
    }

    Captured {
        bytes: Bytes::from(buf),
        error: None,
    }
}

type Completion = Box<dyn FnOnce(Option<String>) + Send>;

/// Wrap `body` so `done` runs exactly once: with `None` after the last frame
/// was handed out, or with the error text when the stream fails or the body
/// is dropped before it ends.
pub fn on_complete<F>(body: Body, done: F) -> Body
where
    F: FnOnce(Option<String>) + Send + 'static,
{
    Body::new(CompletionBody {
        inner: body,
        done: Some(Box::new(done)),
    })
}

struct CompletionBody {
    inner: Body,
    done: Option<Completion>,
}

impl CompletionBody {
    fn finish(&mut self, error: Option<String>) {
        if let Some(done) = self.done.take() {
            done(error);
        }
    }
}

impl HttpBody for CompletionBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(None) => this.finish(None),
            Poll::Ready(Some(Err(err))) => this.finish(Some(err.to_string())),
            Poll::Ready(Some(Ok(_))) | Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CompletionBody {
    fn drop(&mut self) {
        // The server stops polling once the inner body reports its end.
        let error = (!self.inner.is_end_stream()).then(|| BODY_NOT_WRITTEN.to_string());
        self.finish(error);
    }
}

/// `Host` header, falling back to the URI authority.
pub fn request_host(parts: &Parts) -> String {
    parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

/// Join accumulated error messages; `None` when there are none.
pub fn join_errors(errors: &[String]) -> Option<String> {
    if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn failing_body() -> Body {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
        ];
        Body::from_stream(stream::iter(chunks))
    }

    type Outcomes = Arc<Mutex<Vec<Option<String>>>>;

    fn recorded(body: Body) -> (Body, Outcomes) {
        let outcomes: Outcomes = Arc::default();
        let sink = outcomes.clone();
        let body = on_complete(body, move |err| sink.lock().unwrap().push(err));
        (body, outcomes)
    }

    #[tokio::test]
    async fn test_buffer_and_replay_preserve_bytes() {
        let captured = buffer_body(Body::from("hello world")).await;
        assert!(captured.error.is_none());

        let again = buffer_body(captured.replay()).await;
        assert_eq!(again.bytes, Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_buffer_keeps_bytes_read_before_an_error() {
        let captured = buffer_body(failing_body()).await;
        assert_eq!(captured.bytes, Bytes::from_static(b"partial"));
        assert!(captured.error_message().unwrap().contains("peer reset"));
    }

    #[tokio::test]
    async fn test_replay_yields_partial_bytes_then_the_same_error() {
        let replayed = buffer_body(failing_body()).await.replay();

        let again = buffer_body(replayed).await;
        assert_eq!(again.bytes, Bytes::from_static(b"partial"));
        assert!(again.error_message().unwrap().contains("peer reset"));
    }

    #[tokio::test]
    async fn test_completion_runs_after_last_frame() {
        let (body, outcomes) = recorded(Body::from("done"));
        assert!(outcomes.lock().unwrap().is_empty());

        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"done");
        assert_eq!(*outcomes.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_completion_reports_stream_errors_once() {
        let (body, outcomes) = recorded(failing_body());

        assert!(to_bytes(body, usize::MAX).await.is_err());
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].as_deref().unwrap().contains("peer reset"));
    }

    #[test]
    fn test_completion_reports_unread_drop() {
        let (body, outcomes) = recorded(Body::from("never sent"));
        drop(body);
        assert_eq!(
            *outcomes.lock().unwrap(),
            vec![Some(BODY_NOT_WRITTEN.to_string())]
        );
    }

    #[test]
    fn test_completion_of_empty_body_on_drop() {
        let (body, outcomes) = recorded(Body::empty());
        drop(body);
        assert_eq!(*outcomes.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_request_host() {
        let (parts, _) = Request::builder()
            .uri("http://api.example.com/orders")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(request_host(&parts), "api.example.com");

        let (parts, _) = Request::builder()
            .uri("/orders")
            .header("host", "localhost:8080")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(request_host(&parts), "localhost:8080");
    }

    #[test]
    fn test_join_errors() {
        assert_eq!(join_errors(&[]), None);
        assert_eq!(
            join_errors(&["a".to_string(), "b".to_string()]).as_deref(),
            Some("a; b")
        );
    }
}
