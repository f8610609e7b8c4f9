//! The response body type used by the handler.
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};

/// Response body: empty, or one contiguous chunk.
#[derive(Debug, Default)]
pub struct Body {
    data: Option<Bytes>,
}

impl Body {
    /// An empty body.
    pub fn empty() -> Body {
        Body::default()
    }
}

impl From<Bytes> for Body {
    fn from(data: Bytes) -> Body {
        Body { data: Some(data) }
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Body {
        Body {
            data: Some(Bytes::from(data)),
        }
    }
}

impl From<String> for Body {
    fn from(data: String) -> Body {
        Body {
            data: Some(Bytes::from(data)),
        }
    }
}

impl From<&'static str> for Body {
    fn from(data: &'static str) -> Body {
        Body {
            data: Some(Bytes::from_static(data.as_bytes())),
        }
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.get_mut().data.take().map(|b| Ok(Frame::data(b))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match &self.data {
            Some(b) => SizeHint::with_exact(b.len() as u64),
            None => SizeHint::with_exact(0),
        }
    }
}
