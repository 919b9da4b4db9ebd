use std::pin::Pin;
use std::task::{Context, Poll};

use http_body::{Body, Frame, SizeHint};

type FinishHook = Box<dyn FnOnce() + Send>;

/// Response body that runs a hook once the inner body has been fully produced.
///
/// The hook fires when the inner body reports end of stream, either while being polled
/// or when it is dropped already complete (bodies that were empty from the start are
/// often never polled). A body dropped mid-stream never fires the hook, unless it was
/// marked [`bodiless`](Self::bodiless): responses to HEAD and 1xx/204/304 responses are
/// discarded by the server without being read, so dropping them counts as finished.
pub struct FinishBody<B: Body + Unpin> {
    inner: B,
    on_finish: Option<FinishHook>,
    bodiless: bool,
}

impl<B: Body + Unpin> FinishBody<B> {
    pub fn new(inner: B, on_finish: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner,
            on_finish: Some(Box::new(on_finish)),
            bodiless: false,
        }
    }

    /// Fire on drop even if the inner body was never read.
    pub fn bodiless(mut self, bodiless: bool) -> Self {
        self.bodiless = bodiless;
        self
    }

    fn finish(&mut self) {
        if let Some(hook) = self.on_finish.take() {
            hook();
        }
    }
}

impl<B: Body + Unpin> Body for FinishBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(None) => this.finish(),
            Poll::Ready(Some(Ok(_))) if this.inner.is_end_stream() => this.finish(),
            // errored bodies never count as finished
            Poll::Ready(Some(Err(_))) => {
                this.on_finish.take();
            }
            _ => {}
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

impl<B: Body + Unpin> Drop for FinishBody<B> {
    fn drop(&mut self) {
        if self.bodiless || self.inner.is_end_stream() {
            self.finish();
        }
    }
}
