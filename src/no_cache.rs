//! Cache-suppression middleware.
//!
//! Stamps every response with the header trio that tells HTTP/1.1 caches
//! (`Cache-Control`), HTTP/1.0 caches (`Pragma`) and proxies (`Expires`)
//! not to store it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::header::{self, HeaderValue};
use axum::response::Response;
use tower::{Layer, Service};

/// Tower layer producing [`NoCacheService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCacheLayer;

impl<S> Layer<S> for NoCacheLayer {
    type Service = NoCacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        NoCacheService { inner }
    }
}

/// Service wrapper that sets the no-cache headers on every response before
/// it leaves the stack. Stateless and infallible.
#[derive(Debug, Clone)]
pub struct NoCacheService<S> {
    inner: S,
}

impl<S> Service<Request> for NoCacheService<S>
where
    S: Service<Request, Response = Response>,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let future = self.inner.call(request);
        Box::pin(async move {
            let mut response = future.await?;
            let headers = response.headers_mut();
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache,no-store,must-revalidate"),
            );
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
            Ok(response)
        })
    }
}
