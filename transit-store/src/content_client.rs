//! HTTP client construction and Strapi-style pagination for the Content API.
//!
//! Adapted from the teacher's `reqwest_helpers.rs`/`pagination.rs`: same
//! rate-limited, retrying, auth-header-injecting `ClientWithMiddleware`
//! builder and the same `fetch_all_pages` page-walking helper, scoped down
//! to what the passenger repository and config loader need.

use std::any::type_name;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Request, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use serde::Deserialize;
use tracing::{event, trace_span, Instrument, Level};

pub const CONTENT_API_TIMEOUT: Duration = Duration::from_secs(10);

pub fn create_client(base_token: Option<String>) -> ClientWithMiddleware {
    let reqwest_client = Client::builder().timeout(CONTENT_API_TIMEOUT).build().unwrap();

    let limiter = RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap()));

    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(50), Duration::from_secs(5))
        .build_with_total_retry_duration_and_max_retries(Duration::from_secs(10));

    let mut client_builder = ClientBuilder::new(reqwest_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(ErrorLoggingMiddleware)
        .with(RateLimitingMiddleware {
            limiter: Arc::new(limiter),
        });

    if let Some(token) = base_token {
        client_builder = client_builder.with(AuthenticatedHeaderMiddleware::new(token));
    }

    client_builder.build()
}

struct AuthenticatedHeaderMiddleware {
    bearer_token: String,
}

impl AuthenticatedHeaderMiddleware {
    fn new(bearer_token: String) -> Self {
        Self { bearer_token }
    }
}

#[async_trait::async_trait]
impl Middleware for AuthenticatedHeaderMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        req.headers_mut().insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", self.bearer_token).parse().unwrap(),
        );
        next.run(req, extensions).await
    }
}

struct RateLimitingMiddleware {
    limiter: Arc<DefaultDirectRateLimiter>,
}

#[async_trait::async_trait]
impl Middleware for RateLimitingMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        self.limiter.until_ready().await;
        next.run(req, extensions).await
    }
}

struct ErrorLoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for ErrorLoggingMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let start = Instant::now();
        let method = req.method().clone();
        let url = req.url().clone();

        let result = next.run(req, extensions).await;
        let duration = start.elapsed();

        match &result {
            Ok(resp) if !resp.status().is_success() => {
                let status = resp.status();
                match status {
                    StatusCode::TOO_MANY_REQUESTS => {
                        tracing::debug!("content api rate-limited {} {} - Duration: {:?}", method, url, duration)
                    }
                    _ => tracing::error!(
                        "content api request failed: {} {} - Status: {}, Duration: {:?}",
                        method,
                        url,
                        status,
                        duration
                    ),
                }
            }
            Err(e) => {
                tracing::error!("content api request error: {} {} - Error: {}, Duration: {:?}", method, url, e, duration);
            }
            _ => {
                tracing::debug!("content api request succeeded: {} {} - Duration: {:?}", method, url, duration);
            }
        }

        result
    }
}

#[derive(Debug, Clone)]
pub struct PaginationInput {
    pub page: u32,
    pub limit: u32,
}

impl Default for PaginationInput {
    fn default() -> Self {
        Self { page: 1, limit: 100 }
    }
}

#[derive(Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    meta: Meta,
}

/// A single-entity Strapi response (`POST`/`GET` of one resource), as
/// opposed to [`PaginatedResponse`]'s list-plus-meta shape.
#[derive(Deserialize)]
pub struct SingleResponse<T> {
    pub data: T,
}

#[derive(Deserialize)]
struct Meta {
    total: u64,
    #[allow(dead_code)]
    page: u64,
    limit: u64,
}

/// Walks every page of a Strapi-style `{data, meta: {total, page, limit}}`
/// endpoint, starting from page 1, until `page * limit >= total`.
pub async fn fetch_all_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    F: FnMut(PaginationInput) -> Fut,
    Fut: Future<Output = Result<PaginatedResponse<T>>>,
{
    let mut current_input = PaginationInput::default();
    let mut all_data = Vec::new();
    let mut total_number_of_pages = 1;

    let type_name = type_name::<T>();
    let span = trace_span!("content_api_pagination");

    async move {
        event!(Level::TRACE, "downloading all pages of type {}", type_name);

        while current_input.page <= total_number_of_pages {
            let response = fetch_page(current_input.clone()).await?;
            total_number_of_pages = (response.meta.total as f32 / response.meta.limit.max(1) as f32).ceil() as u32;
            all_data.extend(response.data);
            current_input.page += 1;
        }

        Ok(all_data)
    }
    .instrument(span)
    .await
}
