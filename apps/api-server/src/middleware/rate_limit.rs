//! Rate limiting middleware.

use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{self, HeaderMap, HeaderName, HeaderValue},
};
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::sync::Arc;

use waypoint_core::domain::{RateLimitHeaders, RequestContext};
use waypoint_core::ports::{LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER, RateLimiter};
use waypoint_shared::RateLimitExceeded;

/// Authenticated user id, inserted into request extensions by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service,
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: S,
    limiter: Arc<dyn RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let decision = self.limiter.check(&request_context(&req));
        let headers = decision.headers;

        if !decision.admitted {
            let retry_after = decision.retry_after.unwrap_or_default();
            tracing::warn!(
                key = %decision.key,
                path = %req.path(),
                retry_after,
                "Rate limit exceeded"
            );

            let body = RateLimitExceeded::new(self.limiter.config().message.clone(), retry_after);
            let mut response = HttpResponse::TooManyRequests()
                .insert_header((header::RETRY_AFTER, retry_after.to_string()))
                .json(body);
            insert_rate_limit_headers(response.headers_mut(), &headers);

            let (http_req, _payload) = req.into_parts();
            let srv_response = ServiceResponse::new(http_req, response);

            return Box::pin(async move { Ok(srv_response.map_into_right_body()) });
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let mut res = fut.await?;
            insert_rate_limit_headers(res.headers_mut(), &headers);
            Ok(res.map_into_left_body())
        })
    }
}

/// Build the limiter's view of a request from extensions and proxy headers.
fn request_context(req: &ServiceRequest) -> RequestContext {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    RequestContext {
        user_id: req
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| user.0.clone()),
        forwarded_for: header("x-forwarded-for"),
        real_ip: header("x-real-ip"),
    }
}

fn insert_rate_limit_headers(map: &mut HeaderMap, headers: &RateLimitHeaders) {
    map.insert(
        HeaderName::from_static(LIMIT_HEADER),
        HeaderValue::from(headers.limit),
    );
    map.insert(
        HeaderName::from_static(REMAINING_HEADER),
        HeaderValue::from(headers.remaining),
    );
    map.insert(
        HeaderName::from_static(RESET_HEADER),
        HeaderValue::from(headers.reset),
    );
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test, web};
    use waypoint_core::domain::RateLimitConfig;
    use waypoint_infra::{InMemoryRateLimiter, ManualClock};

    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn limiter(max_requests: u32) -> Arc<dyn RateLimiter> {
        let config = RateLimitConfig::new(60_000, max_requests).with_message("Slow down");
        Arc::new(InMemoryRateLimiter::with_clock(
            config,
            Arc::new(ManualClock::new(NOW)),
        ))
    }

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[actix_web::test]
    async fn test_admitted_requests_carry_rate_limit_headers() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter(2)))
                .route("/", web::get().to(ok)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header(("x-forwarded-for", "1.2.3.4"))
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(header_value(res.headers(), "X-RateLimit-Limit"), "2");
        assert_eq!(header_value(res.headers(), "X-RateLimit-Remaining"), "1");
        assert_eq!(
            header_value(res.headers(), "X-RateLimit-Reset"),
            ((NOW + 60_000) / 1000).to_string()
        );
        assert!(res.headers().get(header::RETRY_AFTER).is_none());
    }

    #[actix_web::test]
    async fn test_rejection_short_circuits_with_429() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter(1)))
                .route("/", web::get().to(ok)),
        )
        .await;

        let request = || {
            test::TestRequest::get()
                .uri("/")
                .insert_header(("x-real-ip", "5.6.7.8"))
                .to_request()
        };

        let res = test::call_service(&app, request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = test::call_service(&app, request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header_value(res.headers(), "Retry-After"), "60");
        assert_eq!(header_value(res.headers(), "X-RateLimit-Limit"), "1");
        assert_eq!(header_value(res.headers(), "X-RateLimit-Remaining"), "0");

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body, serde_json::json!({ "error": "Slow down", "retryAfter": 60 }));
    }

    #[actix_web::test]
    async fn test_different_clients_are_limited_independently() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter(1)))
                .route("/", web::get().to(ok)),
        )
        .await;

        for ip in ["10.0.0.1", "10.0.0.2"] {
            let req = test::TestRequest::get()
                .uri("/")
                .insert_header(("x-forwarded-for", ip))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }
    }

    #[actix_web::test]
    async fn test_authenticated_user_is_keyed_by_user_id() {
        let limiter = limiter(1);
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter.clone()))
                .wrap_fn(|req, srv| {
                    req.extensions_mut()
                        .insert(AuthenticatedUser("u1".to_string()));
                    srv.call(req)
                })
                .route("/", web::get().to(ok)),
        )
        .await;

        // Same user from two addresses shares one counter.
        for (ip, expected) in [
            ("9.9.9.9", StatusCode::OK),
            ("8.8.8.8", StatusCode::TOO_MANY_REQUESTS),
        ] {
            let req = test::TestRequest::get()
                .uri("/")
                .insert_header(("x-forwarded-for", ip))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), expected);
        }
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
