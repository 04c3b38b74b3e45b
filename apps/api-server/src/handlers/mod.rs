//! HTTP handlers and route configuration.

mod health;
mod limits;

use actix_web::web;
use waypoint_core::domain::RateLimitProfile;

use crate::state::Limiters;

/// Configure all application routes.
///
/// Everything under `/api` counts against the relaxed profile. Business
/// scopes take the strict or moderate profile via [`Limiters::middleware`].
pub fn configure_routes(cfg: &mut web::ServiceConfig, limiters: &Limiters) {
    cfg.service(
        web::scope("/api")
            .wrap(limiters.middleware(RateLimitProfile::Relaxed))
            .route("/health", web::get().to(health::health_check))
            .service(
                web::scope("/limits")
                    .route("", web::get().to(limits::list_limits))
                    .route("/{profile}", web::get().to(limits::get_limit)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, http::StatusCode, test};
    use waypoint_infra::ManualClock;
    use waypoint_shared::dto::RateLimitProfileResponse;

    use super::*;
    use crate::config::RateLimitSettings;
    use crate::state::AppState;

    fn state(settings: &RateLimitSettings) -> AppState {
        AppState::with_clock(settings, Arc::new(ManualClock::new(1_700_000_000_000)))
    }

    #[actix_web::test]
    async fn test_health_is_rate_limited_by_relaxed_profile() {
        let state = state(&RateLimitSettings::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(|cfg| configure_routes(cfg, &state.limiters)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::OK);
        let header = |name: &str| res.headers().get(name).unwrap().to_str().unwrap().to_string();
        assert_eq!(header("x-ratelimit-limit"), "100");
        assert_eq!(header("x-ratelimit-remaining"), "99");
    }

    #[actix_web::test]
    async fn test_relaxed_limit_rejects_after_threshold() {
        let mut settings = RateLimitSettings::default();
        settings.relaxed.max_requests = 2;
        let state = state(&settings);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(|cfg| configure_routes(cfg, &state.limiters)),
        )
        .await;

        let statuses = {
            let mut statuses = Vec::new();
            for _ in 0..3 {
                let req = test::TestRequest::get()
                    .uri("/api/health")
                    .insert_header(("x-forwarded-for", "203.0.113.7"))
                    .to_request();
                statuses.push(test::call_service(&app, req).await.status());
            }
            statuses
        };

        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    #[actix_web::test]
    async fn test_list_limits_reports_every_profile() {
        let state = state(&RateLimitSettings::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(|cfg| configure_routes(cfg, &state.limiters)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/limits").to_request();
        let body: Vec<RateLimitProfileResponse> = test::call_and_read_body_json(&app, req).await;

        let summary: Vec<_> = body
            .iter()
            .map(|p| (p.profile.as_str(), p.max_requests, p.tracked_keys))
            .collect();
        // The relaxed limiter has already counted this request.
        assert_eq!(
            summary,
            vec![("strict", 10, 0), ("moderate", 30, 0), ("relaxed", 100, 1)]
        );
    }

    #[actix_web::test]
    async fn test_unknown_profile_is_not_found() {
        let state = state(&RateLimitSettings::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(|cfg| configure_routes(cfg, &state.limiters)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/limits/burst").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], 404);
        assert_eq!(body["detail"], "Unknown rate limit profile: burst");

        let req = test::TestRequest::get().uri("/api/limits/strict").to_request();
        let body: RateLimitProfileResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.window_ms, 60_000);
        assert_eq!(body.max_requests, 10);
    }
}
