//! Rate limit profile introspection.

use actix_web::{HttpResponse, web};
use waypoint_core::domain::RateLimitProfile;
use waypoint_shared::dto::RateLimitProfileResponse;

use crate::middleware::error::AppResult;
use crate::state::AppState;

fn describe(state: &AppState, profile: RateLimitProfile) -> RateLimitProfileResponse {
    let limiter = state.limiters.get(profile);
    let config = limiter.config();

    RateLimitProfileResponse {
        profile: profile.to_string(),
        window_ms: config.window_ms,
        max_requests: config.max_requests,
        tracked_keys: limiter.tracked_keys(),
    }
}

/// GET /api/limits
pub async fn list_limits(state: web::Data<AppState>) -> HttpResponse {
    let profiles: Vec<_> = RateLimitProfile::ALL
        .into_iter()
        .map(|profile| describe(&state, profile))
        .collect();

    HttpResponse::Ok().json(profiles)
}

/// GET /api/limits/{profile}
pub async fn get_limit(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let profile: RateLimitProfile = path.parse()?;

    Ok(HttpResponse::Ok().json(describe(&state, profile)))
}
