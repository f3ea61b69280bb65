// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempts, grading, integrity, leaderboard, penalties},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, staff_middleware},
};

/// Assembles the main application router.
///
/// * Learner routes (attempts, own penalties, ratings) need a valid token.
/// * Grading needs an instructor or admin; ledger and recompute need an admin.
/// * Leaderboard reads are public.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let learner_routes = Router::new()
        .route("/tests/{test_id}/attempts", post(attempts::start_attempt))
        .route("/attempts/{id}", get(attempts::get_attempt))
        .route("/attempts/{id}/paper", get(attempts::get_paper))
        .route("/attempts/{id}/answers", post(attempts::submit_answer))
        .route("/attempts/{id}/complete", post(attempts::complete_attempt))
        .route(
            "/attempts/{id}/violations",
            post(integrity::record_violation).get(integrity::list_violations),
        )
        .route("/penalties/me", get(penalties::my_profile))
        .route("/penalties/me/eligibility", get(penalties::my_eligibility))
        .route("/instructors/{id}/ratings", post(leaderboard::rate_instructor))
        .layer(auth.clone());

    let grading_routes = Router::new()
        .route("/pending", get(grading::list_pending))
        .route("/answers/{id}", post(grading::grade_answer))
        // Auth first, then the staff check
        .layer(middleware::from_fn(staff_middleware))
        .layer(auth.clone());

    let admin_routes = Router::new()
        .route("/penalties/{learner_id}", get(penalties::get_profile))
        .route(
            "/penalties/{learner_id}/eligibility",
            get(penalties::check_eligibility),
        )
        .route(
            "/penalties/{learner_id}/reduce",
            post(penalties::apply_reduction),
        )
        .route("/penalties/{learner_id}/forgive", post(penalties::forgive))
        .route("/penalties/{learner_id}/history", get(penalties::history))
        .route("/leaderboard/recompute", post(leaderboard::recompute))
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth);

    let public_routes =
        Router::new().route("/leaderboard/{scope}", get(leaderboard::get_leaderboard));

    let api_routes = learner_routes
        .merge(public_routes)
        .nest("/grading", grading_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .nest("/api", api_routes)
        // Global middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
