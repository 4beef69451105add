// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    handlers::{admin, auth, classes, profile, quizzes, results, student, take},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, student_middleware, teacher_middleware},
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "classquiz API",
        description = "Quiz authoring and delivery backend for a mathematics classroom."
    ),
    components(schemas(
        crate::models::quiz::Question,
        crate::models::quiz::QuestionInput,
        crate::models::quiz::SaveQuizRequest,
        crate::models::quiz::QuizSummary,
        crate::models::user::LoginRequest,
        crate::models::student::StudentLoginRequest,
        crate::models::student::CreateStudentRequest,
        crate::models::student::UpdateStudentRequest,
        crate::models::student::ImportStudentsRequest,
        crate::models::class_room::CreateClassRequest,
        crate::models::class_room::UpdateClassRequest,
    ))
)]
struct ApiDoc;

/// Assembles the main application router.
///
/// * Public surface: auth, guest lookup, session lifecycle.
/// * Role-gated surfaces: teacher workspace, student dashboard, admin panel.
/// * Applies global middleware (Trace, CORS) and injects the app state.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/student/login", post(auth::student_login));

    let guest_routes = Router::new().route("/lookup", post(take::guest_lookup));

    // Session lifecycle is addressed by opaque tokens, so no auth layer:
    // start decides enrolled vs guest itself, review checks the caller.
    let take_routes = Router::new()
        .route("/start", post(take::start_session))
        .route("/review/{result_id}", get(take::review_result))
        .route(
            "/{token}",
            get(take::session_state).delete(take::abandon_session),
        )
        .route("/{token}/select", post(take::select_answer))
        .route("/{token}/submit", post(take::submit_session))
        .route("/{token}/cancel", post(take::cancel_submission));

    let teacher_routes = Router::new()
        .route("/quizzes", get(quizzes::list_quizzes).post(quizzes::create_quiz))
        .route(
            "/quizzes/{id}",
            get(quizzes::get_quiz)
                .put(quizzes::update_quiz)
                .delete(quizzes::delete_quiz),
        )
        .route("/classes", get(classes::list_classes).post(classes::create_class))
        .route(
            "/classes/{id}",
            put(classes::update_class).delete(classes::delete_class),
        )
        .route(
            "/classes/{id}/students",
            get(classes::list_students).post(classes::create_student),
        )
        .route("/classes/{id}/students/import", post(classes::import_students))
        .route("/classes/{id}/students/clear", post(classes::clear_class))
        .route("/classes/{id}/roster.csv", get(classes::export_roster))
        .route("/students/{id}", put(classes::update_student).delete(classes::delete_student))
        .route("/results", get(results::list_results))
        .route("/results/{id}", delete(results::delete_result))
        .route("/results/by-quiz/{quiz_id}", delete(results::delete_results_for_quiz))
        .route("/gradebook.csv", get(results::export_gradebook))
        .route("/profile", get(profile::get_profile).put(profile::update_profile))
        .route("/profile/password", put(profile::change_password))
        // Double middleware protection: Auth first, then role check
        .layer(middleware::from_fn(teacher_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let student_routes = Router::new()
        .route("/quizzes", get(student::assigned_quizzes))
        .route("/results", get(student::my_results))
        .layer(middleware::from_fn(student_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/teachers", get(admin::list_teachers).post(admin::create_teacher))
        .route("/teachers/import", post(admin::import_teachers))
        .route(
            "/teachers/{id}",
            put(admin::update_teacher).delete(admin::delete_teacher),
        )
        .route("/teachers/{id}/password", put(admin::reset_teacher_password))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/guest", guest_routes)
        .nest("/api/take", take_routes)
        .nest("/api/teacher", teacher_routes)
        .nest("/api/student", student_routes)
        .nest("/api/admin", admin_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Global Middleware (applied from outside in)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}
