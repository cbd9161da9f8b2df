// src/web/routes.rs
use crate::{
    state::AppState,
    web::{alumno_handlers, auth_handlers, checador_handlers, mw_auth, mw_roles, reporte_handlers, user_handlers},
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub fn create_router(app_state: AppState) -> Router {
    // --- Rotas Públicas ---
    let public_routes = Router::new()
        .route("/login", get(auth_handlers::show_login_form).post(auth_handlers::handle_login))
        .route("/logout", get(auth_handlers::handle_logout))
        .route("/", get(|| async { axum::response::Redirect::to("/menu") }));

    let usuarios_routes = Router::new()
        .route("/", get(user_handlers::list_users))
        .route("/nuevo", get(user_handlers::show_new_user).post(user_handlers::handle_create_user))
        .route("/exportar", get(user_handlers::export_users))
        .route("/{id}/editar", get(user_handlers::show_edit_user).post(user_handlers::handle_edit_user))
        .route("/{id}/eliminar", post(user_handlers::handle_delete_user))
        .route_layer(middleware::from_fn(mw_roles::require_usuarios));

    let alumnos_routes = Router::new()
        .route("/", get(alumno_handlers::list_alumnos))
        .route("/nuevo", get(alumno_handlers::show_new_alumno).post(alumno_handlers::handle_create_alumno))
        .route("/exportar", get(alumno_handlers::export_alumnos))
        .route("/lector/probar", post(alumno_handlers::handle_test_reader))
        .route("/{id}/editar", get(alumno_handlers::show_edit_alumno).post(alumno_handlers::handle_edit_alumno))
        .route("/{id}/eliminar", post(alumno_handlers::handle_delete_alumno))
        .route("/{id}/huella", post(alumno_handlers::handle_enroll_fingerprint))
        .route("/{id}/huella/eliminar", post(alumno_handlers::handle_remove_fingerprint))
        .route("/{id}/foto", get(alumno_handlers::serve_photo).post(alumno_handlers::handle_upload_photo))
        .route("/{id}/foto/eliminar", post(alumno_handlers::handle_remove_photo))
        .route_layer(middleware::from_fn(mw_roles::require_alumnos));

    let checador_routes = Router::new()
        .route("/", get(checador_handlers::checador_page))
        .route("/ws", get(checador_handlers::checador_websocket_handler))
        .route("/foto/{id}", get(alumno_handlers::serve_photo))
        .route_layer(middleware::from_fn(mw_roles::require_checador));

    let reportes_routes = Router::new()
        .route("/", get(reporte_handlers::reportes_page))
        .route("/exportar", get(reporte_handlers::export_report))
        .route_layer(middleware::from_fn(mw_roles::require_reportes));

    // --- Rotas Autenticadas ---
    // require_auth corre antes dos middlewares de cada secção
    let authenticated_routes = Router::new()
        .route("/menu", get(auth_handlers::show_menu))
        .nest("/usuarios", usuarios_routes)
        .nest("/alumnos", alumnos_routes)
        .nest("/checador", checador_routes)
        .nest("/reportes", reportes_routes)
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            mw_auth::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::user::UserInput,
        services::user_service,
        state::test_state,
    };
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;
    use time::Duration;
    use tower_sessions::{Expiry, SessionManagerLayer};
    use tower_sessions_sqlx_store::SqliteStore;

    async fn app() -> (Router, AppState) {
        let state = test_state().await;
        let store = SqliteStore::new(state.db_pool.clone());
        store.migrate().await.unwrap();
        let session_layer = SessionManagerLayer::new(store)
            .with_secure(false)
            .with_expiry(Expiry::OnInactivity(Duration::hours(1)));
        (create_router(state.clone()).layer(session_layer), state)
    }

    fn form_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_with(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    async fn login(app: &Router, username: &str, password: &str) -> String {
        let body = format!("username={}&password={}", username, password);
        let response = app.clone().oneshot(form_post("/login", &body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn create(state: &AppState, username: &str, roles: &[&str]) {
        let input = UserInput {
            username: username.into(),
            email: None,
            password: "clave".into(),
            is_active: true,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        user_service::create_user(&state.db_pool, &input).await.unwrap();
    }

    #[tokio::test]
    async fn anonymous_requests_are_sent_to_login() {
        let (app, _) = app().await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/menu").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");

        let response = app
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_stays_on_login_page() {
        let (app, state) = app().await;
        create(&state, "marta", &["Reportes"]).await;

        let response = app.oneshot(form_post("/login", "username=marta&password=otra", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::LOCATION).is_none());
    }

    #[tokio::test]
    async fn sections_follow_the_user_roles() {
        let (app, state) = app().await;
        create(&state, "marta", &["Reportes"]).await;
        let cookie = login(&app, "marta", "clave").await;

        let response = app.clone().oneshot(get_with("/reportes", &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get_with("/usuarios", &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.oneshot(get_with("/alumnos", &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn deactivated_user_loses_the_session() {
        let (app, state) = app().await;
        create(&state, "pedro", &["Checador"]).await;
        let cookie = login(&app, "pedro", "clave").await;

        sqlx::query("UPDATE users SET is_active = 0 WHERE username = 'pedro'")
            .execute(&state.db_pool)
            .await
            .unwrap();

        let response = app.oneshot(get_with("/checador", &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn empty_report_export_returns_to_the_page_with_a_notice() {
        let (app, state) = app().await;
        create(&state, "marta", &["Reportes"]).await;
        let cookie = login(&app, "marta", "clave").await;

        let response = app.oneshot(get_with("/reportes/exportar", &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/reportes?"));
        assert!(location.contains("error="));
    }
}
