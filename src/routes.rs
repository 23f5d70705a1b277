use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};

use crate::{
    AppState,
    accounts::NewAccount,
    auth::{AdminUser, AuthUser},
    catalog::MovieStore,
    error::{AppError, AppResult},
    interactions::Shelf,
    models::{
        CommentRequest, CommentView, ListQuery, LoginRequest, MessageResponse, MovieRecord,
        MovieUpdate, NewMovie, RegisterRequest, ReviewRequest, ReviewView, TokenResponse,
    },
    sync::{CycleSummary, SyncStatus},
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/admin/register", post(register_admin))
        .route("/login", post(login))
        .route("/movies", get(list_movies))
        .route("/movies/{id}", get(get_movie))
        .route("/movies/{id}/favorite", post(add_favorite))
        .route("/movies/{id}/watchlist", post(add_to_watchlist))
        .route("/movies/{id}/love", post(love_movie))
        .route("/movies/{id}/comment", post(add_comment))
        .route("/movies/{id}/comments", get(list_comments))
        .route("/movies/{id}/review", post(add_review))
        .route("/movies/{id}/reviews", get(list_reviews))
        .route("/me/favorites", get(my_favorites))
        .route("/me/watchlist", get(my_watchlist))
        .route("/me/loves", get(my_loves))
        .route("/admin/movies", post(create_movie))
        .route("/admin/movies/{id}", put(update_movie).delete(delete_movie))
        .route("/admin/fetch-movies", get(fetch_movies).post(fetch_movies))
        .route("/admin/sync/status", get(sync_status))
        .with_state(state)
}

type Created<T> = (StatusCode, Json<T>);

fn created<T>(body: T) -> Created<T> {
    (StatusCode::CREATED, Json(body))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Created<MessageResponse>> {
    let wants_admin =
        req.role.as_deref().is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));
    if wants_admin {
        return Err(AppError::forbidden("User cannot register as an admin."));
    }

    state.accounts.register(NewAccount::from_request(req, false).await?).await?;
    Ok(created(MessageResponse::new("User registered successfully.")))
}

/// The first admin may register freely; after that only admins can add admins.
async fn register_admin(
    State(state): State<Arc<AppState>>,
    caller: Option<AuthUser>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Created<MessageResponse>> {
    let caller_is_admin = caller.is_some_and(|user| user.admin);
    if !caller_is_admin && state.accounts.has_admin().await? {
        return Err(admin_required(caller));
    }

    let account = NewAccount::from_request(req, true).await?;
    if caller_is_admin {
        state.accounts.register(account).await?;
    } else if state.accounts.bootstrap_admin(account).await?.is_none() {
        // Another bootstrap registration won the race.
        return Err(admin_required(caller));
    }
    Ok(created(MessageResponse::new("Admin registered successfully.")))
}

fn admin_required(caller: Option<AuthUser>) -> AppError {
    match caller {
        Some(_) => AppError::forbidden("admin privileges required"),
        None => AppError::Unauthorized("missing bearer token".to_string()),
    }
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let Some(user) = state.accounts.authenticate(&req.email, &req.password).await? else {
        return Err(AppError::bad_request("Invalid email or password."));
    };
    let token = state.tokens.issue(user.id, user.is_admin)?;
    tracing::debug!(user_id = user.id, "issued token");
    Ok(Json(TokenResponse { token }))
}

async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<MovieRecord>>> {
    Ok(Json(state.catalog.list(&query).await?))
}

async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<MovieRecord>> {
    Ok(Json(state.catalog.record_view(id).await?))
}

async fn shelve(
    state: &AppState,
    shelf: Shelf,
    user: AuthUser,
    movie_id: i32,
    message: &str,
) -> AppResult<Created<MessageResponse>> {
    state.interactions.add(shelf, user.id, movie_id).await?;
    Ok(created(MessageResponse::new(message)))
}

async fn add_favorite(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Created<MessageResponse>> {
    shelve(&state, Shelf::Favorites, user, id, "Movie added to favorites.").await
}

async fn add_to_watchlist(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Created<MessageResponse>> {
    shelve(&state, Shelf::Watchlist, user, id, "Movie added to watchlist.").await
}

async fn love_movie(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Created<MessageResponse>> {
    shelve(&state, Shelf::Loves, user, id, "Movie loved successfully.").await
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Created<CommentView>> {
    let comment = state.interactions.add_comment(user.id, id, &req.text).await?;
    Ok(created(comment.into()))
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<CommentView>>> {
    let comments = state.interactions.comments(id).await?;
    Ok(Json(comments.into_iter().map(CommentView::from).collect()))
}

async fn add_review(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(req): Json<ReviewRequest>,
) -> AppResult<Created<ReviewView>> {
    let Some(rating) = req.rating else {
        return Err(AppError::bad_request("rating is required"));
    };
    let review = state.interactions.review(user.id, id, rating, req.comment.as_deref()).await?;
    Ok(created(review.into()))
}

async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<ReviewView>>> {
    let reviews = state.interactions.reviews(id).await?;
    Ok(Json(reviews.into_iter().map(ReviewView::from).collect()))
}

async fn my_favorites(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<MovieRecord>>> {
    Ok(Json(state.interactions.shelf(Shelf::Favorites, user.id).await?))
}

async fn my_watchlist(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<MovieRecord>>> {
    Ok(Json(state.interactions.shelf(Shelf::Watchlist, user.id).await?))
}

async fn my_loves(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<MovieRecord>>> {
    Ok(Json(state.interactions.shelf(Shelf::Loves, user.id).await?))
}

async fn create_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(movie): Json<NewMovie>,
) -> AppResult<Created<MovieRecord>> {
    Ok(created(state.catalog.create(movie).await?))
}

async fn update_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i32>,
    Json(changes): Json<MovieUpdate>,
) -> AppResult<Json<MovieRecord>> {
    Ok(Json(state.catalog.update(id, changes).await?))
}

async fn delete_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    state.catalog.delete(id).await?;
    Ok(Json(MessageResponse::new("Movie deleted successfully")))
}

async fn fetch_movies(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<CycleSummary>> {
    tracing::info!(user_id = admin.id, "manual catalog sync requested");
    Ok(Json(state.synchronizer.run_cycle().await?))
}

async fn sync_status(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Json<SyncStatus> {
    Json(state.synchronizer.status().await)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        accounts::Accounts,
        auth::TokenKeys,
        catalog::CatalogStore,
        db,
        interactions::Interactions,
        sync::{
            Synchronizer,
            tests::{FakeProvider, item},
        },
    };

    async fn app(provider: FakeProvider) -> Router {
        let db = db::connect_in_memory().await.unwrap();
        let catalog = CatalogStore::new(db.clone());
        let synchronizer =
            Arc::new(Synchronizer::new(Arc::new(provider), Arc::new(catalog.clone())));
        router(Arc::new(AppState {
            catalog,
            accounts: Accounts::new(db.clone()),
            interactions: Interactions::new(db),
            synchronizer,
            tokens: TokenKeys::new("test-secret", 3600),
        }))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn registration(username: &str) -> Value {
        json!({
            "fullname": "Test User",
            "username": username,
            "email": format!("{username}@example.com"),
            "phone": "5551234567",
            "password": "pass-word",
            "role": "user"
        })
    }

    async fn login(app: &Router, username: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/login",
            None,
            Some(json!({"email": format!("{username}@example.com"), "password": "pass-word"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn admin_token(app: &Router) -> String {
        let (status, _) =
            send(app, Method::POST, "/admin/register", None, Some(registration("root"))).await;
        assert_eq!(status, StatusCode::CREATED);
        login(app, "root").await
    }

    #[tokio::test]
    async fn registration_and_login_rules() {
        let app = app(FakeProvider::with_page(vec![])).await;

        let mut as_admin = registration("mallory");
        as_admin["role"] = json!("admin");
        let (status, body) = send(&app, Method::POST, "/register", None, Some(as_admin)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "User cannot register as an admin.");

        let mut incomplete = registration("bob");
        incomplete["phone"] = json!("");
        let (status, _) = send(&app, Method::POST, "/register", None, Some(incomplete)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&app, Method::POST, "/register", None, Some(registration("alice"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) =
            send(&app, Method::POST, "/register", None, Some(registration("alice"))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({"email": "alice@example.com", "password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid email or password.");

        assert!(!login(&app, "alice").await.is_empty());
    }

    #[tokio::test]
    async fn admin_bootstrap_then_locked() {
        let app = app(FakeProvider::with_page(vec![])).await;
        let root = admin_token(&app).await;

        let (status, _) =
            send(&app, Method::POST, "/admin/register", None, Some(registration("eve"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            send(&app, Method::POST, "/admin/register", Some(&root), Some(registration("ops")))
                .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn simultaneous_bootstraps_create_a_single_admin() {
        let app = app(FakeProvider::with_page(vec![])).await;

        let (first, second) = tokio::join!(
            send(&app, Method::POST, "/admin/register", None, Some(registration("root"))),
            send(&app, Method::POST, "/admin/register", None, Some(registration("rogue"))),
        );
        let mut statuses = [first.0.as_u16(), second.0.as_u16()];
        statuses.sort();
        assert_eq!(statuses, [201, 401]);

        let winner = if first.0 == StatusCode::CREATED { "root" } else { "rogue" };
        let token = login(&app, winner).await;
        let (status, _) = send(&app, Method::GET, "/admin/sync/status", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn simplified_movie_payload_is_accepted() {
        let app = app(FakeProvider::with_page(vec![])).await;
        let root = admin_token(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/admin/movies",
            Some(&root),
            Some(json!({
                "title": "Heat",
                "genre": "crime",
                "rating": 8.3,
                "description": "A heist goes wrong.",
                "poster": "/heat.jpg"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["genres"], json!(["crime"]));
        assert_eq!(body["overview"], "A heist goes wrong.");
        assert_eq!(body["poster_path"], "/heat.jpg");

        let id = body["id"].as_i64().unwrap();
        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/admin/movies/{id}"),
            Some(&root),
            Some(json!({"genre": "thriller"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["genres"], json!(["thriller"]));
    }

    #[tokio::test]
    async fn reviews_are_one_per_user_and_replaceable() {
        let app = app(FakeProvider::with_page(vec![])).await;
        let root = admin_token(&app).await;
        let (_, movie) =
            send(&app, Method::POST, "/admin/movies", Some(&root), Some(json!({"title": "Heat"})))
                .await;
        let id = movie["id"].as_i64().unwrap();
        let review = format!("/movies/{id}/review");
        let reviews = format!("/movies/{id}/reviews");

        send(&app, Method::POST, "/register", None, Some(registration("alice"))).await;
        let alice = login(&app, "alice").await;

        let (status, _) = send(&app, Method::POST, &review, None, Some(json!({"rating": 8}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) =
            send(&app, Method::POST, &review, Some(&alice), Some(json!({"comment": "hm"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) =
            send(&app, Method::POST, &review, Some(&alice), Some(json!({"rating": 11}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(
            &app,
            Method::POST,
            "/movies/999/review",
            Some(&alice),
            Some(json!({"rating": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::POST,
            &review,
            Some(&alice),
            Some(json!({"rating": 7, "comment": "Tense."})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["rating"], 7);

        let (status, _) = send(
            &app,
            Method::POST,
            &review,
            Some(&alice),
            Some(json!({"rating": 9, "comment": "Better on rewatch."})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) =
            send(&app, Method::POST, &review, Some(&root), Some(json!({"rating": 6}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, listed) = send(&app, Method::GET, &reviews, None, None).await;
        assert_eq!(status, StatusCode::OK);
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        let by_alice: Vec<_> =
            listed.iter().filter(|r| r["comment"] == "Better on rewatch.").collect();
        assert_eq!(by_alice.len(), 1);
        assert_eq!(by_alice[0]["rating"], 9);
    }

    #[tokio::test]
    async fn admin_movie_crud() {
        let app = app(FakeProvider::with_page(vec![])).await;
        let root = admin_token(&app).await;

        send(&app, Method::POST, "/register", None, Some(registration("alice"))).await;
        let alice = login(&app, "alice").await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/admin/movies",
            Some(&alice),
            Some(json!({"title": "Heat"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            send(&app, Method::POST, "/admin/movies", Some(&root), Some(json!({"title": ""})))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::POST,
            "/admin/movies",
            Some(&root),
            Some(json!({
                "title": "Heat",
                "genre": ["crime"],
                "release_date": "1995-12-15",
                "cast": [{"actor": "Al Pacino", "character": "Vincent Hanna"}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["genres"], json!(["crime"]));
        assert_eq!(body["release_date"], "1995-12-15");
        let id = body["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/admin/movies/{id}"),
            Some(&root),
            Some(json!({"rating": 8.3})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Heat");
        assert_eq!(body["rating"], 8.3);

        let (status, body) = send(&app, Method::GET, &format!("/movies/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view_count"], 1);

        let uri = format!("/admin/movies/{id}");
        let (status, _) = send(&app, Method::DELETE, &uri, Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::DELETE, &uri, Some(&root), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn interactions_require_a_valid_token() {
        let app = app(FakeProvider::with_page(vec![])).await;
        let root = admin_token(&app).await;
        let (_, movie) =
            send(&app, Method::POST, "/admin/movies", Some(&root), Some(json!({"title": "Heat"})))
                .await;
        let id = movie["id"].as_i64().unwrap();
        let favorite = format!("/movies/{id}/favorite");

        let (status, _) = send(&app, Method::POST, &favorite, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::POST, &favorite, Some("garbage"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        send(&app, Method::POST, "/register", None, Some(registration("alice"))).await;
        let alice = login(&app, "alice").await;

        let (status, _) = send(&app, Method::POST, &favorite, Some(&alice), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, Method::POST, &favorite, Some(&alice), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send(&app, Method::POST, "/movies/999/love", Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/movies/{id}/comment"),
            Some(&alice),
            Some(json!({"text": "Great heist."})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, comments) =
            send(&app, Method::GET, &format!("/movies/{id}/comments"), None, None).await;
        assert_eq!(comments[0]["text"], "Great heist.");

        let (status, favorites) =
            send(&app, Method::GET, "/me/favorites", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(favorites[0]["title"], "Heat");

        let (status, _) =
            send(&app, Method::POST, &format!("/movies/{id}/love"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, loves) = send(&app, Method::GET, "/me/loves", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(loves.as_array().unwrap().len(), 1);
        assert_eq!(loves[0]["title"], "Heat");
        let (_, watchlist) = send(&app, Method::GET, "/me/watchlist", Some(&alice), None).await;
        assert!(watchlist.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_sync_returns_the_cycle_summary() {
        let app = app(FakeProvider::with_page(vec![item("42", "Dune"), item("", "")])).await;
        let root = admin_token(&app).await;

        let (status, summary) =
            send(&app, Method::POST, "/admin/fetch-movies", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["created"], 1);
        assert_eq!(summary["updated"], 0);
        assert_eq!(summary["skipped"], 1);
        assert_eq!(summary["failed"], 0);

        let (_, movies) = send(&app, Method::GET, "/movies", None, None).await;
        assert_eq!(movies.as_array().unwrap().len(), 1);
        assert_eq!(movies[0]["external_id"], "42");

        let (status, sync_status) =
            send(&app, Method::GET, "/admin/sync/status", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sync_status["running"], false);
        assert_eq!(sync_status["last_cycle"]["outcome"]["status"], "completed");
        assert_eq!(sync_status["last_cycle"]["outcome"]["created"], 1);
    }
}
