use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tower_http::limit::RequestBodyLimitLayer;

use recipebox_core::error::Error;
use recipebox_core::generate::{self, RecipeGenerator};
use recipebox_core::models::{
    CleanupSummary, GroceryImportSummary, GroceryItemPatch, GroceryListItem, GroceryResult,
    Ingredient, ManualAddInput, NewIngredient, NewRecipe, NewStep, Recipe, RecipeDetail, Step,
    UpdateRecipe, User, parse_quantity,
};
use recipebox_core::service::RecipeService;

const BODY_LIMIT: usize = 50 * 1024 * 1024; // 50 MB
const LOCAL_USER: &str = "local";

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<RecipeService>>,
    generator: Option<Arc<dyn RecipeGenerator>>,
    /// Set in `--no-auth` mode; every request acts as this user.
    local_user_id: Option<i64>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, RecipeService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Accept a JSON string or number as text, so it can be validated as a decimal.
fn json_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    username: String,
}

#[derive(Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    save: bool,
}

#[derive(Deserialize)]
struct AddGroceryRequest {
    name: Option<String>,
    quantity: Option<Value>,
    volume_unit: Option<String>,
    weight_unit: Option<String>,
}

impl From<AddGroceryRequest> for ManualAddInput {
    fn from(req: AddGroceryRequest) -> Self {
        Self {
            name: req.name,
            quantity: json_text(req.quantity),
            volume_unit: req.volume_unit,
            weight_unit: req.weight_unit,
        }
    }
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct PatchGroceryRequest {
    checked: Option<bool>,
    quantity: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_some")]
    volume_unit: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    weight_unit: Option<Option<String>>,
}

impl TryFrom<PatchGroceryRequest> for GroceryItemPatch {
    type Error = Error;

    fn try_from(req: PatchGroceryRequest) -> Result<Self, Error> {
        let quantity = json_text(req.quantity)
            .map(|raw| {
                parse_quantity(&raw)
                    .ok_or_else(|| Error::validation("quantity", "Quantity must be a valid number."))
            })
            .transpose()?;
        Ok(Self {
            checked: req.checked,
            quantity,
            volume_unit: req.volume_unit,
            weight_unit: req.weight_unit,
        })
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    Service(Error),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Service(Error::Validation { field, message }) => {
                (StatusCode::BAD_REQUEST, Json(json!({ field: [message] }))).into_response()
            }
            Self::Service(Error::IncompatibleUnits { .. }) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "units": ["Unable to merge due to incompatible units."] })),
            )
                .into_response(),
            Self::Service(err @ Error::UnsupportedUnit(_)) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "units": [err.to_string()] })),
            )
                .into_response(),
            Self::Service(Error::NotFound(what)) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("{what} not found"),
                }),
            )
                .into_response(),
            Self::Service(Error::Generation { message, raw }) => {
                tracing::warn!(%message, "recipe generation failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": message, "raw": raw })),
                )
                    .into_response()
            }
            Self::Service(Error::Store(err)) | Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error".to_string(),
                    }),
                )
                    .into_response()
            }
            Self::Unavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse { error: message }),
            )
                .into_response(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Service(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let found = match (state.local_user_id, bearer_token(request.headers())) {
        (Some(id), _) => state.service().get_user(id).map(Some),
        (None, Some(token)) => state.service().authenticate(&token),
        (None, None) => Ok(None),
    };
    let user = match found {
        Ok(Some(user)) => user,
        Ok(None) | Err(Error::NotFound(_)) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API token".to_string(),
                }),
            )
                .into_response();
        }
        Err(err) => return ApiError::from(err).into_response(),
    };
    request.extensions_mut().insert(user);
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers: users ---

async fn get_me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state.service().rename_user(user.id, &req.username)?;
    Ok(Json(user))
}

async fn delete_me(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_user(user.id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Handlers: recipes ---

async fn list_recipes(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    Ok(Json(state.service().list_recipes(user.id)?))
}

async fn create_recipe(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<NewRecipe>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let recipe = state.service().create_recipe(user.id, &req)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetail>, ApiError> {
    Ok(Json(state.service().get_recipe_detail(user.id, id)?))
}

async fn update_recipe(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRecipe>,
) -> Result<Json<Recipe>, ApiError> {
    Ok(Json(state.service().update_recipe(user.id, id, &req)?))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_recipe(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn generate_recipe(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    let generator = state.generator.clone().ok_or_else(|| {
        ApiError::Unavailable(
            "Recipe generation is not configured. Set OPENAI_API_KEY and restart.".to_string(),
        )
    })?;

    let GenerateRequest { prompt, tags, save } = req;
    let generated = tokio::task::spawn_blocking(move || {
        generate::generate_recipe(generator.as_ref(), &prompt, &tags)
    })
    .await
    .context("recipe generation task failed")??;

    if save {
        let detail = state.service().save_generated_recipe(user.id, &generated)?;
        return Ok((StatusCode::CREATED, Json(detail)).into_response());
    }
    Ok(Json(generated).into_response())
}

// --- Handlers: ingredients ---

async fn list_ingredients(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(recipe_id): Path<i64>,
) -> Result<Json<Vec<Ingredient>>, ApiError> {
    Ok(Json(state.service().list_ingredients(user.id, recipe_id)?))
}

async fn create_ingredient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(recipe_id): Path<i64>,
    Json(req): Json<NewIngredient>,
) -> Result<(StatusCode, Json<Ingredient>), ApiError> {
    let ingredient = state.service().add_ingredient(user.id, recipe_id, &req)?;
    Ok((StatusCode::CREATED, Json(ingredient)))
}

async fn update_ingredient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((recipe_id, ingredient_id)): Path<(i64, i64)>,
    Json(req): Json<NewIngredient>,
) -> Result<Json<Ingredient>, ApiError> {
    let ingredient = state
        .service()
        .update_ingredient(user.id, recipe_id, ingredient_id, &req)?;
    Ok(Json(ingredient))
}

async fn delete_ingredient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((recipe_id, ingredient_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state
        .service()
        .delete_ingredient(user.id, recipe_id, ingredient_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Handlers: steps ---

async fn list_steps(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(recipe_id): Path<i64>,
) -> Result<Json<Vec<Step>>, ApiError> {
    Ok(Json(state.service().list_steps(user.id, recipe_id)?))
}

async fn create_step(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(recipe_id): Path<i64>,
    Json(req): Json<NewStep>,
) -> Result<(StatusCode, Json<Step>), ApiError> {
    let step = state.service().add_step(user.id, recipe_id, &req)?;
    Ok((StatusCode::CREATED, Json(step)))
}

async fn update_step(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((recipe_id, step_id)): Path<(i64, i64)>,
    Json(req): Json<NewStep>,
) -> Result<Json<Step>, ApiError> {
    let step = state
        .service()
        .update_step(user.id, recipe_id, step_id, &req)?;
    Ok(Json(step))
}

async fn delete_step(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((recipe_id, step_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_step(user.id, recipe_id, step_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Handlers: grocery list ---

async fn import_to_grocery_list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(recipe_id): Path<i64>,
) -> Result<(StatusCode, Json<GroceryImportSummary>), ApiError> {
    let summary = state
        .service()
        .import_recipe_ingredients(user.id, recipe_id)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn list_grocery_items(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<GroceryListItem>>, ApiError> {
    Ok(Json(state.service().list_grocery_items(user.id)?))
}

async fn add_grocery_item(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<AddGroceryRequest>,
) -> Result<(StatusCode, Json<GroceryResult>), ApiError> {
    let result = state
        .service()
        .add_grocery_item(user.id, &ManualAddInput::from(req))?;
    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)))
}

async fn patch_grocery_item(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(req): Json<PatchGroceryRequest>,
) -> Result<Json<GroceryResult>, ApiError> {
    let patch = GroceryItemPatch::try_from(req)?;
    Ok(Json(state.service().patch_grocery_item(user.id, id, &patch)?))
}

async fn delete_grocery_item(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_grocery_item(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_checked_items(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<CleanupSummary>, ApiError> {
    Ok(Json(state.service().remove_checked_items(user.id)?))
}

// --- Router ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/users/me",
            get(get_me).patch(update_me).delete(delete_me),
        )
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/generate", post(generate_recipe))
        .route(
            "/api/recipes/{id}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route(
            "/api/recipes/{id}/ingredients",
            get(list_ingredients).post(create_ingredient),
        )
        .route(
            "/api/recipes/{id}/ingredients/{ingredient_id}",
            put(update_ingredient).delete(delete_ingredient),
        )
        .route(
            "/api/recipes/{id}/steps",
            get(list_steps).post(create_step),
        )
        .route(
            "/api/recipes/{id}/steps/{step_id}",
            put(update_step).delete(delete_step),
        )
        .route(
            "/api/recipes/{id}/grocery-list",
            post(import_to_grocery_list),
        )
        .route(
            "/api/grocery-list",
            get(list_grocery_items).post(add_grocery_item),
        )
        .route("/api/grocery-list/checked", delete(remove_checked_items))
        .route(
            "/api/grocery-list/{id}",
            patch(patch_grocery_item).delete(delete_grocery_item),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: RecipeService,
    port: u16,
    bind: &str,
    no_auth: bool,
    generator: Option<Arc<dyn RecipeGenerator>>,
) -> anyhow::Result<()> {
    let local_user_id = if no_auth {
        Some(service.get_or_create_user(LOCAL_USER)?.id)
    } else {
        None
    };

    if local_user_id.is_some() {
        tracing::warn!("authentication disabled (--no-auth); every request acts as '{LOCAL_USER}'");
        if bind != "127.0.0.1" && bind != "localhost" {
            tracing::warn!(
                %bind,
                "listening beyond localhost with no authentication; any device on your network can access this API"
            );
        }
    } else {
        tracing::info!("bearer tokens required; create one with `recipebox user add <name>`");
    }
    if generator.is_none() {
        tracing::info!("recipe generation disabled (OPENAI_API_KEY not set)");
    }

    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        generator,
        local_user_id,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const REPLY: &str = r#"{
        "title": "Tomato Soup",
        "notes": "Simple and warm.",
        "tags": ["vegan"],
        "ingredients": [
            {"name": "Tomatoes", "quantity": 800, "weight_unit": "g", "volume_unit": null},
            {"name": "Olive Oil", "quantity": 2, "weight_unit": null, "volume_unit": "tbsp"}
        ],
        "steps": [{"step": 1, "description": "Simmer for 20 minutes and blend."}]
    }"#;

    struct CannedGenerator;

    impl RecipeGenerator for CannedGenerator {
        fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            Ok(REPLY.to_string())
        }
    }

    struct BadUnitGenerator;

    impl RecipeGenerator for BadUnitGenerator {
        fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            Ok(r#"{"title": "Salty", "ingredients": [
                {"name": "Salt", "quantity": 1, "volume_unit": "pinch"}
            ]}"#
            .to_string())
        }
    }

    fn test_state(no_auth: bool, generator: Option<Arc<dyn RecipeGenerator>>) -> AppState {
        let service = RecipeService::new_in_memory().unwrap();
        let local_user_id = no_auth.then(|| service.get_or_create_user(LOCAL_USER).unwrap().id);
        AppState {
            service: Arc::new(Mutex::new(service)),
            generator,
            local_user_id,
        }
    }

    fn open_app() -> Router {
        build_router(test_state(true, None))
    }

    fn with_user(state: &AppState, name: &str) -> String {
        let (_, token) = state.service().create_user(name).unwrap();
        token
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, request: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn create_recipe_with_flour(app: &Router) -> i64 {
        let (status, recipe) = send(
            app,
            json_request("POST", "/api/recipes", &json!({ "title": "Bread" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = recipe["id"].as_i64().unwrap();
        let (status, _) = send(
            app,
            json_request(
                "POST",
                &format!("/api/recipes/{id}/ingredients"),
                &json!({ "name": "Flour", "quantity": "2.5", "volume_unit": "cup" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        id
    }

    #[tokio::test]
    async fn auth_missing_token_returns_401() {
        let app = build_router(test_state(false, None));
        let (status, body) = send(&app, empty_request("GET", "/api/recipes")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or missing API token");
    }

    #[tokio::test]
    async fn auth_wrong_token_returns_401() {
        let state = test_state(false, None);
        with_user(&state, "alice");
        let app = build_router(state);
        let request = axum::http::Request::get("/api/recipes")
            .header("Authorization", "Bearer wrong-token")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_token_resolves_user() {
        let state = test_state(false, None);
        let token = with_user(&state, "alice");
        let app = build_router(state);
        let request = axum::http::Request::get("/api/users/me")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
    }

    #[tokio::test]
    async fn users_cannot_see_each_others_recipes() {
        let state = test_state(false, None);
        let alice = with_user(&state, "alice");
        let bob = with_user(&state, "bob");
        let app = build_router(state);

        let request = axum::http::Request::post("/api/recipes")
            .header("Authorization", format!("Bearer {alice}"))
            .header("content-type", "application/json")
            .body(Body::from(json!({ "title": "Secret Stew" }).to_string()))
            .unwrap();
        let (status, recipe) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);

        let request = axum::http::Request::get(format!("/api/recipes/{}", recipe["id"]))
            .header("Authorization", format!("Bearer {bob}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Recipe not found");
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = open_app();
        let response = app
            .oneshot(empty_request("GET", "/api/recipes"))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = open_app();
        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/grocery-list")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::from(Error::Store(anyhow::anyhow!(
            "secret database path /home/user/.recipebox/db"
        )));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn recipe_crud_roundtrip() {
        let app = open_app();
        let id = create_recipe_with_flour(&app).await;

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/recipes/{id}/steps"),
                &json!({ "step": 1, "description": "Knead." }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, detail) = send(&app, empty_request("GET", &format!("/api/recipes/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["title"], "Bread");
        assert_eq!(detail["ingredients"][0]["quantity"], 2.5);
        assert_eq!(detail["steps"][0]["description"], "Knead.");

        let (status, updated) = send(
            &app,
            json_request(
                "PUT",
                &format!("/api/recipes/{id}"),
                &json!({ "favorite": true }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["favorite"], true);

        let (status, _) = send(&app, empty_request("DELETE", &format!("/api/recipes/{id}"))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, empty_request("GET", &format!("/api/recipes/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ingredient_with_both_units_is_rejected_per_field() {
        let app = open_app();
        let id = create_recipe_with_flour(&app).await;
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/recipes/{id}/ingredients"),
                &json!({ "name": "Sugar", "quantity": 1, "volume_unit": "cup", "weight_unit": "g" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["units"][0],
            "Provide either a volume unit or a weight unit, not both."
        );
    }

    #[tokio::test]
    async fn import_recipe_into_grocery_list() {
        let app = open_app();
        let id = create_recipe_with_flour(&app).await;
        let uri = format!("/api/recipes/{id}/grocery-list");

        let (status, body) = send(&app, empty_request("POST", &uri)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Added 1 new ingredient(s) to grocery list");

        let (_, body) = send(&app, empty_request("POST", &uri)).await;
        assert_eq!(
            body["message"],
            "Updated 1 existing ingredient(s) to grocery list"
        );

        let (status, items) = send(&app, empty_request("GET", "/api/grocery-list")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(items.as_array().unwrap().len(), 1);
        assert_eq!(items[0]["quantity"], 5.0);
    }

    #[tokio::test]
    async fn import_missing_recipe_returns_404() {
        let app = open_app();
        let (status, _) = send(&app, empty_request("POST", "/api/recipes/999/grocery-list")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_add_creates_then_merges() {
        let app = open_app();
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/grocery-list",
                &json!({ "name": "flour", "quantity": 200, "weight_unit": "g" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Added flour to grocery list.");

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/grocery-list",
                &json!({ "name": "Flour", "quantity": "1", "weight_unit": "oz" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Updated grocery list item for flour.");
        // 200 g + 28.3495 g, rounded for display
        assert_eq!(body["item"]["quantity"], 228.35);
        assert_eq!(body["item"]["weight_unit"], "g");
    }

    #[tokio::test]
    async fn manual_add_validation_errors() {
        let app = open_app();
        let cases = [
            (json!({ "quantity": 1 }), "name"),
            (json!({ "name": "egg" }), "quantity"),
            (
                json!({ "name": "egg", "quantity": "x", "volume_unit": "cup", "weight_unit": "g" }),
                "units",
            ),
            (json!({ "name": "egg", "quantity": "x" }), "quantity"),
            (
                json!({ "name": "egg", "quantity": 1, "volume_unit": "bucket" }),
                "volume_unit",
            ),
            (
                json!({ "name": "egg", "quantity": 1, "weight_unit": "stone" }),
                "weight_unit",
            ),
        ];
        for (body, field) in cases {
            let (status, response) =
                send(&app, json_request("POST", "/api/grocery-list", &body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert!(response.get(field).is_some(), "{body} -> {response}");
        }
    }

    #[tokio::test]
    async fn patch_and_cleanup_checked_items() {
        let app = open_app();
        let (_, body) = send(
            &app,
            json_request(
                "POST",
                "/api/grocery-list",
                &json!({ "name": "eggs", "quantity": 6 }),
            ),
        )
        .await;
        let id = body["item"]["id"].as_i64().unwrap();

        let (status, body) = send(&app, empty_request("DELETE", "/api/grocery-list/checked")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 0);

        let (status, body) = send(
            &app,
            json_request(
                "PATCH",
                &format!("/api/grocery-list/{id}"),
                &json!({ "checked": true, "weight_unit": null }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["item"]["checked"], true);
        assert_eq!(body["item"]["quantity"], 6.0);

        let (_, body) = send(&app, empty_request("DELETE", "/api/grocery-list/checked")).await;
        assert_eq!(body["removed"], 1);
        assert_eq!(body["message"], "Removed 1 items from grocery list");
    }

    #[tokio::test]
    async fn patch_rejects_non_numeric_quantity() {
        let app = open_app();
        let (_, body) = send(
            &app,
            json_request(
                "POST",
                "/api/grocery-list",
                &json!({ "name": "milk", "quantity": 1, "volume_unit": "l" }),
            ),
        )
        .await;
        let id = body["item"]["id"].as_i64().unwrap();
        let (status, body) = send(
            &app,
            json_request(
                "PATCH",
                &format!("/api/grocery-list/{id}"),
                &json!({ "quantity": "lots" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("quantity").is_some());
    }

    #[tokio::test]
    async fn delete_grocery_item_then_404() {
        let app = open_app();
        let (_, body) = send(
            &app,
            json_request(
                "POST",
                "/api/grocery-list",
                &json!({ "name": "salt", "quantity": 1 }),
            ),
        )
        .await;
        let uri = format!("/api/grocery-list/{}", body["item"]["id"]);
        let (status, _) = send(&app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generate_without_generator_is_unavailable() {
        let app = open_app();
        let (status, _) = send(
            &app,
            json_request("POST", "/api/recipes/generate", &json!({ "prompt": "soup" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn generate_bad_unit_in_reply_is_bad_gateway() {
        let app = build_router(test_state(true, Some(Arc::new(BadUnitGenerator))));
        let (status, body) = send(
            &app,
            json_request("POST", "/api/recipes/generate", &json!({ "prompt": "soup" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("volume_unit"));
        assert!(body["raw"].as_str().unwrap().contains("pinch"));
    }

    #[tokio::test]
    async fn generate_preview_and_save() {
        let app = build_router(test_state(true, Some(Arc::new(CannedGenerator))));

        let (status, preview) = send(
            &app,
            json_request("POST", "/api/recipes/generate", &json!({ "prompt": "soup" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview["title"], "Tomato Soup");
        assert_eq!(preview["ingredients"][0]["quantity"], 800.0);

        let (status, _) = send(
            &app,
            json_request("POST", "/api/recipes/generate", &json!({ "prompt": " " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, saved) = send(
            &app,
            json_request(
                "POST",
                "/api/recipes/generate",
                &json!({ "prompt": "soup", "tags": ["vegan"], "save": true }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(saved["ingredients"].as_array().unwrap().len(), 2);

        let (_, recipes) = send(&app, empty_request("GET", "/api/recipes")).await;
        assert_eq!(recipes.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_and_delete_me() {
        let app = open_app();
        let (status, body) = send(
            &app,
            json_request("PATCH", "/api/users/me", &json!({ "username": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("username").is_some());

        let (status, body) = send(
            &app,
            json_request("PATCH", "/api/users/me", &json!({ "username": "kitchen" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "kitchen");

        let (_, me) = send(&app, empty_request("GET", "/api/users/me")).await;
        assert_eq!(me["username"], "kitchen");

        let (status, _) = send(&app, empty_request("DELETE", "/api/users/me")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, empty_request("GET", "/api/users/me")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
