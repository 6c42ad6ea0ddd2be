use crate::{
    chat::{
        chat_dto::{CreateGroupChatRequest, RenameGroupChatRequest},
        chat_handlers,
        chat_models::ChatResponse,
    },
    message::{
        message_dto::SendMessageRequest,
        message_handlers,
        message_models::{Attachment, MessageResponse, MessageType},
    },
    middleware::auth_middleware,
    state::AppState,
    user::user_models::PublicUser,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Upper bound for a message request including its attachments.
const MAX_MESSAGE_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::chat::chat_handlers::list_chats,
        crate::chat::chat_handlers::create_or_get_direct_chat,
        crate::chat::chat_handlers::delete_direct_chat,
        crate::chat::chat_handlers::create_group_chat,
        crate::chat::chat_handlers::get_group_chat,
        crate::chat::chat_handlers::rename_group_chat,
        crate::chat::chat_handlers::delete_group_chat,
        crate::message::message_handlers::get_messages,
        crate::message::message_handlers::send_message,
        crate::message::message_handlers::delete_message,
    ),
    components(
        schemas(
            CreateGroupChatRequest,
            RenameGroupChatRequest,
            SendMessageRequest,
            ChatResponse,
            MessageResponse,
            MessageType,
            Attachment,
            PublicUser,
        )
    ),
    tags(
        (name = "chats", description = "One-on-one and group chat endpoints"),
        (name = "messages", description = "Chat message endpoints")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let chat_routes = Router::new()
        .route("/", get(chat_handlers::list_chats))
        .route(
            "/c/:recipient_id",
            post(chat_handlers::create_or_get_direct_chat)
                .delete(chat_handlers::delete_direct_chat),
        )
        .route("/group", post(chat_handlers::create_group_chat))
        .route(
            "/group/:chat_id",
            get(chat_handlers::get_group_chat)
                .patch(chat_handlers::rename_group_chat)
                .delete(chat_handlers::delete_group_chat),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // GET/POST take a chat id, DELETE a message id.
    let message_routes = Router::new()
        .route(
            "/:id",
            get(message_handlers::get_messages)
                .post(message_handlers::send_message)
                .delete(message_handlers::delete_message),
        )
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_BODY_BYTES))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // WebSocket route
    let ws_routes = Router::new()
        .route("/ws", get(crate::websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .nest("/chats", chat_routes)
        .nest("/messages", message_routes)
        .merge(ws_routes);

    let uploads = ServeDir::new(state.config.upload_dir.clone());

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .nest_service("/images", uploads)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn authed(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"));
        match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_requests_without_token_are_rejected() {
        let ctx = TestContext::new().await;
        let app = create_router(ctx.state.clone());

        let request = Request::builder().uri("/api/chats").body(Body::empty()).unwrap();
        let (status, body) = call(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
    }

    #[tokio::test]
    async fn test_direct_chat_status_distinguishes_created_and_found() {
        let ctx = TestContext::new().await;
        let app = create_router(ctx.state.clone());
        let token = ctx.token(ctx.alice);
        let uri = format!("/api/chats/c/{}", ctx.bob);

        let (status, created) = call(&app, authed(Method::POST, &uri, &token, None)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "One on one chat");

        let (status, found) = call(&app, authed(Method::POST, &uri, &token, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["id"], created["id"]);
    }

    #[tokio::test]
    async fn test_group_lifecycle_over_http() {
        let ctx = TestContext::new().await;
        let app = create_router(ctx.state.clone());
        let alice = ctx.token(ctx.alice);
        let bob = ctx.token(ctx.bob);

        let (status, group) = call(
            &app,
            authed(
                Method::POST,
                "/api/chats/group",
                &alice,
                Some(json!({ "name": "Team", "participant_ids": [ctx.bob, ctx.carol] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let group_uri = format!("/api/chats/group/{}", group["id"].as_str().unwrap());

        let (status, _) = call(
            &app,
            authed(Method::PATCH, &group_uri, &bob, Some(json!({ "name": "Nope" }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, renamed) = call(
            &app,
            authed(Method::PATCH, &group_uri, &alice, Some(json!({ "name": "Team X" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["name"], "Team X");

        let message_uri = format!("/api/messages/{}", group["id"].as_str().unwrap());
        let (status, sent) = call(
            &app,
            authed(Method::POST, &message_uri, &bob, Some(json!({ "content": "hello team" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["message_type"], "text");

        let (status, messages) = call(&app, authed(Method::GET, &message_uri, &alice, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(messages[0]["content"], "hello team");

        let (status, _) = call(&app, authed(Method::DELETE, &group_uri, &alice, None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, authed(Method::GET, &group_uri, &alice, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_text_message_is_bad_request() {
        let ctx = TestContext::new().await;
        let app = create_router(ctx.state.clone());
        let chat = ctx.direct_chat(ctx.alice, ctx.bob).await;
        let uri = format!("/api/messages/{}", chat.id);

        let (status, body) = call(
            &app,
            authed(Method::POST, &uri, &ctx.token(ctx.alice), Some(json!({ "content": "" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message content is required");
    }

    #[tokio::test]
    async fn test_multipart_send_stores_attachments() {
        let ctx = TestContext::new().await;
        let app = create_router(ctx.state.clone());
        let chat = ctx.direct_chat(ctx.alice, ctx.bob).await;

        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"message_type\"\r\n\r\nimage\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"content\"\r\n\r\nlook\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"attachments\"; filename=\"cat.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/messages/{}", chat.id))
            .header(AUTHORIZATION, format!("Bearer {}", ctx.token(ctx.alice)))
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();

        let (status, sent) = call(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["message_type"], "image");
        assert_eq!(sent["content"], "look");
        let local_path = sent["attachments"][0]["local_path"].as_str().unwrap();
        assert_eq!(std::fs::read(local_path).unwrap(), b"PNGDATA");
        assert!(sent["attachments"][0]["url"].as_str().unwrap().ends_with("-cat.png"));
    }

    #[tokio::test]
    async fn test_multipart_content_length_is_limited() {
        let ctx = TestContext::new().await;
        let app = create_router(ctx.state.clone());
        let chat = ctx.direct_chat(ctx.alice, ctx.bob).await;

        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"message_type\"\r\n\r\nfile\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"content\"\r\n\r\n{long}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"attachments\"; filename=\"a.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nDATA\r\n--{b}--\r\n",
            b = boundary,
            long = "x".repeat(10_001)
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/messages/{}", chat.id))
            .header(AUTHORIZATION, format!("Bearer {}", ctx.token(ctx.alice)))
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();

        let (status, _) = call(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let leftover = std::fs::read_dir(&ctx.state.config.upload_dir).unwrap().count();
        assert_eq!(leftover, 0);
    }
}
