use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::info;

use super::ApiError;
use crate::app::AppState;
use crate::pipeline::MergedResult;
use crate::store::SongScope;

#[derive(Debug, Deserialize)]
pub(crate) struct ParseRequest {
    lyrics: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParseAndSaveRequest {
    song_id: String,
    lyrics: String,
    #[serde(default)]
    situation: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ContextQuery {
    #[serde(default)]
    situation: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

fn scope(song_id: &str, situation: Option<String>, location: Option<String>) -> Result<SongScope, ApiError> {
    let song_id = song_id.trim();
    if song_id.is_empty() {
        return Err(ApiError::bad_request("song_id must not be empty"));
    }
    Ok(SongScope::song(song_id).with_context(situation, location))
}

fn require_lyrics(lyrics: &str) -> Result<(), ApiError> {
    if lyrics.trim().is_empty() {
        return Err(ApiError::bad_request("lyrics must not be empty"));
    }
    Ok(())
}

pub(crate) async fn parse(
    State(state): State<AppState>,
    Json(payload): Json<ParseRequest>,
) -> Result<Json<MergedResult>, ApiError> {
    require_lyrics(&payload.lyrics)?;
    Ok(Json(state.pipeline().parse(&payload.lyrics).await))
}

pub(crate) async fn parse_and_save(
    State(state): State<AppState>,
    Json(payload): Json<ParseAndSaveRequest>,
) -> Result<Json<MergedResult>, ApiError> {
    let scope = scope(&payload.song_id, payload.situation, payload.location)?;
    require_lyrics(&payload.lyrics)?;
    let result = state
        .pipeline()
        .parse_and_save(&scope, &payload.lyrics)
        .await?;
    info!(song_id = %scope.song_id, items = result.total_items(), "parse-and-save finished");
    Ok(Json(result))
}

pub(crate) async fn parse_song(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
    Query(context): Query<ContextQuery>,
) -> Result<Json<MergedResult>, ApiError> {
    let scope = scope(&song_id, context.situation, context.location)?;
    Ok(Json(state.pipeline().parse_and_save_by_song(&scope).await?))
}

pub(crate) async fn stored_lexicon(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
    Query(context): Query<ContextQuery>,
) -> Result<Json<MergedResult>, ApiError> {
    let scope = scope(&song_id, context.situation, context.location)?;
    Ok(Json(state.pipeline().persistence().load_as_json(&scope).await?))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::app::{build_router, tests::test_registry};

    async fn backend_returning(content: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": content.to_string() } }]
            })))
            .mount(&server)
            .await;
        server
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&body).expect("json")
    }

    #[tokio::test]
    async fn parse_returns_merged_collections() {
        let server = backend_returning(json!({
            "words": [{ "word": "Hello", "meaning": "greeting", "level": "beginner" }],
            "expressions": [],
            "idioms": [],
            "sentences": [{ "sentence": "Hello there", "translation": "안녕" }]
        }))
        .await;
        let router = build_router(test_registry(&format!("{}/v1/chat/completions", server.uri())));

        let response = router
            .oneshot(post_json(
                "/v1/lyrics/parse",
                &json!({ "lyrics": "Hello there\nGeneral Kenobi" }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["words"][0]["level"], "A1");
        assert_eq!(body["sentences"][0]["translation"], "안녕");
        assert_eq!(body["idioms"], json!([]));
    }

    #[tokio::test]
    async fn parse_rejects_blank_lyrics() {
        let router = build_router(test_registry("http://localhost:18080/v1/chat/completions"));

        let response = router
            .oneshot(post_json("/v1/lyrics/parse", &json!({ "lyrics": "   " })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "lyrics must not be empty");
    }

    #[tokio::test]
    async fn parse_and_save_then_read_back_stored_view() {
        let server = backend_returning(json!({
            "words": [{ "word": "kenobi", "meaning": "a name" }, { "word": "general", "meaning": " " }],
            "expressions": [],
            "idioms": [],
            "sentences": []
        }))
        .await;
        let router = build_router(test_registry(&format!("{}/v1/chat/completions", server.uri())));

        let response = router
            .clone()
            .oneshot(post_json(
                "/v1/lyrics/parse-and-save",
                &json!({ "song_id": "song-1", "lyrics": "Hello there\nGeneral Kenobi" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["words"].as_array().map(Vec::len), Some(2));

        let response = router
            .oneshot(
                Request::get("/v1/songs/song-1/lexicon")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let stored = json_body(response).await;
        assert_eq!(stored["words"], json!([{ "word": "kenobi", "meaning": "a name" }]));
    }

    #[tokio::test]
    async fn parse_song_without_stored_song_is_not_found() {
        let router = build_router(test_registry("http://localhost:18080/v1/chat/completions"));

        let response = router
            .oneshot(
                Request::post("/v1/songs/unknown/lexicon")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
