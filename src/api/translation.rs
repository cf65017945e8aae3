use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing::{debug, info, warn};

use super::ApiError;
use crate::app::AppState;
use crate::store::LyricLine;
use crate::translation::{StartOutcome, TranslationProgressEvent, TranslationStatus};

#[derive(Debug, Serialize)]
pub(crate) struct AcceptedResponse {
    status: &'static str,
}

fn require_song_id(song_id: &str) -> Result<&str, ApiError> {
    let song_id = song_id.trim();
    if song_id.is_empty() {
        return Err(ApiError::bad_request("song_id must not be empty"));
    }
    Ok(song_id)
}

/// リアルタイム翻訳を開始する。実行中の曲への再要求も 202 で受理する。
pub(crate) async fn start_realtime(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let song_id = require_song_id(&song_id)?;
    match state.realtime().start(song_id) {
        StartOutcome::Started(_) => info!(song_id, "realtime translation accepted"),
        StartOutcome::AlreadyRunning => debug!(song_id, "realtime translation already running"),
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse { status: "accepted" }),
    ))
}

/// 指定曲の進捗イベントを SSE で流す。完了またはエラーを送った時点で閉じる。
pub(crate) async fn events(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let song_id = require_song_id(&song_id)?.to_string();
    let receiver = state.publisher().subscribe();
    debug!(song_id = %song_id, "translation event subscriber connected");
    Ok(Sse::new(song_events(receiver, song_id)).keep_alive(KeepAlive::default()))
}

fn song_events(
    receiver: Receiver<String>,
    song_id: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(Some((receiver, song_id)), |state| async move {
        let (mut receiver, song_id) = state?;
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    let Ok(event) = serde_json::from_str::<TranslationProgressEvent>(&payload) else {
                        warn!("dropping malformed translation event");
                        continue;
                    };
                    if event.song_id != song_id {
                        continue;
                    }
                    let terminal = matches!(
                        event.status,
                        TranslationStatus::Completed | TranslationStatus::Error
                    );
                    let next = (!terminal).then_some((receiver, song_id));
                    return Some((Ok(Event::default().event("translation").data(payload)), next));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(song_id = %song_id, skipped, "translation event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

pub(crate) async fn fill_missing(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> Result<Json<Vec<LyricLine>>, ApiError> {
    let song_id = require_song_id(&song_id)?;
    Ok(Json(state.batch().fill_missing_translations(song_id).await?))
}
