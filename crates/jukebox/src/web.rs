//! Web endpoints for Jukebox.
//!
//! The playback driver fetches compiled sequences by song name; the library
//! directory stays an internal detail behind the router.

use crate::library::{LibraryError, SongLibrary};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use midi_playback::{
    compile_sequence, decode_score, extract_simple_notes, reschedule_for_clarity, ClarityParams,
    CompileParams,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<SongLibrary>,
    pub started: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/midi-sequence", get(midi_sequence))
        .route("/midi-simple", get(midi_simple))
        .route("/songs", get(list_songs))
        .route("/health", get(health))
        .route("/", get(serve_root))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve root discovery endpoint
async fn serve_root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Jukebox",
        "version": env!("CARGO_PKG_VERSION"),
        "links": {
            "sequence": "/midi-sequence?file=<name>",
            "simple": "/midi-simple?file=<name>",
            "songs": "/songs",
            "health": "/health",
        }
    }))
}

#[derive(Debug, Deserialize)]
struct SequenceQuery {
    file: Option<String>,
    // Knobs stay raw strings; each one parses in the handler with its own
    // fallback so a garbage value can never reject the request
    polyphony: Option<String>,
    legacy: Option<String>,
    legacy_polyphony: Option<String>,
    legacy_window: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimpleQuery {
    file: Option<String>,
}

/// Compile a song into the advanced command sequence. `legacy=true` layers
/// the clarity reschedule on top of the capped output.
#[tracing::instrument(name = "http.sequence", skip(state))]
async fn midi_sequence(
    State(state): State<AppState>,
    query: Result<Query<SequenceQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_query_response(rejection),
    };
    let Some(file) = query.file else {
        return missing_file_response();
    };

    let score = match load_score(&state, &file).await {
        Ok(score) => score,
        Err(response) => return response,
    };

    let params = match parse_lenient(query.polyphony.as_deref()) {
        Some(n) => CompileParams {
            max_polyphony: n.max(1) as usize,
        },
        None => CompileParams::default(),
    };

    let mut commands = compile_sequence(&score, &params);

    if query.legacy.as_deref() == Some("true") {
        let mut clarity = ClarityParams::default();
        if let Some(n) = parse_lenient(query.legacy_polyphony.as_deref()) {
            clarity.max_polyphony = n.max(1) as usize;
        }
        if let Some(w) = parse_lenient(query.legacy_window.as_deref()) {
            clarity.max_shift_ticks = w.clamp(0, i64::from(u32::MAX)) as u32;
        }
        commands = reschedule_for_clarity(&commands, &clarity);
    }

    tracing::info!(
        file = %file,
        notes = score.note_count(),
        commands = commands.len(),
        "compiled sequence"
    );

    Json(commands).into_response()
}

/// Extract the note-only simple sequence for a song.
#[tracing::instrument(name = "http.simple", skip(state))]
async fn midi_simple(
    State(state): State<AppState>,
    query: Result<Query<SimpleQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_query_response(rejection),
    };
    let Some(file) = query.file else {
        return missing_file_response();
    };

    let score = match load_score(&state, &file).await {
        Ok(score) => score,
        Err(response) => return response,
    };

    let notes = extract_simple_notes(&score);
    tracing::info!(file = %file, notes = notes.len(), "extracted simple notes");

    Json(notes).into_response()
}

#[tracing::instrument(name = "http.songs", skip(state))]
async fn list_songs(State(state): State<AppState>) -> Response {
    match state.library.list().await {
        Ok(songs) => Json(songs).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

#[tracing::instrument(name = "http.health", skip(state))]
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (status, songs) = match state.library.list().await {
        Ok(songs) => ("healthy", songs.len()),
        Err(err) => {
            tracing::warn!(error = %err, "library listing failed");
            ("degraded", 0)
        }
    };
    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started.elapsed().as_secs(),
        "songs": songs,
    }))
}

/// Fetch and decode a song, mapping failures to their responses: bad names
/// to 400, missing songs to 404, I/O and decode errors to 500.
async fn load_score(state: &AppState, file: &str) -> Result<midi_playback::Score, Response> {
    let bytes = match state.library.load(file).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let status = match err {
                LibraryError::NotFound(_) => StatusCode::NOT_FOUND,
                LibraryError::InvalidName(_) => StatusCode::BAD_REQUEST,
                LibraryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            return Err((status, Json(serde_json::json!({"error": err.to_string()}))).into_response());
        }
    };

    decode_score(&bytes).map_err(|err| {
        tracing::warn!(file = %file, error = %err, "failed to decode song");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response()
    })
}

/// Numeric query knobs are lenient: absent and unparseable values both read
/// as absent, so the defaults and clamps apply instead of a rejection.
fn parse_lenient(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.parse().ok())
}

fn missing_file_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": "\"file\" is required"})),
    )
        .into_response()
}

fn bad_query_response(rejection: QueryRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": rejection.body_text()})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Format-1 file: tempo track at 120 BPM plus one melody track with
    /// C4 then E4, each half a second long.
    fn song_midi() -> Vec<u8> {
        let notes = vec![
            0x00, 0x90, 60, 100, //
            0x83, 0x60, 0x80, 60, 0, //
            0x00, 0x90, 64, 100, //
            0x83, 0x60, 0x80, 64, 0, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        build_midi(&[tempo_track(), notes])
    }

    /// Eight-note chord at tick 0, half a second long.
    fn chord_midi() -> Vec<u8> {
        let mut notes = Vec::new();
        for pitch in 60u8..68 {
            notes.extend_from_slice(&[0x00, 0x90, pitch, 100]);
        }
        notes.extend_from_slice(&[0x83, 0x60, 0x80, 60, 0]);
        for pitch in 61u8..68 {
            notes.extend_from_slice(&[0x00, 0x80, pitch, 0]);
        }
        notes.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        build_midi(&[tempo_track(), notes])
    }

    fn tempo_track() -> Vec<u8> {
        vec![
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, //
            0x00, 0xFF, 0x2F, 0x00,
        ]
    }

    fn build_midi(tracks: &[Vec<u8>]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        buf.extend_from_slice(&480u16.to_be_bytes());
        for track in tracks {
            buf.extend_from_slice(b"MTrk");
            buf.extend_from_slice(&(track.len() as u32).to_be_bytes());
            buf.extend_from_slice(track);
        }
        buf
    }

    fn setup_test_state() -> (AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("song.mid"), song_midi()).unwrap();
        std::fs::write(temp_dir.path().join("chord.mid"), chord_midi()).unwrap();
        std::fs::write(temp_dir.path().join("broken.mid"), b"not a midi file").unwrap();

        let state = AppState {
            library: Arc::new(SongLibrary::new(temp_dir.path())),
            started: Instant::now(),
        };
        (state, temp_dir)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn sequence_returns_commands_in_wire_shape() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let (status, json) = get_json(app, "/midi-sequence?file=song.mid").await;
        assert_eq!(status, StatusCode::OK);

        let commands = json.as_array().unwrap();
        assert_eq!(commands.len(), 2);

        let first = &commands[0];
        assert_eq!(first["tick"], 0);
        assert_eq!(first["pitch"], 60);
        assert_eq!(first["instrument"], "planks");
        assert_eq!(first["pan"], 0.5);
        assert_eq!(first["volume"], 1.0);
        assert!(first.get("pitchBend").is_some());

        // The second note appears at its onset tick; the first was released
        // by the same-tick note-off
        assert_eq!(commands[1]["tick"], 10);
        assert_eq!(commands[1]["pitch"], 64);
    }

    #[tokio::test]
    async fn sequence_without_file_param_is_bad_request() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let (status, json) = get_json(app, "/midi-sequence").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn sequence_for_unknown_song_is_not_found() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let (status, json) = get_json(app, "/midi-sequence?file=nope.mid").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("nope.mid"));
    }

    #[tokio::test]
    async fn sequence_rejects_names_that_escape_the_library() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let (status, _json) = get_json(app, "/midi-sequence?file=a%2Fb.mid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sequence_for_malformed_song_reports_server_error() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let (status, json) = get_json(app, "/midi-sequence?file=broken.mid").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("MIDI parse error"));
    }

    #[tokio::test]
    async fn polyphony_param_caps_each_tick() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let (status, json) = get_json(app, "/midi-sequence?file=chord.mid&polyphony=3").await;
        assert_eq!(status, StatusCode::OK);

        let commands = json.as_array().unwrap();
        assert_eq!(commands.len(), 3);
        assert!(commands.iter().all(|c| c["tick"] == 0));
    }

    #[tokio::test]
    async fn legacy_mode_reschedules_for_clarity() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let uri =
            "/midi-sequence?file=chord.mid&legacy=true&legacy_polyphony=2&legacy_window=0";
        let (status, json) = get_json(app, uri).await;
        assert_eq!(status, StatusCode::OK);

        // Eight simultaneous notes, window zero: two survive, the rest drop
        let commands = json.as_array().unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|c| c["tick"] == 0));
    }

    #[tokio::test]
    async fn out_of_range_polyphony_clamps_instead_of_rejecting() {
        let (state, _temp_dir) = setup_test_state();

        // chord.mid holds eight simultaneous notes; both values clamp to 1
        for uri in [
            "/midi-sequence?file=chord.mid&polyphony=0",
            "/midi-sequence?file=chord.mid&polyphony=-1",
        ] {
            let (status, json) = get_json(router(state.clone()), uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(json.as_array().unwrap().len(), 1, "{uri}");
        }
    }

    #[tokio::test]
    async fn unparseable_knobs_read_as_absent() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let uri = "/midi-sequence?file=chord.mid&polyphony=abc&legacy=yes&legacy_polyphony=x&legacy_window=";
        let (status, json) = get_json(app, uri).await;
        assert_eq!(status, StatusCode::OK);

        // polyphony falls back to the default cap of 8, and `yes` is not
        // `true`, so the whole chord comes through untouched
        assert_eq!(json.as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn negative_legacy_window_clamps_to_zero() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let uri =
            "/midi-sequence?file=chord.mid&legacy=true&legacy_polyphony=2&legacy_window=-4";
        let (status, json) = get_json(app, uri).await;
        assert_eq!(status, StatusCode::OK);

        let commands = json.as_array().unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|c| c["tick"] == 0));
    }

    #[tokio::test]
    async fn undecodable_query_strings_report_the_json_error_shape() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        // Repeated keys are one of the few malformations string-typed
        // fields still reject
        let (status, json) = get_json(app, "/midi-sequence?file=song.mid&file=song.mid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn simple_returns_folded_notes() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let (status, json) = get_json(app, "/midi-simple?file=song.mid").await;
        assert_eq!(status, StatusCode::OK);

        let notes = json.as_array().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0]["tick"], 0);
        assert_eq!(notes[0]["pitch"], 6);
        assert_eq!(notes[1]["tick"], 10);
        assert_eq!(notes[1]["pitch"], 10);
    }

    #[tokio::test]
    async fn songs_lists_the_library() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let (status, json) = get_json(app, "/songs").await;
        assert_eq!(status, StatusCode::OK);

        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["broken.mid", "chord.mid", "song.mid"]);
    }

    #[tokio::test]
    async fn health_reports_song_count() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["songs"], 3);
    }

    #[tokio::test]
    async fn health_degrades_when_the_library_is_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let state = AppState {
            library: Arc::new(SongLibrary::new(temp_dir.path().join("missing"))),
            started: Instant::now(),
        };
        let app = router(state);

        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["songs"], 0);
    }
}
