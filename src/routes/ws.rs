//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Broadcast frames from school peers → forward to client
//!
//! Handler functions are pure business logic — they validate, mutate state,
//! and return an `Outcome`. The dispatch layer owns all outbound concerns:
//! reply to sender and broadcast to peers.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `client_id`
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast / both)
//! 4. Close → broadcast `school:part` → cleanup

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{Data, FRAME_DELETED, Frame};
use crate::services;
use crate::services::insights;
use crate::services::record::normalize_school_code;
use crate::state::{AbsenceRecord, AppState};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what — handlers never send frames directly.
enum Outcome {
    /// Broadcast done+data to ALL school clients including sender.
    /// Sender's copy carries `parent_id` for correlation.
    Broadcast(Data),
    /// Send done+data to sender only.
    Reply(Data),
    /// Reply to sender with one payload, broadcast different data to peers.
    ReplyAndBroadcast { reply: Data, broadcast: Data },
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcast frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);

    let welcome = Frame::request("session:connected", Data::new()).with_data("client_id", client_id.to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    info!(%client_id, "ws: client connected");

    // Track which school this client has joined.
    let mut current_school: Option<String> = None;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let sender_frames =
                            process_inbound_text(&state, &mut current_school, client_id, &client_tx, &text).await;
                        for frame in sender_frames {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    // Broadcast school:part to peers BEFORE cleanup (part may evict state).
    if let Some(school_code) = current_school {
        let part_frame = Frame::request("school:part", Data::new())
            .with_school(school_code.clone())
            .with_data("client_id", client_id.to_string());
        services::record::broadcast(&state, &school_code, &part_frame, Some(client_id)).await;

        services::record::part_school(&state, &school_code, client_id).await;
    }
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Keeps websocket transport concerns separate from frame handling so tests
/// can exercise dispatch and broadcast behavior end-to-end.
async fn process_inbound_text(
    state: &AppState,
    current_school: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    text: &str,
) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    info!(%client_id, id = %req.id, syscall = %req.syscall, status = ?req.status, "ws: recv frame");

    // Dispatch to handler — returns Outcome or error Frame.
    let result = match req.prefix() {
        "school" => handle_school(state, current_school, client_id, client_tx, &req).await,
        "record" => handle_record(state, current_school.as_deref(), &req).await,
        "user" => handle_user(state, &req).await,
        "ai" => handle_ai(state, current_school.as_deref(), &req).await,
        prefix => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    // Apply outcome — the dispatch layer owns all outbound logic.
    let school_code = current_school.clone();
    match result {
        Ok(Outcome::Broadcast(data)) => {
            let sender_frame = req.done_with(data);
            // Peers get a copy without parent_id (they didn't originate the request).
            let mut peer_frame = sender_frame.clone();
            peer_frame.id = Uuid::new_v4();
            peer_frame.parent_id = None;
            if let Some(code) = school_code {
                services::record::broadcast(state, &code, &peer_frame, Some(client_id)).await;
            }
            vec![sender_frame]
        }
        Ok(Outcome::Reply(data)) => {
            vec![req.done_with(data)]
        }
        Ok(Outcome::ReplyAndBroadcast { reply, broadcast }) => {
            let sender_frame = req.done_with(reply);
            if let Some(code) = school_code {
                let notif = Frame::request(&req.syscall, broadcast).with_school(code.clone());
                services::record::broadcast(state, &code, &notif, Some(client_id)).await;
            }
            vec![sender_frame]
        }
        Err(err_frame) => {
            vec![err_frame]
        }
    }
}

// =============================================================================
// SCHOOL HANDLERS
// =============================================================================

async fn handle_school(
    state: &AppState,
    current_school: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    req: &Frame,
) -> Result<Outcome, Frame> {
    match req.op() {
        "join" => {
            let school_code = normalize_school_code(school_code_of(req).unwrap_or_default());

            // Part the current school if already joined.
            if let Some(old_school) = current_school.take() {
                services::record::part_school(state, &old_school, client_id).await;
            }

            match services::record::join_school(state, &school_code, client_id, client_tx.clone()).await {
                Ok(records) => {
                    *current_school = Some(school_code);

                    let mut reply = Data::new();
                    reply.insert("records".into(), serde_json::to_value(&records).unwrap_or_default());

                    let mut broadcast = Data::new();
                    broadcast.insert("client_id".into(), serde_json::json!(client_id));

                    Ok(Outcome::ReplyAndBroadcast { reply, broadcast })
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown school op: {op}"))),
    }
}

// =============================================================================
// RECORD HANDLERS
// =============================================================================

async fn handle_record(state: &AppState, current_school: Option<&str>, req: &Frame) -> Result<Outcome, Frame> {
    let Some(school_code) = current_school else {
        return Err(req.error("must join a school first"));
    };

    match req.op() {
        "save" => {
            let record: AbsenceRecord =
                match serde_json::from_value(serde_json::Value::Object(req.data.clone().into_iter().collect())) {
                    Ok(record) => record,
                    Err(e) => return Err(req.error(format!("invalid record payload: {e}"))),
                };

            match services::record::save_record(state, school_code, record).await {
                Ok(saved) => Ok(Outcome::Broadcast(record_to_data(&saved))),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "delete" => {
            let Some(record_id) = uuid_of(req, "id") else {
                return Err(req.error("id required"));
            };

            match services::record::delete_record(state, school_code, record_id).await {
                Ok(()) => {
                    let mut data = Data::new();
                    data.insert("id".into(), serde_json::json!(record_id));
                    data.insert(FRAME_DELETED.into(), serde_json::json!(true));
                    Ok(Outcome::Broadcast(data))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "clear" => match services::record::clear_records(state, school_code).await {
            Ok(cleared) => {
                let mut data = Data::new();
                data.insert("cleared".into(), serde_json::json!(cleared));
                Ok(Outcome::Broadcast(data))
            }
            Err(e) => Err(req.error_from(&e)),
        },
        op => Err(req.error(format!("unknown record op: {op}"))),
    }
}

// =============================================================================
// USER HANDLERS
// =============================================================================

/// User ops carry their own school code: login happens before joining.
async fn handle_user(state: &AppState, req: &Frame) -> Result<Outcome, Frame> {
    let school_code = normalize_school_code(school_code_of(req).unwrap_or_default());

    match req.op() {
        "sync" => {
            let payload: services::user::UserPayload =
                match serde_json::from_value(serde_json::Value::Object(req.data.clone().into_iter().collect())) {
                    Ok(payload) => payload,
                    Err(e) => return Err(req.error(format!("invalid user payload: {e}"))),
                };

            match services::user::sync_user(&state.pool, &school_code, payload).await {
                Ok(user) => Ok(Outcome::Reply(user_to_data(&user))),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "find" => {
            let Some(email) = req.data.get("email").and_then(|v| v.as_str()) else {
                return Err(req.error("email required"));
            };

            match services::user::find_user(&state.pool, &school_code, email).await {
                Ok(Some(user)) => {
                    let mut data = user_to_data(&user);
                    data.insert("found".into(), serde_json::json!(true));
                    Ok(Outcome::Reply(data))
                }
                Ok(None) => {
                    let mut data = Data::new();
                    data.insert("found".into(), serde_json::json!(false));
                    Ok(Outcome::Reply(data))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown user op: {op}"))),
    }
}

// =============================================================================
// AI HANDLERS
// =============================================================================

async fn handle_ai(state: &AppState, current_school: Option<&str>, req: &Frame) -> Result<Outcome, Frame> {
    let Some(school_code) = current_school else {
        return Err(req.error("must join a school first"));
    };

    match req.op() {
        "insights" => {
            let records = match services::record::list_records(state, school_code).await {
                Ok(records) => records,
                Err(e) => return Err(req.error_from(&e)),
            };

            // Nothing to analyze — reply empty rather than bothering the model.
            let report = if records.is_empty() {
                insights::InsightReport { insights: Vec::new() }
            } else if let Some(llm) = &state.llm {
                insights::attendance_insights(llm.as_ref(), &records).await
            } else {
                insights::InsightReport::fallback()
            };

            let mut data = Data::new();
            data.insert("insights".into(), serde_json::to_value(report.insights).unwrap_or_default());
            Ok(Outcome::Reply(data))
        }
        "message" => {
            let teacher_name = req
                .data
                .get("teacherName")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let student_names: Vec<String> = req
                .data
                .get("studentNames")
                .and_then(|v| v.as_array())
                .map(|names| {
                    names
                        .iter()
                        .filter_map(|n| n.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            let date = req.data.get("date").and_then(|v| v.as_str()).unwrap_or("");

            let text = match &state.llm {
                Some(llm) => insights::professional_message(llm.as_ref(), teacher_name, &student_names, date).await,
                None => insights::MESSAGE_FALLBACK.to_string(),
            };

            let mut data = Data::new();
            data.insert("text".into(), serde_json::json!(text));
            Ok(Outcome::Reply(data))
        }
        op => Err(req.error(format!("unknown ai op: {op}"))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn school_code_of(req: &Frame) -> Option<&str> {
    req.school_code
        .as_deref()
        .or_else(|| req.data.get("schoolCode").and_then(|v| v.as_str()))
}

fn uuid_of(req: &Frame, key: &str) -> Option<Uuid> {
    req.data
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

fn record_to_data(record: &AbsenceRecord) -> Data {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => Data::new(),
    }
}

fn user_to_data(user: &services::user::SchoolUser) -> Data {
    match serde_json::to_value(user) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => Data::new(),
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == crate::frame::Status::Error {
        let code = frame
            .data
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let message = frame
            .data
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
