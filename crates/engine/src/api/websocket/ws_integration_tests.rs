use super::test_support::*;
use super::*;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use tablekeep_domain::{
    sections, ActionId, ActionRequest, Document, Position, SessionState, Token, TokenId,
};
use tablekeep_shared::{rejection_codes, JoinError, ParticipantRole, Replica, ReplicaUpdate};

use crate::api::connections::participant_id_for;
use crate::extensions::{Extension, ExtensionContext};
use crate::app::App;
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::ports::{MockSnapshotStore, RepoError, SnapshotStore};
use crate::registry::{ActionHandler, ExecuteError, RegistryError, ValidationError};
use crate::use_cases::tokens::MOVE_TOKEN;

const QUIET: Duration = Duration::from_millis(200);

struct Fixture {
    session: SessionState,
    token: TokenId,
}

/// A session with one token owned by user "ana".
fn fixture() -> Fixture {
    let doc = Document::new("character", "Ana's Ranger").with_owner(participant_id_for("ana"));
    let token = Token::new(doc.id, Position { x: 0.0, y: 0.0 });
    let token_id = token.id;
    Fixture {
        session: SessionState::new(SessionId::new())
            .with_document(doc)
            .with_token(token),
        token: token_id,
    }
}

async fn join(
    ws: &mut WsClient,
    session_id: SessionId,
    user: &str,
    role: ParticipantRole,
) -> ServerMessage {
    ws_send_client(
        ws,
        &ClientMessage::JoinSession {
            session_id,
            user_id: user.to_string(),
            role,
        },
    )
    .await;
    ws_expect_message(ws, RECV_TIMEOUT, |m| {
        matches!(
            m,
            ServerMessage::SessionJoined { .. } | ServerMessage::SessionJoinFailed { .. }
        )
    })
    .await
}

async fn joined_replica(
    ws: &mut WsClient,
    session_id: SessionId,
    user: &str,
    role: ParticipantRole,
) -> Replica {
    match join(ws, session_id, user, role).await {
        ServerMessage::SessionJoined { snapshot, .. } => Replica::new(snapshot),
        other => panic!("join failed: {other:?}"),
    }
}

fn move_token(session_id: SessionId, token: TokenId, x: f64) -> ClientMessage {
    ClientMessage::ActionRequest {
        request_id: ActionId::new(),
        session_id,
        action: MOVE_TOKEN.to_string(),
        parameters: json!({ "tokenId": token, "x": x, "y": 1.0 }),
    }
}

fn is_patch(m: &ServerMessage) -> bool {
    matches!(m, ServerMessage::StatePatch { .. })
}

#[tokio::test]
async fn patches_reach_every_participant_in_order() {
    let f = fixture();
    let session_id = f.session.session_id;
    let (app, _store) = build_test_app(vec![f.session.clone()]);
    let (addr, server) = spawn_ws_server(app).await;

    let mut leader = ws_connect(addr).await;
    let mut player = ws_connect(addr).await;
    let mut leader_view = joined_replica(&mut leader, session_id, "gm", ParticipantRole::Leader).await;
    let mut player_view = joined_replica(&mut player, session_id, "ana", ParticipantRole::Player).await;
    assert_eq!(player_view.state(), &f.session);

    ws_send_client(&mut player, &move_token(session_id, f.token, 3.0)).await;
    ws_send_client(&mut player, &move_token(session_id, f.token, 4.0)).await;

    for (ws, view) in [(&mut leader, &mut leader_view), (&mut player, &mut player_view)] {
        for expected in [1, 2] {
            let patch = ws_expect_message(ws, RECV_TIMEOUT, is_patch).await;
            assert_eq!(view.handle(&patch).expect("apply"), ReplicaUpdate::Applied(expected));
        }
    }

    let token = player_view.state().token(f.token).expect("token");
    assert_eq!(token.position, Position { x: 4.0, y: 1.0 });
    assert_eq!(leader_view.state(), player_view.state());

    server.abort();
}

#[tokio::test]
async fn rejection_goes_to_the_submitter_only() {
    let f = fixture();
    let session_id = f.session.session_id;
    let (app, _store) = build_test_app(vec![f.session]);
    let (addr, server) = spawn_ws_server(app).await;

    let mut leader = ws_connect(addr).await;
    let mut intruder = ws_connect(addr).await;
    join(&mut leader, session_id, "gm", ParticipantRole::Leader).await;
    join(&mut intruder, session_id, "zed", ParticipantRole::Player).await;

    ws_send_client(&mut intruder, &move_token(session_id, f.token, 9.0)).await;

    let rejected = ws_expect_message(&mut intruder, RECV_TIMEOUT, |m| {
        matches!(m, ServerMessage::ActionRejected { .. })
    })
    .await;
    assert!(matches!(
        rejected,
        ServerMessage::ActionRejected { ref error_code, .. } if error_code == "not_document_owner"
    ));
    ws_expect_no_message_matching(&mut leader, QUIET, |m| {
        is_patch(m) || matches!(m, ServerMessage::ActionRejected { .. })
    })
    .await;

    server.abort();
}

#[tokio::test]
async fn unknown_actions_are_rejected() {
    let f = fixture();
    let session_id = f.session.session_id;
    let (app, _store) = build_test_app(vec![f.session]);
    let (addr, server) = spawn_ws_server(app).await;

    let mut player = ws_connect(addr).await;
    join(&mut player, session_id, "ana", ParticipantRole::Player).await;
    ws_send_client(
        &mut player,
        &ClientMessage::ActionRequest {
            request_id: ActionId::new(),
            session_id,
            action: "summon-dragon".to_string(),
            parameters: json!({}),
        },
    )
    .await;

    let rejected = ws_expect_message(&mut player, RECV_TIMEOUT, |m| {
        matches!(m, ServerMessage::ActionRejected { .. })
    })
    .await;
    assert!(matches!(
        rejected,
        ServerMessage::ActionRejected { ref error_code, .. }
            if error_code == rejection_codes::UNKNOWN_ACTION
    ));

    server.abort();
}

#[tokio::test]
async fn store_failure_on_join_reports_a_generic_reason() {
    let mut store = MockSnapshotStore::new();
    store
        .expect_load()
        .returning(|_| Err(RepoError::storage("load", "disk /var/lib/tk full")));
    let app = App::new(EngineConfig::default(), Arc::new(store)).expect("app");
    let (addr, server) = spawn_ws_server(Arc::new(app)).await;

    let mut player = ws_connect(addr).await;
    let session_id = SessionId::new();
    let reply = join(&mut player, session_id, "ana", ParticipantRole::Player).await;

    assert_eq!(
        reply,
        ServerMessage::SessionJoinFailed {
            session_id,
            error: JoinError::SessionUnavailable {
                message: "An error occurred while starting the session".to_string(),
            },
        }
    );

    server.abort();
}

#[tokio::test]
async fn second_leader_is_turned_away() {
    let f = fixture();
    let session_id = f.session.session_id;
    let (app, _store) = build_test_app(vec![f.session]);
    let (addr, server) = spawn_ws_server(app).await;

    let mut first = ws_connect(addr).await;
    let mut second = ws_connect(addr).await;
    join(&mut first, session_id, "gm", ParticipantRole::Leader).await;

    let failed = join(&mut second, session_id, "gm-2", ParticipantRole::Leader).await;
    assert_eq!(
        failed,
        ServerMessage::SessionJoinFailed {
            session_id,
            error: JoinError::LeaderAlreadyConnected {
                existing_user_id: "gm".to_string()
            },
        }
    );

    server.abort();
}

/// Handler that needs the leader's sign-off before granting inspiration.
struct GrantInspiration;

#[async_trait]
impl ActionHandler for GrantInspiration {
    fn requires_manual_approval(&self) -> bool {
        true
    }

    fn approval_message(&self, _request: &ActionRequest) -> Option<String> {
        Some("Grant inspiration?".to_string())
    }

    async fn validate(
        &self,
        _request: &ActionRequest,
        _state: &SessionState,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    async fn execute(
        &self,
        _request: &ActionRequest,
        draft: &mut SessionState,
    ) -> Result<(), ExecuteError> {
        for doc in draft.documents.values_mut() {
            doc.set_section(sections::SESSION_STATE, json!({ "inspiration": true }));
        }
        Ok(())
    }
}

struct Inspiration;

impl Extension for Inspiration {
    fn id(&self) -> &str {
        "inspiration"
    }

    fn register(&self, ctx: &mut ExtensionContext) -> Result<(), RegistryError> {
        ctx.register_handler("grant-inspiration", 0, Arc::new(GrantInspiration))
    }
}

#[tokio::test]
async fn approval_round_trip_over_the_socket() {
    let f = fixture();
    let session_id = f.session.session_id;
    let (app, _store) = build_test_app(vec![f.session]);
    app.extensions.load(&Inspiration).expect("load");
    let (addr, server) = spawn_ws_server(app).await;

    let mut leader = ws_connect(addr).await;
    let mut player = ws_connect(addr).await;
    join(&mut leader, session_id, "gm", ParticipantRole::Leader).await;
    join(&mut player, session_id, "ana", ParticipantRole::Player).await;

    let request_id = ActionId::new();
    ws_send_client(
        &mut player,
        &ClientMessage::ActionRequest {
            request_id,
            session_id,
            action: "grant-inspiration".to_string(),
            parameters: json!({}),
        },
    )
    .await;

    ws_expect_message(&mut player, RECV_TIMEOUT, |m| {
        *m == ServerMessage::ApprovalPending { request_id }
    })
    .await;
    let required = ws_expect_message(&mut leader, RECV_TIMEOUT, |m| {
        matches!(m, ServerMessage::ApprovalRequired { .. })
    })
    .await;
    assert_eq!(
        required,
        ServerMessage::ApprovalRequired {
            request_id,
            session_id,
            action: "grant-inspiration".to_string(),
            submitter_id: participant_id_for("ana"),
            message: "Grant inspiration?".to_string(),
        }
    );

    // Players cannot decide.
    ws_send_client(
        &mut player,
        &ClientMessage::ApprovalDecision {
            request_id,
            approved: true,
            reason: None,
        },
    )
    .await;
    let forbidden = ws_expect_message(&mut player, RECV_TIMEOUT, |m| {
        matches!(m, ServerMessage::Error { .. })
    })
    .await;
    assert!(matches!(
        forbidden,
        ServerMessage::Error {
            code: ErrorCode::Forbidden,
            ..
        }
    ));

    ws_send_client(
        &mut leader,
        &ClientMessage::ApprovalDecision {
            request_id,
            approved: true,
            reason: None,
        },
    )
    .await;
    let patch = ws_expect_message(&mut player, RECV_TIMEOUT, is_patch).await;
    assert!(matches!(
        patch,
        ServerMessage::StatePatch {
            base_version: 0,
            new_version: 1,
            ..
        }
    ));
    ws_expect_message(&mut leader, RECV_TIMEOUT, is_patch).await;

    server.abort();
}

#[tokio::test]
async fn snapshot_resync_and_heartbeat() {
    let f = fixture();
    let session_id = f.session.session_id;
    let (app, _store) = build_test_app(vec![f.session.clone()]);
    let (addr, server) = spawn_ws_server(app).await;

    let mut player = ws_connect(addr).await;
    ws_send_client(&mut player, &ClientMessage::RequestSnapshot { session_id }).await;
    let not_joined = ws_recv_server(&mut player).await;
    assert!(matches!(
        not_joined,
        ServerMessage::Error {
            code: ErrorCode::NotInSession,
            ..
        }
    ));

    let replica = joined_replica(&mut player, session_id, "ana", ParticipantRole::Player).await;
    ws_send_client(&mut player, &replica.resync_request()).await;
    let snapshot = ws_expect_message(&mut player, RECV_TIMEOUT, |m| {
        matches!(m, ServerMessage::Snapshot { .. })
    })
    .await;
    assert_eq!(
        snapshot,
        ServerMessage::Snapshot {
            session_id,
            state: f.session
        }
    );

    ws_send_client(&mut player, &ClientMessage::Heartbeat).await;
    assert_eq!(ws_recv_server(&mut player).await, ServerMessage::Pong);

    ws_send_raw(&mut player, "{not json").await;
    assert!(matches!(
        ws_recv_server(&mut player).await,
        ServerMessage::Error {
            code: ErrorCode::BadRequest,
            ..
        }
    ));

    server.abort();
}

#[tokio::test]
async fn last_participant_leaving_saves_the_session() {
    let f = fixture();
    let session_id = f.session.session_id;
    let (app, store) = build_test_app(vec![f.session]);
    let (addr, server) = spawn_ws_server(app.clone()).await;

    let mut player = ws_connect(addr).await;
    join(&mut player, session_id, "ana", ParticipantRole::Player).await;
    ws_send_client(&mut player, &move_token(session_id, f.token, 7.0)).await;
    ws_expect_message(&mut player, RECV_TIMEOUT, is_patch).await;

    ws_send_client(&mut player, &ClientMessage::LeaveSession).await;

    let saved = tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            if let Some(state) = store.load(session_id).await.expect("load") {
                if state.version == 1 {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("snapshot saved");

    assert_eq!(
        saved.token(f.token).expect("token").position,
        Position { x: 7.0, y: 1.0 }
    );
    assert!(app.sessions.get(session_id).is_none());

    server.abort();
}
