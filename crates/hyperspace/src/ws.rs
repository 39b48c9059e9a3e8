//! The WebSocket endpoint.
//!
//! A connection is authenticated at upgrade from its session token. The
//! session is checked again before every frame and on a timer, and the
//! socket is closed once it has expired. Inbound frames are parsed and dispatched one at a time; everything sent
//! back, replies and broadcasts alike, goes through the connection's
//! outbound queue in the [`ConnectionRegistry`](hyperspace_sync::ConnectionRegistry).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response as HttpResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use hyperspace_core::AccountId;
use hyperspace_store::{KeyValueStore, Store};
use hyperspace_sync::{limits, ConnectionId, Request, Response};

use crate::app::AppState;
use crate::auth::Auth;
use crate::error::{Result, ServerError};
use crate::service::{NewAccountInbox, SpaceService};

/// How often an idle connection's session is checked.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// `GET /` upgrade. Rejects before upgrading if the session is not valid.
pub async fn upgrade<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Result<HttpResponse>
where
    S: Store + KeyValueStore + 'static,
{
    let token = params
        .token
        .ok_or_else(|| ServerError::Unauthorized("missing token".into()))?;
    let account_id = state.auth.resolve_session(&token).await?;

    Ok(ws
        .max_message_size(limits::MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| connection(state, token, account_id, socket)))
}

/// The session behind `token` must still exist and belong to `account_id`.
pub async fn check_session<S>(auth: &Auth<S>, token: &str, account_id: &AccountId) -> Result<()>
where
    S: Store + KeyValueStore,
{
    if &auth.resolve_session(token).await? != account_id {
        return Err(ServerError::Unauthorized(
            "session belongs to another account".into(),
        ));
    }
    Ok(())
}

async fn connection<S>(
    state: Arc<AppState<S>>,
    token: String,
    account_id: AccountId,
    socket: WebSocket,
) where
    S: Store + KeyValueStore + 'static,
{
    let registry = state.service.registry().clone();
    let (conn, mut outbound) = registry.register(account_id.clone());
    info!(connection_id = %conn, account_id = %account_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(connection_id = %conn, error = %e, "failed to encode message");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let mut session_check = tokio::time::interval(SESSION_CHECK_INTERVAL);
    // The first tick is immediate and the session was just resolved
    session_check.tick().await;

    loop {
        let frame = tokio::select! {
            frame = stream.next() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = session_check.tick() => {
                if let Err(err) = check_session(&state.auth, &token, &account_id).await {
                    info!(connection_id = %conn, account_id = %account_id, "session ended");
                    let _ = registry.send(conn, err.to_wire());
                    break;
                }
                continue;
            }
        };
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    let err = ServerError::Validation("binary frames must be UTF-8 JSON".into());
                    let _ = registry.send(conn, err.to_wire());
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            // Ping and pong are answered by axum
            Ok(_) => continue,
            Err(e) => {
                debug!(connection_id = %conn, error = %e, "websocket read failed");
                break;
            }
        };
        if let Err(err) = check_session(&state.auth, &token, &account_id).await {
            info!(connection_id = %conn, account_id = %account_id, "session ended");
            let _ = registry.send(conn, err.to_wire());
            break;
        }
        handle_frame(&state.service, conn, &account_id, &text).await;
    }

    // Dropping the sender ends the writer once the queue drains
    registry.remove(conn);
    let _ = writer.await;
    info!(connection_id = %conn, account_id = %account_id, "websocket disconnected");
}

/// Parse and dispatch one frame. Failures become an `error` message to the
/// sender; the connection stays open.
pub async fn handle_frame<S: Store>(
    service: &SpaceService<S>,
    conn: ConnectionId,
    account_id: &AccountId,
    text: &str,
) {
    let result = match Request::parse(text) {
        Ok(request) => {
            let kind = request.kind();
            dispatch(service, conn, account_id, request)
                .await
                .map_err(|e| (kind, e))
        }
        Err(e) => Err(("parse", ServerError::from(e))),
    };

    if let Err((operation, err)) = result {
        err.log(operation);
        let _ = service.registry().send(conn, err.to_wire());
    }
}

/// Run one request for `account_id` on connection `conn`.
pub async fn dispatch<S: Store>(
    service: &SpaceService<S>,
    conn: ConnectionId,
    account_id: &AccountId,
    request: Request,
) -> Result<()> {
    let reply = |response: Response| -> Result<()> {
        service.registry().send(conn, response)?;
        Ok(())
    };

    match request {
        Request::SubscribeSpace {
            id,
            last_known_update_clock,
        } => {
            service
                .subscribe_space(conn, account_id, &id, last_known_update_clock)
                .await
        }
        Request::ListSpaces => reply(service.list_spaces(account_id).await?),
        Request::ListInvitations => reply(service.list_invitations(account_id).await?),
        Request::CreateSpaceEvent {
            space_id,
            event,
            key_id,
            key_box,
        } => {
            service
                .create_space(conn, account_id, &space_id, event, key_id, key_box)
                .await
        }
        Request::CreateInvitationEvent {
            space_id,
            event,
            key_boxes,
        } => {
            service
                .create_invitation(conn, account_id, &space_id, event, key_boxes)
                .await
        }
        Request::AcceptInvitationEvent { space_id, event } => {
            service
                .accept_invitation(conn, account_id, &space_id, event)
                .await
        }
        Request::CreateSpaceInboxEvent { space_id, event } => {
            service
                .create_space_inbox(conn, account_id, &space_id, event)
                .await
        }
        Request::RotateKeyEvent {
            space_id,
            event,
            key_boxes,
        } => {
            service
                .rotate_key(conn, account_id, &space_id, event, key_boxes)
                .await
        }
        Request::CreateUpdate {
            account_id: claimed,
            update,
            space_id,
            update_id,
            signature,
        } => service
            .create_update(
                conn, account_id, &claimed, &space_id, update_id, update, signature,
            )
            .await
            .map(|_| ()),
        Request::CreateAccountInbox {
            account_id: owner,
            inbox_id,
            is_public,
            auth_policy,
            encryption_public_key,
            signature,
        } => {
            service
                .create_account_inbox(
                    account_id,
                    NewAccountInbox {
                        account_id: owner,
                        inbox_id,
                        is_public,
                        auth_policy,
                        encryption_public_key,
                        signature,
                    },
                )
                .await
        }
        Request::GetAccountInboxes => reply(service.account_inboxes(account_id).await?),
        Request::GetLatestSpaceInboxMessages {
            space_id,
            inbox_id,
            since,
        } => reply(
            service
                .latest_space_inbox_messages(account_id, &space_id, &inbox_id, since)
                .await?,
        ),
        Request::GetLatestAccountInboxMessages {
            account_id: owner,
            inbox_id,
            since,
        } => reply(
            service
                .latest_account_inbox_messages(account_id, &owner, &inbox_id, since)
                .await?,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::{InboxAuthPolicy, Transaction};
    use hyperspace_store::MemoryStore;
    use hyperspace_sync::{ConnectionRegistry, ErrorCode};
    use hyperspace_testkit::{TestAccount, TestSpace};
    use tokio::sync::mpsc::Receiver;

    struct Harness {
        service: SpaceService<MemoryStore>,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let registry = Arc::new(ConnectionRegistry::new(64));
            Self {
                service: SpaceService::new(store, registry),
            }
        }

        async fn join(&self, account: &TestAccount) -> (ConnectionId, Receiver<Response>) {
            self.service
                .store()
                .insert_identity(account.identity_record())
                .await
                .unwrap();
            self.service.registry().register(account.account_id())
        }

        async fn send(&self, conn: ConnectionId, account: &TestAccount, request: Request) {
            let text = serde_json::to_string(&request).unwrap();
            handle_frame(&self.service, conn, &account.account_id(), &text).await;
        }
    }

    #[tokio::test]
    async fn test_check_session_follows_the_store() {
        let store = Arc::new(MemoryStore::new());
        let auth = Auth::new(store, &crate::config::ServerConfig::default());
        let alice = TestAccount::new();
        let bob = TestAccount::new();

        let token = auth
            .create_session(&alice.account_id(), Duration::from_millis(50))
            .await
            .unwrap();
        check_session(&auth, &token, &alice.account_id()).await.unwrap();
        assert!(matches!(
            check_session(&auth, &token, &bob.account_id()).await,
            Err(ServerError::Unauthorized(_))
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            check_session(&auth, &token, &alice.account_id()).await,
            Err(ServerError::Unauthorized(_))
        ));
    }

    fn next(rx: &mut Receiver<Response>) -> Response {
        rx.try_recv().expect("a queued message")
    }

    fn expect_error(rx: &mut Receiver<Response>, expected: ErrorCode) {
        match next(rx) {
            Response::Error { code, .. } => assert_eq!(code, expected),
            other => panic!("expected error, got {other:?}"),
        }
    }

    async fn create_space(h: &Harness, conn: ConnectionId, owner: &TestAccount) -> TestSpace {
        let (space, created) = TestSpace::create(owner);
        h.send(
            conn,
            owner,
            Request::CreateSpaceEvent {
                space_id: space.id.clone(),
                event: created.event,
                key_id: created.key_id,
                key_box: created.key_box,
            },
        )
        .await;
        space
    }

    #[tokio::test]
    async fn test_create_space_replies_with_space() {
        let h = Harness::new();
        let alice = TestAccount::new();
        let (conn, mut rx) = h.join(&alice).await;

        let space = create_space(&h, conn, &alice).await;
        match next(&mut rx) {
            Response::Space {
                id,
                events,
                key_boxes,
                updates,
                ..
            } => {
                assert_eq!(id, space.id);
                assert_eq!(events.len(), 1);
                assert_eq!(key_boxes.len(), 1);
                assert!(updates.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.service.registry().is_subscribed(conn, &space.id));

        h.send(conn, &alice, Request::ListSpaces).await;
        match next(&mut rx) {
            Response::ListSpaces { spaces } => assert_eq!(spaces, vec![space.id]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invitation_flow() {
        let h = Harness::new();
        let alice = TestAccount::new();
        let bob = TestAccount::new();
        let (a, mut arx) = h.join(&alice).await;
        let (b, mut brx) = h.join(&bob).await;

        let mut space = create_space(&h, a, &alice).await;
        next(&mut arx);

        // Not yet invited
        h.send(
            b,
            &bob,
            Request::SubscribeSpace {
                id: space.id.clone(),
                last_known_update_clock: None,
            },
        )
        .await;
        expect_error(&mut brx, ErrorCode::Forbidden);

        let (event, key_boxes) = space.invite(&alice, &bob);
        h.send(
            a,
            &alice,
            Request::CreateInvitationEvent {
                space_id: space.id.clone(),
                event,
                key_boxes,
            },
        )
        .await;
        assert!(matches!(next(&mut arx), Response::SpaceEvent { .. }));
        match next(&mut brx) {
            Response::ListInvitations { invitations } => {
                assert_eq!(invitations.len(), 1);
                assert_eq!(invitations[0].inviter_account_id, alice.account_id());
            }
            other => panic!("unexpected {other:?}"),
        }

        let accept = space.accept(&bob);
        h.send(
            b,
            &bob,
            Request::AcceptInvitationEvent {
                space_id: space.id.clone(),
                event: accept,
            },
        )
        .await;
        match next(&mut brx) {
            Response::Space {
                events, key_boxes, ..
            } => {
                assert_eq!(events.len(), 3);
                assert_eq!(key_boxes.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(next(&mut arx), Response::SpaceEvent { .. }));
        assert!(h.service.registry().is_subscribed(b, &space.id));
    }

    #[tokio::test]
    async fn test_stale_tip_is_chain_conflict() {
        let h = Harness::new();
        let alice = TestAccount::new();
        let bob = TestAccount::new();
        let carol = TestAccount::new();
        let (a, mut arx) = h.join(&alice).await;
        h.join(&bob).await;
        h.join(&carol).await;

        let mut space = create_space(&h, a, &alice).await;
        next(&mut arx);
        let root_len = space.events.len();

        let (first, first_boxes) = space.invite(&alice, &bob);
        space.truncate(root_len);
        let (second, second_boxes) = space.invite(&alice, &carol);

        h.send(
            a,
            &alice,
            Request::CreateInvitationEvent {
                space_id: space.id.clone(),
                event: first,
                key_boxes: first_boxes,
            },
        )
        .await;
        assert!(matches!(next(&mut arx), Response::SpaceEvent { .. }));

        h.send(
            a,
            &alice,
            Request::CreateInvitationEvent {
                space_id: space.id.clone(),
                event: second,
                key_boxes: second_boxes,
            },
        )
        .await;
        match next(&mut arx) {
            Response::Error {
                code, retryable, ..
            } => {
                assert_eq!(code, ErrorCode::ChainConflict);
                assert!(retryable);
            }
            other => panic!("unexpected {other:?}"),
        }
        let events = h.service.store().get_space_events(&space.id).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_updates_are_confirmed_and_broadcast() {
        let h = Harness::new();
        let alice = TestAccount::new();
        let bob = TestAccount::new();
        let (a, mut arx) = h.join(&alice).await;
        let (b, mut brx) = h.join(&bob).await;

        let mut space = create_space(&h, a, &alice).await;
        next(&mut arx);
        let (event, key_boxes) = space.invite(&alice, &bob);
        h.send(a, &alice, Request::CreateInvitationEvent { space_id: space.id.clone(), event, key_boxes }).await;
        next(&mut arx);
        next(&mut brx);
        let accept = space.accept(&bob);
        h.send(b, &bob, Request::AcceptInvitationEvent { space_id: space.id.clone(), event: accept }).await;
        next(&mut arx);
        next(&mut brx);

        for (i, payload) in [b"one".as_slice(), b"two"].into_iter().enumerate() {
            let update_id = format!("eph-{i}");
            let signature = alice.sign_update(&space.id, &update_id, payload);
            h.send(
                a,
                &alice,
                Request::CreateUpdate {
                    account_id: alice.account_id(),
                    update: payload.to_vec(),
                    space_id: space.id.clone(),
                    update_id: update_id.clone(),
                    signature,
                },
            )
            .await;
            match next(&mut arx) {
                Response::UpdateConfirmed {
                    ephemeral_id,
                    clock,
                    ..
                } => {
                    assert_eq!(ephemeral_id, update_id);
                    assert_eq!(clock, i as u64 + 1);
                }
                other => panic!("unexpected {other:?}"),
            }
            match next(&mut brx) {
                Response::UpdatesNotification { updates, .. } => {
                    assert_eq!(updates.first_update_clock, i as u64 + 1);
                    assert_eq!(updates.updates[0].update, payload);
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        // Replay only what Bob has not seen
        h.send(
            b,
            &bob,
            Request::SubscribeSpace {
                id: space.id.clone(),
                last_known_update_clock: Some(1),
            },
        )
        .await;
        match next(&mut brx) {
            Response::Space {
                updates: Some(updates),
                ..
            } => {
                assert_eq!(updates.first_update_clock, 2);
                assert_eq!(updates.last_update_clock, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_from_non_member_is_forbidden() {
        let h = Harness::new();
        let alice = TestAccount::new();
        let mallory = TestAccount::new();
        let (a, mut arx) = h.join(&alice).await;
        let (m, mut mrx) = h.join(&mallory).await;

        let space = create_space(&h, a, &alice).await;
        next(&mut arx);

        let signature = mallory.sign_update(&space.id, "x", b"evil");
        h.send(
            m,
            &mallory,
            Request::CreateUpdate {
                account_id: mallory.account_id(),
                update: b"evil".to_vec(),
                space_id: space.id.clone(),
                update_id: "x".into(),
                signature,
            },
        )
        .await;
        expect_error(&mut mrx, ErrorCode::Forbidden);
        assert!(arx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_event_for_another_author_is_forbidden() {
        let h = Harness::new();
        let alice = TestAccount::new();
        let mallory = TestAccount::new();
        let (a, mut arx) = h.join(&alice).await;
        let (m, mut mrx) = h.join(&mallory).await;

        let mut space = create_space(&h, a, &alice).await;
        next(&mut arx);

        // Alice's signed event replayed on Mallory's connection
        let (event, key_boxes) = space.invite(&alice, &mallory);
        h.send(
            m,
            &mallory,
            Request::CreateInvitationEvent {
                space_id: space.id.clone(),
                event,
                key_boxes,
            },
        )
        .await;
        expect_error(&mut mrx, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_space_inbox_event_is_broadcast() {
        let h = Harness::new();
        let alice = TestAccount::new();
        let (a, mut arx) = h.join(&alice).await;
        let mut space = create_space(&h, a, &alice).await;
        next(&mut arx);

        let (event, inbox_id) = space.create_inbox(&alice, true, InboxAuthPolicy::Anonymous);
        h.send(
            a,
            &alice,
            Request::CreateSpaceInboxEvent {
                space_id: space.id.clone(),
                event,
            },
        )
        .await;
        match next(&mut arx) {
            Response::SpaceEvent { event, .. } => {
                assert!(matches!(event.transaction, Transaction::CreateSpaceInbox(_)))
            }
            other => panic!("unexpected {other:?}"),
        }
        let inboxes = h.service.public_space_inboxes(&space.id).await.unwrap();
        assert_eq!(inboxes.len(), 1);
        assert_eq!(inboxes[0].inbox_id, inbox_id);
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection() {
        let h = Harness::new();
        let alice = TestAccount::new();
        let (a, mut arx) = h.join(&alice).await;

        handle_frame(&h.service, a, &alice.account_id(), "{not json").await;
        expect_error(&mut arx, ErrorCode::Validation);
        handle_frame(&h.service, a, &alice.account_id(), r#"{"type":"no-such-thing"}"#).await;
        expect_error(&mut arx, ErrorCode::Validation);

        h.send(a, &alice, Request::ListInvitations).await;
        assert!(matches!(next(&mut arx), Response::ListInvitations { .. }));
    }
}
