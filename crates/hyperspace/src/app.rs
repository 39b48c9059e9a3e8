//! Shared state, the router and the serve loop.

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use hyperspace_store::{KeyValueStore, Store};
use hyperspace_sync::ConnectionRegistry;

use crate::auth::Auth;
use crate::config::ServerConfig;
use crate::service::SpaceService;
use crate::{http, ws};

/// Everything a handler can reach.
pub struct AppState<S> {
    pub service: SpaceService<S>,
    pub auth: Auth<S>,
    pub config: ServerConfig,
}

impl<S> AppState<S>
where
    S: Store + KeyValueStore + 'static,
{
    pub fn new(store: Arc<S>, config: ServerConfig) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new(config.outbound_queue));
        Arc::new(Self {
            service: SpaceService::new(store.clone(), registry),
            auth: Auth::new(store, &config),
            config,
        })
    }
}

/// All HTTP and WebSocket routes.
pub fn router<S>(state: Arc<AppState<S>>) -> Router
where
    S: Store + KeyValueStore + 'static,
{
    let router = Router::new()
        // WebSocket
        .route("/", get(ws::upgrade::<S>))
        .route("/ws", get(ws::upgrade::<S>))
        // Sign-in and identities
        .route("/login/nonce", post(http::login_nonce::<S>))
        .route("/login", post(http::login::<S>))
        .route(
            "/identity",
            get(http::public_identity::<S>).post(http::register_identity::<S>),
        )
        .route("/identity/encrypted", get(http::encrypted_identity::<S>))
        .route("/whoami", get(http::whoami))
        // Inboxes
        .route("/spaces/:space_id/inboxes", get(http::space_inboxes::<S>))
        .route(
            "/spaces/:space_id/inboxes/:inbox_id",
            get(http::space_inbox::<S>),
        )
        .route(
            "/spaces/:space_id/inboxes/:inbox_id/messages",
            post(http::post_space_inbox_message::<S>),
        )
        .route("/accounts/:account_id/inboxes", get(http::account_inboxes::<S>))
        .route(
            "/accounts/:account_id/inboxes/:inbox_id",
            get(http::account_inbox::<S>),
        )
        .route(
            "/accounts/:account_id/inboxes/:inbox_id/messages",
            post(http::post_account_inbox_message::<S>),
        );

    let cors_permissive = state.config.cors_permissive;
    let router = router.with_state(state).layer(TraceLayer::new_for_http());
    if cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
