//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc::Receiver;

use hyperspace::store::{MemoryStore, SqliteStore, Store};
use hyperspace::sync::{ConnectionId, ConnectionRegistry, Request, Response};
use hyperspace::ws::handle_frame;
use hyperspace::SpaceService;
use hyperspace_testkit::TestAccount;

pub fn memory_service() -> Arc<SpaceService<MemoryStore>> {
    Arc::new(SpaceService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(ConnectionRegistry::new(1024)),
    ))
}

/// A service over a SQLite file that lives as long as the returned guard.
pub fn sqlite_service() -> (Arc<SpaceService<SqliteStore>>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("relay.db")).unwrap();
    let service = SpaceService::new(Arc::new(store), Arc::new(ConnectionRegistry::new(1024)));
    (Arc::new(service), dir)
}

/// An account with a registered identity and one open connection.
pub struct Client {
    pub account: TestAccount,
    pub conn: ConnectionId,
    pub rx: Receiver<Response>,
}

impl Client {
    pub async fn connect<S: Store>(service: &SpaceService<S>, account: TestAccount) -> Self {
        service
            .store()
            .insert_identity(account.identity_record())
            .await
            .unwrap();
        let (conn, rx) = service.registry().register(account.account_id());
        Self { account, conn, rx }
    }

    pub async fn send<S: Store>(&self, service: &SpaceService<S>, request: Request) {
        let text = serde_json::to_string(&request).unwrap();
        handle_frame(service, self.conn, &self.account.account_id(), &text).await;
    }

    pub fn recv(&mut self) -> Response {
        self.rx.try_recv().expect("a queued message")
    }

    pub fn drain(&mut self) -> Vec<Response> {
        let mut out = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            out.push(message);
        }
        out
    }
}
