//! Development seeding: register identity fixtures at startup.
//!
//! Only runs when `--dev-seed` names a file. Fixtures go through the same
//! ownership check as `POST /identity`.

use std::path::Path;

use tracing::{info, warn};

use hyperspace_keys::verify_identity_ownership;
use hyperspace_store::{IdentityRecord, Store, StoreError};

use crate::error::{Result, ServerError};

/// Read a JSON array of identity records.
pub fn read_seed_file(path: &Path) -> Result<Vec<IdentityRecord>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ServerError::Validation(format!("cannot read seed file {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        ServerError::Validation(format!("invalid seed file {}: {e}", path.display()))
    })
}

/// Register each valid fixture. Already registered accounts are skipped.
/// Returns how many were inserted.
pub async fn seed_identities<S: Store>(store: &S, records: Vec<IdentityRecord>) -> Result<usize> {
    let mut inserted = 0;
    for record in records {
        if !verify_identity_ownership(
            &record.account_id,
            &record.signature_public_key,
            &record.account_proof,
            &record.key_proof,
        ) {
            warn!(account_id = %record.account_id, "skipping seed identity with invalid proof");
            continue;
        }
        let account_id = record.account_id.clone();
        match store.insert_identity(record).await {
            Ok(()) => {
                info!(account_id = %account_id, "seeded identity");
                inserted += 1;
            }
            Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_store::MemoryStore;
    use hyperspace_testkit::TestAccount;
    use std::io::Write;

    #[tokio::test]
    async fn test_seed_from_file() {
        let accounts = [TestAccount::new(), TestAccount::new()];
        let records: Vec<_> = accounts.iter().map(TestAccount::identity_record).collect();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&records).unwrap().as_bytes())
            .unwrap();

        let store = MemoryStore::new();
        let loaded = read_seed_file(file.path()).unwrap();
        assert_eq!(seed_identities(&store, loaded.clone()).await.unwrap(), 2);
        // Idempotent across restarts
        assert_eq!(seed_identities(&store, loaded).await.unwrap(), 0);
        assert!(store
            .get_identity(&accounts[0].account_id())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_seed_skips_forged_proofs() {
        let alice = TestAccount::new();
        let mallory = TestAccount::new();
        let mut forged = alice.identity_record();
        forged.signature_public_key = mallory.keys.signature_public_key();

        let store = MemoryStore::new();
        assert_eq!(seed_identities(&store, vec![forged]).await.unwrap(), 0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = read_seed_file(Path::new("/nonexistent/seed.json")).unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }
}
