//! Recovery import of plaintext record dumps.
//!
//! A dump is a JSON array of records with PEM material in base64:
//!
//! ```json
//! [
//!   {
//!     "profile": "root-ca",
//!     "name": "Example Root CA",
//!     "crt": "LS0tLS1CRUdJTi...",
//!     "key": "LS0tLS1CRUdJTi...",
//!     "inspection": "Certificate:\n ..."
//!   }
//! ]
//! ```
//!
//! The batch is checked as a whole before anything is written: every name must
//! be non-empty and no derived id may already exist or appear twice. Imports go
//! through the [`Issuer`] so they hold the same per-id locks as issuance.

use std::collections::HashSet;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::info;

use crate::cert_store::{CertStore, Record};
use crate::error::{CaError, Result};
use crate::issuer::Issuer;
use crate::profile::Profile;

#[derive(Debug, Deserialize)]
struct PlainRecord {
    profile: Profile,
    name: String,
    crt: String,
    key: String,
    #[serde(default)]
    inspection: String,
}

/// Import the dump at `path` through `issuer`, returning the ids written.
pub async fn import_records(issuer: &Issuer, path: &Path) -> Result<Vec<String>> {
    let document = std::fs::read_to_string(path)?;
    let ids = import_json(issuer, &document).await?;
    info!(path = %path.display(), count = ids.len(), "recovery import finished");
    Ok(ids)
}

pub async fn import_json(issuer: &Issuer, document: &str) -> Result<Vec<String>> {
    issuer.import(parse_dump(document)?).await
}

/// Decode a dump into records. Fails on empty names, bad base64 and ids
/// repeated within the batch.
pub fn parse_dump(document: &str) -> Result<Vec<Record>> {
    let plain: Vec<PlainRecord> = serde_json::from_str(document)?;

    let mut records = Vec::with_capacity(plain.len());
    let mut seen = HashSet::new();
    for (index, entry) in plain.into_iter().enumerate() {
        if entry.name.is_empty() {
            return Err(CaError::Validation(format!("record {index} has no name")));
        }
        let crt = decode_field(&entry.crt, "crt", &entry.name)?;
        let key = decode_field(&entry.key, "key", &entry.name)?;
        let record = Record::new(entry.profile, entry.name, crt, key, entry.inspection);

        if !seen.insert(record.id.clone()) {
            return Err(CaError::Conflict(record.id));
        }
        records.push(record);
    }
    Ok(records)
}

/// Write `records` unless any of their ids is already stored.
///
/// Callers must hold the issuance lock of every id in the batch.
pub(crate) fn store_batch(store: &CertStore, records: &[Record]) -> Result<Vec<String>> {
    for record in records {
        if store.contains(&record.id)? {
            return Err(CaError::Conflict(record.id.clone()));
        }
    }

    let mut ids = Vec::with_capacity(records.len());
    for record in records {
        store.put(record)?;
        ids.push(record.id.clone());
    }
    Ok(ids)
}

fn decode_field(value: &str, field: &str, name: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CaError::Validation(format!("{field} of {name} is not base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert_store::record_id;
    use crate::command::ToolRunner;
    use crate::encryption::PasswordMaterial;
    use crate::error::ErrorKind;
    use crate::issuer::CaPasswordDefaults;
    use crate::step::StepCli;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Imports never reach the certificate tool.
    struct NoTool;

    #[async_trait]
    impl ToolRunner for NoTool {
        async fn run(&self, program: &str, _args: &[String]) -> Result<String> {
            panic!("{program} must not run during an import");
        }
    }

    fn issuer() -> Issuer {
        let store = Arc::new(CertStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(PasswordMaterial::default()),
        ));
        Issuer::new(store, StepCli::new(Arc::new(NoTool), "step"), CaPasswordDefaults::default())
    }

    fn entry(profile: &str, name: &str) -> serde_json::Value {
        serde_json::json!({
            "profile": profile,
            "name": name,
            "crt": STANDARD.encode(format!("crt {name}")),
            "key": STANDARD.encode(format!("key {name}")),
            "inspection": format!("Subject: {name}"),
        })
    }

    #[tokio::test]
    async fn imports_and_encrypts_every_record() {
        let issuer = issuer();
        let dump = serde_json::json!([entry("root-ca", "RootX"), entry("leaf", "host.example")]);
        let ids = import_json(&issuer, &dump.to_string()).await.unwrap();
        assert_eq!(
            ids,
            [
                record_id(Profile::RootCa, "RootX"),
                record_id(Profile::Leaf, "host.example")
            ]
        );

        let leaf = issuer.store().get(&ids[1]).unwrap();
        assert_eq!(leaf.crt, b"crt host.example");
        assert_eq!(leaf.key_bytes(), b"key host.example");
        assert_eq!(leaf.inspection, "Subject: host.example");
    }

    #[tokio::test]
    async fn existing_id_rejects_whole_batch() {
        let issuer = issuer();
        let first = serde_json::json!([entry("root-ca", "RootX")]).to_string();
        import_json(&issuer, &first).await.unwrap();

        let dump = serde_json::json!([entry("leaf", "fresh"), entry("root-ca", "RootX")]);
        let err = import_json(&issuer, &dump.to_string()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!issuer
            .store()
            .contains(&record_id(Profile::Leaf, "fresh"))
            .unwrap());
    }

    #[test]
    fn duplicates_within_batch_are_rejected() {
        let dump = serde_json::json!([entry("leaf", "a"), entry("leaf", "a")]);
        let err = parse_dump(&dump.to_string()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let err = parse_dump(&serde_json::json!([entry("leaf", "")]).to_string()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut bad = entry("leaf", "a");
        bad["crt"] = serde_json::Value::from("***");
        let err = parse_dump(&serde_json::json!([bad]).to_string()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(parse_dump(&serde_json::json!([entry("root", "a")]).to_string()).is_err());
    }

    #[tokio::test]
    async fn reads_dump_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cert.json");
        std::fs::write(&path, serde_json::json!([entry("intermediate-ca", "InterY")]).to_string())
            .unwrap();
        let ids = import_records(&issuer(), &path).await.unwrap();
        assert_eq!(ids, [record_id(Profile::IntermediateCa, "InterY")]);

        let err = import_records(&issuer(), &dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
