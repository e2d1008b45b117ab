//! Download policy for stored certificate material.
//!
//! Certificates of every profile can be downloaded. Private keys only leave the
//! store for leaf and self-signed records; CA keys stay encrypted at rest and
//! are only ever decrypted into scratch files during issuance.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::cert_store::CertStore;
use crate::error::{CaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    Crt,
    Key,
}

impl DownloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKind::Crt => "crt",
            DownloadKind::Key => "key",
        }
    }
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadKind {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "crt" => Ok(DownloadKind::Crt),
            "key" => Ok(DownloadKind::Key),
            other => Err(CaError::Validation(format!("invalid download type: {other}"))),
        }
    }
}

/// An attachment ready to hand to a client.
#[derive(Debug)]
pub struct Download {
    /// `<name>.<kind>`
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn download(store: &CertStore, id: &str, kind: DownloadKind) -> Result<Download> {
    let record = store.get(id)?;

    let bytes = match kind {
        DownloadKind::Crt => record.crt.clone(),
        DownloadKind::Key if record.profile.is_ca() => {
            return Err(CaError::Authorization(format!(
                "{} key is not downloadable",
                record.profile
            )))
        }
        DownloadKind::Key => record.key_bytes().to_vec(),
    };

    info!(%id, %kind, "certificate material downloaded");
    Ok(Download {
        filename: format!("{}.{}", record.name, kind),
        bytes,
    })
}
