//! CA Console - Self-hosted Two-Tier Certificate Authority
//!
//! Issues and stores certificate material for a small private PKI. Certificates and
//! keys are produced by Smallstep's `step` CLI, encrypted field by field and kept in
//! an embedded key-value store.
//!
//! # Overview
//!
//! ```text
//! root-ca
//!   └── intermediate-ca (signed by a root)
//!       └── leaf (signed by any CA, bundled with its chain)
//! ```
//!
//! Issuing a certificate runs through these layers:
//!
//! - [`issuer`]: validation, per-id locking, parent resolution and orchestration
//! - [`create_args`] / [`step`]: argument vectors for `step certificate create|inspect`
//! - [`command`]: child process execution with a wall-clock timeout
//! - [`scratch`]: short-lived 0600 files handing secrets to the tool
//! - [`encryption`]: AES-CBC with salted SHA-256 derived keys
//! - [`cert_store`] / [`storage`]: encrypted records on redb
//!
//! Around them, [`download`] enforces which material may leave the store,
//! [`import`] restores plaintext dumps and [`webserver`] exposes everything over HTTP.
//!
//! # Record Layout
//!
//! Records live under `cert:<profile>:<uppercase hex SHA-256(name)>`. Profile and id
//! are stored in clear; name, certificate, key and inspection text are each stored as
//! uppercase hex of `IV || AES-CBC(plaintext)` with their own random IV.
//!
//! # Quick Start
//!
//! ```bash
//! # step must be on PATH, or set CA_CONSOLE_STEP_BIN
//! export CA_CONSOLE_DATABASE_PASSWORD='change me'
//! cargo run --release
//!
//! curl -X PUT localhost:8080/api/cert/root-ca \
//!      -H 'content-type: application/json' \
//!      -d '{"name":"Example Root CA","pass":"root-secret","years":10}'
//! ```
//!
//! # Library Use
//!
//! ```no_run
//! use std::sync::Arc;
//! use ca_console::cert_store::CertStore;
//! use ca_console::encryption::PasswordMaterial;
//! use ca_console::issuer::{CaPasswordDefaults, IssueRequest, Issuer};
//! use ca_console::profile::Profile;
//! use ca_console::step::StepCli;
//! use ca_console::storage::RedbStore;
//!
//! # async fn run() -> ca_console::Result<()> {
//! let kv = Arc::new(RedbStore::open("data/ca-console.redb")?);
//! let store = Arc::new(CertStore::new(kv, Arc::new(PasswordMaterial::default())));
//! let issuer = Issuer::new(store, StepCli::default(), CaPasswordDefaults::default());
//!
//! let root = issuer
//!     .issue(Profile::RootCa, IssueRequest::new("Example Root CA").password("p1"))
//!     .await?;
//! let leaf = issuer
//!     .issue(Profile::Leaf, IssueRequest::new("host.example").parent(&root, "p1"))
//!     .await?;
//! println!("{leaf}");
//! # Ok(())
//! # }
//! ```

pub mod cert_store;
pub mod command;
pub mod configs;
pub mod create_args;
pub mod download;
pub mod encryption;
pub mod error;
pub mod import;
pub mod issuer;
pub mod profile;
pub mod scratch;
pub mod step;
pub mod storage;
pub mod webserver;

pub use error::{CaError, ErrorKind, Result};
