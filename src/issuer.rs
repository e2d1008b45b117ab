//! Issuance state machine for the Root → Intermediate → Leaf hierarchy.
//!
//! An [`Issuer`] turns an [`IssueRequest`] into one new encrypted record:
//!
//! 1. Validate the request (name, key type, validity, parent id).
//! 2. Take the per-id lock and fail with a conflict if the id is already stored.
//! 3. For signed profiles, load and decrypt the parent CA and resolve its password.
//! 4. Stage parent material, passwords and empty output files as scratch files.
//! 5. Run `step certificate create ... -f`, read back the outputs and inspect
//!    the new certificate.
//! 6. Encrypt and store the record.
//!
//! Every scratch file is owned by the issuing call and removed when it returns,
//! whichever step failed. Nothing is written to the store unless every step
//! before it succeeded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cert_store::{record_id, CertStore, Record};
use crate::create_args::CreateOption;
use crate::import::store_batch;
use crate::error::{CaError, Result};
use crate::profile::{KeyType, Profile};
use crate::scratch::ScratchFile;
use crate::step::StepCli;

const PASSWORD_TEMPLATE: &str = "ca_console_password_*.txt";
const CRT_TEMPLATE: &str = "ca_console_cert_*.crt";
const KEY_TEMPLATE: &str = "ca_console_key_*.key";
const PARENT_CRT_TEMPLATE: &str = "ca_console_parent_crt_*.txt";
const PARENT_KEY_TEMPLATE: &str = "ca_console_parent_key_*.txt";
const PARENT_PASSWORD_TEMPLATE: &str = "ca_console_parent_password_*.txt";

const HOURS_PER_YEAR: i64 = 365 * 24;

/// Caller input for one issuance.
#[derive(Debug, Default)]
pub struct IssueRequest {
    pub name: String,
    /// Key password; ignored for leaf certificates
    pub password: Option<SecretString>,
    /// Validity in years of 365 days; zero or absent leaves the tool's default
    pub years: Option<u32>,
    pub key_type: Option<String>,
    pub parent_id: Option<String>,
    pub parent_password: Option<SecretString>,
}

impl IssueRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn years(mut self, years: u32) -> Self {
        self.years = Some(years);
        self
    }

    pub fn key_type(mut self, key_type: impl Into<String>) -> Self {
        self.key_type = Some(key_type.into());
        self
    }

    pub fn parent(mut self, id: impl Into<String>, password: impl Into<String>) -> Self {
        self.parent_id = Some(id.into());
        self.parent_password = Some(SecretString::from(password.into()));
        self
    }
}

/// Operator-configured fallbacks used when a request carries no CA password.
#[derive(Debug, Default, Clone)]
pub struct CaPasswordDefaults {
    pub root_ca: Option<SecretString>,
    pub intermediate_ca: Option<SecretString>,
}

impl CaPasswordDefaults {
    /// Resolve the password protecting a CA key of `profile`:
    /// request value first, then the configured default.
    pub fn resolve(&self, profile: Profile, requested: Option<&SecretString>) -> Result<SecretString> {
        let fallback = match profile {
            Profile::RootCa => self.root_ca.as_ref(),
            Profile::IntermediateCa => self.intermediate_ca.as_ref(),
            other => {
                return Err(CaError::Validation(format!(
                    "{other} certificates have no ca password"
                )))
            }
        };
        [requested, fallback]
            .into_iter()
            .flatten()
            .find(|secret| !secret.expose_secret().is_empty())
            .cloned()
            .ok_or_else(|| match profile {
                Profile::RootCa => CaError::Validation("root ca password is empty".to_string()),
                _ => CaError::Validation("intermediate ca password is empty".to_string()),
            })
    }
}

/// Validated request: everything the tool needs except secrets and parent material.
struct Plan {
    id: String,
    name: String,
    key_type: Option<KeyType>,
    not_after: Option<DateTime<Utc>>,
}

/// Decrypted parent CA plus the password unlocking its key.
struct Parent {
    record: Record,
    password: SecretString,
}

/// Produced material before encryption.
struct Minted {
    crt: Vec<u8>,
    key: Vec<u8>,
    inspection: String,
}

pub struct Issuer {
    store: Arc<CertStore>,
    step: StepCli,
    defaults: CaPasswordDefaults,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Issuer {
    pub fn new(store: Arc<CertStore>, step: StepCli, defaults: CaPasswordDefaults) -> Self {
        Self {
            store,
            step,
            defaults,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<CertStore> {
        &self.store
    }

    /// Issue a certificate of `profile` and return the id of the new record.
    pub async fn issue(&self, profile: Profile, request: IssueRequest) -> Result<String> {
        let plan = plan(profile, &request, Utc::now())?;
        info!(id = %plan.id, %profile, "issuing certificate");

        let lock = self.lock_for(&plan.id)?;
        let result = {
            let _guard = lock.lock().await;
            self.issue_locked(profile, &plan, &request).await
        };
        self.forget_lock(&plan.id, lock);

        match &result {
            Ok(id) => info!(%id, %profile, "certificate issued"),
            Err(e) => warn!(id = %plan.id, %profile, error = %e, "issuance failed"),
        }
        result
    }

    async fn issue_locked(&self, profile: Profile, plan: &Plan, request: &IssueRequest) -> Result<String> {
        if self.store.contains(&plan.id)? {
            return Err(CaError::Conflict(plan.id.clone()));
        }

        let minted = match profile {
            Profile::RootCa => {
                let password = self.defaults.resolve(Profile::RootCa, request.password.as_ref())?;
                self.mint(profile, plan, Some(&password), None).await?
            }
            Profile::IntermediateCa => {
                let password = self
                    .defaults
                    .resolve(Profile::IntermediateCa, request.password.as_ref())?;
                let parent = self.load_parent(request)?;
                self.mint(profile, plan, Some(&password), Some(&parent)).await?
            }
            Profile::Leaf => {
                let parent = self.load_parent(request)?;
                self.mint(profile, plan, None, Some(&parent)).await?
            }
            Profile::SelfSigned => {
                let password = request
                    .password
                    .as_ref()
                    .filter(|p| !p.expose_secret().is_empty());
                self.mint(profile, plan, password, None).await?
            }
        };

        let record = Record::new(profile, plan.name.clone(), minted.crt, minted.key, minted.inspection);
        self.store.put(&record)?;
        Ok(record.id)
    }

    fn load_parent(&self, request: &IssueRequest) -> Result<Parent> {
        let parent_id = request
            .parent_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CaError::Validation("parent ca is required".to_string()))?;

        if !self.store.contains(parent_id)? {
            return Err(CaError::NotFound(format!("parent ca {parent_id} not found")));
        }
        let record = self.store.get(parent_id)?;
        if !record.profile.is_ca() {
            return Err(CaError::Validation(format!(
                "parent {parent_id} is a {} certificate, not a ca",
                record.profile
            )));
        }
        let password = self
            .defaults
            .resolve(record.profile, request.parent_password.as_ref())?;
        debug!(parent = %parent_id, profile = %record.profile, "loaded parent ca");
        Ok(Parent { record, password })
    }

    /// Stage scratch files, run the tool and collect its output.
    ///
    /// `key_password` protects the new private key; without one the key is
    /// written unencrypted (`--no-password --insecure`). Leaf certificates are
    /// bundled with their issuer.
    async fn mint(
        &self,
        profile: Profile,
        plan: &Plan,
        key_password: Option<&SecretString>,
        parent: Option<&Parent>,
    ) -> Result<Minted> {
        let name = plan.name.as_str();
        let parent_files = match parent {
            Some(parent) => Some((
                ScratchFile::acquire(PARENT_CRT_TEMPLATE, Some(parent.record.crt.as_slice()))?,
                ScratchFile::acquire(PARENT_KEY_TEMPLATE, Some(parent.record.key_bytes()))?,
                ScratchFile::acquire(
                    PARENT_PASSWORD_TEMPLATE,
                    Some(parent.password.expose_secret().as_bytes()),
                )?,
            )),
            None => None,
        };
        let password_file = match key_password {
            Some(password) => Some(ScratchFile::acquire(
                PASSWORD_TEMPLATE,
                Some(password.expose_secret().as_bytes()),
            )?),
            None => None,
        };
        let mut crt_file = ScratchFile::acquire(CRT_TEMPLATE, None)?;
        let mut key_file = ScratchFile::acquire(KEY_TEMPLATE, None)?;

        let mut builder = self
            .step
            .create_builder()
            .subject(name, crt_file.arg(), key_file.arg())
            .profile(profile);
        if let Some(kty) = plan.key_type {
            builder = builder.key_type(kty);
        }
        if let Some(not_after) = plan.not_after {
            builder = builder.not_after(not_after);
        }
        builder = match profile {
            Profile::Leaf => builder.bundle(),
            Profile::SelfSigned => builder.option(CreateOption::Subtle(true)),
            _ => builder,
        };
        if let Some((ca_crt, ca_key, ca_password)) = &parent_files {
            builder = builder.ca(ca_crt.arg(), ca_key.arg(), ca_password.arg());
        }
        builder = match &password_file {
            Some(file) => builder.password_file(file.arg()),
            None => builder.no_password(),
        };
        let command = builder.force().build();

        self.step.run(&command).await?;

        let crt = crt_file.read()?;
        let key = key_file.read()?;
        if crt.is_empty() || key.is_empty() {
            return Err(CaError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} produced no certificate or key for {name}", self.step.command_bin()),
            )));
        }
        let inspection = self.step.inspect(crt_file.path(), false).await?;

        // the key material is in memory now; drop the on-disk copies first
        for file in [&mut key_file, &mut crt_file] {
            if let Err(e) = file.release() {
                warn!(path = %file.path().display(), error = %e, "failed to remove scratch file");
            }
        }

        Ok(Minted {
            crt,
            key,
            inspection,
        })
    }

    /// Store a batch of prepared records, all or nothing.
    ///
    /// The issuance lock of every id is held across the existence check and
    /// the writes, so an import and an issuance of the same id cannot both
    /// succeed. Locks are taken in id order.
    pub async fn import(&self, records: Vec<Record>) -> Result<Vec<String>> {
        let mut ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut locks = Vec::with_capacity(ids.len());
        for id in &ids {
            locks.push((id.to_string(), self.lock_for(id)?));
        }

        let result = {
            let mut guards = Vec::with_capacity(locks.len());
            for (_, lock) in &locks {
                guards.push(lock.lock().await);
            }
            store_batch(&self.store, &records)
        };
        for (id, lock) in locks {
            self.forget_lock(&id, lock);
        }

        if let Err(e) = &result {
            warn!(count = records.len(), error = %e, "recovery import rejected");
        }
        result
    }

    fn lock_for(&self, id: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| CaError::Storage("issuance lock table poisoned".to_string()))?;
        Ok(locks.entry(id.to_string()).or_default().clone())
    }

    /// Drop the table entry once no other issuance holds or waits on it.
    fn forget_lock(&self, id: &str, lock: Arc<AsyncMutex<()>>) {
        if let Ok(mut locks) = self.locks.lock() {
            // one reference in the table, one held here
            if Arc::strong_count(&lock) == 2 {
                locks.remove(id);
            }
        }
    }

    #[cfg(test)]
    fn pending_locks(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Validate `request` for `profile` without touching the tool or the store.
fn plan(profile: Profile, request: &IssueRequest, now: DateTime<Utc>) -> Result<Plan> {
    let name = request.name.as_str();
    if name.is_empty() {
        return Err(CaError::Validation("name is required".to_string()));
    }

    if profile.requires_parent()
        && request.parent_id.as_deref().map_or(true, str::is_empty)
    {
        return Err(CaError::Validation(format!(
            "parent ca is required for {profile} cert"
        )));
    }

    let key_type = request
        .key_type
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(str::parse::<KeyType>)
        .transpose()?;

    let not_after = match request.years.filter(|y| *y > 0) {
        Some(years) => Some(
            TimeDelta::try_hours(i64::from(years) * HOURS_PER_YEAR)
                .and_then(|validity| now.checked_add_signed(validity))
                .ok_or_else(|| {
                    CaError::Validation(format!("validity of {years} years is out of range"))
                })?,
        ),
        None => None,
    };

    Ok(Plan {
        id: record_id(profile, name),
        name: name.to_string(),
        key_type,
        not_after,
    })
}
