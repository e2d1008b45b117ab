//! Argument vector construction for `step certificate create`.
//!
//! Each [`CreateOption`] knows how to extend an argument vector. Options are
//! applied in the order they were supplied, except [`CreateOption::Subject`],
//! whose three positional arguments always come first. Options carrying an
//! empty value add nothing.
//!
//! ```text
//! step certificate create <subject> <crt> <key> --profile <p> [--kty ..] [--san ..]* ... [-f]
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ca_console::create_args::CreateArgsBuilder;
//! use ca_console::profile::Profile;
//!
//! let command = CreateArgsBuilder::new()
//!     .subject("Example Root CA", "/tmp/root.crt", "/tmp/root.key")
//!     .profile(Profile::RootCa)
//!     .password_file("/tmp/pw.txt")
//!     .force()
//!     .build();
//!
//! assert_eq!(command.program, "step");
//! assert_eq!(command.args[0..3], ["certificate", "create", "Example Root CA"]);
//! ```

use chrono::{DateTime, SecondsFormat, Utc};

use crate::profile::{Curve, KeyType, Profile};

pub const DEFAULT_COMMAND_BIN: &str = "step";

/// One `key=value` pair for `--set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOption {
    Subject {
        subject: String,
        crt_file: String,
        key_file: String,
    },
    Profile(Profile),
    KeyType(KeyType),
    Size(u32),
    Curve(Curve),
    NotBefore(DateTime<Utc>),
    NotAfter(DateTime<Utc>),
    San(Vec<String>),
    Ca(String),
    CaKey(String),
    CaPasswordFile(String),
    CaKms(String),
    Kms(String),
    Key(String),
    PasswordFile(String),
    NoPassword(bool),
    Bundle(bool),
    Force(bool),
    Csr(bool),
    Template(String),
    SetFile(String),
    Set(Vec<TemplateSet>),
    Subtle(bool),
    SkipCsrSignature(bool),
}

fn push_value(mut args: Vec<String>, flag: &str, value: &str) -> Vec<String> {
    if !value.is_empty() {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
    args
}

fn push_flag(mut args: Vec<String>, enabled: bool, flags: &[&str]) -> Vec<String> {
    if enabled {
        args.extend(flags.iter().map(|f| f.to_string()));
    }
    args
}

fn rfc3339(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl CreateOption {
    /// Extend `args` with this option's arguments.
    pub fn apply(&self, mut args: Vec<String>) -> Vec<String> {
        match self {
            CreateOption::Subject {
                subject,
                crt_file,
                key_file,
            } => {
                let mut head = vec![subject.clone(), crt_file.clone(), key_file.clone()];
                head.append(&mut args);
                head
            }
            CreateOption::Profile(profile) => push_value(args, "--profile", profile.as_str()),
            CreateOption::KeyType(kty) => push_value(args, "--kty", kty.as_str()),
            CreateOption::Size(size) => push_value(args, "--size", &size.to_string()),
            CreateOption::Curve(curve) => push_value(args, "--crv", curve.as_str()),
            CreateOption::NotBefore(time) => push_value(args, "--not-before", &rfc3339(time)),
            CreateOption::NotAfter(time) => push_value(args, "--not-after", &rfc3339(time)),
            CreateOption::San(sans) => {
                for san in sans {
                    args = push_value(args, "--san", san);
                }
                args
            }
            CreateOption::Ca(path) => push_value(args, "--ca", path),
            CreateOption::CaKey(path) => push_value(args, "--ca-key", path),
            CreateOption::CaPasswordFile(path) => push_value(args, "--ca-password-file", path),
            CreateOption::CaKms(uri) => push_value(args, "--ca-kms", uri),
            CreateOption::Kms(uri) => push_value(args, "--kms", uri),
            CreateOption::Key(path) => push_value(args, "--key", path),
            CreateOption::PasswordFile(path) => push_value(args, "--password-file", path),
            CreateOption::NoPassword(on) => push_flag(args, *on, &["--no-password", "--insecure"]),
            CreateOption::Bundle(on) => push_flag(args, *on, &["--bundle"]),
            CreateOption::Force(on) => push_flag(args, *on, &["-f"]),
            CreateOption::Csr(on) => push_flag(args, *on, &["--csr"]),
            CreateOption::Template(path) => push_value(args, "--template", path),
            CreateOption::SetFile(path) => push_value(args, "--set-file", path),
            CreateOption::Set(pairs) => {
                for pair in pairs {
                    args.push("--set".to_string());
                    args.push(format!("{}={}", pair.key, pair.value));
                }
                args
            }
            CreateOption::Subtle(on) => push_flag(args, *on, &["--subtle"]),
            CreateOption::SkipCsrSignature(on) => push_flag(args, *on, &["--skip-csr-signature"]),
        }
    }
}

/// Fully resolved invocation of the certificate tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Builder collecting [`CreateOption`]s for one `certificate create` call.
#[derive(Debug, Clone)]
pub struct CreateArgsBuilder {
    command_bin: String,
    subject: Option<CreateOption>,
    options: Vec<CreateOption>,
}

impl CreateArgsBuilder {
    pub fn new() -> Self {
        Self {
            command_bin: DEFAULT_COMMAND_BIN.to_string(),
            subject: None,
            options: Vec::new(),
        }
    }

    /// Replace the executable name; empty values keep the current one.
    pub fn command_bin(mut self, bin: impl Into<String>) -> Self {
        let bin = bin.into();
        if !bin.is_empty() {
            self.command_bin = bin;
        }
        self
    }

    pub fn subject(
        mut self,
        subject: impl Into<String>,
        crt_file: impl Into<String>,
        key_file: impl Into<String>,
    ) -> Self {
        self.subject = Some(CreateOption::Subject {
            subject: subject.into(),
            crt_file: crt_file.into(),
            key_file: key_file.into(),
        });
        self
    }

    /// Append any option; a `Subject` passed here still lands first.
    pub fn option(mut self, option: CreateOption) -> Self {
        match option {
            CreateOption::Subject { .. } => self.subject = Some(option),
            other => self.options.push(other),
        }
        self
    }

    pub fn options(self, options: impl IntoIterator<Item = CreateOption>) -> Self {
        options.into_iter().fold(self, |builder, o| builder.option(o))
    }

    pub fn profile(self, profile: Profile) -> Self {
        self.option(CreateOption::Profile(profile))
    }

    pub fn key_type(self, kty: KeyType) -> Self {
        self.option(CreateOption::KeyType(kty))
    }

    pub fn not_after(self, time: DateTime<Utc>) -> Self {
        self.option(CreateOption::NotAfter(time))
    }

    pub fn ca(self, crt: impl Into<String>, key: impl Into<String>, password_file: impl Into<String>) -> Self {
        self.option(CreateOption::Ca(crt.into()))
            .option(CreateOption::CaKey(key.into()))
            .option(CreateOption::CaPasswordFile(password_file.into()))
    }

    pub fn password_file(self, path: impl Into<String>) -> Self {
        self.option(CreateOption::PasswordFile(path.into()))
    }

    pub fn no_password(self) -> Self {
        self.option(CreateOption::NoPassword(true))
    }

    pub fn bundle(self) -> Self {
        self.option(CreateOption::Bundle(true))
    }

    pub fn force(self) -> Self {
        self.option(CreateOption::Force(true))
    }

    pub fn build(self) -> StepCommand {
        let mut args = vec!["certificate".to_string(), "create".to_string()];
        let mut tail = Vec::new();
        if let Some(subject) = &self.subject {
            tail = subject.apply(tail);
        }
        for option in &self.options {
            tail = option.apply(tail);
        }
        args.append(&mut tail);
        StepCommand {
            program: self.command_bin,
            args,
        }
    }
}

impl Default for CreateArgsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
