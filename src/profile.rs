//! Certificate profiles, key types and curves understood by the step CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CaError;

/// Role of a certificate in the hierarchy.
///
/// ```text
/// root-ca (self-signed)
///   └── intermediate-ca (signed by a root)
///       └── leaf (signed by any CA)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    RootCa,
    IntermediateCa,
    Leaf,
    SelfSigned,
}

impl Profile {
    pub const ALL: [Profile; 4] = [
        Profile::RootCa,
        Profile::IntermediateCa,
        Profile::Leaf,
        Profile::SelfSigned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::RootCa => "root-ca",
            Profile::IntermediateCa => "intermediate-ca",
            Profile::Leaf => "leaf",
            Profile::SelfSigned => "self-signed",
        }
    }

    /// Whether certificates of this profile can sign other certificates.
    pub fn is_ca(&self) -> bool {
        matches!(self, Profile::RootCa | Profile::IntermediateCa)
    }

    /// Whether issuance needs an existing CA record as parent.
    pub fn requires_parent(&self) -> bool {
        matches!(self, Profile::IntermediateCa | Profile::Leaf)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Profile::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CaError::Validation("invalid certificate profile".to_string()))
    }
}

/// Key algorithm family passed as `--kty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "EC")]
    Ec,
    #[serde(rename = "OKP")]
    Okp,
    #[serde(rename = "RSA")]
    Rsa,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ec => "EC",
            KeyType::Okp => "OKP",
            KeyType::Rsa => "RSA",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EC" => Ok(KeyType::Ec),
            "OKP" => Ok(KeyType::Okp),
            "RSA" => Ok(KeyType::Rsa),
            _ => Err(CaError::Validation("invalid key type".to_string())),
        }
    }
}

/// Elliptic curve passed as `--crv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
    Ed25519,
}

impl Curve {
    pub fn as_str(&self) -> &'static str {
        match self {
            Curve::P256 => "P-256",
            Curve::P384 => "P-384",
            Curve::P521 => "P-521",
            Curve::Ed25519 => "Ed25519",
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
