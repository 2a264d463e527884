//! Automation credential source.
//!
//! The automation keypair is generated and rotated outside the engine.
//! Skylift only needs the public line (injected at provisioning), the
//! private key file (handed to the SSH client) and enough identifying
//! material to find and remove the key on the instance afterwards.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read public key {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed public key: {0}")]
    Malformed(String),
}

/// An OpenSSH public key line: `<algorithm> <base64 body> [comment]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub algorithm: String,
    pub body: String,
    pub comment: Option<String>,
}

impl PublicKey {
    pub fn parse(line: &str) -> Result<Self, CredentialError> {
        let mut parts = line.split_whitespace();
        let algorithm = parts
            .next()
            .ok_or_else(|| CredentialError::Malformed("empty key".to_string()))?;
        if !(algorithm.starts_with("ssh-")
            || algorithm.starts_with("ecdsa-")
            || algorithm.starts_with("sk-"))
        {
            return Err(CredentialError::Malformed(format!(
                "unsupported key type {algorithm:?}"
            )));
        }
        let body = parts
            .next()
            .ok_or_else(|| CredentialError::Malformed("missing key body".to_string()))?;
        STANDARD
            .decode(body)
            .map_err(|e| CredentialError::Malformed(format!("key body is not base64: {e}")))?;
        let comment = parts.collect::<Vec<_>>().join(" ");
        Ok(Self {
            algorithm: algorithm.to_string(),
            body: body.to_string(),
            comment: (!comment.is_empty()).then_some(comment),
        })
    }

    /// OpenSSH-style `SHA256:` fingerprint of the key blob.
    pub fn fingerprint(&self) -> String {
        // `parse` already checked the body decodes.
        let blob = STANDARD.decode(&self.body).unwrap_or_default();
        let digest = Sha256::digest(&blob);
        format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.algorithm, self.body)?;
        if let Some(comment) = &self.comment {
            write!(f, " {comment}")?;
        }
        Ok(())
    }
}

/// The transient keypair the engine uses for administrative access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationCredential {
    pub public_key: PublicKey,
    /// Private key file passed to the SSH client.
    pub identity_file: PathBuf,
    /// Login user on the instance.
    pub user: String,
}

impl AutomationCredential {
    pub fn fingerprint(&self) -> String {
        self.public_key.fingerprint()
    }
}

/// Supplies the automation credential for each new deployment.
pub trait CredentialSource: Send + Sync {
    fn automation_credential(&self) -> Result<AutomationCredential, CredentialError>;
}

/// Reads the keypair from disk; the public half lives at `<identity>.pub`.
#[derive(Debug, Clone)]
pub struct FileCredentialSource {
    identity_file: PathBuf,
    user: String,
}

impl FileCredentialSource {
    pub fn new(identity_file: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            identity_file: identity_file.into(),
            user: user.into(),
        }
    }

    fn public_path(&self) -> PathBuf {
        let mut path = self.identity_file.clone().into_os_string();
        path.push(".pub");
        PathBuf::from(path)
    }

    pub fn identity_file(&self) -> &Path {
        &self.identity_file
    }
}

impl CredentialSource for FileCredentialSource {
    fn automation_credential(&self) -> Result<AutomationCredential, CredentialError> {
        let path = self.public_path();
        let line = std::fs::read_to_string(&path).map_err(|source| CredentialError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(AutomationCredential {
            public_key: PublicKey::parse(line.trim())?,
            identity_file: self.identity_file.clone(),
            user: self.user.clone(),
        })
    }
}
