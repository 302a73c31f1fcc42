//! Provenance resolution
//!
//! Units loaded from a unit archive carry provenance: the archive's origin
//! URL, the signatures recorded for that exact entry, and the archive-wide
//! manifest. Units loaded from plain files or memory have none.
//!
//! Signatures are checked against the raw bytes that were just read, so
//! provenance must be resolved after the bytes and before any patch runs.

use crate::archive::{ArchiveError, EntrySignature};
use crate::manifest::ContainerManifest;
use crate::resource::Resource;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;
use url::Url;

/// Errors raised while extracting provenance from an archive entry
#[derive(Debug, Error)]
pub enum ProvenanceError {
    /// Manifest or signature table could not be read
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// A signature record is malformed
    #[error("Invalid signature record from '{signer}' on {entry}: {reason}")]
    InvalidRecord {
        entry: String,
        signer: String,
        reason: String,
    },

    /// A signature does not match the entry bytes
    #[error("Signature from '{signer}' does not match {entry}")]
    VerificationFailed { entry: String, signer: String },
}

/// A verified signature on a unit's raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningAssertion {
    signer: String,
    public_key: VerifyingKey,
}

impl SigningAssertion {
    /// Signer identifier from the signature table
    pub fn signer(&self) -> &str {
        &self.signer
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    /// Hex-encoded public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.as_bytes())
    }
}

/// Origin, signing and manifest metadata of a unit
#[derive(Debug, Clone)]
pub struct Provenance {
    origin: Url,
    signers: Vec<SigningAssertion>,
    manifest: Option<Arc<ContainerManifest>>,
}

impl Provenance {
    pub fn new(
        origin: Url,
        signers: Vec<SigningAssertion>,
        manifest: Option<Arc<ContainerManifest>>,
    ) -> Self {
        Self {
            origin,
            signers,
            manifest,
        }
    }

    /// URL of the archive the unit came from
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Verified signatures on the unit's entry, in table order
    pub fn signers(&self) -> &[SigningAssertion] {
        &self.signers
    }

    pub fn is_signed(&self) -> bool {
        !self.signers.is_empty()
    }

    /// The archive manifest, shared by every unit of the archive
    pub fn manifest(&self) -> Option<&Arc<ContainerManifest>> {
        self.manifest.as_ref()
    }
}

/// Resolve provenance for `name`, degrading extraction failures to `None`.
///
/// Failures are logged; the unit still loads, just without provenance.
pub fn resolve(name: &str, resource: &Resource, raw: &[u8]) -> Option<Provenance> {
    match try_resolve(resource, raw) {
        Ok(provenance) => provenance,
        Err(e) => {
            error!("Failed to resolve provenance for {} ({}): {}", name, resource.url(), e);
            None
        }
    }
}

/// Resolve provenance, reporting extraction failures.
///
/// Returns `Ok(None)` when the resource is not an archive entry.
pub fn try_resolve(
    resource: &Resource,
    raw: &[u8],
) -> Result<Option<Provenance>, ProvenanceError> {
    let Some((archive, entry)) = resource.container() else {
        return Ok(None);
    };

    let manifest = archive.manifest()?;
    let signers = archive
        .signatures_for(entry)?
        .iter()
        .map(|record| verify(record, raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Provenance::new(
        archive.origin().clone(),
        signers,
        manifest,
    )))
}

fn verify(record: &EntrySignature, raw: &[u8]) -> Result<SigningAssertion, ProvenanceError> {
    let invalid = |reason: String| ProvenanceError::InvalidRecord {
        entry: record.entry.clone(),
        signer: record.signer.clone(),
        reason,
    };

    let key_bytes = hex::decode(&record.public_key)
        .map_err(|e| invalid(format!("invalid public key: {}", e)))?;
    let key_bytes: [u8; 32] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| invalid("invalid key length".to_string()))?;
    let public_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| invalid(format!("invalid key: {}", e)))?;

    let sig_bytes = hex::decode(&record.signature)
        .map_err(|e| invalid(format!("invalid signature: {}", e)))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| invalid(format!("invalid signature: {}", e)))?;

    public_key
        .verify(raw, &signature)
        .map_err(|_| ProvenanceError::VerificationFailed {
            entry: record.entry.clone(),
            signer: record.signer.clone(),
        })?;

    Ok(SigningAssertion {
        signer: record.signer.clone(),
        public_key,
    })
}
