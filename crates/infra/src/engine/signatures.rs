//! Signature Resolver: reuse, upload and remember signature artifacts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use reimburse_core::{OrgId, SignatureId, UserId};
use reimburse_expenses::{
    InlineImage, SavedSignature, SignatureCandidate, SignatureContext, SignatureUpdate,
};

use crate::error::{EngineError, StoreError};
use crate::store::{BlobStorage, Repository};

/// Outcome of resolving a signature candidate to a storage path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSignature {
    pub path: String,
    /// The user's saved signature was reused as-is.
    pub reused: bool,
    /// A new blob was uploaded.
    pub uploaded: bool,
}

#[derive(Clone)]
pub struct SignatureResolver {
    signatures: Arc<dyn Repository<SavedSignature>>,
    blobs: Arc<dyn BlobStorage>,
    signed_url_ttl: Duration,
}

impl SignatureResolver {
    pub fn new(
        signatures: Arc<dyn Repository<SavedSignature>>,
        blobs: Arc<dyn BlobStorage>,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            signatures,
            blobs,
            signed_url_ttl,
        }
    }

    /// Parse `raw` and check ownership of a stored path. Reads only.
    pub fn check(
        &self,
        org_id: OrgId,
        user_id: UserId,
        raw: &str,
        context: SignatureContext,
    ) -> Result<(), EngineError> {
        let candidate = SignatureCandidate::parse(raw)?;
        if let SignatureCandidate::Stored(path) = &candidate {
            let saved = self.lookup_saved(org_id, user_id);
            if !saved.as_ref().is_some_and(|s| s.matches(&candidate)) {
                ensure_owned_path(path, user_id, context)?;
            }
        }
        Ok(())
    }

    /// Resolve `raw` (a stored path or an inline `data:` image) for `user_id`.
    ///
    /// Malformed inline images fail with `EngineError::Format` before any IO.
    /// A stored path must be the user's saved signature or lie under the
    /// user's own upload prefix.
    pub fn resolve(
        &self,
        org_id: OrgId,
        user_id: UserId,
        raw: &str,
        context: SignatureContext,
    ) -> Result<ResolvedSignature, EngineError> {
        let candidate = SignatureCandidate::parse(raw)?;

        let saved = self.lookup_saved(org_id, user_id);
        if let Some(saved) = saved.as_ref().filter(|s| s.matches(&candidate)) {
            debug!(user_id = %user_id, path = %saved.path, "reusing saved signature");
            return Ok(ResolvedSignature {
                path: saved.path.clone(),
                reused: true,
                uploaded: false,
            });
        }

        let image = match candidate {
            SignatureCandidate::Stored(path) => {
                ensure_owned_path(&path, user_id, context)?;
                return Ok(ResolvedSignature {
                    path,
                    reused: false,
                    uploaded: false,
                });
            }
            SignatureCandidate::Inline(image) => image,
        };

        let path = format!(
            "{}/{}.{}",
            context.upload_prefix(user_id),
            Uuid::now_v7(),
            image.mime.extension()
        );
        let stored = self.blobs.upload_blob(&path, &image.bytes)?;
        debug!(user_id = %user_id, path = %stored, context = ?context, "uploaded signature");

        if context.persists_saved_signature() {
            self.remember(org_id, user_id, saved, &stored, &image);
        }

        Ok(ResolvedSignature {
            path: stored,
            reused: false,
            uploaded: true,
        })
    }

    /// The user's saved signature, most recent first if several exist.
    pub fn saved(&self, org_id: OrgId, user_id: UserId) -> Result<Option<SavedSignature>, StoreError> {
        let saved = self
            .signatures
            .list_by_filter(org_id, &|s: &SavedSignature| s.user_id == user_id)?;
        Ok(saved.into_iter().max_by_key(|s| s.updated_at))
    }

    fn lookup_saved(&self, org_id: OrgId, user_id: UserId) -> Option<SavedSignature> {
        match self.saved(org_id, user_id) {
            Ok(saved) => saved,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "saved signature lookup failed");
                None
            }
        }
    }

    pub fn signed_url(&self, path: &str) -> Result<String, EngineError> {
        Ok(self.blobs.signed_url(path, self.signed_url_ttl)?)
    }

    /// Opportunistic: a failure here never fails the resolution.
    fn remember(
        &self,
        org_id: OrgId,
        user_id: UserId,
        existing: Option<SavedSignature>,
        path: &str,
        image: &InlineImage,
    ) {
        let now = Utc::now();
        let result = match existing {
            Some(saved) => self
                .signatures
                .update(
                    &saved.id,
                    SignatureUpdate {
                        path: path.to_string(),
                        fingerprint: image.fingerprint(),
                        updated_at: now,
                    },
                )
                .map(|_| ()),
            None => self
                .signatures
                .insert(SavedSignature {
                    id: SignatureId::new(),
                    org_id,
                    user_id,
                    path: path.to_string(),
                    fingerprint: image.fingerprint(),
                    updated_at: now,
                })
                .map(|_| ()),
        };
        if let Err(err) = result {
            warn!(user_id = %user_id, error = %err, "failed to save signature for reuse");
        }
    }
}

fn ensure_owned_path(path: &str, user_id: UserId, context: SignatureContext) -> Result<(), EngineError> {
    let prefix = format!("{}/", context.upload_prefix(user_id));
    if path.starts_with(&prefix) && !path.contains("..") {
        return Ok(());
    }
    Err(EngineError::permission("signature does not belong to the signer"))
}
