//! Signature payloads and saved signatures.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use reimburse_core::{DomainError, DomainResult, Entity, OrgId, SignatureId, UserId, ValueObject};

/// Image formats accepted for inline signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMime {
    Png,
    Jpeg,
    Webp,
    Svg,
}

impl ImageMime {
    fn from_subtype(subtype: &str) -> Option<Self> {
        match subtype.to_ascii_lowercase().as_str() {
            "png" => Some(ImageMime::Png),
            "jpeg" | "jpg" => Some(ImageMime::Jpeg),
            "webp" => Some(ImageMime::Webp),
            "svg+xml" => Some(ImageMime::Svg),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageMime::Png => "png",
            ImageMime::Jpeg => "jpg",
            ImageMime::Webp => "webp",
            ImageMime::Svg => "svg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageMime::Png => "image/png",
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Webp => "image/webp",
            ImageMime::Svg => "image/svg+xml",
        }
    }
}

/// A decoded `data:image/...;base64,...` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime: ImageMime,
    pub bytes: Vec<u8>,
}

impl ValueObject for InlineImage {}

impl InlineImage {
    /// Parse a data URL. Anything malformed is a `DomainError::Format`.
    pub fn parse(data_url: &str) -> DomainResult<Self> {
        let rest = data_url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| DomainError::format("inline image must be a data URL"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| DomainError::format("inline image has no payload"))?;
        let media_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| DomainError::format("inline image must be base64 encoded"))?;
        let subtype = media_type
            .strip_prefix("image/")
            .ok_or_else(|| DomainError::format(format!("'{media_type}' is not an image type")))?;
        let mime = ImageMime::from_subtype(subtype)
            .ok_or_else(|| DomainError::format(format!("unsupported image type '{subtype}'")))?;

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| DomainError::format(format!("invalid base64 payload: {e}")))?;
        if bytes.is_empty() {
            return Err(DomainError::format("inline image is empty"));
        }

        Ok(Self { mime, bytes })
    }

    /// Hex SHA-256 of the decoded bytes; used to detect re-submitted signatures.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// What the caller handed in as a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCandidate {
    /// An already-stored signature, by storage path.
    Stored(String),
    /// A fresh inline image.
    Inline(InlineImage),
}

impl SignatureCandidate {
    /// Classify raw input: `data:` URLs are inline images, anything else is a path.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::validation("signature is required"));
        }
        if raw.starts_with("data:") {
            return InlineImage::parse(raw).map(SignatureCandidate::Inline);
        }
        Ok(SignatureCandidate::Stored(raw.to_string()))
    }
}

/// Where a signature is being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureContext {
    /// Submitting an expense.
    Expense,
    /// Signing a voucher as its submitter.
    VoucherSubmitter,
    /// Countersigning a voucher as its approver.
    VoucherApprover,
}

impl SignatureContext {
    /// Whether a freshly uploaded image becomes the user's saved signature.
    /// Approver countersignatures never replace it.
    pub fn persists_saved_signature(&self) -> bool {
        !matches!(self, SignatureContext::VoucherApprover)
    }

    /// Storage prefix for uploads made by `user_id` in this context.
    pub fn upload_prefix(&self, user_id: UserId) -> String {
        match self {
            SignatureContext::VoucherApprover => format!("signatures/approvers/{user_id}"),
            _ => format!("signatures/{user_id}"),
        }
    }
}

/// A user's reusable signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSignature {
    pub id: SignatureId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub path: String,
    pub fingerprint: String,
    pub updated_at: DateTime<Utc>,
}

impl Entity for SavedSignature {
    type Id = SignatureId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn org_id(&self) -> OrgId {
        self.org_id
    }
}

impl SavedSignature {
    /// Whether `candidate` is this same signature (no re-upload needed).
    pub fn matches(&self, candidate: &SignatureCandidate) -> bool {
        match candidate {
            SignatureCandidate::Stored(path) => *path == self.path,
            SignatureCandidate::Inline(image) => image.fingerprint() == self.fingerprint,
        }
    }

    pub fn apply_update(&mut self, update: &SignatureUpdate) {
        self.path = update.path.clone();
        self.fingerprint = update.fingerprint.clone();
        self.updated_at = update.updated_at;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureUpdate {
    pub path: String,
    pub fingerprint: String,
    pub updated_at: DateTime<Utc>,
}
