//! QR payload codec.
//!
//! The payload printed on a badge is plain JSON so any scanner can read it. The
//! `signature` field is an HMAC-SHA256 over the identifying fields, keyed with a
//! server-held secret, so a payload cannot be minted for a guessed pass id.

use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use gatepass_core::{DomainError, DomainResult, PassId, VisitorId};

type HmacSha256 = Hmac<Sha256>;

const INVALID: &str = "Invalid QR code data";
const REQUIRED: &str = "QR data is required";

/// Payload as issued and encoded into the badge QR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub pass_id: PassId,
    pub visitor_id: VisitorId,
    pub pass_number: String,
    pub token: String,
    pub issued_at: String,
    pub expires_at: String,
    pub signature: String,
}

/// Payload as scanned. Only `passId` is needed to resolve the pass; the rest is
/// needed to authenticate it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Scanned {
    pass_id: Option<String>,
    visitor_id: Option<String>,
    pass_number: Option<String>,
    token: Option<String>,
    issued_at: Option<String>,
    expires_at: Option<String>,
    signature: Option<String>,
}

/// Seals and opens QR payloads.
#[derive(Clone)]
pub struct QrSigner {
    key: Vec<u8>,
    signature_required: bool,
}

impl core::fmt::Debug for QrSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QrSigner")
            .field("signature_required", &self.signature_required)
            .finish_non_exhaustive()
    }
}

impl QrSigner {
    pub fn new(secret: impl AsRef<[u8]>, signature_required: bool) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            signature_required,
        }
    }

    fn mac(&self, fields: [&str; 6]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(fields.join("|").as_bytes());
        mac
    }

    /// Build a fresh payload for a pass: new random token, signed.
    pub fn seal(
        &self,
        pass_id: PassId,
        visitor_id: VisitorId,
        pass_number: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> QrPayload {
        let token = hex::encode(rand::random::<[u8; 32]>());
        let pass_id_s = pass_id.to_string();
        let visitor_id_s = visitor_id.to_string();
        let issued_at = issued_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let expires_at = expires_at.to_rfc3339_opts(SecondsFormat::Millis, true);

        let tag = self
            .mac([&pass_id_s, &visitor_id_s, pass_number, &token, &issued_at, &expires_at])
            .finalize()
            .into_bytes();

        QrPayload {
            pass_id,
            visitor_id,
            pass_number: pass_number.to_string(),
            token,
            issued_at,
            expires_at,
            signature: hex::encode(tag),
        }
    }

    pub fn encode(&self, payload: &QrPayload) -> DomainResult<String> {
        serde_json::to_string(payload).map_err(|_| DomainError::invalid_payload(INVALID))
    }

    /// Decode scanned QR data into the pass id it names.
    ///
    /// Errors are `InvalidPayload`; the message never says which check failed.
    pub fn open(&self, qr_data: &str) -> DomainResult<PassId> {
        if qr_data.trim().is_empty() {
            return Err(DomainError::invalid_payload(REQUIRED));
        }
        let scanned: Scanned =
            serde_json::from_str(qr_data).map_err(|_| DomainError::invalid_payload(INVALID))?;

        let raw_id = scanned
            .pass_id
            .as_deref()
            .ok_or_else(|| DomainError::invalid_payload(INVALID))?;
        let pass_id: PassId = raw_id
            .parse()
            .map_err(|_| DomainError::invalid_payload(INVALID))?;

        if self.signature_required && !self.authentic(raw_id, &scanned) {
            return Err(DomainError::invalid_payload(INVALID));
        }
        Ok(pass_id)
    }

    fn authentic(&self, pass_id: &str, s: &Scanned) -> bool {
        let (Some(visitor_id), Some(number), Some(token), Some(issued), Some(expires), Some(sig)) = (
            s.visitor_id.as_deref(),
            s.pass_number.as_deref(),
            s.token.as_deref(),
            s.issued_at.as_deref(),
            s.expires_at.as_deref(),
            s.signature.as_deref(),
        ) else {
            return false;
        };
        let Some(sig) = hex::decode(sig) else {
            return false;
        };
        self.mac([pass_id, visitor_id, number, token, issued, expires])
            .verify_slice(&sig)
            .is_ok()
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 || !s.is_ascii() {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sealed(signer: &QrSigner) -> QrPayload {
        let now = Utc::now();
        signer.seal(PassId::new(), VisitorId::new(), "PASS-123456-ABCDEF", now, now + Duration::days(1))
    }

    #[test]
    fn sealed_payload_opens_to_its_pass() {
        let signer = QrSigner::new("k", true);
        let payload = sealed(&signer);
        assert_eq!(payload.token.len(), 64);
        let json = signer.encode(&payload).unwrap();
        assert_eq!(signer.open(&json).unwrap(), payload.pass_id);
    }

    #[test]
    fn tampered_or_foreign_payload_is_rejected() {
        let signer = QrSigner::new("k", true);
        let mut payload = sealed(&signer);
        payload.pass_number = "PASS-000000-ZZZZZZ".to_string();
        let json = signer.encode(&payload).unwrap();
        assert_eq!(signer.open(&json), Err(DomainError::invalid_payload(INVALID)));

        let other = QrSigner::new("other", true);
        let json = other.encode(&sealed(&other)).unwrap();
        assert!(signer.open(&json).is_err());
    }

    #[test]
    fn unsigned_payload_accepted_only_when_not_enforced() {
        let bare = format!(r#"{{"passId":"{}"}}"#, PassId::new());
        assert!(QrSigner::new("k", true).open(&bare).is_err());
        assert!(QrSigner::new("k", false).open(&bare).is_ok());
    }

    #[test]
    fn malformed_inputs_map_to_invalid_payload() {
        let signer = QrSigner::new("k", false);
        assert_eq!(signer.open("  "), Err(DomainError::invalid_payload(REQUIRED)));
        for bad in ["not json", "{}", r#"{"passId":"nope"}"#, r#"{"passId":7}"#] {
            assert_eq!(signer.open(bad), Err(DomainError::invalid_payload(INVALID)), "{bad}");
        }
    }

    #[test]
    fn hex_helpers_agree() {
        let bytes = [0u8, 1, 0xab, 0xff];
        assert_eq!(hex::encode(bytes), "0001abff");
        assert_eq!(hex::decode("0001abff").unwrap(), bytes);
        assert!(hex::decode("abc").is_none());
        assert!(hex::decode("zz").is_none());
    }
}
