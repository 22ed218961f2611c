//! Canonical signing payload for invite tokens
//!
//! The payload is the JSON encoding of every token field except the
//! signature itself, in declaration order. What gets signed is the BLAKE3
//! digest of that payload.

use crate::{InviteError, InviteResult};
use chrono::{DateTime, Utc};
use intersection_types::{CircleId, InviteTemplate, InviteToken, TokenId};
use serde::Serialize;

#[derive(Serialize)]
struct SigningPayload<'a> {
    token_id: &'a TokenId,
    issuer_circle_id: &'a CircleId,
    target_circle_id: Option<&'a CircleId>,
    proposed_name: &'a str,
    template: &'a InviteTemplate,
    issued_at: &'a DateTime<Utc>,
    expires_at: Option<&'a DateTime<Utc>>,
    signature_key_id: &'a str,
    signature_algorithm: &'a str,
}

/// Bytes covered by a token's signature
pub fn canonical_payload(token: &InviteToken) -> InviteResult<Vec<u8>> {
    let payload = SigningPayload {
        token_id: &token.token_id,
        issuer_circle_id: &token.issuer_circle_id,
        target_circle_id: token.target_circle_id.as_ref(),
        proposed_name: &token.proposed_name,
        template: &token.template,
        issued_at: &token.issued_at,
        expires_at: token.expires_at.as_ref(),
        signature_key_id: &token.signature_key_id,
        signature_algorithm: &token.signature_algorithm,
    };
    serde_json::to_vec(&payload).map_err(|e| InviteError::Encoding(e.to_string()))
}

/// BLAKE3 digest of the canonical payload
pub fn payload_digest(token: &InviteToken) -> InviteResult<[u8; 32]> {
    let payload = canonical_payload(token)?;
    Ok(*blake3::hash(&payload).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intersection_types::Scope;

    fn token() -> InviteToken {
        let now = Utc::now();
        InviteToken {
            token_id: TokenId::new("tok-1"),
            issuer_circle_id: CircleId::new("alice"),
            target_circle_id: Some(CircleId::new("bob")),
            proposed_name: "dinner".into(),
            template: InviteTemplate::new().with_scope(Scope::read("calendar:read", "")),
            issued_at: now,
            expires_at: Some(now + chrono::Duration::hours(1)),
            signature_key_id: "key-alice".into(),
            signature_algorithm: "ed25519".into(),
            signature: vec![],
        }
    }

    #[test]
    fn signature_bytes_are_not_covered() {
        let a = token();
        let mut b = a.clone();
        b.signature = vec![1, 2, 3];
        assert_eq!(payload_digest(&a).unwrap(), payload_digest(&b).unwrap());
    }

    #[test]
    fn every_other_field_is_covered() {
        let base = payload_digest(&token()).unwrap();

        let mut t = token();
        t.proposed_name.push('!');
        assert_ne!(payload_digest(&t).unwrap(), base);

        let mut t = token();
        t.target_circle_id = None;
        assert_ne!(payload_digest(&t).unwrap(), base);

        let mut t = token();
        t.signature_algorithm = "rsa".into();
        assert_ne!(payload_digest(&t).unwrap(), base);

        let mut t = token();
        t.template.scopes[0].read_write = true;
        assert_ne!(payload_digest(&t).unwrap(), base);
    }
}
