//! Administrative authorization for ledger resets.
//!
//! An operator signs `timestamp || "reset:" || faucet` with an Ed25519 key
//! whose public half is configured on the server. A verified request yields
//! an [`AdminGrant`], the only way to call
//! [`FaucetDispenser::reset_ledger`](crate::FaucetDispenser::reset_ledger).

use std::sync::Arc;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tracing::warn;

use ww_core::Clock;

use crate::config::FaucetKind;
use crate::error::AdminError;

/// Maximum distance between the signed timestamp and the server clock.
pub const MAX_SIGNATURE_AGE_SECS: i64 = 300;

/// Proof that an admin request for one faucet was verified.
#[derive(Debug)]
pub struct AdminGrant {
    faucet: FaucetKind,
}

impl AdminGrant {
    pub fn faucet(&self) -> FaucetKind {
        self.faucet
    }

    #[cfg(test)]
    pub(crate) fn for_tests(faucet: FaucetKind) -> Self {
        Self { faucet }
    }
}

/// Bytes an admin signs to reset `faucet` at `timestamp` (Unix seconds, decimal).
pub fn signing_message(faucet: FaucetKind, timestamp: &str) -> Vec<u8> {
    let mut message = timestamp.as_bytes().to_vec();
    message.extend_from_slice(b"reset:");
    message.extend_from_slice(faucet.as_str().as_bytes());
    message
}

pub struct AdminGate {
    verifying_key: Option<VerifyingKey>,
    clock: Arc<dyn Clock>,
}

impl AdminGate {
    /// Gate that refuses every request.
    pub fn disabled(clock: Arc<dyn Clock>) -> Self {
        Self {
            verifying_key: None,
            clock,
        }
    }

    /// Gate accepting signatures from the hex-encoded Ed25519 `public_key_hex`.
    pub fn from_hex(public_key_hex: &str, clock: Arc<dyn Clock>) -> Result<Self, AdminError> {
        let bytes = hex::decode(public_key_hex.trim())
            .map_err(|e| AdminError::InvalidKey(e.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AdminError::InvalidKey("expected 32 bytes".into()))?;
        let verifying_key =
            VerifyingKey::from_bytes(&array).map_err(|e| AdminError::InvalidKey(e.to_string()))?;
        Ok(Self {
            verifying_key: Some(verifying_key),
            clock,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.verifying_key.is_some()
    }

    /// Verify a signed reset request for `faucet`.
    pub fn authorize(
        &self,
        faucet: FaucetKind,
        timestamp: &str,
        signature_hex: &str,
    ) -> Result<AdminGrant, AdminError> {
        let Some(verifying_key) = &self.verifying_key else {
            return Err(AdminError::Disabled);
        };

        let signed_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| AdminError::MalformedTimestamp(timestamp.to_string()))?;
        let skew = self.clock.now().timestamp() - signed_at;
        if skew.abs() > MAX_SIGNATURE_AGE_SECS {
            warn!(%faucet, skew, "admin request outside accepted window");
            return Err(AdminError::Expired);
        }

        let sig_bytes = hex::decode(signature_hex.trim()).map_err(|_| AdminError::InvalidSignature)?;
        let sig_array: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| AdminError::InvalidSignature)?;
        let signature = Signature::from_bytes(&sig_array);

        verifying_key
            .verify(&signing_message(faucet, timestamp.trim()), &signature)
            .map_err(|_| {
                warn!(%faucet, "admin signature rejected");
                AdminError::InvalidSignature
            })?;

        Ok(AdminGrant { faucet })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ed25519_dalek::{Signer, SigningKey};
    use ww_core::ManualClock;

    fn setup() -> (SigningKey, AdminGate, ManualClock) {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        let clock = ManualClock::at_epoch();
        let gate = AdminGate::from_hex(&hex::encode(key.verifying_key().to_bytes()), Arc::new(clock.clone()))
            .unwrap();
        (key, gate, clock)
    }

    fn sign(key: &SigningKey, faucet: FaucetKind, ts: &str) -> String {
        hex::encode(key.sign(&signing_message(faucet, ts)).to_bytes())
    }

    #[test]
    fn valid_signature_grants_faucet() {
        let (key, gate, clock) = setup();
        let ts = clock.now().timestamp().to_string();
        let grant = gate.authorize(FaucetKind::Gas, &ts, &sign(&key, FaucetKind::Gas, &ts)).unwrap();
        assert_eq!(grant.faucet(), FaucetKind::Gas);
    }

    #[test]
    fn signature_for_other_faucet_rejected() {
        let (key, gate, clock) = setup();
        let ts = clock.now().timestamp().to_string();
        let sig = sign(&key, FaucetKind::Token, &ts);
        assert_eq!(
            gate.authorize(FaucetKind::Gas, &ts, &sig).unwrap_err(),
            AdminError::InvalidSignature
        );
    }

    #[test]
    fn stale_timestamp_rejected() {
        let (key, gate, clock) = setup();
        let ts = clock.now().timestamp().to_string();
        let sig = sign(&key, FaucetKind::Gas, &ts);
        clock.advance(Duration::seconds(MAX_SIGNATURE_AGE_SECS + 1));
        assert_eq!(gate.authorize(FaucetKind::Gas, &ts, &sig).unwrap_err(), AdminError::Expired);
    }

    #[test]
    fn wrong_key_rejected() {
        let (_key, gate, clock) = setup();
        let other = SigningKey::generate(&mut rand::rngs::OsRng);
        let ts = clock.now().timestamp().to_string();
        assert_eq!(
            gate.authorize(FaucetKind::Gas, &ts, &sign(&other, FaucetKind::Gas, &ts)).unwrap_err(),
            AdminError::InvalidSignature
        );
    }

    #[test]
    fn malformed_inputs() {
        let (_key, gate, _clock) = setup();
        assert!(matches!(
            gate.authorize(FaucetKind::Gas, "yesterday", "00"),
            Err(AdminError::MalformedTimestamp(_))
        ));
    }

    #[test]
    fn disabled_gate_refuses() {
        let gate = AdminGate::disabled(Arc::new(ManualClock::at_epoch()));
        assert!(!gate.is_enabled());
        assert_eq!(gate.authorize(FaucetKind::Gas, "0", "00").unwrap_err(), AdminError::Disabled);
    }

    #[test]
    fn bad_public_key() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_epoch());
        assert!(matches!(AdminGate::from_hex("abcd", clock), Err(AdminError::InvalidKey(_))));
    }
}
