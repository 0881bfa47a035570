//! Blinding, Unblinding, and DLEQ Verification
//!
//! Implements the point arithmetic the Cashu protocol needs on this side:
//! hashing a secret onto the curve, blinding it with a per-output random
//! factor, unblinding the mint's signature once received, and checking a
//! NUT-12 DLEQ proof the mint attached to that signature.

use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::DleqProof;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("hash-to-curve did not converge")]
    HashToCurveExhausted,
    #[error("point arithmetic failed")]
    PointMath,
    #[error("invalid hex/key encoding: {0}")]
    Encoding(String),
}

const DOMAIN_SEPARATOR: &[u8] = b"Secp256k1_HashToCurve_Cashu_";

/// Deterministically map a secret onto a valid curve point `Y`, per the
/// Cashu `hash_to_curve` construction: hash the domain-separated secret,
/// then probe `sha256(msg_hash || counter)` as an x-coordinate until one
/// decodes to a point on the curve.
pub fn hash_to_curve(secret: &[u8]) -> Result<PublicKey, CryptoError> {
    let mut msg_hash = Sha256::new();
    msg_hash.update(DOMAIN_SEPARATOR);
    msg_hash.update(secret);
    let msg_hash = msg_hash.finalize();

    for counter in 0u32..u32::MAX {
        let mut candidate = Sha256::new();
        candidate.update(msg_hash);
        candidate.update(counter.to_le_bytes());
        let digest = candidate.finalize();

        let mut compressed = [0u8; 33];
        compressed[0] = 0x02;
        compressed[1..].copy_from_slice(&digest);
        if let Ok(point) = PublicKey::from_slice(&compressed) {
            return Ok(point);
        }
    }
    Err(CryptoError::HashToCurveExhausted)
}

fn scalar_of(key: &SecretKey) -> Scalar {
    Scalar::from(*key)
}

fn negate(secp: &Secp256k1<All>, point: &PublicKey) -> PublicKey {
    point.negate(secp)
}

/// `B_ = Y + r*G`, the blinded message sent to the mint.
pub fn blind_message(
    secp: &Secp256k1<All>,
    secret: &[u8],
    r: &SecretKey,
) -> Result<PublicKey, CryptoError> {
    let y = hash_to_curve(secret)?;
    let r_g = PublicKey::from_secret_key(secp, r);
    y.combine(&r_g).map_err(|_| CryptoError::PointMath)
}

/// `C = C_ - r*K`, unblinding the mint's signature once received. `K` is
/// the mint's per-amount pubkey for the keyset the output was drawn from.
pub fn unblind_signature(
    secp: &Secp256k1<All>,
    c_blind: &PublicKey,
    r: &SecretKey,
    mint_pubkey: &PublicKey,
) -> Result<PublicKey, CryptoError> {
    let r_k = mint_pubkey
        .mul_tweak(secp, &scalar_of(r))
        .map_err(|_| CryptoError::PointMath)?;
    c_blind
        .combine(&negate(secp, &r_k))
        .map_err(|_| CryptoError::PointMath)
}

/// Verify a NUT-12 DLEQ proof against an already-unblinded proof: recompute
/// `R1 = s*G - e*A`, `R2 = s*Y - e*C`, and check `e == sha256(R1‖R2‖A‖C)`.
pub fn verify_proof_dleq(
    secp: &Secp256k1<All>,
    secret: &[u8],
    c: &PublicKey,
    mint_pubkey: &PublicKey,
    dleq: &DleqProof,
) -> Result<bool, CryptoError> {
    let e_bytes = hex::decode(&dleq.e).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    let s_bytes = hex::decode(&dleq.s).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    if e_bytes.len() != 32 {
        return Err(CryptoError::Encoding("e must be 32 bytes".into()));
    }
    let s_key =
        SecretKey::from_slice(&s_bytes).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    let e_scalar = Scalar::from_be_bytes(e_bytes.clone().try_into().unwrap())
        .map_err(|_| CryptoError::Encoding("e out of range".into()))?;

    let y = hash_to_curve(secret)?;

    let s_g = PublicKey::from_secret_key(secp, &s_key);
    let e_a = mint_pubkey
        .mul_tweak(secp, &e_scalar)
        .map_err(|_| CryptoError::PointMath)?;
    let r1 = s_g
        .combine(&negate(secp, &e_a))
        .map_err(|_| CryptoError::PointMath)?;

    let s_y = y
        .mul_tweak(secp, &scalar_of(&s_key))
        .map_err(|_| CryptoError::PointMath)?;
    let e_c = c
        .mul_tweak(secp, &e_scalar)
        .map_err(|_| CryptoError::PointMath)?;
    let r2 = s_y
        .combine(&negate(secp, &e_c))
        .map_err(|_| CryptoError::PointMath)?;

    let mut hasher = Sha256::new();
    hasher.update(r1.serialize());
    hasher.update(r2.serialize());
    hasher.update(mint_pubkey.serialize());
    hasher.update(c.serialize());
    let e_prime = hasher.finalize();

    Ok(e_prime.as_slice() == e_bytes.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_to_curve_is_deterministic() {
        let a = hash_to_curve(b"same-secret").unwrap();
        let b = hash_to_curve(b"same-secret").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hash_to_curve_differs_per_secret() {
        let a = hash_to_curve(b"secret-a").unwrap();
        let b = hash_to_curve(b"secret-b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn blind_then_unblind_recovers_mint_signature() {
        let secp = Secp256k1::new();
        let secret = b"note-secret";
        let r = SecretKey::from_slice(&[7u8; 32]).unwrap();
        let mint_key = SecretKey::from_slice(&[9u8; 32]).unwrap();
        let mint_pubkey = PublicKey::from_secret_key(&secp, &mint_key);

        let blinded = blind_message(&secp, secret, &r).unwrap();
        // mint signs: C_ = k * B_
        let c_blind = blinded.mul_tweak(&secp, &scalar_of(&mint_key)).unwrap();

        let unblinded = unblind_signature(&secp, &c_blind, &r, &mint_pubkey).unwrap();
        // Expected: C = k * Y
        let y = hash_to_curve(secret).unwrap();
        let expected = y.mul_tweak(&secp, &scalar_of(&mint_key)).unwrap();
        assert_eq!(unblinded, expected);
    }
}
