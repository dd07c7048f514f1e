//! Signature verification over a transaction's signed bytes.

use concord_types::{PublicKey, Transaction};
use std::collections::{BTreeMap, BTreeSet};

/// Verification outcome per signing key.
pub type Verifications = BTreeMap<PublicKey, bool>;

/// Verify every signature attached to `tx`.
///
/// A key counts as verified if any of its attached signatures is valid.
/// Verification depends only on the signed bytes, never on state, so the
/// result can be reused for as long as the signed bytes are unchanged.
pub fn verify_signatures(tx: &Transaction) -> Verifications {
    let message = tx.signed_bytes();
    let mut verifications = Verifications::new();
    for pair in tx.signatures() {
        let valid = pair.public_key.verify(&message, &pair.signature);
        *verifications.entry(pair.public_key).or_insert(false) |= valid;
    }
    verifications
}

/// Keys that verified.
pub fn verified_keys(verifications: &Verifications) -> BTreeSet<PublicKey> {
    verifications
        .iter()
        .filter(|(_, valid)| **valid)
        .map(|(key, _)| *key)
        .collect()
}
