//! Well-known test accounts and their keys.

use concord_types::{AccountId, KeyPair};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Funding account credited with collected fees.
pub const FUNDING: AccountId = AccountId(98);

/// Account of node 0.
pub const NODE_0_ACCOUNT: AccountId = AccountId(3);

/// First user account.
pub const ALICE: AccountId = AccountId(1001);

/// Second user account.
pub const BOB: AccountId = AccountId(1002);

/// Third user account.
pub const CAROL: AccountId = AccountId(1003);

/// Deterministic key controlling `account`.
pub fn account_key(account: AccountId) -> KeyPair {
    let mut rng = ChaCha8Rng::seed_from_u64(account.0);
    KeyPair::from_seed(&rng.gen::<[u8; 32]>())
}
