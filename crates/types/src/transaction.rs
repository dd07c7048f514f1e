//! Client transactions.
//!
//! A [`Transaction`] is the immutable unit submitted by clients, ordered by
//! consensus and handled deterministically. Its identity is the
//! [`TransactionId`]; its signatures cover the canonical encoding of
//! [`TransactionData`] (everything except the signatures themselves).

use crate::{
    signing::transaction_signing_message, AccountId, ContractId, FileId, Hash, KeyPair, NodeId,
    PublicKey, ScheduleId, Signature, Timestamp, TopicId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity of a transaction: who pays, when it becomes valid, and a nonce
/// distinguishing children spawned from the same parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId {
    /// Account that created the transaction.
    pub payer: AccountId,
    /// Start of the validity window, as chosen by the client.
    pub valid_start: Timestamp,
    /// Zero for user transactions, positive for synthesized children.
    pub nonce: u32,
    /// Whether this id belongs to a triggered scheduled transaction.
    pub scheduled: bool,
}

impl TransactionId {
    /// Create a user transaction id.
    pub fn new(payer: AccountId, valid_start: Timestamp) -> Self {
        Self {
            payer,
            valid_start,
            nonce: 0,
            scheduled: false,
        }
    }

    /// Derive the id of the `nonce`-th child of this transaction.
    pub fn child(&self, nonce: u32) -> Self {
        Self { nonce, ..*self }
    }

    /// Derive the id of a triggered scheduled transaction.
    pub fn as_scheduled(&self) -> Self {
        Self {
            scheduled: true,
            ..*self
        }
    }

    /// Hash of `{payer, valid_start, nonce, scheduled}`.
    pub fn hash(&self) -> Hash {
        Hash::from_parts(&[
            &self.payer.0.to_le_bytes(),
            &self.valid_start.as_nanos().to_le_bytes(),
            &self.nonce.to_le_bytes(),
            &[self.scheduled as u8],
        ])
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.payer, self.valid_start)?;
        if self.scheduled {
            write!(f, "?scheduled")?;
        }
        if self.nonce > 0 {
            write!(f, "/{}", self.nonce)?;
        }
        Ok(())
    }
}

/// One signature over the transaction's signed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePair {
    /// Key that produced the signature.
    pub public_key: PublicKey,
    /// The signature.
    pub signature: Signature,
}

/// A transfer of `amount` into (positive) or out of (negative) `account`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAmount {
    /// Account credited or debited.
    pub account: AccountId,
    /// Signed amount; debits are negative.
    pub amount: i64,
}

/// Category of a transaction body, used for dispatch and throttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Token and account operations.
    Token,
    /// File operations.
    File,
    /// Schedule create/sign/delete.
    Schedule,
    /// Smart-contract calls.
    SmartContract,
    /// Consensus-topic messages.
    ConsensusTopic,
    /// Network administration.
    NetworkAdmin,
    /// Address-book updates.
    AddressBook,
    /// Utility operations.
    Util,
}

impl TransactionKind {
    /// Every kind, in declaration order.
    pub const ALL: [TransactionKind; 8] = [
        TransactionKind::Token,
        TransactionKind::File,
        TransactionKind::Schedule,
        TransactionKind::SmartContract,
        TransactionKind::ConsensusTopic,
        TransactionKind::NetworkAdmin,
        TransactionKind::AddressBook,
        TransactionKind::Util,
    ];

    /// Stable name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Token => "token",
            TransactionKind::File => "file",
            TransactionKind::Schedule => "schedule",
            TransactionKind::SmartContract => "smart_contract",
            TransactionKind::ConsensusTopic => "consensus_topic",
            TransactionKind::NetworkAdmin => "network_admin",
            TransactionKind::AddressBook => "address_book",
            TransactionKind::Util => "util",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token and account operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenOperation {
    /// Move balance between accounts; amounts must sum to zero.
    Transfer {
        /// Debits and credits.
        transfers: Vec<AccountAmount>,
    },
    /// Create a new account.
    CreateAccount {
        /// Key controlling the account.
        key: PublicKey,
        /// Balance moved from the payer into the new account.
        initial_balance: u64,
    },
    /// Replace an account's key.
    UpdateKey {
        /// Account to update.
        account: AccountId,
        /// New key.
        key: PublicKey,
    },
}

/// File operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOperation {
    /// Create a file.
    Create {
        /// Initial contents.
        contents: Vec<u8>,
    },
    /// Append to a file.
    Append {
        /// Target file.
        file: FileId,
        /// Bytes to append.
        contents: Vec<u8>,
    },
    /// Delete a file.
    Delete {
        /// Target file.
        file: FileId,
    },
}

/// Schedule operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleOperation {
    /// Create a scheduled transaction.
    Create {
        /// Body to execute once the signing requirement is met.
        body: Box<TransactionBody>,
        /// Account paying for the triggered transaction (defaults to the creator).
        payer: Option<AccountId>,
        /// Consensus time after which the schedule is discarded.
        expiration_time: Timestamp,
    },
    /// Add the transaction's verified signatures to a schedule.
    Sign {
        /// Target schedule.
        schedule: ScheduleId,
    },
    /// Delete a schedule before it triggers.
    Delete {
        /// Target schedule.
        schedule: ScheduleId,
    },
}

/// Smart-contract operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractOperation {
    /// Call a contract.
    Call {
        /// Target contract.
        contract: ContractId,
        /// Gas limit.
        gas: u64,
        /// Call data.
        input: Vec<u8>,
    },
}

/// Consensus-topic operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicOperation {
    /// Submit a message to a topic.
    SubmitMessage {
        /// Target topic.
        topic: TopicId,
        /// Message payload.
        message: Vec<u8>,
    },
}

/// Network administration operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminOperation {
    /// Schedule a network freeze.
    Freeze {
        /// When the freeze begins.
        start_time: Timestamp,
    },
}

/// Address-book operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressBookOperation {
    /// Update a node's description.
    NodeUpdate {
        /// Target node.
        node: NodeId,
        /// New description.
        description: String,
    },
}

/// Utility operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtilOperation {
    /// Request a pseudo-random number.
    Prng {
        /// Exclusive upper bound, or 0 for raw bytes.
        range: u32,
    },
}

/// The closed set of transaction bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionBody {
    /// Token and account operations.
    Token(TokenOperation),
    /// File operations.
    File(FileOperation),
    /// Schedule operations.
    Schedule(ScheduleOperation),
    /// Smart-contract operations.
    SmartContract(ContractOperation),
    /// Consensus-topic operations.
    ConsensusTopic(TopicOperation),
    /// Network administration.
    NetworkAdmin(AdminOperation),
    /// Address-book operations.
    AddressBook(AddressBookOperation),
    /// Utility operations.
    Util(UtilOperation),
}

impl TransactionBody {
    /// The category of this body.
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionBody::Token(_) => TransactionKind::Token,
            TransactionBody::File(_) => TransactionKind::File,
            TransactionBody::Schedule(_) => TransactionKind::Schedule,
            TransactionBody::SmartContract(_) => TransactionKind::SmartContract,
            TransactionBody::ConsensusTopic(_) => TransactionKind::ConsensusTopic,
            TransactionBody::NetworkAdmin(_) => TransactionKind::NetworkAdmin,
            TransactionBody::AddressBook(_) => TransactionKind::AddressBook,
            TransactionBody::Util(_) => TransactionKind::Util,
        }
    }
}

/// Everything a transaction carries except its signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionData {
    /// Transaction identity.
    pub id: TransactionId,
    /// Account charged for fees.
    pub fee_payer: AccountId,
    /// Node the client submitted to.
    pub node: NodeId,
    /// Maximum total fee the payer accepts.
    pub max_fee: u64,
    /// Length of the validity window in seconds.
    pub valid_duration_secs: u64,
    /// Free-form memo.
    pub memo: String,
    /// The operation.
    pub body: TransactionBody,
}

impl TransactionData {
    /// Canonical encoding of the data.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("TransactionData serialization should never fail")
    }
}

/// A signed, immutable transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    data: TransactionData,
    signatures: Vec<SignaturePair>,
}

impl Transaction {
    /// Assemble a transaction from data and pre-computed signatures.
    pub fn new(data: TransactionData, signatures: Vec<SignaturePair>) -> Self {
        Self { data, signatures }
    }

    /// Sign `data` with every key in `signers`.
    pub fn sign(data: TransactionData, signers: &[&KeyPair]) -> Self {
        let message = transaction_signing_message(&data.canonical_bytes());
        let signatures = signers
            .iter()
            .map(|kp| SignaturePair {
                public_key: kp.public_key(),
                signature: kp.sign(&message),
            })
            .collect();
        Self { data, signatures }
    }

    /// Parse a transaction from its wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Wire encoding of the full transaction.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("Transaction serialization should never fail")
    }

    /// Transaction identity.
    pub fn id(&self) -> &TransactionId {
        &self.data.id
    }

    /// Unsigned content.
    pub fn data(&self) -> &TransactionData {
        &self.data
    }

    /// The operation.
    pub fn body(&self) -> &TransactionBody {
        &self.data.body
    }

    /// Account charged for fees.
    pub fn fee_payer(&self) -> AccountId {
        self.data.fee_payer
    }

    /// Signatures attached to the transaction.
    pub fn signatures(&self) -> &[SignaturePair] {
        &self.signatures
    }

    /// The exact bytes every signature must cover.
    pub fn signed_bytes(&self) -> Vec<u8> {
        transaction_signing_message(&self.data.canonical_bytes())
    }

    /// Hash of the signed bytes; equal hashes mean cryptographic verification
    /// results can be reused.
    pub fn signed_bytes_hash(&self) -> Hash {
        Hash::from_bytes(&self.signed_bytes())
    }

    /// Hash of the full transaction including signatures.
    pub fn hash(&self) -> Hash {
        Hash::from_bytes(&self.to_bytes())
    }

    /// Length of the validity window.
    pub fn valid_duration(&self) -> Duration {
        Duration::from_secs(self.data.valid_duration_secs)
    }

    /// Last instant at which the transaction may reach consensus.
    pub fn valid_until(&self) -> Timestamp {
        self.data.id.valid_start.saturating_add(self.valid_duration())
    }

    /// Whether `at` falls inside `[valid_start, valid_until]`.
    pub fn is_valid_at(&self, at: Timestamp) -> bool {
        at >= self.data.id.valid_start && at <= self.valid_until()
    }

    /// Size of the wire encoding in bytes.
    pub fn encoded_len(&self) -> usize {
        bincode::serialized_size(self).map_or(usize::MAX, |len| len as usize)
    }
}
