use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::transaction::{Transaction, TransactionNumber};

/// The unique suffix of a DID, hex-encoded.
///
/// Suffixes are derived from the create operation's suffix data, so they are
/// always 64 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DidSuffix(String);

impl DidSuffix {
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(TypeError::InvalidDidSuffix(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DidSuffix {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DidSuffix> for String {
    fn from(value: DidSuffix) -> Self {
        value.0
    }
}

impl FromStr for DidSuffix {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for DidSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DidSuffix({})", &self.0[..8])
    }
}

impl fmt::Display for DidSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of a DID operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Recover,
    Deactivate,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Recover => "recover",
            Self::Deactivate => "deactivate",
        };
        f.write_str(s)
    }
}

impl FromStr for OperationType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "recover" => Ok(Self::Recover),
            "deactivate" => Ok(Self::Deactivate),
            other => Err(TypeError::UnknownOperationType(other.to_string())),
        }
    }
}

/// A DID operation bound to the ledger transaction that anchored it.
///
/// `operation_buffer` holds the operation exactly as it appeared in the
/// batch; interpreting it is the job of the protocol version in force at
/// `transaction_time`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredOperation {
    pub did_suffix: DidSuffix,
    pub operation_type: OperationType,
    pub operation_buffer: Vec<u8>,
    pub transaction_number: TransactionNumber,
    pub transaction_time: u64,
    /// Position of the operation within its batch.
    pub operation_index: u32,
}

impl AnchoredOperation {
    pub fn new(
        transaction: &Transaction,
        operation_index: u32,
        did_suffix: DidSuffix,
        operation_type: OperationType,
        operation_buffer: Vec<u8>,
    ) -> Self {
        Self {
            did_suffix,
            operation_type,
            operation_buffer,
            transaction_number: transaction.transaction_number,
            transaction_time: transaction.transaction_time,
            operation_index,
        }
    }

    /// Canonical replay key: `(transaction_number, operation_index)`.
    pub fn ordering_key(&self) -> (TransactionNumber, u32) {
        (self.transaction_number, self.operation_index)
    }

    /// Compare two operations by their canonical replay order.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }
}
