//! # Credential Resolver
//!
//! Shelley-era addresses are bech32 strings wrapping a short byte payload:
//!
//! ```text
//! header (1 byte)  = address type (high nibble) | network tag (low nibble)
//! payment part     = 28-byte key or script hash      (absent on reward addresses)
//! stake part       = 28-byte key or script hash      (base addresses)
//!                  | variable-length chain pointer   (pointer addresses)
//! ```
//!
//! Clustering only cares about the two hashes. This module decodes an
//! address into a [`ShelleyAddress`] and re-encodes each hash as a stable
//! credential string:
//!
//! - payment key hash -> `addr_vkh1...`, identical across networks and
//!   address types so that it works as an equality key;
//! - stake hash -> the reward address (`stake1...` / `stake_test1...`) for
//!   the network tag the caller supplies.
//!
//! Everything here is pure and allocation-light. Byron (base58) addresses
//! are not bech32 and are rejected as malformed.

use std::fmt;

use bech32::{Bech32, Hrp};
use thiserror::Error;

use crate::config::{
    address_hrp, stake_hrp, ADDRESS_HRP_MAINNET, ADDRESS_HRP_TESTNET, CREDENTIAL_HASH_LENGTH,
    PAYMENT_KEY_HASH_HRP, STAKE_HRP_MAINNET, STAKE_HRP_TESTNET,
};
use crate::types::{Address, PaymentCredential, StakeCredential};

/// Raw 28-byte credential hash.
pub type CredentialHash = [u8; CREDENTIAL_HASH_LENGTH];

/// Length of a header byte followed by one hash.
const SINGLE_PART_LENGTH: usize = 1 + CREDENTIAL_HASH_LENGTH;

/// Length of a base address payload.
const BASE_ADDRESS_LENGTH: usize = 1 + 2 * CREDENTIAL_HASH_LENGTH;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while resolving credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The text is not a decodable Shelley address, or lacks the credential
    /// the caller asked for.
    #[error("malformed address {address}: {reason}")]
    MalformedAddress {
        /// The offending input.
        address: String,
        /// What was wrong with it.
        reason: String,
    },
}

fn malformed(address: &str, reason: impl Into<String>) -> CredentialError {
    CredentialError::MalformedAddress {
        address: address.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Address structure
// ---------------------------------------------------------------------------

/// Whether a hash commits to a verification key or to a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Key,
    Script,
}

/// A hash together with what it commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CredentialPart {
    pub kind: HashKind,
    pub hash: CredentialHash,
}

impl CredentialPart {
    pub fn key(hash: CredentialHash) -> Self {
        Self {
            kind: HashKind::Key,
            hash,
        }
    }

    pub fn script(hash: CredentialHash) -> Self {
        Self {
            kind: HashKind::Script,
            hash,
        }
    }

    /// Lowercase hex of the hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// The four Shelley address shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    /// Payment part + stake hash.
    Base,
    /// Payment part + pointer to a stake registration certificate.
    Pointer,
    /// Payment part only.
    Enterprise,
    /// Stake hash only.
    Reward,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressKind::Base => "base",
            AddressKind::Pointer => "pointer",
            AddressKind::Enterprise => "enterprise",
            AddressKind::Reward => "reward",
        };
        f.write_str(name)
    }
}

/// A decoded Shelley address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShelleyAddress {
    kind: AddressKind,
    network_tag: u8,
    payment: Option<CredentialPart>,
    stake: Option<CredentialPart>,
    /// Raw pointer bytes for pointer addresses, empty otherwise.
    pointer: Vec<u8>,
}

impl ShelleyAddress {
    /// A base address: payment part plus stake hash.
    pub fn base(network_tag: u8, payment: CredentialPart, stake: CredentialPart) -> Self {
        Self {
            kind: AddressKind::Base,
            network_tag,
            payment: Some(payment),
            stake: Some(stake),
            pointer: Vec::new(),
        }
    }

    /// An enterprise address: payment part only.
    pub fn enterprise(network_tag: u8, payment: CredentialPart) -> Self {
        Self {
            kind: AddressKind::Enterprise,
            network_tag,
            payment: Some(payment),
            stake: None,
            pointer: Vec::new(),
        }
    }

    /// A reward address for the given stake hash.
    pub fn reward(network_tag: u8, stake: CredentialPart) -> Self {
        Self {
            kind: AddressKind::Reward,
            network_tag,
            payment: None,
            stake: Some(stake),
            pointer: Vec::new(),
        }
    }

    /// Decodes bech32 text into its parts.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MalformedAddress`] on bad bech32, an
    /// unexpected prefix, an unsupported header type or a wrong length.
    pub fn decode(address: &str) -> Result<Self, CredentialError> {
        let (hrp, data) =
            bech32::decode(address).map_err(|e| malformed(address, format!("bech32: {e}")))?;

        let prefix = hrp.to_string().to_ascii_lowercase();
        if ![
            ADDRESS_HRP_MAINNET,
            ADDRESS_HRP_TESTNET,
            STAKE_HRP_MAINNET,
            STAKE_HRP_TESTNET,
        ]
        .contains(&prefix.as_str())
        {
            return Err(malformed(address, format!("unexpected prefix '{prefix}'")));
        }

        let header = *data
            .first()
            .ok_or_else(|| malformed(address, "empty payload"))?;
        let network_tag = header & 0x0F;
        let type_tag = header >> 4;

        let hash_at = |offset: usize| -> Result<CredentialHash, CredentialError> {
            data.get(offset..offset + CREDENTIAL_HASH_LENGTH)
                .and_then(|slice| slice.try_into().ok())
                .ok_or_else(|| malformed(address, "payload too short"))
        };
        let expect_len = |expected: usize| -> Result<(), CredentialError> {
            if data.len() == expected {
                Ok(())
            } else {
                Err(malformed(
                    address,
                    format!("expected {expected} payload bytes, got {}", data.len()),
                ))
            }
        };
        let part = |script: bool, hash: CredentialHash| {
            if script {
                CredentialPart::script(hash)
            } else {
                CredentialPart::key(hash)
            }
        };

        let decoded = match type_tag {
            0..=3 => {
                expect_len(BASE_ADDRESS_LENGTH)?;
                Self {
                    kind: AddressKind::Base,
                    network_tag,
                    payment: Some(part(type_tag & 0b01 != 0, hash_at(1)?)),
                    stake: Some(part(type_tag & 0b10 != 0, hash_at(1 + CREDENTIAL_HASH_LENGTH)?)),
                    pointer: Vec::new(),
                }
            }
            4 | 5 => {
                // Slot, tx index and cert index are at least one byte each.
                if data.len() < SINGLE_PART_LENGTH + 3 {
                    return Err(malformed(address, "pointer address too short"));
                }
                Self {
                    kind: AddressKind::Pointer,
                    network_tag,
                    payment: Some(part(type_tag == 5, hash_at(1)?)),
                    stake: None,
                    pointer: data[SINGLE_PART_LENGTH..].to_vec(),
                }
            }
            6 | 7 => {
                expect_len(SINGLE_PART_LENGTH)?;
                Self::enterprise(network_tag, part(type_tag == 7, hash_at(1)?))
            }
            14 | 15 => {
                expect_len(SINGLE_PART_LENGTH)?;
                Self::reward(network_tag, part(type_tag == 15, hash_at(1)?))
            }
            other => {
                return Err(malformed(
                    address,
                    format!("unsupported address type {other}"),
                ))
            }
        };

        let expected = match decoded.kind {
            AddressKind::Reward => stake_hrp(network_tag),
            _ => address_hrp(network_tag),
        };
        if prefix != expected {
            return Err(malformed(
                address,
                format!(
                    "prefix '{prefix}' does not match a {} header on network tag {network_tag}",
                    decoded.kind
                ),
            ));
        }

        Ok(decoded)
    }

    /// Re-encodes the address as bech32, using the prefix that matches its
    /// kind and network tag.
    pub fn to_bech32(&self) -> String {
        let mut payload = Vec::with_capacity(BASE_ADDRESS_LENGTH + self.pointer.len());
        payload.push((self.type_tag() << 4) | (self.network_tag & 0x0F));
        if let Some(payment) = &self.payment {
            payload.extend_from_slice(&payment.hash);
        }
        match self.kind {
            AddressKind::Pointer => payload.extend_from_slice(&self.pointer),
            _ => {
                if let Some(stake) = &self.stake {
                    payload.extend_from_slice(&stake.hash);
                }
            }
        }

        let prefix = match self.kind {
            AddressKind::Reward => stake_hrp(self.network_tag),
            _ => address_hrp(self.network_tag),
        };
        encode(prefix, &payload)
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn network_tag(&self) -> u8 {
        self.network_tag
    }

    pub fn payment_part(&self) -> Option<&CredentialPart> {
        self.payment.as_ref()
    }

    pub fn stake_part(&self) -> Option<&CredentialPart> {
        self.stake.as_ref()
    }

    fn type_tag(&self) -> u8 {
        let script = |p: Option<&CredentialPart>| matches!(p, Some(c) if c.kind == HashKind::Script);
        let payment_script = script(self.payment.as_ref()) as u8;
        let stake_script = script(self.stake.as_ref()) as u8;
        match self.kind {
            AddressKind::Base => payment_script | (stake_script << 1),
            AddressKind::Pointer => 4 | payment_script,
            AddressKind::Enterprise => 6 | payment_script,
            AddressKind::Reward => 14 | stake_script,
        }
    }
}

fn encode(prefix: &'static str, payload: &[u8]) -> String {
    let hrp = Hrp::parse_unchecked(prefix);
    bech32::encode::<Bech32>(hrp, payload).expect("address payloads are far below the bech32 length limit")
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Checks that `address` decodes as a Shelley address.
pub fn validate_address(address: &Address) -> Result<ShelleyAddress, CredentialError> {
    ShelleyAddress::decode(address.as_str())
}

/// Payment credential of an address, as `addr_vkh1...`.
///
/// # Errors
///
/// Fails with [`CredentialError::MalformedAddress`] when the address cannot
/// be decoded, has no payment part (reward addresses) or its payment part is
/// a script hash.
pub fn resolve_payment_credential(address: &Address) -> Result<PaymentCredential, CredentialError> {
    let decoded = validate_address(address)?;
    match decoded.payment_part() {
        Some(part) if part.kind == HashKind::Key => {
            Ok(PaymentCredential::new(encode(PAYMENT_KEY_HASH_HRP, &part.hash)))
        }
        Some(_) => Err(malformed(address.as_str(), "payment part is a script hash")),
        None => Err(malformed(
            address.as_str(),
            format!("{} address has no payment part", decoded.kind()),
        )),
    }
}

/// Stake credential of an address, as a reward address on `network_id`.
///
/// Returns `Ok(None)` for enterprise and pointer addresses.
///
/// # Errors
///
/// Fails with [`CredentialError::MalformedAddress`] when the address cannot
/// be decoded.
pub fn resolve_stake_credential(
    address: &Address,
    network_id: u8,
) -> Result<Option<StakeCredential>, CredentialError> {
    let decoded = validate_address(address)?;
    Ok(decoded.stake_part().map(|part| {
        StakeCredential::new(ShelleyAddress::reward(network_id, *part).to_bech32())
    }))
}
