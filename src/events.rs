// DANS : src/events.rs

use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};

use crate::decoders::InstructionKind;

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Type de réclamation, dans le vocabulaire des IDL Pump / PumpSwap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    CollectCreatorFee,
    ClaimCashback,
    CollectCoinCreatorFee,
    DistributeCreatorFees,
    TransferCreatorFeesToPump,
}

/// D'où provient la détection : une instruction de premier niveau ou une ligne `Program data:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "origin", content = "index")]
pub enum EventOrigin {
    Instruction(usize),
    Log(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeClaimEvent {
    #[serde(with = "as_string")]
    pub signature: Signature,
    pub slot: u64,
    /// Timestamp du bloc (secondes unix), ou l'heure de détection si le nœud ne le fournit pas.
    pub timestamp: i64,
    /// Rang de l'événement dans la transaction (0, 1, ...).
    pub ordinal: u32,
    pub origin: EventOrigin,
    #[serde(with = "as_string")]
    pub program_id: Pubkey,
    pub kind: InstructionKind,
    pub claim_type: ClaimType,
    #[serde(with = "as_string")]
    pub claimant: Pubkey,
    #[serde(with = "opt_as_string")]
    pub token_mint: Option<Pubkey>,
    pub amount_lamports: u64,
    pub is_cashback: bool,
    pub label: String,
}

impl FeeClaimEvent {
    pub fn amount_sol(&self) -> f64 {
        self.amount_lamports as f64 / LAMPORTS_PER_SOL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLaunchEvent {
    #[serde(with = "as_string")]
    pub signature: Signature,
    pub slot: u64,
    pub timestamp: i64,
    pub ordinal: u32,
    #[serde(with = "as_string")]
    pub program_id: Pubkey,
    pub kind: InstructionKind,
    #[serde(with = "as_string")]
    pub mint: Pubkey,
    #[serde(with = "as_string")]
    pub creator: Pubkey,
    #[serde(with = "as_string")]
    pub bonding_curve: Pubkey,
    pub name: String,
    pub symbol: String,
    pub metadata_uri: String,
    pub mayhem_mode: bool,
}

/// Valeur immuable produite une fois par instruction reconnue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    FeeClaim(FeeClaimEvent),
    TokenLaunch(TokenLaunchEvent),
}

impl DomainEvent {
    pub fn signature(&self) -> &Signature {
        match self {
            DomainEvent::FeeClaim(e) => &e.signature,
            DomainEvent::TokenLaunch(e) => &e.signature,
        }
    }

    pub fn slot(&self) -> u64 {
        match self {
            DomainEvent::FeeClaim(e) => e.slot,
            DomainEvent::TokenLaunch(e) => e.slot,
        }
    }

    pub fn ordinal(&self) -> u32 {
        match self {
            DomainEvent::FeeClaim(e) => e.ordinal,
            DomainEvent::TokenLaunch(e) => e.ordinal,
        }
    }

    pub(crate) fn set_ordinal(&mut self, ordinal: u32) {
        match self {
            DomainEvent::FeeClaim(e) => e.ordinal = ordinal,
            DomainEvent::TokenLaunch(e) => e.ordinal = ordinal,
        }
    }

    pub fn kind(&self) -> InstructionKind {
        match self {
            DomainEvent::FeeClaim(e) => e.kind,
            DomainEvent::TokenLaunch(e) => e.kind,
        }
    }

    /// Adresses que cet événement "mentionne", pour la mise en correspondance avec les watches.
    pub fn addresses(&self) -> Vec<Pubkey> {
        match self {
            DomainEvent::FeeClaim(e) => {
                let mut out = vec![e.claimant];
                out.extend(e.token_mint);
                out
            }
            DomainEvent::TokenLaunch(e) => vec![e.creator, e.mint],
        }
    }
}

/// Sérialise via `Display` / `FromStr` (base58 pour les clés et signatures)
/// pour garder les documents JSON lisibles.
pub(crate) mod as_string {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::{fmt::Display, str::FromStr};

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

pub(crate) mod opt_as_string {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::{fmt::Display, str::FromStr};

    pub fn serialize<T: Display, S: Serializer>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| raw.parse().map_err(de::Error::custom))
            .transpose()
    }
}
