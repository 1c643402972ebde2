// src/decoders/mod.rs

//! Décodeur d'instructions : fonction pure d'une transaction vers zéro ou
//! plusieurs [`DomainEvent`].
//!
//! Chaque programme surveillé est décrit par un [`MonitoredProgram`] immuable :
//! sa table de discriminateurs d'instructions (comparaison exacte sur 8 octets),
//! ses discriminateurs d'événements Anchor (`Program data:`) et la disposition
//! des comptes nécessaire au décodage.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::{collections::HashSet, time::SystemTime};

use crate::{
    error::{DecodeError, MonitorError},
    events::{ClaimType, DomainEvent},
    rpc::{LedgerTransaction, RawInstruction},
};

pub mod pump;

pub const DISCRIMINATOR_LEN: usize = 8;

// --- 1. Les familles d'instructions connues ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    CollectCreatorFee,
    ClaimCashback,
    DistributeCreatorFees,
    CollectCoinCreatorFee,
    AmmClaimCashback,
    TransferCreatorFeesToPump,
    Create,
    CreateV2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    FeeClaim,
    TokenLaunch,
}

impl InstructionKind {
    pub fn family(self) -> EventFamily {
        match self {
            InstructionKind::CollectCreatorFee
            | InstructionKind::ClaimCashback
            | InstructionKind::DistributeCreatorFees
            | InstructionKind::CollectCoinCreatorFee
            | InstructionKind::AmmClaimCashback
            | InstructionKind::TransferCreatorFeesToPump => EventFamily::FeeClaim,
            InstructionKind::Create | InstructionKind::CreateV2 => EventFamily::TokenLaunch,
        }
    }

    /// `None` pour les lancements.
    pub fn claim_type(self) -> Option<ClaimType> {
        match self {
            InstructionKind::CollectCreatorFee => Some(ClaimType::CollectCreatorFee),
            InstructionKind::ClaimCashback | InstructionKind::AmmClaimCashback => Some(ClaimType::ClaimCashback),
            InstructionKind::DistributeCreatorFees => Some(ClaimType::DistributeCreatorFees),
            InstructionKind::CollectCoinCreatorFee => Some(ClaimType::CollectCoinCreatorFee),
            InstructionKind::TransferCreatorFeesToPump => Some(ClaimType::TransferCreatorFeesToPump),
            InstructionKind::Create | InstructionKind::CreateV2 => None,
        }
    }

    pub fn is_cashback(self) -> bool {
        matches!(self, InstructionKind::ClaimCashback | InstructionKind::AmmClaimCashback)
    }

    /// Libellé lisible, repris dans `FeeClaimEvent::label`.
    pub fn label(self) -> &'static str {
        match self {
            InstructionKind::CollectCreatorFee => "Pump Creator Fee",
            InstructionKind::ClaimCashback => "Pump Cashback",
            InstructionKind::DistributeCreatorFees => "Pump Fee Distribution",
            InstructionKind::CollectCoinCreatorFee => "PumpSwap Creator Fee",
            InstructionKind::AmmClaimCashback => "PumpSwap Cashback",
            InstructionKind::TransferCreatorFeesToPump => "PumpSwap Fee Transfer",
            InstructionKind::Create => "Pump Launch",
            InstructionKind::CreateV2 => "Pump Launch (v2)",
        }
    }

    /// Nom court pour les labels Prometheus.
    pub fn metric_name(self) -> &'static str {
        match self {
            InstructionKind::CollectCreatorFee => "collect_creator_fee",
            InstructionKind::ClaimCashback => "claim_cashback",
            InstructionKind::DistributeCreatorFees => "distribute_creator_fees",
            InstructionKind::CollectCoinCreatorFee => "collect_coin_creator_fee",
            InstructionKind::AmmClaimCashback => "amm_claim_cashback",
            InstructionKind::TransferCreatorFeesToPump => "transfer_creator_fees_to_pump",
            InstructionKind::Create => "create",
            InstructionKind::CreateV2 => "create_v2",
        }
    }
}

// --- 2. Dispositions des comptes ---

/// D'où lire le montant réclamé.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSource {
    /// Lamports sortis du compte à cette position (vault natif).
    LamportOutflow(usize),
    /// Unités de token sorties du compte à cette position (ATA du vault).
    TokenOutflow(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimLayout {
    pub claimant: usize,
    pub mint: Option<usize>,
    pub amount: AmountSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchLayout {
    pub mint: usize,
    pub bonding_curve: usize,
    pub user: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLayout {
    Claim(ClaimLayout),
    Launch(LaunchLayout),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionDef {
    pub kind: InstructionKind,
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    pub layout: AccountLayout,
}

/// Lecture du corps d'un événement (après le discriminateur).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLayout {
    /// Offsets fixes du réclamant et du montant.
    Claim { claimant_offset: usize, amount_offset: usize },
    /// `name, symbol, uri` (chaînes Borsh) puis `mint, bonding_curve, user[, creator]`.
    Launch,
}

impl EventLayout {
    pub fn family(self) -> EventFamily {
        match self {
            EventLayout::Claim { .. } => EventFamily::FeeClaim,
            EventLayout::Launch => EventFamily::TokenLaunch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDef {
    pub kind: InstructionKind,
    pub name: &'static str,
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    /// `None` : l'événement est reconnu mais ne porte pas de quoi construire un événement.
    pub layout: Option<EventLayout>,
}

// --- 3. Le descripteur de programme ---

#[derive(Debug, Clone)]
pub struct MonitoredProgram {
    /// Identifiant stable (clé du curseur persistant, label des métriques).
    pub name: String,
    pub program_id: Pubkey,
    pub instructions: Vec<InstructionDef>,
    pub events: Vec<EventDef>,
    /// Fragments de logs (`Instruction: CollectCreatorFee`...) annonçant une instruction surveillée.
    pub log_hints: Vec<String>,
}

impl MonitoredProgram {
    /// Vérifie que le descripteur est exploitable.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.name.trim().is_empty() {
            return Err(MonitorError::Configuration("programme sans nom".to_string()));
        }
        if self.instructions.is_empty() && self.events.is_empty() {
            return Err(MonitorError::Configuration(format!(
                "le programme `{}` n'a aucune instruction ni aucun événement décodable",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for def in &self.instructions {
            if !seen.insert(def.discriminator) {
                return Err(MonitorError::Configuration(format!(
                    "`{}` : discriminateur {} dupliqué",
                    self.name,
                    hex::encode(def.discriminator)
                )));
            }
            let layout_family = match def.layout {
                AccountLayout::Claim(_) => EventFamily::FeeClaim,
                AccountLayout::Launch(_) => EventFamily::TokenLaunch,
            };
            if layout_family != def.kind.family() {
                return Err(MonitorError::Configuration(format!(
                    "`{}` : disposition incompatible avec {:?}",
                    self.name, def.kind
                )));
            }
        }

        let mut seen = HashSet::new();
        for def in &self.events {
            if !seen.insert(def.discriminator) {
                return Err(MonitorError::Configuration(format!(
                    "`{}` : discriminateur d'événement {} dupliqué",
                    self.name,
                    hex::encode(def.discriminator)
                )));
            }
            if def.layout.is_some_and(|layout| layout.family() != def.kind.family()) {
                return Err(MonitorError::Configuration(format!(
                    "`{}` : disposition de l'événement {} incompatible avec {:?}",
                    self.name, def.name, def.kind
                )));
            }
        }
        Ok(())
    }

    /// Recherche exacte sur les 8 premiers octets. Un quasi-match n'est pas un match.
    pub fn instruction_def(&self, data: &[u8]) -> Option<&InstructionDef> {
        let prefix = data.get(..DISCRIMINATOR_LEN)?;
        self.instructions.iter().find(|def| def.discriminator == prefix)
    }

    pub fn event_def(&self, data: &[u8]) -> Option<&EventDef> {
        let prefix = data.get(..DISCRIMINATOR_LEN)?;
        self.events.iter().find(|def| def.discriminator == prefix)
    }

    /// Pré-filtre bon marché sur les logs d'une notification, avant tout fetch.
    /// Des logs tronqués passent toujours : l'instruction a pu être coupée.
    pub fn mentioned_in_logs(&self, logs: &[String]) -> bool {
        if logs.is_empty() || logs.iter().any(|l| l.starts_with("Log truncated")) {
            return true;
        }
        if logs
            .iter()
            .any(|line| self.log_hints.iter().any(|hint| line.contains(hint.as_str())))
        {
            return true;
        }
        !self.events.is_empty()
            && logs.iter().any(|line| {
                pump::events::program_data(line)
                    .map(|bytes| self.event_def(&bytes).is_some())
                    .unwrap_or(false)
            })
    }
}

/// Contexte commun aux décodeurs d'une même transaction.
pub(crate) struct DecodeContext<'a> {
    pub program: &'a MonitoredProgram,
    pub tx: &'a LedgerTransaction,
    pub timestamp: i64,
}

/// Décode une transaction pour un programme.
///
/// Une transaction échouée on-chain ne produit rien. Chaque instruction de
/// premier niveau du programme dont le discriminateur est connu donne un
/// résultat ; une erreur n'affecte que son instruction. Si aucune instruction
/// ne correspond, les lignes `Program data:` sont essayées (appels CPI).
/// Les événements réussis reçoivent des ordinaux consécutifs (0, 1, ...).
pub fn decode_transaction(
    program: &MonitoredProgram,
    tx: &LedgerTransaction,
) -> Vec<Result<DomainEvent, DecodeError>> {
    if !tx.succeeded {
        return Vec::new();
    }

    let ctx = DecodeContext {
        program,
        tx,
        timestamp: tx.block_time.unwrap_or_else(unix_now),
    };

    let mut results: Vec<Result<DomainEvent, DecodeError>> = tx
        .instructions
        .iter()
        .enumerate()
        .filter(|(_, ix)| ix.program_id == program.program_id)
        .filter_map(|(index, ix)| {
            let def = program.instruction_def(&ix.data)?;
            Some(decode_instruction(&ctx, def, index, ix))
        })
        .collect();

    if results.is_empty() && !program.events.is_empty() {
        results = pump::events::decode_program_data(&ctx);
    }

    let mut ordinal = 0u32;
    for event in results.iter_mut().flatten() {
        event.set_ordinal(ordinal);
        ordinal += 1;
    }
    results
}

fn decode_instruction(
    ctx: &DecodeContext<'_>,
    def: &InstructionDef,
    index: usize,
    ix: &RawInstruction,
) -> Result<DomainEvent, DecodeError> {
    match &def.layout {
        AccountLayout::Claim(layout) => {
            pump::claims::decode_claim(ctx, def.kind, layout, index, ix).map(DomainEvent::FeeClaim)
        }
        AccountLayout::Launch(layout) => {
            pump::create::decode_create(ctx, def.kind, layout, ix).map(DomainEvent::TokenLaunch)
        }
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
