// DANS : src/decoders/pump/mod.rs

//! Tables des programmes Pump (bonding curve) et PumpSwap (AMM).
//! Discriminateurs Anchor : `sha256("global:<instruction>")[..8]` et
//! `sha256("event:<Event>")[..8]`.

use solana_sdk::pubkey::Pubkey;

use super::{
    AccountLayout, AmountSource, ClaimLayout, EventDef, EventLayout, InstructionDef, InstructionKind,
    LaunchLayout, MonitoredProgram,
};

pub mod claims;
pub mod create;
pub mod events;

// --- CONSTANTES DU PROTOCOLE ---
pub const PUMP_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const PUMP_AMM_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA");
pub const PUMP_FEE_ACCOUNT: Pubkey = solana_sdk::pubkey!("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbCJ5GEFDM97zC");
pub const PUMP_MIGRATION_AUTHORITY: Pubkey = solana_sdk::pubkey!("39azUYFWPz3VHgKCf3VChUwbpURdCHRxjWVowf5jUJjg");

// Instructions (Pump)
pub const COLLECT_CREATOR_FEE_DISCRIMINATOR: [u8; 8] = [20, 22, 86, 123, 198, 28, 219, 132];
pub const CLAIM_CASHBACK_DISCRIMINATOR: [u8; 8] = [37, 58, 35, 126, 190, 53, 228, 197];
pub const DISTRIBUTE_CREATOR_FEES_DISCRIMINATOR: [u8; 8] = [165, 114, 103, 0, 121, 206, 247, 81];
pub const CREATE_DISCRIMINATOR: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];
pub const CREATE_V2_DISCRIMINATOR: [u8; 8] = [214, 144, 76, 236, 95, 139, 49, 180];

// Instructions (PumpSwap)
pub const COLLECT_COIN_CREATOR_FEE_DISCRIMINATOR: [u8; 8] = [160, 57, 89, 42, 181, 139, 43, 66];
pub const TRANSFER_CREATOR_FEES_TO_PUMP_DISCRIMINATOR: [u8; 8] = [139, 52, 134, 85, 228, 229, 108, 241];

// Événements
pub const COLLECT_CREATOR_FEE_EVENT_DISCRIMINATOR: [u8; 8] = [122, 2, 127, 1, 14, 191, 12, 175];
pub const DISTRIBUTE_CREATOR_FEES_EVENT_DISCRIMINATOR: [u8; 8] = [165, 55, 129, 112, 4, 179, 202, 40];
pub const CLAIM_CASHBACK_EVENT_DISCRIMINATOR: [u8; 8] = [226, 214, 246, 33, 7, 242, 147, 229];
pub const COLLECT_COIN_CREATOR_FEE_EVENT_DISCRIMINATOR: [u8; 8] = [232, 245, 194, 238, 234, 218, 58, 89];
pub const CREATE_EVENT_DISCRIMINATOR: [u8; 8] = [27, 114, 169, 77, 222, 235, 99, 118];

// `timestamp: i64, creator: Pubkey, creator_fee: u64, ...`
const CREATOR_FEE_EVENT_LAYOUT: EventLayout = EventLayout::Claim {
    claimant_offset: 8,
    amount_offset: 40,
};
// `user: Pubkey, amount: u64, ...`
const CASHBACK_EVENT_LAYOUT: EventLayout = EventLayout::Claim {
    claimant_offset: 0,
    amount_offset: 32,
};

fn hints(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| format!("Instruction: {n}")).collect()
}

/// Réclamations de frais créateur et de cashback sur la bonding curve.
pub fn pump_fee_claims() -> MonitoredProgram {
    MonitoredProgram {
        name: "pump".to_string(),
        program_id: PUMP_PROGRAM_ID,
        instructions: vec![
            InstructionDef {
                kind: InstructionKind::CollectCreatorFee,
                discriminator: COLLECT_CREATOR_FEE_DISCRIMINATOR,
                // creator, creator_vault
                layout: AccountLayout::Claim(ClaimLayout {
                    claimant: 0,
                    mint: None,
                    amount: AmountSource::LamportOutflow(1),
                }),
            },
            InstructionDef {
                kind: InstructionKind::ClaimCashback,
                discriminator: CLAIM_CASHBACK_DISCRIMINATOR,
                // user, user_volume_accumulator
                layout: AccountLayout::Claim(ClaimLayout {
                    claimant: 0,
                    mint: None,
                    amount: AmountSource::LamportOutflow(1),
                }),
            },
            InstructionDef {
                kind: InstructionKind::DistributeCreatorFees,
                discriminator: DISTRIBUTE_CREATOR_FEES_DISCRIMINATOR,
                // mint, bonding_curve, creator, creator_vault
                layout: AccountLayout::Claim(ClaimLayout {
                    claimant: 2,
                    mint: Some(0),
                    amount: AmountSource::LamportOutflow(3),
                }),
            },
        ],
        events: vec![
            EventDef {
                kind: InstructionKind::CollectCreatorFee,
                name: "CollectCreatorFeeEvent",
                discriminator: COLLECT_CREATOR_FEE_EVENT_DISCRIMINATOR,
                layout: Some(CREATOR_FEE_EVENT_LAYOUT),
            },
            EventDef {
                kind: InstructionKind::ClaimCashback,
                name: "ClaimCashbackEvent",
                discriminator: CLAIM_CASHBACK_EVENT_DISCRIMINATOR,
                layout: Some(CASHBACK_EVENT_LAYOUT),
            },
            EventDef {
                kind: InstructionKind::DistributeCreatorFees,
                name: "DistributeCreatorFeesEvent",
                discriminator: DISTRIBUTE_CREATOR_FEES_EVENT_DISCRIMINATOR,
                layout: None,
            },
        ],
        log_hints: hints(&["CollectCreatorFee", "ClaimCashback", "DistributeCreatorFees"]),
    }
}

/// Réclamations côté PumpSwap (tokens déjà migrés). Les montants sont en WSOL.
pub fn pump_amm_fee_claims() -> MonitoredProgram {
    MonitoredProgram {
        name: "pump_amm".to_string(),
        program_id: PUMP_AMM_PROGRAM_ID,
        instructions: vec![
            InstructionDef {
                kind: InstructionKind::CollectCoinCreatorFee,
                discriminator: COLLECT_COIN_CREATOR_FEE_DISCRIMINATOR,
                // quote_mint, quote_token_program, coin_creator, vault_authority, vault_ata, ...
                layout: AccountLayout::Claim(ClaimLayout {
                    claimant: 2,
                    mint: None,
                    amount: AmountSource::TokenOutflow(4),
                }),
            },
            InstructionDef {
                kind: InstructionKind::AmmClaimCashback,
                discriminator: CLAIM_CASHBACK_DISCRIMINATOR,
                layout: AccountLayout::Claim(ClaimLayout {
                    claimant: 0,
                    mint: None,
                    amount: AmountSource::TokenOutflow(4),
                }),
            },
            InstructionDef {
                kind: InstructionKind::TransferCreatorFeesToPump,
                discriminator: TRANSFER_CREATOR_FEES_TO_PUMP_DISCRIMINATOR,
                layout: AccountLayout::Claim(ClaimLayout {
                    claimant: 4,
                    mint: None,
                    amount: AmountSource::TokenOutflow(6),
                }),
            },
        ],
        events: vec![
            EventDef {
                kind: InstructionKind::CollectCoinCreatorFee,
                name: "CollectCoinCreatorFeeEvent",
                discriminator: COLLECT_COIN_CREATOR_FEE_EVENT_DISCRIMINATOR,
                layout: Some(CREATOR_FEE_EVENT_LAYOUT),
            },
            EventDef {
                kind: InstructionKind::AmmClaimCashback,
                name: "ClaimCashbackEvent",
                discriminator: CLAIM_CASHBACK_EVENT_DISCRIMINATOR,
                layout: Some(CASHBACK_EVENT_LAYOUT),
            },
        ],
        log_hints: hints(&["CollectCoinCreatorFee", "ClaimCashback", "TransferCreatorFeesToPump"]),
    }
}

/// Lancements de tokens sur la bonding curve.
pub fn pump_launches() -> MonitoredProgram {
    MonitoredProgram {
        name: "pump_launch".to_string(),
        program_id: PUMP_PROGRAM_ID,
        instructions: vec![
            InstructionDef {
                kind: InstructionKind::Create,
                discriminator: CREATE_DISCRIMINATOR,
                // mint, mint_authority, bonding_curve, ..., user (7)
                layout: AccountLayout::Launch(LaunchLayout {
                    mint: 0,
                    bonding_curve: 2,
                    user: 7,
                }),
            },
            InstructionDef {
                kind: InstructionKind::CreateV2,
                discriminator: CREATE_V2_DISCRIMINATOR,
                layout: AccountLayout::Launch(LaunchLayout {
                    mint: 0,
                    bonding_curve: 2,
                    user: 5,
                }),
            },
        ],
        // Émis par `create` comme par `create_v2` : sert aux créations faites en CPI.
        events: vec![EventDef {
            kind: InstructionKind::Create,
            name: "CreateEvent",
            discriminator: CREATE_EVENT_DISCRIMINATOR,
            layout: Some(EventLayout::Launch),
        }],
        log_hints: hints(&["Create", "CreateV2"]),
    }
}

/// Les deux moniteurs de réclamations.
pub fn fee_claim_programs() -> Vec<MonitoredProgram> {
    vec![pump_fee_claims(), pump_amm_fee_claims()]
}
