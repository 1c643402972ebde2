// DANS : src/decoders/pump/claims.rs

use solana_sdk::pubkey::Pubkey;

use crate::{
    decoders::{AmountSource, ClaimLayout, DecodeContext, InstructionKind},
    error::DecodeError,
    events::{EventOrigin, FeeClaimEvent},
    rpc::RawInstruction,
};

/// Décode une instruction de réclamation : le bénéficiaire est lu dans la liste
/// de comptes, le montant dans le delta de solde du vault.
pub(crate) fn decode_claim(
    ctx: &DecodeContext<'_>,
    kind: InstructionKind,
    layout: &ClaimLayout,
    index: usize,
    ix: &RawInstruction,
) -> Result<FeeClaimEvent, DecodeError> {
    let claim_type = kind.claim_type().ok_or_else(|| DecodeError::InvalidEventData {
        kind,
        reason: "instruction sans type de réclamation".to_string(),
    })?;

    let claimant = account_at(ctx, kind, ix, layout.claimant)?;
    let token_mint = layout
        .mint
        .map(|position| account_at(ctx, kind, ix, position))
        .transpose()?;

    let amount_lamports = match layout.amount {
        AmountSource::LamportOutflow(position) => {
            let account_index = index_at(ctx, kind, ix, position)?;
            ctx.tx
                .lamport_outflow(account_index)
                .ok_or(DecodeError::MissingBalance { kind, account_index })?
        }
        AmountSource::TokenOutflow(position) => {
            let account_index = index_at(ctx, kind, ix, position)?;
            ctx.tx
                .token_outflow(account_index)
                .ok_or(DecodeError::MissingBalance { kind, account_index })?
        }
    };

    Ok(FeeClaimEvent {
        signature: ctx.tx.signature,
        slot: ctx.tx.slot,
        timestamp: ctx.timestamp,
        ordinal: 0,
        origin: EventOrigin::Instruction(index),
        program_id: ctx.program.program_id,
        kind,
        claim_type,
        claimant,
        token_mint,
        amount_lamports,
        is_cashback: kind.is_cashback(),
        label: kind.label().to_string(),
    })
}

fn index_at(
    ctx: &DecodeContext<'_>,
    kind: InstructionKind,
    ix: &RawInstruction,
    position: usize,
) -> Result<usize, DecodeError> {
    ctx.tx
        .account_index(ix, position)
        .ok_or(DecodeError::MissingAccount { kind, position })
}

pub(crate) fn account_at(
    ctx: &DecodeContext<'_>,
    kind: InstructionKind,
    ix: &RawInstruction,
    position: usize,
) -> Result<Pubkey, DecodeError> {
    let index = index_at(ctx, kind, ix, position)?;
    ctx.tx.key(index).ok_or(DecodeError::MissingAccount { kind, position })
}
