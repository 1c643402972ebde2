// DANS : src/decoders/pump/events.rs

use base64::{Engine as _, engine::general_purpose::STANDARD};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use super::create;
use crate::{
    decoders::{DISCRIMINATOR_LEN, DecodeContext, EventLayout, InstructionKind},
    error::DecodeError,
    events::{DomainEvent, EventOrigin, FeeClaimEvent},
};

/// Décode une ligne `Program data: <base64>` émise par `emit!`.
pub fn program_data(line: &str) -> Option<Vec<u8>> {
    let data_str = line.strip_prefix("Program data: ")?;
    STANDARD.decode(data_str.trim()).ok()
}

/// Cherche les événements connus dans les logs de la transaction.
/// Sert quand l'instruction a été appelée en CPI (par un routeur, un bot...)
/// et n'apparaît donc pas au premier niveau.
pub(crate) fn decode_program_data(ctx: &DecodeContext<'_>) -> Vec<Result<DomainEvent, DecodeError>> {
    let mut out = Vec::new();
    for (line_index, line) in ctx.tx.log_messages.iter().enumerate() {
        let Some(bytes) = program_data(line) else {
            continue;
        };
        let Some(def) = ctx.program.event_def(&bytes) else {
            continue;
        };
        let Some(layout) = def.layout else {
            debug!(event = def.name, signature = %ctx.tx.signature, "[Decoder] Événement reconnu sans disposition exploitable.");
            continue;
        };
        let body = &bytes[DISCRIMINATOR_LEN..];
        let decoded = match layout {
            EventLayout::Claim {
                claimant_offset,
                amount_offset,
            } => decode_claim_event(ctx, def.kind, claimant_offset, amount_offset, body, line_index)
                .map(DomainEvent::FeeClaim),
            EventLayout::Launch => create::decode_create_event(ctx, def.kind, body).map(DomainEvent::TokenLaunch),
        };
        out.push(decoded);
    }
    out
}

fn decode_claim_event(
    ctx: &DecodeContext<'_>,
    kind: InstructionKind,
    claimant_offset: usize,
    amount_offset: usize,
    body: &[u8],
    line_index: usize,
) -> Result<FeeClaimEvent, DecodeError> {
    let truncated = |needed: usize| DecodeError::Truncated {
        kind,
        needed,
        len: body.len(),
    };

    let claimant_end = claimant_offset + 32;
    let claimant_bytes = body
        .get(claimant_offset..claimant_end)
        .ok_or_else(|| truncated(claimant_end))?;
    let claimant = Pubkey::try_from(claimant_bytes).map_err(|e| DecodeError::InvalidEventData {
        kind,
        reason: e.to_string(),
    })?;

    let amount_end = amount_offset + 8;
    let amount_bytes: [u8; 8] = body
        .get(amount_offset..amount_end)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| truncated(amount_end))?;

    let claim_type = kind.claim_type().ok_or_else(|| DecodeError::InvalidEventData {
        kind,
        reason: "événement sans type de réclamation".to_string(),
    })?;

    Ok(FeeClaimEvent {
        signature: ctx.tx.signature,
        slot: ctx.tx.slot,
        timestamp: ctx.timestamp,
        ordinal: 0,
        origin: EventOrigin::Log(line_index),
        program_id: ctx.program.program_id,
        kind,
        claim_type,
        claimant,
        token_mint: None,
        amount_lamports: u64::from_le_bytes(amount_bytes),
        is_cashback: kind.is_cashback(),
        label: kind.label().to_string(),
    })
}
