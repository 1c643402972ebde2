// DANS : src/decoders/pump/create.rs

use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;

use super::claims::account_at;
use crate::{
    decoders::{DISCRIMINATOR_LEN, DecodeContext, InstructionKind, LaunchLayout},
    error::DecodeError,
    events::TokenLaunchEvent,
    rpc::RawInstruction,
};

/// Au-delà, la chaîne est considérée comme corrompue.
const MAX_STRING_LEN: usize = 1024;

/// Décode `create` / `create_v2` :
/// `name: String, symbol: String, uri: String, creator: Pubkey [, is_mayhem_mode: bool]`.
/// Les anciennes versions de `create` n'ont pas d'argument `creator` : on retombe alors
/// sur le compte `user`.
pub(crate) fn decode_create(
    ctx: &DecodeContext<'_>,
    kind: InstructionKind,
    layout: &LaunchLayout,
    ix: &RawInstruction,
) -> Result<TokenLaunchEvent, DecodeError> {
    let mut args = ix.data.get(DISCRIMINATOR_LEN..).unwrap_or_default();

    let name = read_string(kind, "name", &mut args)?;
    let symbol = read_string(kind, "symbol", &mut args)?;
    let uri = read_string(kind, "uri", &mut args)?;

    let mint = account_at(ctx, kind, ix, layout.mint)?;
    let bonding_curve = account_at(ctx, kind, ix, layout.bonding_curve)?;

    let creator = match args.get(..32) {
        Some(bytes) => Pubkey::try_from(bytes).map_err(|e| DecodeError::InvalidEventData {
            kind,
            reason: e.to_string(),
        })?,
        None => account_at(ctx, kind, ix, layout.user)?,
    };
    let mayhem_mode = kind == InstructionKind::CreateV2 && args.get(32) == Some(&1);

    Ok(TokenLaunchEvent {
        signature: ctx.tx.signature,
        slot: ctx.tx.slot,
        timestamp: ctx.timestamp,
        ordinal: 0,
        program_id: ctx.program.program_id,
        kind,
        mint,
        creator,
        bonding_curve,
        name: name.trim_matches(char::from(0)).trim().to_string(),
        symbol: symbol.trim_matches(char::from(0)).trim().to_string(),
        metadata_uri: uri.trim().to_string(),
        mayhem_mode,
    })
}

/// Décode le corps d'un `CreateEvent` (création appelée en CPI) :
/// `name, symbol, uri, mint, bonding_curve, user[, creator, ...]`.
/// L'événement ne distingue pas `create` de `create_v2` ; le mode mayhem n'est pas lu.
pub(crate) fn decode_create_event(
    ctx: &DecodeContext<'_>,
    kind: InstructionKind,
    body: &[u8],
) -> Result<TokenLaunchEvent, DecodeError> {
    let mut fields = body;
    let name = read_string(kind, "name", &mut fields)?;
    let symbol = read_string(kind, "symbol", &mut fields)?;
    let uri = read_string(kind, "uri", &mut fields)?;

    let consumed = body.len() - fields.len();
    let key_at = |slot: usize| -> Result<Pubkey, DecodeError> {
        let bytes = fields.get(slot * 32..(slot + 1) * 32).ok_or(DecodeError::Truncated {
            kind,
            needed: consumed + (slot + 1) * 32,
            len: body.len(),
        })?;
        Pubkey::try_from(bytes).map_err(|e| DecodeError::InvalidEventData {
            kind,
            reason: e.to_string(),
        })
    };
    let mint = key_at(0)?;
    let bonding_curve = key_at(1)?;
    let user = key_at(2)?;
    let creator = if fields.len() >= 4 * 32 { key_at(3)? } else { user };

    Ok(TokenLaunchEvent {
        signature: ctx.tx.signature,
        slot: ctx.tx.slot,
        timestamp: ctx.timestamp,
        ordinal: 0,
        program_id: ctx.program.program_id,
        kind,
        mint,
        creator,
        bonding_curve,
        name: name.trim_matches(char::from(0)).trim().to_string(),
        symbol: symbol.trim_matches(char::from(0)).trim().to_string(),
        metadata_uri: uri.trim().to_string(),
        mayhem_mode: false,
    })
}

/// Chaîne Borsh : longueur `u32` LE puis octets UTF-8.
fn read_string(kind: InstructionKind, field: &'static str, data: &mut &[u8]) -> Result<String, DecodeError> {
    let prefix: [u8; 4] = data
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(DecodeError::Truncated {
            kind,
            needed: 4,
            len: data.len(),
        })?;
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_STRING_LEN {
        return Err(DecodeError::InvalidString { kind, field });
    }
    if data.len() < 4 + len {
        return Err(DecodeError::Truncated {
            kind,
            needed: 4 + len,
            len: data.len(),
        });
    }
    String::deserialize(data).map_err(|_| DecodeError::InvalidString { kind, field })
}
