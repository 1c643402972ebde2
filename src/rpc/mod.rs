// DANS : src/rpc/mod.rs

//! Façade vers le nœud RPC Solana.
//!
//! Le moniteur ne parle qu'au trait [`LedgerClient`]. L'implémentation réelle
//! ([`ResilientRpcClient`]) enveloppe le `RpcClient` non-bloquant et le
//! `PubsubClient` ; les tests fournissent la leur, en mémoire.

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Signature};

use crate::error::RpcError;

pub mod resilient_client;
pub mod subscription;

pub use resilient_client::ResilientRpcClient;
pub use subscription::{BoundedQueue, LogPublisher, LogSubscription};

/// Ordre dans lequel `get_signatures_for_address` renvoie ses résultats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOrder {
    NewestFirst,
    OldestFirst,
}

/// Une notification `logsSubscribe` brute.
#[derive(Debug, Clone)]
pub struct LogNotification {
    pub signature: Signature,
    pub slot: u64,
    pub logs: Vec<String>,
    /// La transaction a échoué on-chain (`err` non nul).
    pub failed: bool,
}

/// Une entrée de `getSignaturesForAddress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
}

/// Fenêtre demandée à `getSignaturesForAddress`. `before` et `until` sont exclusifs.
#[derive(Debug, Clone, Default)]
pub struct SignatureQuery {
    pub before: Option<Signature>,
    pub until: Option<Signature>,
    pub limit: usize,
}

/// Instruction de premier niveau, avec ses comptes résolus en index globaux.
#[derive(Debug, Clone)]
pub struct RawInstruction {
    pub program_id: Pubkey,
    /// Index dans `LedgerTransaction::account_keys`.
    pub accounts: Vec<usize>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    /// Montant brut (unités de base du mint).
    pub amount: u64,
}

/// Transaction complète telle que le décodeur la consomme.
#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// `meta.err` est nul. Une instruction présente dans une transaction échouée ne compte pas.
    pub succeeded: bool,
    /// Clés statiques suivies des adresses chargées (writable puis readonly).
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<RawInstruction>,
    pub log_messages: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

impl LedgerTransaction {
    /// Index global du compte à la position `position` de l'instruction.
    pub fn account_index(&self, instruction: &RawInstruction, position: usize) -> Option<usize> {
        instruction
            .accounts
            .get(position)
            .copied()
            .filter(|index| *index < self.account_keys.len())
    }

    pub fn key(&self, index: usize) -> Option<Pubkey> {
        self.account_keys.get(index).copied()
    }

    /// Lamports sortis du compte pendant la transaction (0 si le solde a augmenté).
    pub fn lamport_outflow(&self, index: usize) -> Option<u64> {
        let pre = self.pre_balances.get(index)?;
        let post = self.post_balances.get(index)?;
        Some(pre.saturating_sub(*post))
    }

    /// Unités de token sorties du compte. Un compte absent des balances "post"
    /// a été fermé : tout son solde est sorti.
    pub fn token_outflow(&self, index: usize) -> Option<u64> {
        let pre = self
            .pre_token_balances
            .iter()
            .find(|b| b.account_index == index)?
            .amount;
        let post = self
            .post_token_balances
            .iter()
            .find(|b| b.account_index == index)
            .map(|b| b.amount)
            .unwrap_or(0);
        Some(pre.saturating_sub(post))
    }
}

/// Capacités minimales exigées du nœud RPC.
///
/// Toutes les méthodes peuvent échouer avec un [`RpcError`] transitoire ;
/// les implémentations doivent tolérer des appels concurrents.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Ordre des résultats de [`LedgerClient::get_signatures_for_address`].
    fn signature_order(&self) -> SignatureOrder {
        SignatureOrder::NewestFirst
    }

    /// Poignée de main : renvoie le slot courant.
    async fn ping(&self) -> Result<u64, RpcError>;

    async fn subscribe_logs(&self, address: &Pubkey) -> Result<LogSubscription, RpcError>;

    /// Au plus `query.limit` signatures, toujours les plus récentes de la
    /// fenêtre ; [`LedgerClient::signature_order`] ne décrit que l'ordre de retour.
    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, RpcError>;

    /// `Ok(None)` si le nœud ne connaît pas (encore) la transaction.
    async fn get_transaction(&self, signature: &Signature) -> Result<Option<LedgerTransaction>, RpcError>;
}
