// DANS : src/rpc/resilient_client.rs

use async_trait::async_trait;
use futures_util::StreamExt;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::{pubsub_client::PubsubClient, rpc_client::RpcClient},
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::{RpcTransactionConfig, RpcTransactionLogsConfig, RpcTransactionLogsFilter},
};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, UiLoadedAddresses, UiTransactionEncoding,
    UiTransactionTokenBalance,
};
use std::{future::Future, str::FromStr, sync::Arc, time::Duration};
use tokio::{sync::oneshot, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    BoundedQueue, LedgerClient, LedgerTransaction, LogNotification, LogSubscription, RawInstruction,
    SignatureInfo, SignatureQuery, TokenBalance,
};
use crate::{error::RpcError, monitoring::metrics};

/// Un "wrapper" autour du RpcClient de Solana qui ajoute une logique de
/// ré-essai automatique pour les appels RPC qui échouent à cause d'erreurs réseau temporaires,
/// et qui expose l'abonnement `logsSubscribe` sous forme de [`LogSubscription`].
#[derive(Clone)]
pub struct ResilientRpcClient {
    client: Arc<RpcClient>,
    ws_url: String,
    max_retries: u8,
    delay_ms: u64,
    queue_capacity: usize,
}

impl ResilientRpcClient {
    /// Construit un nouveau client RPC résilient (commitment `confirmed`).
    pub fn new(rpc_url: String, ws_url: String, max_retries: u8, delay_ms: u64) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed())),
            ws_url,
            max_retries,
            delay_ms,
            queue_capacity: 200,
        }
    }

    /// Taille de la file tampon de chaque abonnement (pleine, la plus vieille notification saute).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Méthode "passe-plat" pour accéder à la configuration de commitment du client sous-jacent.
    pub fn commitment(&self) -> CommitmentConfig {
        self.client.commitment()
    }

    /// Détermine si une erreur du client est temporaire et si une nouvelle tentative doit être effectuée.
    fn is_retryable(error: &ClientError) -> bool {
        matches!(
            error.kind(),
            ClientErrorKind::Reqwest(_) | ClientErrorKind::RpcError(_) | ClientErrorKind::Io(_)
        )
    }

    /// Boucle de ré-essai commune. Le délai grandit linéairement (2s, 4s... avec les
    /// valeurs par défaut), ce qui suffit à absorber les 429 des RPC publics.
    async fn with_retry<T, F, Fut>(&self, method: &'static str, mut call: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt: u8 = 0;
        loop {
            match call().await {
                Ok(value) => {
                    metrics::RPC_REQUESTS_TOTAL.with_label_values(&[method, "success"]).inc();
                    return Ok(value);
                }
                Err(e) if Self::is_retryable(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_ms.saturating_mul(attempt as u64);
                    debug!(method, attempt, delay_ms = delay, error = %e, "[RPC] Erreur transitoire, nouvelle tentative.");
                    sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    metrics::RPC_REQUESTS_TOTAL.with_label_values(&[method, "failure"]).inc();
                    return Err(e);
                }
            }
        }
    }
}

fn request_error(method: &'static str) -> impl FnOnce(ClientError) -> RpcError {
    move |e| RpcError::Request {
        method,
        message: e.to_string(),
    }
}

#[async_trait]
impl LedgerClient for ResilientRpcClient {
    async fn ping(&self) -> Result<u64, RpcError> {
        self.with_retry("get_slot", || self.client.get_slot())
            .await
            .map_err(request_error("get_slot"))
    }

    async fn subscribe_logs(&self, address: &Pubkey) -> Result<LogSubscription, RpcError> {
        let queue = Arc::new(BoundedQueue::new(self.queue_capacity));
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(forward_logs(
            self.ws_url.clone(),
            *address,
            queue.clone(),
            cancel.clone(),
            ready_tx,
        ));

        wait_ready(ready_rx, &cancel).await?;
        Ok(LogSubscription::new(queue, cancel))
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        let statuses = self
            .with_retry("get_signatures_for_address", || {
                let config = GetConfirmedSignaturesForAddress2Config {
                    before: query.before,
                    until: query.until,
                    limit: Some(query.limit),
                    commitment: Some(CommitmentConfig::confirmed()),
                };
                self.client.get_signatures_for_address_with_config(address, config)
            })
            .await
            .map_err(request_error("get_signatures_for_address"))?;

        statuses
            .into_iter()
            .map(|status| {
                let signature = Signature::from_str(&status.signature)
                    .map_err(|e| RpcError::InvalidResponse(format!("signature `{}` : {e}", status.signature)))?;
                Ok(SignatureInfo {
                    signature,
                    slot: status.slot,
                    block_time: status.block_time,
                    failed: status.err.is_some(),
                })
            })
            .collect()
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<Option<LedgerTransaction>, RpcError> {
        let result = self
            .with_retry("get_transaction", || {
                let config = RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::Base64),
                    commitment: Some(CommitmentConfig::confirmed()),
                    max_supported_transaction_version: Some(0),
                };
                self.client.get_transaction_with_config(signature, config)
            })
            .await;

        match result {
            Ok(encoded) => to_ledger_transaction(*signature, encoded).map(Some),
            // Le nœud renvoie `null` tant que la transaction n'est pas indexée :
            // la désérialisation échoue, ce n'est pas une panne.
            Err(e) if matches!(e.kind(), ClientErrorKind::SerdeJson(_)) => Ok(None),
            Err(e) => Err(request_error("get_transaction")(e)),
        }
    }
}

/// Attend la fin de la poignée de main. Si l'appelant lâche cette future en
/// cours de route (arrêt pendant une reconnexion), le jeton est annulé et la
/// tâche de transport se désabonne d'elle-même.
async fn wait_ready(
    ready: oneshot::Receiver<Result<(), RpcError>>,
    cancel: &CancellationToken,
) -> Result<(), RpcError> {
    let guard = cancel.clone().drop_guard();
    let outcome = match ready.await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Subscription("la tâche d'abonnement s'est arrêtée".to_string())),
    };
    if outcome.is_ok() {
        let _ = guard.disarm();
    }
    outcome
}

/// Tâche de transport d'un abonnement : lit le flux WebSocket et pousse dans la file.
async fn forward_logs(
    ws_url: String,
    address: Pubkey,
    queue: Arc<BoundedQueue<LogNotification>>,
    cancel: CancellationToken,
    ready: oneshot::Sender<Result<(), RpcError>>,
) {
    let client = match PubsubClient::new(&ws_url).await {
        Ok(client) => client,
        Err(e) => {
            let _ = ready.send(Err(RpcError::Subscription(format!("connexion à {ws_url} : {e}"))));
            return;
        }
    };

    let filter = RpcTransactionLogsFilter::Mentions(vec![address.to_string()]);
    let config = RpcTransactionLogsConfig {
        commitment: Some(CommitmentConfig::confirmed()),
    };
    let (mut stream, unsubscribe) = match client.logs_subscribe(filter, config).await {
        Ok(subscription) => subscription,
        Err(e) => {
            let _ = ready.send(Err(RpcError::Subscription(e.to_string())));
            return;
        }
    };
    if ready.send(Ok(())).is_err() || cancel.is_cancelled() {
        debug!(address = %address, "[WebSocket] Demandeur parti pendant la poignée de main, désabonnement.");
        drop(stream);
        unsubscribe().await;
        queue.close();
        return;
    }
    debug!(address = %address, "[WebSocket] Abonnement logsSubscribe actif.");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = stream.next() => {
                let Some(response) = item else {
                    warn!(address = %address, "[WebSocket] Le flux de logs s'est fermé.");
                    break;
                };
                let Ok(signature) = Signature::from_str(&response.value.signature) else {
                    warn!(raw = %response.value.signature, "[WebSocket] Signature illisible ignorée.");
                    continue;
                };
                let notification = LogNotification {
                    signature,
                    slot: response.context.slot,
                    failed: response.value.err.is_some(),
                    logs: response.value.logs,
                };
                if let Some(dropped) = queue.push(notification) {
                    metrics::SUBSCRIPTION_DROPS.inc();
                    warn!(signature = %dropped.signature, "[WebSocket] File pleine, notification la plus ancienne abandonnée.");
                }
            }
        }
    }

    drop(stream);
    unsubscribe().await;
    queue.close();
}

fn to_ledger_transaction(
    signature: Signature,
    encoded: EncodedConfirmedTransactionWithStatusMeta,
) -> Result<LedgerTransaction, RpcError> {
    let EncodedConfirmedTransactionWithStatusMeta {
        slot,
        transaction,
        block_time,
    } = encoded;

    let meta = transaction
        .meta
        .ok_or_else(|| RpcError::InvalidResponse(format!("{signature} : méta absente")))?;
    let versioned = transaction
        .transaction
        .decode()
        .ok_or_else(|| RpcError::InvalidResponse(format!("{signature} : transaction non décodable")))?;

    let mut account_keys = versioned.message.static_account_keys().to_vec();
    // Transactions v0 : les adresses chargées via LUT suivent les clés statiques.
    if let Some(loaded) = Option::<UiLoadedAddresses>::from(meta.loaded_addresses) {
        for raw in loaded.writable.iter().chain(loaded.readonly.iter()) {
            let key = Pubkey::from_str(raw)
                .map_err(|e| RpcError::InvalidResponse(format!("adresse chargée `{raw}` : {e}")))?;
            account_keys.push(key);
        }
    }

    let instructions = versioned
        .message
        .instructions()
        .iter()
        .filter_map(|ix| {
            let program_id = *account_keys.get(ix.program_id_index as usize)?;
            Some(RawInstruction {
                program_id,
                accounts: ix.accounts.iter().map(|a| *a as usize).collect(),
                data: ix.data.clone(),
            })
        })
        .collect();

    let log_messages: Option<Vec<String>> = meta.log_messages.into();
    let pre_token: Option<Vec<UiTransactionTokenBalance>> = meta.pre_token_balances.into();
    let post_token: Option<Vec<UiTransactionTokenBalance>> = meta.post_token_balances.into();

    Ok(LedgerTransaction {
        signature,
        slot,
        block_time,
        succeeded: meta.err.is_none(),
        account_keys,
        instructions,
        log_messages: log_messages.unwrap_or_default(),
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
        pre_token_balances: token_balances(pre_token.unwrap_or_default()),
        post_token_balances: token_balances(post_token.unwrap_or_default()),
    })
}

fn token_balances(raw: Vec<UiTransactionTokenBalance>) -> Vec<TokenBalance> {
    raw.into_iter()
        .filter_map(|b| {
            Some(TokenBalance {
                account_index: b.account_index as usize,
                amount: b.ui_token_amount.amount.parse().ok()?,
                mint: b.mint,
            })
        })
        .collect()
}
