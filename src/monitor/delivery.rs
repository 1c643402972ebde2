// DANS : src/monitor/delivery.rs

use async_trait::async_trait;
use futures_util::FutureExt;
use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc};

use crate::{error::CallbackError, events::DomainEvent};

/// Le consommateur des événements. Une erreur (ou une panique) est journalisée
/// par le moniteur, qui passe à l'élément suivant.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event(&self, event: DomainEvent) -> anyhow::Result<()>;
}

/// Adapte une closure asynchrone en [`EventSink`].
pub struct FnSink<F>(F);

impl<F, Fut> FnSink<F>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(f: F) -> Arc<dyn EventSink> {
        Arc::new(FnSink(f))
    }
}

#[async_trait]
impl<F, Fut> EventSink for FnSink<F>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_event(&self, event: DomainEvent) -> anyhow::Result<()> {
        (self.0)(event).await
    }
}

/// Appelle le sink en capturant ses paniques.
pub(crate) async fn dispatch(sink: &dyn EventSink, event: DomainEvent) -> Result<(), CallbackError> {
    match AssertUnwindSafe(sink.on_event(event)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CallbackError::Failed(e)),
        Err(panic) => Err(CallbackError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panique sans message".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decoders::InstructionKind,
        events::{ClaimType, EventOrigin, FeeClaimEvent},
    };
    use solana_sdk::{pubkey::Pubkey, signature::Signature};

    fn event() -> DomainEvent {
        DomainEvent::FeeClaim(FeeClaimEvent {
            signature: Signature::new_unique(),
            slot: 0,
            timestamp: 0,
            ordinal: 0,
            origin: EventOrigin::Instruction(0),
            program_id: Pubkey::new_unique(),
            kind: InstructionKind::ClaimCashback,
            claim_type: ClaimType::ClaimCashback,
            claimant: Pubkey::new_unique(),
            token_mint: None,
            amount_lamports: 1,
            is_cashback: true,
            label: String::new(),
        })
    }

    #[tokio::test]
    async fn errors_and_panics_are_contained() {
        let ok = FnSink::new(|_| async { Ok::<(), anyhow::Error>(()) });
        assert!(dispatch(ok.as_ref(), event()).await.is_ok());

        let failing = FnSink::new(|_| async { Err::<(), _>(anyhow::anyhow!("webhook indisponible")) });
        assert!(matches!(
            dispatch(failing.as_ref(), event()).await,
            Err(CallbackError::Failed(_))
        ));

        let panicking = FnSink::new(|_| async {
            if true {
                panic!("boum");
            }
            Ok::<(), anyhow::Error>(())
        });
        match dispatch(panicking.as_ref(), event()).await {
            Err(CallbackError::Panicked(message)) => assert_eq!(message, "boum"),
            other => panic!("panique attendue, obtenu {other:?}"),
        }
    }
}
