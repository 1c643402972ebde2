// DANS : src/rpc/subscription.rs

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::LogNotification;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// File bornée multi-producteurs / un consommateur. Pleine, elle jette l'élément
/// le plus ancien pour faire place au nouveau.
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Ajoute un élément. Renvoie l'élément évincé s'il y en a un.
    /// Sans effet (renvoie `None`) une fois la file fermée.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.closed {
                return None;
            }
            let evicted = if state.items.len() >= self.capacity {
                state.items.pop_front()
            } else {
                None
            };
            state.items.push_back(item);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Attend le prochain élément. `None` quand la file est fermée et vide.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Les éléments restants peuvent encore être lus.
    pub fn close(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).closed = true;
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flux annulable de notifications de logs pour une adresse.
///
/// Le transport pousse dans une [`BoundedQueue`] ; le moniteur lit avec
/// [`LogSubscription::next`]. `None` signifie que l'abonnement est tombé.
/// Drop annule la tâche de transport.
pub struct LogSubscription {
    queue: Arc<BoundedQueue<LogNotification>>,
    cancel: CancellationToken,
}

impl LogSubscription {
    pub fn new(queue: Arc<BoundedQueue<LogNotification>>, cancel: CancellationToken) -> Self {
        Self { queue, cancel }
    }

    /// Paire producteur / abonnement, sans tâche de transport derrière.
    pub fn channel(capacity: usize) -> (LogPublisher, LogSubscription) {
        let queue = Arc::new(BoundedQueue::new(capacity));
        let cancel = CancellationToken::new();
        let publisher = LogPublisher {
            queue: queue.clone(),
            cancel: cancel.clone(),
        };
        (publisher, LogSubscription::new(queue, cancel))
    }

    pub async fn next(&mut self) -> Option<LogNotification> {
        self.queue.pop().await
    }

    pub fn backlog(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.queue.close();
    }
}

/// Côté producteur d'une [`LogSubscription`].
#[derive(Clone)]
pub struct LogPublisher {
    queue: Arc<BoundedQueue<LogNotification>>,
    cancel: CancellationToken,
}

impl LogPublisher {
    /// Renvoie la notification évincée si la file était pleine.
    pub fn publish(&self, notification: LogNotification) -> Option<LogNotification> {
        self.queue.push(notification)
    }

    /// Simule / signale la perte du transport.
    pub fn close(&self) {
        self.queue.close();
    }

    /// L'abonné a disparu (abonnement lâché ou moniteur arrêté).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
