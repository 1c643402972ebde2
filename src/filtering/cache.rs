// DANS : src/filtering/cache.rs

use solana_sdk::signature::Signature;
use std::collections::{HashSet, VecDeque};

/// Ensemble borné des signatures déjà livrées.
///
/// L'éviction suit l'ordre d'insertion (FIFO), pas l'ordre d'accès : `seen`
/// ne rafraîchit rien. Possédé par une seule tâche, donc sans verrou.
pub struct SignatureCache {
    set: HashSet<Signature>,
    order: VecDeque<Signature>,
    capacity: usize,
}

impl SignatureCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            set: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn seen(&self, signature: &Signature) -> bool {
        self.set.contains(signature)
    }

    /// Insère la signature ; évince la plus ancienne au-delà de la capacité.
    /// Renvoie `false` si elle était déjà présente.
    pub fn remember(&mut self, signature: Signature) -> bool {
        if !self.set.insert(signature) {
            return false;
        }
        self.order.push_back(signature);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
