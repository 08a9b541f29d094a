use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use model::ProductId;

/// Product ids with a crawl currently running.
#[derive(Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<ProductId>>>,
}

impl InFlight {
    /// `None` when a crawl for `id` is already running.
    pub fn try_acquire(&self, id: ProductId) -> Option<FlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.insert(id).then(|| FlightGuard {
            ids: self.ids.clone(),
            id,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the product id when dropped.
pub struct FlightGuard {
    ids: Arc<Mutex<HashSet<ProductId>>>,
    id: ProductId,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
