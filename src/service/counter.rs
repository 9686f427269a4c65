use std::sync::Arc;

use crate::storage::DocumentStore;

use super::error::Result;

/// Name of the stored counter that numbers note tickets
pub const TICKET_SEQUENCE: &str = "ticketNums";
pub const FIRST_TICKET: i64 = 500;

/// Monotonic ticket numbers, shared by every process using the same store.
///
/// Numbers are never handed out twice, even when the note they were issued
/// for is deleted or its write fails.
#[derive(Clone)]
pub struct TicketCounter {
    store: Arc<dyn DocumentStore>,
}

impl TicketCounter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn next(&self) -> Result<i64> {
        Ok(self
            .store
            .next_sequence(TICKET_SEQUENCE, FIRST_TICKET)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LoroStore;

    #[tokio::test]
    async fn test_tickets_start_at_500() {
        let counter = TicketCounter::new(Arc::new(LoroStore::in_memory()));
        assert_eq!(counter.next().await.unwrap(), 500);
        assert_eq!(counter.next().await.unwrap(), 501);
    }

    #[tokio::test]
    async fn test_counters_over_one_store_share_the_sequence() {
        let store: Arc<dyn DocumentStore> = Arc::new(LoroStore::in_memory());
        let a = TicketCounter::new(store.clone());
        let b = TicketCounter::new(store);

        assert_eq!(a.next().await.unwrap(), 500);
        assert_eq!(b.next().await.unwrap(), 501);
        assert_eq!(a.next().await.unwrap(), 502);
    }
}
