use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::{BorrowRecord, LiquidationRecord};

/// Records published by the engine after each committed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    Borrowed(BorrowRecord),
    Liquidated(LiquidationRecord),
    RiskParametersUpdated {
        asset: Address,
        collateral_factor: Option<U256>,
        exchange_rate: Option<U256>,
    },
    LiquiditySeeded {
        asset: Address,
        provider: Address,
        amount: U256,
    },
}

/// Fan-out of engine events to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber, dropping closed ones.
    pub fn publish(&self, event: EngineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(EngineEvent::LiquiditySeeded {
            asset: Address::repeat_byte(1),
            provider: Address::repeat_byte(2),
            amount: U256::from(5),
        });

        assert!(matches!(first.recv().await, Some(EngineEvent::LiquiditySeeded { .. })));
        assert!(matches!(second.recv().await, Some(EngineEvent::LiquiditySeeded { .. })));
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let bus = EventBus::new();
        let dropped = bus.subscribe();
        let _kept = bus.subscribe();
        drop(dropped);

        bus.publish(EngineEvent::RiskParametersUpdated {
            asset: Address::repeat_byte(1),
            collateral_factor: None,
            exchange_rate: Some(U256::from(1)),
        });
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_events_serialize_with_kind_tag() {
        let event = EngineEvent::LiquiditySeeded {
            asset: Address::repeat_byte(1),
            provider: Address::repeat_byte(2),
            amount: U256::from(5),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "liquidity_seeded");
    }
}
