// 11.0: every state change produces an event. used for audit trails and state
// reconstruction. events raised inside a transaction stay pending until it commits
// and are dropped if it reverts.

use crate::fixed_point::{FixedPoint, SignedFixedPoint};
use crate::types::{Address, AmmId, AssetId, BlockInfo, Dir, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub block: u64,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, block: BlockInfo, payload: EventPayload) -> Self {
        Self {
            id,
            block: block.number,
            timestamp: block.timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionChanged(PositionChangedEvent),
    MarginChanged(MarginChangedEvent),
    PositionLiquidated(PositionLiquidatedEvent),
    PositionSettled(PositionSettledEvent),
    RestrictionModeEntered(RestrictionModeEnteredEvent),

    // Market events
    FundingPaid(FundingPaidEvent),
    SwapInput(SwapEvent),
    SwapOutput(SwapEvent),
    ReserveSnapshotted(ReserveSnapshottedEvent),
    Shutdown(ShutdownEvent),

    // Insurance fund events
    Withdrawn(WithdrawnEvent),
    AmmAdded(AmmRegistrationEvent),
    AmmRemoved(AmmRegistrationEvent),
    TokenMinted(TokenMintedEvent),
    TokenSwapped(TokenSwappedEvent),
    BadDebtRealized(BadDebtEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionChangedEvent {
    pub amm: AmmId,
    pub trader: Address,
    pub margin: FixedPoint,
    pub exchanged_quote: FixedPoint,
    pub exchanged_position_size: SignedFixedPoint,
    pub fee: FixedPoint,
    pub position_size_after: SignedFixedPoint,
    pub realized_pnl: SignedFixedPoint,
    pub unrealized_pnl_after: SignedFixedPoint,
    pub bad_debt: FixedPoint,
    pub liquidation_penalty: FixedPoint,
    pub spot_price: FixedPoint,
    pub funding_payment: SignedFixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginChangedEvent {
    pub amm: AmmId,
    pub trader: Address,
    pub amount: SignedFixedPoint,
    pub funding_payment: SignedFixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub amm: AmmId,
    pub trader: Address,
    pub position_notional: FixedPoint,
    pub position_size: FixedPoint,
    pub fee_to_liquidator: FixedPoint,
    pub fee_to_insurance_fund: FixedPoint,
    pub liquidator: Address,
    pub bad_debt: FixedPoint,
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSettledEvent {
    pub amm: AmmId,
    pub trader: Address,
    pub value_transferred: FixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictionModeEnteredEvent {
    pub amm: AmmId,
    pub block_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingPaidEvent {
    pub amm: AmmId,
    pub premium_fraction: SignedFixedPoint,
    pub funding_rate: SignedFixedPoint,
    pub cumulative_premium_fraction: SignedFixedPoint,
    // positive: the clearing house paid the fund
    pub paid_to_insurance_fund: SignedFixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapEvent {
    pub amm: AmmId,
    pub dir: Dir,
    pub quote_amount: FixedPoint,
    pub base_amount: FixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveSnapshottedEvent {
    pub amm: AmmId,
    pub quote_asset_reserve: FixedPoint,
    pub base_asset_reserve: FixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownEvent {
    pub amm: AmmId,
    pub settlement_price: FixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawnEvent {
    pub asset: AssetId,
    pub to: Address,
    pub amount: FixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmmRegistrationEvent {
    pub amm: AmmId,
    pub asset: AssetId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMintedEvent {
    pub asset: AssetId,
    pub amount: FixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSwappedEvent {
    pub from: AssetId,
    pub to: AssetId,
    pub sold: FixedPoint,
    pub received: FixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadDebtEvent {
    pub amm: AmmId,
    pub asset: AssetId,
    pub amount: FixedPoint,
}

pub trait EventEmitter {
    fn emit(&mut self, block: BlockInfo, payload: EventPayload);
}

#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    pending: Vec<Event>,
    next_id: u64,
    max_events: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            pending: Vec::new(),
            next_id: 1,
            max_events,
        }
    }

    /// Committed events, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    pub fn commit(&mut self) {
        self.events.append(&mut self.pending);
        if self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(0..drain_count);
        }
    }

    pub fn rollback(&mut self) {
        self.next_id -= self.pending.len() as u64;
        self.pending.clear();
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventEmitter for EventLog {
    fn emit(&mut self, block: BlockInfo, payload: EventPayload) {
        let event = Event::new(EventId(self.next_id), block, payload);
        self.next_id += 1;
        tracing::debug!(id = event.id.0, block = event.block, payload = ?event.payload, "event");
        self.pending.push(event);
    }
}
