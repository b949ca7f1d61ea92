mod fsm;
mod manager;
mod sync;
mod tempo_map;

pub use fsm::{PlayingMode, StateChange};
pub use manager::{TransportManager, TransportTick};
pub use sync::{ExternalUpdate, PositionSource, SyncLossDetector, SyncMode, DEFAULT_SYNC_LOSS_CHUNKS};
pub use tempo_map::{TimeSignature, BBT};
