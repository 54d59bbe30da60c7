//! Result delivery on a single consumer thread.
//!
//! Worker threads never call consumer code. They post [`DeliveryEvent`]s
//! into an unbounded channel; the thread that owns the [`DeliveryReceiver`]
//! (normally the UI thread) runs the callbacks and the [`RepaintHook`] when
//! it dispatches.
//!
//! ```text
//! worker ──► DeliverySink ──► channel ──► DeliveryReceiver::dispatch_*()
//!                                              ├─► callbacks(outcome)
//!                                              └─► RepaintHook::tile_ready(key)
//! ```

mod sink;

pub use sink::{
    delivery_channel, DeliveryEvent, DeliveryReceiver, DeliverySink, NoRepaint, RepaintHook,
    TileCallback, TileDelivery, TileOutcome,
};
