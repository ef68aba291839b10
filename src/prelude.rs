//! Re-exports the key types.

pub use super::{
    config::{Caplen, CaptureFlags, Config, ConfigBuilder, SlotCount},
    ring::{Batch, ControlPlane, Ring, RingError, Slot, Stats, Timestamp},
    sim::{Delivery, Packet, SimControl, SimProducer},
    socket::{PfqSocket, ANY_DEVICE, ANY_QUEUE},
};
