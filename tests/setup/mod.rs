#![allow(dead_code)]

use pfq_rs::{
    config::{Caplen, CaptureFlags, Config, SlotCount},
    sim::{SimControl, SimProducer},
    Ring,
};

mod util;

pub use util::PacketGenerator;

pub const SLOT_COUNT: u32 = 16;
pub const CAPLEN: u32 = 256;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn build_config(slot_count: u32, caplen: u32, flags: CaptureFlags) -> Config {
    Config::builder()
        .slot_count(SlotCount::new(slot_count).unwrap())
        .caplen(Caplen::new(caplen).unwrap())
        .flags(flags)
        .build()
        .unwrap()
}

/// A ring over a software producer, configured by `config` (small
/// geometry if `None`) and not yet enabled.
pub fn build_ring(config: Option<Config>) -> (Ring<SimControl>, SimProducer) {
    init_logger();

    let config =
        config.unwrap_or_else(|| build_config(SLOT_COUNT, CAPLEN, CaptureFlags::empty()));

    let control = SimControl::new(
        config.slot_count().get() as usize,
        config.caplen().get() as usize,
    )
    .unwrap();

    let producer = control.producer();

    let ring = Ring::with_config(control, &config).unwrap();

    (ring, producer)
}

/// Run `test` against an enabled ring and a producer writing into it.
pub fn run_test<F>(config: Option<Config>, test: F)
where
    F: FnOnce(Ring<SimControl>, SimProducer),
{
    let (mut ring, producer) = build_ring(config);

    ring.enable().unwrap();

    test(ring, producer)
}
