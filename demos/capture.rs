use clap::{App, Arg, ArgMatches};
use crossbeam_channel::{self, Receiver};
use pfq_rs::{
    config::{Caplen, CaptureFlags, Config, SlotCount},
    socket::{PfqSocket, ANY_QUEUE},
    Ring, Stats,
};
use std::{
    convert::TryFrom,
    fmt::Debug,
    str::FromStr,
    time::{Duration, Instant},
};

fn ctrl_channel() -> Result<Receiver<()>, ctrlc::Error> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    Ok(rx)
}

fn parse_arg_with_default<T>(matches: &ArgMatches, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: Debug,
{
    matches
        .value_of(name)
        .map(|s| {
            s.parse()
                .map_err(|e| anyhow::anyhow!("failed to parse {} arg: {:?}", name, e))
        })
        .unwrap_or(Ok(default))
}

fn hex_prefix(data: &[u8], len: usize) -> String {
    data.iter()
        .take(len)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = App::new("capture")
        .about("Capture frames from a device through a PF_Q ring")
        .arg(
            Arg::with_name("dev")
                .help("Device to capture from")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("queue")
                .long("queue")
                .short("q")
                .takes_value(true)
                .help("Hardware queue, all queues if omitted"),
        )
        .arg(
            Arg::with_name("caplen")
                .long("caplen")
                .short("c")
                .takes_value(true)
                .help("Bytes captured per frame"),
        )
        .arg(
            Arg::with_name("slots")
                .long("slots")
                .short("s")
                .takes_value(true)
                .help("Slots per half of the ring"),
        )
        .arg(
            Arg::with_name("tstamp")
                .long("tstamp")
                .short("t")
                .help("Timestamp frames"),
        )
        .arg(
            Arg::with_name("bytes")
                .long("bytes")
                .short("b")
                .takes_value(true)
                .help("Leading bytes of each frame to print"),
        )
        .get_matches();

    let dev = matches
        .value_of("dev")
        .ok_or_else(|| anyhow::anyhow!("no device given"))?;

    let queue = parse_arg_with_default(&matches, "queue", ANY_QUEUE)?;
    let caplen = parse_arg_with_default(&matches, "caplen", 1514u32)?;
    let slots = parse_arg_with_default(&matches, "slots", 131_072u32)?;
    let print_bytes = parse_arg_with_default(&matches, "bytes", 34usize)?;

    let mut flags = CaptureFlags::empty();
    if matches.is_present("tstamp") {
        flags |= CaptureFlags::TIMESTAMP;
    }

    let config = Config::builder()
        .caplen(Caplen::try_from(caplen)?)
        .slot_count(SlotCount::try_from(slots)?)
        .flags(flags)
        .build()?;

    let mut socket = PfqSocket::new()?;
    socket.add_device_by_name(dev, queue)?;

    let mut ring = Ring::with_config(socket, &config)?;
    ring.enable()?;

    println!(
        "capturing on {} (caplen: {}, slots: {}, mapped: {} bytes)",
        dev,
        ring.caplen(),
        ring.slots(),
        ring.mem_size()
    );

    let ctrl_c_events = ctrl_channel()?;

    let mut last_stats = Stats::default();
    let mut last_report = Instant::now();

    loop {
        if ctrl_c_events.try_recv().is_ok() {
            println!("SIGINT received");
            break;
        }

        let batch = ring.acquire(Some(Duration::from_secs(1)))?;

        for slot in batch.committed() {
            let tstamp = slot.timestamp();

            println!(
                "[{}.{:09}] if {} q {} len {} caplen {}: {}",
                tstamp.sec,
                tstamp.nsec,
                slot.if_index(),
                slot.hw_queue(),
                slot.len(),
                slot.caplen(),
                hex_prefix(slot.data(), print_bytes)
            );
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let stats = ring.stats()?;

            println!("stats (recv lost drop): {}", stats - last_stats);

            last_stats = stats;
            last_report = Instant::now();
        }
    }

    ring.disable()?;

    println!("total (recv lost drop): {}", ring.stats()?);

    Ok(())
}
