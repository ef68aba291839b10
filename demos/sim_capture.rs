use clap::{App, Arg, ArgMatches};
use crossbeam_channel::{self, Receiver};
use pfq_rs::{
    config::{Caplen, CaptureFlags, Config, SlotCount},
    sim::{Delivery, Packet, SimControl},
    Ring,
};
use std::{
    convert::TryFrom,
    fmt::Debug,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
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

fn generate_random_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|_| rand::random::<u8>()).collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = App::new("sim_capture")
        .about("Drain a ring filled by a software producer thread")
        .arg(
            Arg::with_name("frames")
                .long("frames")
                .short("n")
                .takes_value(true)
                .help("Frames to produce, unbounded if omitted"),
        )
        .arg(
            Arg::with_name("frame_size")
                .long("frame-size")
                .short("f")
                .takes_value(true)
                .help("Size of each produced frame"),
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
            Arg::with_name("timeout_ms")
                .long("timeout")
                .short("t")
                .takes_value(true)
                .help("Milliseconds to wait for data on each acquire"),
        )
        .get_matches();

    let frames = parse_arg_with_default(&matches, "frames", u64::MAX)?;
    let frame_size = parse_arg_with_default(&matches, "frame_size", 64usize)?;
    let caplen = parse_arg_with_default(&matches, "caplen", 128u32)?;
    let slots = parse_arg_with_default(&matches, "slots", 4096u32)?;
    let timeout_ms = parse_arg_with_default(&matches, "timeout_ms", 10u64)?;

    let config = Config::builder()
        .caplen(Caplen::try_from(caplen)?)
        .slot_count(SlotCount::try_from(slots)?)
        .flags(CaptureFlags::TIMESTAMP)
        .build()?;

    let control = SimControl::new(slots as usize, caplen as usize)?;
    let producer = control.producer();

    let mut ring = Ring::with_config(control, &config)?;
    ring.enable()?;

    let ctrl_c_events = ctrl_channel()?;

    let stop = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);

    let sender = {
        let stop = Arc::clone(&stop);

        thread::spawn(move || {
            let frame = generate_random_bytes(frame_size);
            let packet = Packet::new(&frame);

            let mut pushed = 0u64;
            let mut lost = 0u64;

            while pushed < frames && !stop.load(Ordering::Relaxed) {
                if producer.push(&packet) == Delivery::Lost {
                    lost += 1;
                }
                pushed += 1;
            }

            let _ = done_tx.send(());

            (pushed, lost)
        })
    };

    let timeout = Some(Duration::from_millis(timeout_ms));

    let start = Instant::now();
    let mut last_report = Instant::now();
    let mut received = 0u64;
    let mut bytes = 0u64;
    let mut producer_done = false;

    loop {
        if ctrl_c_events.try_recv().is_ok() {
            println!("SIGINT received");
            stop.store(true, Ordering::Relaxed);
        }

        let batch = ring.acquire(timeout)?;

        for slot in batch.iter() {
            if !slot.wait_committed(10_000) {
                log::warn!("slot still in flight, skipping rest of batch");
                break;
            }

            received += 1;
            bytes += slot.caplen() as u64;
        }

        if producer_done {
            break;
        }

        if done_rx.try_recv().is_ok() {
            producer_done = true;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let secs = start.elapsed().as_secs_f64();

            println!(
                "{} frames ({:.0} frames/s, {:.1} MB/s), stats (recv lost drop): {}",
                received,
                received as f64 / secs,
                bytes as f64 / secs / 1e6,
                ring.stats()?
            );

            last_report = Instant::now();
        }
    }

    let (pushed, lost) = sender
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;

    let elapsed = start.elapsed();

    ring.disable()?;

    println!(
        "pushed {} frames in {:?}, received {}, lost {} ({:.2}%), clamped batches: {}",
        pushed,
        elapsed,
        received,
        lost,
        100.0 * lost as f64 / pushed.max(1) as f64,
        ring.clamped_batches()
    );

    Ok(())
}
