use etherparse::SlicedPacket;
use pfq_rs::{
    config::{Caplen, CaptureFlags, Config},
    ring::{Half, RingError, Stats},
    sim::{Delivery, Packet},
};
use std::time::{Duration, Instant};

mod setup;

use setup::{build_config, build_ring, run_test, PacketGenerator, CAPLEN, SLOT_COUNT};

const SHORT_WAIT: Duration = Duration::from_millis(20);

#[test]
fn default_geometry_delivers_committed_slots_in_order() {
    run_test(Some(Config::default()), |mut ring, producer| {
        assert_eq!(ring.caplen(), 1514);
        assert_eq!(ring.slots(), 131_072);
        assert_eq!(ring.slot_size(), 1536);

        let generator = PacketGenerator::default();

        let packets: Vec<Vec<u8>> = (0..10)
            .map(|i| generator.generate_packet(1234, 4321 + i, 32).unwrap())
            .collect();

        for packet in &packets {
            assert_eq!(producer.push(&Packet::new(packet)), Delivery::Delivered);
        }

        let batch = ring.acquire(None).unwrap();

        assert_eq!(batch.len(), 10);
        assert_eq!(batch.committed().count(), 10);

        for (slot, packet) in batch.iter().zip(packets.iter()) {
            assert!(slot.is_committed());
            assert_eq!(slot.len(), packet.len());
            assert_eq!(slot.caplen(), packet.len());
            assert_eq!(slot.data(), &packet[..]);
        }

        let start = Instant::now();
        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();

        assert!(batch.is_empty());
        assert!(start.elapsed() >= SHORT_WAIT);
    });
}

#[test]
fn acquiring_twice_without_production_returns_nothing() {
    run_test(None, |mut ring, producer| {
        producer.push(&Packet::new(b"frame"));

        assert_eq!(ring.acquire(Some(SHORT_WAIT)).unwrap().len(), 1);
        assert_eq!(ring.acquire(Some(Duration::from_millis(0))).unwrap().len(), 0);
        assert_eq!(ring.acquire(Some(Duration::from_millis(0))).unwrap().len(), 0);
    });
}

#[test]
fn each_acquire_swaps_the_active_half() {
    run_test(None, |mut ring, producer| {
        assert_eq!(producer.active_half(), Some(Half::Zero));

        ring.acquire(Some(Duration::from_millis(0))).unwrap();
        assert_eq!(producer.active_half(), Some(Half::One));

        ring.acquire(Some(Duration::from_millis(0))).unwrap();
        assert_eq!(producer.active_half(), Some(Half::Zero));
    });
}

#[test]
fn frames_written_after_a_swap_land_in_the_next_batch() {
    run_test(None, |mut ring, producer| {
        producer.push(&Packet::new(b"first"));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();
        assert_eq!(batch.get(0).unwrap().data(), b"first");

        producer.push(&Packet::new(b"second"));
        producer.push(&Packet::new(b"third"));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();
        let data: Vec<&[u8]> = batch.iter().map(|s| s.data()).collect();

        assert_eq!(data, vec![&b"second"[..], &b"third"[..]]);

        // The first half is reused, its stale commit flags cleared.
        producer.push(&Packet::new(b"fourth"));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.committed().count(), 1);
        assert_eq!(batch.get(0).unwrap().data(), b"fourth");
    });
}

#[test]
fn reused_half_has_its_commit_flags_cleared() {
    run_test(None, |mut ring, producer| {
        producer.push(&Packet::new(b"a"));
        producer.push(&Packet::new(b"b"));

        assert_eq!(ring.acquire(Some(SHORT_WAIT)).unwrap().len(), 2);

        producer.push(&Packet::new(b"c"));

        assert_eq!(ring.acquire(Some(SHORT_WAIT)).unwrap().len(), 1);

        // Claim the two old slots again without writing them.
        assert_eq!(producer.active_half(), Some(Half::Zero));
        assert!(producer.force_valid_len(2));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.committed().count(), 0);
        assert!(batch.iter().all(|slot| !slot.is_committed() && slot.caplen() == 0));
    });
}

#[test]
fn out_of_range_length_is_clamped_to_slot_count() {
    run_test(None, |mut ring, producer| {
        for _ in 0..3 {
            producer.push(&Packet::new(b"frame"));
        }

        assert!(producer.force_valid_len(SLOT_COUNT as u64 * 4));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();

        assert_eq!(batch.len(), SLOT_COUNT as usize);
        assert_eq!(batch.committed().count(), 3);

        assert_eq!(ring.clamped_batches(), 1);

        assert_eq!(ring.acquire(Some(Duration::from_millis(0))).unwrap().len(), 0);
        assert_eq!(ring.clamped_batches(), 1);
    });
}

#[test]
fn full_half_loses_frames_until_the_next_swap() {
    run_test(None, |mut ring, producer| {
        for _ in 0..SLOT_COUNT {
            assert_eq!(producer.push(&Packet::new(b"frame")), Delivery::Delivered);
        }

        assert!(!producer.is_paused());
        assert_eq!(producer.push(&Packet::new(b"frame")), Delivery::Lost);
        assert!(producer.is_paused());

        assert_eq!(ring.stats().unwrap(), Stats::new(SLOT_COUNT as u64, 1, 0));

        let batch = ring.acquire(None).unwrap();
        assert_eq!(batch.len(), SLOT_COUNT as usize);

        assert!(!producer.is_paused());
        assert_eq!(producer.push(&Packet::new(b"frame")), Delivery::Delivered);

        assert_eq!(ring.acquire(Some(SHORT_WAIT)).unwrap().len(), 1);
    });
}

#[test]
fn uncommitted_tail_is_visible_but_not_committed() {
    run_test(None, |mut ring, producer| {
        producer.push(&Packet::new(b"a"));
        producer.push(&Packet::new(b"b"));

        let mut in_flight = producer.reserve().unwrap();
        in_flight.write(&Packet::new(b"c"));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.committed().count(), 2);
        assert!(!batch.get(2).unwrap().is_committed());

        in_flight.commit();

        let last = batch.get(2).unwrap();

        assert!(last.wait_committed(1));
        assert_eq!(last.data(), b"c");
    });
}

#[test]
fn recv_copies_the_batch_out_of_the_ring() {
    run_test(None, |mut ring, producer| {
        let mut buf = vec![0u8; ring.layout().half_size()];

        producer.push(&Packet::new(b"kept"));
        producer.push(&Packet::new(b"also kept"));

        let copy = ring.recv(&mut buf, Some(SHORT_WAIT)).unwrap();
        assert_eq!(copy.len(), 2);

        // Reusing the half the copy came from leaves the copy intact.
        producer.push(&Packet::new(b"new"));
        ring.acquire(Some(SHORT_WAIT)).unwrap();
        producer.push(&Packet::new(b"newer"));
        ring.acquire(Some(SHORT_WAIT)).unwrap();

        let data: Vec<&[u8]> = copy.committed().map(|s| s.data()).collect();

        assert_eq!(data, vec![&b"kept"[..], &b"also kept"[..]]);
    });
}

#[test]
fn recv_into_short_buffer_fails_without_consuming() {
    run_test(None, |mut ring, producer| {
        let half_size = ring.layout().half_size();
        let mut buf = vec![0u8; half_size - 1];

        producer.push(&Packet::new(b"frame"));

        match ring.recv(&mut buf, Some(SHORT_WAIT)) {
            Err(RingError::BufferTooShort { needed, got }) => {
                assert_eq!(needed, half_size);
                assert_eq!(got, half_size - 1);
            }
            other => panic!("expected BufferTooShort, got {:?}", other.map(|b| b.len())),
        }

        assert_eq!(ring.acquire(Some(SHORT_WAIT)).unwrap().len(), 1);
    });
}

#[test]
fn poll_reports_pending_data() {
    run_test(None, |ring, producer| {
        let start = Instant::now();

        assert!(!ring.poll(Some(SHORT_WAIT)).unwrap());
        assert!(start.elapsed() >= SHORT_WAIT);

        producer.push(&Packet::new(b"frame"));

        assert!(ring.poll(Some(Duration::from_millis(0))).unwrap());
        assert!(ring.poll(None).unwrap());
    });
}

#[test]
fn enable_and_disable_are_not_idempotent() {
    run_test(None, |mut ring, _producer| {
        assert!(ring.is_enabled());
        assert!(matches!(ring.enable(), Err(RingError::AlreadyEnabled)));

        ring.disable().unwrap();

        assert!(!ring.is_enabled());
        assert_eq!(ring.mem_size(), 0);
        assert!(matches!(ring.disable(), Err(RingError::NotEnabled)));

        ring.enable().unwrap();
        assert_eq!(ring.mem_size(), ring.layout().total_size());
    });
}

#[test]
fn operations_on_a_disabled_ring_fail() {
    let (mut ring, producer) = build_ring(None);

    assert!(matches!(ring.acquire(None), Err(RingError::NotEnabled)));
    assert!(matches!(ring.poll(None), Err(RingError::NotEnabled)));

    let mut buf = vec![0u8; ring.layout().half_size()];
    assert!(matches!(ring.recv(&mut buf, None), Err(RingError::NotEnabled)));

    assert_eq!(producer.push(&Packet::new(b"frame")), Delivery::Dropped);
    assert_eq!(producer.active_half(), None);
    assert_eq!(ring.stats().unwrap(), Stats::new(0, 0, 1));
}

#[test]
fn geometry_is_fixed_while_enabled() {
    run_test(None, |mut ring, _producer| {
        let caplen = Caplen::new(128).unwrap();

        assert!(matches!(
            ring.set_caplen(caplen),
            Err(RingError::AlreadyEnabled)
        ));
        assert_eq!(ring.caplen(), CAPLEN as usize);

        ring.disable().unwrap();
        ring.set_caplen(caplen).unwrap();

        assert_eq!(ring.caplen(), 128);
        assert_eq!(ring.slot_size(), 144);

        ring.enable().unwrap();
        assert_eq!(ring.mem_size(), 16 + 2 * SLOT_COUNT as usize * 144);
    });
}

#[test]
fn stats_are_stable_when_idle_and_grow_with_traffic() {
    run_test(None, |mut ring, producer| {
        let before = ring.stats().unwrap();
        let again = ring.stats().unwrap();

        assert_eq!(before, again);
        assert_eq!(again - before, Stats::default());

        for _ in 0..5 {
            producer.push(&Packet::new(b"frame"));
        }

        let after = ring.stats().unwrap();

        assert_eq!(after - before, Stats::new(5, 0, 0));

        ring.acquire(Some(SHORT_WAIT)).unwrap();

        let later = ring.stats().unwrap();

        assert!(later.received >= after.received);
        assert!(later.lost >= after.lost);
        assert!(later.dropped >= after.dropped);
    });
}

#[test]
fn frames_longer_than_caplen_are_truncated() {
    let config = build_config(SLOT_COUNT, 64, CaptureFlags::empty());

    run_test(Some(config), |mut ring, producer| {
        let packet = PacketGenerator::default()
            .generate_packet(1234, 4321, 100)
            .unwrap();

        producer.push(&Packet::new(&packet));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();
        let slot = batch.get(0).unwrap();

        assert_eq!(slot.len(), packet.len());
        assert_eq!(slot.caplen(), 64);
        assert_eq!(slot.data(), &packet[..64]);
    });
}

#[test]
fn captured_frames_parse_as_sent() {
    run_test(None, |mut ring, producer| {
        let generator = PacketGenerator::default();

        let sent = generator.generate_packet(1234, 4321, 64).unwrap();
        let reply = generator.into_swapped().generate_packet(4321, 1234, 16).unwrap();

        producer.push(&Packet::with_source(&sent, 3, 1));
        producer.push(&Packet::with_source(&reply, 4, 0));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();

        let first = batch.get(0).unwrap();
        assert_eq!((first.if_index(), first.hw_queue()), (3, 1));
        assert_eq!(SlicedPacket::from_ethernet(first.data()).unwrap().payload.len(), 64);

        let second = batch.get(1).unwrap();
        assert_eq!((second.if_index(), second.hw_queue()), (4, 0));
        assert_eq!(SlicedPacket::from_ethernet(second.data()).unwrap().payload.len(), 16);
    });
}

#[test]
fn timestamps_are_set_only_when_requested() {
    let stamped = build_config(SLOT_COUNT, CAPLEN, CaptureFlags::TIMESTAMP);

    run_test(Some(stamped), |mut ring, producer| {
        producer.push(&Packet::new(b"frame"));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();
        assert!(!batch.get(0).unwrap().timestamp().is_zero());
    });

    run_test(None, |mut ring, producer| {
        producer.push(&Packet::new(b"frame"));

        let batch = ring.acquire(Some(SHORT_WAIT)).unwrap();
        assert!(batch.get(0).unwrap().timestamp().is_zero());
    });
}
