mod support;

use badge_core::link::Side;
use badge_core::loopback::Wire;
use badge_core::wire::{Frame, FrameReceiver, ReceiveStatus};

use support::{Clock, GREETING, badges, catalog, settled, wires};

// Checksum and payload bytes of an encoded GREETING.
const PROTECTED: core::ops::Range<usize> = 3..9;

#[test]
fn every_single_bit_flip_is_rejected() {
    let catalog = catalog();
    let frame = Frame::new(GREETING, &[0x10, 0x20, 0x30, 0x40]).unwrap();

    for index in PROTECTED {
        for bit in 0..8 {
            let wire = Wire::new();
            let mut bytes = frame.encode();
            bytes[index] ^= 1 << bit;
            wire.inject(Side::Right, &bytes);

            let mut port = wire.right_port();
            let mut receiver = FrameReceiver::new();
            assert_eq!(
                receiver.poll(&mut port, &catalog),
                ReceiveStatus::Corrupted,
                "bit {bit} of byte {index} went unnoticed"
            );
        }
    }
}

#[test]
fn intact_frame_passes() {
    let catalog = catalog();
    let frame = Frame::new(GREETING, &[0x10, 0x20, 0x30, 0x40]).unwrap();
    let wire = Wire::new();
    wire.inject(Side::Right, &frame.encode());

    let mut receiver = FrameReceiver::new();
    assert_eq!(
        receiver.poll(&mut wire.right_port(), &catalog),
        ReceiveStatus::Complete(frame)
    );
}

#[test]
fn corrupted_frame_in_a_chain_is_dropped() {
    let wires = wires(2);
    let badges = badges(&wires, 2);
    let mut clock = Clock::start(&badges);
    assert!(clock.run_until(30_000, || settled(&badges, 2)));

    let mut bytes = Frame::new(GREETING, &[1, 2, 3, 4]).unwrap().encode();
    bytes[6] ^= 0x80;
    wires[0].inject(Side::Right, &bytes);

    assert!(clock.run_until(5_000, || badges[1].borrow().stats().corrupted > 0));
    clock.advance(2_000);

    let b = badges[1].borrow();
    assert!(b.listener().messages.is_empty());
    assert_eq!(b.listener().disconnections, 0);
    drop(b);
    assert!(settled(&badges, 2));
}

#[test]
fn line_noise_is_skipped_without_reset() {
    let wires = wires(2);
    let badges = badges(&wires, 2);
    let mut clock = Clock::start(&badges);
    assert!(clock.run_until(30_000, || settled(&badges, 2)));
    let resets_before = badges[1].borrow().stats().resets;

    wires[0].inject(Side::Right, &[0x00, 0x13, 0x37]);

    assert!(clock.run_until(5_000, || badges[1].borrow().stats().resyncs >= 3));
    clock.advance(2_000);

    let b = badges[1].borrow();
    assert_eq!(b.stats().resets, resets_before);
    assert_eq!(b.listener().disconnections, 0);
    drop(b);
    assert!(settled(&badges, 2));
}
