#![no_main]

use libfuzzer_sys::fuzz_target;
use smallpool::SmallObjAllocator;
use std::ptr::NonNull;

/// Fuzz target that interprets a byte slice as a sequence of allocator
/// operations.
///
/// Each operation is encoded as:
///   byte 0: opcode (0=allocate, 1=deallocate)
///   byte 1-2: size (little-endian u16, folded into 1..=96 so both the
///             pool path and the large path are exercised)
///   byte 3: slot index (which tracked pointer to operate on)
///
/// We track up to 64 live pointers. Every live block carries a fill
/// pattern that is verified before the block is returned, so a
/// clobbered block (overlapping handouts, a free-list link written into
/// live memory) trips an assertion.
const MAX_SLOTS: usize = 64;

fuzz_target!(|data: &[u8]| {
    let mut pool = SmallObjAllocator::new(1024, 64);
    let mut slots: [Option<(NonNull<u8>, usize)>; MAX_SLOTS] = [None; MAX_SLOTS];

    let mut i = 0;
    while i + 4 <= data.len() {
        let opcode = data[i] & 0x01;
        let size = (u16::from_le_bytes([data[i + 1], data[i + 2]]) as usize % 96) + 1;
        let slot = (data[i + 3] as usize) % MAX_SLOTS;
        i += 4;

        match opcode {
            0 => {
                if let Some((ptr, old_size)) = slots[slot].take() {
                    check_pattern(ptr, old_size, slot);
                    unsafe { pool.deallocate(ptr, old_size) };
                }
                if let Some(ptr) = pool.allocate(size) {
                    write_pattern(ptr, size, slot);
                    slots[slot] = Some((ptr, size));
                }
            }
            1 => {
                if let Some((ptr, old_size)) = slots[slot].take() {
                    check_pattern(ptr, old_size, slot);
                    unsafe { pool.deallocate(ptr, old_size) };
                }
            }
            _ => unreachable!(),
        }
    }

    // Cleanup
    for entry in slots.iter_mut() {
        if let Some((ptr, size)) = entry.take() {
            unsafe { pool.deallocate(ptr, size) };
        }
    }
});

fn write_pattern(ptr: NonNull<u8>, size: usize, slot: usize) {
    let fill = 0xA0u8.wrapping_add(slot as u8);
    unsafe { ptr.as_ptr().write_bytes(fill, size) };
}

fn check_pattern(ptr: NonNull<u8>, size: usize, slot: usize) {
    let fill = 0xA0u8.wrapping_add(slot as u8);
    for offset in 0..size {
        assert_eq!(
            unsafe { ptr.as_ptr().add(offset).read() },
            fill,
            "live block clobbered at offset {}",
            offset
        );
    }
}
