//! Position-slot base/footer-bit tables for LZX match distances.
//!
//! LZX encodes a match distance as a "position slot" (a symbol class) plus a number of extra
//! raw (or aligned-tree) bits. The table is generated from the standard LZX formula rather than
//! hard-coded, since it is fully determined by a simple recurrence:
//!
//! `footer_bits[slot] = 0` for `slot < 4`, else `min((slot - 2) / 2, 17)`
//! `base[0] = 0`, `base[slot] = base[slot - 1] + 2^footer_bits[slot - 1]`

/// One entry of the position-slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSlot {
    /// The base distance value for this slot.
    pub base: u32,
    /// The number of extra bits read (raw, or via the aligned-offset tree for the low 3 bits)
    /// to recover the exact distance within this slot's range.
    pub footer_bits: u8,
}

/// Builds the first `count` entries of the position-slot table.
pub fn build_position_slots(count: usize) -> Vec<PositionSlot> {
    let mut slots = Vec::with_capacity(count);
    let mut base: u32 = 0;
    for slot in 0..count {
        let footer_bits = footer_bits_for_slot(slot);
        slots.push(PositionSlot { base, footer_bits });
        base += 1u32 << footer_bits;
    }
    slots
}

fn footer_bits_for_slot(slot: usize) -> u8 {
    if slot < 4 {
        0
    } else {
        (((slot - 2) / 2) as u8).min(17)
    }
}

/// The number of main-tree position slots for a given LZXC window size. Window sizes are
/// restricted to the set LZXC allows (32 KiB .. 2 MiB); this covers exactly that set.
pub fn num_position_slots_for_window(window_size: u32) -> Option<usize> {
    Some(match window_size {
        0x8000 => 30,
        0x10000 => 32,
        0x20000 => 34,
        0x40000 => 36,
        0x80000 => 38,
        0x100000 => 42,
        0x200000 => 50,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_base_values() {
        let slots = build_position_slots(12);
        let bases: Vec<u32> = slots.iter().map(|s| s.base).collect();
        assert_eq!(bases, vec![0, 1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 48]);
        let footer: Vec<u8> = slots.iter().map(|s| s.footer_bits).collect();
        assert_eq!(footer, vec![0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn all_window_sizes_have_slot_counts() {
        for ws in [0x8000u32, 0x10000, 0x20000, 0x40000, 0x80000, 0x100000, 0x200000] {
            assert!(num_position_slots_for_window(ws).is_some());
        }
        assert_eq!(num_position_slots_for_window(0x4000), None);
    }
}
