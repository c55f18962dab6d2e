//! Internal/external ID remapping for fighters and stages.
//!
//! The engine indexes fighters and stages by their position in the
//! project collections (internal IDs). Menus and the character select
//! screen use a separate "external" numbering that was fixed by the
//! vanilla roster order. These tables convert between the two.

/// Number of fighter slots in the vanilla roster, specials included.
pub const VANILLA_FIGHTER_COUNT: usize = 33;

/// Number of base (selectable or partner) slots before the specials.
pub const VANILLA_BASE_COUNT: usize = 27;

/// Trailing internal slots reserved for built-in special fighters.
pub const SPECIAL_SLOT_COUNT: usize = 6;

/// First external ID handed to fighters added after the vanilla roster.
pub const FIRST_ADDED_EXTERNAL: usize = VANILLA_FIGHTER_COUNT;

/// Marks a vanilla base slot that is resolved by a named exception
/// rather than the permutation table.
const NO_EXTERNAL: u8 = 0xFF;

/// External ID of each vanilla base slot, indexed by internal ID.
#[rustfmt::skip]
const VANILLA_EXTERNAL: [u8; VANILLA_BASE_COUNT] = [
    8,  // 0x00 Mario
    2,  // 0x01 Fox
    0,  // 0x02 Captain Falcon
    1,  // 0x03 Donkey Kong
    4,  // 0x04 Kirby
    5,  // 0x05 Bowser
    6,  // 0x06 Link
    19, // 0x07 Sheik
    11, // 0x08 Ness
    12, // 0x09 Peach
    14, // 0x0A Popo
    NO_EXTERNAL, // 0x0B Nana, see FighterException::SecondClimber
    13, // 0x0C Pikachu
    16, // 0x0D Samus
    17, // 0x0E Yoshi
    15, // 0x0F Jigglypuff
    10, // 0x10 Mewtwo
    7,  // 0x11 Luigi
    9,  // 0x12 Marth
    18, // 0x13 Zelda
    21, // 0x14 Young Link
    22, // 0x15 Dr. Mario
    20, // 0x16 Falco
    24, // 0x17 Pichu
    3,  // 0x18 Mr. Game & Watch
    25, // 0x19 Ganondorf
    23, // 0x1A Roy
];

/// External IDs of the six special slots, in internal order. These never
/// move when fighters are added because menus address them directly.
#[rustfmt::skip]
const SPECIAL_EXTERNAL: [u8; SPECIAL_SLOT_COUNT] = [
    26, // Master Hand
    30, // Crazy Hand
    27, // Male Wireframe
    28, // Female Wireframe
    29, // Giga Bowser
    31, // Sandbag
];

/// Hard-coded historical irregularities in the fighter numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FighterException {
    /// The second ice climber (internal 0x0B) has no select-screen slot of
    /// its own and is always parked on the last vanilla external slot.
    SecondClimber,
}

impl FighterException {
    pub const ALL: [FighterException; 1] = [FighterException::SecondClimber];

    pub fn internal_id(self) -> usize {
        match self {
            FighterException::SecondClimber => 0x0B,
        }
    }

    pub fn external_id(self) -> usize {
        match self {
            FighterException::SecondClimber => VANILLA_FIGHTER_COUNT - 1,
        }
    }

    fn for_internal(internal_id: usize) -> Option<FighterException> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.internal_id() == internal_id)
    }
}

/// True for the trailing special slots of a roster of `total_count`.
pub fn is_special_slot(internal_id: usize, total_count: usize) -> bool {
    total_count >= SPECIAL_SLOT_COUNT
        && internal_id < total_count
        && internal_id >= total_count - SPECIAL_SLOT_COUNT
}

/// Maps a fighter's internal ID to the external (menu) ID.
///
/// Rosters smaller than the vanilla roster are not covered by the table
/// and map one to one. IDs past the end of the roster are passed through.
pub fn fighter_to_external(internal_id: usize, total_count: usize) -> usize {
    if total_count < VANILLA_FIGHTER_COUNT || internal_id >= total_count {
        return internal_id;
    }

    if let Some(exception) = FighterException::for_internal(internal_id) {
        return exception.external_id();
    }

    if is_special_slot(internal_id, total_count) {
        let slot = internal_id - (total_count - SPECIAL_SLOT_COUNT);
        return SPECIAL_EXTERNAL[slot] as usize;
    }

    if internal_id < VANILLA_BASE_COUNT {
        return VANILLA_EXTERNAL[internal_id] as usize;
    }

    // Added fighters sit between the vanilla base slots and the specials.
    FIRST_ADDED_EXTERNAL + (internal_id - VANILLA_BASE_COUNT)
}

/// Inverse of [`fighter_to_external`]. Returns `None` when no internal ID
/// of the roster maps to `external_id`.
pub fn fighter_to_internal(external_id: usize, total_count: usize) -> Option<usize> {
    if total_count < VANILLA_FIGHTER_COUNT || external_id >= total_count {
        return (external_id < total_count).then_some(external_id);
    }
    (0..total_count).find(|&i| fighter_to_external(i, total_count) == external_id)
}

/// Length of the fixed stage permutation table.
pub const STAGE_TABLE_LEN: usize = 32;

/// External (stage select) ID of each internal stage ID.
#[rustfmt::skip]
const STAGE_EXTERNAL: [u8; STAGE_TABLE_LEN] = [
    0,  // 0x00 dummy
    2,  // 0x01 test stage
    1,  // 0x02 Princess Peach's Castle
    5,  // 0x03 Rainbow Cruise
    4,  // 0x04 Kongo Jungle
    3,  // 0x05 Jungle Japes
    8,  // 0x06 Great Bay
    7,  // 0x07 Hyrule Temple
    6,  // 0x08 Brinstar
    11, // 0x09 Brinstar Depths
    9,  // 0x0A Yoshi's Story
    10, // 0x0B Yoshi's Island
    14, // 0x0C Fountain of Dreams
    12, // 0x0D Green Greens
    13, // 0x0E Corneria
    17, // 0x0F Venom
    16, // 0x10 Pokemon Stadium
    15, // 0x11 Poke Floats
    20, // 0x12 Mute City
    18, // 0x13 Big Blue
    19, // 0x14 Onett
    23, // 0x15 Fourside
    21, // 0x16 Icicle Mountain
    22, // 0x17 unused
    26, // 0x18 Mushroom Kingdom
    24, // 0x19 Mushroom Kingdom II
    25, // 0x1A unused
    29, // 0x1B Flat Zone
    27, // 0x1C Dream Land
    28, // 0x1D Yoshi's Island (64)
    31, // 0x1E Kongo Jungle (64)
    30, // 0x1F Battlefield
];

/// Maps a stage internal ID to its external ID. IDs past the table map
/// linearly.
pub fn stage_to_external(internal_id: usize) -> usize {
    STAGE_EXTERNAL
        .get(internal_id)
        .map(|&e| e as usize)
        .unwrap_or(internal_id)
}

/// Inverse of [`stage_to_external`].
pub fn stage_to_internal(external_id: usize, total_count: usize) -> Option<usize> {
    let limit = total_count.max(STAGE_TABLE_LEN);
    (0..limit).find(|&i| stage_to_external(i) == external_id)
}

/// Shifts a stored ID reference after the entity at `removed` was deleted.
/// Returns `None` when the reference pointed at the removed entity.
pub fn shift_after_removal(reference: usize, removed: usize) -> Option<usize> {
    match reference.cmp(&removed) {
        std::cmp::Ordering::Less => Some(reference),
        std::cmp::Ordering::Equal => None,
        std::cmp::Ordering::Greater => Some(reference - 1),
    }
}

/// Shifts a stored ID reference after an entity was inserted at `inserted`.
pub fn shift_after_insertion(reference: usize, inserted: usize) -> usize {
    if reference >= inserted {
        reference + 1
    } else {
        reference
    }
}
