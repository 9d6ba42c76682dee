//! Priority-ordered load bookkeeping.
//!
//! Loads are identified by bit position inside a single `u32`. Lower bit
//! indices carry lower priority: they are shed first and restored last.

use core::fmt;

/// Largest number of loads a [`LoadMask`] can describe.
pub const MAX_LOADS: u8 = 32;

/// Number of loads wired on the reference board.
pub const DEFAULT_LOAD_COUNT: u8 = 5;

/// Bit index identifying one load.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadId(u8);

impl LoadId {
    /// Creates an identifier when `index` fits in the mask word.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index < MAX_LOADS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Returns the bit index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Returns the single-bit mask for this load.
    #[must_use]
    pub const fn bit(self) -> u32 {
        1 << self.0
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Which loads are switched on and which are currently shed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoadMask {
    universe: u32,
    present: u32,
    shed: u32,
}

impl LoadMask {
    /// Creates an empty mask over `load_count` loads, clamped to `1..=32`.
    #[must_use]
    pub const fn new(load_count: u8) -> Self {
        let count = if load_count == 0 {
            1
        } else if load_count > MAX_LOADS {
            MAX_LOADS
        } else {
            load_count
        };

        let universe = if count == MAX_LOADS {
            u32::MAX
        } else {
            (1_u32 << count) - 1
        };

        Self {
            universe,
            present: 0,
            shed: 0,
        }
    }

    /// Creates a mask with the given loads switched on and nothing shed.
    #[must_use]
    pub const fn with_present(load_count: u8, present: u32) -> Self {
        let mut mask = Self::new(load_count);
        mask.present = present & mask.universe;
        mask
    }

    /// Bits that name real loads.
    #[must_use]
    pub const fn universe(&self) -> u32 {
        self.universe
    }

    /// Number of loads in the universe.
    #[must_use]
    pub const fn load_count(&self) -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let count = self.universe.count_ones() as u8;
        count
    }

    /// Loads that are switched on.
    #[must_use]
    pub const fn present(&self) -> u32 {
        self.present
    }

    /// Loads that are currently disconnected.
    #[must_use]
    pub const fn shed(&self) -> u32 {
        self.shed
    }

    /// Loads that are switched on and not shed.
    #[must_use]
    pub const fn active(&self) -> u32 {
        self.present & !self.shed
    }

    /// Number of active loads.
    #[must_use]
    pub const fn active_count(&self) -> u32 {
        self.active().count_ones()
    }

    /// Number of shed loads.
    #[must_use]
    pub const fn shed_count(&self) -> u32 {
        self.shed.count_ones()
    }

    /// Returns `true` when `load` is currently shed.
    #[must_use]
    pub const fn is_shed(&self, load: LoadId) -> bool {
        self.shed & load.bit() != 0
    }

    /// Sheds the lowest-priority active load.
    ///
    /// Returns `None` once every present load is already shed.
    pub fn shed_lowest_priority_active(&mut self) -> Option<LoadId> {
        let active = self.active();
        if active == 0 {
            return None;
        }

        #[allow(clippy::cast_possible_truncation)]
        let load = LoadId(active.trailing_zeros() as u8);
        self.shed |= load.bit();
        self.check_invariant();
        Some(load)
    }

    /// Restores the highest-priority shed load.
    ///
    /// Returns `None` when nothing is shed.
    pub fn restore_highest_priority_shed(&mut self) -> Option<LoadId> {
        if self.shed == 0 {
            return None;
        }

        #[allow(clippy::cast_possible_truncation)]
        let load = LoadId((31 - self.shed.leading_zeros()) as u8);
        self.shed &= !load.bit();
        self.check_invariant();
        Some(load)
    }

    /// Replaces the switched-on set. Shed bits for loads that were switched
    /// off are dropped with them. Returns `true` when anything changed.
    pub fn replace_present(&mut self, raw: u32) -> bool {
        let before = *self;
        self.present = raw & self.universe;
        self.shed &= self.present;
        self.check_invariant();
        *self != before
    }

    /// Narrows the switched-on set without admitting new loads. Returns
    /// `true` when anything changed.
    pub fn restrict_present(&mut self, raw: u32) -> bool {
        let before = *self;
        self.present &= raw;
        self.shed &= raw;
        self.check_invariant();
        *self != before
    }

    /// Reconnects every shed load. Returns the loads that were shed.
    pub fn clear_shed(&mut self) -> u32 {
        let cleared = self.shed;
        self.shed = 0;
        self.check_invariant();
        cleared
    }

    fn check_invariant(&self) {
        debug_assert_eq!(self.shed & !self.present, 0, "shed load is not present");
        debug_assert_eq!(self.present & !self.universe, 0, "load outside universe");
    }
}

impl Default for LoadMask {
    fn default() -> Self {
        Self::new(DEFAULT_LOAD_COUNT)
    }
}

/// Formats the low `width` bits of a mask as `0b...`.
#[derive(Copy, Clone, Debug)]
pub struct MaskBits {
    pub bits: u32,
    pub width: u8,
}

impl fmt::Display for MaskBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0b{:0width$b}", self.bits, width = usize::from(self.width))
    }
}
