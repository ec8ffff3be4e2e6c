//! Physical link abstractions: neighbor sensing and the two serial lines.

/// Side of the badge a link or a neighbor sits on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The other side of the badge.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Position of a badge in the physical chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkRole {
    Unknown,
    LeftMost,
    RightMost,
    Middle,
}

impl LinkRole {
    /// Side an end node always transmits toward. Middle nodes follow the
    /// turn direction instead.
    pub const fn fixed_direction(self) -> Option<Side> {
        match self {
            LinkRole::LeftMost => Some(Side::Right),
            LinkRole::RightMost => Some(Side::Left),
            LinkRole::Unknown | LinkRole::Middle => None,
        }
    }

    /// Returns `true` when the chain continues on `side`.
    pub const fn has_neighbor(self, side: Side) -> bool {
        match (self, side) {
            (LinkRole::Middle, _)
            | (LinkRole::LeftMost, Side::Right)
            | (LinkRole::RightMost, Side::Left) => true,
            _ => false,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            LinkRole::Unknown => "unknown",
            LinkRole::LeftMost => "left-most",
            LinkRole::RightMost => "right-most",
            LinkRole::Middle => "middle",
        }
    }
}

/// Neighbor presence sampled on both connectors.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensedLinks {
    pub left: bool,
    pub right: bool,
}

impl SensedLinks {
    /// Nothing sensed on either connector.
    pub const NONE: Self = Self::new(false, false);

    pub const fn new(left: bool, right: bool) -> Self {
        Self { left, right }
    }

    /// Maps the sensed pair to a chain role.
    ///
    /// The two connectors are sensed through different mechanisms, so the
    /// mapping follows the board wiring rather than being symmetric.
    pub const fn role(self) -> LinkRole {
        match (self.left, self.right) {
            (false, false) => LinkRole::Unknown,
            (false, true) => LinkRole::LeftMost,
            (true, false) => LinkRole::RightMost,
            (true, true) => LinkRole::Middle,
        }
    }

    pub const fn is_sensed(self, side: Side) -> bool {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

/// Cheap, side-effect free neighbor detection.
pub trait LinkSense {
    fn sense(&self) -> SensedLinks;
}

/// Byte-oriented, non-blocking serial line to one neighbor.
pub trait SerialLink {
    /// Pops the next received byte, if any.
    fn read_byte(&mut self) -> Option<u8>;

    /// Pushes bytes toward the neighbor.
    fn write(&mut self, bytes: &[u8]);

    /// Makes this line the one being listened to. Lines that can receive on
    /// both sides at once ignore this.
    fn listen(&mut self) {}

    /// Drops every unread byte.
    fn flush_input(&mut self) {
        while self.read_byte().is_some() {}
    }
}
