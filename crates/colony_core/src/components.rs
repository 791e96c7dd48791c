//! Identifier and position types shared by every subsystem.
//!
//! Identifiers are plain data handles. Nothing here owns world state:
//! a handle may dangle at any time and must be resolved through the
//! [`WorldSnapshot`](crate::snapshot::WorldSnapshot) before use.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width and height of a room in tiles.
pub const ROOM_SIZE: u8 = 50;

/// Unique identifier for an agent (worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Weak reference to any world object (structure, site, node, loot...).
///
/// The referenced object may have disappeared since the id was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Name of a room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RoomName(pub String);

impl RoomName {
    /// Create a room name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room-local tile coordinates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Tile {
    /// Column, `0..ROOM_SIZE`.
    pub x: u8,
    /// Row, `0..ROOM_SIZE`.
    pub y: u8,
}

impl Tile {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance, the number of 8-directional steps between tiles.
    #[must_use]
    pub const fn range_to(self, other: Self) -> u8 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy {
            dx
        } else {
            dy
        }
    }

    /// Tiles of the 3x3 ring around this tile, clipped to the room, in
    /// row-major order. The center tile is not included.
    #[must_use]
    pub fn ring(self) -> Vec<Self> {
        let mut tiles = Vec::with_capacity(8);
        for dy in -1i16..=1 {
            for dx in -1i16..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let x = i16::from(self.x) + dx;
                let y = i16::from(self.y) + dy;
                if (0..i16::from(ROOM_SIZE)).contains(&x) && (0..i16::from(ROOM_SIZE)).contains(&y)
                {
                    tiles.push(Self::new(x as u8, y as u8));
                }
            }
        }
        tiles
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Absolute position: a tile inside a named room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Room containing the tile.
    pub room: RoomName,
    /// Tile within the room.
    pub tile: Tile,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub fn new(room: RoomName, tile: Tile) -> Self {
        Self { room, tile }
    }

    /// Range to another position, `None` when the rooms differ.
    #[must_use]
    pub fn range_to(&self, other: &Self) -> Option<u8> {
        (self.room == other.room).then(|| self.tile.range_to(other.tile))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.room, self.tile)
    }
}
