//! Game-facing value types carried inside packets.
//!
//! None of these are interpreted by the session layer; they are validated on
//! decode and handed to the game bridge unchanged.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Index of a peer in the registry, dense from zero
pub type PeerId = usize;

/// One occupant placed on the board: which cell, and which tile variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacedObject {
    pub location_index: i32,
    pub tile_index: i32,
}

impl PlacedObject {
    pub fn new(location_index: i32, tile_index: i32) -> Self {
        Self {
            location_index,
            tile_index,
        }
    }
}

impl From<(i32, i32)> for PlacedObject {
    fn from((location_index, tile_index): (i32, i32)) -> Self {
        Self::new(location_index, tile_index)
    }
}

/// Full board layout for one round, as generated by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub level: i32,
    pub walls: Vec<PlacedObject>,
    pub food: Vec<PlacedObject>,
    pub enemies: Vec<PlacedObject>,
}

impl BoardSnapshot {
    pub fn new(
        level: i32,
        walls: Vec<PlacedObject>,
        food: Vec<PlacedObject>,
        enemies: Vec<PlacedObject>,
    ) -> Self {
        Self {
            level,
            walls,
            food,
            enemies,
        }
    }

    pub fn object_count(&self) -> usize {
        self.walls.len() + self.food.len() + self.enemies.len()
    }
}

/// A player's movement intent for the next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum MovementDirection {
    #[default]
    None = 0,
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
}

impl MovementDirection {
    /// Grid offset for this direction
    pub fn delta(self) -> (i32, i32) {
        match self {
            MovementDirection::None => (0, 0),
            MovementDirection::Up => (0, 1),
            MovementDirection::Down => (0, -1),
            MovementDirection::Left => (-1, 0),
            MovementDirection::Right => (1, 0),
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for MovementDirection {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(MovementDirection::None),
            1 => Ok(MovementDirection::Up),
            2 => Ok(MovementDirection::Down),
            3 => Ok(MovementDirection::Left),
            4 => Ok(MovementDirection::Right),
            other => Err(ProtocolError::InvalidDirection(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_range_is_validated() {
        for dir in [
            MovementDirection::None,
            MovementDirection::Up,
            MovementDirection::Down,
            MovementDirection::Left,
            MovementDirection::Right,
        ] {
            assert_eq!(MovementDirection::try_from(dir.as_i32()).ok(), Some(dir));
        }
        assert!(matches!(
            MovementDirection::try_from(5),
            Err(ProtocolError::InvalidDirection(5))
        ));
        assert!(matches!(
            MovementDirection::try_from(-1),
            Err(ProtocolError::InvalidDirection(-1))
        ));
    }

    #[test]
    fn test_opposite_deltas_cancel() {
        let (ux, uy) = MovementDirection::Up.delta();
        let (dx, dy) = MovementDirection::Down.delta();
        assert_eq!((ux + dx, uy + dy), (0, 0));
        let (lx, ly) = MovementDirection::Left.delta();
        let (rx, ry) = MovementDirection::Right.delta();
        assert_eq!((lx + rx, ly + ry), (0, 0));
    }
}
