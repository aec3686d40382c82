//! Grid coordinates and six-pick tickets.
//!
//! The grid is 7x7. A cell is written either as a token (`A1`..`G7`, the
//! letter is the row and the digit the column) or as its row-major number
//! `1..=49`, where `A1 = 1`, `A7 = 7`, `B1 = 8` and `G7 = 49`.
//! A ticket is the comma-separated list of its six cells.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Rows and columns of the grid
pub const GRID_SIZE: u8 = 7;
/// Number of cells a ticket can pick from
pub const CELL_COUNT: u8 = GRID_SIZE * GRID_SIZE;
/// Number of distinct cells in every ticket
pub const PICKS_PER_ENTRY: usize = 6;

const FIRST_ROW: u8 = b'A';

/// One grid cell, stored as its row-major number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate(u8);

impl Coordinate {
    pub fn new(cell: u8) -> Result<Self, DecodeError> {
        if cell == 0 || cell > CELL_COUNT {
            return Err(DecodeError::InvalidToken(cell.to_string()));
        }
        Ok(Self(cell))
    }

    /// Build from a zero-based row and a one-based column
    pub fn from_row_column(row: u8, column: u8) -> Result<Self, DecodeError> {
        if row >= GRID_SIZE || column == 0 || column > GRID_SIZE {
            return Err(DecodeError::InvalidToken(format!("row {row} column {column}")));
        }
        Ok(Self(row * GRID_SIZE + column))
    }

    pub fn cell(&self) -> u8 {
        self.0
    }

    pub fn row(&self) -> u8 {
        (self.0 - 1) / GRID_SIZE
    }

    pub fn column(&self) -> u8 {
        (self.0 - 1) % GRID_SIZE + 1
    }

    pub fn row_letter(&self) -> char {
        (FIRST_ROW + self.row()) as char
    }
}

impl FromStr for Coordinate {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let invalid = || DecodeError::InvalidToken(token.to_string());
        let bytes = token.as_bytes();

        match bytes {
            [letter @ b'A'..=b'G', digit @ b'1'..=b'7'] => {
                Coordinate::from_row_column(letter - FIRST_ROW, digit - b'0')
            }
            [first, ..] if first.is_ascii_digit() => {
                if !bytes.iter().all(u8::is_ascii_digit) || bytes.len() > 2 {
                    return Err(invalid());
                }
                let cell: u8 = token.parse().map_err(|_| invalid())?;
                Coordinate::new(cell).map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_letter(), self.column())
    }
}

impl From<Coordinate> for String {
    fn from(value: Coordinate) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Coordinate {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Six distinct cells, kept sorted so equal sets compare equal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CoordinateSet([Coordinate; PICKS_PER_ENTRY]);

impl CoordinateSet {
    pub fn new<I: IntoIterator<Item = Coordinate>>(coordinates: I) -> Result<Self, DecodeError> {
        let mut picked: Vec<Coordinate> = coordinates.into_iter().collect();
        if picked.len() != PICKS_PER_ENTRY {
            return Err(DecodeError::WrongTokenCount {
                expected: PICKS_PER_ENTRY,
                got: picked.len(),
            });
        }

        picked.sort_unstable();
        if let Some(pair) = picked.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(DecodeError::DuplicateCoordinate(pair[0].to_string()));
        }

        let mut cells = [Coordinate(1); PICKS_PER_ENTRY];
        cells.copy_from_slice(&picked);
        Ok(Self(cells))
    }

    /// Parse a comma-separated ticket, tokens may be `A1` style or numeric
    pub fn decode(ticket: &str) -> Result<Self, DecodeError> {
        let trimmed = ticket.trim();
        let tokens: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split(',').collect()
        };

        if tokens.len() != PICKS_PER_ENTRY {
            return Err(DecodeError::WrongTokenCount {
                expected: PICKS_PER_ENTRY,
                got: tokens.len(),
            });
        }

        let coordinates = tokens
            .into_iter()
            .map(Coordinate::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(coordinates)
    }

    /// Ticket in `A1,B2,...` form
    pub fn encode(&self) -> String {
        self.join(|c| c.to_string())
    }

    /// Ticket in row-major numeric form, `1,9,...`
    pub fn encode_numeric(&self) -> String {
        self.join(|c| c.cell().to_string())
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.0.binary_search(coordinate).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Coordinate] {
        &self.0
    }

    /// Bit `n` is set when cell `n` is picked
    pub fn mask(&self) -> u64 {
        self.0.iter().fold(0u64, |mask, c| mask | (1u64 << c.cell()))
    }

    fn join<F: Fn(&Coordinate) -> String>(&self, f: F) -> String {
        self.0.iter().map(f).collect::<Vec<_>>().join(",")
    }
}

impl FromStr for CoordinateSet {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Display for CoordinateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<CoordinateSet> for String {
    fn from(value: CoordinateSet) -> Self {
        value.encode()
    }
}

impl TryFrom<String> for CoordinateSet {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::decode(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_token_mapping_is_row_major() {
        assert_eq!("A1".parse::<Coordinate>().unwrap().cell(), 1);
        assert_eq!("A7".parse::<Coordinate>().unwrap().cell(), 7);
        assert_eq!("B1".parse::<Coordinate>().unwrap().cell(), 8);
        assert_eq!("G7".parse::<Coordinate>().unwrap().cell(), 49);
        assert_eq!(Coordinate::new(24).unwrap().to_string(), "D3");
    }

    #[test]
    fn test_numeric_tokens_accepted() {
        assert_eq!("49".parse::<Coordinate>().unwrap().to_string(), "G7");
        assert_eq!(" 8 ".parse::<Coordinate>().unwrap().to_string(), "B1");
    }

    #[test]
    fn test_invalid_tokens_rejected() {
        for token in ["", "H1", "A8", "A0", "a1", "0", "50", "A12", "1A", "-3", "007"] {
            assert!(token.parse::<Coordinate>().is_err(), "token '{token}' should fail");
        }
    }

    #[test]
    fn test_ticket_decode_mixed_forms() {
        let ticket = CoordinateSet::decode("A1, 9,C3,D4 ,E5,49").unwrap();
        assert_eq!(ticket.encode(), "A1,B2,C3,D4,E5,G7");
        assert_eq!(ticket.encode_numeric(), "1,9,17,25,33,49");
    }

    #[test]
    fn test_ticket_wrong_token_count() {
        assert_eq!(
            CoordinateSet::decode("A1,A2,A3,A4,A5"),
            Err(DecodeError::WrongTokenCount { expected: 6, got: 5 })
        );
        assert_eq!(
            CoordinateSet::decode(""),
            Err(DecodeError::WrongTokenCount { expected: 6, got: 0 })
        );
        assert!(CoordinateSet::decode("A1,A2,A3,A4,A5,A6,A7").is_err());
        assert!(CoordinateSet::decode("A1,A2,A3,A4,A5,").is_err());
    }

    #[test]
    fn test_ticket_rejects_duplicates() {
        assert_eq!(
            CoordinateSet::decode("A1,A2,A3,A4,A5,1"),
            Err(DecodeError::DuplicateCoordinate("A1".to_string()))
        );
    }

    #[test]
    fn test_ticket_serde_uses_token_form() {
        let ticket = CoordinateSet::decode("G7,A1,B2,C3,D4,E5").unwrap();
        let json = serde_json::to_string(&ticket).unwrap();
        assert_eq!(json, "\"A1,B2,C3,D4,E5,G7\"");
        let back: CoordinateSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ticket);
    }

    #[test]
    fn test_mask_and_contains() {
        let ticket = CoordinateSet::decode("1,2,3,4,5,49").unwrap();
        assert_eq!(ticket.mask().count_ones(), 6);
        assert!(ticket.contains(&Coordinate::new(49).unwrap()));
        assert!(!ticket.contains(&Coordinate::new(48).unwrap()));
    }

    proptest! {
        #[test]
        fn test_ticket_roundtrip(
            cells in prop::sample::subsequence((1u8..=49).collect::<Vec<_>>(), 6),
            seed in any::<u64>(),
        ) {
            let mut shuffled = cells.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            let ticket =
                CoordinateSet::new(shuffled.into_iter().map(|c| Coordinate::new(c).unwrap()))
                    .unwrap();

            prop_assert_eq!(CoordinateSet::decode(&ticket.encode()).unwrap(), ticket.clone());
            prop_assert_eq!(
                CoordinateSet::decode(&ticket.encode_numeric()).unwrap(),
                ticket.clone()
            );

            let decoded: Vec<u8> = CoordinateSet::decode(&ticket.encode())
                .unwrap()
                .iter()
                .map(|c| c.cell())
                .collect();
            prop_assert_eq!(decoded, cells);
        }
    }
}
