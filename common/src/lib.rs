//! Grid Lotto common library
//!
//! Shared domain types, the settlement contract codec and the winner
//! selection strategies used by the draw service.

pub mod abi;
pub mod address;
pub mod contract;
pub mod coordinate;
pub mod error;
pub mod round;
pub mod selection;

pub use address::Address;
pub use coordinate::{Coordinate, CoordinateSet};
pub use error::DecodeError;
pub use round::{Entry, RoundData, RoundId, WinnerIndex};
