//! Result handling for the driving loop

pub mod collection;

pub use collection::MatchupCollection;
