//! Core trait abstractions for the extraction agent.
//!
//! These traits are the seams to the two external collaborators: the
//! message store being searched and the language model doing the judgment.

pub mod ai;
pub mod store;
