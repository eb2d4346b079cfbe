#![allow(clippy::needless_range_loop, clippy::too_many_arguments)]

pub mod info;
pub mod saveg;
pub mod thinkers;
pub mod world;
