#![allow(clippy::needless_range_loop)]

pub mod compression;
pub mod stream;
