// lib.rs — Server-side persistence: save slots and the cached-map store

pub mod dam_file;
pub mod save_slots;
