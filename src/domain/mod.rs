//! Domain layer: aggregates, value objects, events and settlement math.
pub mod aggregates;
pub mod events;
pub mod settlement;
pub mod value_objects;
