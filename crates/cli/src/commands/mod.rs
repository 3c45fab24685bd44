pub mod group;
pub mod migrate;
