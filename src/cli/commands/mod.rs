pub mod cascade;
pub mod entities;
pub mod migrate;
