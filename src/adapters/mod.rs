//! Adapters implementing the domain's driven ports: [`crate::domain::BacnetStack`]
//! and [`crate::domain::DocumentStore`].

pub mod in_memory_store;
pub mod mongodb_store;
pub mod sim_bacnet;
