//! Test helpers shared across PatchPilot crates.

pub mod agent;
pub mod inventory;
pub mod store;

pub use agent::{FailingAgent, ScriptedAgent};
pub use inventory::{StubInventory, failed_vm, maintenance_config, vm_entry};
pub use store::CountingStore;
