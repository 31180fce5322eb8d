//! corehost — lifecycle orchestration engine for hosted game server instances.
//!
//! The engine takes a [`instance::ServerInstance`] through validation,
//! pre-start preparation (core file copy, config rendering), delegated
//! process launch through a pluggable [`starter::Starter`], and post-transition
//! notification over an asynchronous [`bus::EventBus`] whose subscribers can
//! veto any transition. Launch cores declare the config schema and start
//! command; per-instance values flow in through [`vars`] placeholder
//! substitution.
//!
//! Storage, authorization, and the HTTP control surface are external
//! collaborators; this crate only defines the seams they plug into.

pub mod bus;
pub mod console;
pub mod cores;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod paths;
pub mod render;
pub mod starter;
pub mod store;
pub mod utils;
pub mod vars;

pub use bus::{EventBus, EventSubscriber, LifecycleEvent};
pub use cores::{ConfigFileSchema, CoreRegistry, KnownConfigKey, LaunchCore};
pub use error::LifecycleError;
pub use instance::{InstanceData, LifecycleState, ServerInstance, StartData};
pub use lifecycle::{Orchestrator, OrchestratorSettings};
pub use paths::DataDirs;
pub use render::ConfigRenderer;
pub use starter::{Starter, StarterRegistry};
pub use store::{InstanceStore, JsonStore};
