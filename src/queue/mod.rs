//! Guild queues
//!
//! A guild's queue is a bounded, ordered roster of participants together
//! with their reputation and the recent turn announcements. The controller
//! owns all guilds and serializes access to each one.

pub mod announcements;
pub mod controller;
pub mod roster;
pub mod state;
pub mod storage;

pub use announcements::{AnnouncementLog, ANNOUNCEMENT_HISTORY};
pub use controller::{ControllerConfig, QueueController, QueueControllerStats};
pub use roster::{Roster, DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY};
pub use state::{GuildQueueState, GuildSnapshot};
pub use storage::{InMemoryStateStore, JsonFileStore, StateStore};
