//! Govsim Persona - the per-tick decision and interaction engine
//!
//! Each tick a persona receives one observation and returns one action.
//! Where it is decides what happens:
//! - harvest site: decide how much to take
//! - social site: private pairing chats, then one group conversation
//! - home: reflect on recent memories

pub mod group;
pub mod pairing;
pub mod persona;
pub mod private;
pub mod reflect;
pub mod registry;
pub mod runtime;

pub use group::converse_group;
pub use pairing::{run_pairing, EligiblePool};
pub use persona::Persona;
pub use private::converse_private;
pub use registry::PeerRegistry;
pub use runtime::{PersonaRuntime, Route};
