//! `game_shared`
//!
//! Gameplay core shared by client and server.
//!
//! Design goals:
//! - Deterministic per tick: every function takes `dt` or `now` explicitly.
//! - Collaborators (collision queries, audio, input) behind traits and passed
//!   in, never looked up.
//! - Discrete replicated changes are explicit messages (see [`net`]).
//! - No `unsafe`.

pub mod arena;
pub mod character;
pub mod clock;
pub mod config;
pub mod ecs;
pub mod event;
pub mod footsteps;
pub mod ground;
pub mod input;
pub mod math;
pub mod movement;
pub mod net;
pub mod orientation;
pub mod physics;
pub mod smoothing;
pub mod weapon;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::character::*;
    pub use crate::config::*;
    pub use crate::ecs::*;
    pub use crate::event::*;
    pub use crate::input::*;
    pub use crate::math::*;
    pub use crate::net::*;
}
