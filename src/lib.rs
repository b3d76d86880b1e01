//! # CICADA
//!
//! **C**atalog **I**ngestion, **C**onjunction **A**ssessment & **D**ebris **A**voidance
//!
//! A satellite catalog propagation and conjunction-screening engine.
//! Mean orbital elements go in; out come propagated inertial states, a
//! spatial-hash screen of close pairs, Monte-Carlo collision
//! probabilities, and minimum-impulse avoidance maneuvers. The hot state
//! lives in a single Structure-of-Arrays store shared by the whole
//! pipeline; an optional recorder keeps a bounded, scrubbable history of
//! positions and conjunction events.

pub mod config;
pub mod constants;
pub mod elements;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod history;
pub mod maneuver;
pub mod probability;
pub mod propagator;
pub mod screen;
pub mod store;
pub mod tle;
