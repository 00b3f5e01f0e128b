//! Rakshasutra console core: the headless model of the operator console's
//! map and report views.
//!
//! The map side reconciles a polled batch of geo points into a marker
//! overlay and fits the viewport. The table side keeps the polled report
//! rows, filters them client-side and merges model scores into them.
//! `console::ConsoleEngine` ties both to one mounted view.

pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod event;
pub mod feed;
pub mod geo;
pub mod overlay;
pub mod provider;
pub mod resize;
pub mod rng;
pub mod scheduler;
pub mod scoring;
pub mod store;
pub mod surface;
pub mod table;
pub mod types;
