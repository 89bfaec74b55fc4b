#![warn(clippy::todo, unused_qualifications)]

//! Time-domain solver for Maxwell's equations on a staggered lattice, with a
//! symplectic integrator of selectable order.

pub mod driver;
pub mod integrator;
pub mod linalg;
pub mod material;
pub mod source;
pub mod time_step;
pub mod util;
pub mod yee;
