pub mod align;
pub mod cache;
pub mod config;
pub mod eda;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod plot;
pub mod session;
pub mod signal;

pub use align::*;
pub use error::*;
pub use session::*;
pub use signal::*;
