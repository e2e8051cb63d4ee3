mod circuit;
mod context;
mod instance;
pub mod interface;
mod mem;
mod register;
mod signal;
mod value;
mod wire;

pub use circuit::*;
pub use context::*;
pub use instance::*;
pub use interface::*;
pub use mem::*;
pub use register::*;
pub use signal::*;
pub use value::*;
pub use wire::*;
