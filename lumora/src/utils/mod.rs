pub mod checks;
pub mod frame_counter;
pub mod sizes;

pub use checks::*;
pub use frame_counter::*;
