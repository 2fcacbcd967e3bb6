mod offset_vec;
mod weak_cache;

pub use offset_vec::*;
pub use weak_cache::*;
