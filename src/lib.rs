pub mod manual;
pub mod shared;
pub mod spawn;
