mod barnes_hut;
mod brute_force;
mod force;
mod quadtree;

pub use barnes_hut::*;
pub use brute_force::*;
pub use force::*;
pub use quadtree::*;
