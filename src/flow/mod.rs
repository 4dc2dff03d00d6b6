pub mod graph;
pub mod solver;
