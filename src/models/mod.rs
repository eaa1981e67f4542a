pub mod brand;
pub mod generation;
pub mod job;
pub mod product;
