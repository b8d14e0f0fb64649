pub mod lot;
pub mod product;
