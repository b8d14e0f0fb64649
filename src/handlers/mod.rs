pub mod inventory_issue;
pub mod lot;
pub mod product;
pub mod user;
