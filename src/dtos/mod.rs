pub mod inventory_issue;
pub mod lot;
pub mod user;
