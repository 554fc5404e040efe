pub mod abuse;
pub mod user;
