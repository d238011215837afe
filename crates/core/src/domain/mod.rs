pub mod category;
pub mod interaction;
pub mod listing;
