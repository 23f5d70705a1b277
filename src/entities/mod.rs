pub mod comment;
pub mod favorite;
pub mod love;
pub mod movie;
pub mod review;
pub mod user;
pub mod watchlist;
