pub mod listing;
pub mod reply;
pub mod userinfo;

#[rustfmt::skip]
pub use self::{
    listing::*,
    reply::*,
    userinfo::*,
};
