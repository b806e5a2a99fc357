#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;
pub mod fixtures;
pub mod service;

pub use builders::{cond, GroupBuilder};
pub use service::TestService;
