//! Terminal front end for `rchess-session`.

pub mod command;
