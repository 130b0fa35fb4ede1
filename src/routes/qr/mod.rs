mod handler;
mod model;

pub use handler::{confirm_session, create_session, poll_session, update_session};
