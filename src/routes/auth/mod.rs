mod handler;
mod model;

pub use handler::{check_token, create_account, login, refresh_token, rotate_credential};
