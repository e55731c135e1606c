mod handlers;
mod reply;
mod server;
mod state;


pub use server::{routes, run_server};
pub use state::AppState;
