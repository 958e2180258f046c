//! HTML pages
//!
//! - Document shell, stylesheet and not-found fallback
//! - The sign-in/out view and its state machine
//! - Demo page routes

mod page;
mod shell;
pub mod view;

pub use page::{DEMO_PATH, demo_router};
pub use shell::{TITLE, document, error_page, not_found, not_found_page};
pub use view::{SignInFailure, SignInView, ViewRoutes, ViewState};
