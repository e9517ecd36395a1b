mod handlers;
mod routes;
mod static_files;

pub use handlers::{ApiResponse, SelectModelRequest};
pub use routes::create_router;
pub use static_files::fallback_html;
