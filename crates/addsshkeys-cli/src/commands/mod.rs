pub mod add;
pub mod config;
pub mod list;
pub mod status;

pub use add::{run_add, show_plan};
pub use list::run_list;
pub use status::show_status;
