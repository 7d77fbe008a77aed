pub mod logging;
pub mod path;

pub use path::display_name;
