pub mod config_io;
pub mod draft_io;
pub mod template_source;
