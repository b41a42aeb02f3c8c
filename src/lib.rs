pub mod arch;
pub mod check;
pub mod command;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fsutil;
pub mod options;
pub mod pipeline;
pub mod pkgconfig;
pub mod placeholder;
pub mod postbuild;
pub mod prefix;
pub mod recipe;
pub mod registry;
pub mod state;
pub mod system;
pub mod target;
pub mod template;
pub mod textpatch;
pub mod universal;

pub use error::{Error, Result};
