mod clamd;

pub use clamd::{ClamdEngine, EICAR, parse_reply};
