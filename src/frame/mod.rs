//! Link-layer frame parsing module

mod parser;
mod types;

pub use parser::{parse_frame, MAC_FIELD_COUNT};
pub use types::{LinkType, MacAddress};
