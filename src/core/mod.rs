pub mod waf;

pub use waf::WafEngine;
