//! Addons compiled into the binary

pub mod base;

use crate::modules::Addon;
use crate::types::Result;

/// Every compiled addon, in no particular order
pub fn builtin() -> Result<Vec<Box<dyn Addon>>> {
    Ok(vec![Box::new(base::BaseAddon::new()?)])
}
