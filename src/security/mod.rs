//! Access control
//!
//! Two layers guard every ODM operation:
//!
//! - **ACL**: per model and group, which operations are allowed at all.
//! - **DLS**: document level rules, a query restricting which records of a
//!   model the members of a group may touch.
//!
//! Root bypasses both. Lookups read the store directly so that checking
//! access never recurses into another access check.

mod acl;
mod dls;

pub use acl::{check_access, user_groups};
pub use dls::rule_filter;

use std::fmt;

pub const USER_MODEL: &str = "base.user";
pub const GROUP_MODEL: &str = "base.group";
pub const ACL_MODEL: &str = "base.acl";
pub const DLS_MODEL: &str = "base.dls";
pub const USER_GROUP_REL: &str = "base.user.group.rel";
pub const GROUP_DLS_REL: &str = "base.group.dls.rel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    Create,
    Unlink,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Read,
        Operation::Write,
        Operation::Create,
        Operation::Unlink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Create => "create",
            Operation::Unlink => "unlink",
        }
    }

    /// ACL flag granting this operation
    pub fn acl_field(&self) -> &'static str {
        match self {
            Operation::Read => "allow_read",
            Operation::Write => "allow_write",
            Operation::Create => "allow_create",
            Operation::Unlink => "allow_unlink",
        }
    }

    /// DLS flag enabling a rule for this operation
    pub fn rule_flag(&self) -> &'static str {
        match self {
            Operation::Read => "on_read",
            Operation::Write => "on_write",
            Operation::Create => "on_create",
            Operation::Unlink => "on_unlink",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
