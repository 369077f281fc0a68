//! MikroTik RouterOS dialect.
//!
//! RouterOS writes `.backup` and `.rsc` files to the root of its own
//! filesystem, which is also the SFTP root, so the remote file name is
//! the path used for retrieval and removal.

use crate::platform::Dialect;

/// Name under which the dialect is registered.
pub const DIALECT_NAME: &str = "routeros";

/// Create the RouterOS dialect.
pub fn dialect() -> Dialect {
    Dialect::new(
        DIALECT_NAME,
        "/system backup save name={name}",
        "/export file={name}",
        "/file remove {file}",
    )
    .with_failure_pattern("failure:")
    .with_failure_pattern("syntax error")
    .with_failure_pattern("bad command name")
    .with_failure_pattern("expected end of command")
    .with_failure_pattern("no such item")
}
