//! Router collaborator contract.

/// The external router. `replace` swaps the current route without growing
/// history; guards only call it after `is_ready` reports `true`.
pub trait Navigator: Send + Sync {
    /// Whether the router is mounted and able to accept commands.
    fn is_ready(&self) -> bool;

    /// Replace the current route with `path`.
    fn replace(&self, path: &str);
}
