use crate::commands::CommandResult;

/// Preflight: the same config, connectivity, and schema steps the server
/// performs at boot, without starting any listener.
pub fn run() -> CommandResult {
    super::database_preflight("start", "preflight checks passed")
}
