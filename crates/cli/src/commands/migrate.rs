use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    super::database_preflight("migrate", "applied pending migrations")
}
