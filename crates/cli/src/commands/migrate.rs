use crate::commands::{with_pool, CommandResult, Failure};

pub fn run() -> CommandResult {
    match with_pool("migrate", |_config, _pool| async { Ok::<(), Failure>(()) }) {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure,
    }
}
