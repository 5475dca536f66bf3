//! Command dispatch: bridges CLI args -> `Vacuum` calls -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod map;
pub mod status;
pub mod watch;

use std::time::Duration;

use narwal_core::{Vacuum, VacuumCommand};

use crate::cli::{Command, GlobalOpts, StationAction};
use crate::error::CliError;

/// Connect and wait for the robot to answer, bounded by `--wait`.
pub async fn wake(vacuum: &Vacuum, global: &GlobalOpts) -> Result<(), CliError> {
    vacuum.connect().await;
    vacuum
        .wait_until_awake(Duration::from_secs(global.wait))
        .await?;
    Ok(())
}

/// Dispatch a device-bound command to the appropriate handler.
///
/// The session is always stopped afterwards, whatever the handler returned.
pub async fn dispatch(cmd: Command, vacuum: &Vacuum, global: &GlobalOpts) -> Result<(), CliError> {
    let result = match cmd {
        Command::Status => status::handle(vacuum, global).await,
        Command::Watch(args) => watch::handle(vacuum, &args, global).await,
        Command::Map(args) => map::handle(vacuum, &args, global).await,
        Command::Start => control::handle(vacuum, VacuumCommand::Start, global).await,
        Command::EasyClean => control::handle(vacuum, VacuumCommand::EasyClean, global).await,
        Command::Stop => control::handle(vacuum, VacuumCommand::Stop, global).await,
        Command::Pause => control::handle(vacuum, VacuumCommand::Pause, global).await,
        Command::Resume => control::handle(vacuum, VacuumCommand::Resume, global).await,
        Command::Dock => control::handle(vacuum, VacuumCommand::ReturnToDock, global).await,
        Command::Locate => control::handle(vacuum, VacuumCommand::Locate, global).await,
        Command::Fan { level } => {
            control::handle(vacuum, VacuumCommand::SetFanSpeed(level.into()), global).await
        }
        Command::Mop { level } => {
            control::handle(vacuum, VacuumCommand::SetMopHumidity(level.into()), global).await
        }
        Command::Station(args) => {
            let command = match args.action {
                StationAction::Wash => VacuumCommand::WashMop,
                StationAction::Dry => VacuumCommand::DryMop,
                StationAction::Empty => VacuumCommand::EmptyDustbin,
            };
            control::handle(vacuum, command, global).await
        }
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    };

    vacuum.disconnect().await;
    result
}
