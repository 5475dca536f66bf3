//! Task and setting commands: start, stop, dock, fan, mop, station actions.

use serde::Serialize;

use narwal_core::{CommandOutcome, CommandResult, Vacuum, VacuumCommand};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::{self, Painter};

use super::wake;

#[derive(Debug, Serialize)]
struct Report {
    command: VacuumCommand,
    confirmed: bool,
}

fn describe(command: VacuumCommand) -> String {
    match command {
        VacuumCommand::Start => "start cleaning".into(),
        VacuumCommand::EasyClean => "quick clean".into(),
        VacuumCommand::Stop => "stop".into(),
        VacuumCommand::Cancel => "cancel".into(),
        VacuumCommand::Pause => "pause".into(),
        VacuumCommand::Resume => "resume".into(),
        VacuumCommand::ReturnToDock => "return to dock".into(),
        VacuumCommand::Locate => "locate".into(),
        VacuumCommand::SetFanSpeed(speed) => format!("fan speed {speed}"),
        VacuumCommand::SetMopHumidity(humidity) => format!("mop humidity {humidity}"),
        VacuumCommand::WashMop => "wash mop".into(),
        VacuumCommand::DryMop => "dry mop".into(),
        VacuumCommand::EmptyDustbin => "empty dustbin".into(),
        VacuumCommand::RefreshMap => "refresh map".into(),
        VacuumCommand::TakePicture => "take picture".into(),
    }
}

pub async fn handle(
    vacuum: &Vacuum,
    command: VacuumCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    wake(vacuum, global).await?;

    let confirmed = match vacuum.send_command(command).await? {
        CommandOutcome::Acknowledged(ack) => match ack.result {
            CommandResult::Success | CommandResult::Missing => true,
            other => {
                return Err(CliError::Rejected {
                    command: describe(command),
                    result: format!("{other:?}"),
                });
            }
        },
        CommandOutcome::Unconfirmed => false,
    };

    let painter = Painter::new(global.color);
    let text = output::render_single(
        global.output,
        &Report { command, confirmed },
        |r| {
            if r.confirmed {
                format!("{} {}", painter.good("✓"), describe(r.command))
            } else {
                format!(
                    "{} {} {}",
                    painter.warn("?"),
                    describe(r.command),
                    painter.dim("(sent, robot did not reply)")
                )
            }
        },
        |r| String::from(if r.confirmed { "confirmed" } else { "unconfirmed" }),
    )?;
    output::print_output(&text, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use narwal_core::FanSpeed;

    use super::*;

    #[test]
    fn describes_setting_commands_with_their_value() {
        assert_eq!(
            describe(VacuumCommand::SetFanSpeed(FanSpeed::Quiet)),
            "fan speed quiet"
        );
        assert_eq!(describe(VacuumCommand::ReturnToDock), "return to dock");
    }
}
