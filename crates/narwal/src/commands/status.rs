//! `narwal status`

use std::time::Duration;

use narwal_core::{DeviceEvent, Vacuum};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::{self, Painter};

use super::wake;

/// Extra time allowed for the first status report after waking.
const FIRST_REPORT_GRACE: Duration = Duration::from_secs(5);

pub async fn handle(vacuum: &Vacuum, global: &GlobalOpts) -> Result<(), CliError> {
    let mut events = vacuum.subscribe();
    wake(vacuum, global).await?;

    if vacuum.status().status.updated_at.is_none() {
        let first_report = async {
            while let Some(event) = events.next().await {
                if matches!(event, DeviceEvent::Status(ref s) if s.updated_at.is_some()) {
                    break;
                }
            }
        };
        if tokio::time::timeout(FIRST_REPORT_GRACE, first_report).await.is_err() {
            tracing::warn!("Robot is awake but has not reported its status yet");
        }
    }

    let snapshot = vacuum.status();
    let painter = Painter::new(global.color);
    let text = output::render_single(
        global.output,
        &snapshot,
        |s| output::status_detail(s, painter),
        |s| s.status.activity.to_string(),
    )?;
    output::print_output(&text, global.quiet);
    Ok(())
}
