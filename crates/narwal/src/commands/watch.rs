//! `narwal watch`: print session, status and map events as they arrive.

use chrono::Local;
use serde_json::json;

use narwal_core::{DeviceEvent, Vacuum};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output::{self, Painter};

fn event_json(event: &DeviceEvent) -> serde_json::Value {
    match event {
        DeviceEvent::StateChanged(state) => json!({ "event": "state", "state": state }),
        DeviceEvent::Status(status) => json!({ "event": "status", "status": status }),
        DeviceEvent::MapReady(map) => json!({
            "event": "map",
            "generation": map.generation,
            "width": map.image.width,
            "height": map.image.height,
            "rooms": map.model.rooms.len(),
        }),
    }
}

fn event_line(event: &DeviceEvent, painter: Painter) -> String {
    let stamp = painter.dim(&Local::now().format("%H:%M:%S").to_string());
    let body = match event {
        DeviceEvent::StateChanged(state) => format!("session  {}", painter.label(&state.to_string())),
        DeviceEvent::Status(s) => format!(
            "status   {} {}% {}",
            s.activity,
            s.battery_percent,
            if s.docked { "docked" } else { "off dock" }
        ),
        DeviceEvent::MapReady(map) => format!(
            "map      #{} {}x{} px, {} rooms",
            map.generation,
            map.image.width,
            map.image.height,
            map.model.rooms.len()
        ),
    };
    format!("{stamp} {body}")
}

pub async fn handle(vacuum: &Vacuum, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut events = vacuum.subscribe();
    vacuum.connect().await;

    let painter = Painter::new(global.color);
    let mut seen = 0usize;

    loop {
        if args.count.is_some_and(|limit| seen >= limit) {
            break;
        }

        let event = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(event) => event,
                None => break,
            },
        };
        seen += 1;

        let text = match global.output {
            OutputFormat::Table => event_line(&event, painter),
            OutputFormat::Json | OutputFormat::JsonCompact => event_json(&event).to_string(),
            OutputFormat::Plain => match &event {
                DeviceEvent::StateChanged(state) => state.to_string(),
                DeviceEvent::Status(s) => s.activity.to_string(),
                DeviceEvent::MapReady(map) => map.generation.to_string(),
            },
        };
        output::print_output(&text, global.quiet);
    }

    if events.dropped() > 0 {
        tracing::warn!(dropped = events.dropped(), "Some events were skipped");
    }
    Ok(())
}
