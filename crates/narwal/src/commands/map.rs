//! `narwal map`: request a fresh floor map and write it as PNG.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use narwal_core::{DeviceEvent, MapSnapshot, Vacuum};

use crate::cli::{GlobalOpts, MapArgs};
use crate::error::CliError;
use crate::output::{self, Painter};

use super::wake;

#[derive(Debug, Serialize)]
struct MapReport {
    file: String,
    generation: u64,
    width: u32,
    height: u32,
    rooms: Vec<String>,
}

impl MapReport {
    fn new(file: String, map: &MapSnapshot) -> Self {
        Self {
            file,
            generation: map.generation,
            width: map.image.width,
            height: map.image.height,
            rooms: map
                .model
                .rooms
                .iter()
                .map(|r| r.name.clone().unwrap_or_else(|| format!("room {}", r.id)))
                .collect(),
        }
    }
}

async fn next_map(vacuum: &Vacuum, timeout: Duration) -> Result<Option<Arc<MapSnapshot>>, CliError> {
    let mut events = vacuum.subscribe();
    let previous = vacuum.last_map().map_or(0, |m| m.generation);

    vacuum.refresh_map().await?;
    if let Some(map) = vacuum.last_map().filter(|m| m.generation > previous) {
        return Ok(Some(map));
    }

    let arrival = async {
        while let Some(event) = events.next().await {
            if let DeviceEvent::MapReady(map) = event {
                if map.generation > previous {
                    return Some(map);
                }
            }
        }
        None
    };
    Ok(tokio::time::timeout(timeout, arrival).await.ok().flatten())
}

pub async fn handle(vacuum: &Vacuum, args: &MapArgs, global: &GlobalOpts) -> Result<(), CliError> {
    wake(vacuum, global).await?;

    let map = match next_map(vacuum, Duration::from_secs(args.timeout)).await? {
        Some(map) => map,
        None => {
            let stale = vacuum.last_map().ok_or(CliError::NoMap)?;
            tracing::warn!("No fresh map arrived, saving the last one received");
            stale
        }
    };

    map.image.save_png(&args.file)?;

    let painter = Painter::new(global.color);
    let report = MapReport::new(args.file.display().to_string(), &map);
    let text = output::render_single(
        global.output,
        &report,
        |r| {
            let mut text = format!(
                "{} {} ({}x{} px)",
                painter.good("✓"),
                r.file,
                r.width,
                r.height
            );
            if !r.rooms.is_empty() {
                text.push('\n');
                text.push_str(&painter.dim(&r.rooms.join(", ")));
            }
            text
        },
        |r| r.file.clone(),
    )?;
    output::print_output(&text, global.quiet);
    Ok(())
}
