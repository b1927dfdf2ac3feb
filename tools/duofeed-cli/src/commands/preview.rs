//! Run a live preview session.
//!
//! Control commands are read from stdin, one per line:
//!
//! ```text
//! crop feed0 left 40      alpha feed1 0.5     zorder feed1 2
//! zoom feed0 1.25         pos feed0 10 20     resize 1280 720
//! policy overlay          reset               refresh
//! quit
//! ```
//!
//! `refresh` tears the pipeline down and rebuilds it with the current feed
//! state, which recovers a feed that stopped delivering frames.

use anyhow::{bail, Context};
use duofeed_common::config::AppConfig;
use duofeed_compositor::{
    ControlCommand, ControlOutcome, ControlReport, Session, SessionEvent, SessionOptions,
    ZoomRange,
};
use duofeed_layout_model::{Applied, FeedName};
use duofeed_pipeline::{BackendCapability, BackendKind, GstProbe, GstRuntime, SurfaceHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::setup;

pub async fn run(config: &AppConfig, window_handle: Option<usize>) -> anyhow::Result<()> {
    // There is no toolkit to host a widget sink here.
    let candidates: Vec<BackendCapability> = BackendCapability::from_config(&config.backends)?
        .into_iter()
        .filter(|c| c.kind != BackendKind::NativeWidget)
        .collect();
    let description = setup::build_description(config, &candidates, &GstProbe)?;
    tracing::debug!(launch = %description, "Graph description");

    let options = SessionOptions {
        zoom: ZoomRange::new(config.layout.zoom_min, config.layout.zoom_max)?,
        standalone: window_handle.is_none(),
    };
    let mut session = Session::start(&description, Box::new(GstRuntime), options)?;

    println!(
        "Previewing {} feed(s) on {} via {}",
        description.feeds.len(),
        description.canvas,
        description.backend.factory()
    );
    println!("Type commands (crop, alpha, zorder, zoom, pos, resize, policy, reset, refresh, quit).");
    println!("Press Ctrl+C to stop...");

    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(handle) = window_handle {
        tx.send(SessionEvent::SurfacePrepared(SurfaceHandle(handle)))?;
    }

    let stdin_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = read_commands(stdin_tx).await {
            tracing::warn!(error = %e, "Stopped reading commands");
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(SessionEvent::ShutdownRequested);
        }
    });

    session.run(rx, print_outcome).await?;
    println!("Preview stopped.");
    Ok(())
}

async fn read_commands(tx: mpsc::UnboundedSender<SessionEvent>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(event)) => {
                let quit = event == SessionEvent::ShutdownRequested;
                if tx.send(event).is_err() || quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
    Ok(())
}

/// Parse one control line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> anyhow::Result<Option<SessionEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();

    let event = match words.as_slice() {
        ["crop", feed, edge, value] => control(ControlCommand::Crop {
            feed: FeedName::from(*feed),
            edge: edge.parse()?,
            value: number(value, "crop inset")?,
        }),
        ["alpha", feed, value] => control(ControlCommand::Alpha {
            feed: FeedName::from(*feed),
            value: number(value, "alpha")?,
        }),
        ["zorder", feed, value] => control(ControlCommand::ZOrder {
            feed: FeedName::from(*feed),
            value: number(value, "z-order")?,
        }),
        ["zoom", feed, factor] => control(ControlCommand::Zoom {
            feed: FeedName::from(*feed),
            factor: number(factor, "zoom factor")?,
        }),
        ["pos", feed, x, y] => control(ControlCommand::Position {
            feed: FeedName::from(*feed),
            x: number(x, "x")?,
            y: number(y, "y")?,
        }),
        ["resize", width, height] => SessionEvent::CanvasResized {
            width: number(width, "width")?,
            height: number(height, "height")?,
        },
        ["policy", policy] => control(ControlCommand::Policy(policy.parse()?)),
        ["reset"] => control(ControlCommand::ResetLayout),
        ["refresh"] => control(ControlCommand::Rebuild),
        ["quit"] | ["exit"] => SessionEvent::ShutdownRequested,
        _ => bail!("unrecognized command: {line}"),
    };
    Ok(Some(event))
}

fn control(command: ControlCommand) -> SessionEvent {
    SessionEvent::Control(command)
}

fn number<T: std::str::FromStr>(text: &str, what: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse()
        .with_context(|| format!("invalid {what} '{text}'"))
}

fn print_outcome(report: &ControlReport) {
    match &report.outcome {
        ControlOutcome::Crop {
            feed,
            edge,
            applied,
        } => println!("{feed} crop {edge} = {}{}", applied.value(), note(applied)),
        ControlOutcome::Alpha { feed, applied } => {
            println!("{feed} alpha = {:.3}{}", applied.value(), note(applied))
        }
        ControlOutcome::ZOrder { feed, applied } => {
            println!("{feed} zorder = {}{}", applied.value(), note(applied))
        }
        ControlOutcome::Zoom { feed, applied } => {
            println!("{feed} zoom = {:.2}{}", applied.value(), note(applied))
        }
        ControlOutcome::Position { feed, applied } => {
            let (x, y) = applied.value();
            println!("{feed} pos = {x},{y}{}", note(applied))
        }
        ControlOutcome::Layout { policy, canvas } => println!("layout {policy} on {canvas}"),
        ControlOutcome::Rebuilt { state } => println!("pipeline rebuilt ({state:?})"),
    }
    if let Some(e) = &report.write_error {
        eprintln!("  not written to the pipeline: {e}");
    }
}

fn note<T: Copy>(applied: &Applied<T>) -> &'static str {
    if applied.was_clamped() {
        " (clamped)"
    } else {
        ""
    }
}
