//! Event handlers markup can name in event attributes (`Click="on_play"`).

use std::rc::Rc;

use anyhow::bail;
use log::debug;
use lumen_xaml::{EventSignature, Handler, Value};

/// Names [`resolve`] knows.
pub const HANDLERS: &[&str] = &["on_play", "on_stop", "on_volume_changed", "on_mute"];

/// Event handler resolver installed on the parser.
pub fn resolve(signature: &EventSignature, name: &str) -> anyhow::Result<Handler> {
    debug!("resolving handler '{}' for {} argument(s)", name, signature.params.len());
    let handler: Handler = match name {
        "on_play" => Rc::new(|_: &[Value]| -> anyhow::Result<()> {
            println!();
            println!("  ┌──────────────────────────────┐");
            println!("  │   ▶  PLAYBACK STARTED        │");
            println!("  └──────────────────────────────┘");
            println!();
            Ok(())
        }),
        "on_stop" => Rc::new(|_: &[Value]| -> anyhow::Result<()> {
            println!("  ■  playback stopped");
            Ok(())
        }),
        "on_volume_changed" => Rc::new(|args: &[Value]| -> anyhow::Result<()> {
            let level = args.first().and_then(Value::as_float).unwrap_or_default();
            println!("  ♪  volume {:>5.1}  {}", level, meter(level));
            Ok(())
        }),
        "on_mute" => Rc::new(|_: &[Value]| -> anyhow::Result<()> {
            println!("  ∅  muted");
            Ok(())
        }),
        other => bail!("no handler named '{}' (known: {})", other, HANDLERS.join(", ")),
    };
    Ok(handler)
}

/// Twenty-cell bar for a level between 0 and 100.
fn meter(level: f64) -> String {
    let filled = (level.clamp(0.0, 100.0) / 5.0).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(20 - filled))
}
