use colored::Colorize;
use prettytable::{format, row, Table};

use crate::commands::AppContext;
use crate::error::Result;

/// Handle `debug-log`
pub fn show(ctx: &AppContext, clear: bool) -> Result<()> {
    let log = ctx.controller.debug_log();

    if clear {
        log.clear()?;
        println!("{}", "Debug log cleared.".green());
        return Ok(());
    }

    let events = ctx.controller.get_debug_log();
    if events.is_empty() {
        println!("{}", "No debug events recorded.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Time".bold(), "Event".bold(), "Message".bold()]);

    for event in &events {
        let kind = if event.kind.is_error() {
            event.kind.as_str().red()
        } else {
            event.kind.as_str().cyan()
        };
        let mut message = event.message.clone();
        if let Some(payload) = event.payload.as_ref() {
            message.push('\n');
            message.push_str(&payload.to_string().dimmed().to_string());
        }
        table.add_row(row![
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            kind,
            message
        ]);
    }

    println!("\nDebug events ({} of {}):", events.len(), log.capacity());
    table.printstd();
    println!();
    Ok(())
}
