//! `controls` - list the control catalogue

use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::controls::{self, Profile};
use crate::ui;

pub fn run(ctx: &Context, profile: Profile) -> Result<()> {
    let entries: Vec<_> = controls::describe(profile).collect();

    if ctx.quiet {
        for info in &entries {
            println!("{}", info.id);
        }
        return Ok(());
    }

    ui::header(&format!("Controls ({profile})"));
    let width = entries.iter().map(|c| c.id.len()).max().unwrap_or(0);
    for info in &entries {
        println!(
            "  {}  {}  {} {}",
            format!("{:width$}", info.id).bold(),
            ui::format_impact(info.impact).cyan(),
            info.title,
            format!("[{}]", info.profile).dimmed(),
        );
    }
    println!();
    ui::dim(&format!("{} controls", entries.len()));
    Ok(())
}
