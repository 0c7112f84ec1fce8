//! `iecport boards` command

use anyhow::{Context, Result};

use crate::cli::BoardsArgs;
use crate::commands::GlobalOpts;
use iecport::ops::load_catalog;
use iecport::util::shell::Status;

pub fn execute(args: BoardsArgs, global: &GlobalOpts) -> Result<()> {
    let (_, config) = global.config()?;
    let (path, catalog) = load_catalog(&config)?;

    if args.json {
        let json = serde_json::to_string_pretty(&catalog).context("failed to serialize catalog")?;
        println!("{}", json);
        return Ok(());
    }

    let shell = global.shell(false);
    if catalog.is_empty() {
        shell.warn(format!("no boards in {}", path.display()));
        return Ok(());
    }

    let width = catalog.names().map(str::len).max().unwrap_or(0);
    for (name, board) in catalog.iter() {
        let version = board.version.as_deref().unwrap_or("-");
        println!(
            "{:<width$}  {:<8} {:<24} {}",
            name,
            board.platform,
            board.core,
            version,
            width = width
        );
    }

    shell.status(
        Status::Info,
        format!("{} boards in {}", catalog.len(), path.display()),
    );
    Ok(())
}
