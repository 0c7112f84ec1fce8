//! `iecport doctor` command

use anyhow::{bail, Result};

use crate::cli::DoctorArgs;
use crate::commands::GlobalOpts;
use iecport::ops::{catalog_path, doctor, format_report, tool_context};
use iecport::util::SystemRunner;

pub fn execute(_args: DoctorArgs, global: &GlobalOpts) -> Result<()> {
    let (_, config) = global.config()?;
    let ctx = tool_context(&config)?;
    let catalog = catalog_path(&config, &ctx);

    let report = doctor(&ctx, &catalog, &SystemRunner);
    println!("{}", format_report(&report, global.verbose));

    if !report.all_required_passed() {
        bail!("{} required checks failed", report.required_failed_count());
    }
    Ok(())
}
