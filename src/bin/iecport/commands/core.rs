//! `iecport core` command

use anyhow::Result;

use crate::cli::{CoreArgs, CoreCommand};
use crate::commands::GlobalOpts;
use iecport::ops::{load_catalog, manage, tool_context};
use iecport::toolchain::CoreStatus;
use iecport::util::shell::Status;
use iecport::util::SystemRunner;

pub fn execute(args: CoreArgs, global: &GlobalOpts) -> Result<()> {
    let shell = global.shell(false);
    let (_, config) = global.config()?;
    let ctx = tool_context(&config)?;

    let target = match &args.command {
        CoreCommand::Status(t) | CoreCommand::Upgrade(t) | CoreCommand::Reinstall(t) => &t.core,
    };

    // A board name stands for the core it uses
    let core = match load_catalog(&config) {
        Ok((_, catalog)) => catalog
            .get(target)
            .map(|board| board.core.clone())
            .unwrap_or_else(|| target.clone()),
        Err(_) => target.clone(),
    };
    tracing::debug!("core target `{}` resolved to `{}`", target, core);

    match args.command {
        CoreCommand::Status(_) => {
            let (status, message) = manage::core_status(&ctx, &SystemRunner, shell.as_ref(), &core)?;
            let label = match status {
                CoreStatus::UpToDate => Status::Finished,
                CoreStatus::NotInstalled => Status::Missing,
                CoreStatus::UpdateAvailable => Status::Warning,
                CoreStatus::Error => Status::Error,
            };
            shell.status(label, format!("{} ({})", core, message.trim()));
        }
        CoreCommand::Upgrade(_) => {
            let span = shell.span(Status::Upgrading, &core);
            match manage::core_upgrade(&ctx, &SystemRunner, shell.as_ref(), &core) {
                Ok(message) => span.finish_with_message(format!("{} ({})", core, message)),
                Err(e) => {
                    span.abandon();
                    return Err(e.into());
                }
            }
        }
        CoreCommand::Reinstall(_) => {
            let span = shell.span(Status::Installing, &core);
            match manage::core_reinstall(&ctx, &SystemRunner, shell.as_ref(), &core) {
                Ok(message) => span.finish_with_message(format!("{} ({})", core, message)),
                Err(e) => {
                    span.abandon();
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
