//! `iecport lib` command

use anyhow::Result;

use crate::cli::{LibArgs, LibCommand};
use crate::commands::GlobalOpts;
use iecport::ops::{manage, tool_context};
use iecport::toolchain::LibraryStatus;
use iecport::util::shell::Status;
use iecport::util::SystemRunner;

pub fn execute(args: LibArgs, global: &GlobalOpts) -> Result<()> {
    let shell = global.shell(false);
    let (_, config) = global.config()?;
    let ctx = tool_context(&config)?;
    let sink = shell.as_ref();

    match args.command {
        LibCommand::Status => {
            let (status, message) = manage::lib_status(&ctx, &SystemRunner, sink)?;
            match status {
                LibraryStatus::UpToDate => {
                    shell.status(Status::Finished, "all libraries are up to date")
                }
                LibraryStatus::UpdatesAvailable => {
                    shell.status(Status::Warning, "library updates are available");
                    if !message.trim().is_empty() {
                        println!("{}", message.trim_end());
                    }
                }
                LibraryStatus::Error => shell.error(message.trim()),
            }
        }
        LibCommand::Install => {
            shell.status(Status::Checking, "required libraries");
            manage::lib_install(&ctx, &SystemRunner, sink)?;
            shell.status(Status::Installed, "required libraries");
        }
        LibCommand::Upgrade => {
            let span = shell.span(Status::Upgrading, "installed libraries");
            match manage::lib_upgrade(&ctx, &SystemRunner, sink) {
                Ok(message) => span.finish_with_message(message.trim()),
                Err(e) => {
                    span.abandon();
                    return Err(e.into());
                }
            }
        }
        LibCommand::Clean => {
            let span = shell.span(Status::Installing, "libraries from scratch");
            match manage::lib_clean(&ctx, &SystemRunner, sink) {
                Ok(()) => span.finish_with_message("reinstalling libraries"),
                Err(e) => {
                    span.abandon();
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
