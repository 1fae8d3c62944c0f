//! Check command - compile a script without running it.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::{Context, SourceArgs};

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<ExitCode> {
    let code = args.source.read()?;
    let sandbox = ctx.sandbox(None)?;

    let checked = sandbox.check(&code);

    if ctx.json_output {
        let report = match &checked {
            Ok(()) => serde_json::json!({ "ok": true }),
            Err(error) => serde_json::json!({ "ok": false, "error": error }),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match &checked {
            Ok(()) => println!("ok"),
            Err(error) => eprintln!("Error: {}", error),
        }
    }

    Ok(if checked.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
