//! Run command - execute a script in the sandbox.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use corral_sandbox::ExecutionResult;

use super::{Context, SourceArgs};

/// Exit status for a script that ran out of time (matches `timeout(1)`).
const EXIT_TIMED_OUT: u8 = 124;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Override the execution timeout, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<ExitCode> {
    let code = args.source.read()?;
    let sandbox = ctx.sandbox(args.timeout)?;

    // Ctrl-C cancels the execution instead of killing the process.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = sandbox.execute_with_cancellation(&code, &cancel).await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &result {
            ExecutionResult::Success { output } => {
                if output.ends_with('\n') {
                    print!("{}", output);
                } else {
                    println!("{}", output);
                }
            }
            other => eprintln!("{}", other),
        }
    }

    Ok(ExitCode::from(exit_status(&result)))
}

fn exit_status(result: &ExecutionResult) -> u8 {
    match result {
        ExecutionResult::Success { .. } => 0,
        ExecutionResult::TimedOut { .. } => EXIT_TIMED_OUT,
        ExecutionResult::Failed { .. } => 1,
    }
}
