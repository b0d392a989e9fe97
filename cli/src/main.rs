use std::io::Write;
use std::process::ExitCode;

use bkiso_cli::{run, Args};
use bkisofs::Outcome;
use clap::Parser;
use tracing::{error, warn};

fn main() -> ExitCode {
    let args = Args::parse();

    let console = match bkiso_tracing::install(args.log_level, args.progress) {
        Ok(console) => console,
        Err(e) => {
            eprintln!("unable to set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = console.stdout();
    let result = run(&args.command, &mut stdout);
    let _ = stdout.flush();

    match result {
        Ok(Outcome::Complete) => ExitCode::SUCCESS,
        Ok(Outcome::PartlyFailed) => {
            warn!("some items could not be processed");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(err = %e, "failed");
            ExitCode::FAILURE
        }
    }
}
