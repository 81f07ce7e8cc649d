mod add;
mod create;
mod daemon;

pub use add::add_request;
pub use create::{create, CreateArgs};
pub use daemon::daemon;

use std::process::ExitCode;

use minit::diagnostics::{self, FileDiagnostics};
use minit::{dispatch, Config, Request, Response, Supervisor};

/// Run one request in this process and report it
pub async fn execute(config: &Config, request: Request) -> ExitCode {
    let supervisor = Supervisor::from_config(config);
    let response = dispatch(&supervisor, request.clone()).await;

    let sink = config.diagnostics_dir.as_ref().map(FileDiagnostics::new);
    diagnostics::record(sink.as_ref(), &request, &response).await;

    report(&response)
}

/// Print a response the way the CLI does and turn it into an exit code
pub fn report(response: &Response) -> ExitCode {
    if response.is_success() {
        println!("{}", response);
    } else {
        eprintln!("{}", response);
    }
    ExitCode::from(response.exit_code() as u8)
}
