//! Build an `add` request

use std::io::IsTerminal;
use std::path::Path;

use minit::Request;
use tokio::io::AsyncReadExt;

/// Existing files are added by path; anything else is a unit name whose
/// content is read from stdin, unless stdin is a terminal.
pub async fn add_request(target: String) -> std::io::Result<Request> {
    if Path::new(&target).is_file() || std::io::stdin().is_terminal() {
        return Ok(Request::Add {
            target,
            content: None,
        });
    }

    let mut content = String::new();
    tokio::io::stdin().read_to_string(&mut content).await?;
    Ok(Request::Add {
        target,
        content: Some(content),
    })
}
