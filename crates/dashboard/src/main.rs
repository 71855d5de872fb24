use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dashboard::start(std::env::args()).await
}
